//! Renderer backed by an external process.
//!
//! The spec document is written to the child's stdin as JSON and the
//! rendered document is read from its stdout. Forwarded request headers
//! travel as `PRESSROOM_HEADER_<NAME>` environment variables and the chosen
//! format as `PRESSROOM_OUTPUT_FORMAT`.

use std::{io, path::PathBuf, process::Stdio};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::{
    io::{AsyncReadExt, AsyncWrite, AsyncWriteExt},
    process::Command,
};
use tracing::{debug, warn};

use crate::{
    application::render::{ForwardedHeaders, RenderError, Renderer},
    config::RenderSettings,
    domain::{artifact::OutputFormat, spec::PrintSpec},
};

const HEADER_ENV_PREFIX: &str = "PRESSROOM_HEADER_";
const FORMAT_ENV: &str = "PRESSROOM_OUTPUT_FORMAT";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone)]
pub struct CommandRenderer {
    command: PathBuf,
    args: Vec<String>,
    output_formats: Vec<String>,
    layouts: Vec<String>,
    default_output_name: String,
}

impl From<&RenderSettings> for CommandRenderer {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            command: settings.command.clone(),
            args: settings.args.clone(),
            output_formats: settings.output_formats.clone(),
            layouts: settings.layouts.clone(),
            default_output_name: settings.default_output_name.clone(),
        }
    }
}

impl CommandRenderer {
    fn requested_format(&self, spec: &PrintSpec) -> Result<String, RenderError> {
        let requested = match spec.output_format() {
            Some(format) => format.trim_start_matches('.').to_ascii_lowercase(),
            None => self
                .output_formats
                .first()
                .cloned()
                .ok_or_else(|| RenderError::render("no output format is configured"))?,
        };

        if self.output_formats.contains(&requested) {
            Ok(requested)
        } else {
            Err(RenderError::Unsupported { format: requested })
        }
    }

    fn spawn_failure(&self, err: io::Error) -> RenderError {
        RenderError::render(format!(
            "failed to start `{}`: {err}",
            self.command.display()
        ))
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    fn output_format(&self, spec: &PrintSpec) -> Result<OutputFormat, RenderError> {
        let suffix = self.requested_format(spec)?;
        let content_type = mime_guess::from_ext(&suffix)
            .first_raw()
            .unwrap_or(FALLBACK_CONTENT_TYPE);
        Ok(OutputFormat::new(suffix, content_type))
    }

    async fn render(
        &self,
        spec: &PrintSpec,
        headers: &ForwardedHeaders,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), RenderError> {
        let format = self.requested_format(spec)?;
        let payload = serde_json::to_vec(spec.document())
            .map_err(|err| RenderError::render(format!("failed to encode spec: {err}")))?;

        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .env(FORMAT_ENV, &format)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (name, value) in headers.iter() {
            command.env(header_env_name(name), value);
        }

        debug!(
            target = "pressroom::renderer",
            command = %self.command.display(),
            format = %format,
            headers = headers.len(),
            "Spawning renderer"
        );
        let mut child = command.spawn().map_err(|err| self.spawn_failure(err))?;

        let (Some(mut stdin), Some(mut stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(RenderError::render("renderer pipes are unavailable"));
        };

        let write_spec = async move {
            let result = match stdin.write_all(&payload).await {
                Ok(()) => stdin.shutdown().await,
                Err(err) => Err(err),
            };
            match result {
                // the renderer may exit without reading the whole spec
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        };
        let process = &mut child;
        let copy_output = async move {
            let copied = tokio::io::copy(&mut stdout, sink).await;
            if copied.is_err() {
                // a renderer blocked on a full stdout pipe never exits on its own
                drop(stdout);
                if let Err(err) = process.start_kill() {
                    warn!(
                        target = "pressroom::renderer",
                        error = %err,
                        "Failed to kill renderer after output error"
                    );
                }
            }
            copied
        };
        let read_errors = async {
            let mut message = String::new();
            stderr.read_to_string(&mut message).await.map(|_| message)
        };

        let (written, copied, errors) = tokio::join!(write_spec, copy_output, read_errors);
        let status = child.wait().await?;
        let bytes = copied?;

        if !status.success() {
            let errors = errors.unwrap_or_default();
            return Err(match status.code() {
                Some(code) => RenderError::render(format!(
                    "`{}` exited with status {code}: {}",
                    self.command.display(),
                    errors.trim()
                )),
                None => RenderError::interrupted(format!(
                    "`{}` was terminated by a signal",
                    self.command.display()
                )),
            });
        }

        written?;
        debug!(
            target = "pressroom::renderer",
            bytes,
            "Renderer finished"
        );
        Ok(())
    }

    fn capabilities(&self, _app: Option<&str>) -> Value {
        json!({
            "layouts": self
                .layouts
                .iter()
                .map(|name| json!({ "name": name }))
                .collect::<Vec<_>>(),
            "outputFormats": self
                .output_formats
                .iter()
                .map(|name| json!({ "name": name }))
                .collect::<Vec<_>>(),
        })
    }

    fn output_file_name(&self, _app: Option<&str>, layout: Option<&str>) -> String {
        layout
            .map(str::to_string)
            .unwrap_or_else(|| self.default_output_name.clone())
    }
}

fn header_env_name(name: &str) -> String {
    let mut env = String::with_capacity(HEADER_ENV_PREFIX.len() + name.len());
    env.push_str(HEADER_ENV_PREFIX);
    env.extend(name.chars().map(|ch| match ch {
        '-' => '_',
        other => other.to_ascii_uppercase(),
    }));
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer(script: &str) -> CommandRenderer {
        CommandRenderer {
            command: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            output_formats: vec!["pdf".to_string(), "png".to_string()],
            layouts: vec!["A4 portrait".to_string()],
            default_output_name: "printout".to_string(),
        }
    }

    fn spec(text: &str) -> PrintSpec {
        PrintSpec::parse(text).expect("spec")
    }

    #[test]
    fn output_format_defaults_to_first_configured() {
        let renderer = renderer("cat");
        let format = renderer.output_format(&spec("{}")).expect("format");
        assert_eq!(format, OutputFormat::new("pdf", "application/pdf"));

        let format = renderer
            .output_format(&spec(r#"{"outputFormat":"PNG"}"#))
            .expect("format");
        assert_eq!(format, OutputFormat::new("png", "image/png"));
    }

    #[test]
    fn unknown_format_is_unsupported() {
        let err = renderer("cat")
            .output_format(&spec(r#"{"outputFormat":"tiff"}"#))
            .expect_err("tiff is not configured");
        assert!(matches!(err, RenderError::Unsupported { format } if format == "tiff"));
    }

    #[test]
    fn header_env_names_are_shell_friendly() {
        assert_eq!(
            header_env_name("x-forwarded-for"),
            "PRESSROOM_HEADER_X_FORWARDED_FOR"
        );
    }

    #[test]
    fn capabilities_list_layouts_and_formats() {
        let info = renderer("cat").capabilities(None);
        assert_eq!(info["layouts"][0]["name"], "A4 portrait");
        assert_eq!(info["outputFormats"][1]["name"], "png");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spec_goes_in_and_document_comes_out() {
        let mut sink = Vec::new();
        renderer("cat")
            .render(
                &spec(r#"{"layout":"A4 portrait"}"#),
                &ForwardedHeaders::new(),
                &mut sink,
            )
            .await
            .expect("render");
        assert_eq!(sink, br#"{"layout":"A4 portrait"}"#.to_vec());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn headers_and_format_reach_the_process() {
        let mut headers = ForwardedHeaders::new();
        headers.insert("Referer", "http://maps.example/");
        let mut sink = Vec::new();

        renderer(r#"printf '%s|%s' "$PRESSROOM_HEADER_REFERER" "$PRESSROOM_OUTPUT_FORMAT""#)
            .render(&spec(r#"{"outputFormat":"png"}"#), &headers, &mut sink)
            .await
            .expect("render");
        assert_eq!(String::from_utf8(sink).expect("utf8"), "http://maps.example/|png");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let mut sink = Vec::new();
        let err = renderer("echo 'layout missing' >&2; exit 3")
            .render(&spec("{}"), &ForwardedHeaders::new(), &mut sink)
            .await
            .expect_err("exit 3");
        let message = err.to_string();
        assert!(matches!(err, RenderError::Render { .. }));
        assert!(message.contains("status 3"), "{message}");
        assert!(message.contains("layout missing"), "{message}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn killed_process_is_interrupted() {
        let mut sink = Vec::new();
        let err = renderer("kill -9 $$")
            .render(&spec("{}"), &ForwardedHeaders::new(), &mut sink)
            .await
            .expect_err("killed");
        assert!(matches!(err, RenderError::Interrupted { .. }));
    }

    #[cfg(unix)]
    struct FullDisk;

    #[cfg(unix)]
    impl AsyncWrite for FullDisk {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &[u8],
        ) -> std::task::Poll<io::Result<usize>> {
            std::task::Poll::Ready(Err(io::Error::new(
                io::ErrorKind::StorageFull,
                "no space left on device",
            )))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sink_failure_stops_the_renderer() {
        let mut sink = FullDisk;
        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            renderer("cat >/dev/null; head -c 1000000 /dev/zero").render(
                &spec("{}"),
                &ForwardedHeaders::new(),
                &mut sink,
            ),
        )
        .await
        .expect("render finishes once the sink fails");

        let err = outcome.expect_err("sink failure");
        assert!(
            matches!(&err, RenderError::Io(io_err) if io_err.kind() == io::ErrorKind::StorageFull),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn missing_executable_is_a_render_error() {
        let renderer = CommandRenderer {
            command: PathBuf::from("/nonexistent/pressroom-render"),
            ..renderer("cat")
        };
        let mut sink = Vec::new();
        let err = renderer
            .render(&spec("{}"), &ForwardedHeaders::new(), &mut sink)
            .await
            .expect_err("missing");
        assert!(err.to_string().contains("failed to start"));
    }
}
