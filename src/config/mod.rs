//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    ffi::OsString,
    net::SocketAddr,
    num::NonZeroU64,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::spec::InputEncoding;

mod cli;

pub use cli::{
    CliArgs, Command, PurgeArgs, RenderOverrides, ServeArgs, ServeOverrides, StorageOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pressroom";
const ENV_PREFIX: &str = "PRESSROOM";
/// Ambient fallback for the storage directory when none is configured.
pub const OUTPUT_FOLDER_ENV: &str = "PRESSROOM_OUTPUT_FOLDER";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_MAX_REQUEST_BYTES: u64 = 8 * 1024 * 1024;
const DEFAULT_STORAGE_SUBDIR: &str = "pressroom";
const DEFAULT_RETENTION_SECS: u64 = 600;
const DEFAULT_RENDER_COMMAND: &str = "pressroom-render";
const DEFAULT_OUTPUT_FORMAT: &str = "pdf";
const DEFAULT_OUTPUT_NAME: &str = "printout";
const DEFAULT_FORWARD_HEADERS: [&str; 2] = ["Referer", "Cookie"];
const LIST_KEYS: [&str; 4] = [
    "render.args",
    "render.output_formats",
    "render.layouts",
    "render.forward_headers",
];

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub storage: StorageSettings,
    pub request: RequestSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    /// Public base URL; when unset it is derived from each request.
    pub base_url: Option<String>,
    pub graceful_shutdown: Duration,
    pub max_request_bytes: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub directory: PathBuf,
    pub retention: Duration,
}

#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub encoding: InputEncoding,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub command: PathBuf,
    pub args: Vec<String>,
    /// Lowercase file suffixes the renderer may produce; the first is the default.
    pub output_formats: Vec<String>,
    pub layouts: Vec<String>,
    pub default_output_name: String,
    pub forward_headers: Vec<String>,
    pub add_forwarded_for: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    let mut environment = Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .list_separator(",");
    for key in LIST_KEYS {
        environment = environment.with_list_parse_key(key);
    }
    builder = builder.add_source(environment);

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Purge(args)) => raw.apply_storage_overrides(&args.storage),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }
    if let Some(url) = cli.server_base_url.as_ref() {
        raw.server.base_url = Some(url.clone());
    }

    Settings::from_raw_with_ambient(raw, std::env::var_os(OUTPUT_FOLDER_ENV))
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    storage: RawStorageSettings,
    request: RawRequestSettings,
    render: RawRenderSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(limit) = overrides.server_max_request_bytes {
            self.server.max_request_bytes = Some(limit);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(seconds) = overrides.storage_retention_seconds {
            self.storage.retention_seconds = Some(seconds);
        }
        if let Some(encoding) = overrides.request_encoding.as_ref() {
            self.request.encoding = Some(encoding.clone());
        }

        self.apply_storage_overrides(&overrides.storage);
        self.apply_render_overrides(&overrides.render);
    }

    fn apply_storage_overrides(&mut self, overrides: &StorageOverrides) {
        if let Some(directory) = overrides.storage_directory.as_ref() {
            self.storage.directory = Some(directory.clone());
        }
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(command) = overrides.render_command.as_ref() {
            self.render.command = Some(command.clone());
        }
        if let Some(formats) = overrides.render_output_formats.as_ref() {
            self.render.output_formats = Some(formats.clone());
        }
        if let Some(add) = overrides.render_add_forwarded_for {
            self.render.add_forwarded_for = Some(add);
        }
    }
}

impl Settings {
    /// Validate raw settings. `ambient_output_folder` is the value of
    /// [`OUTPUT_FOLDER_ENV`], consulted only when no directory is configured.
    fn from_raw_with_ambient(
        raw: RawSettings,
        ambient_output_folder: Option<OsString>,
    ) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            storage,
            request,
            render,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let storage = build_storage_settings(storage, ambient_output_folder)?;
        let request = build_request_settings(request)?;
        let render = build_render_settings(render)?;

        Ok(Self {
            server,
            logging,
            storage,
            request,
            render,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let base_url = match server.base_url {
        Some(value) if !value.trim().is_empty() => Some(normalize_base_url(&value)?),
        _ => None,
    };

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let max_request_bytes_value = server
        .max_request_bytes
        .unwrap_or(DEFAULT_MAX_REQUEST_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("server.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "server.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(ServerSettings {
        addr,
        base_url,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        max_request_bytes,
    })
}

fn normalize_base_url(value: &str) -> Result<String, LoadError> {
    let trimmed = value.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(LoadError::invalid(
            "server.base_url",
            format!("`{value}` must start with http:// or https://"),
        ));
    }
    Ok(trimmed.to_string())
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_storage_settings(
    storage: RawStorageSettings,
    ambient_output_folder: Option<OsString>,
) -> Result<StorageSettings, LoadError> {
    let directory = storage
        .directory
        .or_else(|| {
            ambient_output_folder
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_STORAGE_SUBDIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "storage.directory",
            "path must not be empty",
        ));
    }

    let retention_secs = storage.retention_seconds.unwrap_or(DEFAULT_RETENTION_SECS);
    if retention_secs == 0 {
        return Err(LoadError::invalid(
            "storage.retention_seconds",
            "must be greater than zero",
        ));
    }

    Ok(StorageSettings {
        directory,
        retention: Duration::from_secs(retention_secs),
    })
}

fn build_request_settings(request: RawRequestSettings) -> Result<RequestSettings, LoadError> {
    let encoding = match request.encoding {
        Some(label) => InputEncoding::from_label(&label).ok_or_else(|| {
            LoadError::invalid(
                "request.encoding",
                format!("unsupported encoding `{label}` (expected utf-8 or iso-8859-1)"),
            )
        })?,
        None => InputEncoding::default(),
    };
    Ok(RequestSettings { encoding })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let command = render
        .command
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RENDER_COMMAND));
    if command.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.command",
            "path must not be empty",
        ));
    }

    let output_formats = match render.output_formats {
        Some(formats) => normalize_formats(formats)?,
        None => vec![DEFAULT_OUTPUT_FORMAT.to_string()],
    };

    let default_output_name = render
        .default_output_name
        .map(|name| name.trim().to_string())
        .unwrap_or_else(|| DEFAULT_OUTPUT_NAME.to_string());
    if default_output_name.is_empty() {
        return Err(LoadError::invalid(
            "render.default_output_name",
            "must not be empty",
        ));
    }

    let forward_headers = match render.forward_headers {
        Some(headers) => {
            let headers: Vec<String> = headers
                .into_iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect();
            if let Some(bad) = headers
                .iter()
                .find(|name| axum::http::HeaderName::from_bytes(name.as_bytes()).is_err())
            {
                return Err(LoadError::invalid(
                    "render.forward_headers",
                    format!("`{bad}` is not a valid header name"),
                ));
            }
            headers
        }
        None => DEFAULT_FORWARD_HEADERS.iter().map(|s| s.to_string()).collect(),
    };

    Ok(RenderSettings {
        command,
        args: render.args.unwrap_or_default(),
        output_formats,
        layouts: render.layouts.unwrap_or_default(),
        default_output_name,
        forward_headers,
        add_forwarded_for: render.add_forwarded_for.unwrap_or(false),
    })
}

fn normalize_formats(formats: Vec<String>) -> Result<Vec<String>, LoadError> {
    let mut normalized: Vec<String> = Vec::with_capacity(formats.len());
    for format in formats {
        let format = format.trim().trim_start_matches('.').to_ascii_lowercase();
        if format.is_empty() {
            continue;
        }
        if !format.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(LoadError::invalid(
                "render.output_formats",
                format!("`{format}` is not a plain file suffix"),
            ));
        }
        if !normalized.contains(&format) {
            normalized.push(format);
        }
    }
    if normalized.is_empty() {
        return Err(LoadError::invalid(
            "render.output_formats",
            "at least one output format is required",
        ));
    }
    Ok(normalized)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    base_url: Option<String>,
    graceful_shutdown_seconds: Option<u64>,
    max_request_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    directory: Option<PathBuf>,
    retention_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRequestSettings {
    encoding: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    command: Option<PathBuf>,
    args: Option<Vec<String>>,
    output_formats: Option<Vec<String>>,
    layouts: Option<Vec<String>>,
    default_output_name: Option<String>,
    forward_headers: Option<Vec<String>>,
    add_forwarded_for: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}
