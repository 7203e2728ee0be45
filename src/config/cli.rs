use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the pressroom binary.
#[derive(Debug, Parser)]
#[command(name = "pressroom", version, about = "Print artifact server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PRESSROOM_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Override the public base URL advertised in tickets and info.json.
    #[arg(
        long = "server-base-url",
        env = "PRINT_BASE_URL",
        value_name = "URL",
        global = true
    )]
    pub server_base_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the print HTTP service.
    Serve(Box<ServeArgs>),
    /// Delete artifact files left in the storage directory and exit.
    #[command(name = "purge")]
    Purge(PurgeArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PurgeArgs {
    #[command(flatten)]
    pub storage: StorageOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct StorageOverrides {
    /// Override the directory holding rendered artifacts.
    #[arg(long = "storage-directory", value_name = "PATH")]
    pub storage_directory: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the renderer executable.
    #[arg(long = "render-command", value_name = "PATH")]
    pub render_command: Option<PathBuf>,

    /// Override the accepted output formats (comma separated).
    #[arg(
        long = "render-output-formats",
        value_name = "FORMATS",
        value_delimiter = ','
    )]
    pub render_output_formats: Option<Vec<String>>,

    /// Toggle the X-Forwarded-For header passed to the renderer.
    #[arg(
        long = "render-add-forwarded-for",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub render_add_forwarded_for: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub storage: StorageOverrides,

    #[command(flatten)]
    pub render: RenderOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the maximum accepted request body in bytes.
    #[arg(long = "server-max-request-bytes", value_name = "BYTES")]
    pub server_max_request_bytes: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override how long published artifacts are kept.
    #[arg(long = "storage-retention-seconds", value_name = "SECONDS")]
    pub storage_retention_seconds: Option<u64>,

    /// Override the character encoding of spec request bodies.
    #[arg(long = "request-encoding", value_name = "ENCODING")]
    pub request_encoding: Option<String>,
}
