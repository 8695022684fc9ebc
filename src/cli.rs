//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, validate, health), and their associated argument
//! structs. Every `run` flag has an environment variable equivalent for
//! container deployments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "edge-relay",
    version,
    about = "Edge HTTP relay and concurrent backend aggregator",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        edge-relay run                                   Start with defaults (backend http://localhost:8081)\n  \
        edge-relay run -c edge-relay.yaml                Start with a config file\n  \
        edge-relay validate edge-relay.yaml              Check a config file"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the edge server
    Run(Box<RunArgs>),

    /// Validate a config file without starting
    Validate(ValidateArgs),

    /// Check health of a running instance
    Health(HealthArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        edge-relay run                                        Auto-detect config\n  \
        edge-relay run --backend-url http://api:8081          Relay /api/* to api:8081\n  \
        edge-relay run --assets ./web -p 8080 --pretty        Serve the landing page")]
pub struct RunArgs {
    /// Config file path (.yaml, .json, .toml)
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Assets directory containing templates/index.html and static/
    #[arg(long, env = "ASSETS_DIR")]
    pub assets: Option<PathBuf>,

    // -- Backends --
    /// Relay backend base URL (overrides relay.backend_url)
    #[arg(long, env = "BACKEND_URL", help_heading = "Backends")]
    pub backend_url: Option<String>,

    /// Aggregator endpoint (overrides aggregator.endpoint)
    #[arg(long, env = "AGGREGATE_ENDPOINT", help_heading = "Backends")]
    pub aggregate_endpoint: Option<String>,

    /// Maximum concurrent aggregator calls (overrides aggregator.max_concurrency)
    #[arg(long, env = "AGGREGATE_MAX_CONCURRENCY", help_heading = "Backends")]
    pub max_concurrency: Option<usize>,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Tuning --
    /// Max request body size in bytes
    #[arg(
        long,
        env = "MAX_BODY_SIZE",
        default_value_t = 1_048_576,
        help_heading = "Tuning"
    )]
    pub max_body: usize,

    /// Seconds in-flight requests get to finish after a shutdown signal
    #[arg(
        long,
        env = "SHUTDOWN_GRACE_SECS",
        default_value_t = 10,
        help_heading = "Tuning"
    )]
    pub shutdown_grace: u64,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Config file to validate
    #[arg(default_value = "edge-relay.yaml")]
    pub config: PathBuf,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ValidateFormat,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance
    #[arg(default_value = "http://localhost:8080")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ValidateFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_from(["edge-relay", "run"]).unwrap();
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.max_body, 1_048_576);
        assert_eq!(args.shutdown_grace, 10);
    }

    #[test]
    fn json_and_pretty_conflict() {
        assert!(Cli::try_parse_from(["edge-relay", "run", "--json", "--pretty"]).is_err());
    }
}
