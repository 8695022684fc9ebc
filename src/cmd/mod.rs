//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`validate`], or [`health`].

pub mod health;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::EdgeError;

const USAGE_HINTS: &[(&str, &str)] = &[
    ("edge-relay run", "serve, picking up ./edge-relay.yaml if present"),
    ("edge-relay run -c relay.yaml", "serve with an explicit config file"),
    ("edge-relay validate relay.yaml", "check a config file and exit"),
    ("edge-relay health", "probe a running instance's /healthz"),
];

pub async fn dispatch(cli: Cli) -> Result<(), EdgeError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Validate(ref args)) => validate::execute(args).await,
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_usage_hints();
            Ok(())
        }
    }
}

fn print_usage_hints() {
    println!("\n  edge-relay {}\n", env!("CARGO_PKG_VERSION"));
    for (command, hint) in USAGE_HINTS {
        println!("    {command:<34}{hint}");
    }
    println!("\n  See `edge-relay --help` for every option.\n");
}
