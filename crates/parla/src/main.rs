// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parla - conversation practice backend.
//!
//! This is the binary entry point: worker loops plus a few read-only
//! inspection commands.

mod query;
mod serve;

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;

/// Parla - conversation practice backend.
#[derive(Parser, Debug)]
#[command(name = "parla", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the chat and TTS workers until SIGINT/SIGTERM.
    Serve {
        /// Print the final metrics snapshot on shutdown.
        #[arg(long)]
        print_metrics: bool,
    },
    /// Show a chat job's status as JSON.
    Status {
        /// Request ID returned when the turn was submitted.
        request_id: String,
    },
    /// Show a session's sentence audio as JSON.
    Session {
        session_id: String,
    },
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validate configuration and print the effective values.
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match parla_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            parla_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve { print_metrics } => serve::run_serve(config, print_metrics).await,
        Commands::Status { request_id } => query::run_status(&config, &request_id).await,
        Commands::Session { session_id } => query::run_session(&config, &session_id).await,
        Commands::Config {
            action: ConfigCommands::Check,
        } => query::run_config_check(&config),
    };

    if let Err(e) = result.into_diagnostic() {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
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
    fn parses_status_command() {
        let cli = Cli::try_parse_from(["parla", "status", "R1"]).unwrap();
        assert!(matches!(cli.command, Commands::Status { request_id } if request_id == "R1"));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = parla_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.service.name, "parla");
    }
}
