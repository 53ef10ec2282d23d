// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Garden CLI
//!
//! The `garden` binary runs a swarm of plants and robots on an in-process
//! event log and exposes the watering protocol definition.
//!
//! ## Commands
//!
//! - `garden run [--plants N] [--robots M] [--duration-secs S]` - Run the simulation
//! - `garden protocol export|check` - Protocol definition tooling
//! - `garden config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use garden_cli::commands::{self, ConfigCommand, ProtocolCommand, RunArgs};
use garden_core::config::GardenConfigManifest;

/// Garden swarm - plants and robots coordinating through an event log
#[derive(Parser)]
#[command(name = "garden")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "GARDEN_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "GARDEN_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the garden simulation
    #[command(name = "run")]
    Run(RunArgs),

    /// Watering protocol definition
    #[command(name = "protocol")]
    Protocol {
        #[command(subcommand)]
        command: ProtocolCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = cli.log_level.clone().unwrap_or_else(|| {
        GardenConfigManifest::load_or_default(cli.config.clone())
            .map(|config| config.spec.observability.log_level)
            .unwrap_or_else(|_| "info".to_string())
    });
    init_logging(&level)?;

    match cli.command {
        Some(Commands::Run(args)) => commands::run::execute(args, cli.config).await,
        Some(Commands::Protocol { command }) => commands::protocol::handle_command(command).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
