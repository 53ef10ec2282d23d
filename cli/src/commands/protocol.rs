// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Protocol definition commands
//!
//! Commands: export, check

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use garden_core::protocol::{ProtocolDefinition, ProtocolMachine};
use garden_core::watering::WateringProtocol;

#[derive(Subcommand)]
pub enum ProtocolCommand {
    /// Print the watering protocol definition as JSON
    Export {
        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Run structural validation on the definition
    Check,
}

pub async fn handle_command(command: ProtocolCommand) -> Result<()> {
    let protocol = WateringProtocol::new();
    match command {
        ProtocolCommand::Export { pretty } => {
            println!("{}", export_json(protocol.definition(), pretty)?);
            Ok(())
        }
        ProtocolCommand::Check => check(protocol.definition()),
    }
}

pub fn export_json(definition: &ProtocolDefinition, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(definition)
    } else {
        serde_json::to_string(definition)
    };
    json.context("Failed to serialize protocol definition")
}

fn check(definition: &ProtocolDefinition) -> Result<()> {
    println!("Checking protocol '{}'...", definition.name.bold());
    definition
        .validate()
        .with_context(|| format!("Protocol '{}' is invalid", definition.name))?;

    for transition in &definition.transitions {
        println!(
            "  {:<10} → {:<10} {:<7} ({}) [{}]",
            transition.source,
            transition.target,
            transition.command.bold(),
            transition.role,
            transition.event_types.join(", ")
        );
    }
    println!(
        "{}",
        format!(
            "✓ {} states, {} transitions, terminal: {}",
            definition.states.len(),
            definition.transitions.len(),
            definition.terminal.join(", ")
        )
        .green()
    );
    Ok(())
}
