// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use garden_core::config::GardenConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output path (default: ./garden-config.yaml)
        #[arg(short, long, default_value = "./garden-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output } => generate(&output),
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = GardenConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. GARDEN_CONFIG_PATH: {}",
            std::env::var("GARDEN_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./garden-config.yaml");
        println!("  4. ~/.garden/config.yaml");
        println!("  5. /etc/garden/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Plants:".bold());
    println!("  Endurance: {} ms per percent", spec.plant.endurance_ms_per_percent);
    println!("  Hydration tick: {} ms", spec.plant.hydration_tick_ms);
    println!("  Request threshold: {}%", spec.plant.request_threshold.percent());
    println!("  Bid policy: {:?}", spec.plant.bid_policy);
    println!("  Assignment timeout: {} ms", spec.plant.assignment_timeout_ms);
    println!("  Max serviceable distance: {:.1}", spec.max_serviceable_distance());
    println!();

    println!("{}", "Robots:".bold());
    println!("  Velocity: {} per {} ms", spec.robot.velocity, spec.robot.movement_tick_ms);
    println!("  Bid timeout: {} ms", spec.robot.bid_timeout_ms);
    println!("  Scan interval: {} ms", spec.robot.scan_interval_ms);
    println!("  Discovery window: {} s", spec.robot.discovery_window_secs);
    println!();

    println!("{}", "Simulation:".bold());
    println!("  Plants: {}", spec.simulation.plants);
    println!("  Robots: {}", spec.simulation.robots);
    println!("  Replace dead plants: {}", spec.simulation.replace_dead_plants);
    println!(
        "  Presence tracking: {}",
        if spec.presence.enabled { "enabled" } else { "disabled" }
    );
    match spec.observability.metrics_port {
        Some(port) => println!("  Metrics port: {}", port),
        None => println!("  Metrics port: {}", "(disabled)".dimmed()),
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GardenConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: &Path) -> Result<()> {
    GardenConfigManifest::default()
        .to_yaml_file(output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_config_loads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garden-config.yaml");
        generate(&path).unwrap();

        let loaded = GardenConfigManifest::from_yaml_file(&path).unwrap();
        loaded.validate().unwrap();
        assert_eq!(loaded.spec.simulation.plants, 3);
    }
}
