// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Simulation runner
//!
//! Builds a [`Garden`] on an in-memory log from the loaded configuration and
//! runs it until the duration elapses, Ctrl-C is pressed, or every agent has
//! stopped.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use garden_core::config::GardenConfigManifest;
use garden_swarm::application::{Garden, GardenSummary};

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Number of plants (overrides spec.simulation.plants)
    #[arg(long)]
    pub plants: Option<usize>,

    /// Number of robots (overrides spec.simulation.robots)
    #[arg(long)]
    pub robots: Option<usize>,

    /// Stop after this many seconds (default: run until Ctrl-C)
    #[arg(long, value_name = "SECS")]
    pub duration_secs: Option<u64>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: RunArgs, config_override: Option<PathBuf>) -> Result<()> {
    let mut config = GardenConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    apply_args(&mut config, &args);
    config
        .validate()
        .context("Configuration validation failed")?;

    if let Some(port) = config.spec.observability.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(port, "Prometheus metrics exporter listening");
    }

    let simulation = &config.spec.simulation;
    println!(
        "{}",
        format!(
            "Starting garden: {} plants, {} robots (Ctrl-C to stop)",
            simulation.plants, simulation.robots
        )
        .bold()
    );

    let garden = Arc::new(Garden::in_memory(config.spec.clone()));
    let mut handle = garden.clone().start();

    let deadline = async {
        match args.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };

    let finished = tokio::select! {
        joined = &mut handle => Some(joined),
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, stopping garden");
            None
        }
        _ = deadline => {
            info!("Run duration elapsed, stopping garden");
            None
        }
    };
    let joined = match finished {
        Some(joined) => joined,
        None => {
            garden.shutdown();
            handle.await
        }
    };
    let summary = joined.context("Garden task panicked")??;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn apply_args(config: &mut GardenConfigManifest, args: &RunArgs) {
    if let Some(plants) = args.plants {
        config.spec.simulation.plants = plants;
    }
    if let Some(robots) = args.robots {
        config.spec.simulation.robots = robots;
    }
}

fn print_summary(summary: &GardenSummary) {
    println!();
    println!("{}", "Garden summary:".bold());
    println!("  Plants spawned:  {}", summary.plants_spawned);
    println!("  Robots spawned:  {}", summary.robots_spawned);
    println!("  Deliveries:      {}", summary.deliveries.to_string().green());
    println!("  Failed requests: {}", summary.failed_requests.to_string().yellow());
    println!("  Plants died:     {}", summary.plants_died.to_string().red());
}
