// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Garden Supervisor
//!
//! Spawns the configured plants, robots and presence tracker as independent
//! tasks on a shared log, replaces dead plants, and summarises the run from
//! the log once everything has stopped.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use garden_core::agent::{PlantId, RobotId};
use garden_core::clock::Clock;
use garden_core::config::GardenConfigSpec;
use garden_core::events::types;
use garden_core::infrastructure::InMemoryEventLog;
use garden_core::log::{EventLog, EventQuery};

use crate::application::plant::{PlantCoordinator, PlantExit};
use crate::application::presence_tracker::PresenceTracker;
use crate::application::robot::FulfillmentAgent;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GardenSummary {
    pub plants_spawned: usize,
    pub robots_spawned: usize,
    pub plants_died: usize,
    pub deliveries: usize,
    pub failed_requests: usize,
}

enum AgentExit {
    Plant {
        id: PlantId,
        result: Result<PlantExit>,
    },
    Robot {
        id: RobotId,
        result: Result<()>,
    },
    Presence,
}

pub struct Garden {
    log: Arc<dyn EventLog>,
    clock: Clock,
    spec: GardenConfigSpec,
    shutdown_token: CancellationToken,
}

impl Garden {
    /// `clock` must be the clock the log stamps events with.
    pub fn new(log: Arc<dyn EventLog>, clock: Clock, spec: GardenConfigSpec) -> Self {
        Self {
            log,
            clock,
            spec,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Garden on a fresh in-process log sized from the simulation config.
    pub fn in_memory(spec: GardenConfigSpec) -> Self {
        let log = InMemoryEventLog::new(spec.simulation.log_capacity);
        let clock = log.clock();
        Self::new(Arc::new(log), clock, spec)
    }

    pub fn log(&self) -> Arc<dyn EventLog> {
        self.log.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Stop every agent; `run()` returns once they have exited.
    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<Result<GardenSummary>> {
        tokio::spawn(async move { self.run().await })
    }

    pub async fn run(&self) -> Result<GardenSummary> {
        let simulation = &self.spec.simulation;
        info!(
            plants = simulation.plants,
            robots = simulation.robots,
            max_distance = self.spec.max_serviceable_distance(),
            "Starting garden"
        );

        let mut tasks = JoinSet::new();
        let mut summary = GardenSummary::default();

        for _ in 0..simulation.plants {
            self.spawn_plant(&mut tasks);
            summary.plants_spawned += 1;
        }
        for _ in 0..simulation.robots {
            self.spawn_robot(&mut tasks);
            summary.robots_spawned += 1;
        }
        if self.spec.presence.enabled {
            let tracker = PresenceTracker::new(self.log.clone(), self.clock, self.spec.presence.clone())
                .with_shutdown_token(self.shutdown_token.child_token());
            tasks.spawn(async move {
                tracker.run().await;
                AgentExit::Presence
            });
        }

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok(AgentExit::Plant { id, result: Ok(PlantExit::Died { at }) }) => {
                            summary.plants_died += 1;
                            info!(plant_id = %id, died_at = %at, "Plant task ended");
                            if simulation.replace_dead_plants {
                                self.spawn_plant(&mut tasks);
                                summary.plants_spawned += 1;
                            }
                        }
                        Ok(AgentExit::Plant { id, result: Ok(exit) }) => {
                            info!(plant_id = %id, ?exit, "Plant task ended");
                        }
                        Ok(AgentExit::Plant { id, result: Err(e) }) => {
                            error!(plant_id = %id, error = %e, "Plant task failed");
                        }
                        Ok(AgentExit::Robot { id, result }) => {
                            if let Err(e) = result {
                                error!(robot_id = %id, error = %e, "Robot task failed");
                            }
                        }
                        Ok(AgentExit::Presence) => {}
                        Err(e) => error!("Agent task panicked or was aborted: {}", e),
                    }
                }
            }
        }

        self.shutdown_token.cancel();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(AgentExit::Plant { result: Ok(PlantExit::Died { .. }), .. }) => summary.plants_died += 1,
                Ok(_) => {}
                Err(e) => warn!("Agent task did not stop cleanly: {}", e),
            }
        }

        summary.deliveries = self.count(types::WATER_RECEIVED).await?;
        summary.failed_requests = self.count(types::REQUEST_FAILED).await?;
        info!(?summary, "Garden stopped");
        Ok(summary)
    }

    fn spawn_plant(&self, tasks: &mut JoinSet<AgentExit>) {
        let id = PlantId::new();
        let plant = PlantCoordinator::new(
            id,
            self.log.clone(),
            self.clock,
            self.spec.plant.clone(),
            self.spec.max_serviceable_distance(),
        )
        .with_shutdown_token(self.shutdown_token.child_token());
        tasks.spawn(async move {
            AgentExit::Plant {
                id,
                result: plant.run().await,
            }
        });
    }

    fn spawn_robot(&self, tasks: &mut JoinSet<AgentExit>) {
        let id = RobotId::new();
        let robot = FulfillmentAgent::new(id, self.log.clone(), self.clock, self.spec.robot.clone())
            .with_shutdown_token(self.shutdown_token.child_token());
        tasks.spawn(async move {
            AgentExit::Robot {
                id,
                result: robot.run().await,
            }
        });
    }

    async fn count(&self, event_type: &'static str) -> Result<usize> {
        let events = self
            .log
            .query(&EventQuery::all().of_types(&[event_type]))
            .await
            .with_context(|| format!("Failed to count {event_type} events"))?;
        Ok(events.len())
    }
}
