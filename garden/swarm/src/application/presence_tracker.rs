// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Presence Tracker - background observer of agent liveness
//!
//! Reads the log once per check interval, feeds every entity tag into a
//! [`PresenceMap`] and reports agents that appear or go quiet for the window.
//! Nothing in the coordination path depends on it.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** observability of the swarm membership

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use garden_core::clock::Clock;
use garden_core::config::PresenceConfig;
use garden_core::log::{EventLog, EventQuery};
use garden_core::tags::Tag;

use crate::domain::{PresenceChange, PresenceMap};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

pub struct PresenceTracker {
    log: Arc<dyn EventLog>,
    config: PresenceConfig,
    clock: Clock,
    map: Mutex<PresenceMap>,
    /// Offset of the last event read; `None` until the first cycle.
    cursor: Mutex<Option<u64>>,
    changes: broadcast::Sender<PresenceChange>,
    shutdown_token: CancellationToken,
}

impl PresenceTracker {
    pub fn new(log: Arc<dyn EventLog>, clock: Clock, config: PresenceConfig) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            log,
            map: Mutex::new(PresenceMap::new(config.window())),
            config,
            clock,
            cursor: Mutex::new(None),
            changes,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = token;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<PresenceChange> {
        self.changes.subscribe()
    }

    /// Agents currently considered present, sorted.
    pub fn present(&self) -> Vec<Tag> {
        self.map.lock().present()
    }

    pub async fn run(&self) {
        if !self.config.enabled {
            info!("Presence tracker is disabled");
            return;
        }

        info!(
            window_secs = self.config.window_secs,
            check_interval_ms = self.config.check_interval_ms,
            "Starting presence tracker"
        );

        let mut tick = interval(self.config.check_interval());
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.check_cycle().await {
                        Ok(changes) if !changes.is_empty() => {
                            debug!(changes = changes.len(), present = self.map.lock().len(), "Presence changed");
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Presence check failed: {}", e),
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping presence tracker");
                    break;
                }
            }
        }
    }

    /// Read events since the last cycle, then expire quiet agents.
    pub async fn check_cycle(&self) -> Result<Vec<PresenceChange>> {
        let now = self.clock.now();
        let cursor = *self.cursor.lock();
        let query = match cursor {
            Some(offset) => EventQuery::all().after_offset(offset),
            None => EventQuery::all().since(now - self.config.window()),
        };
        let events = self.log.query(&query).await?;

        let mut changes = Vec::new();
        {
            let mut map = self.map.lock();
            for event in &events {
                changes.extend(map.observe_event(event));
            }
            changes.extend(map.expire(now));
        }
        if let Some(last) = events.last() {
            *self.cursor.lock() = Some(last.meta.offset);
        }

        for change in &changes {
            match change {
                PresenceChange::Appeared { agent, at } => {
                    info!(agent = %agent, %at, "Agent appeared")
                }
                PresenceChange::Departed { agent, last_seen } => {
                    info!(agent = %agent, %last_seen, "Agent departed")
                }
            }
            // No receivers is fine.
            let _ = self.changes.send(change.clone());
        }
        Ok(changes)
    }
}
