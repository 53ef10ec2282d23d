// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Protocol Engine Application Service
//!
//! Binds one protocol instance to the event log on behalf of one agent.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** fold an instance from the log and execute commands against it
//! - **Dependencies:** Domain (`ProtocolMachine`, `EventLog`)
//!
//! # Compare-then-act
//!
//! ```text
//! execute(command):
//!     state  = fold(query(instance tag))     // fresh, never cached
//!     events = prepare(state, command, role) // role, source state, payload checks
//!     stale?  -> Dropped (no side effect)
//!     else    -> publish each event tagged {instance, family, role, actor}
//! ```
//!
//! Publication is fire-and-append: `execute` does not wait for its own events
//! to be folded back. Callers observe the effect by re-folding.

use std::sync::Arc;

use tracing::debug;

use crate::domain::agent::Role;
use crate::domain::events::LoggedEvent;
use crate::domain::log::{EventLog, EventQuery, EventStream, LogError};
use crate::domain::protocol::{InstanceId, ProtocolError, ProtocolMachine};
use crate::domain::tags::{Tag, TagSet};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Log(#[from] LogError),

    /// Role violations and unknown commands; never a consequence of a stale view.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Result of a command that reached the engine without error.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Offsets of the appended events.
    Published(Vec<u64>),
    /// The fresh fold no longer supports the command; nothing was appended.
    Dropped(ProtocolError),
}

impl CommandOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, CommandOutcome::Published(_))
    }
}

pub struct ProtocolEngine<P: ProtocolMachine> {
    protocol: Arc<P>,
    log: Arc<dyn EventLog>,
    instance: InstanceId,
    role: Role,
    actor: Tag,
}

impl<P: ProtocolMachine> Clone for ProtocolEngine<P> {
    fn clone(&self) -> Self {
        Self {
            protocol: self.protocol.clone(),
            log: self.log.clone(),
            instance: self.instance,
            role: self.role,
            actor: self.actor.clone(),
        }
    }
}

impl<P: ProtocolMachine> ProtocolEngine<P> {
    /// `actor` is the entity tag (`plant:<id>` / `robot:<id>`) of the agent
    /// issuing commands through this engine.
    pub fn new(
        protocol: Arc<P>,
        log: Arc<dyn EventLog>,
        instance: InstanceId,
        role: Role,
        actor: Tag,
    ) -> Self {
        Self {
            protocol,
            log,
            instance,
            role,
            actor,
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn query(&self) -> EventQuery {
        EventQuery::tagged([Tag::instance(self.instance)])
    }

    pub async fn events(&self) -> Result<Vec<LoggedEvent>, LogError> {
        self.log.query(&self.query()).await
    }

    /// Fresh fold of the instance.
    pub async fn current(&self) -> Result<P::State, LogError> {
        let events = self.events().await?;
        Ok(self.protocol.fold(&events))
    }

    pub async fn legal_commands(&self) -> Result<Vec<String>, LogError> {
        let state = self.current().await?;
        Ok(self
            .protocol
            .legal_commands(&state, self.role)
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Live stream of the instance's events, backlog first.
    pub async fn subscribe(&self) -> Result<EventStream, LogError> {
        self.log.subscribe(self.query()).await
    }

    pub async fn execute(&self, command: P::Command) -> Result<CommandOutcome, EngineError> {
        let state = self.current().await?;
        let name = self.protocol.command_name(&command);

        let events = match self.protocol.prepare(&state, &command, self.role) {
            Ok(events) => events,
            Err(reason @ (ProtocolError::StaleState { .. } | ProtocolError::Rejected(_))) => {
                debug!(
                    instance = %self.instance,
                    command = name,
                    reason = %reason,
                    "Dropping command against stale state"
                );
                metrics::counter!("garden_commands_dropped_total", "command" => name).increment(1);
                return Ok(CommandOutcome::Dropped(reason));
            }
            Err(e) => return Err(e.into()),
        };

        let mut offsets = Vec::with_capacity(events.len());
        for event in events {
            let event_type = event.event_type();
            let offset = self.log.publish(self.tags(), event).await?;
            debug!(
                instance = %self.instance,
                command = name,
                event_type,
                offset,
                "Published protocol event"
            );
            metrics::counter!("garden_events_published_total", "type" => event_type).increment(1);
            offsets.push(offset);
        }
        Ok(CommandOutcome::Published(offsets))
    }

    fn tags(&self) -> TagSet {
        TagSet::from([
            Tag::instance(self.instance),
            Tag::family(&self.protocol.definition().name),
            Tag::role(self.role),
            self.actor.clone(),
        ])
    }
}
