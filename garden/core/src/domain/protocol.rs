// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Protocol Instances
//!
//! A protocol is a role-gated state machine whose instance state is never
//! stored: it is derived by folding the events tagged with the instance id.
//!
//! The transition table is plain data ([`ProtocolDefinition`]) so it can be
//! exported for external conformance checking. The typed behaviour of a
//! concrete protocol (reducers and command construction) lives behind
//! [`ProtocolMachine`].
//!
//! ## Fold
//!
//! ```text
//! state = initial
//! for event in events (log order):
//!     if table has (state --event.type--> _) and reducer accepts:
//!         state = reducer(state, event)
//!     else: ignore
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use uuid::Uuid;

use crate::domain::agent::Role;
use crate::domain::events::{GardenEvent, LoggedEvent};

// ============================================================================
// Value Objects: Identifiers
// ============================================================================

/// Unique identifier of one protocol instance (the request id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Transition Table
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub source: String,
    pub target: String,
    pub command: String,
    /// Event types the command emits; the same types drive the fold.
    pub event_types: Vec<String>,
    pub role: Role,
}

impl TransitionSpec {
    pub fn new(
        source: &str,
        target: &str,
        command: &str,
        event_types: &[&str],
        role: Role,
    ) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            command: command.to_string(),
            event_types: event_types.iter().map(|t| t.to_string()).collect(),
            role,
        }
    }
}

/// Language-independent description of a protocol.
///
/// Invariants checked by [`ProtocolDefinition::validate`]:
/// - at least one state, and the initial state is one of them
/// - every transition source and target is a declared state
/// - every command name maps to exactly one transition (and so one role)
/// - no state has two transitions reacting to the same event type
/// - terminal states have no outgoing transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolDefinition {
    pub name: String,
    pub initial: String,
    pub states: Vec<String>,
    pub terminal: Vec<String>,
    pub transitions: Vec<TransitionSpec>,
}

impl ProtocolDefinition {
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.states.is_empty() {
            return Err(DefinitionError::NoStates);
        }
        let states: HashSet<&str> = self.states.iter().map(String::as_str).collect();
        if !states.contains(self.initial.as_str()) {
            return Err(DefinitionError::InitialStateNotFound(self.initial.clone()));
        }
        if let Some(unknown) = self.terminal.iter().find(|t| !states.contains(t.as_str())) {
            return Err(DefinitionError::StateNotFound(unknown.clone()));
        }

        let mut commands: HashSet<&str> = HashSet::new();
        let mut reactions: HashSet<(&str, &str)> = HashSet::new();
        for transition in &self.transitions {
            if !states.contains(transition.source.as_str()) {
                return Err(DefinitionError::StateNotFound(transition.source.clone()));
            }
            if !states.contains(transition.target.as_str()) {
                return Err(DefinitionError::TransitionTargetNotFound {
                    from_state: transition.source.clone(),
                    target: transition.target.clone(),
                });
            }
            if self.is_terminal(&transition.source) {
                return Err(DefinitionError::TerminalStateHasTransitions(
                    transition.source.clone(),
                ));
            }
            if transition.event_types.is_empty() {
                return Err(DefinitionError::NoEventTypes(transition.command.clone()));
            }
            if !commands.insert(transition.command.as_str()) {
                return Err(DefinitionError::DuplicateCommand(transition.command.clone()));
            }
            for event_type in &transition.event_types {
                if !reactions.insert((transition.source.as_str(), event_type.as_str())) {
                    return Err(DefinitionError::AmbiguousEvent {
                        state: transition.source.clone(),
                        event_type: event_type.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn is_terminal(&self, state: &str) -> bool {
        self.terminal.iter().any(|t| t == state)
    }

    pub fn transition(&self, command: &str) -> Option<&TransitionSpec> {
        self.transitions.iter().find(|t| t.command == command)
    }

    pub fn transitions_from<'a>(&'a self, state: &'a str) -> impl Iterator<Item = &'a TransitionSpec> {
        self.transitions.iter().filter(move |t| t.source == state)
    }

    /// Whether an event of `event_type` may move an instance out of `state`.
    pub fn accepts(&self, state: &str, event_type: &str) -> bool {
        self.transitions_from(state)
            .any(|t| t.event_types.iter().any(|e| e == event_type))
    }
}

// ============================================================================
// Typed Protocol Behaviour
// ============================================================================

/// Behaviour of a concrete protocol over its transition table.
///
/// Implementors supply pure reducers and command construction; folding,
/// role gating and stale-state detection are shared.
pub trait ProtocolMachine: Send + Sync + 'static {
    type State: Clone + Debug + PartialEq + Send + Sync;
    type Command: Clone + Debug + Send + Sync;

    fn definition(&self) -> &ProtocolDefinition;

    fn initial_state(&self) -> Self::State;

    fn state_name(&self, state: &Self::State) -> &'static str;

    fn command_name(&self, command: &Self::Command) -> &'static str;

    /// Next state after `event`, or `None` when the event does not apply.
    ///
    /// Only called for events whose type the table accepts from `state`.
    fn reduce(&self, state: &Self::State, event: &LoggedEvent) -> Option<Self::State>;

    /// Events `command` emits when issued against `state`.
    ///
    /// Called after the role and source state have been checked.
    fn events_for(
        &self,
        state: &Self::State,
        command: &Self::Command,
    ) -> Result<Vec<GardenEvent>, ProtocolError>;

    fn fold(&self, events: &[LoggedEvent]) -> Self::State {
        events.iter().fold(self.initial_state(), |state, event| {
            if !self
                .definition()
                .accepts(self.state_name(&state), event.payload.event_type())
            {
                return state;
            }
            self.reduce(&state, event).unwrap_or(state)
        })
    }

    /// Commands `role` may issue from `state`.
    fn legal_commands(&self, state: &Self::State, role: Role) -> Vec<&str> {
        self.definition()
            .transitions_from(self.state_name(state))
            .filter(|t| t.role == role)
            .map(|t| t.command.as_str())
            .collect()
    }

    fn is_terminal(&self, state: &Self::State) -> bool {
        self.definition().is_terminal(self.state_name(state))
    }

    /// Validate `command` for `role` against `state` and build its events.
    fn prepare(
        &self,
        state: &Self::State,
        command: &Self::Command,
        role: Role,
    ) -> Result<Vec<GardenEvent>, ProtocolError> {
        let name = self.command_name(command);
        let transition = self
            .definition()
            .transition(name)
            .ok_or_else(|| ProtocolError::UnknownCommand(name.to_string()))?;
        if transition.role != role {
            return Err(ProtocolError::RoleViolation {
                command: name.to_string(),
                required: transition.role,
                actual: role,
            });
        }
        let current = self.state_name(state);
        if transition.source != current {
            return Err(ProtocolError::StaleState {
                command: name.to_string(),
                expected: transition.source.clone(),
                actual: current.to_string(),
            });
        }
        self.events_for(state, command)
    }
}

// ============================================================================
// Domain Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("Protocol must have at least one state")]
    NoStates,

    #[error("Initial state '{0}' not found in protocol states")]
    InitialStateNotFound(String),

    #[error("State '{0}' not found in protocol")]
    StateNotFound(String),

    #[error("Transition target '{target}' not found (from state '{from_state}')")]
    TransitionTargetNotFound { from_state: String, target: String },

    #[error("Command '{0}' is declared by more than one transition")]
    DuplicateCommand(String),

    #[error("Command '{0}' emits no event types")]
    NoEventTypes(String),

    #[error("State '{state}' reacts to '{event_type}' through more than one transition")]
    AmbiguousEvent { state: String, event_type: String },

    #[error("Terminal state '{0}' has outgoing transitions")]
    TerminalStateHasTransitions(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Command '{command}' requires role {required}, issued by {actual}")]
    RoleViolation {
        command: String,
        required: Role,
        actual: Role,
    },

    #[error("Command '{command}' expects state {expected}, instance is {actual}")]
    StaleState {
        command: String,
        expected: String,
        actual: String,
    },

    #[error("Command rejected: {0}")]
    Rejected(String),

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
}
