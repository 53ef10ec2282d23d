// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `garden-swarm`: Plant and Robot Control Loops
//!
//! Runs the agents that drive the watering protocol. Each plant and each robot
//! is an independent tokio task; they never share memory and coordinate only
//! through the event log from `garden-core`.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `PresenceMap`, `PresenceChange` |
//! | [`application`] | Application | `PlantCoordinator`, `FulfillmentAgent`, `PresenceTracker`, `Garden` |
//!
//! ## Key Concepts
//!
//! - **Structural cancellation**: every agent owns a `CancellationToken`
//!   (usually a child of the garden's) raced against each suspension point.
//! - **Optimistic re-validation**: agents never lock; every command is
//!   re-checked against a fresh fold by the protocol engine and silently
//!   dropped if the instance has moved on.
//! - **Recovery from the log**: agents rebuild their state from their own
//!   lifecycle events on start, so a restarted task resumes where it left off.

pub mod domain;
pub mod application;

pub use domain::*;
