// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Application Layer
//!
//! Long-running agent tasks. Each owns its timers and a cancellation token
//! and talks to other agents only through the event log.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`plant`] | `PlantCoordinator`, `PlantExit` |
//! | [`robot`] | `FulfillmentAgent`, `MissionOutcome` |
//! | [`presence_tracker`] | `PresenceTracker` |
//! | [`garden`] | `Garden`, `GardenSummary` |
//! | [`timer`] | `OneShotTimer` |

mod follower;
pub mod garden;
pub mod plant;
pub mod presence_tracker;
pub mod robot;
pub mod timer;

pub use garden::{Garden, GardenSummary};
pub use plant::{PlantCoordinator, PlantExit};
pub use presence_tracker::PresenceTracker;
pub use robot::{FulfillmentAgent, MissionOutcome};
pub use timer::OneShotTimer;
