// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Garden Domain Layer
//!
//! Pure domain types. The only I/O contract here is the [`log::EventLog`] trait.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`position`] | `Position` |
//! | [`agent`] | `PlantId`, `RobotId`, `Role`, `PlantAgent`, `RobotAgent` |
//! | [`events`] | `GardenEvent`, `LoggedEvent`, `EventMeta` |
//! | [`tags`] | `Tag`, `TagSet` |
//! | [`clock`] | `Clock` |
//! | [`log`] | `EventLog`, `EventQuery`, `SubscriptionItem`, `LogError` |
//! | [`protocol`] | `InstanceId`, `ProtocolDefinition`, `ProtocolMachine`, `ProtocolError` |
//! | [`watering`] | `WateringProtocol`, `WateringState`, `WateringCommand`, `BidPolicy` |
//! | [`config`] | `GardenConfigManifest` |

pub mod position;
pub mod agent;
pub mod events;
pub mod tags;
pub mod clock;
pub mod log;
pub mod protocol;
pub mod watering;
pub mod config;
