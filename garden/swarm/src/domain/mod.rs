// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure domain types. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`presence`] | `PresenceMap`, `PresenceChange` |

pub mod presence;

pub use presence::*;
