// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `garden-core`: Event-Log Protocol Engine
//!
//! Coordination primitives for a swarm of plants and robots that share nothing
//! but an append-only, tag-addressable event log.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | positions, agents, events, tags, log contract, protocol definitions, config |
//! | [`application`] | Application | `ProtocolEngine` (fold + compare-then-act command execution) |
//! | [`infrastructure`] | Infrastructure | `InMemoryEventLog` reference log |
//!
//! ## Key Concepts
//!
//! - **Protocol instance**: one run of a declarative state machine, identified by an
//!   [`InstanceId`](domain::protocol::InstanceId). Its state is never stored; it is
//!   derived by folding every event tagged with the instance id.
//! - **Compare-then-act**: commands are validated against a fresh fold immediately
//!   before publication and dropped if the instance has moved on.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
