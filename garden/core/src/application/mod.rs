// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application services over the event log.

pub mod protocol_engine;

pub use protocol_engine::{CommandOutcome, EngineError, ProtocolEngine};
