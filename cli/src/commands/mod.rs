// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the garden CLI

pub mod config;
pub mod protocol;
pub mod run;

pub use self::config::ConfigCommand;
pub use self::protocol::ProtocolCommand;
pub use self::run::RunArgs;
