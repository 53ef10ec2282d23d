// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Owned single-shot timer.
//!
//! Stored next to the state it guards and awaited inside `tokio::select!`.
//! A disarmed timer never completes, so its branch is inert until armed.

use std::time::Duration;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Default)]
pub struct OneShotTimer {
    deadline: Option<Instant>,
}

impl OneShotTimer {
    pub fn new() -> Self {
        Self { deadline: None }
    }

    /// Arm to fire after `after`. An already armed timer keeps its deadline;
    /// returns whether this call armed it.
    pub fn arm(&mut self, after: Duration) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(Instant::now() + after);
        true
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Completes once at the deadline and disarms. Cancel-safe.
    pub async fn expired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending().await,
        }
    }
}
