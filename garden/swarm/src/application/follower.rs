// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Live view of one protocol instance.
//!
//! Wraps a [`ProtocolEngine`] with its subscription and the events received so
//! far. Agents fold the buffered events to decide what to do, then issue the
//! command through the engine, which re-checks against the log.

use futures::StreamExt;
use garden_core::application::ProtocolEngine;
use garden_core::events::LoggedEvent;
use garden_core::log::{EventStream, LogError, SubscriptionItem};
use garden_core::protocol::ProtocolMachine;

/// Result of feeding one subscription item.
#[derive(Debug)]
pub(crate) enum Observed {
    /// Still replaying backlog; nothing to act on yet.
    Pending,
    /// The view changed and is caught up.
    Changed,
    /// Stream failed or ended; the view was reset and must be re-subscribed.
    Lost(Option<LogError>),
}

pub(crate) struct InstanceFollower<P: ProtocolMachine> {
    engine: ProtocolEngine<P>,
    stream: Option<EventStream>,
    events: Vec<LoggedEvent>,
    caught_up: bool,
}

impl<P: ProtocolMachine> InstanceFollower<P> {
    pub fn new(engine: ProtocolEngine<P>) -> Self {
        Self {
            engine,
            stream: None,
            events: Vec::new(),
            caught_up: false,
        }
    }

    pub fn engine(&self) -> &ProtocolEngine<P> {
        &self.engine
    }

    pub fn is_subscribed(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_caught_up(&self) -> bool {
        self.caught_up
    }

    /// Drop the current view and subscribe again from the start of the instance.
    pub async fn resubscribe(&mut self) -> Result<(), LogError> {
        self.reset();
        self.stream = Some(self.engine.subscribe().await?);
        Ok(())
    }

    /// Next subscription item; never completes while unsubscribed.
    pub async fn next(&mut self) -> Option<Result<SubscriptionItem, LogError>> {
        match self.stream.as_mut() {
            Some(stream) => stream.next().await,
            None => std::future::pending().await,
        }
    }

    pub fn observe(&mut self, item: Option<Result<SubscriptionItem, LogError>>) -> Observed {
        match item {
            Some(Ok(SubscriptionItem::Event(event))) => {
                self.events.push(event);
                if self.caught_up {
                    Observed::Changed
                } else {
                    Observed::Pending
                }
            }
            Some(Ok(SubscriptionItem::CaughtUp)) => {
                self.caught_up = true;
                Observed::Changed
            }
            Some(Err(e)) => {
                self.reset();
                Observed::Lost(Some(e))
            }
            None => {
                self.reset();
                Observed::Lost(None)
            }
        }
    }

    /// Fold of the events received so far.
    pub fn state(&self) -> P::State {
        self.engine.protocol().fold(&self.events)
    }

    /// Owned engine handle plus current fold, for use across awaits.
    pub fn snapshot(&self) -> (ProtocolEngine<P>, P::State) {
        (self.engine.clone(), self.state())
    }

    fn reset(&mut self) {
        self.stream = None;
        self.events.clear();
        self.caught_up = false;
    }
}

/// `next()` on an optional follower; pending when there is none.
pub(crate) async fn next_item<P: ProtocolMachine>(
    follower: &mut Option<InstanceFollower<P>>,
) -> Option<Result<SubscriptionItem, LogError>> {
    match follower.as_mut() {
        Some(f) => f.next().await,
        None => std::future::pending().await,
    }
}
