// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Event Log Contract
//!
//! The shared, append-only, tag-addressable log through which every agent
//! coordinates. Agents never share memory; they only publish, query and
//! subscribe.
//!
//! | Operation | Semantics |
//! |-----------|-----------|
//! | [`EventLog::publish`] | at-least-once append, returns the causal offset |
//! | [`EventLog::query`] | filtered, ordered, limited read |
//! | [`EventLog::last`] | LAST aggregation (descending, limit 1) |
//! | [`EventLog::subscribe`] | backlog, then [`SubscriptionItem::CaughtUp`], then live events |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::pin::Pin;

use crate::domain::events::{GardenEvent, LoggedEvent};
use crate::domain::tags::{Tag, TagSet};

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Event log unavailable: {0}")]
    Unavailable(String),

    #[error("Subscriber lagged by {0} events (events were dropped)")]
    Lagged(u64),

    #[error("Event log is closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

/// Predicate, ordering and limit applied to a read.
///
/// All tags must be present on an event for it to match. An empty
/// `event_types` filter is treated the same as `None`.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub tags: TagSet,
    pub event_types: Option<Vec<&'static str>>,
    pub since: Option<DateTime<Utc>>,
    pub after_offset: Option<u64>,
    pub order: Order,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn tagged(tags: impl Into<TagSet>) -> Self {
        Self {
            tags: tags.into(),
            ..Self::default()
        }
    }

    /// Query matching every event in the log.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }

    pub fn of_types(mut self, event_types: &[&'static str]) -> Self {
        self.event_types = Some(event_types.to_vec());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn after_offset(mut self, offset: u64) -> Self {
        self.after_offset = Some(offset);
        self
    }

    pub fn descending(mut self) -> Self {
        self.order = Order::Descending;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, event: &LoggedEvent) -> bool {
        if !event.meta.tags.contains_all(&self.tags) {
            return false;
        }
        if let Some(types) = self.event_types.as_ref().filter(|types| !types.is_empty()) {
            if !types.contains(&event.payload.event_type()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.meta.timestamp < since {
                return false;
            }
        }
        if let Some(after) = self.after_offset {
            if event.meta.offset <= after {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionItem {
    Event(LoggedEvent),
    /// Every event that existed when the subscription was opened has been
    /// delivered; what follows is live.
    CaughtUp,
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<SubscriptionItem, LogError>> + Send>>;

#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append `event` with `tags`; returns the offset it was stored at.
    async fn publish(&self, tags: TagSet, event: GardenEvent) -> Result<u64, LogError>;

    async fn query(&self, query: &EventQuery) -> Result<Vec<LoggedEvent>, LogError>;

    /// Subscribe to events matching `query`.
    ///
    /// Ordering and limit apply to the backlog only; live events always
    /// arrive in append order.
    async fn subscribe(&self, query: EventQuery) -> Result<EventStream, LogError>;

    /// Most recent event matching `query`.
    async fn last(&self, query: &EventQuery) -> Result<Option<LoggedEvent>, LogError> {
        let query = query.clone().descending().limit(1);
        Ok(self.query(&query).await?.into_iter().next())
    }
}
