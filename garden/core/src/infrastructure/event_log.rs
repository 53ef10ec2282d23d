// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// In-Memory Event Log
//
// Reference implementation of the EventLog contract for a single process.
// Appends go to a vector under a lock and are fanned out to live subscribers
// through a tokio broadcast channel. Events are lost on restart.

use async_trait::async_trait;
use futures::future::ready;
use futures::{stream, StreamExt};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::domain::clock::Clock;
use crate::domain::events::{EventMeta, GardenEvent, LoggedEvent};
use crate::domain::log::{EventLog, EventQuery, EventStream, LogError, Order, SubscriptionItem};
use crate::domain::tags::TagSet;

pub struct InMemoryEventLog {
    events: RwLock<Vec<LoggedEvent>>,
    sender: broadcast::Sender<LoggedEvent>,
    available: AtomicBool,
    clock: Clock,
}

impl InMemoryEventLog {
    /// Create a log whose live subscribers may fall at most `capacity`
    /// events behind before they are told they lagged.
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Clock::new())
    }

    pub fn with_clock(capacity: usize, clock: Clock) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            events: RwLock::new(Vec::new()),
            sender,
            available: AtomicBool::new(true),
            clock,
        }
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Simulate an outage: while unavailable every operation fails with
    /// [`LogError::Unavailable`]. Open subscriptions are unaffected.
    pub fn set_available(&self, available: bool) {
        if !available {
            warn!("Event log marked unavailable");
        }
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn ensure_available(&self) -> Result<(), LogError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LogError::Unavailable("in-memory log is offline".to_string()))
        }
    }

    fn select(events: &[LoggedEvent], query: &EventQuery) -> Vec<LoggedEvent> {
        let matching = events.iter().filter(|e| query.matches(e));
        let limit = query.limit.unwrap_or(usize::MAX);
        match query.order {
            Order::Ascending => matching.take(limit).cloned().collect(),
            Order::Descending => matching.rev().take(limit).cloned().collect(),
        }
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn publish(&self, tags: TagSet, event: GardenEvent) -> Result<u64, LogError> {
        self.ensure_available()?;

        let mut events = self.events.write();
        let offset = events.len() as u64;
        let now = self.clock.now();
        // Timestamps never run backwards within one log.
        let timestamp = events
            .last()
            .map_or(now, |previous| previous.meta.timestamp.max(now));
        let logged = LoggedEvent {
            payload: event,
            meta: EventMeta {
                offset,
                timestamp,
                tags,
            },
        };
        events.push(logged.clone());

        // Sent under the write lock so live order equals offset order.
        if self.sender.send(logged).is_err() {
            debug!(offset, "No subscribers listening to event");
        }
        Ok(offset)
    }

    async fn query(&self, query: &EventQuery) -> Result<Vec<LoggedEvent>, LogError> {
        self.ensure_available()?;
        Ok(Self::select(&self.events.read(), query))
    }

    async fn subscribe(&self, query: EventQuery) -> Result<EventStream, LogError> {
        self.ensure_available()?;

        // Receiver and backlog are taken under the same read lock: every event
        // below `horizon` is in the backlog, every later one arrives live.
        let (receiver, backlog, horizon) = {
            let events = self.events.read();
            let receiver = self.sender.subscribe();
            (receiver, Self::select(&events, &query), events.len() as u64)
        };

        let backlog = stream::iter(
            backlog
                .into_iter()
                .map(|event| Ok(SubscriptionItem::Event(event))),
        );
        let caught_up = stream::once(ready(Ok(SubscriptionItem::CaughtUp)));
        let live = BroadcastStream::new(receiver).filter_map(move |received| {
            ready(match received {
                Ok(event) if event.meta.offset >= horizon && query.matches(&event) => {
                    Some(Ok(SubscriptionItem::Event(event)))
                }
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    warn!("Event log subscriber lagged by {} events", n);
                    Some(Err(LogError::Lagged(n)))
                }
            })
        });

        Ok(Box::pin(backlog.chain(caught_up).chain(live)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{PlantId, RobotId};
    use crate::domain::events::types;
    use crate::domain::position::Position;
    use crate::domain::tags::Tag;
    use std::time::Duration;

    fn created(plant_id: PlantId) -> GardenEvent {
        GardenEvent::PlantCreated {
            plant_id,
            position: Position::new(1.0, 2.0),
        }
    }

    #[tokio::test]
    async fn test_offsets_are_append_positions() {
        let log = InMemoryEventLog::new(16);
        let plant_id = PlantId::new();
        assert_eq!(log.publish(TagSet::new(), created(plant_id)).await.unwrap(), 0);
        assert_eq!(log.publish(TagSet::new(), created(plant_id)).await.unwrap(), 1);
        assert_eq!(log.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timestamps_are_monotone() {
        let log = InMemoryEventLog::new(16);
        for _ in 0..5 {
            log.publish(TagSet::new(), GardenEvent::Unknown).await.unwrap();
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        let events = log.query(&EventQuery::all()).await.unwrap();
        for pair in events.windows(2) {
            assert!(pair[0].meta.timestamp <= pair[1].meta.timestamp);
            assert!(pair[0].meta.offset < pair[1].meta.offset);
        }
    }

    #[tokio::test]
    async fn test_query_filters_orders_and_limits() {
        let log = InMemoryEventLog::new(16);
        let (a, b) = (PlantId::new(), PlantId::new());
        log.publish(TagSet::from([Tag::plant(a)]), created(a)).await.unwrap();
        log.publish(TagSet::from([Tag::plant(b)]), created(b)).await.unwrap();
        log.publish(TagSet::from([Tag::plant(a)]), GardenEvent::PlantDied { plant_id: a }).await.unwrap();

        let ascending = log.query(&EventQuery::tagged([Tag::plant(a)])).await.unwrap();
        assert_eq!(ascending.len(), 2);
        assert_eq!(ascending[0].meta.offset, 0);

        let last = log.last(&EventQuery::tagged([Tag::plant(a)])).await.unwrap().unwrap();
        assert_eq!(last.payload.event_type(), types::PLANT_DIED);

        let typed = log
            .query(&EventQuery::all().of_types(&[types::PLANT_CREATED]).descending().limit(1))
            .await
            .unwrap();
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[0].meta.offset, 1);
    }

    #[tokio::test]
    async fn test_subscription_replays_backlog_then_catches_up() {
        let log = InMemoryEventLog::new(16);
        let robot_id = RobotId::new();
        let tag = Tag::robot(robot_id);
        log.publish(TagSet::from([tag.clone()]), GardenEvent::RobotCreated {
            robot_id,
            position: Position::new(0.0, 0.0),
        })
        .await
        .unwrap();
        log.publish(TagSet::new(), GardenEvent::Unknown).await.unwrap();

        let mut stream = log.subscribe(EventQuery::tagged([tag.clone()])).await.unwrap();
        match stream.next().await {
            Some(Ok(SubscriptionItem::Event(event))) => assert_eq!(event.meta.offset, 0),
            other => panic!("expected backlog event, got {:?}", other),
        }
        assert!(matches!(stream.next().await, Some(Ok(SubscriptionItem::CaughtUp))));

        log.publish(TagSet::new(), GardenEvent::Unknown).await.unwrap();
        log.publish(TagSet::from([tag]), GardenEvent::RobotIdle {
            robot_id,
            position: Position::new(5.0, 5.0),
        })
        .await
        .unwrap();
        match stream.next().await {
            Some(Ok(SubscriptionItem::Event(event))) => assert_eq!(event.meta.offset, 3),
            other => panic!("expected live event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_told() {
        let log = InMemoryEventLog::new(2);
        let mut stream = log.subscribe(EventQuery::all()).await.unwrap();
        assert!(matches!(stream.next().await, Some(Ok(SubscriptionItem::CaughtUp))));
        for _ in 0..5 {
            log.publish(TagSet::new(), GardenEvent::Unknown).await.unwrap();
        }
        assert!(matches!(stream.next().await, Some(Err(LogError::Lagged(_)))));
    }

    #[tokio::test]
    async fn test_unavailable_log_rejects_operations() {
        let log = InMemoryEventLog::new(16);
        log.set_available(false);
        assert!(matches!(
            log.publish(TagSet::new(), GardenEvent::Unknown).await,
            Err(LogError::Unavailable(_))
        ));
        assert!(log.query(&EventQuery::all()).await.is_err());
        assert!(log.subscribe(EventQuery::all()).await.is_err());

        log.set_available(true);
        assert!(log.publish(TagSet::new(), GardenEvent::Unknown).await.is_ok());
    }
}
