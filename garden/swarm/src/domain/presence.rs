// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Peer Presence
//!
//! [`PresenceMap`] remembers when each agent was last seen in the log and
//! reports appearance and departure. Agents are identified by their entity
//! tag (`plant:<id>` or `robot:<id>`).
//!
//! Purely observational: nothing in the coordination path reads it.

use chrono::{DateTime, TimeDelta, Utc};
use garden_core::events::LoggedEvent;
use garden_core::tags::Tag;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum PresenceChange {
    Appeared { agent: Tag, at: DateTime<Utc> },
    Departed { agent: Tag, last_seen: DateTime<Utc> },
}

#[derive(Debug, Clone)]
pub struct PresenceMap {
    last_seen: HashMap<Tag, DateTime<Utc>>,
    window: TimeDelta,
}

impl PresenceMap {
    /// Agents unseen for `window` are reported as departed.
    pub fn new(window: TimeDelta) -> Self {
        Self {
            last_seen: HashMap::new(),
            window,
        }
    }

    /// Record a sighting; returns `Appeared` on first observation.
    pub fn observe(&mut self, agent: Tag, at: DateTime<Utc>) -> Option<PresenceChange> {
        match self.last_seen.get_mut(&agent) {
            Some(seen) => {
                *seen = (*seen).max(at);
                None
            }
            None => {
                self.last_seen.insert(agent.clone(), at);
                Some(PresenceChange::Appeared { agent, at })
            }
        }
    }

    /// Record every entity tag carried by `event`.
    pub fn observe_event(&mut self, event: &LoggedEvent) -> Vec<PresenceChange> {
        event
            .meta
            .tags
            .iter()
            .filter(|tag| tag.is_entity())
            .filter_map(|tag| self.observe(tag.clone(), event.meta.timestamp))
            .collect()
    }

    /// Forget agents unseen for at least the window as of `now`.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<PresenceChange> {
        let window = self.window;
        let mut expired: Vec<(Tag, DateTime<Utc>)> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now - **seen >= window)
            .map(|(agent, seen)| (agent.clone(), *seen))
            .collect();
        expired.sort();
        expired
            .into_iter()
            .map(|(agent, last_seen)| {
                self.last_seen.remove(&agent);
                PresenceChange::Departed { agent, last_seen }
            })
            .collect()
    }

    pub fn present(&self) -> Vec<Tag> {
        let mut agents: Vec<Tag> = self.last_seen.keys().cloned().collect();
        agents.sort();
        agents
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garden_core::agent::{PlantId, RobotId};
    use garden_core::events::{EventMeta, GardenEvent};
    use garden_core::tags::TagSet;

    #[test]
    fn test_first_sighting_appears_once() {
        let mut map = PresenceMap::new(TimeDelta::seconds(60));
        let robot = Tag::robot(RobotId::new());
        let t0 = Utc::now();

        assert!(matches!(
            map.observe(robot.clone(), t0),
            Some(PresenceChange::Appeared { .. })
        ));
        assert_eq!(map.observe(robot.clone(), t0 + TimeDelta::seconds(5)), None);
        assert_eq!(map.present(), vec![robot]);
    }

    #[test]
    fn test_departure_after_window() {
        let mut map = PresenceMap::new(TimeDelta::seconds(60));
        let plant = Tag::plant(PlantId::new());
        let t0 = Utc::now();
        map.observe(plant.clone(), t0);
        map.observe(plant.clone(), t0 + TimeDelta::seconds(10));

        assert!(map.expire(t0 + TimeDelta::seconds(69)).is_empty());
        let departed = map.expire(t0 + TimeDelta::seconds(70));
        assert_eq!(
            departed,
            vec![PresenceChange::Departed {
                agent: plant,
                last_seen: t0 + TimeDelta::seconds(10)
            }]
        );
        assert!(map.is_empty());
    }

    #[test]
    fn test_only_entity_tags_count() {
        let mut map = PresenceMap::new(TimeDelta::seconds(60));
        let plant_id = PlantId::new();
        let event = LoggedEvent {
            payload: GardenEvent::PlantDied { plant_id },
            meta: EventMeta {
                offset: 0,
                timestamp: Utc::now(),
                tags: TagSet::from([Tag::plant(plant_id), Tag::lifecycle()]),
            },
        };
        let changes = map.observe_event(&event);
        assert_eq!(changes.len(), 1);
        assert_eq!(map.len(), 1);
    }
}
