// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Event Addressing Tags
//!
//! Every event in the log carries a set of tags. Queries and subscriptions
//! select events whose tag set contains all requested tags.
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | `request:<uuid>` | protocol instance |
//! | `protocol:<name>` | protocol family (discovery of open requests) |
//! | `role:plant`, `role:robot` | role of the publishing agent |
//! | `plant:<uuid>`, `robot:<uuid>` | entity |
//! | `lifecycle` | agent lifecycle marker |
//! | `hydration` | periodic hydration report |

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::agent::{PlantId, Role, RobotId};
use crate::domain::protocol::InstanceId;

const INSTANCE_PREFIX: &str = "request:";
const PLANT_PREFIX: &str = "plant:";
const ROBOT_PREFIX: &str = "robot:";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag(String);

impl Tag {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn instance(id: InstanceId) -> Self {
        Self(format!("{}{}", INSTANCE_PREFIX, id))
    }

    pub fn family(protocol: &str) -> Self {
        Self(format!("protocol:{}", protocol))
    }

    pub fn role(role: Role) -> Self {
        Self(format!("role:{}", role))
    }

    pub fn plant(id: PlantId) -> Self {
        Self(format!("{}{}", PLANT_PREFIX, id))
    }

    pub fn robot(id: RobotId) -> Self {
        Self(format!("{}{}", ROBOT_PREFIX, id))
    }

    pub fn lifecycle() -> Self {
        Self("lifecycle".to_string())
    }

    pub fn hydration() -> Self {
        Self("hydration".to_string())
    }

    /// Instance id carried by a `request:<uuid>` tag.
    pub fn as_instance(&self) -> Option<InstanceId> {
        self.0
            .strip_prefix(INSTANCE_PREFIX)
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .map(InstanceId)
    }

    /// Whether this tag names a plant or robot entity.
    pub fn is_entity(&self) -> bool {
        self.0.starts_with(PLANT_PREFIX) || self.0.starts_with(ROBOT_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered set of tags attached to a logged event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet(BTreeSet<Tag>);

impl TagSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn with(mut self, tag: Tag) -> Self {
        self.0.insert(tag);
        self
    }

    pub fn insert(&mut self, tag: Tag) {
        self.0.insert(tag);
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.0.contains(tag)
    }

    /// True when every tag of `required` is present in `self`.
    pub fn contains_all(&self, required: &TagSet) -> bool {
        required.0.is_subset(&self.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First protocol instance id among the tags.
    pub fn instance(&self) -> Option<InstanceId> {
        self.0.iter().find_map(Tag::as_instance)
    }
}

impl<const N: usize> From<[Tag; N]> for TagSet {
    fn from(tags: [Tag; N]) -> Self {
        Self(tags.into_iter().collect())
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
