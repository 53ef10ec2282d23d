// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Garden Events
//!
//! Every payload that may appear in the log is a variant of [`GardenEvent`].
//! The serialized `type` field is the event type referenced by protocol
//! definitions; payloads this build does not know deserialize to
//! [`GardenEvent::Unknown`] and are ignored by every fold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::{PlantId, RobotId};
use crate::domain::position::Position;
use crate::domain::protocol::InstanceId;
use crate::domain::tags::TagSet;

pub mod types {
    pub const REQUEST_OPENED: &str = "request_opened";
    pub const BID_OFFERED: &str = "bid_offered";
    pub const ROBOT_ASSIGNED: &str = "robot_assigned";
    pub const BID_TIMED_OUT: &str = "bid_timed_out";
    pub const ASSIGNMENT_ACCEPTED: &str = "assignment_accepted";
    pub const ASSIGNMENT_EXPIRED: &str = "assignment_expired";
    pub const ROBOT_MOVED: &str = "robot_moved";
    pub const WATER_DELIVERED: &str = "water_delivered";
    pub const MISSION_ABANDONED: &str = "mission_abandoned";

    pub const PLANT_CREATED: &str = "plant_created";
    pub const HYDRATION_REPORTED: &str = "hydration_reported";
    pub const WATER_REQUESTED: &str = "water_requested";
    pub const WATER_RECEIVED: &str = "water_received";
    pub const REQUEST_FAILED: &str = "request_failed";
    pub const PLANT_DIED: &str = "plant_died";
    pub const ROBOT_CREATED: &str = "robot_created";
    pub const MISSION_STARTED: &str = "mission_started";
    pub const ROBOT_IDLE: &str = "robot_idle";

    pub const UNKNOWN: &str = "unknown";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GardenEvent {
    // ---- watering protocol ----
    RequestOpened {
        plant_id: PlantId,
        position: Position,
    },
    BidOffered {
        robot_id: RobotId,
        position: Position,
    },
    RobotAssigned {
        robot_id: RobotId,
    },
    BidTimedOut {
        robot_id: RobotId,
    },
    AssignmentAccepted {
        robot_id: RobotId,
        position: Position,
    },
    AssignmentExpired {
        robot_id: RobotId,
    },
    RobotMoved {
        robot_id: RobotId,
        position: Position,
    },
    WaterDelivered {
        robot_id: RobotId,
    },
    MissionAbandoned {
        robot_id: RobotId,
    },

    // ---- plant lifecycle ----
    PlantCreated {
        plant_id: PlantId,
        position: Position,
    },
    HydrationReported {
        plant_id: PlantId,
        hydration: f64,
    },
    WaterRequested {
        plant_id: PlantId,
        request_id: InstanceId,
    },
    WaterReceived {
        plant_id: PlantId,
        request_id: InstanceId,
        completed_at: DateTime<Utc>,
    },
    RequestFailed {
        plant_id: PlantId,
        request_id: InstanceId,
    },
    PlantDied {
        plant_id: PlantId,
    },

    // ---- robot lifecycle ----
    RobotCreated {
        robot_id: RobotId,
        position: Position,
    },
    MissionStarted {
        robot_id: RobotId,
        request_id: InstanceId,
    },
    RobotIdle {
        robot_id: RobotId,
        position: Position,
    },

    /// Payload of a type this build does not recognise.
    #[serde(other)]
    Unknown,
}

impl GardenEvent {
    /// Event type name, identical to the serialized `type` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            GardenEvent::RequestOpened { .. } => types::REQUEST_OPENED,
            GardenEvent::BidOffered { .. } => types::BID_OFFERED,
            GardenEvent::RobotAssigned { .. } => types::ROBOT_ASSIGNED,
            GardenEvent::BidTimedOut { .. } => types::BID_TIMED_OUT,
            GardenEvent::AssignmentAccepted { .. } => types::ASSIGNMENT_ACCEPTED,
            GardenEvent::AssignmentExpired { .. } => types::ASSIGNMENT_EXPIRED,
            GardenEvent::RobotMoved { .. } => types::ROBOT_MOVED,
            GardenEvent::WaterDelivered { .. } => types::WATER_DELIVERED,
            GardenEvent::MissionAbandoned { .. } => types::MISSION_ABANDONED,
            GardenEvent::PlantCreated { .. } => types::PLANT_CREATED,
            GardenEvent::HydrationReported { .. } => types::HYDRATION_REPORTED,
            GardenEvent::WaterRequested { .. } => types::WATER_REQUESTED,
            GardenEvent::WaterReceived { .. } => types::WATER_RECEIVED,
            GardenEvent::RequestFailed { .. } => types::REQUEST_FAILED,
            GardenEvent::PlantDied { .. } => types::PLANT_DIED,
            GardenEvent::RobotCreated { .. } => types::ROBOT_CREATED,
            GardenEvent::MissionStarted { .. } => types::MISSION_STARTED,
            GardenEvent::RobotIdle { .. } => types::ROBOT_IDLE,
            GardenEvent::Unknown => types::UNKNOWN,
        }
    }
}

/// Metadata assigned by the log on append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    /// Append position; strictly increasing within one log.
    pub offset: u64,
    /// Non-decreasing with `offset`.
    pub timestamp: DateTime<Utc>,
    pub tags: TagSet,
}

/// An event as read back from the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub payload: GardenEvent,
    pub meta: EventMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_field_matches_event_type() {
        let event = GardenEvent::BidOffered {
            robot_id: RobotId::new(),
            position: Position::new(1.0, 2.0),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
    }

    #[test]
    fn test_unrecognised_type_is_unknown() {
        let json = r#"{"type":"sprinkler_installed","zone":4}"#;
        let event: GardenEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, GardenEvent::Unknown);
        assert_eq!(event.event_type(), types::UNKNOWN);
    }
}
