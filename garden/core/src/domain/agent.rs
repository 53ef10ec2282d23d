// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Garden Agents
//!
//! Identity and derived state for the two agent kinds:
//!
//! - [`PlantAgent`]: needs water; hydration decays with wall-clock time.
//! - [`RobotAgent`]: delivers water; carries at most one mission.
//!
//! Neither struct is persisted. Both are rebuilt from the agent's lifecycle
//! history (`from_history`), which is how a restarted process recovers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::events::{GardenEvent, LoggedEvent};
use crate::domain::position::Position;
use crate::domain::protocol::InstanceId;

/// Hydration of a freshly watered plant, in percent.
pub const FULL_HYDRATION: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlantId(pub Uuid);

impl PlantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RobotId(pub Uuid);

impl RobotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RobotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RobotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Class of agent allowed to issue a protocol command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Plant,
    Robot,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Plant => write!(f, "plant"),
            Role::Robot => write!(f, "robot"),
        }
    }
}

/// Hydration after `elapsed_ms` without water.
///
/// `endurance_ms_per_percent` is the survival time consumed per percentage
/// point. The result is not clamped; a value `<= 0.0` means the plant died.
pub fn hydration_after(elapsed_ms: i64, endurance_ms_per_percent: f64) -> f64 {
    FULL_HYDRATION - elapsed_ms as f64 / endurance_ms_per_percent
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantAgent {
    pub id: PlantId,
    pub position: Position,
    pub last_watered_at: DateTime<Utc>,
    pub open_request_id: Option<InstanceId>,
}

/// Outcome of replaying a plant's lifecycle history.
#[derive(Debug, Clone, PartialEq)]
pub enum PlantRecovery {
    /// No `plant_created` event; the plant has never been observed.
    Fresh,
    Alive(PlantAgent),
    Dead { died_at: DateTime<Utc> },
}

impl PlantAgent {
    pub fn new(id: PlantId, position: Position, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            position,
            last_watered_at: created_at,
            open_request_id: None,
        }
    }

    pub fn hydration(&self, now: DateTime<Utc>, endurance_ms_per_percent: f64) -> f64 {
        let elapsed_ms = (now - self.last_watered_at).num_milliseconds();
        hydration_after(elapsed_ms, endurance_ms_per_percent)
    }

    /// Rebuild a plant from its lifecycle events, in log order.
    ///
    /// Events belonging to other plants, and event types that carry no
    /// lifecycle meaning, are skipped.
    pub fn from_history(id: PlantId, events: &[LoggedEvent]) -> PlantRecovery {
        let mut recovery = PlantRecovery::Fresh;
        for event in events {
            recovery = match (recovery, &event.payload) {
                (PlantRecovery::Dead { died_at }, _) => PlantRecovery::Dead { died_at },
                (_, GardenEvent::PlantDied { plant_id }) if *plant_id == id => PlantRecovery::Dead {
                    died_at: event.meta.timestamp,
                },
                (PlantRecovery::Fresh, GardenEvent::PlantCreated { plant_id, position })
                    if *plant_id == id =>
                {
                    PlantRecovery::Alive(PlantAgent::new(id, *position, event.meta.timestamp))
                }
                (PlantRecovery::Alive(plant), payload) => {
                    PlantRecovery::Alive(plant.apply_lifecycle(payload))
                }
                (other, _) => other,
            };
        }
        recovery
    }

    fn apply_lifecycle(self, payload: &GardenEvent) -> Self {
        match payload {
            GardenEvent::WaterRequested { plant_id, request_id } if *plant_id == self.id => Self {
                open_request_id: Some(*request_id),
                ..self
            },
            GardenEvent::WaterReceived { plant_id, request_id, completed_at }
                if *plant_id == self.id =>
            {
                Self {
                    last_watered_at: *completed_at,
                    open_request_id: self.open_request_id.filter(|open| open != request_id),
                    ..self
                }
            }
            GardenEvent::RequestFailed { plant_id, request_id } if *plant_id == self.id => Self {
                open_request_id: self.open_request_id.filter(|open| open != request_id),
                ..self
            },
            _ => self,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotAgent {
    pub id: RobotId,
    pub position: Position,
    pub current_mission: Option<InstanceId>,
}

impl RobotAgent {
    pub fn new(id: RobotId, position: Position) -> Self {
        Self {
            id,
            position,
            current_mission: None,
        }
    }

    /// Rebuild a robot from its lifecycle events, in log order.
    ///
    /// Returns `None` when the robot has never published `robot_created`.
    /// Position during a recovered mission comes from the mission's protocol
    /// instance, not from here.
    pub fn from_history(id: RobotId, events: &[LoggedEvent]) -> Option<RobotAgent> {
        events.iter().fold(None, |robot, event| match (robot, &event.payload) {
            (None, GardenEvent::RobotCreated { robot_id, position }) if *robot_id == id => {
                Some(RobotAgent::new(id, *position))
            }
            (Some(robot), GardenEvent::MissionStarted { robot_id, request_id }) if *robot_id == id => {
                Some(RobotAgent {
                    current_mission: Some(*request_id),
                    ..robot
                })
            }
            (Some(_), GardenEvent::RobotIdle { robot_id, position }) if *robot_id == id => {
                Some(RobotAgent::new(id, *position))
            }
            (robot, _) => robot,
        })
    }
}
