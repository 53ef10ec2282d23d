// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Watering Protocol
//!
//! One "water this plant" negotiation between a plant and the robots.
//!
//! | Source | Target | Command | Role | Event |
//! |--------|--------|---------|------|-------|
//! | Initial | Requested | `request` | plant | `request_opened` |
//! | Requested | Requested | `offer` | robot | `bid_offered` |
//! | Requested | Assigned | `assign` | plant | `robot_assigned` |
//! | Requested | Failed | `fail` | robot | `bid_timed_out` |
//! | Assigned | Moving | `accept` | robot | `assignment_accepted` |
//! | Assigned | Failed | `fail2` | plant | `assignment_expired` |
//! | Moving | Moving | `move` | robot | `robot_moved` |
//! | Moving | Done | `done` | robot | `water_delivered` |
//! | Moving | Failed | `fail3` | robot | `mission_abandoned` |
//!
//! `Done` and `Failed` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::{PlantId, Role, RobotId};
use crate::domain::events::{types, GardenEvent, LoggedEvent};
use crate::domain::position::Position;
use crate::domain::protocol::{
    InstanceId, ProtocolDefinition, ProtocolError, ProtocolMachine, TransitionSpec,
};

/// Protocol family name; also the discovery tag suffix (`protocol:watering`).
pub const WATERING_PROTOCOL: &str = "watering";

pub type RequestId = InstanceId;

/// Remaining distance below which a moving robot counts as arrived.
pub const ARRIVAL_DISTANCE: f64 = 1.0;

pub mod states {
    pub const INITIAL: &str = "Initial";
    pub const REQUESTED: &str = "Requested";
    pub const ASSIGNED: &str = "Assigned";
    pub const MOVING: &str = "Moving";
    pub const DONE: &str = "Done";
    pub const FAILED: &str = "Failed";
}

pub mod commands {
    pub const REQUEST: &str = "request";
    pub const OFFER: &str = "offer";
    pub const ASSIGN: &str = "assign";
    pub const FAIL: &str = "fail";
    pub const ACCEPT: &str = "accept";
    pub const FAIL2: &str = "fail2";
    pub const MOVE: &str = "move";
    pub const DONE: &str = "done";
    pub const FAIL3: &str = "fail3";
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub robot_id: RobotId,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WateringState {
    Initial,
    Requested {
        plant_id: PlantId,
        position: Position,
        /// Order of first observation.
        bids: Vec<Bid>,
    },
    Assigned {
        plant_id: PlantId,
        position: Position,
        robot_id: RobotId,
    },
    Moving {
        plant_id: PlantId,
        position: Position,
        robot_id: RobotId,
        robot_position: Position,
    },
    Done {
        completed_at: DateTime<Utc>,
    },
    Failed,
}

impl WateringState {
    pub fn has_bid_from(&self, robot: RobotId) -> bool {
        matches!(self, WateringState::Requested { bids, .. } if bids.iter().any(|b| b.robot_id == robot))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WateringState::Done { .. } | WateringState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WateringCommand {
    Request { plant_id: PlantId, position: Position },
    Offer { robot_id: RobotId, position: Position },
    Assign { robot_id: RobotId },
    /// Bidding robot gives up on an unanswered offer.
    Fail { robot_id: RobotId },
    Accept { robot_id: RobotId, position: Position },
    /// Plant gives up on an assigned robot that never accepted.
    ExpireAssignment { robot_id: RobotId },
    Move { robot_id: RobotId, position: Position },
    Deliver { robot_id: RobotId },
    Abandon { robot_id: RobotId },
}

/// How a plant picks among visible bids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidPolicy {
    /// Nearest bid, only if within the maximum serviceable distance.
    #[default]
    ClosestWithinRange,
    /// Earliest bid, regardless of distance.
    FirstBid,
}

impl BidPolicy {
    /// Pick the bid to assign, or `None` to keep waiting.
    ///
    /// Ties on distance go to the bid observed first.
    pub fn select<'a>(&self, plant: &Position, bids: &'a [Bid], max_distance: f64) -> Option<&'a Bid> {
        match self {
            BidPolicy::FirstBid => bids.first(),
            BidPolicy::ClosestWithinRange => {
                let mut best: Option<(&Bid, f64)> = None;
                for bid in bids {
                    let distance = bid.position.distance_to(plant);
                    if best.is_none_or(|(_, d)| distance < d) {
                        best = Some((bid, distance));
                    }
                }
                best.filter(|(_, d)| *d <= max_distance).map(|(bid, _)| bid)
            }
        }
    }
}

impl std::str::FromStr for BidPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "closest_within_range" => Ok(BidPolicy::ClosestWithinRange),
            "first_bid" => Ok(BidPolicy::FirstBid),
            other => Err(format!("unknown bid policy '{}'", other)),
        }
    }
}

/// Hydration level below which a plant opens a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestThreshold {
    #[default]
    Quarter,
    Half,
}

impl RequestThreshold {
    pub fn percent(&self) -> f64 {
        match self {
            RequestThreshold::Quarter => 25.0,
            RequestThreshold::Half => 50.0,
        }
    }
}

impl std::str::FromStr for RequestThreshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quarter" | "25" => Ok(RequestThreshold::Quarter),
            "half" | "50" => Ok(RequestThreshold::Half),
            other => Err(format!("unknown request threshold '{}'", other)),
        }
    }
}

pub struct WateringProtocol {
    definition: ProtocolDefinition,
}

impl WateringProtocol {
    pub fn new() -> Self {
        Self {
            definition: Self::build_definition(),
        }
    }

    fn build_definition() -> ProtocolDefinition {
        use commands as c;
        use states as s;

        ProtocolDefinition {
            name: WATERING_PROTOCOL.to_string(),
            initial: s::INITIAL.to_string(),
            states: [s::INITIAL, s::REQUESTED, s::ASSIGNED, s::MOVING, s::DONE, s::FAILED]
                .iter()
                .map(|name| name.to_string())
                .collect(),
            terminal: vec![s::DONE.to_string(), s::FAILED.to_string()],
            transitions: vec![
                TransitionSpec::new(s::INITIAL, s::REQUESTED, c::REQUEST, &[types::REQUEST_OPENED], Role::Plant),
                TransitionSpec::new(s::REQUESTED, s::REQUESTED, c::OFFER, &[types::BID_OFFERED], Role::Robot),
                TransitionSpec::new(s::REQUESTED, s::ASSIGNED, c::ASSIGN, &[types::ROBOT_ASSIGNED], Role::Plant),
                TransitionSpec::new(s::REQUESTED, s::FAILED, c::FAIL, &[types::BID_TIMED_OUT], Role::Robot),
                TransitionSpec::new(s::ASSIGNED, s::MOVING, c::ACCEPT, &[types::ASSIGNMENT_ACCEPTED], Role::Robot),
                TransitionSpec::new(s::ASSIGNED, s::FAILED, c::FAIL2, &[types::ASSIGNMENT_EXPIRED], Role::Plant),
                TransitionSpec::new(s::MOVING, s::MOVING, c::MOVE, &[types::ROBOT_MOVED], Role::Robot),
                TransitionSpec::new(s::MOVING, s::DONE, c::DONE, &[types::WATER_DELIVERED], Role::Robot),
                TransitionSpec::new(s::MOVING, s::FAILED, c::FAIL3, &[types::MISSION_ABANDONED], Role::Robot),
            ],
        }
    }
}

impl Default for WateringProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolMachine for WateringProtocol {
    type State = WateringState;
    type Command = WateringCommand;

    fn definition(&self) -> &ProtocolDefinition {
        &self.definition
    }

    fn initial_state(&self) -> WateringState {
        WateringState::Initial
    }

    fn state_name(&self, state: &WateringState) -> &'static str {
        match state {
            WateringState::Initial => states::INITIAL,
            WateringState::Requested { .. } => states::REQUESTED,
            WateringState::Assigned { .. } => states::ASSIGNED,
            WateringState::Moving { .. } => states::MOVING,
            WateringState::Done { .. } => states::DONE,
            WateringState::Failed => states::FAILED,
        }
    }

    fn command_name(&self, command: &WateringCommand) -> &'static str {
        match command {
            WateringCommand::Request { .. } => commands::REQUEST,
            WateringCommand::Offer { .. } => commands::OFFER,
            WateringCommand::Assign { .. } => commands::ASSIGN,
            WateringCommand::Fail { .. } => commands::FAIL,
            WateringCommand::Accept { .. } => commands::ACCEPT,
            WateringCommand::ExpireAssignment { .. } => commands::FAIL2,
            WateringCommand::Move { .. } => commands::MOVE,
            WateringCommand::Deliver { .. } => commands::DONE,
            WateringCommand::Abandon { .. } => commands::FAIL3,
        }
    }

    fn reduce(&self, state: &WateringState, event: &LoggedEvent) -> Option<WateringState> {
        use WateringState::*;

        match (state, &event.payload) {
            (Initial, GardenEvent::RequestOpened { plant_id, position }) => Some(Requested {
                plant_id: *plant_id,
                position: *position,
                bids: Vec::new(),
            }),
            (Requested { plant_id, position, bids }, GardenEvent::BidOffered { robot_id, position: at }) => {
                if bids.iter().any(|b| b.robot_id == *robot_id) {
                    return None;
                }
                let mut bids = bids.clone();
                bids.push(Bid { robot_id: *robot_id, position: *at });
                Some(Requested { plant_id: *plant_id, position: *position, bids })
            }
            (Requested { plant_id, position, bids }, GardenEvent::RobotAssigned { robot_id })
                if bids.iter().any(|b| b.robot_id == *robot_id) =>
            {
                Some(Assigned { plant_id: *plant_id, position: *position, robot_id: *robot_id })
            }
            (Requested { bids, .. }, GardenEvent::BidTimedOut { robot_id })
                if bids.iter().any(|b| b.robot_id == *robot_id) =>
            {
                Some(Failed)
            }
            (Assigned { plant_id, position, robot_id }, GardenEvent::AssignmentAccepted { robot_id: by, position: at })
                if by == robot_id =>
            {
                Some(Moving {
                    plant_id: *plant_id,
                    position: *position,
                    robot_id: *robot_id,
                    robot_position: *at,
                })
            }
            (Assigned { robot_id, .. }, GardenEvent::AssignmentExpired { robot_id: expired })
                if expired == robot_id =>
            {
                Some(Failed)
            }
            (Moving { plant_id, position, robot_id, .. }, GardenEvent::RobotMoved { robot_id: by, position: at })
                if by == robot_id =>
            {
                Some(Moving {
                    plant_id: *plant_id,
                    position: *position,
                    robot_id: *robot_id,
                    robot_position: *at,
                })
            }
            (Moving { robot_id, .. }, GardenEvent::WaterDelivered { robot_id: by }) if by == robot_id => {
                Some(Done { completed_at: event.meta.timestamp })
            }
            (Moving { robot_id, .. }, GardenEvent::MissionAbandoned { robot_id: by }) if by == robot_id => {
                Some(Failed)
            }
            _ => None,
        }
    }

    fn events_for(
        &self,
        state: &WateringState,
        command: &WateringCommand,
    ) -> Result<Vec<GardenEvent>, ProtocolError> {
        use WateringCommand as C;
        use WateringState as S;

        let event = match (state, command) {
            (S::Initial, C::Request { plant_id, position }) => GardenEvent::RequestOpened {
                plant_id: *plant_id,
                position: *position,
            },
            (S::Requested { bids, .. }, C::Offer { robot_id, position }) => {
                if bids.iter().any(|b| b.robot_id == *robot_id) {
                    return Err(ProtocolError::Rejected(format!("robot {} already bid", robot_id)));
                }
                GardenEvent::BidOffered { robot_id: *robot_id, position: *position }
            }
            (S::Requested { bids, .. }, C::Assign { robot_id }) => {
                require_bidder(bids, *robot_id)?;
                GardenEvent::RobotAssigned { robot_id: *robot_id }
            }
            (S::Requested { bids, .. }, C::Fail { robot_id }) => {
                require_bidder(bids, *robot_id)?;
                GardenEvent::BidTimedOut { robot_id: *robot_id }
            }
            (S::Assigned { robot_id: assigned, .. }, C::Accept { robot_id, position }) => {
                require_same(*assigned, *robot_id)?;
                GardenEvent::AssignmentAccepted { robot_id: *robot_id, position: *position }
            }
            (S::Assigned { robot_id: assigned, .. }, C::ExpireAssignment { robot_id }) => {
                require_same(*assigned, *robot_id)?;
                GardenEvent::AssignmentExpired { robot_id: *robot_id }
            }
            (S::Moving { robot_id: mover, .. }, C::Move { robot_id, position }) => {
                require_same(*mover, *robot_id)?;
                GardenEvent::RobotMoved { robot_id: *robot_id, position: *position }
            }
            (S::Moving { robot_id: mover, .. }, C::Deliver { robot_id }) => {
                require_same(*mover, *robot_id)?;
                GardenEvent::WaterDelivered { robot_id: *robot_id }
            }
            (S::Moving { robot_id: mover, .. }, C::Abandon { robot_id }) => {
                require_same(*mover, *robot_id)?;
                GardenEvent::MissionAbandoned { robot_id: *robot_id }
            }
            (state, command) => {
                return Err(ProtocolError::Rejected(format!(
                    "{} not applicable in {}",
                    self.command_name(command),
                    self.state_name(state)
                )))
            }
        };
        Ok(vec![event])
    }
}

fn require_bidder(bids: &[Bid], robot_id: RobotId) -> Result<(), ProtocolError> {
    if bids.iter().any(|b| b.robot_id == robot_id) {
        Ok(())
    } else {
        Err(ProtocolError::Rejected(format!("robot {} has no visible bid", robot_id)))
    }
}

fn require_same(expected: RobotId, actual: RobotId) -> Result<(), ProtocolError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ProtocolError::Rejected(format!(
            "instance belongs to robot {}, not {}",
            expected, actual
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::EventMeta;
    use crate::domain::tags::TagSet;

    fn log(events: Vec<GardenEvent>) -> Vec<LoggedEvent> {
        let start = Utc::now();
        events
            .into_iter()
            .enumerate()
            .map(|(i, payload)| LoggedEvent {
                payload,
                meta: EventMeta {
                    offset: i as u64,
                    timestamp: start + chrono::TimeDelta::milliseconds(i as i64),
                    tags: TagSet::new(),
                },
            })
            .collect()
    }

    fn opened(plant_id: PlantId) -> GardenEvent {
        GardenEvent::RequestOpened { plant_id, position: Position::new(100.0, 100.0) }
    }

    fn bid(robot_id: RobotId, x: f64) -> GardenEvent {
        GardenEvent::BidOffered { robot_id, position: Position::new(x, 100.0) }
    }

    #[test]
    fn test_definition_is_valid() {
        let protocol = WateringProtocol::new();
        protocol.definition().validate().unwrap();
        assert_eq!(protocol.definition().transitions.len(), 9);
    }

    #[test]
    fn test_bid_list_ignores_duplicates_and_keeps_order() {
        let protocol = WateringProtocol::new();
        let (a, b) = (RobotId::new(), RobotId::new());
        let events = log(vec![opened(PlantId::new()), bid(a, 50.0), bid(b, 90.0), bid(a, 95.0)]);

        match protocol.fold(&events) {
            WateringState::Requested { bids, .. } => {
                assert_eq!(bids.len(), 2);
                assert_eq!(bids[0].robot_id, a);
                assert_eq!(bids[0].position, Position::new(50.0, 100.0));
                assert_eq!(bids[1].robot_id, b);
            }
            other => panic!("expected Requested, got {:?}", other),
        }
    }

    #[test]
    fn test_fold_is_deterministic_for_same_prefix() {
        let protocol = WateringProtocol::new();
        let (a, b) = (RobotId::new(), RobotId::new());
        let events = log(vec![opened(PlantId::new()), bid(b, 10.0), bid(a, 20.0)]);
        assert_eq!(protocol.fold(&events), protocol.fold(&events.clone()));
    }

    #[test]
    fn test_assign_requires_visible_bid() {
        let protocol = WateringProtocol::new();
        let (a, stranger) = (RobotId::new(), RobotId::new());
        let events = log(vec![
            opened(PlantId::new()),
            bid(a, 10.0),
            GardenEvent::RobotAssigned { robot_id: stranger },
        ]);
        assert!(matches!(protocol.fold(&events), WateringState::Requested { .. }));

        let state = protocol.fold(&events);
        let result = protocol.prepare(&state, &WateringCommand::Assign { robot_id: stranger }, Role::Plant);
        assert!(matches!(result, Err(ProtocolError::Rejected(_))));
    }

    #[test]
    fn test_full_delivery_fold() {
        let protocol = WateringProtocol::new();
        let plant = PlantId::new();
        let robot = RobotId::new();
        let events = log(vec![
            opened(plant),
            bid(robot, 60.0),
            GardenEvent::RobotAssigned { robot_id: robot },
            GardenEvent::AssignmentAccepted { robot_id: robot, position: Position::new(60.0, 100.0) },
            GardenEvent::RobotMoved { robot_id: robot, position: Position::new(70.0, 100.0) },
            GardenEvent::WaterDelivered { robot_id: robot },
        ]);
        assert_eq!(
            protocol.fold(&events[..5]),
            WateringState::Moving {
                plant_id: plant,
                position: Position::new(100.0, 100.0),
                robot_id: robot,
                robot_position: Position::new(70.0, 100.0),
            }
        );
        assert_eq!(
            protocol.fold(&events),
            WateringState::Done { completed_at: events[5].meta.timestamp }
        );
    }

    #[test]
    fn test_terminal_states_ignore_further_events() {
        let protocol = WateringProtocol::new();
        let robot = RobotId::new();
        let events = log(vec![
            opened(PlantId::new()),
            bid(robot, 10.0),
            GardenEvent::BidTimedOut { robot_id: robot },
            GardenEvent::RobotAssigned { robot_id: robot },
            opened(PlantId::new()),
        ]);
        assert_eq!(protocol.fold(&events), WateringState::Failed);
    }

    #[test]
    fn test_unknown_and_unrelated_events_are_ignored() {
        let protocol = WateringProtocol::new();
        let events = log(vec![
            GardenEvent::Unknown,
            GardenEvent::PlantDied { plant_id: PlantId::new() },
            opened(PlantId::new()),
            GardenEvent::Unknown,
        ]);
        assert!(matches!(protocol.fold(&events), WateringState::Requested { .. }));
    }

    #[test]
    fn test_legal_commands_by_role() {
        let protocol = WateringProtocol::new();
        let state = protocol.fold(&log(vec![opened(PlantId::new())]));

        let mut robot = protocol.legal_commands(&state, Role::Robot);
        robot.sort();
        assert_eq!(robot, vec![commands::FAIL, commands::OFFER]);
        assert_eq!(protocol.legal_commands(&state, Role::Plant), vec![commands::ASSIGN]);
        assert!(protocol.legal_commands(&WateringState::Failed, Role::Robot).is_empty());
    }

    #[test]
    fn test_prepare_checks_role_then_state() {
        let protocol = WateringProtocol::new();
        let robot = RobotId::new();

        let wrong_role = protocol.prepare(
            &WateringState::Initial,
            &WateringCommand::Offer { robot_id: robot, position: Position::new(0.0, 0.0) },
            Role::Plant,
        );
        assert!(matches!(wrong_role, Err(ProtocolError::RoleViolation { .. })));

        let stale = protocol.prepare(
            &WateringState::Failed,
            &WateringCommand::Offer { robot_id: robot, position: Position::new(0.0, 0.0) },
            Role::Robot,
        );
        assert!(matches!(stale, Err(ProtocolError::StaleState { .. })));
    }

    #[test]
    fn test_closest_within_range() {
        let plant = Position::new(100.0, 100.0);
        let (far, near) = (RobotId::new(), RobotId::new());
        let bids = vec![
            Bid { robot_id: far, position: Position::new(130.0, 100.0) },
            Bid { robot_id: near, position: Position::new(90.0, 100.0) },
        ];
        let chosen = BidPolicy::ClosestWithinRange.select(&plant, &bids, 1000.0).unwrap();
        assert_eq!(chosen.robot_id, near);

        assert!(BidPolicy::ClosestWithinRange.select(&plant, &bids, 5.0).is_none());
        assert_eq!(BidPolicy::FirstBid.select(&plant, &bids, 5.0).unwrap().robot_id, far);
    }

    #[test]
    fn test_distance_tie_goes_to_first_seen() {
        let plant = Position::new(100.0, 100.0);
        let (first, second) = (RobotId::new(), RobotId::new());
        let bids = vec![
            Bid { robot_id: first, position: Position::new(110.0, 100.0) },
            Bid { robot_id: second, position: Position::new(90.0, 100.0) },
        ];
        let chosen = BidPolicy::ClosestWithinRange.select(&plant, &bids, 1000.0).unwrap();
        assert_eq!(chosen.robot_id, first);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("first_bid".parse::<BidPolicy>().unwrap(), BidPolicy::FirstBid);
        assert_eq!("half".parse::<RequestThreshold>().unwrap().percent(), 50.0);
        assert!("nearest".parse::<BidPolicy>().is_err());
    }
}
