// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use garden_core::agent::{PlantId, RobotId, Role};
use garden_core::application::ProtocolEngine;
use garden_core::events::{GardenEvent, LoggedEvent};
use garden_core::infrastructure::InMemoryEventLog;
use garden_core::log::{EventLog, EventQuery};
use garden_core::position::Position;
use garden_core::protocol::InstanceId;
use garden_core::tags::{Tag, TagSet};
use garden_core::watering::{WateringProtocol, WateringState};

pub fn new_log() -> Arc<InMemoryEventLog> {
    Arc::new(InMemoryEventLog::new(16_384))
}

pub fn plant_engine(
    log: &Arc<InMemoryEventLog>,
    instance: InstanceId,
    plant_id: PlantId,
) -> ProtocolEngine<WateringProtocol> {
    ProtocolEngine::new(
        Arc::new(WateringProtocol::new()),
        log.clone(),
        instance,
        Role::Plant,
        Tag::plant(plant_id),
    )
}

pub fn robot_engine(
    log: &Arc<InMemoryEventLog>,
    instance: InstanceId,
    robot_id: RobotId,
) -> ProtocolEngine<WateringProtocol> {
    ProtocolEngine::new(
        Arc::new(WateringProtocol::new()),
        log.clone(),
        instance,
        Role::Robot,
        Tag::robot(robot_id),
    )
}

pub async fn plant_lifecycle(log: &Arc<InMemoryEventLog>, plant_id: PlantId, event: GardenEvent) {
    log.publish(
        TagSet::from([Tag::plant(plant_id), Tag::role(Role::Plant), Tag::lifecycle()]),
        event,
    )
    .await
    .unwrap();
}

pub async fn robot_lifecycle(log: &Arc<InMemoryEventLog>, robot_id: RobotId, event: GardenEvent) {
    log.publish(
        TagSet::from([Tag::robot(robot_id), Tag::role(Role::Robot), Tag::lifecycle()]),
        event,
    )
    .await
    .unwrap();
}

/// Every event of the given type, in log order.
pub async fn events_of(log: &Arc<InMemoryEventLog>, event_type: &'static str) -> Vec<LoggedEvent> {
    log.query(&EventQuery::all().of_types(&[event_type])).await.unwrap()
}

/// Poll the instance until `done` holds; paused time advances while sleeping.
pub async fn wait_for_state(
    engine: &ProtocolEngine<WateringProtocol>,
    done: impl Fn(&WateringState) -> bool,
) -> WateringState {
    for _ in 0..2_000 {
        let state = engine.current().await.unwrap();
        if done(&state) {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("instance {} never reached the expected state", engine.instance());
}

/// Poll until at least one event of `event_type` is in the log.
pub async fn wait_for_event(log: &Arc<InMemoryEventLog>, event_type: &'static str) -> LoggedEvent {
    for _ in 0..2_000 {
        if let Some(event) = events_of(log, event_type).await.into_iter().next() {
            return event;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("no {event_type} event was published");
}

pub fn at(x: f64, y: f64) -> Position {
    Position::new(x, y)
}
