// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Watering protocol driven through the engine against a shared log.

use std::sync::Arc;

use futures::StreamExt;
use garden_core::application::{CommandOutcome, ProtocolEngine};
use garden_core::agent::{PlantId, Role, RobotId};
use garden_core::infrastructure::InMemoryEventLog;
use garden_core::log::{EventLog, EventQuery, SubscriptionItem};
use garden_core::position::Position;
use garden_core::protocol::{InstanceId, ProtocolMachine};
use garden_core::tags::Tag;
use garden_core::watering::{WateringCommand, WateringProtocol, WateringState, WATERING_PROTOCOL};

fn engine(
    log: &Arc<InMemoryEventLog>,
    instance: InstanceId,
    role: Role,
    actor: Tag,
) -> ProtocolEngine<WateringProtocol> {
    ProtocolEngine::new(
        Arc::new(WateringProtocol::new()),
        log.clone(),
        instance,
        role,
        actor,
    )
}

#[tokio::test]
async fn concurrent_offers_fold_identically_for_every_observer() {
    let log = Arc::new(InMemoryEventLog::new(256));
    let instance = InstanceId::new();
    let plant_id = PlantId::new();
    let plant = engine(&log, instance, Role::Plant, Tag::plant(plant_id));
    plant
        .execute(WateringCommand::Request { plant_id, position: Position::new(500.0, 500.0) })
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let log = log.clone();
        handles.push(tokio::spawn(async move {
            let robot_id = RobotId::new();
            let robot = engine(&log, instance, Role::Robot, Tag::robot(robot_id));
            let position = Position::new(10.0 * i as f64, 0.0);
            // Redelivery: every robot offers twice.
            for _ in 0..2 {
                robot
                    .execute(WateringCommand::Offer { robot_id, position })
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let observer = engine(&log, instance, Role::Robot, Tag::robot(RobotId::new()));
    let from_plant = plant.current().await.unwrap();
    let from_observer = observer.current().await.unwrap();
    assert_eq!(from_plant, from_observer);
    match from_plant {
        WateringState::Requested { bids, .. } => assert_eq!(bids.len(), 16),
        other => panic!("expected Requested, got {:?}", other),
    }
}

#[tokio::test]
async fn subscription_fold_matches_query_fold() {
    let log = Arc::new(InMemoryEventLog::new(256));
    let instance = InstanceId::new();
    let plant_id = PlantId::new();
    let robot_id = RobotId::new();
    let plant = engine(&log, instance, Role::Plant, Tag::plant(plant_id));
    let robot = engine(&log, instance, Role::Robot, Tag::robot(robot_id));

    plant
        .execute(WateringCommand::Request { plant_id, position: Position::new(20.0, 0.0) })
        .await
        .unwrap();
    let mut stream = plant.subscribe().await.unwrap();

    robot
        .execute(WateringCommand::Offer { robot_id, position: Position::new(0.0, 0.0) })
        .await
        .unwrap();
    plant.execute(WateringCommand::Assign { robot_id }).await.unwrap();
    robot
        .execute(WateringCommand::Accept { robot_id, position: Position::new(0.0, 0.0) })
        .await
        .unwrap();
    robot
        .execute(WateringCommand::Move { robot_id, position: Position::new(10.0, 0.0) })
        .await
        .unwrap();
    robot
        .execute(WateringCommand::Move { robot_id, position: Position::new(20.0, 0.0) })
        .await
        .unwrap();
    let outcome = robot.execute(WateringCommand::Deliver { robot_id }).await.unwrap();
    assert!(matches!(outcome, CommandOutcome::Published(ref offsets) if offsets.len() == 1));

    let protocol = WateringProtocol::new();
    let mut seen = Vec::new();
    while let Some(item) = stream.next().await {
        match item.unwrap() {
            SubscriptionItem::Event(event) => seen.push(event),
            SubscriptionItem::CaughtUp => continue,
        }
        if protocol.fold(&seen).is_terminal() {
            break;
        }
    }

    let folded = plant.current().await.unwrap();
    assert!(matches!(folded, WateringState::Done { .. }));
    assert_eq!(protocol.fold(&seen), folded);
}

#[tokio::test]
async fn open_requests_are_discoverable_by_family_tag() {
    let log = Arc::new(InMemoryEventLog::new(64));
    for _ in 0..3 {
        let plant_id = PlantId::new();
        engine(&log, InstanceId::new(), Role::Plant, Tag::plant(plant_id))
            .execute(WateringCommand::Request { plant_id, position: Position::new(1.0, 1.0) })
            .await
            .unwrap();
    }

    let opened = log
        .query(&EventQuery::tagged([Tag::family(WATERING_PROTOCOL)]).of_types(&["request_opened"]))
        .await
        .unwrap();
    assert_eq!(opened.len(), 3);
}
