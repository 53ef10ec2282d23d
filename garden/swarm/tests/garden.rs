// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Plants and robots running together on one log.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use common::*;
use garden_core::agent::{PlantId, RobotId};
use garden_core::config::{GardenConfigSpec, PlantConfig, PresenceConfig, RobotConfig};
use garden_core::events::{types, GardenEvent};
use garden_core::log::{EventLog, EventQuery};
use garden_core::tags::Tag;
use garden_core::watering::RequestThreshold;
use garden_swarm::application::{FulfillmentAgent, Garden, PlantCoordinator, PresenceTracker};
use garden_swarm::domain::PresenceChange;

fn eager_plant() -> PlantConfig {
    PlantConfig {
        request_threshold: RequestThreshold::Half,
        ..PlantConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn robot_waters_a_thirsty_plant() {
    let log = new_log();
    let clock = log.clock();
    let plant_id = PlantId::new();
    let robot_id = RobotId::new();

    let plant = PlantCoordinator::new(plant_id, log.clone(), clock, eager_plant(), 400.0)
        .with_initial_position(at(50.0, 50.0));
    let robot = FulfillmentAgent::new(robot_id, log.clone(), clock, RobotConfig::default())
        .with_initial_position(at(60.0, 50.0));
    let (plant_token, robot_token) = (plant.shutdown_token(), robot.shutdown_token());
    let plant_handle = plant.start();
    let robot_handle = robot.start();

    let received = wait_for_event(&log, types::WATER_RECEIVED).await;
    let GardenEvent::WaterReceived { request_id, completed_at, .. } = received.payload else {
        panic!("unexpected payload");
    };
    let delivered = events_of(&log, types::WATER_DELIVERED).await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].meta.tags.instance(), Some(request_id));
    assert_eq!(delivered[0].meta.timestamp, completed_at);

    // Hydration restarts from full at the completion time.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let after: Vec<f64> = log
        .query(&EventQuery::tagged([Tag::plant(plant_id), Tag::hydration()]).since(completed_at))
        .await
        .unwrap()
        .into_iter()
        .filter_map(|e| match e.payload {
            GardenEvent::HydrationReported { hydration, .. } => Some(hydration),
            _ => None,
        })
        .collect();
    assert!(!after.is_empty());
    assert!(after.iter().all(|h| *h > 95.0));

    let idle = wait_for_event(&log, types::ROBOT_IDLE).await;
    assert!(matches!(idle.payload, GardenEvent::RobotIdle { position, .. } if position == at(50.0, 50.0)));

    plant_token.cancel();
    robot_token.cancel();
    plant_handle.await.unwrap().unwrap();
    robot_handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn plant_never_has_two_open_requests() {
    let log = new_log();
    let clock = log.clock();
    let plant_id = PlantId::new();

    // One robot far away: every request times out on the robot's side.
    let plant = PlantCoordinator::new(plant_id, log.clone(), clock, eager_plant(), 400.0)
        .with_initial_position(at(0.0, 0.0));
    let robot = FulfillmentAgent::new(RobotId::new(), log.clone(), clock, RobotConfig::default())
        .with_initial_position(at(1000.0, 1000.0));
    let (plant_token, robot_token) = (plant.shutdown_token(), robot.shutdown_token());
    let plant_handle = plant.start();
    let robot_handle = robot.start();

    tokio::time::sleep(Duration::from_secs(45)).await;
    plant_token.cancel();
    robot_token.cancel();
    plant_handle.await.unwrap().unwrap();
    robot_handle.await.unwrap().unwrap();

    let lifecycle = log
        .query(&EventQuery::tagged([Tag::plant(plant_id), Tag::lifecycle()]))
        .await
        .unwrap();
    let mut open = None;
    let mut failures = 0;
    for event in &lifecycle {
        match event.payload {
            GardenEvent::WaterRequested { request_id, .. } => {
                assert_eq!(open, None, "request opened while another was open");
                open = Some(request_id);
            }
            GardenEvent::RequestFailed { request_id, .. } => {
                assert_eq!(open, Some(request_id));
                open = None;
                failures += 1;
            }
            _ => {}
        }
    }
    assert!(failures >= 2);
}

#[tokio::test(start_paused = true)]
async fn plant_survives_log_outage() {
    let log = new_log();
    let plant_id = PlantId::new();
    let plant = PlantCoordinator::new(plant_id, log.clone(), log.clock(), PlantConfig::default(), 400.0);
    let token = plant.shutdown_token();
    let handle = plant.start();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    log.set_available(false);
    let outage_start = log.clock().now();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!handle.is_finished());
    log.set_available(true);
    tokio::time::sleep(Duration::from_secs(3)).await;

    let reports = log
        .query(&EventQuery::tagged([Tag::plant(plant_id), Tag::hydration()]))
        .await
        .unwrap();
    let during = reports
        .iter()
        .filter(|r| r.meta.timestamp > outage_start && r.meta.timestamp < outage_start + TimeDelta::seconds(3))
        .count();
    let after = reports
        .iter()
        .filter(|r| r.meta.timestamp >= outage_start + TimeDelta::seconds(3))
        .count();
    assert_eq!(during, 0);
    assert!(after >= 2);

    token.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn presence_reports_arrival_and_departure() {
    let log = new_log();
    let robot_id = RobotId::new();
    let config = PresenceConfig::default();
    let tracker = Arc::new(PresenceTracker::new(log.clone(), log.clock(), config));
    let mut changes = tracker.subscribe_changes();

    robot_lifecycle(&log, robot_id, GardenEvent::RobotCreated { robot_id, position: at(1.0, 1.0) }).await;
    let first = tracker.check_cycle().await.unwrap();
    assert!(matches!(&first[..], [PresenceChange::Appeared { agent, .. }] if *agent == Tag::robot(robot_id)));
    assert_eq!(tracker.present(), vec![Tag::robot(robot_id)]);
    assert!(matches!(changes.recv().await.unwrap(), PresenceChange::Appeared { .. }));

    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(tracker.check_cycle().await.unwrap().is_empty());

    tokio::time::advance(Duration::from_secs(1)).await;
    let departed = tracker.check_cycle().await.unwrap();
    assert!(matches!(&departed[..], [PresenceChange::Departed { .. }]));
    assert!(tracker.present().is_empty());
}

#[tokio::test(start_paused = true)]
async fn garden_replaces_dead_plants() {
    let mut spec = GardenConfigSpec::default();
    spec.simulation.plants = 1;
    spec.simulation.robots = 0;
    spec.simulation.replace_dead_plants = true;
    spec.plant.endurance_ms_per_percent = 10.0;
    spec.presence.enabled = false;

    let garden = Arc::new(Garden::in_memory(spec));
    let handle = garden.clone().start();
    tokio::time::sleep(Duration::from_millis(3500)).await;
    garden.shutdown();
    let summary = handle.await.unwrap().unwrap();

    assert_eq!(summary.plants_died, 3);
    assert_eq!(summary.plants_spawned, 4);
    assert_eq!(summary.deliveries, 0);
    assert_eq!(
        log_count(&garden.log(), types::PLANT_DIED).await,
        summary.plants_died
    );
}

#[tokio::test(start_paused = true)]
async fn garden_runs_and_stops_on_shutdown() {
    let mut spec = GardenConfigSpec::default();
    spec.simulation.plants = 3;
    spec.simulation.robots = 2;

    let garden = Arc::new(Garden::in_memory(spec));
    let handle = garden.clone().start();
    tokio::time::sleep(Duration::from_secs(10)).await;
    garden.shutdown();
    let summary = handle.await.unwrap().unwrap();

    assert_eq!(summary.plants_spawned, 3);
    assert_eq!(summary.robots_spawned, 2);
    assert_eq!(summary.plants_died, 0);
    assert_eq!(log_count(&garden.log(), types::PLANT_CREATED).await, 3);
    assert_eq!(log_count(&garden.log(), types::ROBOT_CREATED).await, 2);
}

async fn log_count(log: &Arc<dyn EventLog>, event_type: &'static str) -> usize {
    log.query(&EventQuery::all().of_types(&[event_type])).await.unwrap().len()
}
