// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Plant Request Coordinator
//!
//! One task per plant. Tracks hydration, opens watering requests, assigns a
//! bidding robot and records the outcome in the plant's lifecycle stream.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** requester side of the watering protocol
//! - **Dependencies:** `garden-core` (`ProtocolEngine`, `EventLog`)
//!
//! # Loop
//!
//! ```text
//! recover lifecycle history (dead -> stop, fresh -> publish plant_created)
//! resume following the open request, if any
//! loop select {
//!     cancelled          -> stop
//!     hydration tick     -> report; <= 0 -> plant_died, stop
//!                           below threshold, nothing open -> open request
//!     request event      -> fold; assign / arm fail2 timer / record outcome
//!     assignment timeout -> fail2
//! }
//! ```
//!
//! Log failures are logged and retried on the next tick; they never end the
//! loop.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use garden_core::agent::{PlantAgent, PlantId, PlantRecovery, Role};
use garden_core::application::{CommandOutcome, EngineError, ProtocolEngine};
use garden_core::clock::Clock;
use garden_core::config::PlantConfig;
use garden_core::events::GardenEvent;
use garden_core::log::{EventLog, EventQuery, LogError, SubscriptionItem};
use garden_core::position::Position;
use garden_core::protocol::InstanceId;
use garden_core::tags::{Tag, TagSet};
use garden_core::watering::{WateringCommand, WateringProtocol, WateringState};

use crate::application::follower::{next_item, InstanceFollower, Observed};
use crate::application::timer::OneShotTimer;

/// Why a plant coordinator stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlantExit {
    Died { at: DateTime<Utc> },
    /// Lifecycle history already ended in `plant_died`.
    AlreadyDead { died_at: DateTime<Utc> },
    Cancelled,
}

pub struct PlantCoordinator {
    id: PlantId,
    log: Arc<dyn EventLog>,
    protocol: Arc<WateringProtocol>,
    config: PlantConfig,
    max_distance: f64,
    clock: Clock,
    initial_position: Option<Position>,
    shutdown_token: CancellationToken,
}

type Follower = InstanceFollower<WateringProtocol>;

impl PlantCoordinator {
    /// `max_distance` bounds bids under `closest_within_range`; `clock` must be
    /// the time source of the log so hydration and log timestamps agree.
    pub fn new(
        id: PlantId,
        log: Arc<dyn EventLog>,
        clock: Clock,
        config: PlantConfig,
        max_distance: f64,
    ) -> Self {
        Self {
            id,
            log,
            protocol: Arc::new(WateringProtocol::new()),
            config,
            max_distance,
            clock,
            initial_position: None,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Position used if the plant has no history yet; random otherwise.
    pub fn with_initial_position(mut self, position: Position) -> Self {
        self.initial_position = Some(position);
        self
    }

    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = token;
        self
    }

    pub fn id(&self) -> PlantId {
        self.id
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self) -> JoinHandle<anyhow::Result<PlantExit>> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) -> anyhow::Result<PlantExit> {
        let token = self.shutdown_token.clone();
        let mut tick = interval(self.config.hydration_tick());

        let mut plant = loop {
            match self.recover().await {
                Ok(PlantRecovery::Alive(plant)) => break plant,
                Ok(PlantRecovery::Dead { died_at }) => {
                    info!(plant_id = %self.id, %died_at, "Plant is already dead, not restarting");
                    return Ok(PlantExit::AlreadyDead { died_at });
                }
                Ok(PlantRecovery::Fresh) => {
                    warn!(plant_id = %self.id, "Created event not yet visible, retrying recovery")
                }
                Err(e) => warn!(plant_id = %self.id, error = %e, "Plant recovery failed, retrying"),
            }
            tokio::select! {
                _ = token.cancelled() => return Ok(PlantExit::Cancelled),
                _ = tick.tick() => {}
            }
        };

        info!(
            plant_id = %self.id,
            position = %plant.position,
            last_watered_at = %plant.last_watered_at,
            "Plant coordinator started"
        );

        let mut follower = match plant.open_request_id {
            Some(request_id) => {
                info!(plant_id = %self.id, request_id = %request_id, "Resuming open water request");
                Some(self.follow(request_id).await)
            }
            None => None,
        };
        let mut assignment_timer = OneShotTimer::new();

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!(plant_id = %self.id, "Shutdown signal received, stopping plant coordinator");
                    return Ok(PlantExit::Cancelled);
                }
                _ = tick.tick() => {
                    if let Some(exit) = self.on_tick(&mut plant, &mut follower, &mut assignment_timer).await {
                        return Ok(exit);
                    }
                }
                item = next_item(&mut follower) => {
                    self.on_item(item, &mut plant, &mut follower, &mut assignment_timer).await;
                }
                _ = assignment_timer.expired() => {
                    let view = follower.as_ref().map(Follower::snapshot);
                    self.on_assignment_timeout(view, &mut assignment_timer).await;
                }
            }
        }
    }

    async fn recover(&self) -> Result<PlantRecovery, LogError> {
        let query = EventQuery::tagged([Tag::plant(self.id), Tag::lifecycle()]);
        let history = self.log.query(&query).await?;
        match PlantAgent::from_history(self.id, &history) {
            PlantRecovery::Fresh => {
                let position = self
                    .initial_position
                    .unwrap_or_else(|| Position::random(&mut rand::rng()));
                self.log
                    .publish(
                        self.lifecycle_tags(),
                        GardenEvent::PlantCreated { plant_id: self.id, position },
                    )
                    .await?;
                info!(plant_id = %self.id, %position, "Plant created");
                let history = self.log.query(&query).await?;
                Ok(PlantAgent::from_history(self.id, &history))
            }
            recovered => Ok(recovered),
        }
    }

    async fn on_tick(
        &self,
        plant: &mut PlantAgent,
        follower: &mut Option<Follower>,
        timer: &mut OneShotTimer,
    ) -> Option<PlantExit> {
        let now = self.clock.now();
        let hydration = plant.hydration(now, self.config.endurance_ms_per_percent);
        metrics::gauge!("garden_plant_hydration", "plant" => self.id.to_string()).set(hydration.max(0.0));

        let reported = self
            .log
            .publish(
                self.tags(Tag::hydration()),
                GardenEvent::HydrationReported { plant_id: self.id, hydration },
            )
            .await;

        if hydration <= 0.0 {
            return Some(self.die(now).await);
        }
        if let Err(e) = reported {
            warn!(plant_id = %self.id, error = %e, "Event log unavailable, skipping tick");
            return None;
        }
        debug!(plant_id = %self.id, hydration, "Hydration reported");

        if let Some(f) = follower.as_mut() {
            if !f.is_subscribed() {
                self.resubscribe(f).await;
            } else if f.is_caught_up() {
                // Retry path for reactions that failed on a log error.
                if let Err(e) = self.react(plant, follower, timer).await {
                    warn!(plant_id = %self.id, error = %e, "Request handling failed, retrying next tick");
                }
            }
        } else if hydration < self.config.request_threshold.percent() && plant.open_request_id.is_none() {
            match self.open_request(plant).await {
                Ok(opened) => *follower = Some(opened),
                Err(e) => warn!(plant_id = %self.id, error = %e, "Could not open water request"),
            }
        }
        None
    }

    async fn die(&self, at: DateTime<Utc>) -> PlantExit {
        loop {
            match self
                .log
                .publish(self.lifecycle_tags(), GardenEvent::PlantDied { plant_id: self.id })
                .await
            {
                Ok(_) => break,
                Err(e) => {
                    warn!(plant_id = %self.id, error = %e, "Could not record plant death, retrying");
                    tokio::select! {
                        _ = self.shutdown_token.cancelled() => break,
                        _ = tokio::time::sleep(self.config.hydration_tick()) => {}
                    }
                }
            }
        }
        metrics::counter!("garden_plants_died_total").increment(1);
        info!(plant_id = %self.id, died_at = %at, "Plant died");
        PlantExit::Died { at }
    }

    async fn open_request(&self, plant: &mut PlantAgent) -> Result<Follower, LogError> {
        let request_id = InstanceId::new();
        self.log
            .publish(
                self.lifecycle_tags(),
                GardenEvent::WaterRequested { plant_id: self.id, request_id },
            )
            .await?;
        plant.open_request_id = Some(request_id);
        info!(plant_id = %self.id, request_id = %request_id, "Opening water request");

        let engine = self.engine(request_id);
        let request = WateringCommand::Request { plant_id: self.id, position: plant.position };
        if let Err(e) = engine.execute(request).await {
            // Folds to Initial; the first reaction re-issues the request.
            warn!(plant_id = %self.id, request_id = %request_id, error = %e, "Request not published yet");
        }
        Ok(self.subscribe(engine).await)
    }

    async fn follow(&self, request_id: InstanceId) -> Follower {
        self.subscribe(self.engine(request_id)).await
    }

    async fn subscribe(&self, engine: ProtocolEngine<WateringProtocol>) -> Follower {
        let mut follower = InstanceFollower::new(engine);
        self.resubscribe(&mut follower).await;
        follower
    }

    async fn resubscribe(&self, follower: &mut Follower) {
        if let Err(e) = follower.resubscribe().await {
            warn!(
                plant_id = %self.id,
                request_id = %follower.engine().instance(),
                error = %e,
                "Could not subscribe to request"
            );
        }
    }

    async fn on_item(
        &self,
        item: Option<Result<SubscriptionItem, LogError>>,
        plant: &mut PlantAgent,
        follower: &mut Option<Follower>,
        timer: &mut OneShotTimer,
    ) {
        let Some(f) = follower.as_mut() else {
            return;
        };
        match f.observe(item) {
            Observed::Pending => return,
            Observed::Changed => {}
            Observed::Lost(error) => {
                warn!(
                    plant_id = %self.id,
                    error = ?error,
                    "Request subscription lost, re-subscribing next tick"
                );
                return;
            }
        }
        if let Err(e) = self.react(plant, follower, timer).await {
            warn!(plant_id = %self.id, error = %e, "Request handling failed, retrying next tick");
        }
    }

    /// Act on the followed instance as folded from the subscription.
    ///
    /// Every command goes through the engine, which re-folds from the log and
    /// drops it if this view is stale.
    async fn react(
        &self,
        plant: &mut PlantAgent,
        follower: &mut Option<Follower>,
        timer: &mut OneShotTimer,
    ) -> Result<(), EngineError> {
        let Some((engine, state)) = follower.as_ref().map(Follower::snapshot) else {
            return Ok(());
        };
        let request_id = engine.instance();

        match state {
            WateringState::Initial => {
                debug!(plant_id = %self.id, request_id = %request_id, "Re-issuing unpublished request");
                engine
                    .execute(WateringCommand::Request { plant_id: self.id, position: plant.position })
                    .await?;
            }
            WateringState::Requested { .. } => {
                // The subscription may trail the log; choose among every bid already appended.
                let WateringState::Requested { position, bids, .. } = engine.current().await? else {
                    return Ok(());
                };
                let Some(bid) = self.config.bid_policy.select(&position, &bids, self.max_distance) else {
                    return Ok(());
                };
                let robot_id = bid.robot_id;
                let distance = bid.position.distance_to(&position);
                if let CommandOutcome::Published(_) =
                    engine.execute(WateringCommand::Assign { robot_id }).await?
                {
                    info!(
                        plant_id = %self.id,
                        request_id = %request_id,
                        robot_id = %robot_id,
                        distance,
                        bids = bids.len(),
                        "Robot assigned"
                    );
                }
            }
            WateringState::Assigned { robot_id, .. } => {
                if timer.arm(self.config.assignment_timeout()) {
                    debug!(plant_id = %self.id, robot_id = %robot_id, "Waiting for robot to accept");
                }
            }
            WateringState::Moving { .. } => timer.cancel(),
            WateringState::Done { completed_at } => {
                self.log
                    .publish(
                        self.lifecycle_tags(),
                        GardenEvent::WaterReceived { plant_id: self.id, request_id, completed_at },
                    )
                    .await?;
                plant.last_watered_at = completed_at;
                plant.open_request_id = None;
                *follower = None;
                timer.cancel();
                metrics::counter!("garden_deliveries_total").increment(1);
                info!(plant_id = %self.id, request_id = %request_id, %completed_at, "Water received");
            }
            WateringState::Failed => {
                self.log
                    .publish(
                        self.lifecycle_tags(),
                        GardenEvent::RequestFailed { plant_id: self.id, request_id },
                    )
                    .await?;
                plant.open_request_id = None;
                *follower = None;
                timer.cancel();
                info!(plant_id = %self.id, request_id = %request_id, "Water request failed");
            }
        }
        Ok(())
    }

    async fn on_assignment_timeout(
        &self,
        view: Option<(ProtocolEngine<WateringProtocol>, WateringState)>,
        timer: &mut OneShotTimer,
    ) {
        let Some((engine, WateringState::Assigned { robot_id, .. })) = view else {
            return;
        };
        match engine.execute(WateringCommand::ExpireAssignment { robot_id }).await {
            Ok(CommandOutcome::Published(_)) => {
                info!(plant_id = %self.id, robot_id = %robot_id, "Assigned robot never accepted, failing request")
            }
            Ok(CommandOutcome::Dropped(_)) => {}
            Err(e) => {
                warn!(plant_id = %self.id, error = %e, "Could not expire assignment, retrying");
                timer.arm(self.config.hydration_tick());
            }
        }
    }

    fn engine(&self, request_id: InstanceId) -> ProtocolEngine<WateringProtocol> {
        ProtocolEngine::new(
            self.protocol.clone(),
            self.log.clone(),
            request_id,
            Role::Plant,
            Tag::plant(self.id),
        )
    }

    fn tags(&self, kind: Tag) -> TagSet {
        TagSet::from([Tag::plant(self.id), Tag::role(Role::Plant), kind])
    }

    fn lifecycle_tags(&self) -> TagSet {
        self.tags(Tag::lifecycle())
    }
}
