// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Robot Fulfillment Agent
//!
//! One task per robot. Discovers open watering requests, bids on them, and
//! drives assigned missions to completion.
//!
//! # Loop
//!
//! ```text
//! recover lifecycle history (fresh -> publish robot_created)
//! loop {
//!     no mission -> scan requests opened within the discovery window
//!                   (skipping dead plants), adopt the first still Requested
//!     mission    -> follow the instance:
//!                   Requested, not listed  -> offer
//!                   Requested, listed      -> arm bid timeout -> fail
//!                   Assigned to self       -> mission_started, accept
//!                   Assigned to another    -> give up
//!                   Moving (self)          -> move / done each movement tick
//!                   Done | Failed          -> robot_idle, scan again
//! }
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use garden_core::agent::{PlantId, RobotAgent, RobotId, Role};
use garden_core::application::{CommandOutcome, EngineError, ProtocolEngine};
use garden_core::clock::Clock;
use garden_core::config::RobotConfig;
use garden_core::events::{types, GardenEvent};
use garden_core::log::{EventLog, EventQuery, LogError};
use garden_core::position::Position;
use garden_core::protocol::InstanceId;
use garden_core::tags::{Tag, TagSet};
use garden_core::watering::{
    WateringCommand, WateringProtocol, WateringState, ARRIVAL_DISTANCE, WATERING_PROTOCOL,
};

use crate::application::follower::{InstanceFollower, Observed};
use crate::application::timer::OneShotTimer;

type Mission = InstanceFollower<WateringProtocol>;

/// How a mission ended from this robot's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionOutcome {
    Delivered,
    Failed,
    /// Another robot was assigned.
    Lost,
    Cancelled,
}

pub struct FulfillmentAgent {
    id: RobotId,
    log: Arc<dyn EventLog>,
    protocol: Arc<WateringProtocol>,
    config: RobotConfig,
    clock: Clock,
    initial_position: Option<Position>,
    shutdown_token: CancellationToken,
}

/// What the mission loop should do after a reaction.
enum Step {
    Continue,
    Finished(MissionOutcome),
}

impl FulfillmentAgent {
    pub fn new(id: RobotId, log: Arc<dyn EventLog>, clock: Clock, config: RobotConfig) -> Self {
        Self {
            id,
            log,
            protocol: Arc::new(WateringProtocol::new()),
            config,
            clock,
            initial_position: None,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Position used if the robot has no history yet; random otherwise.
    pub fn with_initial_position(mut self, position: Position) -> Self {
        self.initial_position = Some(position);
        self
    }

    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = token;
        self
    }

    pub fn id(&self) -> RobotId {
        self.id
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self) -> JoinHandle<anyhow::Result<()>> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let mut robot = loop {
            match self.recover().await {
                Ok(Some(robot)) => break robot,
                Ok(None) => warn!(robot_id = %self.id, "Created event not yet visible, retrying recovery"),
                Err(e) => warn!(robot_id = %self.id, error = %e, "Robot recovery failed, retrying"),
            }
            if self.pause(self.config.scan_interval()).await {
                return Ok(());
            }
        };

        info!(
            robot_id = %self.id,
            position = %robot.position,
            mission = ?robot.current_mission,
            "Fulfillment agent started"
        );

        loop {
            let request_id = match robot.current_mission {
                Some(request_id) => Some(request_id),
                None => match self.discover().await {
                    Ok(found) => found,
                    Err(e) => {
                        warn!(robot_id = %self.id, error = %e, "Request scan failed");
                        None
                    }
                },
            };

            let Some(request_id) = request_id else {
                if self.pause(self.config.scan_interval()).await {
                    return Ok(());
                }
                continue;
            };

            let outcome = self.pursue(&mut robot, request_id).await;
            debug!(robot_id = %self.id, request_id = %request_id, ?outcome, "Mission ended");
            if outcome == MissionOutcome::Cancelled {
                info!(robot_id = %self.id, "Shutdown signal received, stopping fulfillment agent");
                return Ok(());
            }

            if robot.current_mission == Some(request_id) {
                if let Err(e) = self.go_idle(&mut robot).await {
                    // Mission stays recorded; the next pass re-folds it and retries.
                    warn!(robot_id = %self.id, error = %e, "Could not record idle state");
                    if self.pause(self.config.scan_interval()).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Sleep unless cancelled first; returns whether cancellation happened.
    async fn pause(&self, duration: std::time::Duration) -> bool {
        tokio::select! {
            _ = self.shutdown_token.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    async fn recover(&self) -> Result<Option<RobotAgent>, LogError> {
        let query = EventQuery::tagged([Tag::robot(self.id), Tag::lifecycle()]);
        let history = self.log.query(&query).await?;
        if let Some(robot) = RobotAgent::from_history(self.id, &history) {
            return Ok(Some(robot));
        }

        let position = self
            .initial_position
            .unwrap_or_else(|| Position::random(&mut rand::rng()));
        self.log
            .publish(
                self.lifecycle_tags(),
                GardenEvent::RobotCreated { robot_id: self.id, position },
            )
            .await?;
        info!(robot_id = %self.id, %position, "Robot created");
        let history = self.log.query(&query).await?;
        Ok(RobotAgent::from_history(self.id, &history))
    }

    /// Oldest request opened within the discovery window that is still
    /// collecting bids and whose plant is alive.
    async fn discover(&self) -> Result<Option<InstanceId>, LogError> {
        let since = self.clock.now() - self.config.discovery_window();
        let opened = self
            .log
            .query(
                &EventQuery::tagged([Tag::family(WATERING_PROTOCOL)])
                    .of_types(&[types::REQUEST_OPENED])
                    .since(since),
            )
            .await?;
        if opened.is_empty() {
            return Ok(None);
        }

        let dead: HashSet<PlantId> = self
            .log
            .query(&EventQuery::all().of_types(&[types::PLANT_DIED]).since(since))
            .await?
            .into_iter()
            .filter_map(|event| match event.payload {
                GardenEvent::PlantDied { plant_id } => Some(plant_id),
                _ => None,
            })
            .collect();

        for event in opened {
            let GardenEvent::RequestOpened { plant_id, .. } = event.payload else {
                continue;
            };
            if dead.contains(&plant_id) {
                continue;
            }
            let Some(request_id) = event.meta.tags.instance() else {
                continue;
            };
            let state = self.engine(request_id).current().await?;
            if let WateringState::Requested { .. } = state {
                debug!(robot_id = %self.id, request_id = %request_id, plant_id = %plant_id, "Adopting request");
                return Ok(Some(request_id));
            }
        }
        Ok(None)
    }

    async fn pursue(&self, robot: &mut RobotAgent, request_id: InstanceId) -> MissionOutcome {
        let token = self.shutdown_token.clone();
        let mut mission = InstanceFollower::new(self.engine(request_id));
        let mut bid_timer = OneShotTimer::new();
        let mut retry_timer = OneShotTimer::new();
        let mut movement: Option<Interval> = None;

        self.resubscribe(&mut mission, &mut retry_timer).await;

        loop {
            let step = tokio::select! {
                _ = token.cancelled() => return MissionOutcome::Cancelled,
                item = mission.next() => {
                    match mission.observe(item) {
                        Observed::Pending => Step::Continue,
                        Observed::Changed => {
                            let view = mission.snapshot();
                            self.react(robot, view, &mut bid_timer, &mut movement, &mut retry_timer).await
                        }
                        Observed::Lost(error) => {
                            warn!(robot_id = %self.id, error = ?error, "Mission subscription lost, re-subscribing");
                            retry_timer.arm(self.config.scan_interval());
                            Step::Continue
                        }
                    }
                }
                _ = bid_timer.expired() => {
                    self.on_bid_timeout(mission.engine().clone(), &mut retry_timer).await;
                    Step::Continue
                }
                _ = next_tick(&mut movement) => {
                    self.on_movement_tick(robot, mission.engine().clone()).await;
                    Step::Continue
                }
                _ = retry_timer.expired() => {
                    if !mission.is_subscribed() {
                        self.resubscribe(&mut mission, &mut retry_timer).await;
                        Step::Continue
                    } else if mission.is_caught_up() {
                        let view = mission.snapshot();
                        self.react(robot, view, &mut bid_timer, &mut movement, &mut retry_timer).await
                    } else {
                        Step::Continue
                    }
                }
            };
            if let Step::Finished(outcome) = step {
                return outcome;
            }
        }
    }

    async fn resubscribe(&self, mission: &mut Mission, retry_timer: &mut OneShotTimer) {
        if let Err(e) = mission.resubscribe().await {
            warn!(robot_id = %self.id, error = %e, "Could not subscribe to mission");
            retry_timer.arm(self.config.scan_interval());
        }
    }

    async fn react(
        &self,
        robot: &mut RobotAgent,
        view: (ProtocolEngine<WateringProtocol>, WateringState),
        bid_timer: &mut OneShotTimer,
        movement: &mut Option<Interval>,
        retry_timer: &mut OneShotTimer,
    ) -> Step {
        match self.react_to(robot, view, bid_timer, movement).await {
            Ok(step) => step,
            Err(e) => {
                warn!(robot_id = %self.id, error = %e, "Mission handling failed, retrying");
                retry_timer.arm(self.config.scan_interval());
                Step::Continue
            }
        }
    }

    async fn react_to(
        &self,
        robot: &mut RobotAgent,
        (engine, state): (ProtocolEngine<WateringProtocol>, WateringState),
        bid_timer: &mut OneShotTimer,
        movement: &mut Option<Interval>,
    ) -> Result<Step, EngineError> {
        let request_id = engine.instance();
        if !matches!(state, WateringState::Requested { .. }) {
            bid_timer.cancel();
        }
        if !matches!(state, WateringState::Moving { .. }) {
            *movement = None;
        }

        match state {
            WateringState::Initial => {}
            WateringState::Requested { ref bids, .. } if !bids.iter().any(|b| b.robot_id == self.id) => {
                let offer = WateringCommand::Offer { robot_id: self.id, position: robot.position };
                if let CommandOutcome::Published(_) = engine.execute(offer).await? {
                    info!(robot_id = %self.id, request_id = %request_id, position = %robot.position, "Bid offered");
                }
            }
            WateringState::Requested { .. } => {
                bid_timer.arm(self.config.bid_timeout());
            }
            WateringState::Assigned { robot_id, .. } if robot_id == self.id => {
                if robot.current_mission != Some(request_id) {
                    self.log
                        .publish(
                            self.lifecycle_tags(),
                            GardenEvent::MissionStarted { robot_id: self.id, request_id },
                        )
                        .await?;
                    robot.current_mission = Some(request_id);
                }
                let accept = WateringCommand::Accept { robot_id: self.id, position: robot.position };
                if let CommandOutcome::Published(_) = engine.execute(accept).await? {
                    info!(robot_id = %self.id, request_id = %request_id, "Assignment accepted");
                }
            }
            WateringState::Assigned { robot_id, .. } => {
                debug!(robot_id = %self.id, assigned = %robot_id, "Another robot was assigned");
                return Ok(Step::Finished(MissionOutcome::Lost));
            }
            WateringState::Moving { robot_id, robot_position, .. } if robot_id == self.id => {
                robot.position = robot_position;
                if movement.is_none() {
                    let mut ticks = interval(self.config.movement_tick());
                    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    // Skip the immediate first tick.
                    ticks.reset();
                    *movement = Some(ticks);
                }
            }
            WateringState::Moving { .. } => return Ok(Step::Finished(MissionOutcome::Lost)),
            WateringState::Done { .. } => return Ok(Step::Finished(MissionOutcome::Delivered)),
            WateringState::Failed => return Ok(Step::Finished(MissionOutcome::Failed)),
        }
        Ok(Step::Continue)
    }

    async fn on_bid_timeout(
        &self,
        engine: ProtocolEngine<WateringProtocol>,
        retry_timer: &mut OneShotTimer,
    ) {
        match engine.execute(WateringCommand::Fail { robot_id: self.id }).await {
            Ok(CommandOutcome::Published(_)) => {
                info!(robot_id = %self.id, request_id = %engine.instance(), "Bid timed out")
            }
            Ok(CommandOutcome::Dropped(_)) => {}
            Err(e) => {
                warn!(robot_id = %self.id, error = %e, "Could not time out bid, retrying");
                retry_timer.arm(self.config.scan_interval());
            }
        }
    }

    /// One movement step against the latest folded state from the log.
    async fn on_movement_tick(&self, robot: &mut RobotAgent, engine: ProtocolEngine<WateringProtocol>) {
        if let Err(e) = self.advance(robot, &engine).await {
            warn!(robot_id = %self.id, error = %e, "Movement step failed, retrying next tick");
        }
    }

    async fn advance(
        &self,
        robot: &mut RobotAgent,
        engine: &ProtocolEngine<WateringProtocol>,
    ) -> Result<(), EngineError> {
        let WateringState::Moving { plant_id, position: target, robot_id, robot_position } =
            engine.current().await?
        else {
            return Ok(());
        };
        if robot_id != self.id {
            return Ok(());
        }

        if self.plant_died(plant_id).await? {
            if let CommandOutcome::Published(_) =
                engine.execute(WateringCommand::Abandon { robot_id: self.id }).await?
            {
                info!(robot_id = %self.id, plant_id = %plant_id, "Plant died en route, abandoning mission");
            }
            return Ok(());
        }

        let remaining = robot_position.distance_to(&target);
        if remaining < ARRIVAL_DISTANCE {
            if let CommandOutcome::Published(_) =
                engine.execute(WateringCommand::Deliver { robot_id: self.id }).await?
            {
                metrics::counter!("garden_missions_completed_total", "robot" => self.id.to_string()).increment(1);
                info!(robot_id = %self.id, plant_id = %plant_id, "Water delivered");
            }
            return Ok(());
        }

        let next = robot_position.step_towards(&target, self.config.velocity);
        if let CommandOutcome::Published(_) = engine
            .execute(WateringCommand::Move { robot_id: self.id, position: next })
            .await?
        {
            robot.position = next;
            debug!(robot_id = %self.id, position = %next, remaining = next.distance_to(&target), "Moved");
        }
        Ok(())
    }

    async fn plant_died(&self, plant_id: PlantId) -> Result<bool, LogError> {
        let query = EventQuery::tagged([Tag::plant(plant_id), Tag::lifecycle()])
            .of_types(&[types::PLANT_DIED])
            .limit(1);
        Ok(!self.log.query(&query).await?.is_empty())
    }

    async fn go_idle(&self, robot: &mut RobotAgent) -> Result<(), LogError> {
        self.log
            .publish(
                self.lifecycle_tags(),
                GardenEvent::RobotIdle { robot_id: self.id, position: robot.position },
            )
            .await?;
        *robot = RobotAgent::new(self.id, robot.position);
        info!(robot_id = %self.id, position = %robot.position, "Robot idle");
        Ok(())
    }

    fn engine(&self, request_id: InstanceId) -> ProtocolEngine<WateringProtocol> {
        ProtocolEngine::new(
            self.protocol.clone(),
            self.log.clone(),
            request_id,
            Role::Robot,
            Tag::robot(self.id),
        )
    }

    fn lifecycle_tags(&self) -> TagSet {
        TagSet::from([Tag::robot(self.id), Tag::role(Role::Robot), Tag::lifecycle()])
    }
}

async fn next_tick(movement: &mut Option<Interval>) {
    match movement.as_mut() {
        Some(ticks) => {
            ticks.tick().await;
        }
        None => std::future::pending().await,
    }
}

