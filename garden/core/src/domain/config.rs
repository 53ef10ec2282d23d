// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Garden Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) covering:
// - Plant timing, request threshold and bid policy
// - Robot velocity, movement tick, bid timeout and discovery window
// - Presence tracking window
// - Simulation sizing
// - Observability settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::watering::{BidPolicy, RequestThreshold};

pub const API_VERSION: &str = "garden/v1";
pub const KIND: &str = "GardenConfig";

/// Top-level garden configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GardenConfigManifest {
    /// API version (must be "garden/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GardenConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: GardenConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GardenConfigSpec {
    #[serde(default)]
    pub plant: PlantConfig,

    #[serde(default)]
    pub robot: RobotConfig,

    #[serde(default)]
    pub presence: PresenceConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantConfig {
    /// Milliseconds of survival consumed per percentage point of hydration
    #[serde(default = "default_endurance")]
    pub endurance_ms_per_percent: f64,

    #[serde(default = "default_hydration_tick")]
    pub hydration_tick_ms: u64,

    #[serde(default)]
    pub request_threshold: RequestThreshold,

    #[serde(default)]
    pub bid_policy: BidPolicy,

    /// How long an assigned robot has to accept before the plant issues `fail2`
    #[serde(default = "default_assignment_timeout")]
    pub assignment_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Arena units covered per movement tick
    #[serde(default = "default_velocity")]
    pub velocity: f64,

    #[serde(default = "default_movement_tick")]
    pub movement_tick_ms: u64,

    #[serde(default = "default_bid_timeout")]
    pub bid_timeout_ms: u64,

    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u64,

    /// Only requests opened this recently are considered when scanning
    #[serde(default = "default_window_secs")]
    pub discovery_window_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    #[serde(default = "default_presence_check")]
    pub check_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_plants")]
    pub plants: usize,

    #[serde(default = "default_robots")]
    pub robots: usize,

    /// Spawn a fresh plant id whenever a plant dies
    #[serde(default = "default_true")]
    pub replace_dead_plants: bool,

    /// Broadcast capacity of the in-memory log
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus exporter port; no exporter when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_endurance() -> f64 {
    500.0
}

fn default_hydration_tick() -> u64 {
    1000
}

fn default_assignment_timeout() -> u64 {
    3000
}

fn default_velocity() -> f64 {
    10.0
}

fn default_movement_tick() -> u64 {
    300
}

fn default_bid_timeout() -> u64 {
    1000
}

fn default_scan_interval() -> u64 {
    500
}

fn default_window_secs() -> u64 {
    60
}

fn default_presence_check() -> u64 {
    1000
}

fn default_plants() -> usize {
    3
}

fn default_robots() -> usize {
    2
}

fn default_log_capacity() -> usize {
    4096
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            endurance_ms_per_percent: default_endurance(),
            hydration_tick_ms: default_hydration_tick(),
            request_threshold: RequestThreshold::default(),
            bid_policy: BidPolicy::default(),
            assignment_timeout_ms: default_assignment_timeout(),
        }
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            velocity: default_velocity(),
            movement_tick_ms: default_movement_tick(),
            bid_timeout_ms: default_bid_timeout(),
            scan_interval_ms: default_scan_interval(),
            discovery_window_secs: default_window_secs(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: default_window_secs(),
            check_interval_ms: default_presence_check(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            plants: default_plants(),
            robots: default_robots(),
            replace_dead_plants: true,
            log_capacity: default_log_capacity(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_port: None,
        }
    }
}

impl Default for GardenConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "garden".to_string(),
                version: Some("1.0.0".to_string()),
            },
            spec: GardenConfigSpec::default(),
        }
    }
}

impl PlantConfig {
    pub fn hydration_tick(&self) -> Duration {
        Duration::from_millis(self.hydration_tick_ms)
    }

    pub fn assignment_timeout(&self) -> Duration {
        Duration::from_millis(self.assignment_timeout_ms)
    }
}

impl RobotConfig {
    pub fn movement_tick(&self) -> Duration {
        Duration::from_millis(self.movement_tick_ms)
    }

    pub fn bid_timeout(&self) -> Duration {
        Duration::from_millis(self.bid_timeout_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn discovery_window(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::seconds(self.discovery_window_secs as i64)
    }
}

impl PresenceConfig {
    pub fn window(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::seconds(self.window_secs as i64)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

impl GardenConfigSpec {
    /// Farthest bid a plant accepts under `closest_within_range`.
    ///
    /// Velocity is converted to units per millisecond, so the result is the
    /// distance a robot covers while the plant loses 24 percentage points.
    pub fn max_serviceable_distance(&self) -> f64 {
        let per_ms = self.robot.velocity / self.robot.movement_tick_ms as f64;
        per_ms * self.plant.endurance_ms_per_percent * 24.0
    }
}

impl GardenConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. GARDEN_CONFIG_PATH environment variable
    /// 2. ./garden-config.yaml (working directory)
    /// 3. ~/.garden/config.yaml (user home)
    /// 4. /etc/garden/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GARDEN_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./garden-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".garden").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/garden/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::debug!("No configuration file found in standard locations, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("GARDEN_ENDURANCE_MS") {
            match val.parse::<f64>() {
                Ok(endurance) => {
                    tracing::info!("Environment override: GARDEN_ENDURANCE_MS={}", endurance);
                    self.spec.plant.endurance_ms_per_percent = endurance;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for GARDEN_ENDURANCE_MS: '{}'. Expected a number. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("GARDEN_BID_POLICY") {
            match val.to_lowercase().parse::<BidPolicy>() {
                Ok(policy) => {
                    tracing::info!("Environment override: GARDEN_BID_POLICY={:?}", policy);
                    self.spec.plant.bid_policy = policy;
                }
                Err(e) => tracing::warn!("Invalid value for GARDEN_BID_POLICY: {}. Ignoring.", e),
            }
        }

        if let Some(val) = lookup("GARDEN_REQUEST_THRESHOLD") {
            match val.to_lowercase().parse::<RequestThreshold>() {
                Ok(threshold) => {
                    tracing::info!("Environment override: GARDEN_REQUEST_THRESHOLD={:?}", threshold);
                    self.spec.plant.request_threshold = threshold;
                }
                Err(e) => {
                    tracing::warn!("Invalid value for GARDEN_REQUEST_THRESHOLD: {}. Ignoring.", e)
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let plant = &self.spec.plant;
        if !plant.endurance_ms_per_percent.is_finite() || plant.endurance_ms_per_percent <= 0.0 {
            anyhow::bail!("spec.plant.endurance_ms_per_percent must be positive");
        }
        if plant.hydration_tick_ms == 0 {
            anyhow::bail!("spec.plant.hydration_tick_ms must be positive");
        }
        if plant.assignment_timeout_ms == 0 {
            anyhow::bail!("spec.plant.assignment_timeout_ms must be positive");
        }

        let robot = &self.spec.robot;
        if !robot.velocity.is_finite() || robot.velocity <= 0.0 {
            anyhow::bail!("spec.robot.velocity must be positive");
        }
        for (field, value) in [
            ("movement_tick_ms", robot.movement_tick_ms),
            ("bid_timeout_ms", robot.bid_timeout_ms),
            ("scan_interval_ms", robot.scan_interval_ms),
            ("discovery_window_secs", robot.discovery_window_secs),
        ] {
            if value == 0 {
                anyhow::bail!("spec.robot.{} must be positive", field);
            }
        }

        if self.spec.presence.enabled
            && (self.spec.presence.window_secs == 0 || self.spec.presence.check_interval_ms == 0)
        {
            anyhow::bail!("spec.presence window and check interval must be positive");
        }

        if self.spec.simulation.log_capacity == 0 {
            anyhow::bail!("spec.simulation.log_capacity must be positive");
        }

        Ok(())
    }
}
