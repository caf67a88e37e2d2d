//! Simulation configuration.
//!
//! Configuration is read once at startup and stays immutable for the
//! duration of a run. It can be deserialized from `toml` or, with the `yaml`
//! feature enabled, from `yaml` files.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::rule::RuleParams;
use crate::Velocity;

pub const DEFAULT_ROAD_LENGTH: usize = 20000;
pub const DEFAULT_VEHICLE_COUNT: usize = 6000;
pub const DEFAULT_MAX_VELOCITY: Velocity = 5;
pub const DEFAULT_SLOWDOWN_PROBABILITY: f64 = 0.3;
pub const DEFAULT_STEPS: usize = 1000;
pub const DEFAULT_WORKER_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_VISUAL_DELAY_MS: u64 = 150;
/// Largest accepted `max_velocity`, in cells per round.
pub const MAX_VELOCITY_LIMIT: Velocity = u16::MAX as Velocity;

/// Complete set of values needed for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of cells on the circular road (`L`)
    pub road_length: usize,
    /// Number of vehicles placed on the road (`N`)
    pub vehicle_count: usize,
    /// Maximum velocity in cells per round (`Vmax`)
    pub max_velocity: Velocity,
    /// Probability of random slowdown (`p`)
    pub slowdown_probability: f64,
    /// Number of rounds to process (`STEPS`)
    pub steps: usize,
    /// Number of parallel workers (`W`)
    pub workers: usize,
    /// Seed for all the random number generators, random if not set
    pub seed: Option<u64>,
    /// Maximum time a worker waits at the round barrier
    pub round_timeout_ms: Option<u64>,
    /// Maximum time the master waits for a remote worker's response
    pub worker_timeout_ms: Option<u64>,
    pub visual: VisualConfig,
}

/// Toggles for the external per-round renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub enabled: bool,
    pub delay_ms: u64,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_ms: DEFAULT_VISUAL_DELAY_MS,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            road_length: DEFAULT_ROAD_LENGTH,
            vehicle_count: DEFAULT_VEHICLE_COUNT,
            max_velocity: DEFAULT_MAX_VELOCITY,
            slowdown_probability: DEFAULT_SLOWDOWN_PROBABILITY,
            steps: DEFAULT_STEPS,
            workers: rayon::current_num_threads(),
            seed: None,
            round_timeout_ms: None,
            worker_timeout_ms: Some(DEFAULT_WORKER_TIMEOUT_MS),
            visual: VisualConfig::default(),
        }
    }
}

impl Config {
    /// Reads config from file at path, choosing the format based on the
    /// file extension. Resulting config is validated.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;

        let config: Config = match path.extension().and_then(|e| e.to_str()) {
            #[cfg(feature = "yaml")]
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("toml") | None => toml::from_str(&content)?,
            Some(ext) => {
                return Err(Error::InvalidConfig(format!(
                    "unsupported config file extension: {}",
                    ext
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses config from a toml string. Resulting config is validated.
    pub fn from_toml_str(s: &str) -> Result<Config> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values for consistency. Must pass before any round runs.
    pub fn validate(&self) -> Result<()> {
        if self.road_length == 0 {
            return Err(Error::InvalidConfig(
                "road length must be greater than zero".to_string(),
            ));
        }
        if self.vehicle_count > self.road_length {
            return Err(Error::InvalidConfig(format!(
                "vehicle count ({}) exceeds road length ({})",
                self.vehicle_count, self.road_length
            )));
        }
        if self.max_velocity > MAX_VELOCITY_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "max velocity ({}) exceeds the limit of {}",
                self.max_velocity, MAX_VELOCITY_LIMIT
            )));
        }
        if !self.slowdown_probability.is_finite()
            || self.slowdown_probability < 0.
            || self.slowdown_probability > 1.
        {
            return Err(Error::InvalidConfig(format!(
                "slowdown probability must be within [0, 1], got {}",
                self.slowdown_probability
            )));
        }
        if self.workers == 0 {
            return Err(Error::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn rule_params(&self) -> RuleParams {
        RuleParams {
            max_velocity: self.max_velocity,
            slowdown_probability: self.slowdown_probability,
        }
    }

    pub fn round_timeout(&self) -> Option<Duration> {
        self.round_timeout_ms.map(Duration::from_millis)
    }

    pub fn worker_timeout(&self) -> Option<Duration> {
        self.worker_timeout_ms.map(Duration::from_millis)
    }
}
