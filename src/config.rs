//! Rig configuration loaded from TOML.
//!
//! Every field has a default matching the reference rig, so an absent file or
//! an empty table still yields a usable configuration:
//!
//! ```toml
//! [machine]
//! backend = "stepper"
//! steps_per_mm = 80.0
//!
//! [stepper]
//! accel_fraction = 0.1
//! reversal_steps = 1000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub machine: MachineConfig,
    #[serde(default)]
    pub stepper: StepperConfig,
    #[serde(default)]
    pub simulated: SimulatedConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

/// Which motion backend `machine::probe` selects at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Simulated,
    Stepper,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MachineConfig {
    #[serde(default = "default_backend")]
    pub backend: Backend,
    #[serde(default = "default_steps_per_mm")]
    pub steps_per_mm: f64,
    /// Travel limits in steps, inclusive on both ends.
    #[serde(default = "default_min_position")]
    pub min_position: i64,
    #[serde(default = "default_max_position")]
    pub max_position: i64,
    /// Feed rate used for rapid (G0) moves, mm/s.
    #[serde(default = "default_rapid_feed")]
    pub rapid_feed: f64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            steps_per_mm: default_steps_per_mm(),
            min_position: default_min_position(),
            max_position: default_max_position(),
            rapid_feed: default_rapid_feed(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StepperConfig {
    /// Ramp length as a fraction of the commanded speed, in steps.
    #[serde(default = "default_accel_fraction")]
    pub accel_fraction: f64,
    /// Fixed back-off distance after an endstop trip, in steps.
    #[serde(default = "default_reversal_steps")]
    pub reversal_steps: u32,
    /// Full step period used during the endstop back-off, in microseconds.
    #[serde(default = "default_pulse_interval_us")]
    pub pulse_interval_us: u64,
    /// Feed rate of the homing sweeps, mm/s.
    #[serde(default = "default_homing_feed")]
    pub homing_feed: f64,
    /// Per-axis homing sweep target, mm. Far enough out that the endstop
    /// always ends the sweep first.
    #[serde(default = "default_homing_target")]
    pub homing_target: f64,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            accel_fraction: default_accel_fraction(),
            reversal_steps: default_reversal_steps(),
            pulse_interval_us: default_pulse_interval_us(),
            homing_feed: default_homing_feed(),
            homing_target: default_homing_target(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatedConfig {
    /// Distance covered per simulated increment, mm.
    #[serde(default = "default_increment_mm")]
    pub increment_mm: f64,
    /// Arrival tolerance, mm.
    #[serde(default = "default_epsilon_mm")]
    pub epsilon_mm: f64,
    /// Wall-clock speedup. 1.0 sleeps in real time; tests run much higher.
    #[serde(default = "default_realtime_factor")]
    pub realtime_factor: f64,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            increment_mm: default_increment_mm(),
            epsilon_mm: default_epsilon_mm(),
            realtime_factor: default_realtime_factor(),
        }
    }
}

fn default_backend() -> Backend {
    Backend::Simulated
}

fn default_steps_per_mm() -> f64 {
    80.0
}

fn default_min_position() -> i64 {
    -130_000 * 80
}

fn default_max_position() -> i64 {
    130_000 * 80
}

fn default_rapid_feed() -> f64 {
    50.0
}

fn default_accel_fraction() -> f64 {
    0.1
}

fn default_reversal_steps() -> u32 {
    1000
}

fn default_pulse_interval_us() -> u64 {
    500
}

fn default_homing_feed() -> f64 {
    50.0
}

fn default_homing_target() -> f64 {
    -30_000.0
}

fn default_increment_mm() -> f64 {
    0.5
}

fn default_epsilon_mm() -> f64 {
    1e-6
}

fn default_realtime_factor() -> f64 {
    1.0
}
