//! Layout configuration
//!
//! Every section is `serde(default)` so a config file only needs to name the
//! values it changes. Files are read as YAML or JSON depending on extension.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};
use crate::smooth::DEFAULT_MASS;

// =============================================================================
// Default Constants
// =============================================================================

/// Starting alpha (simulation "temperature")
pub const DEFAULT_ALPHA: f32 = 0.5;

/// Fraction of the gap to `alpha_target` closed each tick
pub const DEFAULT_ALPHA_DECAY: f32 = 0.01;

/// Alpha floor; a non-zero target keeps the layout gently moving
pub const DEFAULT_ALPHA_TARGET: f32 = 0.05;

/// Repulsion strength (applied as a negative charge)
pub const DEFAULT_REPULSION_STRENGTH: f32 = 5.0;

/// Ticks per buffer request
pub const DEFAULT_ITERATIONS: usize = 1;

/// Velocity multiplier applied each tick (d3 uses `1 - 0.4`)
pub const DEFAULT_VELOCITY_DECAY: f32 = 0.6;

/// Rest length of a link with no weight
pub const DEFAULT_LINK_DISTANCE: f32 = 30.0;

/// Default viewport width
pub const DEFAULT_WIDTH: f32 = 800.0;

/// Default viewport height
pub const DEFAULT_HEIGHT: f32 = 600.0;

/// Cached neighbors per node for the approximate repulsion
pub const DEFAULT_NEIGHBOR_SIZE: f32 = 15.0;

/// Exponent of the per-tick refresh window (`n^0.75`)
pub const DEFAULT_UPDATE_EXPONENT: f32 = 0.75;

/// Exponent of the per-node random sample (`n^0.25`)
pub const DEFAULT_SAMPLE_EXPONENT: f32 = 0.25;

/// Below this node count the charge multiplier is 1
pub const DEFAULT_MULTIPLIER_LOW: usize = 100;

/// Below this node count the charge multiplier is 3, above it `sqrt(n)`
pub const DEFAULT_MULTIPLIER_HIGH: usize = 200;

/// Minimum distance for repulsion (caps force at close range)
pub const DEFAULT_DISTANCE_MIN: f32 = 1.0;

/// Target display frame interval in seconds
pub const DEFAULT_FRAME_INTERVAL: f32 = 1.0 / 60.0;

/// Solver parameters, re-appliable without rebuilding node or link state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParameters {
    pub alpha: f32,
    pub alpha_decay: f32,
    pub alpha_target: f32,
    /// Magnitude of node repulsion; positive values push nodes apart
    pub repulsion_strength: f32,
    /// Ticks run per buffer request
    pub iterations: usize,
    /// Viewport width, used by the centering force
    pub width: f32,
    /// Viewport height, used by the centering force
    pub height: f32,
    pub velocity_decay: f32,
    pub link_distance: f32,
    /// Seed for every random draw the engine makes
    pub seed: u64,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            alpha_decay: DEFAULT_ALPHA_DECAY,
            alpha_target: DEFAULT_ALPHA_TARGET,
            repulsion_strength: DEFAULT_REPULSION_STRENGTH,
            iterations: DEFAULT_ITERATIONS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            velocity_decay: DEFAULT_VELOCITY_DECAY,
            link_distance: DEFAULT_LINK_DISTANCE,
            seed: 0,
        }
    }
}

impl SimulationParameters {
    /// Centre of the viewport, where the centering force pulls the centroid
    pub fn center(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }

    /// Charge handed to the many-body forces (negative = repulsion)
    pub fn charge(&self) -> f32 {
        -self.repulsion_strength
    }
}

/// Tuning for the approximate repulsion force.
///
/// The numbers are empirical; they are kept as defaults for behavioural
/// parity, not because they follow from anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepulsionConfig {
    /// Use the sampled approximation instead of exact all-pairs repulsion
    pub approximate: bool,
    pub neighbor_size: f32,
    pub update_exponent: f32,
    pub sample_exponent: f32,
    pub multiplier_low: usize,
    pub multiplier_high: usize,
    pub distance_min: f32,
    /// `None` means unbounded
    pub distance_max: Option<f32>,
}

impl Default for RepulsionConfig {
    fn default() -> Self {
        Self {
            approximate: true,
            neighbor_size: DEFAULT_NEIGHBOR_SIZE,
            update_exponent: DEFAULT_UPDATE_EXPONENT,
            sample_exponent: DEFAULT_SAMPLE_EXPONENT,
            multiplier_low: DEFAULT_MULTIPLIER_LOW,
            multiplier_high: DEFAULT_MULTIPLIER_HIGH,
            distance_min: DEFAULT_DISTANCE_MIN,
            distance_max: None,
        }
    }
}

impl RepulsionConfig {
    /// Charge multiplier for a graph of `n` nodes: flat, then a step, then `sqrt(n)`
    pub fn charge_multiplier(&self, n: usize) -> f32 {
        if n < self.multiplier_low {
            1.0
        } else if n < self.multiplier_high {
            3.0
        } else {
            (n as f32).sqrt()
        }
    }
}

/// Render-side timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Target frame interval in seconds
    pub frame_interval: f32,
    /// Time constant of the per-node smoothing filters
    pub smoothing_mass: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
            smoothing_mass: DEFAULT_MASS,
        }
    }
}

/// Complete configuration for a layout session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub simulation: SimulationParameters,
    pub repulsion: RepulsionConfig,
    pub render: RenderConfig,
}

impl LayoutConfig {
    /// Load a configuration file (`.yaml`, `.yml` or `.json`)
    pub fn from_path(path: &Path) -> LayoutResult<Self> {
        let content = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let config: LayoutConfig = match ext.as_str() {
            "yaml" | "yml" => {
                serde_yaml::from_str(&content).map_err(|e| LayoutError::Parse(e.to_string()))?
            }
            "json" => {
                serde_json::from_str(&content).map_err(|e| LayoutError::Parse(e.to_string()))?
            }
            other => return Err(LayoutError::UnsupportedFormat(other.to_string())),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> LayoutResult<()> {
        let sim = &self.simulation;
        let finite_non_negative = [
            ("simulation.alpha", sim.alpha),
            ("simulation.alpha_decay", sim.alpha_decay),
            ("simulation.alpha_target", sim.alpha_target),
            ("simulation.width", sim.width),
            ("simulation.height", sim.height),
            ("simulation.velocity_decay", sim.velocity_decay),
            ("simulation.link_distance", sim.link_distance),
            ("repulsion.neighbor_size", self.repulsion.neighbor_size),
            ("repulsion.distance_min", self.repulsion.distance_min),
            ("render.frame_interval", self.render.frame_interval),
            ("render.smoothing_mass", self.render.smoothing_mass),
        ];
        for (name, value) in finite_non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(LayoutError::InvalidConfig(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        if !sim.repulsion_strength.is_finite() {
            return Err(LayoutError::InvalidConfig(
                "simulation.repulsion_strength must be finite".to_string(),
            ));
        }
        if sim.alpha_decay > 1.0 {
            return Err(LayoutError::InvalidConfig(
                "simulation.alpha_decay must not exceed 1".to_string(),
            ));
        }
        if let Some(max) = self.repulsion.distance_max {
            if max.is_nan() || max < self.repulsion.distance_min {
                return Err(LayoutError::InvalidConfig(
                    "repulsion.distance_max must be at least repulsion.distance_min".to_string(),
                ));
            }
        }
        Ok(())
    }
}
