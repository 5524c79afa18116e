//! Node and link types owned by the simulation

use std::f32::consts::PI;

// =============================================================================
// Default Constants
// =============================================================================

/// Radius scale of the initial phyllotaxis placement (matches d3)
pub const INITIAL_RADIUS: f32 = 10.0;

/// Alpha is considered settled once it is this close to `alpha_target`
pub const ALPHA_EPSILON: f32 = 1e-3;

/// Magnitude of the random nudge applied to coincident nodes
pub const JIGGLE_MAGNITUDE: f32 = 1e-6;

/// A node with position and velocity for simulation
#[derive(Debug, Clone, PartialEq)]
pub struct SimNode {
    /// Node ID (from GraphNode)
    pub id: String,
    /// Position in 2D space
    pub x: f32,
    pub y: f32,
    /// Velocity
    pub vx: f32,
    pub vy: f32,
    /// When set, the node is pinned here and its velocity is zeroed each tick
    pub fixed: Option<[f32; 2]>,
}

impl SimNode {
    /// Create a node at rest at the given position
    pub fn new(id: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            fixed: None,
        }
    }

    /// Create a node at slot `index` of the initial phyllotaxis spiral
    pub fn placed(id: impl Into<String>, index: usize) -> Self {
        let (x, y) = phyllotaxis(index);
        Self::new(id, x, y)
    }

    /// Pin the node at the given position
    pub fn with_fixed(mut self, fx: f32, fy: f32) -> Self {
        self.fixed = Some([fx, fy]);
        self
    }

    /// Check if this node has a fixed position
    pub fn is_fixed(&self) -> bool {
        self.fixed.is_some()
    }

    /// Squared distance to another node
    pub fn distance_sq(&self, other: &SimNode) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// A resolved link (indices into the node array)
#[derive(Debug, Clone, PartialEq)]
pub struct SimLink {
    pub source: usize,
    pub target: usize,
    /// Rest length
    pub distance: f32,
    /// Spring constant
    pub strength: f32,
    /// Share of the correction applied to the target (the rest goes to the source)
    pub bias: f32,
}

/// Position of slot `index` on a sunflower spiral around the origin
pub fn phyllotaxis(index: usize) -> (f32, f32) {
    let angle_step = PI * (3.0 - 5.0_f32.sqrt());
    let radius = INITIAL_RADIUS * (0.5 + index as f32).sqrt();
    let angle = index as f32 * angle_step;
    (radius * angle.cos(), radius * angle.sin())
}
