//! Force-directed graph layout (d3-force on the CPU)
//!
//! This module provides the position solver behind the simulation host. It
//! follows d3-force's model: forces accumulate velocity, alpha scales every
//! force and decays geometrically toward a floor, and integration applies a
//! velocity decay before moving each node.
//!
//! # Example
//!
//! ```rust
//! use smoothgraph::config::{RepulsionConfig, SimulationParameters};
//! use smoothgraph::graph::{GraphData, GraphLink, GraphNode};
//! use smoothgraph::simulation::ForceSimulation;
//!
//! let graph = GraphData::new(
//!     vec![GraphNode::new("a"), GraphNode::new("b")],
//!     vec![GraphLink::new("a", "b")],
//! );
//! let mut sim = ForceSimulation::from_graph(
//!     &graph,
//!     &SimulationParameters::default(),
//!     &RepulsionConfig::default(),
//! );
//! sim.tick(100);
//! assert_eq!(sim.node_count(), 2);
//! ```
//!
//! # Forces
//!
//! - **Link Force**: Spring forces between connected nodes
//! - **Many-Body Force**: Repulsion between nodes, exact or approximate
//! - **Center Force**: Keeps the centroid on the viewport centre

mod approx;
mod engine;
mod forces;
mod types;

pub use approx::{ApproxManyBodyForce, SizeFn};
pub use engine::{CENTER_FORCE, CHARGE_FORCE, ForceSimulation, LINK_FORCE, charge_force};
pub use forces::{CenterForce, Force, LinkForce, ManyBodyForce};
pub use types::{ALPHA_EPSILON, INITIAL_RADIUS, JIGGLE_MAGNITUDE, SimLink, SimNode, phyllotaxis};
