//! smoothgraph - Real-time force-directed graph layout.
//!
//! A d3-style force simulation runs on its own thread and hands node
//! positions to a render coordinator through an ownership-transferred
//! buffer. The coordinator smooths every node toward its latest simulated
//! position once per display frame, so visible motion does not depend on
//! how often the solver answers.

pub mod buffer;
pub mod config;
pub mod error;
pub mod graph;
pub mod host;
pub mod render;
pub mod simulation;
pub mod smooth;
