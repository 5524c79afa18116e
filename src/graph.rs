//! Graph data types and loaders
//!
//! The graph is an input snapshot: nodes with unique ids and links that
//! reference them. It is cloned into the simulation host and never shared
//! mutably between roles.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LayoutError, LayoutResult};

/// A node in the input graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique identifier, stable for the node's lifetime
    pub id: String,

    /// Optional initial position; nodes without one are placed by the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
}

impl GraphNode {
    /// Create a node with no initial position
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            x: None,
            y: None,
        }
    }

    /// Give the node an initial position
    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }
}

/// A link between two nodes, by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
    /// Source node ID
    pub source: String,

    /// Target node ID
    pub target: String,

    /// Scales the link's rest length
    #[serde(default, alias = "value", skip_serializing_if = "Option::is_none")]
    pub weight: Option<f32>,
}

impl GraphLink {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = Some(weight);
        self
    }
}

/// Complete graph snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,

    #[serde(default)]
    pub links: Vec<GraphLink>,
}

impl GraphData {
    pub fn new(nodes: Vec<GraphNode>, links: Vec<GraphLink>) -> Self {
        Self { nodes, links }
    }

    /// Nodes in slot order with duplicate ids removed (first occurrence wins).
    ///
    /// Both the simulation host and the render coordinator derive their node
    /// order from this, so buffer slots line up on both sides.
    pub fn unique_nodes(&self) -> Vec<&GraphNode> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        self.nodes
            .iter()
            .filter(|node| {
                let fresh = seen.insert(node.id.as_str());
                if !fresh {
                    warn!(id = %node.id, "dropping duplicate node id");
                }
                fresh
            })
            .collect()
    }
}

/// Externally committed position of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: String,
    pub x: f32,
    pub y: f32,
}

impl NodePosition {
    pub fn new(id: impl Into<String>, x: f32, y: f32) -> Self {
        Self { id: id.into(), x, y }
    }
}

/// Read a graph from a `.json`, `.yaml` or `.yml` file
pub fn read_graph(path: &Path) -> LayoutResult<GraphData> {
    let content = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "json" => serde_json::from_str(&content).map_err(|e| LayoutError::Parse(e.to_string())),
        "yaml" | "yml" => {
            serde_yaml::from_str(&content).map_err(|e| LayoutError::Parse(e.to_string()))
        }
        other => Err(LayoutError::UnsupportedFormat(other.to_string())),
    }
}

/// Write a graph as pretty-printed JSON
pub fn write_graph(graph: &GraphData, path: &Path) -> LayoutResult<()> {
    let json = serde_json::to_string_pretty(graph).map_err(|e| LayoutError::Parse(e.to_string()))?;
    fs::write(path, json)?;
    Ok(())
}

/// Generate a random graph of `num_nodes` nodes (`node0`, `node1`, ...) and
/// `num_links` links between distinct random endpoints, weights in `0..=9`.
pub fn random_graph<R: Rng>(num_nodes: usize, num_links: usize, rng: &mut R) -> GraphData {
    let nodes: Vec<GraphNode> = (0..num_nodes)
        .map(|n| GraphNode::new(format!("node{n}")))
        .collect();

    let mut links = Vec::with_capacity(if num_nodes > 1 { num_links } else { 0 });
    if nodes.len() > 1 {
        for _ in 0..num_links {
            let pair: Vec<&GraphNode> = nodes.choose_multiple(rng, 2).collect();
            let weight = f32::from(rng.gen_range(0..=9u8));
            links.push(GraphLink::new(pair[0].id.clone(), pair[1].id.clone()).with_weight(weight));
        }
    }

    GraphData { nodes, links }
}
