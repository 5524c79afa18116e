//! The force simulation: nodes, named forces, alpha schedule, integration

use std::collections::HashMap;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, trace, warn};

use super::approx::ApproxManyBodyForce;
use super::forces::{CenterForce, Force, LinkForce, ManyBodyForce};
use super::types::{ALPHA_EPSILON, SimNode};
use crate::buffer::{NodeLayout, PositionBuffer};
use crate::config::{RepulsionConfig, SimulationParameters};
use crate::graph::GraphData;

/// Name of the link force in the standard force set
pub const LINK_FORCE: &str = "link";
/// Name of the many-body force in the standard force set
pub const CHARGE_FORCE: &str = "charge";
/// Name of the centering force in the standard force set
pub const CENTER_FORCE: &str = "center";

/// CPU force simulation
///
/// Nodes are indexed by their position in an internal vector; the id index
/// and the buffer layout are rebuilt whenever the node set changes. The
/// engine never stops on its own: callers decide how many ticks to run.
pub struct ForceSimulation {
    nodes: Vec<SimNode>,
    index: HashMap<String, usize>,
    layout: Arc<NodeLayout>,
    forces: Vec<(String, Box<dyn Force>)>,
    alpha: f32,
    alpha_start: f32,
    alpha_decay: f32,
    alpha_target: f32,
    velocity_decay: f32,
    rng: StdRng,
}

impl ForceSimulation {
    /// Create a simulation with no forces
    pub fn new(nodes: Vec<SimNode>, params: &SimulationParameters) -> Self {
        let mut sim = Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            layout: Arc::default(),
            forces: Vec::new(),
            alpha: params.alpha,
            alpha_start: params.alpha,
            alpha_decay: params.alpha_decay,
            alpha_target: params.alpha_target,
            velocity_decay: params.velocity_decay,
            rng: StdRng::seed_from_u64(params.seed),
        };
        sim.set_nodes(nodes);
        sim
    }

    /// Build a simulation with the standard link, charge and center forces
    pub fn from_graph(
        graph: &GraphData,
        params: &SimulationParameters,
        repulsion: &RepulsionConfig,
    ) -> Self {
        let nodes = graph
            .unique_nodes()
            .into_iter()
            .enumerate()
            .map(|(i, node)| match (node.x, node.y) {
                (Some(x), Some(y)) => SimNode::new(node.id.clone(), x, y),
                _ => SimNode::placed(node.id.clone(), i),
            })
            .collect();

        let mut sim = Self::new(nodes, params);
        sim.add_force(
            LINK_FORCE,
            Box::new(LinkForce::new(graph.links.clone(), params.link_distance)),
        );
        sim.add_force(CHARGE_FORCE, charge_force(params, repulsion));
        let (cx, cy) = params.center();
        sim.add_force(CENTER_FORCE, Box::new(CenterForce::new(cx, cy)));

        info!(
            nodes = sim.nodes.len(),
            links = graph.links.len(),
            approximate = repulsion.approximate,
            "built force simulation"
        );
        sim
    }

    /// Replace the node set, rebuilding the index and re-initializing forces
    pub fn set_nodes(&mut self, nodes: Vec<SimNode>) {
        let mut index = HashMap::with_capacity(nodes.len());
        let mut unique = Vec::with_capacity(nodes.len());
        for node in nodes {
            if index.contains_key(&node.id) {
                warn!(id = %node.id, "dropping duplicate node id");
                continue;
            }
            index.insert(node.id.clone(), unique.len());
            unique.push(node);
        }

        self.layout = Arc::new(NodeLayout::new(
            unique.iter().map(|n| n.id.clone()).collect(),
        ));
        self.nodes = unique;
        self.index = index;
        for (_, force) in &mut self.forces {
            force.initialize(&self.nodes, &mut self.rng);
        }
    }

    /// Swap in a new graph, keeping position, velocity and pin of retained ids.
    ///
    /// New nodes take their initial position from the graph or the spiral.
    pub fn replace_graph(&mut self, graph: &GraphData, link_distance: f32) {
        let nodes: Vec<SimNode> = graph
            .unique_nodes()
            .into_iter()
            .enumerate()
            .map(|(i, node)| match self.node(&node.id) {
                Some(existing) => existing.clone(),
                None => match (node.x, node.y) {
                    (Some(x), Some(y)) => SimNode::new(node.id.clone(), x, y),
                    _ => SimNode::placed(node.id.clone(), i),
                },
            })
            .collect();

        let retained = nodes
            .iter()
            .filter(|n| self.index.contains_key(&n.id))
            .count();
        info!(
            nodes = nodes.len(),
            retained,
            links = graph.links.len(),
            "replacing simulation graph"
        );

        self.set_nodes(nodes);
        self.add_force(
            LINK_FORCE,
            Box::new(LinkForce::new(graph.links.clone(), link_distance)),
        );
    }

    /// Add a force, replacing any force registered under the same name
    pub fn add_force(&mut self, name: &str, mut force: Box<dyn Force>) {
        force.initialize(&self.nodes, &mut self.rng);
        match self.forces.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = force,
            None => self.forces.push((name.to_string(), force)),
        }
    }

    /// Remove a force by name
    pub fn remove_force(&mut self, name: &str) -> Option<Box<dyn Force>> {
        let position = self.forces.iter().position(|(n, _)| n == name)?;
        Some(self.forces.remove(position).1)
    }

    /// Names of the registered forces, in application order
    pub fn force_names(&self) -> impl Iterator<Item = &str> {
        self.forces.iter().map(|(n, _)| n.as_str())
    }

    /// Re-apply alpha schedule, velocity decay and centering.
    ///
    /// The current alpha is kept; node and link state is untouched.
    pub fn apply_parameters(&mut self, params: &SimulationParameters) {
        self.alpha_start = params.alpha;
        self.alpha_decay = params.alpha_decay;
        self.alpha_target = params.alpha_target;
        self.velocity_decay = params.velocity_decay;
        let (cx, cy) = params.center();
        self.set_center(cx, cy);
    }

    /// Move the centering target, adding the center force if it is missing
    pub fn set_center(&mut self, x: f32, y: f32) {
        match self.forces.iter_mut().find(|(name, _)| name == CENTER_FORCE) {
            Some((_, force)) => force.set_center(x, y),
            None => self.add_force(CENTER_FORCE, Box::new(CenterForce::new(x, y))),
        }
    }

    /// Run `iterations` ticks
    pub fn tick(&mut self, iterations: usize) {
        for _ in 0..iterations {
            self.alpha += (self.alpha_target - self.alpha) * self.alpha_decay;

            for (_, force) in &mut self.forces {
                force.apply(&mut self.nodes, self.alpha, &mut self.rng);
            }

            for node in &mut self.nodes {
                match node.fixed {
                    Some([fx, fy]) => {
                        node.x = fx;
                        node.y = fy;
                        node.vx = 0.0;
                        node.vy = 0.0;
                    }
                    None => {
                        node.vx *= self.velocity_decay;
                        node.vy *= self.velocity_decay;
                        node.x += node.vx;
                        node.y += node.vy;
                    }
                }
            }
        }
        trace!(alpha = self.alpha, iterations, "ticked");
    }

    /// Reset alpha to its starting value
    pub fn reheat(&mut self) {
        self.alpha = self.alpha_start;
    }

    /// Get current alpha value
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Check if alpha has settled on its target
    pub fn is_converged(&self) -> bool {
        (self.alpha - self.alpha_target).abs() < ALPHA_EPSILON
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&SimNode> {
        self.node_index(id).map(|i| &self.nodes[i])
    }

    /// Overwrite a node's position; returns `false` for unknown ids
    pub fn set_position(&mut self, id: &str, x: f32, y: f32) -> bool {
        let Some(i) = self.node_index(id) else {
            return false;
        };
        let node = &mut self.nodes[i];
        node.x = x;
        node.y = y;
        true
    }

    /// Pin or release a node; returns `false` for unknown ids
    pub fn set_fixed(&mut self, id: &str, fixed: Option<(f32, f32)>) -> bool {
        let Some(i) = self.node_index(id) else {
            return false;
        };
        self.nodes[i].fixed = fixed.map(|(x, y)| [x, y]);
        true
    }

    /// Slot layout of the current node set
    pub fn layout(&self) -> &Arc<NodeLayout> {
        &self.layout
    }

    /// Write current positions into `buffer`, in node order
    pub fn write_positions(&self, buffer: &mut PositionBuffer) {
        buffer.write(&self.layout, self.nodes.iter().map(|n| (n.x, n.y)));
    }
}

/// The many-body force selected by the repulsion config
pub fn charge_force(params: &SimulationParameters, repulsion: &RepulsionConfig) -> Box<dyn Force> {
    if repulsion.approximate {
        Box::new(ApproxManyBodyForce::new(params.charge(), repulsion.clone()))
    } else {
        let mut force = ManyBodyForce::new(params.charge()).with_distance_min(repulsion.distance_min);
        if let Some(max) = repulsion.distance_max {
            force = force.with_distance_max(max);
        }
        Box::new(force)
    }
}
