//! Pluggable forces: link springs, exact many-body repulsion, centering
//!
//! Forces only add to node velocities (centering is the exception: it shifts
//! positions directly so it never adds momentum). Integration is left to the
//! engine.

use std::collections::HashMap;

use rand::Rng;
use rand::rngs::StdRng;
use tracing::warn;

use super::types::{JIGGLE_MAGNITUDE, SimLink, SimNode};
use crate::graph::GraphLink;

/// A force acting on the simulation's nodes
pub trait Force: Send {
    /// Called whenever the node set changes
    fn initialize(&mut self, nodes: &[SimNode], rng: &mut StdRng);

    /// Accumulate this force's contribution for one tick
    fn apply(&mut self, nodes: &mut [SimNode], alpha: f32, rng: &mut StdRng);

    /// Move the point this force pulls toward. Forces without one ignore it.
    fn set_center(&mut self, _x: f32, _y: f32) {}
}

/// Small random offset used to separate coincident nodes
pub(crate) fn jiggle(rng: &mut StdRng) -> f32 {
    (rng.r#gen::<f32>() - 0.5) * JIGGLE_MAGNITUDE
}

/// Spring force between linked nodes (d3 `forceLink`)
pub struct LinkForce {
    links: Vec<GraphLink>,
    distance: f32,
    resolved: Vec<SimLink>,
}

impl LinkForce {
    /// Create a link force with the given base rest length
    pub fn new(links: Vec<GraphLink>, distance: f32) -> Self {
        Self {
            links,
            distance,
            resolved: Vec::new(),
        }
    }

    /// Links that resolved against the current node set
    pub fn resolved(&self) -> &[SimLink] {
        &self.resolved
    }

    /// Rest length for a link: the base distance scaled by a positive weight
    fn rest_length(&self, weight: Option<f32>) -> f32 {
        match weight {
            Some(w) if w.is_finite() && w > 0.0 => self.distance * w,
            _ => self.distance,
        }
    }
}

impl Force for LinkForce {
    fn initialize(&mut self, nodes: &[SimNode], _rng: &mut StdRng) {
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let mut degree = vec![0usize; nodes.len()];
        let mut resolved = Vec::with_capacity(self.links.len());
        for link in &self.links {
            let (Some(&source), Some(&target)) =
                (index.get(link.source.as_str()), index.get(link.target.as_str()))
            else {
                warn!(source = %link.source, target = %link.target, "dropping link with unknown endpoint");
                continue;
            };
            degree[source] += 1;
            degree[target] += 1;
            resolved.push(SimLink {
                source,
                target,
                distance: self.rest_length(link.weight),
                strength: 0.0,
                bias: 0.0,
            });
        }

        for link in &mut resolved {
            let (ds, dt) = (degree[link.source] as f32, degree[link.target] as f32);
            link.strength = 1.0 / ds.min(dt);
            link.bias = ds / (ds + dt);
        }
        self.resolved = resolved;
    }

    fn apply(&mut self, nodes: &mut [SimNode], alpha: f32, rng: &mut StdRng) {
        for link in &self.resolved {
            let (s, t) = (link.source, link.target);

            let mut x = nodes[t].x + nodes[t].vx - nodes[s].x - nodes[s].vx;
            let mut y = nodes[t].y + nodes[t].vy - nodes[s].y - nodes[s].vy;
            if x == 0.0 {
                x = jiggle(rng);
            }
            if y == 0.0 {
                y = jiggle(rng);
            }

            let l = (x * x + y * y).sqrt();
            let l = (l - link.distance) / l * alpha * link.strength;
            x *= l;
            y *= l;

            nodes[t].vx -= x * link.bias;
            nodes[t].vy -= y * link.bias;
            nodes[s].vx += x * (1.0 - link.bias);
            nodes[s].vy += y * (1.0 - link.bias);
        }
    }
}

/// Exact all-pairs repulsion, O(n²) per tick
pub struct ManyBodyForce {
    strength: f32,
    distance_min_sq: f32,
    distance_max_sq: f32,
}

impl ManyBodyForce {
    /// `strength` is a charge: negative values repel
    pub fn new(strength: f32) -> Self {
        Self {
            strength,
            distance_min_sq: 1.0,
            distance_max_sq: f32::INFINITY,
        }
    }

    pub fn with_distance_min(mut self, distance: f32) -> Self {
        self.distance_min_sq = distance * distance;
        self
    }

    pub fn with_distance_max(mut self, distance: f32) -> Self {
        self.distance_max_sq = distance * distance;
        self
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }
}

impl Force for ManyBodyForce {
    fn initialize(&mut self, _nodes: &[SimNode], _rng: &mut StdRng) {}

    fn apply(&mut self, nodes: &mut [SimNode], alpha: f32, rng: &mut StdRng) {
        let n = nodes.len();
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let weight = self.strength * alpha;
                repel(
                    nodes,
                    i,
                    j,
                    weight,
                    self.distance_min_sq,
                    self.distance_max_sq,
                    rng,
                );
            }
        }
    }
}

/// Push node `i` along the axis to node `j` with `weight / distance²`.
///
/// Coincident axes get a random nudge; distances below the minimum are
/// softened and pairs beyond the maximum are skipped.
pub(crate) fn repel(
    nodes: &mut [SimNode],
    i: usize,
    j: usize,
    weight: f32,
    distance_min_sq: f32,
    distance_max_sq: f32,
    rng: &mut StdRng,
) {
    let mut x = nodes[j].x - nodes[i].x;
    let mut y = nodes[j].y - nodes[i].y;
    let mut l = x * x + y * y;

    if l >= distance_max_sq {
        return;
    }

    if x == 0.0 {
        x = jiggle(rng);
        l += x * x;
    }
    if y == 0.0 {
        y = jiggle(rng);
        l += y * y;
    }
    if l < distance_min_sq {
        l = (distance_min_sq * l).sqrt();
    }

    let w = weight / l;
    nodes[i].vx += x * w;
    nodes[i].vy += y * w;
}

/// Moves every node so the centroid lands on a target point (d3 `forceCenter`)
pub struct CenterForce {
    x: f32,
    y: f32,
    strength: f32,
}

impl CenterForce {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, strength: 1.0 }
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

impl Force for CenterForce {
    fn initialize(&mut self, _nodes: &[SimNode], _rng: &mut StdRng) {}

    fn set_center(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
    }

    fn apply(&mut self, nodes: &mut [SimNode], _alpha: f32, _rng: &mut StdRng) {
        if nodes.is_empty() {
            return;
        }
        let n = nodes.len() as f32;
        let (sx, sy) = nodes
            .iter()
            .fold((0.0, 0.0), |(sx, sy), node| (sx + node.x, sy + node.y));
        let dx = (sx / n - self.x) * self.strength;
        let dy = (sy / n - self.y) * self.strength;

        for node in nodes.iter_mut() {
            node.x -= dx;
            node.y -= dy;
        }
    }
}
