//! Approximate many-body repulsion, O(n) per tick
//!
//! Two estimators are combined per node:
//!
//! - **Sampling**: a rotating window of roughly `n^0.75` nodes per tick is
//!   repelled by roughly `n^0.25` randomly drawn nodes each.
//! - **Cached neighbors**: every node keeps a small set of approximate nearest
//!   neighbors that get exact repulsion every tick. One random candidate per
//!   tick replaces the farthest tracked neighbor if it is closer.
//!
//! Both contributions are scaled by a node-count dependent charge multiplier
//! so the overall spread stays visually stable across graph sizes.

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::forces::{Force, repel};
use super::types::SimNode;
use crate::config::RepulsionConfig;

/// Neighbor-set size as a function of node count
pub type SizeFn = Box<dyn Fn(usize) -> f32 + Send>;

/// Sampled repulsion with cached nearest neighbors
pub struct ApproxManyBodyForce {
    strength: f32,
    config: RepulsionConfig,
    neighbor_size: Option<SizeFn>,

    indices: Vec<usize>,
    nearest: Vec<Vec<usize>>,
    prev_index: usize,
    num_neighbors: usize,
    num_update: usize,
    num_samples: usize,
    charge_multiplier: f32,
}

impl ApproxManyBodyForce {
    /// `strength` is a charge: negative values repel
    pub fn new(strength: f32, config: RepulsionConfig) -> Self {
        Self {
            strength,
            config,
            neighbor_size: None,
            indices: Vec::new(),
            nearest: Vec::new(),
            prev_index: 0,
            num_neighbors: 0,
            num_update: 0,
            num_samples: 0,
            charge_multiplier: 1.0,
        }
    }

    /// Derive the neighbor-set size from the node count instead of the config
    pub fn with_neighbor_size(mut self, size: impl Fn(usize) -> f32 + Send + 'static) -> Self {
        self.neighbor_size = Some(Box::new(size));
        self
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }

    pub fn config(&self) -> &RepulsionConfig {
        &self.config
    }

    /// Cached neighbor indices of node `i`
    pub fn nearest(&self, i: usize) -> &[usize] {
        self.nearest.get(i).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Index where the next tick's sampling window starts
    pub fn window_start(&self) -> usize {
        self.prev_index
    }

    /// `(neighbors, window, samples)` sizes for the current node count
    pub fn sizes(&self) -> (usize, usize, usize) {
        (self.num_neighbors, self.num_update, self.num_samples)
    }

    /// Offer one random candidate to node `i`'s neighbor set
    fn add_random_node(&mut self, nodes: &[SimNode], i: usize, rng: &mut StdRng) {
        let candidate = rng.gen_range(0..nodes.len());
        let nearest = &mut self.nearest[i];
        if candidate == i || nearest.contains(&candidate) {
            return;
        }
        if nearest.len() < self.num_neighbors {
            nearest.push(candidate);
            return;
        }

        let node = &nodes[i];
        let farthest = nearest
            .iter()
            .enumerate()
            .map(|(slot, &j)| (slot, node.distance_sq(&nodes[j])))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((slot, max_dist)) = farthest {
            if node.distance_sq(&nodes[candidate]) < max_dist {
                nearest[slot] = candidate;
            }
        }
    }

    /// Repel node `i` from a fresh random sample of nodes
    fn sampled_repulse(&mut self, nodes: &mut [SimNode], i: usize, weight: f32, rng: &mut StdRng) {
        let (min_sq, max_sq) = self.distance_bounds();
        let (sample, _) = self.indices.partial_shuffle(rng, self.num_samples);
        for &j in sample.iter() {
            if j != i {
                repel(nodes, i, j, weight, min_sq, max_sq, rng);
            }
        }
    }

    /// Refresh node `i`'s neighbor set, then repel it from every neighbor
    fn neighbor_repulse(&mut self, nodes: &mut [SimNode], i: usize, weight: f32, rng: &mut StdRng) {
        self.add_random_node(nodes, i, rng);
        let (min_sq, max_sq) = self.distance_bounds();
        for &j in &self.nearest[i] {
            repel(nodes, i, j, weight, min_sq, max_sq, rng);
        }
    }

    fn distance_bounds(&self) -> (f32, f32) {
        let min = self.config.distance_min;
        let max_sq = self.config.distance_max.map_or(f32::INFINITY, |d| d * d);
        (min * min, max_sq)
    }
}

/// `ceil(value)` clamped to `[0, upper]`
fn clamp_size(value: f32, upper: usize) -> usize {
    let value = value.ceil();
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        (value as usize).min(upper)
    }
}

impl Force for ApproxManyBodyForce {
    fn initialize(&mut self, nodes: &[SimNode], rng: &mut StdRng) {
        let n = nodes.len();
        let neighbor_size = match &self.neighbor_size {
            Some(size) => size(n),
            None => self.config.neighbor_size,
        };

        self.indices = (0..n).collect();
        // A node never tracks itself, so at most n - 1 neighbors fit.
        self.num_neighbors = clamp_size(neighbor_size, n.saturating_sub(1));
        self.num_update = clamp_size((n as f32).powf(self.config.update_exponent), n);
        self.num_samples = clamp_size((n as f32).powf(self.config.sample_exponent), n);
        self.charge_multiplier = self.config.charge_multiplier(n);
        self.prev_index = 0;

        self.nearest = vec![Vec::with_capacity(self.num_neighbors); n];
        for i in 0..n {
            while self.nearest[i].len() < self.num_neighbors {
                self.add_random_node(nodes, i, rng);
            }
        }
    }

    fn apply(&mut self, nodes: &mut [SimNode], alpha: f32, rng: &mut StdRng) {
        let n = nodes.len();
        if n == 0 {
            return;
        }
        if self.nearest.len() != n {
            self.initialize(nodes, rng);
        }

        let weight = self.strength * alpha * self.charge_multiplier;
        let upper = self.prev_index + self.num_update;
        let (mut i, mut j) = (0, self.prev_index);
        while i < n || j < upper {
            if j < upper {
                self.sampled_repulse(nodes, j % n, weight, rng);
            }
            if self.num_neighbors > 0 && i < n {
                self.neighbor_repulse(nodes, i, weight, rng);
            }
            i += 1;
            j += 1;
        }
        self.prev_index = upper % n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::phyllotaxis;
    use rand::SeedableRng;

    fn spiral(n: usize) -> Vec<SimNode> {
        (0..n)
            .map(|i| {
                let (x, y) = phyllotaxis(i);
                SimNode::new(format!("n{i}"), x, y)
            })
            .collect()
    }

    #[test]
    fn sizes_follow_exponents() {
        let nodes = spiral(100);
        let mut force = ApproxManyBodyForce::new(-5.0, RepulsionConfig::default());
        force.initialize(&nodes, &mut StdRng::seed_from_u64(0));

        // ceil(100^0.75) = ceil(31.6), ceil(100^0.25) = ceil(3.16)
        assert_eq!(force.sizes(), (15, 32, 4));
    }

    #[test]
    fn small_graphs_clamp_sizes() {
        let nodes = spiral(3);
        let mut force = ApproxManyBodyForce::new(-5.0, RepulsionConfig::default());
        force.initialize(&nodes, &mut StdRng::seed_from_u64(0));

        let (neighbors, window, samples) = force.sizes();
        assert_eq!(neighbors, 2);
        assert!(window <= 3);
        assert!(samples <= 3);
        for i in 0..3 {
            assert_eq!(force.nearest(i).len(), 2);
            assert!(!force.nearest(i).contains(&i));
        }
    }

    #[test]
    fn neighbor_sets_have_no_duplicates_or_self() {
        let nodes = spiral(100);
        let mut force = ApproxManyBodyForce::new(-5.0, RepulsionConfig::default());
        let mut rng = StdRng::seed_from_u64(9);
        force.initialize(&nodes, &mut rng);

        for i in 0..nodes.len() {
            let mut seen = force.nearest(i).to_vec();
            assert_eq!(seen.len(), 15);
            assert!(!seen.contains(&i));
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), 15);
        }
    }

    #[test]
    fn neighbor_sets_converge_toward_close_nodes() {
        let mut nodes = spiral(200);
        let mut force = ApproxManyBodyForce::new(0.0, RepulsionConfig::default());
        let mut rng = StdRng::seed_from_u64(4);
        force.initialize(&nodes, &mut rng);

        let mean_neighbor_distance = |force: &ApproxManyBodyForce, nodes: &[SimNode]| {
            let mut total = 0.0;
            for (i, node) in nodes.iter().enumerate() {
                for &j in force.nearest(i) {
                    total += node.distance_sq(&nodes[j]).sqrt();
                }
            }
            total
        };

        let before = mean_neighbor_distance(&force, &nodes);
        for _ in 0..300 {
            force.apply(&mut nodes, 1.0, &mut rng);
        }
        let after = mean_neighbor_distance(&force, &nodes);
        assert!(after < before, "neighbors did not tighten: {after} >= {before}");
    }

    #[test]
    fn window_rotates() {
        let mut nodes = spiral(10);
        let mut force = ApproxManyBodyForce::new(-5.0, RepulsionConfig::default());
        let mut rng = StdRng::seed_from_u64(2);
        force.initialize(&nodes, &mut rng);

        // ceil(10^0.75) = ceil(5.6)
        assert_eq!(force.window_start(), 0);
        force.apply(&mut nodes, 1.0, &mut rng);
        assert_eq!(force.window_start(), 6);
        force.apply(&mut nodes, 1.0, &mut rng);
        assert_eq!(force.window_start(), 2);
    }

    #[test]
    fn repulsion_pushes_pair_apart() {
        let mut nodes = vec![SimNode::new("a", 0.0, 0.0), SimNode::new("b", 10.0, 0.0)];
        let mut force = ApproxManyBodyForce::new(-30.0, RepulsionConfig::default());
        let mut rng = StdRng::seed_from_u64(5);
        force.initialize(&nodes, &mut rng);
        force.apply(&mut nodes, 1.0, &mut rng);

        assert!(nodes[0].vx < 0.0);
        assert!(nodes[1].vx > 0.0);
    }

    #[test]
    fn custom_neighbor_size() {
        let nodes = spiral(50);
        let mut force = ApproxManyBodyForce::new(-5.0, RepulsionConfig::default())
            .with_neighbor_size(|n| n as f32 / 10.0);
        force.initialize(&nodes, &mut StdRng::seed_from_u64(0));
        assert_eq!(force.sizes().0, 5);
    }

    #[test]
    fn empty_and_single_node_graphs() {
        let mut force = ApproxManyBodyForce::new(-5.0, RepulsionConfig::default());
        let mut rng = StdRng::seed_from_u64(0);
        force.apply(&mut [], 1.0, &mut rng);

        let mut single = spiral(1);
        force.initialize(&single, &mut rng);
        force.apply(&mut single, 1.0, &mut rng);
        assert_eq!(single[0].vx, 0.0);
        assert_eq!(single[0].vy, 0.0);
    }

    #[test]
    fn charge_multiplier_scales_repulsion() {
        let run = |config: RepulsionConfig| {
            let mut nodes = spiral(150);
            let mut force = ApproxManyBodyForce::new(-5.0, config);
            let mut rng = StdRng::seed_from_u64(12);
            force.initialize(&nodes, &mut rng);
            force.apply(&mut nodes, 1.0, &mut rng);
            nodes
        };

        let scaled = run(RepulsionConfig::default());
        let flat = run(RepulsionConfig {
            multiplier_low: 10_000,
            multiplier_high: 10_000,
            ..Default::default()
        });

        let multiplier = RepulsionConfig::default().charge_multiplier(150);
        assert_eq!(multiplier, 3.0);

        let largest = flat
            .iter()
            .map(|node| node.vx.abs().max(node.vy.abs()))
            .fold(0.0f32, f32::max);
        assert!(largest > 0.0);
        let tolerance = largest * multiplier * 1e-4;
        for (a, b) in scaled.iter().zip(&flat) {
            assert!((a.vx - b.vx * multiplier).abs() <= tolerance, "{} vs {}", a.vx, b.vx);
            assert!((a.vy - b.vy * multiplier).abs() <= tolerance, "{} vs {}", a.vy, b.vy);
        }
    }
}
