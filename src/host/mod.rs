//! Simulation host
//!
//! Owns the force simulation and the current graph. Every operation is
//! synchronous; [`worker`] runs a host on its own thread and serializes
//! requests so no two ever touch the engine at once.

pub mod worker;

use tracing::{debug, info, warn};

use crate::buffer::PositionBuffer;
use crate::config::{RepulsionConfig, SimulationParameters};
use crate::error::HostError;
use crate::graph::{GraphData, NodePosition};
use crate::simulation::{CHARGE_FORCE, ForceSimulation, LINK_FORCE, LinkForce, charge_force};

pub use worker::{Completed, HostRequest, RequestScheduler, SimulationClient, SimulationWorker};

/// Owner of one force simulation
pub struct SimulationHost {
    simulation: Option<ForceSimulation>,
    graph: Option<GraphData>,
    params: SimulationParameters,
    repulsion: RepulsionConfig,
}

impl Default for SimulationHost {
    fn default() -> Self {
        Self::new(RepulsionConfig::default())
    }
}

impl SimulationHost {
    pub fn new(repulsion: RepulsionConfig) -> Self {
        Self {
            simulation: None,
            graph: None,
            params: SimulationParameters::default(),
            repulsion,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.simulation.is_some()
    }

    /// The engine, once built
    pub fn simulation(&self) -> Option<&ForceSimulation> {
        self.simulation.as_ref()
    }

    /// Graph the engine was built from (or will be built from)
    pub fn graph(&self) -> Option<&GraphData> {
        self.graph.as_ref()
    }

    /// Build the engine, run the configured ticks and fill `buffer`.
    ///
    /// Only the first call builds anything; later calls just refresh the
    /// buffer from the existing state. A graph stored by an earlier
    /// [`update_graph`](Self::update_graph) takes precedence over `graph`.
    pub fn create_simulation(
        &mut self,
        graph: GraphData,
        params: &SimulationParameters,
        mut buffer: PositionBuffer,
    ) -> PositionBuffer {
        let simulation = match self.simulation.take() {
            Some(simulation) => {
                debug!("simulation already initialized; refreshing buffer");
                simulation
            }
            None => {
                let graph = self.graph.get_or_insert(graph);
                let mut simulation = ForceSimulation::from_graph(graph, params, &self.repulsion);
                simulation.tick(params.iterations);
                self.params = params.clone();
                info!(
                    nodes = simulation.node_count(),
                    iterations = params.iterations,
                    "simulation initialized"
                );
                simulation
            }
        };

        simulation.write_positions(&mut buffer);
        self.simulation = Some(simulation);
        buffer
    }

    /// Re-apply parameters, tick, and fill `buffer`.
    ///
    /// Before [`create_simulation`](Self::create_simulation) the request is
    /// rejected and the buffer handed back inside the error.
    pub fn update_buffers(
        &mut self,
        params: &SimulationParameters,
        mut buffer: PositionBuffer,
    ) -> Result<PositionBuffer, HostError> {
        let Some(simulation) = self.simulation.as_mut() else {
            warn!("buffer update requested before the simulation was initialized");
            return Err(HostError::NotInitialized(buffer));
        };

        if params.repulsion_strength != self.params.repulsion_strength {
            simulation.add_force(CHARGE_FORCE, charge_force(params, &self.repulsion));
        }
        if params.link_distance != self.params.link_distance {
            let links = self
                .graph
                .as_ref()
                .map(|g| g.links.clone())
                .unwrap_or_default();
            simulation.add_force(
                LINK_FORCE,
                Box::new(LinkForce::new(links, params.link_distance)),
            );
        }
        simulation.apply_parameters(params);
        simulation.tick(params.iterations);
        simulation.write_positions(&mut buffer);
        self.params = params.clone();

        Ok(buffer)
    }

    /// Overwrite engine coordinates from externally committed positions.
    ///
    /// Returns how many nodes were updated. Unknown ids are skipped; before
    /// initialization nothing happens.
    pub fn update_node_positions(&mut self, positions: &[NodePosition]) -> usize {
        let Some(simulation) = self.simulation.as_mut() else {
            debug!(
                count = positions.len(),
                "ignoring node positions before initialization"
            );
            return 0;
        };

        let mut applied = 0;
        for position in positions {
            if simulation.set_position(&position.id, position.x, position.y) {
                applied += 1;
            } else {
                warn!(id = %position.id, "position pushed for unknown node");
            }
        }
        applied
    }

    /// Swap node and link sets, keeping computed positions of retained ids
    pub fn update_graph(&mut self, graph: GraphData) {
        if let Some(simulation) = self.simulation.as_mut() {
            simulation.replace_graph(&graph, self.params.link_distance);
        }
        self.graph = Some(graph);
    }
}
