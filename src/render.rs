//! Render coordinator
//!
//! Runs once per display frame. Positions arrive from the simulation host in
//! discrete batches and become filter targets; every frame the per-node
//! filters advance and the smoothed positions go out to a [`FrameSink`].
//! Dragged nodes bypass both the filters and the engine until released.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::buffer::{NodeLayout, PositionBuffer};
use crate::config::{LayoutConfig, SimulationParameters};
use crate::error::{LayoutError, LayoutResult};
use crate::graph::{GraphData, NodePosition};
use crate::host::{RequestScheduler, SimulationClient};
use crate::smooth::SmoothFollow;

/// A node as handed to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeGlyph<'a> {
    pub id: &'a str,
    pub x: f32,
    pub y: f32,
}

/// An edge as handed to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeSegment {
    pub source_x: f32,
    pub source_y: f32,
    pub target_x: f32,
    pub target_y: f32,
}

/// Presentation layer: receives one snapshot per frame and must not keep it
pub trait FrameSink {
    fn present(&mut self, nodes: &[NodeGlyph<'_>], edges: &[EdgeSegment]) -> LayoutResult<()>;
}

/// Per-node render state, indexed by id in the coordinator
#[derive(Debug, Clone)]
pub struct NodeState {
    id: String,
    x: SmoothFollow,
    y: SmoothFollow,
    dragging: bool,
    fixed: Option<(f32, f32)>,
    /// Buffers from requests numbered below this are ignored for the node
    hold_until: u64,
}

impl NodeState {
    fn new(id: String, (x, y): (f32, f32), mass: f32) -> Self {
        let mut state = Self {
            id,
            x: SmoothFollow::new(x, mass),
            y: SmoothFollow::new(y, mass),
            dragging: false,
            fixed: None,
            hold_until: 0,
        };
        // Later targets glide in from here rather than jumping.
        state.x.set(x);
        state.y.set(y);
        state
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Position as presented: the fixed position while dragging, else smoothed
    pub fn position(&self) -> (f32, f32) {
        self.fixed.unwrap_or((self.x.smooth(), self.y.smooth()))
    }

    /// Current filter targets
    pub fn target(&self) -> (f32, f32) {
        (self.x.target(), self.y.target())
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn fixed(&self) -> Option<(f32, f32)> {
        self.fixed
    }
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    node: usize,
    offset: (f32, f32),
}

/// Per-frame driver between the simulation host and the presentation layer
pub struct RenderCoordinator {
    nodes: Vec<NodeState>,
    index: HashMap<String, usize>,
    links: Vec<(usize, usize)>,
    graph: GraphData,
    params: SimulationParameters,
    mass: f32,
    client: SimulationClient,
    scheduler: RequestScheduler,
    drag: Option<Drag>,
    created: bool,
    /// Buffer slot to node index, valid for one buffer layout
    slot_map: Option<(Arc<NodeLayout>, Vec<Option<usize>>)>,
}

impl RenderCoordinator {
    /// Fails with `InvalidConfig` when the frame interval is not a
    /// non-negative finite number of seconds.
    pub fn new(
        graph: GraphData,
        config: &LayoutConfig,
        client: SimulationClient,
    ) -> LayoutResult<Self> {
        let interval = Duration::try_from_secs_f32(config.render.frame_interval).map_err(|_| {
            LayoutError::InvalidConfig(format!(
                "render.frame_interval must be a non-negative number of seconds, got {}",
                config.render.frame_interval
            ))
        })?;
        let mut coordinator = Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            links: Vec::new(),
            graph: GraphData::default(),
            params: config.simulation.clone(),
            mass: config.render.smoothing_mass,
            client,
            scheduler: RequestScheduler::new(interval),
            drag: None,
            created: false,
            slot_map: None,
        };
        coordinator.rebuild(graph);
        info!(
            nodes = coordinator.nodes.len(),
            links = coordinator.links.len(),
            "render coordinator ready"
        );
        Ok(coordinator)
    }

    /// Run one display frame.
    ///
    /// Never blocks on the simulation host: a reply that has not arrived yet
    /// is picked up by a later frame.
    pub fn frame<S>(&mut self, now: Instant, dt: f32, sink: &mut S) -> LayoutResult<()>
    where
        S: FrameSink + ?Sized,
    {
        self.receive(now)?;
        self.request(now)?;

        for node in self.nodes.iter_mut().filter(|n| !n.dragging) {
            node.x.advance(dt);
            node.y.advance(dt);
        }

        self.present(sink)
    }

    /// Start dragging `id`; `pointer` is in graph space
    pub fn drag_start(&mut self, id: &str, pointer: (f32, f32)) -> LayoutResult<()> {
        let i = self.index_of(id)?;
        if self.drag.is_some() {
            self.drag_end()?;
        }

        let node = &mut self.nodes[i];
        let (x, y) = node.position();
        node.dragging = true;
        node.fixed = Some((x, y));
        self.drag = Some(Drag {
            node: i,
            offset: (pointer.0 - x, pointer.1 - y),
        });
        debug!(id, x, y, "drag started");
        Ok(())
    }

    pub fn drag_move(&mut self, pointer: (f32, f32)) -> LayoutResult<()> {
        let drag = self.drag.ok_or(LayoutError::NoActiveDrag)?;
        self.nodes[drag.node].fixed = Some((pointer.0 - drag.offset.0, pointer.1 - drag.offset.1));
        Ok(())
    }

    /// Release the dragged node where it is and tell the host about it.
    ///
    /// Buffers from requests issued before the release are ignored for this
    /// node, so it cannot snap back to a pre-release position.
    pub fn drag_end(&mut self) -> LayoutResult<NodePosition> {
        let drag = self.drag.take().ok_or(LayoutError::NoActiveDrag)?;
        let hold_until = self.client.next_seq();

        let node = &mut self.nodes[drag.node];
        let (x, y) = node.position();
        node.fixed = None;
        node.dragging = false;
        node.x.reset(x);
        node.y.reset(y);
        node.hold_until = hold_until;

        let position = NodePosition::new(node.id.clone(), x, y);
        debug!(id = %position.id, x, y, "drag ended");
        self.client.push_positions(vec![position.clone()])?;
        Ok(position)
    }

    /// Viewport size used by the next request
    pub fn resize(&mut self, width: f32, height: f32) {
        self.params.width = width;
        self.params.height = height;
    }

    /// Swap in a new graph, keeping render state of retained ids
    pub fn update_graph(&mut self, graph: GraphData) -> LayoutResult<()> {
        let dragged = self.drag.map(|d| self.nodes[d.node].id.clone());
        self.rebuild(graph);

        self.drag = match (self.drag, dragged) {
            (Some(drag), Some(id)) => self.index.get(&id).map(|&node| Drag { node, ..drag }),
            _ => None,
        };
        info!(
            nodes = self.nodes.len(),
            links = self.links.len(),
            "graph updated"
        );
        if self.created {
            self.client.push_graph(self.graph.clone())?;
        }
        Ok(())
    }

    pub fn nodes(&self) -> &[NodeState] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&NodeState> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Presented position of `id`
    pub fn position(&self, id: &str) -> Option<(f32, f32)> {
        self.node(id).map(NodeState::position)
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn client(&self) -> &SimulationClient {
        &self.client
    }

    pub fn scheduler(&self) -> &RequestScheduler {
        &self.scheduler
    }

    fn index_of(&self, id: &str) -> LayoutResult<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| LayoutError::UnknownNode(id.to_string()))
    }

    fn rebuild(&mut self, graph: GraphData) {
        let center = self.params.center();
        let mut previous: HashMap<String, NodeState> = self
            .nodes
            .drain(..)
            .map(|state| (state.id.clone(), state))
            .collect();

        let nodes: Vec<NodeState> = graph
            .unique_nodes()
            .into_iter()
            .map(|node| {
                previous.remove(&node.id).unwrap_or_else(|| {
                    let start = match (node.x, node.y) {
                        (Some(x), Some(y)) => (x, y),
                        _ => center,
                    };
                    NodeState::new(node.id.clone(), start, self.mass)
                })
            })
            .collect();

        self.index = nodes
            .iter()
            .enumerate()
            .map(|(i, state)| (state.id.clone(), i))
            .collect();
        self.links = graph
            .links
            .iter()
            .filter_map(|link| {
                let source = self.index.get(&link.source)?;
                let target = self.index.get(&link.target)?;
                Some((*source, *target))
            })
            .collect();
        self.nodes = nodes;
        self.graph = graph;
        self.slot_map = None;
    }

    fn receive(&mut self, now: Instant) -> LayoutResult<()> {
        let completed = match self.client.poll(now) {
            Ok(Some(completed)) => completed,
            Ok(None) => return Ok(()),
            Err(LayoutError::NotInitialized) => {
                warn!("host has no simulation; sending the graph again");
                self.created = false;
                self.scheduler.reset();
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        self.scheduler.record(now, completed.round_trip);

        let Some(buffer) = self.client.buffer() else {
            return Ok(());
        };
        let map = slot_map(&mut self.slot_map, &self.index, buffer);
        for (slot, target) in map.iter().enumerate() {
            let (Some(i), Some((x, y))) = (*target, buffer.get(slot)) else {
                continue;
            };
            let node = &mut self.nodes[i];
            if node.dragging || completed.seq < node.hold_until {
                continue;
            }
            node.x.set(x);
            node.y.set(y);
        }
        Ok(())
    }

    fn request(&mut self, now: Instant) -> LayoutResult<()> {
        if self.client.is_in_flight() || !self.scheduler.is_due(now) {
            return Ok(());
        }
        if self.created {
            self.client.request_update(self.params.clone(), now)?;
        } else {
            self.client
                .request_create(self.graph.clone(), self.params.clone(), now)?;
            self.created = true;
        }
        Ok(())
    }

    fn present<S>(&self, sink: &mut S) -> LayoutResult<()>
    where
        S: FrameSink + ?Sized,
    {
        let glyphs: Vec<NodeGlyph<'_>> = self
            .nodes
            .iter()
            .map(|node| {
                let (x, y) = node.position();
                NodeGlyph { id: &node.id, x, y }
            })
            .collect();
        let edges: Vec<EdgeSegment> = self
            .links
            .iter()
            .map(|&(source, target)| EdgeSegment {
                source_x: glyphs[source].x,
                source_y: glyphs[source].y,
                target_x: glyphs[target].x,
                target_y: glyphs[target].y,
            })
            .collect();
        sink.present(&glyphs, &edges)
    }
}

/// Slot-to-node mapping for `buffer`, rebuilt only when its layout changes
fn slot_map<'a>(
    cache: &'a mut Option<(Arc<NodeLayout>, Vec<Option<usize>>)>,
    index: &HashMap<String, usize>,
    buffer: &PositionBuffer,
) -> &'a [Option<usize>] {
    let fresh = cache
        .as_ref()
        .is_some_and(|(layout, _)| Arc::ptr_eq(layout, buffer.layout()));
    if !fresh {
        let map = buffer
            .layout()
            .ids()
            .iter()
            .map(|id| index.get(id).copied())
            .collect();
        *cache = Some((Arc::clone(buffer.layout()), map));
    }
    cache.as_ref().map(|(_, map)| map.as_slice()).unwrap_or(&[])
}

#[derive(Serialize)]
struct FrameRecord<'a> {
    frame: u64,
    nodes: &'a [NodeGlyph<'a>],
    edges: &'a [EdgeSegment],
}

/// Writes every frame as one JSON line
pub struct JsonLinesSink<W: Write> {
    writer: W,
    frames: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, frames: 0 }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Flush and return the writer
    pub fn finish(mut self) -> LayoutResult<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> FrameSink for JsonLinesSink<W> {
    fn present(&mut self, nodes: &[NodeGlyph<'_>], edges: &[EdgeSegment]) -> LayoutResult<()> {
        let record = FrameRecord {
            frame: self.frames,
            nodes,
            edges,
        };
        serde_json::to_writer(&mut self.writer, &record)
            .map_err(|e| LayoutError::Parse(e.to_string()))?;
        self.writer.write_all(b"\n")?;
        self.frames += 1;
        Ok(())
    }
}
