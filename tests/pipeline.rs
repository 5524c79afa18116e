use std::thread;
use std::time::{Duration, Instant};

use smoothgraph::config::{LayoutConfig, RenderConfig, SimulationParameters};
use smoothgraph::error::LayoutResult;
use smoothgraph::graph::{GraphData, GraphLink, GraphNode};
use smoothgraph::host::{SimulationHost, SimulationWorker};
use smoothgraph::render::{EdgeSegment, FrameSink, NodeGlyph, RenderCoordinator};

/// Keeps only the most recent frame
#[derive(Default)]
struct LastFrame {
    nodes: Vec<(String, f32, f32)>,
    edges: Vec<EdgeSegment>,
}

impl FrameSink for LastFrame {
    fn present(&mut self, nodes: &[NodeGlyph<'_>], edges: &[EdgeSegment]) -> LayoutResult<()> {
        self.nodes = nodes.iter().map(|n| (n.id.to_string(), n.x, n.y)).collect();
        self.edges = edges.to_vec();
        Ok(())
    }
}

fn config(iterations: usize) -> LayoutConfig {
    LayoutConfig {
        simulation: SimulationParameters {
            iterations,
            ..Default::default()
        },
        render: RenderConfig {
            frame_interval: 0.001,
            smoothing_mass: 0.05,
        },
        ..Default::default()
    }
}

fn chain() -> GraphData {
    GraphData::new(
        vec![
            GraphNode::new("a"),
            GraphNode::new("b"),
            GraphNode::new("c"),
            GraphNode::new("d"),
        ],
        vec![
            GraphLink::new("a", "b"),
            GraphLink::new("b", "c"),
            GraphLink::new("c", "nowhere"),
        ],
    )
}

/// Run frames until `done` holds, failing after a few seconds
fn pump_until(
    coordinator: &mut RenderCoordinator,
    sink: &mut LastFrame,
    mut done: impl FnMut(&RenderCoordinator) -> bool,
) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done(&*coordinator) {
        assert!(Instant::now() < deadline, "pipeline made no progress");
        coordinator.frame(Instant::now(), 0.01, sink).unwrap();
        thread::sleep(Duration::from_millis(1));
    }
}

/// True once request `seq` has been answered
fn answered(seq: u64) -> impl FnMut(&RenderCoordinator) -> bool {
    move |c: &RenderCoordinator| {
        let client = c.client();
        client.next_seq() > seq + 1 || (client.next_seq() == seq + 1 && !client.is_in_flight())
    }
}

#[test]
fn drag_round_trip_lands_on_pointer() {
    let worker = SimulationWorker::spawn(SimulationHost::default()).unwrap();
    let mut coordinator = RenderCoordinator::new(chain(), &config(0), worker.client()).unwrap();
    let mut sink = LastFrame::default();

    pump_until(&mut coordinator, &mut sink, answered(1));

    let start = coordinator.position("b").unwrap();
    coordinator.drag_start("b", start).unwrap();
    coordinator.drag_move((250.0, 125.0)).unwrap();
    coordinator.frame(Instant::now(), 0.01, &mut sink).unwrap();
    assert!(sink.nodes.contains(&("b".to_string(), 250.0, 125.0)));

    coordinator.drag_end().unwrap();
    let hold = coordinator.client().next_seq();
    pump_until(&mut coordinator, &mut sink, answered(hold + 1));

    assert_eq!(coordinator.position("b"), Some((250.0, 125.0)));
    assert_eq!(coordinator.node("b").unwrap().target(), (250.0, 125.0));

    drop(coordinator);
    let host = worker.shutdown().unwrap();
    let b = host.simulation().unwrap().node("b").unwrap();
    assert_eq!((b.x, b.y), (250.0, 125.0));
}

#[test]
fn smoothed_positions_follow_the_simulation() {
    let worker = SimulationWorker::spawn(SimulationHost::default()).unwrap();
    let mut coordinator = RenderCoordinator::new(chain(), &config(1), worker.client()).unwrap();
    let mut sink = LastFrame::default();

    pump_until(&mut coordinator, &mut sink, answered(20));

    assert_eq!(sink.nodes.len(), 4);
    // c -> nowhere is dropped without an error
    assert_eq!(sink.edges.len(), 2);

    // Nodes left the viewport centre they started from.
    let spread: f32 = sink
        .nodes
        .iter()
        .map(|(_, x, y)| (x - 400.0).abs() + (y - 300.0).abs())
        .sum();
    assert!(spread > 1.0, "nodes never moved: {spread}");

    // Every edge is drawn between the presented endpoints.
    let a = &sink.nodes[0];
    let b = &sink.nodes[1];
    assert_eq!((sink.edges[0].source_x, sink.edges[0].source_y), (a.1, a.2));
    assert_eq!((sink.edges[0].target_x, sink.edges[0].target_y), (b.1, b.2));
}

#[test]
fn node_removed_while_request_in_flight() {
    let worker = SimulationWorker::spawn(SimulationHost::default()).unwrap();
    let mut coordinator = RenderCoordinator::new(chain(), &config(1), worker.client()).unwrap();
    let mut sink = LastFrame::default();

    // The first frame issues the create request with all four nodes.
    coordinator.frame(Instant::now(), 0.01, &mut sink).unwrap();
    assert!(coordinator.client().is_in_flight());

    coordinator
        .update_graph(GraphData::new(
            vec![GraphNode::new("d"), GraphNode::new("a"), GraphNode::new("e")],
            vec![GraphLink::new("a", "d"), GraphLink::new("b", "e")],
        ))
        .unwrap();

    pump_until(&mut coordinator, &mut sink, answered(5));

    let ids: Vec<&str> = sink.nodes.iter().map(|(id, _, _)| id.as_str()).collect();
    assert_eq!(ids, ["d", "a", "e"]);
    assert_eq!(sink.edges.len(), 1);
    assert!(sink
        .nodes
        .iter()
        .all(|(_, x, y)| x.is_finite() && y.is_finite()));

    drop(coordinator);
    let host = worker.shutdown().unwrap();
    let sim = host.simulation().unwrap();
    assert_eq!(sim.node_count(), 3);
    assert!(sim.node("b").is_none());
}

#[test]
fn resize_recenters_the_layout() {
    let worker = SimulationWorker::spawn(SimulationHost::default()).unwrap();
    let mut coordinator = RenderCoordinator::new(chain(), &config(1), worker.client()).unwrap();
    let mut sink = LastFrame::default();

    pump_until(&mut coordinator, &mut sink, answered(2));
    coordinator.resize(2000.0, 1600.0);
    let seq = coordinator.client().next_seq();
    pump_until(&mut coordinator, &mut sink, answered(seq));

    drop(coordinator);
    let host = worker.shutdown().unwrap();
    let nodes = host.simulation().unwrap().nodes();
    let cx = nodes.iter().map(|n| n.x).sum::<f32>() / nodes.len() as f32;
    let cy = nodes.iter().map(|n| n.y).sum::<f32>() / nodes.len() as f32;
    assert!((cx - 1000.0).abs() < 50.0, "centroid x {cx}");
    assert!((cy - 800.0).abs() < 50.0, "centroid y {cy}");
}
