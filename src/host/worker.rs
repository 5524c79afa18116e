//! Worker thread transport for the simulation host
//!
//! The host lives on a dedicated OS thread and drains an unbounded channel of
//! [`HostRequest`]s in order. Buffer requests carry a oneshot reply that the
//! render side polls without blocking.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, error, info, warn};

use super::SimulationHost;
use crate::buffer::PositionBuffer;
use crate::config::SimulationParameters;
use crate::error::{HostError, LayoutError, LayoutResult};
use crate::graph::{GraphData, NodePosition};

type BufferReply = oneshot::Sender<Result<PositionBuffer, HostError>>;

/// Messages understood by the worker thread
#[derive(Debug)]
pub enum HostRequest {
    Create {
        graph: GraphData,
        params: SimulationParameters,
        buffer: PositionBuffer,
        reply: BufferReply,
    },
    UpdateBuffers {
        params: SimulationParameters,
        buffer: PositionBuffer,
        reply: BufferReply,
    },
    UpdateNodePositions(Vec<NodePosition>),
    UpdateGraph(GraphData),
    Shutdown,
}

impl HostRequest {
    /// Buffer carried by a buffer request
    fn into_buffer(self) -> Option<PositionBuffer> {
        match self {
            HostRequest::Create { buffer, .. } | HostRequest::UpdateBuffers { buffer, .. } => {
                Some(buffer)
            }
            _ => None,
        }
    }
}

/// Handle to a simulation host running on its own thread
pub struct SimulationWorker {
    sender: UnboundedSender<HostRequest>,
    handle: Option<JoinHandle<SimulationHost>>,
}

impl SimulationWorker {
    /// Move `host` onto a new thread and start serving requests
    pub fn spawn(host: SimulationHost) -> LayoutResult<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = thread::Builder::new()
            .name("simulation-host".to_string())
            .spawn(move || serve(host, receiver))?;

        info!("simulation worker started");
        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    /// A new render-side client with an empty buffer
    pub fn client(&self) -> SimulationClient {
        SimulationClient::new(self.sender.clone())
    }

    /// Stop the thread after it has drained every request sent so far, and
    /// hand the host back.
    ///
    /// Returns `None` if the thread panicked.
    pub fn shutdown(mut self) -> Option<SimulationHost> {
        self.stop()
    }

    fn stop(&mut self) -> Option<SimulationHost> {
        let handle = self.handle.take()?;
        let _ = self.sender.send(HostRequest::Shutdown);
        match handle.join() {
            Ok(host) => {
                info!("simulation worker stopped");
                Some(host)
            }
            Err(_) => {
                warn!("simulation worker panicked");
                None
            }
        }
    }
}

impl Drop for SimulationWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(mut host: SimulationHost, mut receiver: UnboundedReceiver<HostRequest>) -> SimulationHost {
    while let Some(request) = receiver.blocking_recv() {
        match request {
            HostRequest::Create {
                graph,
                params,
                buffer,
                reply,
            } => {
                let buffer = host.create_simulation(graph, &params, buffer);
                if reply.send(Ok(buffer)).is_err() {
                    debug!("create reply dropped by client");
                }
            }
            HostRequest::UpdateBuffers {
                params,
                buffer,
                reply,
            } => {
                let result = host.update_buffers(&params, buffer);
                if reply.send(result).is_err() {
                    debug!("buffer reply dropped by client");
                }
            }
            HostRequest::UpdateNodePositions(positions) => {
                host.update_node_positions(&positions);
            }
            HostRequest::UpdateGraph(graph) => host.update_graph(graph),
            HostRequest::Shutdown => break,
        }
    }
    host
}

/// A finished buffer request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completed {
    /// Sequence number the request was issued with
    pub seq: u64,
    /// Time from issue to the poll that observed the reply
    pub round_trip: Duration,
}

#[derive(Debug)]
enum Slot {
    Idle(PositionBuffer),
    InFlight {
        reply: oneshot::Receiver<Result<PositionBuffer, HostError>>,
        sent_at: Instant,
        seq: u64,
    },
}

impl Default for Slot {
    fn default() -> Self {
        Slot::Idle(PositionBuffer::new())
    }
}

/// Render-side end of the transport.
///
/// Owns the single position buffer. At most one buffer request is
/// outstanding at a time; while it is, the buffer belongs to the host.
#[derive(Debug)]
pub struct SimulationClient {
    sender: UnboundedSender<HostRequest>,
    slot: Slot,
    next_seq: u64,
}

impl SimulationClient {
    pub fn new(sender: UnboundedSender<HostRequest>) -> Self {
        Self {
            sender,
            slot: Slot::default(),
            next_seq: 0,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.slot, Slot::InFlight { .. })
    }

    /// The buffer, unless a request currently owns it
    pub fn buffer(&self) -> Option<&PositionBuffer> {
        match &self.slot {
            Slot::Idle(buffer) => Some(buffer),
            Slot::InFlight { .. } => None,
        }
    }

    /// Sequence number the next buffer request will carry
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Ask the host to build the simulation
    pub fn request_create(
        &mut self,
        graph: GraphData,
        params: SimulationParameters,
        now: Instant,
    ) -> LayoutResult<u64> {
        let buffer = self.take_buffer()?;
        let (reply, receiver) = oneshot::channel();
        self.dispatch(
            HostRequest::Create {
                graph,
                params,
                buffer,
                reply,
            },
            receiver,
            now,
        )
    }

    /// Ask the host for a fresh set of positions
    pub fn request_update(&mut self, params: SimulationParameters, now: Instant) -> LayoutResult<u64> {
        let buffer = self.take_buffer()?;
        let (reply, receiver) = oneshot::channel();
        self.dispatch(
            HostRequest::UpdateBuffers {
                params,
                buffer,
                reply,
            },
            receiver,
            now,
        )
    }

    pub fn push_positions(&self, positions: Vec<NodePosition>) -> LayoutResult<()> {
        self.sender
            .send(HostRequest::UpdateNodePositions(positions))
            .map_err(|_| LayoutError::WorkerDisconnected)
    }

    pub fn push_graph(&self, graph: GraphData) -> LayoutResult<()> {
        self.sender
            .send(HostRequest::UpdateGraph(graph))
            .map_err(|_| LayoutError::WorkerDisconnected)
    }

    /// Check for the outstanding reply without blocking.
    ///
    /// `Ok(None)` means nothing is outstanding or the reply has not arrived.
    /// A rejected request still returns the buffer to the slot.
    pub fn poll(&mut self, now: Instant) -> LayoutResult<Option<Completed>> {
        let Slot::InFlight {
            reply,
            sent_at,
            seq,
        } = &mut self.slot
        else {
            return Ok(None);
        };
        let (sent_at, seq) = (*sent_at, *seq);

        match reply.try_recv() {
            Ok(Ok(buffer)) => {
                self.slot = Slot::Idle(buffer);
                let round_trip = now.saturating_duration_since(sent_at);
                debug!(seq, ?round_trip, "buffer received");
                Ok(Some(Completed { seq, round_trip }))
            }
            Ok(Err(err)) => {
                self.slot = Slot::Idle(err.into_buffer());
                Err(LayoutError::NotInitialized)
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Closed) => {
                self.slot = Slot::default();
                Err(LayoutError::WorkerDisconnected)
            }
        }
    }

    fn take_buffer(&mut self) -> LayoutResult<PositionBuffer> {
        match std::mem::take(&mut self.slot) {
            Slot::Idle(buffer) => Ok(buffer),
            in_flight => {
                if let Slot::InFlight { seq, .. } = &in_flight {
                    error!(seq = *seq, "buffer requested while another request is in flight");
                }
                self.slot = in_flight;
                Err(LayoutError::RequestInFlight)
            }
        }
    }

    fn dispatch(
        &mut self,
        request: HostRequest,
        reply: oneshot::Receiver<Result<PositionBuffer, HostError>>,
        now: Instant,
    ) -> LayoutResult<u64> {
        if let Err(err) = self.sender.send(request) {
            self.slot = Slot::Idle(err.0.into_buffer().unwrap_or_default());
            return Err(LayoutError::WorkerDisconnected);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.slot = Slot::InFlight {
            reply,
            sent_at: now,
            seq,
        };
        Ok(seq)
    }
}

/// Paces buffer requests against the measured round trip.
///
/// After each response the next request is due `max(0, interval - round_trip)`
/// later, so a slow host is asked again immediately and a fast one is not
/// asked more often than the target interval.
#[derive(Debug, Clone)]
pub struct RequestScheduler {
    target_interval: Duration,
    next_due: Option<Instant>,
    last_round_trip: Option<Duration>,
}

impl RequestScheduler {
    pub fn new(target_interval: Duration) -> Self {
        Self {
            target_interval,
            next_due: None,
            last_round_trip: None,
        }
    }

    pub fn target_interval(&self) -> Duration {
        self.target_interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due.is_none_or(|due| now >= due)
    }

    /// Record a response observed at `received_at`
    pub fn record(&mut self, received_at: Instant, round_trip: Duration) {
        let delay = self.next_delay_for(round_trip);
        self.next_due = Some(received_at + delay);
        self.last_round_trip = Some(round_trip);
    }

    pub fn last_round_trip(&self) -> Option<Duration> {
        self.last_round_trip
    }

    /// Delay that follows a response with the given round trip
    pub fn next_delay_for(&self, round_trip: Duration) -> Duration {
        self.target_interval.saturating_sub(round_trip)
    }

    /// Make the next request due immediately
    pub fn reset(&mut self) {
        self.next_due = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphLink, GraphNode};

    fn graph() -> GraphData {
        GraphData::new(
            vec![GraphNode::new("a"), GraphNode::new("b"), GraphNode::new("c")],
            vec![GraphLink::new("a", "b")],
        )
    }

    fn wait(client: &mut SimulationClient) -> LayoutResult<Completed> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(done) = client.poll(Instant::now())? {
                return Ok(done);
            }
            assert!(Instant::now() < deadline, "worker did not answer");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn create_then_update_round_trip() {
        let worker = SimulationWorker::spawn(SimulationHost::default()).unwrap();
        let mut client = worker.client();
        let params = SimulationParameters::default();

        let seq = client
            .request_create(graph(), params.clone(), Instant::now())
            .unwrap();
        assert_eq!(seq, 0);
        assert!(client.is_in_flight());
        assert!(client.buffer().is_none());

        let done = wait(&mut client).unwrap();
        assert_eq!(done.seq, 0);
        assert_eq!(client.buffer().unwrap().as_slice().len(), 6);

        let seq = client.request_update(params, Instant::now()).unwrap();
        assert_eq!(seq, 1);
        assert_eq!(wait(&mut client).unwrap().seq, 1);
        assert_eq!(client.next_seq(), 2);
    }

    #[test]
    fn second_request_while_in_flight_is_rejected() {
        let worker = SimulationWorker::spawn(SimulationHost::default()).unwrap();
        let mut client = worker.client();
        let params = SimulationParameters::default();

        let seq = client
            .request_create(graph(), params.clone(), Instant::now())
            .unwrap();
        let err = client.request_update(params, Instant::now()).unwrap_err();
        assert!(matches!(err, LayoutError::RequestInFlight));
        assert!(client.is_in_flight());
        assert!(client.buffer().is_none());
        // The rejected request never consumed a sequence number.
        assert_eq!(client.next_seq(), seq + 1);
        assert_eq!(wait(&mut client).unwrap().seq, seq);
        assert!(client.buffer().is_some());
    }

    #[test]
    fn update_before_create_returns_buffer_to_slot() {
        let worker = SimulationWorker::spawn(SimulationHost::default()).unwrap();
        let mut client = worker.client();

        client
            .request_update(SimulationParameters::default(), Instant::now())
            .unwrap();
        let err = wait(&mut client).unwrap_err();
        assert!(matches!(err, LayoutError::NotInitialized));
        assert!(!client.is_in_flight());
        assert!(client.buffer().is_some());
    }

    #[test]
    fn pushes_are_applied_in_order() {
        let worker = SimulationWorker::spawn(SimulationHost::default()).unwrap();
        let mut client = worker.client();
        client
            .request_create(graph(), SimulationParameters::default(), Instant::now())
            .unwrap();
        wait(&mut client).unwrap();

        client
            .push_positions(vec![NodePosition::new("a", 12.0, 34.0)])
            .unwrap();
        drop(client);

        let host = worker.shutdown().unwrap();
        let a = host.simulation().unwrap().node("a").unwrap();
        assert_eq!((a.x, a.y), (12.0, 34.0));
    }

    #[test]
    fn dead_worker_is_reported() {
        let worker = SimulationWorker::spawn(SimulationHost::default()).unwrap();
        let mut client = worker.client();
        worker.shutdown();

        let err = client
            .request_create(graph(), SimulationParameters::default(), Instant::now())
            .unwrap_err();
        assert!(matches!(err, LayoutError::WorkerDisconnected));
        assert!(client.buffer().is_some());
        assert!(matches!(
            client.push_graph(graph()),
            Err(LayoutError::WorkerDisconnected)
        ));
    }

    #[test]
    fn scheduler_subtracts_round_trip() {
        let interval = Duration::from_millis(16);
        let mut scheduler = RequestScheduler::new(interval);
        let start = Instant::now();
        assert!(scheduler.is_due(start));

        scheduler.record(start, Duration::from_millis(6));
        assert!(!scheduler.is_due(start + Duration::from_millis(9)));
        assert!(scheduler.is_due(start + Duration::from_millis(10)));
        assert_eq!(scheduler.last_round_trip(), Some(Duration::from_millis(6)));

        scheduler.record(start, Duration::from_millis(40));
        assert!(scheduler.is_due(start));

        scheduler.record(start, Duration::ZERO);
        assert!(!scheduler.is_due(start));
        scheduler.reset();
        assert!(scheduler.is_due(start));
    }
}
