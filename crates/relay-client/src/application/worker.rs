//! The graph context: one task that owns the entity graph.
//!
//! # Why a separate task? (for beginners)
//!
//! The socket side must keep reading while the graph is being updated, and
//! the graph must never be seen half-updated.  So the graph lives in its own
//! task and receives work over one ordered channel.  Each item is applied to
//! completion, the turn is closed with [`EntityGraph::end_turn`], and only
//! then are the resulting [`GraphEvent`]s forwarded.
//!
//! Every connection gets a new epoch.  Records decoded under an older epoch
//! are dropped, so nothing queued before a reconnect can touch the fresh
//! graph.

use relay_core::{EntityGraph, GraphEvent, Record};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::dispatch::Handler;
use super::handlers;

/// A routed record stamped with the epoch it was decoded under.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub epoch: u64,
    pub handler: Handler,
    pub record: Record,
}

/// Work for the graph context.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A new connection was established; the graph starts over.
    Connected { epoch: u64 },
    /// The connection dropped; data is kept until the next `Connected`.
    Disconnected,
    /// A record to apply.
    Record(Envelope),
    /// The presentation layer selected a buffer (`None` clears).
    Select { index: Option<usize> },
    /// The presentation layer changed the filter string.
    SetFilter(String),
}

pub struct GraphWorker {
    graph: EntityGraph,
    epoch: u64,
    events: mpsc::Sender<GraphEvent>,
}

impl GraphWorker {
    pub fn new(graph: EntityGraph, events: mpsc::Sender<GraphEvent>) -> Self {
        Self {
            graph,
            epoch: 0,
            events,
        }
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Applies one item, closes the turn and returns the events it produced.
    pub fn process(&mut self, item: Inbound) -> Vec<GraphEvent> {
        match item {
            Inbound::Connected { epoch } => {
                info!("connection epoch {epoch}: resetting graph");
                self.graph.reset_data();
                self.epoch = epoch;
            }
            Inbound::Disconnected => {
                debug!("connection epoch {} ended", self.epoch);
            }
            Inbound::Record(envelope) => {
                if envelope.epoch != self.epoch {
                    debug!(
                        "dropping {:?} from epoch {} (current {})",
                        envelope.record.id, envelope.epoch, self.epoch
                    );
                } else {
                    handlers::apply(&mut self.graph, envelope.handler, envelope.record);
                }
            }
            Inbound::Select { index } => {
                self.graph.select_buffer_index(index);
            }
            Inbound::SetFilter(filter) => self.graph.set_filter(&filter),
        }
        self.graph.end_turn();
        self.graph.drain_events()
    }

    /// Processes items until the inbound channel closes, forwarding events in
    /// order.  Returns the graph for inspection.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<Inbound>) -> EntityGraph {
        let mut subscribed = true;
        while let Some(item) = inbound.recv().await {
            for event in self.process(item) {
                if subscribed && self.events.send(event).await.is_err() {
                    debug!("event subscriber gone; continuing without it");
                    subscribed = false;
                }
            }
        }
        info!("graph worker stopped");
        self.graph
    }
}
