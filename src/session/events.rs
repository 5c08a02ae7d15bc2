//! Session events for the rendering layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::model::{NodeId, Row};

/// Default broadcast channel capacity
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEventKind {
    /// Nodes or links were added, removed or changed
    GraphChanged,
    RelationsLoaded { node: NodeId },
    CountsUpdated,
    ValuesLoaded { node: NodeId },
    ResultsUpdated { rows: usize },
    GraphResultsUpdated { rows: usize },
}

/// Tells listeners the model changed and should be re-read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    #[serde(flatten)]
    pub kind: SessionEventKind,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl SessionEvent {
    pub fn new(kind: SessionEventKind) -> Self {
        Self {
            kind,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Broadcast bus for [`SessionEvent`]s, plus a channel carrying graph-shaped
/// result rows.
///
/// Fire-and-forget: emitting never blocks. Graph-mode results are only
/// requested while someone listens on the graph results channel.
#[derive(Debug, Clone)]
pub struct SessionEventBus {
    sender: broadcast::Sender<SessionEvent>,
    graph_results: broadcast::Sender<Arc<Vec<Row>>>,
}

impl SessionEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let (graph_results, _) = broadcast::channel(capacity);
        Self {
            sender,
            graph_results,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_graph_results(&self) -> broadcast::Receiver<Arc<Vec<Row>>> {
        self.graph_results.subscribe()
    }

    pub fn has_graph_result_listeners(&self) -> bool {
        self.graph_results.receiver_count() > 0
    }

    pub fn emit(&self, kind: SessionEventKind) {
        let event = SessionEvent::new(kind);
        if let Ok(n) = self.sender.send(event) {
            debug!(subscribers = n, "Session event emitted");
        }
    }

    pub fn emit_graph_results(&self, rows: Vec<Row>) {
        let count = rows.len();
        // no listener left is fine
        let _ = self.graph_results.send(Arc::new(rows));
        self.emit(SessionEventKind::GraphResultsUpdated { rows: count });
    }
}

impl Default for SessionEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
