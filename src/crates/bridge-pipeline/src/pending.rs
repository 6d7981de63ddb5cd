//! Committed ops waiting for the UI to drain.
//!
//! The committer appends one batch per approved patch; the UI polls,
//! applies the ops to its authoritative store, and posts completion (or
//! feedback on failure), which clears the batch.

use bridge_core::Op;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// One committed patch's ops, ready for the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBatch {
    pub batch_id: String,
    pub graph_id: String,
    pub cid: Option<String>,
    pub ops: Vec<Op>,
    pub created_at: DateTime<Utc>,
}

/// FIFO buffer of outstanding batches.
#[derive(Default)]
pub struct PendingActions {
    batches: Mutex<Vec<ActionBatch>>,
}

impl PendingActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch. Returns its id.
    pub fn push(&self, graph_id: impl Into<String>, cid: Option<String>, ops: Vec<Op>) -> String {
        let batch = ActionBatch {
            batch_id: Uuid::new_v4().to_string(),
            graph_id: graph_id.into(),
            cid,
            ops,
            created_at: Utc::now(),
        };
        let id = batch.batch_id.clone();
        self.batches.lock().push(batch);
        id
    }

    /// Outstanding batches, oldest first. Polling does not clear them;
    /// only completion acks do, so a crashed UI poll loses nothing.
    pub fn poll(&self) -> Vec<ActionBatch> {
        self.batches.lock().clone()
    }

    /// The UI applied a batch.
    pub fn complete(&self, batch_id: &str) -> bool {
        let mut batches = self.batches.lock();
        let before = batches.len();
        batches.retain(|b| b.batch_id != batch_id);
        let removed = batches.len() < before;
        if removed {
            info!(batch_id, "Action batch completed by UI");
        }
        removed
    }

    /// The UI reports it could not apply a batch. The batch is dropped;
    /// the message lands in the log for diagnosis.
    pub fn feedback(&self, batch_id: &str, ok: bool, message: &str) -> bool {
        if !ok {
            warn!(batch_id, message, "UI rejected action batch");
        }
        self.complete(batch_id)
    }

    pub fn len(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
