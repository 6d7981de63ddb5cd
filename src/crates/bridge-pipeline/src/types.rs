//! Records flowing between pipeline stages.

use bridge_core::Patch;
use bridge_queue::{LeaseQueue, QueueConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// One tool invocation planned for a goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub tool: String,
    pub args: Value,
}

/// A planned unit of work for one agent turn. Tasks are stored in the
/// order the planner wants them executed; per-thread queue partitioning
/// keeps that order on the way through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: String,

    /// Conversation identity; doubles as the partition key everywhere.
    pub thread_id: String,

    /// Correlation id of the originating turn.
    pub cid: String,

    pub tasks: Vec<TaskSpec>,
}

impl Goal {
    pub fn new(thread_id: impl Into<String>, cid: impl Into<String>, tasks: Vec<TaskSpec>) -> Self {
        Self {
            goal_id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            cid: cid.into(),
            tasks,
        }
    }
}

/// One executable task fanned out of a goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub goal_id: String,
    pub thread_id: String,
    pub cid: String,
    pub tool: String,
    pub args: Value,

    /// Redelivery count, carried in the payload.
    #[serde(default)]
    pub attempt: u32,
}

/// Audit verdict attached to a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Approved,
    Rejected,
}

/// A patch plus its audit verdict, headed for the committer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub review_status: ReviewStatus,
    pub graph_id: String,
    pub patch: Patch,

    /// Auditor's reason when rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The four stage queues, bundled. Lease timeouts sit above the 45 s
/// worst-case LLM call so redelivery cannot race an in-flight handler.
#[derive(Clone)]
pub struct QueueSet {
    pub goals: LeaseQueue<Goal>,
    pub tasks: LeaseQueue<TaskRecord>,
    pub patches: LeaseQueue<Patch>,
    pub reviews: LeaseQueue<Review>,
}

impl QueueSet {
    pub fn new() -> Self {
        let lease = Duration::from_secs(60);
        Self {
            goals: LeaseQueue::new(QueueConfig::new("goalQueue").with_lease_timeout(lease)),
            tasks: LeaseQueue::new(QueueConfig::new("taskQueue").with_lease_timeout(lease)),
            patches: LeaseQueue::new(QueueConfig::new("patchQueue").with_lease_timeout(lease)),
            reviews: LeaseQueue::new(QueueConfig::new("reviewQueue").with_lease_timeout(lease)),
        }
    }

    /// Sweep expired leases on every queue. Called once per scheduler
    /// tick.
    pub fn expire_leases(&self) -> usize {
        let now = chrono::Utc::now();
        self.goals.expire_leases(now)
            + self.tasks.expire_leases(now)
            + self.patches.expire_leases(now)
            + self.reviews.expire_leases(now)
    }
}

impl Default for QueueSet {
    fn default() -> Self {
        Self::new()
    }
}
