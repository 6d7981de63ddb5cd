//! The patch pipeline: Goal → Task → Patch → Review → Commit.
//!
//! A user turn enters through the [`coordinator`], which plans a goal.
//! The [`scheduler`] then drives the stages each tick within per-stage
//! budgets: the [`planner`] fans goals into tasks, the [`executor`]
//! synthesizes mutation ops per tool call, the [`auditor`] checks patches
//! against the mirror's referential invariants, and the [`committer`]
//! applies approved patches and queues them for the UI to drain. Errors
//! never escape a stage handler; they are classified permanent (dropped
//! with feedback on the chat channel) or transient (redelivered).

pub mod auditor;
pub mod chat;
pub mod committer;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod pending;
pub mod planner;
pub mod scheduler;
pub mod tools;
pub mod tracer;
pub mod types;

pub use chat::{ChatChannel, ChatEntry, ChatRole};
pub use coordinator::{AgentCoordinator, TurnRequest, TurnResponse};
pub use error::{classify, FailureClass, PipelineError, Result};
pub use pending::{ActionBatch, PendingActions};
pub use scheduler::{MaxPerTick, Scheduler, SchedulerConfig, SchedulerMetrics, SchedulerState};
pub use tracer::{ExecutionTracer, TraceSpan, TraceStatus};
pub use types::{Goal, QueueSet, Review, ReviewStatus, TaskRecord, TaskSpec};
