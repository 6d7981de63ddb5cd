//! Goal fan-out.
//!
//! One goal per tick: its planned tool calls become task records on the
//! task queue under the goal's thread partition, so execution stays FIFO
//! per conversation. An empty plan still produces a `verify_state` task
//! so the turn gets a receipt through the normal path.

use crate::scheduler::{Stage, StageOutcome};
use crate::tracer::ExecutionTracer;
use crate::types::{QueueSet, TaskRecord, TaskSpec};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct Planner {
    queues: QueueSet,
    tracer: Arc<ExecutionTracer>,
}

impl Planner {
    pub fn new(queues: QueueSet, tracer: Arc<ExecutionTracer>) -> Self {
        Self { queues, tracer }
    }
}

#[async_trait]
impl Stage for Planner {
    fn name(&self) -> &'static str {
        "planner"
    }

    async fn once(&self) -> StageOutcome {
        let Some(record) = self.queues.goals.pull(1).into_iter().next() else {
            return StageOutcome::Idle;
        };
        let started = Utc::now();
        let goal = record.payload;
        let lease_id = record.lease_id.as_deref().unwrap_or_default().to_string();

        let tasks: Vec<TaskSpec> = if goal.tasks.is_empty() {
            vec![TaskSpec {
                tool: "verify_state".to_string(),
                args: json!({}),
            }]
        } else {
            goal.tasks.clone()
        };

        let count = tasks.len();
        for spec in tasks {
            let task = TaskRecord {
                task_id: Uuid::new_v4().to_string(),
                goal_id: goal.goal_id.clone(),
                thread_id: goal.thread_id.clone(),
                cid: goal.cid.clone(),
                tool: spec.tool,
                args: spec.args,
                attempt: 0,
            };
            self.queues
                .tasks
                .enqueue(task, Some(goal.thread_id.clone()));
        }

        info!(goal_id = %goal.goal_id, thread_id = %goal.thread_id, tasks = count, "Fanned goal into tasks");
        self.tracer.record_ok(
            &goal.cid,
            "planner",
            started,
            Some(format!("{} tasks", count)),
        );

        if self.queues.goals.ack(&lease_id).is_err() {
            return StageOutcome::Failed("goal lease vanished before ack".to_string());
        }
        StageOutcome::Done
    }
}
