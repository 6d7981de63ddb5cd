//! The executor stage: tool call → ordered op list.
//!
//! Pulls one task per run, validates its arguments against the tool's
//! schema, synthesizes ops through the registry, and enqueues the result
//! as a patch under the thread's partition. The executor never touches
//! the mirror's write path; committed state only changes downstream.
//!
//! Failure disposition: permanent errors (bad arguments, unknown tools,
//! unresolvable references) ack the task and post a formatted system
//! message on the chat channel so the agent can adapt; everything else
//! nacks for redelivery.

use crate::chat::ChatChannel;
use crate::error::{classify, FailureClass, PipelineError, Result};
use crate::scheduler::{Stage, StageOutcome};
use crate::tools::{ExternalReader, Synthesis, SynthesisContext, SynthesisNote, ToolKind, ToolRegistry};
use crate::tracer::ExecutionTracer;
use crate::types::{QueueSet, TaskRecord};
use async_trait::async_trait;
use bridge_core::{Op, Patch, PatchMeta, StateMirror};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Hard ceiling on one external read, over and above the reader's own
/// timeout.
const EXTERNAL_CALL_DEADLINE: Duration = Duration::from_secs(45);

pub struct Executor {
    queues: QueueSet,
    mirror: StateMirror,
    registry: Arc<ToolRegistry>,
    external: Arc<dyn ExternalReader>,
    chat: Arc<ChatChannel>,
    tracer: Arc<ExecutionTracer>,
}

impl Executor {
    pub fn new(
        queues: QueueSet,
        mirror: StateMirror,
        registry: Arc<ToolRegistry>,
        external: Arc<dyn ExternalReader>,
        chat: Arc<ChatChannel>,
        tracer: Arc<ExecutionTracer>,
    ) -> Self {
        Self {
            queues,
            mirror,
            registry,
            external,
            chat,
            tracer,
        }
    }

    async fn run_tool(&self, task: &TaskRecord) -> Result<Synthesis> {
        let entry = self
            .registry
            .get(&task.tool)
            .ok_or_else(|| PipelineError::ToolNotAllowed(task.tool.clone()))?;
        let sanitized = entry
            .schema
            .validate(&task.args)
            .map_err(PipelineError::Validation)?;

        match &entry.kind {
            ToolKind::Synthesize(synthesize) => {
                let state = self.mirror.snapshot();
                let ctx = SynthesisContext::new(&state);
                synthesize(&ctx, &sanitized)
            }
            ToolKind::ExternalRead => {
                let payload = self.external_read(&task.tool, &sanitized).await;
                let payload = match payload {
                    Ok(value) => value,
                    // External failure is a result, not a task failure.
                    Err(message) => json!({ "error": message }),
                };
                Ok(Synthesis::global(vec![Op::ReadResponse {
                    tool: task.tool.clone(),
                    payload,
                }]))
            }
        }
    }

    async fn external_read(
        &self,
        tool: &str,
        args: &Value,
    ) -> std::result::Result<Value, String> {
        let call = async {
            match tool {
                "sparql_query" => {
                    let endpoint = args["endpoint"].as_str().unwrap_or_default();
                    let query = args["query"].as_str().unwrap_or_default();
                    self.external.sparql_query(endpoint, query).await
                }
                "semantic_search" => {
                    let query = args["query"].as_str().unwrap_or_default();
                    let limit = args["limit"].as_f64().unwrap_or(10.0) as usize;
                    self.external.semantic_search(query, limit).await
                }
                other => Err(format!("unknown external read tool '{}'", other)),
            }
        };
        match tokio::time::timeout(EXTERNAL_CALL_DEADLINE, call).await {
            Ok(result) => result,
            Err(_) => Err(format!(
                "external call exceeded {}s deadline",
                EXTERNAL_CALL_DEADLINE.as_secs()
            )),
        }
    }

    /// Targeted guidance appended to the chat error, keyed off the error
    /// text the same way the classifier is.
    fn guidance(error: &str) -> &'static str {
        let lowered = error.to_lowercase();
        if lowered.contains("graph not found") || lowered.contains("no graph_id") {
            "The graphId was missing or invalid. List the graphs first or create one."
        } else if lowered.contains("missing required") {
            "Provide the missing field and call the tool again."
        } else if lowered.contains("tool not allowed") {
            "Only the registered graph tools are available."
        } else if lowered.contains("prototype not found") {
            "Look the prototype up by name with get_node_definition before referencing its id."
        } else {
            "Check the arguments against the tool's schema and retry."
        }
    }
}

#[async_trait]
impl Stage for Executor {
    fn name(&self) -> &'static str {
        "executor"
    }

    async fn once(&self) -> StageOutcome {
        let Some(record) = self.queues.tasks.pull(1).into_iter().next() else {
            return StageOutcome::Idle;
        };
        let started = Utc::now();
        let task = record.payload;
        let lease_id = record.lease_id.as_deref().unwrap_or_default().to_string();

        match self.run_tool(&task).await {
            Ok(synthesis) => {
                for note in &synthesis.notes {
                    let SynthesisNote::FuzzyPrototypeMatch {
                        input,
                        matched,
                        similarity,
                        ..
                    } = note;
                    self.tracer.record_ok(
                        &task.cid,
                        "fuzzy-dedup",
                        started,
                        Some(format!(
                            "'{}' matched '{}' at {:.2}",
                            input, matched, similarity
                        )),
                    );
                }

                let op_count = synthesis.ops.len();
                let patch = Patch::new(&task.thread_id, &synthesis.graph_id, synthesis.ops)
                    .with_meta(PatchMeta {
                        cid: Some(task.cid.clone()),
                        tool: Some(task.tool.clone()),
                    });
                self.queues
                    .patches
                    .enqueue(patch, Some(task.thread_id.clone()));

                info!(tool = %task.tool, ops = op_count, cid = %task.cid, "Synthesized patch");
                self.tracer
                    .record_ok(&task.cid, "executor", started, Some(task.tool.clone()));
                if self.queues.tasks.ack(&lease_id).is_err() {
                    return StageOutcome::Failed("task lease vanished before ack".to_string());
                }
                StageOutcome::Done
            }
            Err(error) => {
                let message = error.to_string();
                self.tracer.record_error(
                    &task.cid,
                    "executor",
                    started,
                    &task.tool,
                    &task.args,
                    &message,
                );

                match classify(&error) {
                    FailureClass::Permanent => {
                        warn!(tool = %task.tool, error = %message, "Permanent task failure, dropping");
                        self.chat.post_system(
                            &task.cid,
                            format!(
                                "Tool '{}' failed: {}\nArguments: {}\n{}",
                                task.tool,
                                message,
                                task.args,
                                Self::guidance(&message)
                            ),
                        );
                        let _ = self.queues.tasks.ack(&lease_id);
                    }
                    FailureClass::Transient => {
                        warn!(tool = %task.tool, error = %message, "Transient task failure, redelivering");
                        let _ = self.queues.tasks.nack(&lease_id);
                    }
                }
                StageOutcome::Failed(message)
            }
        }
    }
}
