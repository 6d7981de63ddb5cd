//! The commit stage.
//!
//! Approved reviews land here: `NEW_GRAPH:` placeholders are resolved in
//! op order, the batch is applied to the mirror atomically, mutation ops
//! are queued for the UI's poll loop, and read responses are delivered to
//! the chat channel. Rejected reviews are discarded with feedback.

use crate::chat::ChatChannel;
use crate::pending::PendingActions;
use crate::scheduler::{Stage, StageOutcome};
use crate::tracer::ExecutionTracer;
use crate::types::{QueueSet, ReviewStatus};
use async_trait::async_trait;
use bridge_core::{Op, StateMirror, NEW_GRAPH_PREFIX};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

pub struct Committer {
    queues: QueueSet,
    mirror: StateMirror,
    pending: Arc<PendingActions>,
    chat: Arc<ChatChannel>,
    tracer: Arc<ExecutionTracer>,
}

impl Committer {
    pub fn new(
        queues: QueueSet,
        mirror: StateMirror,
        pending: Arc<PendingActions>,
        chat: Arc<ChatChannel>,
        tracer: Arc<ExecutionTracer>,
    ) -> Self {
        Self {
            queues,
            mirror,
            pending,
            chat,
            tracer,
        }
    }

    /// Rewrite `NEW_GRAPH:<name>` references to the id of the graph a
    /// preceding `createNewGraph` op in the same batch established.
    fn resolve_placeholders(ops: &[Op], patch_graph_id: &str) -> (Vec<Op>, String) {
        let mut by_name: HashMap<String, String> = HashMap::new();
        let mut resolved = Vec::with_capacity(ops.len());

        let resolve = |id: &str, by_name: &HashMap<String, String>| -> String {
            id.strip_prefix(NEW_GRAPH_PREFIX)
                .and_then(|name| by_name.get(name))
                .cloned()
                .unwrap_or_else(|| id.to_string())
        };

        for op in ops {
            let mut op = op.clone();
            match &mut op {
                Op::CreateNewGraph { graph_id, name, .. } => {
                    by_name.insert(name.clone(), graph_id.clone());
                }
                Op::DeleteGraph { graph_id }
                | Op::SetActiveGraph { graph_id }
                | Op::ConvertToNodeGroup { graph_id, .. }
                | Op::CreateGroup { graph_id, .. }
                | Op::MoveNodeInstance { graph_id, .. }
                | Op::DeleteNodeInstance { graph_id, .. }
                | Op::DeleteEdge { graph_id, .. }
                | Op::UpdateEdgeDefinition { graph_id, .. }
                | Op::AddEdge { graph_id, .. } => {
                    *graph_id = resolve(graph_id, &by_name);
                }
                Op::AddNodeInstance { graph_id, instance } => {
                    *graph_id = resolve(graph_id, &by_name);
                    instance.graph_id = resolve(&instance.graph_id, &by_name);
                }
                _ => {}
            }
            resolved.push(op);
        }

        let graph_id = resolve(patch_graph_id, &by_name);
        (resolved, graph_id)
    }
}

#[async_trait]
impl Stage for Committer {
    fn name(&self) -> &'static str {
        "committer"
    }

    async fn once(&self) -> StageOutcome {
        let Some(record) = self.queues.reviews.pull(1).into_iter().next() else {
            return StageOutcome::Idle;
        };
        let started = Utc::now();
        let review = record.payload;
        let lease_id = record.lease_id.as_deref().unwrap_or_default().to_string();
        let cid = review.patch.meta.cid.clone().unwrap_or_default();

        if review.review_status == ReviewStatus::Rejected {
            let reason = review.reason.unwrap_or_else(|| "unspecified".to_string());
            self.chat.post_system(
                &cid,
                format!(
                    "Patch from tool '{}' was rejected during audit: {}",
                    review.patch.meta.tool.as_deref().unwrap_or("unknown"),
                    reason
                ),
            );
            let _ = self.queues.reviews.ack(&lease_id);
            return StageOutcome::Done;
        }

        let (ops, graph_id) =
            Self::resolve_placeholders(&review.patch.ops, &review.patch.graph_id);
        let (reads, mutations): (Vec<Op>, Vec<Op>) =
            ops.into_iter().partition(|op| op.is_read());

        if let Err(e) = self.mirror.apply_atomic(&mutations) {
            // Audit approved a patch the mirror rejects; the state moved
            // between audit and commit. Drop it with feedback.
            error!(patch_id = %review.patch.patch_id, error = %e, "Commit failed, dropping patch");
            self.chat.post_system(
                &cid,
                format!(
                    "Patch from tool '{}' could not be committed: {}",
                    review.patch.meta.tool.as_deref().unwrap_or("unknown"),
                    e
                ),
            );
            self.tracer.record_error(
                &cid,
                "committer",
                started,
                review.patch.meta.tool.as_deref().unwrap_or("unknown"),
                &serde_json::json!({"patchId": review.patch.patch_id}),
                &e.to_string(),
            );
            let _ = self.queues.reviews.ack(&lease_id);
            return StageOutcome::Failed(e.to_string());
        }

        if !mutations.is_empty() {
            let batch_id = self.pending.push(
                graph_id.clone(),
                review.patch.meta.cid.clone(),
                mutations,
            );
            info!(patch_id = %review.patch.patch_id, batch_id = %batch_id, "Patch committed");
        }
        for op in reads {
            if let Op::ReadResponse { tool, payload } = op {
                self.chat.post_read_response(&cid, &tool, payload);
            }
        }

        self.tracer
            .record_ok(&cid, "committer", started, Some(graph_id));
        if self.queues.reviews.ack(&lease_id).is_err() {
            return StageOutcome::Failed("review lease vanished before ack".to_string());
        }
        StageOutcome::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Review;
    use bridge_core::{NodeInstance, NodePrototype, Patch};

    fn committer() -> (
        Committer,
        QueueSet,
        StateMirror,
        Arc<PendingActions>,
        Arc<ChatChannel>,
    ) {
        let queues = QueueSet::new();
        let mirror = StateMirror::new();
        let pending = Arc::new(PendingActions::new());
        let chat = Arc::new(ChatChannel::new());
        let stage = Committer::new(
            queues.clone(),
            mirror.clone(),
            pending.clone(),
            chat.clone(),
            Arc::new(ExecutionTracer::new()),
        );
        (stage, queues, mirror, pending, chat)
    }

    fn approved(patch: Patch) -> Review {
        Review {
            review_status: ReviewStatus::Approved,
            graph_id: patch.graph_id.clone(),
            patch,
            reason: None,
        }
    }

    #[tokio::test]
    async fn test_approved_patch_applies_and_queues_for_ui() {
        let (stage, queues, mirror, pending, _) = committer();
        let proto = NodePrototype::new("City");
        let instance = NodeInstance::new("g1", &proto.id, 1.0, 2.0);
        let mut patch = Patch::new(
            "thread-A",
            "g1",
            vec![
                Op::CreateNewGraph {
                    graph_id: "g1".to_string(),
                    name: "Cities".to_string(),
                    description: String::new(),
                    color: None,
                },
                Op::AddNodePrototype { prototype: proto },
                Op::AddNodeInstance {
                    graph_id: "g1".to_string(),
                    instance,
                },
            ],
        );
        patch.meta.cid = Some("cid-1".to_string());
        queues.reviews.enqueue(approved(patch), None);

        assert_eq!(stage.once().await, StageOutcome::Done);

        mirror.read(|state| {
            assert!(state.graphs.contains_key("g1"));
            assert_eq!(state.graphs["g1"].instances.len(), 1);
        });
        let batches = pending.poll();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].ops.len(), 3);
        assert_eq!(batches[0].cid.as_deref(), Some("cid-1"));
    }

    #[tokio::test]
    async fn test_placeholder_resolution_in_op_order() {
        let (stage, queues, mirror, pending, _) = committer();
        let proto = NodePrototype::new("River");
        let real_id = bridge_core::model::fresh_id();
        let instance = NodeInstance::new("NEW_GRAPH:Rivers", &proto.id, 0.0, 0.0);
        let mut patch = Patch::new(
            "thread-A",
            "NEW_GRAPH:Rivers",
            vec![
                Op::CreateNewGraph {
                    graph_id: real_id.clone(),
                    name: "Rivers".to_string(),
                    description: String::new(),
                    color: None,
                },
                Op::AddNodePrototype { prototype: proto },
                Op::AddNodeInstance {
                    graph_id: "NEW_GRAPH:Rivers".to_string(),
                    instance,
                },
            ],
        );
        patch.meta.cid = Some("cid-1".to_string());
        queues.reviews.enqueue(approved(patch), None);

        assert_eq!(stage.once().await, StageOutcome::Done);

        mirror.read(|state| {
            let graph = &state.graphs[&real_id];
            assert_eq!(graph.instances.len(), 1);
            let instance = graph.instances.values().next().unwrap();
            assert_eq!(instance.graph_id, real_id);
        });
        assert_eq!(pending.poll()[0].graph_id, real_id);
    }

    #[tokio::test]
    async fn test_rejected_review_is_discarded_with_feedback() {
        let (stage, queues, mirror, pending, chat) = committer();
        let mut patch = Patch::new("thread-A", "g1", vec![]);
        patch.meta.cid = Some("cid-1".to_string());
        patch.meta.tool = Some("create_subgraph".to_string());
        queues.reviews.enqueue(
            Review {
                review_status: ReviewStatus::Rejected,
                graph_id: "g1".to_string(),
                patch,
                reason: Some("op 0 (addEdge): endpoints missing".to_string()),
            },
            None,
        );

        assert_eq!(stage.once().await, StageOutcome::Done);
        assert!(queues.reviews.is_empty());
        assert!(pending.is_empty());
        assert!(mirror.snapshot().graphs.is_empty());

        let entries = chat.entries_for("cid-1");
        assert_eq!(entries.len(), 1);
        assert!(entries[0].text.contains("rejected"));
        assert!(entries[0].text.contains("create_subgraph"));
    }

    #[tokio::test]
    async fn test_read_responses_reach_chat_not_pending() {
        let (stage, queues, _, pending, chat) = committer();
        let mut patch = Patch::new(
            "thread-A",
            "",
            vec![Op::ReadResponse {
                tool: "read_graph_structure".to_string(),
                payload: serde_json::json!({"nodeCount": 3}),
            }],
        );
        patch.meta.cid = Some("cid-1".to_string());
        queues.reviews.enqueue(approved(patch), None);

        assert_eq!(stage.once().await, StageOutcome::Done);
        assert!(pending.is_empty());

        let entries = chat.entries_for("cid-1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload.as_ref().unwrap()["nodeCount"], 3);
    }

    #[tokio::test]
    async fn test_conflicting_commit_is_dropped_not_retried() {
        let (stage, queues, mirror, pending, chat) = committer();
        // Patch deletes a graph that no longer exists.
        let mut patch = Patch::new(
            "thread-A",
            "gone",
            vec![Op::DeleteGraph {
                graph_id: "gone".to_string(),
            }],
        );
        patch.meta.cid = Some("cid-1".to_string());
        queues.reviews.enqueue(approved(patch), None);

        let outcome = stage.once().await;
        assert!(matches!(outcome, StageOutcome::Failed(_)));
        assert!(queues.reviews.is_empty());
        assert!(pending.is_empty());
        assert!(mirror.snapshot().graphs.is_empty());
        assert!(!chat.entries_for("cid-1").is_empty());
    }
}
