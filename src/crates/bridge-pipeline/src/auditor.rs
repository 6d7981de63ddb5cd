//! The audit stage: structural and referential patch validation.
//!
//! Every patch is replayed against a simulation of the mirror before it
//! may commit: instances must reference known prototypes, edges must stay
//! inside one graph with arrow targets on their own endpoints, and
//! entities created earlier in the same patch count as known (including
//! `NEW_GRAPH:` placeholders). Violations reject the patch; the review
//! queue carries the verdict either way.

use crate::scheduler::{Stage, StageOutcome};
use crate::tracer::ExecutionTracer;
use crate::types::{QueueSet, Review, ReviewStatus};
use async_trait::async_trait;
use bridge_core::{MirrorState, Op, Patch, StateMirror, NEW_GRAPH_PREFIX};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Auditor {
    queues: QueueSet,
    mirror: StateMirror,
    tracer: Arc<ExecutionTracer>,
}

impl Auditor {
    pub fn new(queues: QueueSet, mirror: StateMirror, tracer: Arc<ExecutionTracer>) -> Self {
        Self {
            queues,
            mirror,
            tracer,
        }
    }

    /// Replay `patch` against the mirror state. Returns the first
    /// violation, or None when every op checks out.
    fn audit(state: &MirrorState, patch: &Patch) -> Option<String> {
        // Known-entity simulation, seeded from the mirror.
        let mut graphs: HashSet<String> = state.graphs.keys().cloned().collect();
        let mut prototypes: HashSet<String> = state.prototypes.keys().cloned().collect();
        let mut edges: HashSet<String> = state.edges.keys().cloned().collect();
        // instance id -> graph id
        let mut instances: HashMap<String, String> = state
            .graphs
            .values()
            .flat_map(|g| g.instances.keys().map(move |id| (id.clone(), g.id.clone())))
            .collect();

        for (index, op) in patch.ops.iter().enumerate() {
            let violation = match op {
                Op::CreateNewGraph { graph_id, name, .. } => {
                    graphs.insert(graph_id.clone());
                    graphs.insert(format!("{}{}", NEW_GRAPH_PREFIX, name));
                    None
                }

                Op::DeleteGraph { graph_id } => {
                    if graphs.remove(graph_id) {
                        instances.retain(|_, owner| owner != graph_id);
                        None
                    } else {
                        Some(format!("deleteGraph references unknown graph '{}'", graph_id))
                    }
                }

                Op::AddNodePrototype { prototype } => {
                    prototypes.insert(prototype.id.clone());
                    None
                }

                Op::UpdateNodePrototype { prototype_id, .. } => {
                    (!prototypes.contains(prototype_id)).then(|| {
                        format!(
                            "updateNodePrototype references unknown prototype '{}'",
                            prototype_id
                        )
                    })
                }

                Op::DeleteNodePrototype { prototype_id } => {
                    if prototypes.remove(prototype_id) {
                        None
                    } else {
                        Some(format!(
                            "deleteNodePrototype references unknown prototype '{}'",
                            prototype_id
                        ))
                    }
                }

                Op::AddNodeInstance { graph_id, instance } => {
                    if !graphs.contains(graph_id) {
                        Some(format!("addNodeInstance targets unknown graph '{}'", graph_id))
                    } else if !prototypes.contains(&instance.prototype_id) {
                        Some(format!(
                            "addNodeInstance references unknown prototype '{}'",
                            instance.prototype_id
                        ))
                    } else {
                        instances.insert(instance.id.clone(), graph_id.clone());
                        None
                    }
                }

                Op::MoveNodeInstance {
                    graph_id,
                    instance_id,
                    ..
                } => match instances.get(instance_id) {
                    Some(owner) if owner == graph_id => None,
                    Some(_) => Some(format!(
                        "moveNodeInstance crosses graphs for instance '{}'",
                        instance_id
                    )),
                    None => Some(format!(
                        "moveNodeInstance references unknown instance '{}'",
                        instance_id
                    )),
                },

                Op::DeleteNodeInstance {
                    graph_id,
                    instance_id,
                } => match instances.get(instance_id) {
                    Some(owner) if owner == graph_id => {
                        instances.remove(instance_id);
                        None
                    }
                    _ => Some(format!(
                        "deleteNodeInstance references unknown instance '{}'",
                        instance_id
                    )),
                },

                Op::AddEdge { graph_id, edge } => {
                    let source_owner = instances.get(&edge.source_id);
                    let destination_owner = instances.get(&edge.destination_id);
                    if source_owner != Some(graph_id) || destination_owner != Some(graph_id) {
                        Some(format!(
                            "addEdge endpoints must both live in graph '{}'",
                            graph_id
                        ))
                    } else if edge
                        .arrows_toward
                        .iter()
                        .any(|target| !edge.has_endpoint(target))
                    {
                        Some(format!(
                            "addEdge arrow target outside endpoints on edge '{}'",
                            edge.id
                        ))
                    } else if edge
                        .definition_node_ids
                        .iter()
                        .any(|id| !prototypes.contains(id))
                    {
                        Some(format!(
                            "addEdge definition references unknown prototype on edge '{}'",
                            edge.id
                        ))
                    } else {
                        edges.insert(edge.id.clone());
                        None
                    }
                }

                Op::DeleteEdge { edge_id, .. } => {
                    if edges.remove(edge_id) {
                        None
                    } else {
                        Some(format!("deleteEdge references unknown edge '{}'", edge_id))
                    }
                }

                Op::UpdateEdgeDefinition {
                    edge_id,
                    definition_node_ids,
                    ..
                } => {
                    if !edges.contains(edge_id) {
                        Some(format!(
                            "updateEdgeDefinition references unknown edge '{}'",
                            edge_id
                        ))
                    } else if definition_node_ids
                        .iter()
                        .any(|id| !prototypes.contains(id))
                    {
                        Some(format!(
                            "updateEdgeDefinition references unknown prototype on edge '{}'",
                            edge_id
                        ))
                    } else {
                        None
                    }
                }

                Op::CreateGroup {
                    graph_id,
                    member_instance_ids,
                    ..
                } => member_instance_ids
                    .iter()
                    .find(|id| instances.get(*id) != Some(graph_id))
                    .map(|id| format!("createGroup references unknown instance '{}'", id)),

                Op::ConvertToNodeGroup { .. } => None,

                Op::SetActiveGraph { graph_id } => (!graphs.contains(graph_id))
                    .then(|| format!("setActiveGraph targets unknown graph '{}'", graph_id)),

                Op::ReadResponse { .. } => None,
            };

            if let Some(reason) = violation {
                return Some(format!("op {} ({}): {}", index, op.kind(), reason));
            }
        }
        None
    }
}

#[async_trait]
impl Stage for Auditor {
    fn name(&self) -> &'static str {
        "auditor"
    }

    async fn once(&self) -> StageOutcome {
        let Some(record) = self.queues.patches.pull(1).into_iter().next() else {
            return StageOutcome::Idle;
        };
        let started = Utc::now();
        let patch = record.payload;
        let lease_id = record.lease_id.as_deref().unwrap_or_default().to_string();
        let cid = patch.meta.cid.clone().unwrap_or_default();

        let verdict = self.mirror.read(|state| Self::audit(state, &patch));
        let review = match verdict {
            None => {
                info!(patch_id = %patch.patch_id, ops = patch.ops.len(), "Patch approved");
                self.tracer
                    .record_ok(&cid, "auditor", started, Some("approved".to_string()));
                Review {
                    review_status: ReviewStatus::Approved,
                    graph_id: patch.graph_id.clone(),
                    patch,
                    reason: None,
                }
            }
            Some(reason) => {
                warn!(patch_id = %patch.patch_id, reason = %reason, "Patch rejected");
                self.tracer.record_error(
                    &cid,
                    "auditor",
                    started,
                    patch.meta.tool.as_deref().unwrap_or("unknown"),
                    &serde_json::json!({"patchId": patch.patch_id}),
                    &reason,
                );
                Review {
                    review_status: ReviewStatus::Rejected,
                    graph_id: patch.graph_id.clone(),
                    patch,
                    reason: Some(reason),
                }
            }
        };

        let partition = Some(review.patch.thread_id.clone());
        self.queues.reviews.enqueue(review, partition);
        if self.queues.patches.ack(&lease_id).is_err() {
            return StageOutcome::Failed("patch lease vanished before ack".to_string());
        }
        StageOutcome::Done
    }
}
