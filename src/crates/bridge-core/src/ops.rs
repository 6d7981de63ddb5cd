//! Mutation operations and patches.
//!
//! A patch is an ordered list of ops produced by the executor, audited by
//! the auditor and applied by the committer. The op set is closed: the UI
//! only understands these kinds, tagged by `type` on the wire.

use crate::model::{Edge, NodeInstance, NodePrototype};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Placeholder prefix for graph ids that are created earlier in the same
/// patch. The committer resolves `NEW_GRAPH:<name>` against the graph
/// created by the preceding `createNewGraph` op.
pub const NEW_GRAPH_PREFIX: &str = "NEW_GRAPH:";

/// A single mutation drawn from the closed op set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Op {
    /// Create a new, empty graph.
    CreateNewGraph {
        graph_id: String,
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },

    /// Delete a graph together with its instances and edges.
    DeleteGraph { graph_id: String },

    /// Register a new reusable concept.
    AddNodePrototype { prototype: NodePrototype },

    /// Patch selected fields of an existing prototype.
    UpdateNodePrototype {
        prototype_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },

    /// Remove a prototype from the shared store.
    DeleteNodePrototype { prototype_id: String },

    /// Place a prototype in a graph.
    AddNodeInstance { graph_id: String, instance: NodeInstance },

    /// Reposition an existing instance.
    MoveNodeInstance {
        graph_id: String,
        instance_id: String,
        x: f64,
        y: f64,
    },

    /// Remove an instance (and any edges touching it).
    DeleteNodeInstance { graph_id: String, instance_id: String },

    /// Connect two instances within a graph.
    AddEdge { graph_id: String, edge: Edge },

    /// Remove an edge.
    DeleteEdge { graph_id: String, edge_id: String },

    /// Replace the defining concepts of an edge.
    UpdateEdgeDefinition {
        graph_id: String,
        edge_id: String,
        definition_node_ids: Vec<String>,
    },

    /// Group instances visually. The mirror forwards this to the UI
    /// unchanged; it carries no model-level state.
    CreateGroup {
        graph_id: String,
        group_id: String,
        name: String,
        member_instance_ids: Vec<String>,
    },

    /// Promote a visual group to a first-class node.
    ConvertToNodeGroup { graph_id: String, group_id: String },

    /// Move the UI's active-graph pointer.
    SetActiveGraph { graph_id: String },

    /// Carry a read result back to the agent's chat channel. Never
    /// mutates state.
    ReadResponse {
        tool: String,
        payload: Value,
    },
}

impl Op {
    /// The wire tag for this op kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Op::CreateNewGraph { .. } => "createNewGraph",
            Op::DeleteGraph { .. } => "deleteGraph",
            Op::AddNodePrototype { .. } => "addNodePrototype",
            Op::UpdateNodePrototype { .. } => "updateNodePrototype",
            Op::DeleteNodePrototype { .. } => "deleteNodePrototype",
            Op::AddNodeInstance { .. } => "addNodeInstance",
            Op::MoveNodeInstance { .. } => "moveNodeInstance",
            Op::DeleteNodeInstance { .. } => "deleteNodeInstance",
            Op::AddEdge { .. } => "addEdge",
            Op::DeleteEdge { .. } => "deleteEdge",
            Op::UpdateEdgeDefinition { .. } => "updateEdgeDefinition",
            Op::CreateGroup { .. } => "createGroup",
            Op::ConvertToNodeGroup { .. } => "convertToNodeGroup",
            Op::SetActiveGraph { .. } => "setActiveGraph",
            Op::ReadResponse { .. } => "readResponse",
        }
    }

    /// True for ops that only carry data back to the agent.
    pub fn is_read(&self) -> bool {
        matches!(self, Op::ReadResponse { .. })
    }

    /// The graph this op targets, when it targets one.
    pub fn graph_id(&self) -> Option<&str> {
        match self {
            Op::CreateNewGraph { graph_id, .. }
            | Op::DeleteGraph { graph_id }
            | Op::AddNodeInstance { graph_id, .. }
            | Op::MoveNodeInstance { graph_id, .. }
            | Op::DeleteNodeInstance { graph_id, .. }
            | Op::AddEdge { graph_id, .. }
            | Op::DeleteEdge { graph_id, .. }
            | Op::UpdateEdgeDefinition { graph_id, .. }
            | Op::CreateGroup { graph_id, .. }
            | Op::ConvertToNodeGroup { graph_id, .. }
            | Op::SetActiveGraph { graph_id } => Some(graph_id),
            _ => None,
        }
    }
}

/// Metadata propagated along the pipeline with each patch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchMeta {
    /// Correlation id of the originating agent turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,

    /// Tool that produced this patch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

/// An ordered list of ops against one graph, produced by the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    pub patch_id: String,
    pub thread_id: String,

    /// Target graph. May be a `NEW_GRAPH:<name>` placeholder when the
    /// graph is created by an op earlier in this same patch.
    pub graph_id: String,

    /// Reserved for optimistic-concurrency checks; always absent today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_hash: Option<String>,

    pub ops: Vec<Op>,

    #[serde(default)]
    pub meta: PatchMeta,
}

impl Patch {
    /// Create a patch with a fresh id.
    pub fn new(thread_id: impl Into<String>, graph_id: impl Into<String>, ops: Vec<Op>) -> Self {
        Self {
            patch_id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            graph_id: graph_id.into(),
            base_hash: None,
            ops,
            meta: PatchMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: PatchMeta) -> Self {
        self.meta = meta;
        self
    }
}
