//! The bridge's merged view of UI state.
//!
//! The mirror holds the last-known authoritative snapshot from the UI plus
//! every locally applied mutation, so reads within one agent turn already
//! see the agent's own changes. Two write paths exist: `smart_merge` for
//! incoming UI snapshots and `local_apply` for committed ops. Both are
//! writer-exclusive behind an `RwLock`; readers work against the lock or a
//! cloned snapshot.

use crate::error::{CoreError, Result};
use crate::model::{Edge, Graph, NodeInstance, NodePrototype};
use crate::ops::Op;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// A container that the UI may post either as an id-keyed map or as a
/// plain array. Normalization rehydrates both into `{id -> entity}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EntityCollection<T> {
    Map(HashMap<String, T>),
    List(Vec<T>),
}

trait HasId {
    fn entity_id(&self) -> &str;
}

impl HasId for NodePrototype {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl HasId for Edge {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl HasId for NodeInstance {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl HasId for SnapshotGraph {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl<T: HasId> EntityCollection<T> {
    fn into_map(self) -> HashMap<String, T> {
        match self {
            EntityCollection::Map(map) => map,
            EntityCollection::List(list) => list
                .into_iter()
                .map(|e| (e.entity_id().to_string(), e))
                .collect(),
        }
    }
}

/// Graph as posted by the UI; instance containers arrive in either shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotGraph {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub instances: Option<EntityCollection<NodeInstance>>,
    #[serde(default)]
    pub edge_ids: Vec<String>,
}

impl SnapshotGraph {
    fn normalize(self) -> Graph {
        Graph {
            id: self.id,
            name: self.name,
            description: self.description,
            color: self.color,
            instances: self.instances.map(|c| c.into_map()).unwrap_or_default(),
            edge_ids: self.edge_ids,
        }
    }
}

/// A full-state snapshot posted by the UI. Absent fields leave the
/// corresponding mirror state untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub graphs: Option<EntityCollection<SnapshotGraph>>,
    pub prototypes: Option<EntityCollection<NodePrototype>>,
    pub edges: Option<EntityCollection<Edge>>,
    pub active_graph_id: Option<String>,
    pub open_graph_ids: Option<Vec<String>>,
}

/// The mirror's materialized state.
///
/// Edges live in a single store keyed by id; graphs reference them through
/// their ordered `edge_ids` lists. Entities created locally are tracked by
/// provenance sets so a UI snapshot that does not yet include them cannot
/// erase them.
#[derive(Debug, Clone, Default)]
pub struct MirrorState {
    pub graphs: HashMap<String, Graph>,
    pub prototypes: HashMap<String, NodePrototype>,
    pub edges: HashMap<String, Edge>,
    pub active_graph_id: Option<String>,
    pub open_graph_ids: Vec<String>,
    pub last_update: Option<DateTime<Utc>>,

    local_graph_ids: HashSet<String>,
    local_prototype_ids: HashSet<String>,
    local_edge_ids: HashSet<String>,
}

impl MirrorState {
    /// Union-biased merge of an incoming UI snapshot.
    ///
    /// Incoming entities replace same-id entries wholesale. Entries the
    /// snapshot lacks are dropped unless they were applied locally, in
    /// which case they survive until the UI confirms or deletes them.
    /// Scalar pointers are overwritten only when present in the snapshot.
    pub fn smart_merge(&mut self, incoming: Snapshot) {
        if let Some(graphs) = incoming.graphs {
            let incoming_graphs: HashMap<String, Graph> = graphs
                .into_map()
                .into_iter()
                .map(|(id, g)| (id, g.normalize()))
                .collect();

            let mut merged = incoming_graphs;
            for (id, existing) in self.graphs.drain() {
                if !merged.contains_key(&id) && self.local_graph_ids.contains(&id) {
                    debug!(graph_id = %id, "Retaining locally created graph absent from snapshot");
                    merged.insert(id, existing);
                } else if merged.contains_key(&id) {
                    // The UI now owns this entry.
                    self.local_graph_ids.remove(&id);
                }
            }
            self.graphs = merged;
        }

        if let Some(prototypes) = incoming.prototypes {
            let mut merged = prototypes.into_map();
            for (id, existing) in self.prototypes.drain() {
                if !merged.contains_key(&id) && self.local_prototype_ids.contains(&id) {
                    debug!(prototype_id = %id, "Retaining locally created prototype absent from snapshot");
                    merged.insert(id, existing);
                } else if merged.contains_key(&id) {
                    self.local_prototype_ids.remove(&id);
                }
            }
            self.prototypes = merged;
        }

        if let Some(edges) = incoming.edges {
            let mut merged = edges.into_map();
            for (id, existing) in self.edges.drain() {
                if !merged.contains_key(&id) && self.local_edge_ids.contains(&id) {
                    merged.insert(id, existing);
                } else if merged.contains_key(&id) {
                    self.local_edge_ids.remove(&id);
                }
            }
            self.edges = merged;
        }

        if let Some(active) = incoming.active_graph_id {
            self.active_graph_id = Some(active);
        }
        if let Some(open) = incoming.open_graph_ids {
            self.open_graph_ids = open;
        }

        self.last_update = Some(Utc::now());
    }

    /// Apply committed ops synchronously so subsequent reads in the same
    /// turn observe them. Ops are applied in array order; the first
    /// failure aborts the batch with the offending op's error.
    pub fn local_apply(&mut self, ops: &[Op]) -> Result<()> {
        for op in ops {
            self.apply_one(op)?;
        }
        self.last_update = Some(Utc::now());
        Ok(())
    }

    fn apply_one(&mut self, op: &Op) -> Result<()> {
        match op {
            Op::CreateNewGraph {
                graph_id,
                name,
                description,
                color,
            } => {
                let graph = Graph {
                    id: graph_id.clone(),
                    name: name.clone(),
                    description: description.clone(),
                    color: color.clone(),
                    instances: HashMap::new(),
                    edge_ids: Vec::new(),
                };
                self.graphs.insert(graph_id.clone(), graph);
                self.local_graph_ids.insert(graph_id.clone());
            }

            Op::DeleteGraph { graph_id } => {
                let graph = self
                    .graphs
                    .remove(graph_id)
                    .ok_or_else(|| CoreError::GraphNotFound(graph_id.clone()))?;
                for edge_id in &graph.edge_ids {
                    self.edges.remove(edge_id);
                    self.local_edge_ids.remove(edge_id);
                }
                self.local_graph_ids.remove(graph_id);
                self.open_graph_ids.retain(|id| id != graph_id);
                if self.active_graph_id.as_deref() == Some(graph_id) {
                    self.active_graph_id = None;
                }
            }

            Op::AddNodePrototype { prototype } => {
                self.prototypes
                    .insert(prototype.id.clone(), prototype.clone());
                self.local_prototype_ids.insert(prototype.id.clone());
            }

            Op::UpdateNodePrototype {
                prototype_id,
                name,
                description,
                color,
            } => {
                let proto = self
                    .prototypes
                    .get_mut(prototype_id)
                    .ok_or_else(|| CoreError::PrototypeNotFound(prototype_id.clone()))?;
                if let Some(name) = name {
                    proto.name = name.clone();
                }
                if let Some(description) = description {
                    proto.description = description.clone();
                }
                if let Some(color) = color {
                    proto.color = color.clone();
                }
            }

            Op::DeleteNodePrototype { prototype_id } => {
                if self.prototypes.remove(prototype_id).is_none() {
                    return Err(CoreError::PrototypeNotFound(prototype_id.clone()));
                }
                self.local_prototype_ids.remove(prototype_id);
            }

            Op::AddNodeInstance { graph_id, instance } => {
                if !self.prototypes.contains_key(&instance.prototype_id) {
                    return Err(CoreError::PrototypeNotFound(instance.prototype_id.clone()));
                }
                let graph = self
                    .graphs
                    .get_mut(graph_id)
                    .ok_or_else(|| CoreError::GraphNotFound(graph_id.clone()))?;
                graph.instances.insert(instance.id.clone(), instance.clone());
            }

            Op::MoveNodeInstance {
                graph_id,
                instance_id,
                x,
                y,
            } => {
                let graph = self
                    .graphs
                    .get_mut(graph_id)
                    .ok_or_else(|| CoreError::GraphNotFound(graph_id.clone()))?;
                let instance = graph
                    .instances
                    .get_mut(instance_id)
                    .ok_or_else(|| CoreError::InstanceNotFound(instance_id.clone()))?;
                instance.x = *x;
                instance.y = *y;
            }

            Op::DeleteNodeInstance {
                graph_id,
                instance_id,
            } => {
                let graph = self
                    .graphs
                    .get_mut(graph_id)
                    .ok_or_else(|| CoreError::GraphNotFound(graph_id.clone()))?;
                if graph.instances.remove(instance_id).is_none() {
                    return Err(CoreError::InstanceNotFound(instance_id.clone()));
                }
                // Edges touching the instance go with it.
                let orphaned: Vec<String> = graph
                    .edge_ids
                    .iter()
                    .filter(|eid| {
                        self.edges
                            .get(*eid)
                            .map(|e| e.has_endpoint(instance_id))
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect();
                for edge_id in orphaned {
                    graph.edge_ids.retain(|id| id != &edge_id);
                    self.edges.remove(&edge_id);
                    self.local_edge_ids.remove(&edge_id);
                }
            }

            Op::AddEdge { graph_id, edge } => {
                let graph = self
                    .graphs
                    .get(graph_id)
                    .ok_or_else(|| CoreError::GraphNotFound(graph_id.clone()))?;
                for endpoint in [&edge.source_id, &edge.destination_id] {
                    if !graph.instances.contains_key(endpoint) {
                        return Err(CoreError::InstanceNotFound(endpoint.clone()));
                    }
                }
                for target in &edge.arrows_toward {
                    if !edge.has_endpoint(target) {
                        return Err(CoreError::InvalidOp(format!(
                            "arrow target {} is not an endpoint of edge {}",
                            target, edge.id
                        )));
                    }
                }
                self.edges.insert(edge.id.clone(), edge.clone());
                self.local_edge_ids.insert(edge.id.clone());
                if let Some(graph) = self.graphs.get_mut(graph_id) {
                    if !graph.edge_ids.contains(&edge.id) {
                        graph.edge_ids.push(edge.id.clone());
                    }
                }
            }

            Op::DeleteEdge { graph_id, edge_id } => {
                let graph = self
                    .graphs
                    .get_mut(graph_id)
                    .ok_or_else(|| CoreError::GraphNotFound(graph_id.clone()))?;
                if self.edges.remove(edge_id).is_none() {
                    return Err(CoreError::EdgeNotFound(edge_id.clone()));
                }
                graph.edge_ids.retain(|id| id != edge_id);
                self.local_edge_ids.remove(edge_id);
            }

            Op::UpdateEdgeDefinition {
                edge_id,
                definition_node_ids,
                ..
            } => {
                let edge = self
                    .edges
                    .get_mut(edge_id)
                    .ok_or_else(|| CoreError::EdgeNotFound(edge_id.clone()))?;
                edge.definition_node_ids = definition_node_ids.clone();
            }

            // Visual-only ops carry no mirror state.
            Op::CreateGroup { .. } | Op::ConvertToNodeGroup { .. } => {}

            Op::SetActiveGraph { graph_id } => {
                if !self.graphs.contains_key(graph_id) {
                    return Err(CoreError::GraphNotFound(graph_id.clone()));
                }
                self.active_graph_id = Some(graph_id.clone());
            }

            Op::ReadResponse { .. } => {}
        }
        Ok(())
    }

    /// Drop everything. Test isolation helper.
    pub fn clear(&mut self) {
        *self = MirrorState::default();
    }
}

/// Shared handle to the mirror. Cheap to clone; all access is through the
/// inner lock.
#[derive(Clone, Default)]
pub struct StateMirror {
    inner: Arc<RwLock<MirrorState>>,
}

impl StateMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an incoming UI snapshot.
    pub fn smart_merge(&self, incoming: Snapshot) {
        self.inner.write().smart_merge(incoming);
    }

    /// Apply committed ops.
    pub fn local_apply(&self, ops: &[Op]) -> Result<()> {
        let result = self.inner.write().local_apply(ops);
        if let Err(ref e) = result {
            warn!(error = %e, "local_apply aborted");
        }
        result
    }

    /// Apply a batch all-or-nothing: a failure partway through leaves the
    /// mirror exactly as it was.
    pub fn apply_atomic(&self, ops: &[Op]) -> Result<()> {
        let mut guard = self.inner.write();
        let mut staged = guard.clone();
        staged.local_apply(ops)?;
        *guard = staged;
        Ok(())
    }

    /// Run a read closure against the current state.
    pub fn read<R>(&self, f: impl FnOnce(&MirrorState) -> R) -> R {
        f(&self.inner.read())
    }

    /// Clone the full state. For handlers that serialize it out.
    pub fn snapshot(&self) -> MirrorState {
        self.inner.read().clone()
    }
}
