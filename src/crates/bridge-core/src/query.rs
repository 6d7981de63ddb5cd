//! Read-only semantic projections over the mirror.
//!
//! These are the AI-facing views: prototype names resolved, directionality
//! folded to a three-valued enum, and spatial data stripped. Nothing here
//! ever exposes coordinates.

use crate::error::{CoreError, Result};
use crate::mirror::MirrorState;
use crate::model::Graph;
use serde::{Deserialize, Serialize};

/// Folded edge directionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Directionality {
    None,
    Unidirectional,
    Bidirectional,
}

/// Options for shaping a semantic structure read.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StructureOptions {
    pub include_descriptions: bool,
    pub include_colors: bool,
}

/// One node in the semantic projection. Carries no position.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticNode {
    pub id: String,
    pub prototype_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// One edge in the semantic projection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticEdge {
    pub id: String,
    pub source_id: String,
    pub destination_id: String,

    /// Human-readable summary, `source name → destination name`.
    pub label: String,

    pub directionality: Directionality,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub definition_node_ids: Vec<String>,
}

/// The full AI-facing projection of one graph.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSemanticStructure {
    pub graph_id: String,
    pub graph_name: String,
    pub nodes: Vec<SemanticNode>,
    pub edges: Vec<SemanticEdge>,
    pub node_count: usize,
    pub edge_count: usize,
    pub is_empty: bool,
}

/// Lightweight listing entry for `list_all_graphs`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub node_count: usize,
    pub edge_count: usize,
    pub is_active: bool,
}

/// The graph the UI currently has focused, if any.
pub fn get_active_graph(state: &MirrorState) -> Option<&Graph> {
    state
        .active_graph_id
        .as_deref()
        .and_then(|id| state.graphs.get(id))
}

/// Look a graph up by id.
pub fn get_graph_by_id<'a>(state: &'a MirrorState, graph_id: &str) -> Result<&'a Graph> {
    state
        .graphs
        .get(graph_id)
        .ok_or_else(|| CoreError::GraphNotFound(graph_id.to_string()))
}

/// Summaries of every graph in the store.
pub fn list_all_graphs(state: &MirrorState) -> Vec<GraphSummary> {
    let mut summaries: Vec<GraphSummary> = state
        .graphs
        .values()
        .map(|g| GraphSummary {
            id: g.id.clone(),
            name: g.name.clone(),
            description: g.description.clone(),
            node_count: g.instances.len(),
            edge_count: g.edge_ids.len(),
            is_active: state.active_graph_id.as_deref() == Some(g.id.as_str()),
        })
        .collect();
    summaries.sort_by(|a, b| a.name.cmp(&b.name));
    summaries
}

/// Case-insensitive substring search over graph names.
pub fn find_graphs_by_name<'a>(state: &'a MirrorState, needle: &str) -> Vec<&'a Graph> {
    let needle = needle.to_lowercase();
    let mut found: Vec<&Graph> = state
        .graphs
        .values()
        .filter(|g| g.name.to_lowercase().contains(&needle))
        .collect();
    found.sort_by(|a, b| a.name.cmp(&b.name));
    found
}

/// Resolve a graph by exact id, falling back to case-insensitive name
/// match. Used by tools whose callers may hand over either.
pub fn resolve_graph<'a>(state: &'a MirrorState, id_or_name: &str) -> Result<&'a Graph> {
    if let Some(graph) = state.graphs.get(id_or_name) {
        return Ok(graph);
    }
    let lowered = id_or_name.to_lowercase();
    state
        .graphs
        .values()
        .find(|g| g.name.to_lowercase() == lowered)
        .ok_or_else(|| CoreError::GraphNotFound(id_or_name.to_string()))
}

/// Build the semantic projection of one graph.
///
/// Edge labels read `source → destination` by prototype name; instances
/// whose prototype is missing fall back to their prototype id so a
/// half-synced mirror still produces a usable read.
pub fn get_graph_semantic_structure(
    state: &MirrorState,
    graph_id: &str,
    options: StructureOptions,
) -> Result<GraphSemanticStructure> {
    let graph = get_graph_by_id(state, graph_id)?;

    let name_of = |instance_id: &str| -> String {
        graph
            .instances
            .get(instance_id)
            .map(|i| {
                state
                    .prototypes
                    .get(&i.prototype_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| i.prototype_id.clone())
            })
            .unwrap_or_else(|| instance_id.to_string())
    };

    let mut nodes: Vec<SemanticNode> = graph
        .instances
        .values()
        .map(|instance| {
            let proto = state.prototypes.get(&instance.prototype_id);
            SemanticNode {
                id: instance.id.clone(),
                prototype_id: instance.prototype_id.clone(),
                name: proto
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| instance.prototype_id.clone()),
                description: match (options.include_descriptions, proto) {
                    (true, Some(p)) if !p.description.is_empty() => Some(p.description.clone()),
                    _ => None,
                },
                color: match (options.include_colors, proto) {
                    (true, Some(p)) if !p.color.is_empty() => Some(p.color.clone()),
                    _ => None,
                },
            }
        })
        .collect();
    nodes.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

    let edges: Vec<SemanticEdge> = graph
        .edge_ids
        .iter()
        .filter_map(|edge_id| state.edges.get(edge_id))
        .map(|edge| SemanticEdge {
            id: edge.id.clone(),
            source_id: edge.source_id.clone(),
            destination_id: edge.destination_id.clone(),
            label: format!("{} → {}", name_of(&edge.source_id), name_of(&edge.destination_id)),
            directionality: match edge.arrows_toward.len() {
                0 => Directionality::None,
                1 => Directionality::Unidirectional,
                _ => Directionality::Bidirectional,
            },
            definition_node_ids: edge.definition_node_ids.clone(),
        })
        .collect();

    Ok(GraphSemanticStructure {
        graph_id: graph.id.clone(),
        graph_name: graph.name.clone(),
        node_count: nodes.len(),
        edge_count: edges.len(),
        is_empty: nodes.is_empty() && edges.is_empty(),
        nodes,
        edges,
    })
}
