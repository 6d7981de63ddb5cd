//! Graph, prototype, instance and edge types mirrored from the UI.
//!
//! Ids are opaque strings minted by whichever side creates the entity; the
//! bridge mints UUID v4 ids for entities it creates. Wire shapes are
//! camelCase to match the UI's JSON.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Mint a fresh opaque entity id.
pub fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

/// A named container of node instances and edges.
///
/// The graph owns its instances; edges live in the mirror's single edge
/// store and are referenced here by an insertion-ordered id list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    /// Stable opaque identifier.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// Optional display color (`#rrggbb`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Instances placed in this graph, keyed by instance id.
    #[serde(default)]
    pub instances: HashMap<String, NodeInstance>,

    /// Edge ids in insertion order.
    #[serde(default)]
    pub edge_ids: Vec<String>,
}

impl Graph {
    /// Create an empty graph with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: fresh_id(),
            name: name.into(),
            description: String::new(),
            color: None,
            instances: HashMap::new(),
            edge_ids: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the display color.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Find the instance of a given prototype in this graph, if any.
    pub fn instance_of(&self, prototype_id: &str) -> Option<&NodeInstance> {
        self.instances
            .values()
            .find(|i| i.prototype_id == prototype_id)
    }
}

/// A reusable concept identity; nodes are instances of prototypes.
///
/// Prototypes are shared across graphs. Name uniqueness is enforced
/// case-insensitively by the executor's dedup pass, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePrototype {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub color: String,

    /// Parent type, when this prototype specializes another.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_type_id: Option<String>,

    /// Graphs that define this concept in depth.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub definition_graph_ids: Vec<String>,
}

impl NodePrototype {
    /// Create a prototype with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: fresh_id(),
            name: name.into(),
            description: String::new(),
            color: String::new(),
            parent_type_id: None,
            definition_graph_ids: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }
}

/// A placement of a prototype in one graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInstance {
    pub id: String,

    /// Owning graph.
    pub graph_id: String,

    /// Concept this instance places.
    pub prototype_id: String,

    pub x: f64,
    pub y: f64,

    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl NodeInstance {
    /// Create an instance at the given position with a fresh id.
    pub fn new(graph_id: impl Into<String>, prototype_id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: fresh_id(),
            graph_id: graph_id.into(),
            prototype_id: prototype_id.into(),
            x,
            y,
            scale: 1.0,
        }
    }
}

/// A connection between two instances in one graph.
///
/// `arrows_toward` holds the instance ids that arrowheads point at: empty
/// means undirected, one endpoint unidirectional, both bidirectional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source_id: String,
    pub destination_id: String,

    /// Connection label.
    #[serde(default)]
    pub name: String,

    /// Prototype describing this connection's type, if typed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_prototype_id: Option<String>,

    /// Instance ids arrowheads point toward. Must be a subset of the two
    /// endpoints.
    #[serde(default)]
    pub arrows_toward: BTreeSet<String>,

    /// Prototypes that semantically define the connection type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub definition_node_ids: Vec<String>,
}

impl Edge {
    /// Create an undirected edge with a fresh id.
    pub fn new(source_id: impl Into<String>, destination_id: impl Into<String>) -> Self {
        Self {
            id: fresh_id(),
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            name: String::new(),
            type_prototype_id: None,
            arrows_toward: BTreeSet::new(),
            definition_node_ids: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Point the arrowhead at one endpoint.
    pub fn directed_toward(mut self, instance_id: impl Into<String>) -> Self {
        self.arrows_toward.insert(instance_id.into());
        self
    }

    /// True when the given instance id is one of this edge's endpoints.
    pub fn has_endpoint(&self, instance_id: &str) -> bool {
        self.source_id == instance_id || self.destination_id == instance_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_builder() {
        let graph = Graph::new("Cities")
            .with_description("European cities")
            .with_color("#4a90d9");

        assert_eq!(graph.name, "Cities");
        assert_eq!(graph.description, "European cities");
        assert_eq!(graph.color.as_deref(), Some("#4a90d9"));
        assert!(graph.instances.is_empty());
        assert!(graph.edge_ids.is_empty());
    }

    #[test]
    fn test_instance_default_scale() {
        let instance = NodeInstance::new("g1", "p1", 10.0, -4.0);
        assert_eq!(instance.scale, 1.0);
        assert_eq!(instance.graph_id, "g1");
    }

    #[test]
    fn test_edge_directionality_builder() {
        let edge = Edge::new("a", "b").with_name("rail").directed_toward("b");
        assert!(edge.arrows_toward.contains("b"));
        assert_eq!(edge.arrows_toward.len(), 1);
        assert!(edge.has_endpoint("a"));
        assert!(!edge.has_endpoint("c"));
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let instance = NodeInstance::new("g1", "p1", 0.0, 0.0);
        let json = serde_json::to_value(&instance).unwrap();
        assert!(json.get("graphId").is_some());
        assert!(json.get("prototypeId").is_some());
        assert!(json.get("graph_id").is_none());
    }

    #[test]
    fn test_instance_of_lookup() {
        let mut graph = Graph::new("G");
        let instance = NodeInstance::new(&graph.id, "proto-1", 0.0, 0.0);
        graph.instances.insert(instance.id.clone(), instance);

        assert!(graph.instance_of("proto-1").is_some());
        assert!(graph.instance_of("proto-2").is_none());
    }
}
