//! Registry from tool name to schema and synthesis function.

use super::schema::{array, boolean, color, enum_of, number, string, ToolSchema};
use super::synthesis;
use crate::error::Result;
use bridge_core::{MirrorState, Op};
use bridge_llm::ToolSpec;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Read-only context a synthesis function works against.
pub struct SynthesisContext<'a> {
    pub state: &'a MirrorState,

    /// Dice similarity at or above which prototype names dedup.
    pub fuzzy_threshold: f64,
}

impl<'a> SynthesisContext<'a> {
    pub fn new(state: &'a MirrorState) -> Self {
        Self {
            state,
            fuzzy_threshold: bridge_core::text::FUZZY_MATCH_THRESHOLD,
        }
    }
}

/// Side information produced during synthesis, fed to the tracer.
#[derive(Debug, Clone)]
pub enum SynthesisNote {
    /// A node name reused an existing prototype through fuzzy matching.
    FuzzyPrototypeMatch {
        input: String,
        matched: String,
        prototype_id: String,
        similarity: f64,
    },
}

/// The op list a tool produced, plus the target graph for the patch.
#[derive(Debug, Clone)]
pub struct Synthesis {
    /// Patch target; empty for store-global ops (prototype edits, reads
    /// that span graphs).
    pub graph_id: String,

    pub ops: Vec<Op>,
    pub notes: Vec<SynthesisNote>,
}

impl Synthesis {
    pub fn for_graph(graph_id: impl Into<String>, ops: Vec<Op>) -> Self {
        Self {
            graph_id: graph_id.into(),
            ops,
            notes: Vec::new(),
        }
    }

    pub fn global(ops: Vec<Op>) -> Self {
        Self {
            graph_id: String::new(),
            ops,
            notes: Vec::new(),
        }
    }
}

type SynthesizeFn = fn(&SynthesisContext, &Value) -> Result<Synthesis>;

/// How the executor runs a tool.
pub enum ToolKind {
    /// Pure synthesis against the mirror.
    Synthesize(SynthesizeFn),

    /// Bounded external read; the executor calls the external reader and
    /// wraps the result in a `readResponse`.
    ExternalRead,
}

pub struct ToolEntry {
    pub schema: ToolSchema,
    pub kind: ToolKind,
    pub description: &'static str,
}

/// The closed tool surface.
pub struct ToolRegistry {
    entries: HashMap<&'static str, ToolEntry>,
}

const LAYOUT_ALGORITHMS: &[&str] = &["force", "hierarchical", "radial", "linear"];
const LAYOUT_MODES: &[&str] = &["full", "partial", "auto"];
const EDGE_DIRECTIONS: &[&str] = &["unidirectional", "bidirectional", "none", "reverse"];

impl ToolRegistry {
    /// Registry with every built-in tool.
    pub fn with_builtin_tools() -> Self {
        let mut entries = HashMap::new();

        let mut register = |schema: ToolSchema, kind: ToolKind, description: &'static str| {
            entries.insert(schema.tool, ToolEntry { schema, kind, description });
        };

        register(
            ToolSchema::new(
                "create_graph",
                vec![
                    string("name", true),
                    string("description", false),
                    color("color", false),
                    boolean("set_active", false).with_default(json!(false)),
                ],
            ),
            ToolKind::Synthesize(synthesis::create_graph),
            "Create a new empty graph",
        );

        register(
            ToolSchema::new(
                "create_node_prototype",
                vec![
                    string("name", true),
                    string("description", false),
                    color("color", false),
                ],
            ),
            ToolKind::Synthesize(synthesis::create_node_prototype),
            "Register a reusable concept",
        );

        register(
            ToolSchema::new(
                "create_node",
                vec![
                    string("graph_id", false),
                    string("name", true),
                    string("description", false),
                    color("color", false),
                    number("x", false),
                    number("y", false),
                ],
            ),
            ToolKind::Synthesize(synthesis::create_node),
            "Place a concept in a graph, creating or reusing its prototype",
        );

        register(
            ToolSchema::new(
                "create_node_instance",
                vec![
                    string("graph_id", true),
                    string("prototype_id", true),
                    number("x", false).with_default(json!(0.0)),
                    number("y", false).with_default(json!(0.0)),
                    number("scale", false).with_default(json!(1.0)),
                ],
            ),
            ToolKind::Synthesize(synthesis::create_node_instance),
            "Place an existing prototype in a graph",
        );

        register(
            ToolSchema::new(
                "create_edge",
                vec![
                    string("graph_id", false),
                    string("source", true),
                    string("destination", true),
                    string("name", false),
                    enum_of("direction", EDGE_DIRECTIONS, false).with_default(json!("unidirectional")),
                    string("definition", false),
                ],
            ),
            ToolKind::Synthesize(synthesis::create_edge),
            "Connect two nodes by instance id or name",
        );

        register(
            ToolSchema::new(
                "create_subgraph",
                vec![
                    string("graph_id", true),
                    array("nodes", true),
                    array("edges", false).with_default(json!([])),
                    enum_of("layout", LAYOUT_ALGORITHMS, false).with_default(json!("force")),
                    enum_of("layout_mode", LAYOUT_MODES, false).with_default(json!("auto")),
                ],
            ),
            ToolKind::Synthesize(synthesis::create_subgraph),
            "Bulk-create nodes and edges in an existing graph with layout",
        );

        register(
            ToolSchema::new(
                "create_populated_graph",
                vec![
                    string("name", true),
                    string("description", false),
                    color("color", false),
                    array("nodes", true),
                    array("edges", false).with_default(json!([])),
                    enum_of("layout", LAYOUT_ALGORITHMS, false).with_default(json!("force")),
                ],
            ),
            ToolKind::Synthesize(synthesis::create_populated_graph),
            "Atomically create a graph and populate it",
        );

        register(
            ToolSchema::new(
                "create_subgraph_in_new_graph",
                vec![
                    string("name", true),
                    string("description", false),
                    array("nodes", true),
                    array("edges", false).with_default(json!([])),
                    enum_of("layout", LAYOUT_ALGORITHMS, false).with_default(json!("force")),
                ],
            ),
            ToolKind::Synthesize(synthesis::create_subgraph_in_new_graph),
            "Populate a graph that is created earlier in the same patch",
        );

        register(
            ToolSchema::new(
                "define_connections",
                vec![
                    string("graph_id", false),
                    number("limit", false).with_default(json!(10.0)).with_range(1.0, 100.0),
                    boolean("skip_generic", false).with_default(json!(true)),
                ],
            ),
            ToolKind::Synthesize(synthesis::define_connections),
            "Synthesize definition concepts for untyped edges",
        );

        register(
            ToolSchema::new(
                "read_graph_structure",
                vec![
                    string("graph_id", false),
                    boolean("include_descriptions", false).with_default(json!(false)),
                    boolean("include_colors", false).with_default(json!(false)),
                ],
            ),
            ToolKind::Synthesize(synthesis::read_graph_structure),
            "Read a graph's nodes and edges without spatial data",
        );

        register(
            ToolSchema::new(
                "get_edge_info",
                vec![string("graph_id", false), string("edge_id", true)],
            ),
            ToolKind::Synthesize(synthesis::get_edge_info),
            "Read one edge's endpoints, direction and definition",
        );

        register(
            ToolSchema::new("get_node_definition", vec![string("name", true)]),
            ToolKind::Synthesize(synthesis::get_node_definition),
            "Read a prototype's description and definition graphs",
        );

        register(
            ToolSchema::new(
                "sparql_query",
                vec![string("endpoint", true), string("query", true)],
            ),
            ToolKind::ExternalRead,
            "Run a SPARQL query against an external endpoint",
        );

        register(
            ToolSchema::new(
                "semantic_search",
                vec![
                    string("query", true),
                    number("limit", false).with_default(json!(10.0)).with_range(1.0, 50.0),
                ],
            ),
            ToolKind::ExternalRead,
            "Search external knowledge sources",
        );

        register(
            ToolSchema::new(
                "update_node_prototype",
                vec![
                    string("prototype_id", true),
                    string("name", false),
                    string("description", false),
                    color("color", false),
                ],
            ),
            ToolKind::Synthesize(synthesis::update_node_prototype),
            "Edit a prototype's fields",
        );

        register(
            ToolSchema::new(
                "delete_node_instance",
                vec![string("graph_id", true), string("instance_id", true)],
            ),
            ToolKind::Synthesize(synthesis::delete_node_instance),
            "Remove an instance from a graph",
        );

        register(
            ToolSchema::new("delete_node_prototype", vec![string("prototype_id", true)]),
            ToolKind::Synthesize(synthesis::delete_node_prototype),
            "Remove a prototype from the shared store",
        );

        register(
            ToolSchema::new("delete_graph", vec![string("graph_id", true)]),
            ToolKind::Synthesize(synthesis::delete_graph),
            "Delete a graph by id or name",
        );

        register(
            ToolSchema::new(
                "delete_edge",
                vec![string("graph_id", false), string("edge_id", true)],
            ),
            ToolKind::Synthesize(synthesis::delete_edge),
            "Remove an edge",
        );

        register(
            ToolSchema::new(
                "create_group",
                vec![
                    string("graph_id", true),
                    string("name", true),
                    array("instance_ids", true),
                ],
            ),
            ToolKind::Synthesize(synthesis::create_group),
            "Group instances visually",
        );

        register(
            ToolSchema::new(
                "convert_to_node_group",
                vec![string("graph_id", true), string("group_id", true)],
            ),
            ToolKind::Synthesize(synthesis::convert_to_node_group),
            "Promote a group to a node",
        );

        register(
            ToolSchema::new("set_active_graph", vec![string("graph_id", true)]),
            ToolKind::Synthesize(synthesis::set_active_graph),
            "Focus a graph in the UI",
        );

        register(
            ToolSchema::new("verify_state", vec![]),
            ToolKind::Synthesize(synthesis::verify_state),
            "Report mirror health for an empty plan",
        );

        Self { entries }
    }

    pub fn get(&self, tool: &str) -> Option<&ToolEntry> {
        self.entries.get(tool)
    }

    pub fn contains(&self, tool: &str) -> bool {
        self.entries.contains_key(tool)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tool specs for the planner's LLM call, sorted by name so the
    /// prompt stays stable.
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .entries
            .values()
            .map(|entry| ToolSpec {
                name: entry.schema.tool.to_string(),
                description: entry.description.to_string(),
                parameters: entry.schema.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtin_tools()
    }
}
