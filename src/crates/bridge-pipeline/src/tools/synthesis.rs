//! Op synthesis per tool.
//!
//! Functions here turn sanitized tool arguments plus the current mirror
//! state into ordered op lists. Nothing in this module mutates the
//! mirror; patches it produces go through audit and commit first.

use super::registry::{Synthesis, SynthesisContext, SynthesisNote};
use crate::error::{PipelineError, Result};
use bridge_core::text::{color_for_name, dice_coefficient, fold_name, title_case};
use bridge_core::{query, Edge, Graph, NodeInstance, NodePrototype, Op, NEW_GRAPH_PREFIX};
use bridge_layout::{
    compute_layout, LayoutAlgorithm, LayoutEdge, LayoutMode, LayoutNode, LayoutOptions,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

/// Edge labels too generic to be worth a definition concept.
const GENERIC_EDGE_LABELS: &[&str] = &[
    "connects",
    "connects to",
    "is connected to",
    "connection",
    "relates to",
    "related to",
    "relation",
    "links",
    "link",
    "linked to",
];

/// Positions closer than this are left alone rather than re-emitted as
/// moves.
const MOVE_EPSILON: f64 = 0.5;

fn arg_str<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn arg_f64(args: &Value, name: &str) -> Option<f64> {
    args.get(name).and_then(Value::as_f64)
}

fn arg_bool(args: &Value, name: &str) -> bool {
    args.get(name).and_then(Value::as_bool).unwrap_or(false)
}

/// Target graph for a tool: explicit argument (id or name) first, active
/// graph otherwise.
fn resolve_target_graph<'a>(ctx: &'a SynthesisContext, args: &Value) -> Result<&'a Graph> {
    if let Some(id_or_name) = arg_str(args, "graph_id") {
        return Ok(query::resolve_graph(ctx.state, id_or_name)?);
    }
    query::get_active_graph(ctx.state).ok_or_else(|| {
        PipelineError::Validation(
            "no graph_id given and no graph is active; the graphId was missing or invalid"
                .to_string(),
        )
    })
}

// ---------------------------------------------------------------------------
// Prototype dedup

/// Resolves node names to prototype ids with a within-batch cache, exact
/// case-insensitive reuse, and fuzzy reuse above the Dice threshold. New
/// prototypes are minted only when all three miss.
struct PrototypeResolver {
    batch: HashMap<String, String>,
    ops: Vec<Op>,
    notes: Vec<SynthesisNote>,
}

impl PrototypeResolver {
    fn new() -> Self {
        Self {
            batch: HashMap::new(),
            ops: Vec::new(),
            notes: Vec::new(),
        }
    }

    fn resolve(
        &mut self,
        ctx: &SynthesisContext,
        name: &str,
        description: Option<&str>,
        color: Option<&str>,
    ) -> String {
        let folded = fold_name(name);
        if let Some(id) = self.batch.get(&folded) {
            return id.clone();
        }

        // Exact case-insensitive match against the store.
        if let Some(existing) = ctx
            .state
            .prototypes
            .values()
            .find(|p| fold_name(&p.name) == folded)
        {
            self.batch.insert(folded, existing.id.clone());
            return existing.id.clone();
        }

        // Fuzzy match: best Dice similarity at or above the threshold.
        let best = ctx
            .state
            .prototypes
            .values()
            .map(|p| (dice_coefficient(&p.name, name), p))
            .filter(|(similarity, _)| *similarity >= ctx.fuzzy_threshold)
            .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        if let Some((similarity, matched)) = best {
            debug!(input = name, matched = %matched.name, similarity, "Fuzzy prototype reuse");
            self.notes.push(SynthesisNote::FuzzyPrototypeMatch {
                input: name.to_string(),
                matched: matched.name.clone(),
                prototype_id: matched.id.clone(),
                similarity,
            });
            self.batch.insert(folded, matched.id.clone());
            return matched.id.clone();
        }

        let prototype = NodePrototype::new(name)
            .with_description(description.unwrap_or_default())
            .with_color(color.map(str::to_string).unwrap_or_else(|| color_for_name(name)));
        let id = prototype.id.clone();
        self.batch.insert(folded, id.clone());
        self.ops.push(Op::AddNodePrototype { prototype });
        id
    }

    /// Resolve a connection-definition concept: Title Case name, batch
    /// cache, global reuse, deterministic color on create.
    fn resolve_definition(&mut self, ctx: &SynthesisContext, label: &str) -> String {
        let pretty = title_case(label);
        self.resolve(ctx, &pretty, None, None)
    }
}

// ---------------------------------------------------------------------------
// Input parsing for bulk tools

struct NodeInput {
    name: String,
    description: Option<String>,
    color: Option<String>,
}

fn parse_node_inputs(args: &Value) -> Result<Vec<NodeInput>> {
    let raw = args
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::Validation("missing required field 'nodes'".to_string()))?;
    if raw.is_empty() {
        return Err(PipelineError::Validation(
            "field 'nodes' must not be empty".to_string(),
        ));
    }

    raw.iter()
        .enumerate()
        .map(|(index, value)| match value {
            Value::String(name) if !name.trim().is_empty() => Ok(NodeInput {
                name: name.trim().to_string(),
                description: None,
                color: None,
            }),
            Value::Object(map) => {
                let name = map
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        PipelineError::Validation(format!(
                            "node {} is missing required field 'name'",
                            index
                        ))
                    })?;
                Ok(NodeInput {
                    name: name.to_string(),
                    description: map
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    color: map.get("color").and_then(Value::as_str).map(str::to_string),
                })
            }
            _ => Err(PipelineError::Validation(format!(
                "node {} must be a name or an object with a 'name'",
                index
            ))),
        })
        .collect()
}

struct EdgeInput {
    source: String,
    destination: String,
    name: Option<String>,
    direction: String,
    definition: Option<String>,
}

fn parse_edge_inputs(args: &Value) -> Result<Vec<EdgeInput>> {
    let Some(raw) = args.get("edges").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    raw.iter()
        .enumerate()
        .map(|(index, value)| {
            let map = value.as_object().ok_or_else(|| {
                PipelineError::Validation(format!("edge {} must be an object", index))
            })?;
            let field = |key: &str| {
                map.get(key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            };
            let source = field("source").ok_or_else(|| {
                PipelineError::Validation(format!("edge {} is missing required field 'source'", index))
            })?;
            let destination = field("destination").ok_or_else(|| {
                PipelineError::Validation(format!(
                    "edge {} is missing required field 'destination'",
                    index
                ))
            })?;
            Ok(EdgeInput {
                source: source.to_string(),
                destination: destination.to_string(),
                name: field("name").map(str::to_string),
                direction: field("direction").unwrap_or("unidirectional").to_lowercase(),
                definition: field("definition").map(str::to_string),
            })
        })
        .collect()
}

fn arrows_for(direction: &str, source_id: &str, destination_id: &str) -> Result<Vec<String>> {
    match direction {
        "unidirectional" => Ok(vec![destination_id.to_string()]),
        "reverse" => Ok(vec![source_id.to_string()]),
        "bidirectional" => Ok(vec![source_id.to_string(), destination_id.to_string()]),
        "none" => Ok(Vec::new()),
        other => Err(PipelineError::Validation(format!(
            "Invalid edge direction '{}'",
            other
        ))),
    }
}

// ---------------------------------------------------------------------------
// Bulk population shared by create_subgraph and the new-graph variants

fn layout_algorithm(args: &Value) -> LayoutAlgorithm {
    match arg_str(args, "layout").unwrap_or("force") {
        "hierarchical" => LayoutAlgorithm::Hierarchical,
        "radial" => LayoutAlgorithm::Radial,
        "linear" => LayoutAlgorithm::Linear,
        _ => LayoutAlgorithm::Force,
    }
}

/// The create_subgraph pipeline: dedup prototypes, reuse or mint
/// instances, lay the result out, then synthesize edges and their
/// definition concepts. `graph` is the target's current contents (empty
/// for graphs created earlier in the same patch); `ops_graph_id` is the
/// id written into emitted ops, possibly a `NEW_GRAPH:` placeholder.
fn populate_graph(
    ctx: &SynthesisContext,
    graph: &Graph,
    ops_graph_id: &str,
    args: &Value,
) -> Result<(Vec<Op>, Vec<SynthesisNote>)> {
    let node_inputs = parse_node_inputs(args)?;
    let edge_inputs = parse_edge_inputs(args)?;

    let proto_name_of = |instance: &NodeInstance| {
        ctx.state
            .prototypes
            .get(&instance.prototype_id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| instance.prototype_id.clone())
    };

    // 1. Prototype dedup.
    let mut resolver = PrototypeResolver::new();
    let prototype_ids: Vec<String> = node_inputs
        .iter()
        .map(|input| {
            resolver.resolve(
                ctx,
                &input.name,
                input.description.as_deref(),
                input.color.as_deref(),
            )
        })
        .collect();

    // 2. Instance plan: reuse the graph's instance of a prototype when it
    // has one, mint otherwise. Also index every resolvable name to its
    // instance id for edge endpoint resolution.
    let mut name_to_instance: HashMap<String, String> = graph
        .instances
        .values()
        .map(|instance| (fold_name(&proto_name_of(instance)), instance.id.clone()))
        .collect();

    struct Placement {
        instance_id: String,
        prototype_id: String,
        label: String,
        existing: Option<(f64, f64)>,
    }
    let mut placements: Vec<Placement> = Vec::new();
    for (input, prototype_id) in node_inputs.iter().zip(&prototype_ids) {
        if placements.iter().any(|p| p.prototype_id == *prototype_id) {
            // Duplicate names in one batch collapse to one placement.
            name_to_instance
                .entry(fold_name(&input.name))
                .or_insert_with(|| {
                    placements
                        .iter()
                        .find(|p| p.prototype_id == *prototype_id)
                        .map(|p| p.instance_id.clone())
                        .unwrap_or_default()
                });
            continue;
        }
        let existing = graph.instance_of(prototype_id);
        let placement = Placement {
            instance_id: existing
                .map(|i| i.id.clone())
                .unwrap_or_else(bridge_core::model::fresh_id),
            prototype_id: prototype_id.clone(),
            label: input.name.clone(),
            existing: existing.map(|i| (i.x, i.y)),
        };
        name_to_instance.insert(fold_name(&input.name), placement.instance_id.clone());
        placements.push(placement);
    }

    // 3. Layout mode: auto resolves to full for an empty graph and
    // partial once an anchor cluster exists.
    let has_anchor = !graph.instances.is_empty();
    let mode = match arg_str(args, "layout_mode").unwrap_or("auto") {
        "full" => LayoutMode::Full,
        "partial" => LayoutMode::Partial,
        _ if has_anchor => LayoutMode::Partial,
        _ => LayoutMode::Full,
    };

    // 4. Layout input. Full mode includes every existing node and edge so
    // the whole graph is reshaped and recentered; partial pins existing
    // placements.
    let mut layout_nodes: Vec<LayoutNode> = Vec::new();
    for instance in graph.instances.values() {
        if placements.iter().any(|p| p.instance_id == instance.id) {
            continue;
        }
        let node = LayoutNode::new(&instance.id, proto_name_of(instance));
        layout_nodes.push(match mode {
            LayoutMode::Full => node,
            LayoutMode::Partial => node.at(instance.x, instance.y),
        });
    }
    for placement in &placements {
        let mut node = LayoutNode::new(&placement.instance_id, &placement.label);
        if mode == LayoutMode::Partial {
            if let Some((x, y)) = placement.existing {
                node = node.at(x, y);
            }
        }
        layout_nodes.push(node);
    }

    let mut layout_edges: Vec<LayoutEdge> = graph
        .edge_ids
        .iter()
        .filter_map(|edge_id| ctx.state.edges.get(edge_id))
        .map(|edge| LayoutEdge {
            source_id: edge.source_id.clone(),
            destination_id: edge.destination_id.clone(),
        })
        .collect();
    for input in &edge_inputs {
        if let (Some(source), Some(destination)) = (
            name_to_instance.get(&fold_name(&input.source)),
            name_to_instance.get(&fold_name(&input.destination)),
        ) {
            layout_edges.push(LayoutEdge {
                source_id: source.clone(),
                destination_id: destination.clone(),
            });
        }
    }

    let positions = compute_layout(
        &layout_nodes,
        &layout_edges,
        &LayoutOptions {
            algorithm: layout_algorithm(args),
            mode,
        },
    );

    // 5. Instance ops: adds for new placements, moves for survivors that
    // drifted.
    let mut ops: Vec<Op> = Vec::new();
    for placement in &placements {
        let position = positions
            .get(&placement.instance_id)
            .copied()
            .unwrap_or(bridge_layout::Position { x: 0.0, y: 0.0 });
        match placement.existing {
            None => {
                let mut instance = NodeInstance::new(
                    ops_graph_id,
                    &placement.prototype_id,
                    position.x,
                    position.y,
                );
                instance.id = placement.instance_id.clone();
                ops.push(Op::AddNodeInstance {
                    graph_id: ops_graph_id.to_string(),
                    instance,
                });
            }
            Some((x, y)) => {
                if (position.x - x).abs() > MOVE_EPSILON || (position.y - y).abs() > MOVE_EPSILON {
                    ops.push(Op::MoveNodeInstance {
                        graph_id: ops_graph_id.to_string(),
                        instance_id: placement.instance_id.clone(),
                        x: position.x,
                        y: position.y,
                    });
                }
            }
        }
    }
    if mode == LayoutMode::Full {
        for instance in graph.instances.values() {
            if placements.iter().any(|p| p.instance_id == instance.id) {
                continue;
            }
            if let Some(position) = positions.get(&instance.id) {
                if (position.x - instance.x).abs() > MOVE_EPSILON
                    || (position.y - instance.y).abs() > MOVE_EPSILON
                {
                    ops.push(Op::MoveNodeInstance {
                        graph_id: ops_graph_id.to_string(),
                        instance_id: instance.id.clone(),
                        x: position.x,
                        y: position.y,
                    });
                }
            }
        }
    }

    // 6. Edge ops, with definition concepts synthesized or reused.
    for input in &edge_inputs {
        let source_id = name_to_instance
            .get(&fold_name(&input.source))
            .cloned()
            .ok_or_else(|| {
                PipelineError::Validation(format!(
                    "edge endpoint '{}' does not match any node in the graph or the batch",
                    input.source
                ))
            })?;
        let destination_id = name_to_instance
            .get(&fold_name(&input.destination))
            .cloned()
            .ok_or_else(|| {
                PipelineError::Validation(format!(
                    "edge endpoint '{}' does not match any node in the graph or the batch",
                    input.destination
                ))
            })?;

        let mut edge = Edge::new(&source_id, &destination_id);
        for target in arrows_for(&input.direction, &source_id, &destination_id)? {
            edge.arrows_toward.insert(target);
        }
        edge.name = input
            .name
            .clone()
            .or_else(|| input.definition.as_deref().map(title_case))
            .unwrap_or_default();
        if let Some(definition) = &input.definition {
            let definition_id = resolver.resolve_definition(ctx, definition);
            edge.definition_node_ids = vec![definition_id];
        }
        ops.push(Op::AddEdge {
            graph_id: ops_graph_id.to_string(),
            edge,
        });
    }

    // Every prototype op (node concepts and edge definitions alike) goes
    // first so the committer sees them before anything references them.
    let mut ordered = std::mem::take(&mut resolver.ops);
    ordered.extend(ops);

    Ok((ordered, resolver.notes))
}

// ---------------------------------------------------------------------------
// Tool entry points

pub fn create_graph(_ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let name = arg_str(args, "name")
        .ok_or_else(|| PipelineError::Validation("missing required field 'name'".to_string()))?;
    let graph_id = bridge_core::model::fresh_id();
    let mut ops = vec![Op::CreateNewGraph {
        graph_id: graph_id.clone(),
        name: name.to_string(),
        description: arg_str(args, "description").unwrap_or_default().to_string(),
        color: arg_str(args, "color").map(str::to_string),
    }];
    if arg_bool(args, "set_active") {
        ops.push(Op::SetActiveGraph {
            graph_id: graph_id.clone(),
        });
    }
    Ok(Synthesis::for_graph(graph_id, ops))
}

pub fn create_node_prototype(_ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let name = arg_str(args, "name")
        .ok_or_else(|| PipelineError::Validation("missing required field 'name'".to_string()))?;
    let prototype = NodePrototype::new(name)
        .with_description(arg_str(args, "description").unwrap_or_default())
        .with_color(
            arg_str(args, "color")
                .map(str::to_string)
                .unwrap_or_else(|| color_for_name(name)),
        );
    Ok(Synthesis::global(vec![Op::AddNodePrototype { prototype }]))
}

pub fn create_node(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let graph = resolve_target_graph(ctx, args)?;
    let name = arg_str(args, "name")
        .ok_or_else(|| PipelineError::Validation("missing required field 'name'".to_string()))?;

    let mut resolver = PrototypeResolver::new();
    let prototype_id = resolver.resolve(
        ctx,
        name,
        arg_str(args, "description"),
        arg_str(args, "color"),
    );

    let instance = NodeInstance::new(
        &graph.id,
        &prototype_id,
        arg_f64(args, "x").unwrap_or(0.0),
        arg_f64(args, "y").unwrap_or(0.0),
    );
    let mut ops = resolver.ops;
    ops.push(Op::AddNodeInstance {
        graph_id: graph.id.clone(),
        instance,
    });
    Ok(Synthesis {
        graph_id: graph.id.clone(),
        ops,
        notes: resolver.notes,
    })
}

pub fn create_node_instance(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let graph = resolve_target_graph(ctx, args)?;
    let prototype_id = arg_str(args, "prototype_id").ok_or_else(|| {
        PipelineError::Validation("missing required field 'prototype_id'".to_string())
    })?;
    if !ctx.state.prototypes.contains_key(prototype_id) {
        return Err(bridge_core::CoreError::PrototypeNotFound(prototype_id.to_string()).into());
    }

    let mut instance = NodeInstance::new(
        &graph.id,
        prototype_id,
        arg_f64(args, "x").unwrap_or(0.0),
        arg_f64(args, "y").unwrap_or(0.0),
    );
    instance.scale = arg_f64(args, "scale").unwrap_or(1.0);
    Ok(Synthesis::for_graph(
        graph.id.clone(),
        vec![Op::AddNodeInstance {
            graph_id: graph.id.clone(),
            instance,
        }],
    ))
}

pub fn create_edge(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let graph = resolve_target_graph(ctx, args)?;
    let resolve_endpoint = |key: &str| -> Result<String> {
        let raw = arg_str(args, key).ok_or_else(|| {
            PipelineError::Validation(format!("missing required field '{}'", key))
        })?;
        if graph.instances.contains_key(raw) {
            return Ok(raw.to_string());
        }
        let folded = fold_name(raw);
        graph
            .instances
            .values()
            .find(|instance| {
                ctx.state
                    .prototypes
                    .get(&instance.prototype_id)
                    .map(|p| fold_name(&p.name) == folded)
                    .unwrap_or(false)
            })
            .map(|instance| instance.id.clone())
            .ok_or_else(|| {
                PipelineError::Validation(format!(
                    "edge endpoint '{}' does not match any instance in graph '{}'",
                    raw, graph.name
                ))
            })
    };

    let source_id = resolve_endpoint("source")?;
    let destination_id = resolve_endpoint("destination")?;
    let direction = arg_str(args, "direction").unwrap_or("unidirectional");

    let mut resolver = PrototypeResolver::new();
    let mut edge = Edge::new(&source_id, &destination_id);
    for target in arrows_for(direction, &source_id, &destination_id)? {
        edge.arrows_toward.insert(target);
    }
    edge.name = arg_str(args, "name")
        .map(str::to_string)
        .or_else(|| arg_str(args, "definition").map(title_case))
        .unwrap_or_default();
    if let Some(definition) = arg_str(args, "definition") {
        edge.definition_node_ids = vec![resolver.resolve_definition(ctx, definition)];
    }

    let mut ops = resolver.ops;
    ops.push(Op::AddEdge {
        graph_id: graph.id.clone(),
        edge,
    });
    Ok(Synthesis {
        graph_id: graph.id.clone(),
        ops,
        notes: resolver.notes,
    })
}

pub fn create_subgraph(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let graph = resolve_target_graph(ctx, args)?;
    let (ops, notes) = populate_graph(ctx, graph, &graph.id, args)?;
    Ok(Synthesis {
        graph_id: graph.id.clone(),
        ops,
        notes,
    })
}

pub fn create_populated_graph(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let name = arg_str(args, "name")
        .ok_or_else(|| PipelineError::Validation("missing required field 'name'".to_string()))?;

    let graph_id = bridge_core::model::fresh_id();
    let shell = Graph {
        id: graph_id.clone(),
        name: name.to_string(),
        description: String::new(),
        color: None,
        instances: HashMap::new(),
        edge_ids: Vec::new(),
    };

    let mut ops = vec![Op::CreateNewGraph {
        graph_id: graph_id.clone(),
        name: name.to_string(),
        description: arg_str(args, "description").unwrap_or_default().to_string(),
        color: arg_str(args, "color").map(str::to_string),
    }];
    let (populate_ops, notes) = populate_graph(ctx, &shell, &graph_id, args)?;
    ops.extend(populate_ops);
    Ok(Synthesis {
        graph_id,
        ops,
        notes,
    })
}

pub fn create_subgraph_in_new_graph(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let name = arg_str(args, "name")
        .ok_or_else(|| PipelineError::Validation("missing required field 'name'".to_string()))?;

    // All population ops reference the placeholder; the committer swaps
    // in the id of the graph created by the first op.
    let placeholder = format!("{}{}", NEW_GRAPH_PREFIX, name);
    let shell = Graph {
        id: placeholder.clone(),
        name: name.to_string(),
        description: String::new(),
        color: None,
        instances: HashMap::new(),
        edge_ids: Vec::new(),
    };

    let mut ops = vec![Op::CreateNewGraph {
        graph_id: bridge_core::model::fresh_id(),
        name: name.to_string(),
        description: arg_str(args, "description").unwrap_or_default().to_string(),
        color: None,
    }];
    let (populate_ops, notes) = populate_graph(ctx, &shell, &placeholder, args)?;
    ops.extend(populate_ops);
    Ok(Synthesis {
        graph_id: placeholder,
        ops,
        notes,
    })
}

pub fn define_connections(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let graph = resolve_target_graph(ctx, args)?;
    let limit = arg_f64(args, "limit").unwrap_or(10.0).max(1.0) as usize;
    let skip_generic = args
        .get("skip_generic")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let mut resolver = PrototypeResolver::new();
    let mut ops: Vec<Op> = Vec::new();
    let mut defined = 0usize;

    for edge_id in &graph.edge_ids {
        if defined >= limit {
            break;
        }
        let Some(edge) = ctx.state.edges.get(edge_id) else {
            continue;
        };
        if !edge.definition_node_ids.is_empty() {
            continue;
        }
        let label = if edge.name.trim().is_empty() {
            "connects".to_string()
        } else {
            edge.name.trim().to_string()
        };
        if skip_generic && GENERIC_EDGE_LABELS.contains(&fold_name(&label).as_str()) {
            continue;
        }

        let definition_id = resolver.resolve_definition(ctx, &label);
        ops.push(Op::UpdateEdgeDefinition {
            graph_id: graph.id.clone(),
            edge_id: edge.id.clone(),
            definition_node_ids: vec![definition_id],
        });
        defined += 1;
    }

    let mut ordered = resolver.ops;
    ordered.extend(ops);
    Ok(Synthesis {
        graph_id: graph.id.clone(),
        ops: ordered,
        notes: resolver.notes,
    })
}

pub fn read_graph_structure(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let graph = resolve_target_graph(ctx, args)?;
    let structure = query::get_graph_semantic_structure(
        ctx.state,
        &graph.id,
        query::StructureOptions {
            include_descriptions: arg_bool(args, "include_descriptions"),
            include_colors: arg_bool(args, "include_colors"),
        },
    )?;
    Ok(Synthesis::for_graph(
        graph.id.clone(),
        vec![Op::ReadResponse {
            tool: "read_graph_structure".to_string(),
            payload: serde_json::to_value(&structure).map_err(bridge_core::CoreError::from)?,
        }],
    ))
}

pub fn get_edge_info(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let graph = resolve_target_graph(ctx, args)?;
    let edge_id = arg_str(args, "edge_id")
        .ok_or_else(|| PipelineError::Validation("missing required field 'edge_id'".to_string()))?;
    let edge = ctx
        .state
        .edges
        .get(edge_id)
        .filter(|_| graph.edge_ids.iter().any(|id| id == edge_id))
        .ok_or_else(|| bridge_core::CoreError::EdgeNotFound(edge_id.to_string()))?;

    let name_of = |instance_id: &str| {
        graph
            .instances
            .get(instance_id)
            .and_then(|i| ctx.state.prototypes.get(&i.prototype_id))
            .map(|p| p.name.clone())
            .unwrap_or_else(|| instance_id.to_string())
    };
    let definitions: Vec<Value> = edge
        .definition_node_ids
        .iter()
        .filter_map(|id| ctx.state.prototypes.get(id))
        .map(|p| json!({"id": p.id, "name": p.name}))
        .collect();

    Ok(Synthesis::for_graph(
        graph.id.clone(),
        vec![Op::ReadResponse {
            tool: "get_edge_info".to_string(),
            payload: json!({
                "id": edge.id,
                "name": edge.name,
                "source": {"id": edge.source_id, "name": name_of(&edge.source_id)},
                "destination": {"id": edge.destination_id, "name": name_of(&edge.destination_id)},
                "directionality": match edge.arrows_toward.len() {
                    0 => "none",
                    1 => "unidirectional",
                    _ => "bidirectional",
                },
                "definitions": definitions,
            }),
        }],
    ))
}

pub fn get_node_definition(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let raw = arg_str(args, "name")
        .ok_or_else(|| PipelineError::Validation("missing required field 'name'".to_string()))?;
    let folded = fold_name(raw);
    let prototype = ctx
        .state
        .prototypes
        .get(raw)
        .or_else(|| {
            ctx.state
                .prototypes
                .values()
                .find(|p| fold_name(&p.name) == folded)
        })
        .ok_or_else(|| bridge_core::CoreError::PrototypeNotFound(raw.to_string()))?;

    let definition_graphs: Vec<Value> = prototype
        .definition_graph_ids
        .iter()
        .filter_map(|id| ctx.state.graphs.get(id))
        .map(|g| json!({"id": g.id, "name": g.name}))
        .collect();

    Ok(Synthesis::global(vec![Op::ReadResponse {
        tool: "get_node_definition".to_string(),
        payload: json!({
            "id": prototype.id,
            "name": prototype.name,
            "description": prototype.description,
            "color": prototype.color,
            "definitionGraphs": definition_graphs,
        }),
    }]))
}

pub fn update_node_prototype(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let prototype_id = arg_str(args, "prototype_id").ok_or_else(|| {
        PipelineError::Validation("missing required field 'prototype_id'".to_string())
    })?;
    if !ctx.state.prototypes.contains_key(prototype_id) {
        return Err(bridge_core::CoreError::PrototypeNotFound(prototype_id.to_string()).into());
    }
    Ok(Synthesis::global(vec![Op::UpdateNodePrototype {
        prototype_id: prototype_id.to_string(),
        name: arg_str(args, "name").map(str::to_string),
        description: arg_str(args, "description").map(str::to_string),
        color: arg_str(args, "color").map(str::to_string),
    }]))
}

pub fn delete_node_instance(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let graph = resolve_target_graph(ctx, args)?;
    let instance_id = arg_str(args, "instance_id").ok_or_else(|| {
        PipelineError::Validation("missing required field 'instance_id'".to_string())
    })?;
    if !graph.instances.contains_key(instance_id) {
        return Err(bridge_core::CoreError::InstanceNotFound(instance_id.to_string()).into());
    }
    Ok(Synthesis::for_graph(
        graph.id.clone(),
        vec![Op::DeleteNodeInstance {
            graph_id: graph.id.clone(),
            instance_id: instance_id.to_string(),
        }],
    ))
}

pub fn delete_node_prototype(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let prototype_id = arg_str(args, "prototype_id").ok_or_else(|| {
        PipelineError::Validation("missing required field 'prototype_id'".to_string())
    })?;
    if !ctx.state.prototypes.contains_key(prototype_id) {
        return Err(bridge_core::CoreError::PrototypeNotFound(prototype_id.to_string()).into());
    }
    Ok(Synthesis::global(vec![Op::DeleteNodePrototype {
        prototype_id: prototype_id.to_string(),
    }]))
}

/// Delete a graph, resolving by case-insensitive name when the id does
/// not match.
pub fn delete_graph(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let id_or_name = arg_str(args, "graph_id").ok_or_else(|| {
        PipelineError::Validation("missing required field 'graph_id'".to_string())
    })?;
    let graph = query::resolve_graph(ctx.state, id_or_name)?;
    Ok(Synthesis::for_graph(
        graph.id.clone(),
        vec![Op::DeleteGraph {
            graph_id: graph.id.clone(),
        }],
    ))
}

pub fn delete_edge(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let graph = resolve_target_graph(ctx, args)?;
    let edge_id = arg_str(args, "edge_id")
        .ok_or_else(|| PipelineError::Validation("missing required field 'edge_id'".to_string()))?;
    if !graph.edge_ids.iter().any(|id| id == edge_id) {
        return Err(bridge_core::CoreError::EdgeNotFound(edge_id.to_string()).into());
    }
    Ok(Synthesis::for_graph(
        graph.id.clone(),
        vec![Op::DeleteEdge {
            graph_id: graph.id.clone(),
            edge_id: edge_id.to_string(),
        }],
    ))
}

pub fn create_group(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let graph = resolve_target_graph(ctx, args)?;
    let name = arg_str(args, "name")
        .ok_or_else(|| PipelineError::Validation("missing required field 'name'".to_string()))?;
    let member_instance_ids: Vec<String> = args
        .get("instance_ids")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if member_instance_ids.is_empty() {
        return Err(PipelineError::Validation(
            "field 'instance_ids' must not be empty".to_string(),
        ));
    }
    for instance_id in &member_instance_ids {
        if !graph.instances.contains_key(instance_id) {
            return Err(bridge_core::CoreError::InstanceNotFound(instance_id.clone()).into());
        }
    }
    Ok(Synthesis::for_graph(
        graph.id.clone(),
        vec![Op::CreateGroup {
            graph_id: graph.id.clone(),
            group_id: bridge_core::model::fresh_id(),
            name: name.to_string(),
            member_instance_ids,
        }],
    ))
}

pub fn convert_to_node_group(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let graph = resolve_target_graph(ctx, args)?;
    let group_id = arg_str(args, "group_id")
        .ok_or_else(|| PipelineError::Validation("missing required field 'group_id'".to_string()))?;
    Ok(Synthesis::for_graph(
        graph.id.clone(),
        vec![Op::ConvertToNodeGroup {
            graph_id: graph.id.clone(),
            group_id: group_id.to_string(),
        }],
    ))
}

pub fn set_active_graph(ctx: &SynthesisContext, args: &Value) -> Result<Synthesis> {
    let id_or_name = arg_str(args, "graph_id").ok_or_else(|| {
        PipelineError::Validation("missing required field 'graph_id'".to_string())
    })?;
    let graph = query::resolve_graph(ctx.state, id_or_name)?;
    Ok(Synthesis::for_graph(
        graph.id.clone(),
        vec![Op::SetActiveGraph {
            graph_id: graph.id.clone(),
        }],
    ))
}

pub fn verify_state(ctx: &SynthesisContext, _args: &Value) -> Result<Synthesis> {
    Ok(Synthesis::global(vec![Op::ReadResponse {
        tool: "verify_state".to_string(),
        payload: json!({
            "graphCount": ctx.state.graphs.len(),
            "prototypeCount": ctx.state.prototypes.len(),
            "edgeCount": ctx.state.edges.len(),
            "activeGraphId": ctx.state.active_graph_id,
            "openGraphIds": ctx.state.open_graph_ids,
            "lastUpdate": ctx.state.last_update,
        }),
    }]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::StateMirror;

    fn mirror_with_graph() -> StateMirror {
        let mirror = StateMirror::new();
        mirror
            .local_apply(&[
                Op::CreateNewGraph {
                    graph_id: "g1".to_string(),
                    name: "Cities".to_string(),
                    description: String::new(),
                    color: None,
                },
                Op::SetActiveGraph {
                    graph_id: "g1".to_string(),
                },
            ])
            .unwrap();
        mirror
    }

    fn kinds(ops: &[Op]) -> Vec<&'static str> {
        ops.iter().map(Op::kind).collect()
    }

    #[test]
    fn test_create_subgraph_on_empty_graph() {
        let mirror = mirror_with_graph();
        let state = mirror.snapshot();
        let ctx = SynthesisContext::new(&state);
        let args = json!({
            "graph_id": "g1",
            "nodes": ["Paris", "Lyon", "Nice"],
            "edges": [
                {"source": "Paris", "destination": "Lyon", "name": "rail", "direction": "unidirectional"},
                {"source": "Lyon", "destination": "Nice", "name": "rail", "direction": "unidirectional"}
            ],
            "layout": "force",
            "layout_mode": "auto"
        });

        let synthesis = create_subgraph(&ctx, &args).unwrap();
        assert_eq!(
            kinds(&synthesis.ops),
            vec![
                "addNodePrototype",
                "addNodePrototype",
                "addNodePrototype",
                "addNodeInstance",
                "addNodeInstance",
                "addNodeInstance",
                "addEdge",
                "addEdge",
            ]
        );

        // Positions recentered around the origin and inside the canvas.
        let mut min_x = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        for op in &synthesis.ops {
            if let Op::AddNodeInstance { instance, .. } = op {
                assert!(instance.x.abs() <= 1000.0, "x out of bounds: {}", instance.x);
                assert!(instance.y.abs() <= 1000.0, "y out of bounds: {}", instance.y);
                min_x = min_x.min(instance.x);
                max_x = max_x.max(instance.x);
            }
        }
        assert!(((min_x + max_x) / 2.0).abs() < 1.0);

        // Arrow points at the destination.
        let Op::AddEdge { edge, .. } = &synthesis.ops[6] else {
            panic!("expected addEdge");
        };
        assert_eq!(edge.arrows_toward.len(), 1);
        assert_eq!(edge.name, "rail");
    }

    #[test]
    fn test_exact_dedup_reuses_existing_prototype() {
        let mirror = mirror_with_graph();
        let paris = NodePrototype::new("Paris");
        let paris_id = paris.id.clone();
        mirror
            .local_apply(&[Op::AddNodePrototype { prototype: paris }])
            .unwrap();

        let state = mirror.snapshot();
        let ctx = SynthesisContext::new(&state);
        let synthesis = create_subgraph(
            &ctx,
            &json!({"graph_id": "g1", "nodes": ["PARIS"], "edges": []}),
        )
        .unwrap();

        assert!(
            !kinds(&synthesis.ops).contains(&"addNodePrototype"),
            "exact match must not mint a prototype"
        );
        let Op::AddNodeInstance { instance, .. } = &synthesis.ops[0] else {
            panic!("expected addNodeInstance");
        };
        assert_eq!(instance.prototype_id, paris_id);
        assert!(synthesis.notes.is_empty());
    }

    #[test]
    fn test_fuzzy_dedup_emits_one_note() {
        let mirror = mirror_with_graph();
        mirror
            .local_apply(&[Op::AddNodePrototype {
                prototype: NodePrototype::new("Electricity"),
            }])
            .unwrap();

        let state = mirror.snapshot();
        let ctx = SynthesisContext::new(&state);
        let synthesis = create_subgraph(
            &ctx,
            &json!({"graph_id": "g1", "nodes": ["Electrycity"], "edges": []}),
        )
        .unwrap();

        assert!(!kinds(&synthesis.ops).contains(&"addNodePrototype"));
        assert_eq!(synthesis.notes.len(), 1);
        let SynthesisNote::FuzzyPrototypeMatch {
            matched, similarity, ..
        } = &synthesis.notes[0];
        assert_eq!(matched, "Electricity");
        assert!(*similarity >= 0.80);
    }

    #[test]
    fn test_batch_cache_dedups_within_one_call() {
        let mirror = mirror_with_graph();
        let state = mirror.snapshot();
        let ctx = SynthesisContext::new(&state);
        let synthesis = create_subgraph(
            &ctx,
            &json!({"graph_id": "g1", "nodes": ["Solar", "SOLAR", "solar"], "edges": []}),
        )
        .unwrap();

        let prototype_count = synthesis
            .ops
            .iter()
            .filter(|op| op.kind() == "addNodePrototype")
            .count();
        assert_eq!(prototype_count, 1);
        let instance_count = synthesis
            .ops
            .iter()
            .filter(|op| op.kind() == "addNodeInstance")
            .count();
        assert_eq!(instance_count, 1);
    }

    #[test]
    fn test_existing_instance_is_reused_not_duplicated() {
        let mirror = mirror_with_graph();
        let city = NodePrototype::new("Paris");
        let city_id = city.id.clone();
        let instance = NodeInstance::new("g1", &city_id, 42.0, 7.0);
        let instance_id = instance.id.clone();
        mirror
            .local_apply(&[
                Op::AddNodePrototype { prototype: city },
                Op::AddNodeInstance {
                    graph_id: "g1".to_string(),
                    instance,
                },
            ])
            .unwrap();

        let state = mirror.snapshot();
        let ctx = SynthesisContext::new(&state);
        let synthesis = create_subgraph(
            &ctx,
            &json!({
                "graph_id": "g1",
                "nodes": ["Paris", "Lyon"],
                "edges": [{"source": "Paris", "destination": "Lyon", "name": "rail"}],
                "layout_mode": "partial"
            }),
        )
        .unwrap();

        // Only Lyon is new.
        let adds: Vec<&NodeInstance> = synthesis
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::AddNodeInstance { instance, .. } => Some(instance),
                _ => None,
            })
            .collect();
        assert_eq!(adds.len(), 1);
        assert_ne!(adds[0].prototype_id, city_id);

        // The edge connects the existing Paris instance.
        let Some(Op::AddEdge { edge, .. }) = synthesis
            .ops
            .iter()
            .find(|op| op.kind() == "addEdge") else {
                panic!("expected addEdge");
            };
        assert_eq!(edge.source_id, instance_id);
    }

    #[test]
    fn test_partial_mode_preserves_existing_positions() {
        let mirror = mirror_with_graph();
        let city = NodePrototype::new("Paris");
        let instance = NodeInstance::new("g1", &city.id, 42.0, 7.0);
        let instance_id = instance.id.clone();
        mirror
            .local_apply(&[
                Op::AddNodePrototype { prototype: city },
                Op::AddNodeInstance {
                    graph_id: "g1".to_string(),
                    instance,
                },
            ])
            .unwrap();

        let state = mirror.snapshot();
        let ctx = SynthesisContext::new(&state);
        let synthesis = create_subgraph(
            &ctx,
            &json!({"graph_id": "g1", "nodes": ["Lyon"], "layout_mode": "partial"}),
        )
        .unwrap();

        // No move op for the anchored instance.
        assert!(!synthesis.ops.iter().any(|op| {
            matches!(op, Op::MoveNodeInstance { instance_id: id, .. } if *id == instance_id)
        }));
    }

    #[test]
    fn test_unresolvable_edge_endpoint_fails_validation() {
        let mirror = mirror_with_graph();
        let state = mirror.snapshot();
        let ctx = SynthesisContext::new(&state);
        let error = create_subgraph(
            &ctx,
            &json!({
                "graph_id": "g1",
                "nodes": ["Paris"],
                "edges": [{"source": "Paris", "destination": "Atlantis"}]
            }),
        )
        .unwrap_err();
        assert!(error.to_string().contains("Atlantis"));
    }

    #[test]
    fn test_edge_definition_synthesis_title_cases_and_reuses() {
        let mirror = mirror_with_graph();
        let state = mirror.snapshot();
        let ctx = SynthesisContext::new(&state);
        let synthesis = create_subgraph(
            &ctx,
            &json!({
                "graph_id": "g1",
                "nodes": ["Plant", "Grid"],
                "edges": [
                    {"source": "Plant", "destination": "Grid", "definition": "feeds into"},
                    {"source": "Grid", "destination": "Plant", "definition": "FEEDS INTO", "direction": "reverse"}
                ]
            }),
        )
        .unwrap();

        let definition_protos: Vec<&NodePrototype> = synthesis
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::AddNodePrototype { prototype } if prototype.name == "Feeds Into" => {
                    Some(prototype)
                }
                _ => None,
            })
            .collect();
        assert_eq!(definition_protos.len(), 1, "one definition per distinct label");
        assert_eq!(definition_protos[0].color, color_for_name("Feeds Into"));

        let edges: Vec<&Edge> = synthesis
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::AddEdge { edge, .. } => Some(edge),
                _ => None,
            })
            .collect();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].definition_node_ids, edges[1].definition_node_ids);
    }

    #[test]
    fn test_create_populated_graph_is_one_atomic_patch() {
        let mirror = StateMirror::new();
        let state = mirror.snapshot();
        let ctx = SynthesisContext::new(&state);
        let synthesis = create_populated_graph(
            &ctx,
            &json!({
                "name": "Cities",
                "nodes": ["Paris", "Lyon", "Nice"],
                "edges": [
                    {"source": "Paris", "destination": "Lyon", "name": "rail"},
                    {"source": "Lyon", "destination": "Nice", "name": "rail"}
                ]
            }),
        )
        .unwrap();

        let op_kinds = kinds(&synthesis.ops);
        assert_eq!(op_kinds[0], "createNewGraph");
        assert_eq!(op_kinds.iter().filter(|k| **k == "addNodePrototype").count(), 3);
        assert_eq!(op_kinds.iter().filter(|k| **k == "addNodeInstance").count(), 3);
        assert_eq!(op_kinds.iter().filter(|k| **k == "addEdge").count(), 2);

        // Every population op targets the graph created by op 0.
        let Op::CreateNewGraph { graph_id, .. } = &synthesis.ops[0] else {
            panic!("expected createNewGraph");
        };
        for op in &synthesis.ops[1..] {
            assert_eq!(op.graph_id(), Some(graph_id.as_str()));
        }
    }

    #[test]
    fn test_new_graph_variant_uses_placeholder() {
        let mirror = StateMirror::new();
        let state = mirror.snapshot();
        let ctx = SynthesisContext::new(&state);
        let synthesis = create_subgraph_in_new_graph(
            &ctx,
            &json!({"name": "Rivers", "nodes": ["Rhone"]}),
        )
        .unwrap();

        assert_eq!(synthesis.graph_id, "NEW_GRAPH:Rivers");
        let Op::AddNodeInstance { graph_id, .. } = &synthesis.ops[2] else {
            panic!("expected addNodeInstance, got {:?}", synthesis.ops);
        };
        assert_eq!(graph_id, "NEW_GRAPH:Rivers");
    }

    #[test]
    fn test_define_connections_skips_generic_and_caps_by_limit() {
        let mirror = mirror_with_graph();
        let a = NodePrototype::new("A");
        let b = NodePrototype::new("B");
        let ia = NodeInstance::new("g1", &a.id, 0.0, 0.0);
        let ib = NodeInstance::new("g1", &b.id, 10.0, 0.0);
        let mut setup = vec![
            Op::AddNodePrototype { prototype: a },
            Op::AddNodePrototype { prototype: b },
            Op::AddNodeInstance { graph_id: "g1".to_string(), instance: ia.clone() },
            Op::AddNodeInstance { graph_id: "g1".to_string(), instance: ib.clone() },
        ];
        for name in ["feeds", "connects", "regulates", "feeds"] {
            setup.push(Op::AddEdge {
                graph_id: "g1".to_string(),
                edge: Edge::new(&ia.id, &ib.id).with_name(name),
            });
        }
        mirror.local_apply(&setup).unwrap();

        let state = mirror.snapshot();
        let ctx = SynthesisContext::new(&state);
        let synthesis = define_connections(
            &ctx,
            &json!({"graph_id": "g1", "limit": 2.0, "skip_generic": true}),
        )
        .unwrap();

        // "connects" skipped as generic; limit caps at two updates; the
        // two "feeds" edges share one definition prototype.
        let updates = synthesis
            .ops
            .iter()
            .filter(|op| op.kind() == "updateEdgeDefinition")
            .count();
        assert_eq!(updates, 2);
        let protos: Vec<&str> = synthesis
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::AddNodePrototype { prototype } => Some(prototype.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(protos, vec!["Feeds", "Regulates"]);
    }

    #[test]
    fn test_delete_graph_resolves_by_name() {
        let mirror = mirror_with_graph();
        let state = mirror.snapshot();
        let ctx = SynthesisContext::new(&state);

        let synthesis = delete_graph(&ctx, &json!({"graph_id": "cities"})).unwrap();
        assert_eq!(
            synthesis.ops,
            vec![Op::DeleteGraph {
                graph_id: "g1".to_string()
            }]
        );

        let error = delete_graph(&ctx, &json!({"graph_id": "does-not-exist"})).unwrap_err();
        assert!(error.to_string().contains("not found"));
    }

    #[test]
    fn test_read_graph_structure_payload_has_no_coordinates() {
        let mirror = mirror_with_graph();
        let proto = NodePrototype::new("City");
        let mut setup = vec![Op::AddNodePrototype { prototype: proto.clone() }];
        for i in 0..5 {
            setup.push(Op::AddNodeInstance {
                graph_id: "g1".to_string(),
                instance: NodeInstance::new("g1", &proto.id, i as f64 * 10.0, 0.0),
            });
        }
        mirror.local_apply(&setup).unwrap();

        let state = mirror.snapshot();
        let ctx = SynthesisContext::new(&state);
        let synthesis = read_graph_structure(&ctx, &json!({"graph_id": "g1"})).unwrap();

        let Op::ReadResponse { payload, .. } = &synthesis.ops[0] else {
            panic!("expected readResponse");
        };
        let nodes = payload["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 5);
        for node in nodes {
            assert!(node.get("x").is_none());
            assert!(node.get("y").is_none());
        }
    }

    #[test]
    fn test_create_node_reuses_prototype_by_name() {
        let mirror = mirror_with_graph();
        let paris = NodePrototype::new("Paris");
        let paris_id = paris.id.clone();
        mirror
            .local_apply(&[Op::AddNodePrototype { prototype: paris }])
            .unwrap();

        let state = mirror.snapshot();
        let ctx = SynthesisContext::new(&state);
        let synthesis = create_node(&ctx, &json!({"name": "paris", "x": 5.0, "y": 6.0})).unwrap();

        assert_eq!(kinds(&synthesis.ops), vec!["addNodeInstance"]);
        let Op::AddNodeInstance { instance, .. } = &synthesis.ops[0] else {
            panic!("expected addNodeInstance");
        };
        assert_eq!(instance.prototype_id, paris_id);
        assert_eq!(instance.x, 5.0);
    }

    #[test]
    fn test_verify_state_reports_counts() {
        let mirror = mirror_with_graph();
        let state = mirror.snapshot();
        let ctx = SynthesisContext::new(&state);
        let synthesis = verify_state(&ctx, &json!({})).unwrap();
        let Op::ReadResponse { payload, .. } = &synthesis.ops[0] else {
            panic!("expected readResponse");
        };
        assert_eq!(payload["graphCount"], 1);
        assert_eq!(payload["activeGraphId"], "g1");
    }
}
