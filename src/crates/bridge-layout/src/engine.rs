//! Layout algorithms and placement contracts.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Seed preset shared with the UI's Auto-Layout implementation. Changing
/// it breaks bit-for-bit parity with the canvas.
const LAYOUT_SEED: u64 = 0x6c61796f75743031;

/// Force-simulation iteration preset, fixed for determinism.
const FORCE_ITERATIONS: usize = 200;

/// Reserved canvas regions the UI draws panels over.
const LEFT_PANEL_WIDTH: f64 = 280.0;
const RIGHT_PANEL_WIDTH: f64 = 280.0;
const HEADER_HEIGHT: f64 = 80.0;

/// Minimum clearance kept between placements and the canvas border.
const MIN_PADDING: f64 = 300.0;

const MIN_NODE_WIDTH: f64 = 160.0;
const NODE_HEIGHT: f64 = 100.0;
const TALL_NODE_HEIGHT: f64 = 140.0;
const TALL_LABEL_CHARS: usize = 30;

/// A node to place. `existing` carries the current position for nodes
/// that are already on the canvas.
#[derive(Debug, Clone)]
pub struct LayoutNode {
    pub id: String,
    pub label: String,
    pub existing: Option<Position>,
}

impl LayoutNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            existing: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.existing = Some(Position { x, y });
        self
    }
}

/// A connection considered by layout.
#[derive(Debug, Clone)]
pub struct LayoutEdge {
    pub source_id: String,
    pub destination_id: String,
}

/// Estimated box a node occupies, derived from its label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeDimensions {
    pub width: f64,
    pub height: f64,
}

/// A placement on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Supported placement algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutAlgorithm {
    Force,
    Hierarchical,
    Radial,
    Linear,
}

impl Default for LayoutAlgorithm {
    fn default() -> Self {
        LayoutAlgorithm::Force
    }
}

/// Full relayouts everything and recenters on the origin; partial keeps
/// existing placements and anchors only the new nodes next to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    Full,
    Partial,
}

/// Options for one layout run.
#[derive(Debug, Clone)]
pub struct LayoutOptions {
    pub algorithm: LayoutAlgorithm,
    pub mode: LayoutMode,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            algorithm: LayoutAlgorithm::Force,
            mode: LayoutMode::Full,
        }
    }
}

/// Estimate a node's box from its label length. Width floors at 160;
/// labels past 30 characters get the taller box.
pub fn estimate_dimensions(label: &str) -> NodeDimensions {
    let chars = label.chars().count();
    NodeDimensions {
        width: MIN_NODE_WIDTH.max(chars as f64 * 11.0 + 40.0),
        height: if chars > TALL_LABEL_CHARS {
            TALL_NODE_HEIGHT
        } else {
            NODE_HEIGHT
        },
    }
}

/// Canvas edge length for `n` nodes: `max(2000, √n · 400)`.
pub fn canvas_size(node_count: usize) -> f64 {
    2000.0_f64.max((node_count as f64).sqrt() * 400.0)
}

/// Compute placements for `nodes`.
///
/// Full mode places every node and recenters the result's bounding box on
/// (0,0). Partial mode returns existing nodes at their current positions
/// untouched and lays out only the new nodes, translated so their cluster
/// lands on the existing nodes' anchor center.
pub fn compute_layout(
    nodes: &[LayoutNode],
    edges: &[LayoutEdge],
    options: &LayoutOptions,
) -> HashMap<String, Position> {
    if nodes.is_empty() {
        return HashMap::new();
    }

    debug!(
        nodes = nodes.len(),
        edges = edges.len(),
        algorithm = ?options.algorithm,
        mode = ?options.mode,
        "Computing layout"
    );

    match options.mode {
        LayoutMode::Full => {
            let mut positions = run_algorithm(nodes, edges, options.algorithm);
            recenter(&mut positions);
            positions
        }
        LayoutMode::Partial => {
            let (anchored, fresh): (Vec<&LayoutNode>, Vec<&LayoutNode>) =
                nodes.iter().partition(|n| n.existing.is_some());

            let mut positions: HashMap<String, Position> = anchored
                .iter()
                .filter_map(|n| n.existing.map(|p| (n.id.clone(), p)))
                .collect();

            if fresh.is_empty() {
                return positions;
            }

            let fresh_owned: Vec<LayoutNode> = fresh.into_iter().cloned().collect();
            let fresh_edges: Vec<LayoutEdge> = edges
                .iter()
                .filter(|e| {
                    fresh_owned.iter().any(|n| n.id == e.source_id)
                        && fresh_owned.iter().any(|n| n.id == e.destination_id)
                })
                .cloned()
                .collect();
            let mut fresh_positions =
                run_algorithm(&fresh_owned, &fresh_edges, options.algorithm);
            recenter(&mut fresh_positions);

            // Drop the new cluster beside the anchor center rather than on
            // top of it.
            let anchor = centroid(positions.values());
            let spread = canvas_size(fresh_positions.len()) / 4.0;
            let offset_x = anchor.x + spread.min(800.0);
            for position in fresh_positions.values_mut() {
                position.x += offset_x;
                position.y += anchor.y;
            }
            positions.extend(fresh_positions);
            positions
        }
    }
}

fn run_algorithm(
    nodes: &[LayoutNode],
    edges: &[LayoutEdge],
    algorithm: LayoutAlgorithm,
) -> HashMap<String, Position> {
    match algorithm {
        LayoutAlgorithm::Force => force_layout(nodes, edges),
        LayoutAlgorithm::Hierarchical => hierarchical_layout(nodes, edges),
        LayoutAlgorithm::Radial => radial_layout(nodes, edges),
        LayoutAlgorithm::Linear => linear_layout(nodes),
    }
}

/// Usable placement region once panels and padding are reserved, as a
/// half-extent around the region center.
fn usable_half_extent(node_count: usize) -> (f64, f64) {
    let size = canvas_size(node_count);
    let width = size - LEFT_PANEL_WIDTH - RIGHT_PANEL_WIDTH - 2.0 * MIN_PADDING;
    let height = size - HEADER_HEIGHT - 2.0 * MIN_PADDING;
    (width.max(200.0) / 2.0, height.max(200.0) / 2.0)
}

fn force_layout(nodes: &[LayoutNode], edges: &[LayoutEdge]) -> HashMap<String, Position> {
    let mut rng = StdRng::seed_from_u64(LAYOUT_SEED);
    let (half_w, half_h) = usable_half_extent(nodes.len());

    let index_of: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();
    let edge_pairs: Vec<(usize, usize)> = edges
        .iter()
        .filter_map(|e| {
            Some((
                *index_of.get(e.source_id.as_str())?,
                *index_of.get(e.destination_id.as_str())?,
            ))
        })
        .filter(|(a, b)| a != b)
        .collect();

    let mut xs: Vec<f64> = Vec::with_capacity(nodes.len());
    let mut ys: Vec<f64> = Vec::with_capacity(nodes.len());
    for _ in nodes {
        xs.push(rng.gen_range(-half_w..half_w));
        ys.push(rng.gen_range(-half_h..half_h));
    }

    let area = (2.0 * half_w) * (2.0 * half_h);
    let k = (area / nodes.len() as f64).sqrt() * 0.6;

    for iteration in 0..FORCE_ITERATIONS {
        let temperature =
            half_w.max(half_h) * (1.0 - iteration as f64 / FORCE_ITERATIONS as f64) * 0.1;
        let mut dx = vec![0.0f64; nodes.len()];
        let mut dy = vec![0.0f64; nodes.len()];

        // Pairwise repulsion.
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                let (mut vx, mut vy) = (xs[i] - xs[j], ys[i] - ys[j]);
                let mut dist = (vx * vx + vy * vy).sqrt();
                if dist < 1.0 {
                    // Coincident nodes: push apart along a stable axis.
                    vx = 1.0;
                    vy = 0.5;
                    dist = 1.0;
                }
                let force = k * k / dist;
                dx[i] += vx / dist * force;
                dy[i] += vy / dist * force;
                dx[j] -= vx / dist * force;
                dy[j] -= vy / dist * force;
            }
        }

        // Spring attraction along edges.
        for &(a, b) in &edge_pairs {
            let (vx, vy) = (xs[a] - xs[b], ys[a] - ys[b]);
            let dist = (vx * vx + vy * vy).sqrt().max(1.0);
            let force = dist * dist / k;
            dx[a] -= vx / dist * force;
            dy[a] -= vy / dist * force;
            dx[b] += vx / dist * force;
            dy[b] += vy / dist * force;
        }

        for i in 0..nodes.len() {
            let magnitude = (dx[i] * dx[i] + dy[i] * dy[i]).sqrt().max(1e-9);
            let step = magnitude.min(temperature);
            xs[i] = (xs[i] + dx[i] / magnitude * step).clamp(-half_w, half_w);
            ys[i] = (ys[i] + dy[i] / magnitude * step).clamp(-half_h, half_h);
        }
    }

    nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.clone(), Position { x: xs[i], y: ys[i] }))
        .collect()
}

fn hierarchical_layout(nodes: &[LayoutNode], edges: &[LayoutEdge]) -> HashMap<String, Position> {
    let index_of: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; nodes.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for edge in edges {
        if let (Some(&src), Some(&dst)) = (
            index_of.get(edge.source_id.as_str()),
            index_of.get(edge.destination_id.as_str()),
        ) {
            in_degree[dst] += 1;
            children[src].push(dst);
        }
    }

    // Layer by BFS depth from the roots; cycles fall back to the first
    // unvisited node in input order.
    let mut layer = vec![usize::MAX; nodes.len()];
    let mut queue: std::collections::VecDeque<usize> = (0..nodes.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    for &root in &queue {
        layer[root] = 0;
    }
    let mut cursor = 0;
    loop {
        while let Some(node) = queue.pop_front() {
            for &child in &children[node] {
                if layer[child] == usize::MAX {
                    layer[child] = layer[node] + 1;
                    queue.push_back(child);
                }
            }
        }
        match (cursor..nodes.len()).find(|&i| layer[i] == usize::MAX) {
            Some(unvisited) => {
                layer[unvisited] = 0;
                cursor = unvisited + 1;
                queue.push_back(unvisited);
            }
            None => break,
        }
    }

    let depth = layer.iter().copied().max().unwrap_or(0) + 1;
    let mut rows: Vec<Vec<usize>> = vec![Vec::new(); depth];
    for (i, &l) in layer.iter().enumerate() {
        rows[l].push(i);
    }

    let row_gap = TALL_NODE_HEIGHT + 80.0;
    let mut positions = HashMap::new();
    for (row_index, row) in rows.iter().enumerate() {
        for (col_index, &node_index) in row.iter().enumerate() {
            let node = &nodes[node_index];
            let gap = estimate_dimensions(&node.label).width + 60.0;
            positions.insert(
                node.id.clone(),
                Position {
                    x: (col_index as f64 - (row.len() as f64 - 1.0) / 2.0) * gap,
                    y: row_index as f64 * row_gap,
                },
            );
        }
    }
    positions
}

fn radial_layout(nodes: &[LayoutNode], edges: &[LayoutEdge]) -> HashMap<String, Position> {
    let index_of: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut degree = vec![0usize; nodes.len()];
    let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for edge in edges {
        if let (Some(&a), Some(&b)) = (
            index_of.get(edge.source_id.as_str()),
            index_of.get(edge.destination_id.as_str()),
        ) {
            degree[a] += 1;
            degree[b] += 1;
            neighbors[a].push(b);
            neighbors[b].push(a);
        }
    }

    // Hub = highest degree, ties broken by input order.
    let hub = (0..nodes.len()).max_by_key(|&i| (degree[i], usize::MAX - i)).unwrap_or(0);

    let mut ring = vec![usize::MAX; nodes.len()];
    ring[hub] = 0;
    let mut queue = std::collections::VecDeque::from([hub]);
    while let Some(node) = queue.pop_front() {
        for &next in &neighbors[node] {
            if ring[next] == usize::MAX {
                ring[next] = ring[node] + 1;
                queue.push_back(next);
            }
        }
    }
    let mut outer = ring.iter().filter(|&&r| r != usize::MAX).copied().max().unwrap_or(0);
    for r in ring.iter_mut() {
        if *r == usize::MAX {
            // Disconnected nodes take the outermost ring.
            outer = outer.max(1);
            *r = outer;
        }
    }

    let mut ring_members: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, &r) in ring.iter().enumerate() {
        ring_members.entry(r).or_default().push(i);
    }

    let ring_gap = 320.0;
    let mut positions = HashMap::new();
    for (&r, members) in &ring_members {
        let radius = r as f64 * ring_gap;
        for (slot, &node_index) in members.iter().enumerate() {
            let angle = std::f64::consts::TAU * slot as f64 / members.len() as f64;
            positions.insert(
                nodes[node_index].id.clone(),
                Position {
                    x: radius * angle.cos(),
                    y: radius * angle.sin(),
                },
            );
        }
    }
    positions
}

fn linear_layout(nodes: &[LayoutNode]) -> HashMap<String, Position> {
    let mut x = 0.0;
    let mut positions = HashMap::new();
    for node in nodes {
        let width = estimate_dimensions(&node.label).width;
        positions.insert(node.id.clone(), Position { x: x + width / 2.0, y: 0.0 });
        x += width + 60.0;
    }
    positions
}

fn centroid<'a>(positions: impl Iterator<Item = &'a Position>) -> Position {
    let mut sum = Position { x: 0.0, y: 0.0 };
    let mut count = 0usize;
    for p in positions {
        sum.x += p.x;
        sum.y += p.y;
        count += 1;
    }
    if count == 0 {
        return Position { x: 0.0, y: 0.0 };
    }
    Position {
        x: sum.x / count as f64,
        y: sum.y / count as f64,
    }
}

/// Translate placements so the bounding-box center sits on (0,0).
fn recenter(positions: &mut HashMap<String, Position>) {
    if positions.is_empty() {
        return;
    }
    let min_x = positions.values().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = positions.values().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = positions.values().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = positions.values().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    let center = Position {
        x: (min_x + max_x) / 2.0,
        y: (min_y + max_y) / 2.0,
    };
    for p in positions.values_mut() {
        p.x -= center.x;
        p.y -= center.y;
    }
}
