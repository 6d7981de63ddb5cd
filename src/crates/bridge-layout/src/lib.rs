//! Deterministic graph layout for the bridge.
//!
//! The executor calls into this crate whenever a tool creates or reshapes
//! a graph. Results must match the UI's own Auto-Layout button bit for
//! bit, so every algorithm runs from a fixed seed preset and a fixed
//! iteration count; given the same nodes, edges and algorithm the output
//! is identical.

pub mod engine;

pub use engine::{
    compute_layout, estimate_dimensions, LayoutAlgorithm, LayoutEdge, LayoutMode, LayoutNode,
    LayoutOptions, NodeDimensions, Position,
};
