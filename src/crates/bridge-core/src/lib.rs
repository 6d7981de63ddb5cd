//! Core data model and mirrored state store for graphbridge
//!
//! This crate defines the graph/prototype/instance/edge model shared with
//! the UI, the closed set of mutation ops that patches are built from, and
//! the state mirror that merges authoritative UI snapshots with locally
//! applied operations.

pub mod error;
pub mod mirror;
pub mod model;
pub mod ops;
pub mod query;
pub mod text;

pub use error::{CoreError, Result};
pub use mirror::{MirrorState, Snapshot, StateMirror};
pub use model::{Edge, Graph, NodeInstance, NodePrototype};
pub use ops::{Op, Patch, PatchMeta, NEW_GRAPH_PREFIX};
pub use query::{Directionality, GraphSemanticStructure, SemanticEdge, SemanticNode};
