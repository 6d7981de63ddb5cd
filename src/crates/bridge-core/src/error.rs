//! Error types for the core data model.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while reading or mutating the mirrored state.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Graph id does not resolve to a known graph.
    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    /// Prototype id does not resolve to a known prototype.
    #[error("Node prototype not found: {0}")]
    PrototypeNotFound(String),

    /// Instance id does not resolve within the named graph.
    #[error("Node instance not found: {0}")]
    InstanceNotFound(String),

    /// Edge id does not resolve within the named graph.
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    /// An op referenced entities that violate a referential invariant.
    #[error("Invalid op: {0}")]
    InvalidOp(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
