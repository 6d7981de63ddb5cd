//! The tool surface: schemas, registry and op synthesis.
//!
//! Every tool the agent can call is one registry entry: a declarative
//! argument schema plus a synthesis function that turns validated
//! arguments into an ordered op list against the mirror. The executor is
//! a pure dispatcher over this table.

pub mod external;
pub mod registry;
pub mod schema;
pub mod synthesis;

pub use external::{ExternalReader, HttpExternalReader};
pub use registry::{Synthesis, SynthesisContext, SynthesisNote, ToolKind, ToolRegistry};
pub use schema::{FieldKind, FieldSpec, ToolSchema};
