//! HTTP surface for the bridge.
//!
//! The UI registers full-state snapshots, polls pending action batches,
//! and acknowledges applied ones; agent turns and chat drains ride the
//! same router. Everything mutable lives in [`state::AppState`]; handlers
//! stay thin.

pub mod config;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod state;

pub use config::{BridgeConfig, TrustProxy};
pub use routes::build_router;
pub use state::AppState;
