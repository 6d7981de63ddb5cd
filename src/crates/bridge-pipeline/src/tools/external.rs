//! Bounded external reads: SPARQL and semantic search.
//!
//! Failures here are not task failures. The executor wraps whatever comes
//! back, `Ok` payload or `Err` message, into a `readResponse` op so the
//! agent sees the error text instead of a retry loop.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

/// Deadline for one external read. Stays under the queue lease timeout.
const EXTERNAL_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// External knowledge sources the read tools call out to.
#[async_trait]
pub trait ExternalReader: Send + Sync {
    /// Run a SPARQL query against `endpoint`.
    async fn sparql_query(&self, endpoint: &str, query: &str) -> Result<Value, String>;

    /// Free-text search over the configured knowledge source.
    async fn semantic_search(&self, query: &str, limit: usize) -> Result<Value, String>;
}

/// HTTP-backed reader.
pub struct HttpExternalReader {
    client: reqwest::Client,

    /// Base URL for semantic search; empty disables the tool.
    search_endpoint: String,
}

impl HttpExternalReader {
    pub fn new(search_endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(EXTERNAL_READ_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            search_endpoint: search_endpoint.into(),
        }
    }
}

#[async_trait]
impl ExternalReader for HttpExternalReader {
    async fn sparql_query(&self, endpoint: &str, query: &str) -> Result<Value, String> {
        let response = self
            .client
            .get(endpoint)
            .query(&[("query", query), ("format", "json")])
            .header("Accept", "application/sparql-results+json")
            .send()
            .await
            .map_err(|e| {
                warn!(endpoint, error = %e, "SPARQL request failed");
                if e.is_timeout() {
                    format!("SPARQL query timed out after {}s", EXTERNAL_READ_TIMEOUT.as_secs())
                } else {
                    format!("SPARQL request failed: {}", e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("SPARQL endpoint returned {}", status));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| format!("SPARQL response was not JSON: {}", e))
    }

    async fn semantic_search(&self, query: &str, limit: usize) -> Result<Value, String> {
        if self.search_endpoint.is_empty() {
            return Err("no semantic-search endpoint configured".to_string());
        }
        let response = self
            .client
            .post(&self.search_endpoint)
            .json(&json!({"query": query, "limit": limit}))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Semantic search request failed");
                if e.is_timeout() {
                    format!(
                        "semantic search timed out after {}s",
                        EXTERNAL_READ_TIMEOUT.as_secs()
                    )
                } else {
                    format!("semantic search failed: {}", e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("semantic search endpoint returned {}", status));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| format!("semantic search response was not JSON: {}", e))
    }
}
