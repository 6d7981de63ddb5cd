//! Per-correlation-id execution timelines.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

/// Outcome of one traced stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Ok,
    Error,
}

/// One span on a cid's timeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSpan {
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: TraceStatus,

    /// Free-form detail; error spans carry tool name, an arguments
    /// snapshot and the error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Append-only trace store, serialized per cid by the inner lock.
#[derive(Default)]
pub struct ExecutionTracer {
    timelines: Mutex<HashMap<String, Vec<TraceSpan>>>,
}

impl ExecutionTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful stage run.
    pub fn record_ok(
        &self,
        cid: &str,
        stage: impl Into<String>,
        started_at: DateTime<Utc>,
        detail: Option<String>,
    ) {
        self.append(cid, stage.into(), started_at, TraceStatus::Ok, detail);
    }

    /// Record a failed stage run with tool context for the chat error
    /// format.
    pub fn record_error(
        &self,
        cid: &str,
        stage: impl Into<String>,
        started_at: DateTime<Utc>,
        tool: &str,
        args: &serde_json::Value,
        error: &str,
    ) {
        let detail = format!("tool={} args={} error={}", tool, args, error);
        self.append(cid, stage.into(), started_at, TraceStatus::Error, Some(detail));
    }

    fn append(
        &self,
        cid: &str,
        stage: String,
        started_at: DateTime<Utc>,
        status: TraceStatus,
        detail: Option<String>,
    ) {
        let span = TraceSpan {
            stage,
            started_at,
            ended_at: Utc::now(),
            status,
            detail,
        };
        self.timelines
            .lock()
            .entry(cid.to_string())
            .or_default()
            .push(span);
    }

    /// The timeline for one cid, in record order.
    pub fn timeline(&self, cid: &str) -> Vec<TraceSpan> {
        self.timelines.lock().get(cid).cloned().unwrap_or_default()
    }

    /// Spans on a cid's timeline matching a stage name.
    pub fn spans_for_stage(&self, cid: &str, stage: &str) -> Vec<TraceSpan> {
        self.timeline(cid)
            .into_iter()
            .filter(|s| s.stage == stage)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timeline_preserves_order() {
        let tracer = ExecutionTracer::new();
        tracer.record_ok("cid-1", "planner", Utc::now(), None);
        tracer.record_ok("cid-1", "executor", Utc::now(), Some("create_graph".to_string()));

        let timeline = tracer.timeline("cid-1");
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].stage, "planner");
        assert_eq!(timeline[1].stage, "executor");
    }

    #[test]
    fn test_error_spans_carry_tool_context() {
        let tracer = ExecutionTracer::new();
        tracer.record_error(
            "cid-1",
            "executor",
            Utc::now(),
            "delete_graph",
            &json!({"graph_id": "missing"}),
            "Graph not found: missing",
        );

        let timeline = tracer.timeline("cid-1");
        assert_eq!(timeline[0].status, TraceStatus::Error);
        let detail = timeline[0].detail.as_ref().unwrap();
        assert!(detail.contains("delete_graph"));
        assert!(detail.contains("missing"));
    }

    #[test]
    fn test_stage_filter() {
        let tracer = ExecutionTracer::new();
        tracer.record_ok("cid-1", "executor", Utc::now(), None);
        tracer.record_ok("cid-1", "fuzzy-dedup", Utc::now(), None);
        assert_eq!(tracer.spans_for_stage("cid-1", "fuzzy-dedup").len(), 1);
    }
}
