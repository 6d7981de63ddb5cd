//! Chat channel feedback to the agent.
//!
//! Permanent failures and read results come back to the conversation as
//! entries keyed by correlation id; the UI drains them per turn. The log
//! is bounded per cid so a runaway loop cannot grow memory without limit.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Cap per correlation id; the oldest entries roll off.
const MAX_ENTRIES_PER_CID: usize = 200;

/// Who authored a channel entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    Assistant,
}

/// One channel entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub cid: String,
    pub role: ChatRole,
    pub text: String,

    /// Structured payload for read responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    pub at: DateTime<Utc>,
}

/// Per-cid message log.
#[derive(Default)]
pub struct ChatChannel {
    entries: Mutex<HashMap<String, Vec<ChatEntry>>>,
}

impl ChatChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: ChatEntry) {
        let mut entries = self.entries.lock();
        let log = entries.entry(entry.cid.clone()).or_default();
        log.push(entry);
        if log.len() > MAX_ENTRIES_PER_CID {
            let excess = log.len() - MAX_ENTRIES_PER_CID;
            log.drain(0..excess);
        }
    }

    /// Post a system-role message (error feedback, guidance).
    pub fn post_system(&self, cid: &str, text: impl Into<String>) {
        self.push(ChatEntry {
            cid: cid.to_string(),
            role: ChatRole::System,
            text: text.into(),
            payload: None,
            at: Utc::now(),
        });
    }

    /// Post a structured read result.
    pub fn post_read_response(&self, cid: &str, tool: &str, payload: Value) {
        self.push(ChatEntry {
            cid: cid.to_string(),
            role: ChatRole::Assistant,
            text: format!("{} result", tool),
            payload: Some(payload),
            at: Utc::now(),
        });
    }

    /// Entries for one cid, oldest first.
    pub fn entries_for(&self, cid: &str) -> Vec<ChatEntry> {
        self.entries.lock().get(cid).cloned().unwrap_or_default()
    }

    /// Remove and return entries for one cid.
    pub fn drain(&self, cid: &str) -> Vec<ChatEntry> {
        self.entries.lock().remove(cid).unwrap_or_default()
    }

    /// Total entries across all cids.
    pub fn len(&self) -> usize {
        self.entries.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entries_key_by_cid() {
        let channel = ChatChannel::new();
        channel.post_system("cid-1", "first");
        channel.post_system("cid-2", "other");
        channel.post_read_response("cid-1", "read_graph_structure", json!({"nodeCount": 2}));

        let entries = channel.entries_for("cid-1");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, ChatRole::System);
        assert_eq!(entries[1].payload.as_ref().unwrap()["nodeCount"], 2);
        assert_eq!(channel.entries_for("cid-2").len(), 1);
    }

    #[test]
    fn test_drain_removes_entries() {
        let channel = ChatChannel::new();
        channel.post_system("cid-1", "once");
        assert_eq!(channel.drain("cid-1").len(), 1);
        assert!(channel.entries_for("cid-1").is_empty());
    }

    #[test]
    fn test_log_is_bounded() {
        let channel = ChatChannel::new();
        for i in 0..(MAX_ENTRIES_PER_CID + 50) {
            channel.post_system("cid-1", format!("message {}", i));
        }
        let entries = channel.entries_for("cid-1");
        assert_eq!(entries.len(), MAX_ENTRIES_PER_CID);
        // Oldest rolled off.
        assert_eq!(entries[0].text, "message 50");
    }
}
