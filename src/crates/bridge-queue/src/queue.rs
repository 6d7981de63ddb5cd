//! The lease queue primitive.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors surfaced by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The lease id does not match any in-flight record.
    #[error("Unknown lease: {0}")]
    UnknownLease(String),
}

/// One queued record. A record is either pending (no lease), in flight
/// (leased), or gone (acked); never two of those at once.
#[derive(Debug, Clone)]
pub struct QueueRecord<T> {
    pub id: String,
    pub payload: T,
    pub partition_key: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub lease_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
}

/// Queue tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Name used in log lines.
    pub name: String,

    /// How long a lease lasts before the sweeper returns the record to
    /// the pool. Must exceed the worst-case external call a consumer
    /// makes while holding the lease.
    pub lease_timeout: Duration,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lease_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout = timeout;
        self
    }
}

struct QueueState<T> {
    records: Vec<QueueRecord<T>>,
    /// Partition served last, for round-robin rotation across pulls.
    cursor: Option<String>,
}

/// A FIFO queue with at-most-one in-flight delivery per record and
/// per-partition serialization. Clones share the same underlying queue.
pub struct LeaseQueue<T> {
    config: QueueConfig,
    state: Arc<Mutex<QueueState<T>>>,
}

impl<T> Clone for LeaseQueue<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone> LeaseQueue<T> {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(QueueState {
                records: Vec::new(),
                cursor: None,
            })),
        }
    }

    /// Append a record. O(1); never blocks a consumer.
    pub fn enqueue(&self, payload: T, partition_key: Option<String>) -> String {
        let record = QueueRecord {
            id: Uuid::new_v4().to_string(),
            payload,
            partition_key,
            enqueued_at: Utc::now(),
            lease_id: None,
            lease_expires_at: None,
        };
        let id = record.id.clone();
        let mut state = self.state.lock();
        state.records.push(record);
        debug!(queue = %self.config.name, record_id = %id, depth = state.records.len(), "Enqueued");
        id
    }

    /// Lease up to `max` records.
    ///
    /// A partition with an in-flight lease is skipped entirely, and each
    /// pull takes at most one record per partition, so records sharing a
    /// partition key are consumed strictly one at a time in FIFO order.
    /// Eligible partitions are served round-robin starting after the
    /// partition served last, so one busy thread cannot starve others.
    /// Unpartitioned records have no serialization constraint.
    pub fn pull(&self, max: usize) -> Vec<QueueRecord<T>> {
        if max == 0 {
            return Vec::new();
        }
        let mut state = self.state.lock();
        let now = Utc::now();

        let leased_partitions: HashSet<String> = state
            .records
            .iter()
            .filter(|r| r.lease_id.is_some())
            .filter_map(|r| r.partition_key.clone())
            .collect();

        // One candidate per eligible partition (its oldest pending
        // record); every pending unpartitioned record is its own
        // candidate. Candidates keep queue FIFO order.
        let mut candidate_indices: Vec<usize> = Vec::new();
        let mut seen_partitions: HashSet<String> = HashSet::new();
        for (index, record) in state.records.iter().enumerate() {
            if record.lease_id.is_some() {
                continue;
            }
            match &record.partition_key {
                Some(partition) => {
                    if leased_partitions.contains(partition) || seen_partitions.contains(partition)
                    {
                        continue;
                    }
                    seen_partitions.insert(partition.clone());
                    candidate_indices.push(index);
                }
                None => candidate_indices.push(index),
            }
        }

        // Rotate so iteration resumes after the cursor's partition.
        if let Some(cursor) = state.cursor.clone() {
            if let Some(position) = candidate_indices.iter().position(|&i| {
                state.records[i].partition_key.as_deref() == Some(cursor.as_str())
            }) {
                let len = candidate_indices.len().max(1);
                candidate_indices.rotate_left((position + 1) % len);
            }
        }

        let mut pulled = Vec::new();
        for index in candidate_indices.into_iter().take(max) {
            let expires = now
                + ChronoDuration::from_std(self.config.lease_timeout)
                    .unwrap_or_else(|_| ChronoDuration::seconds(60));
            let record = &mut state.records[index];
            record.lease_id = Some(Uuid::new_v4().to_string());
            record.lease_expires_at = Some(expires);
            pulled.push(record.clone());
        }

        if let Some(last) = pulled.last() {
            state.cursor = last.partition_key.clone();
        }
        if !pulled.is_empty() {
            debug!(queue = %self.config.name, count = pulled.len(), "Leased records");
        }
        pulled
    }

    /// Remove the record held under `lease_id`. Acked records never
    /// reappear.
    pub fn ack(&self, lease_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let position = state
            .records
            .iter()
            .position(|r| r.lease_id.as_deref() == Some(lease_id))
            .ok_or_else(|| QueueError::UnknownLease(lease_id.to_string()))?;
        state.records.remove(position);
        Ok(())
    }

    /// Return the record held under `lease_id` to the pool. It becomes
    /// eligible again in its original FIFO position.
    pub fn nack(&self, lease_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let record = state
            .records
            .iter_mut()
            .find(|r| r.lease_id.as_deref() == Some(lease_id))
            .ok_or_else(|| QueueError::UnknownLease(lease_id.to_string()))?;
        record.lease_id = None;
        record.lease_expires_at = None;
        Ok(())
    }

    /// Clear leases that expired before `now`. Returns how many records
    /// were redelivered to the pool.
    pub fn expire_leases(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock();
        let name = self.config.name.clone();
        let mut expired = 0;
        for record in state.records.iter_mut() {
            if let Some(expires_at) = record.lease_expires_at {
                if expires_at < now {
                    warn!(queue = %name, record_id = %record.id, "Lease expired, redelivering");
                    record.lease_id = None;
                    record.lease_expires_at = None;
                    expired += 1;
                }
            }
        }
        expired
    }

    /// Total records, leased or not.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records currently eligible for pull.
    pub fn pending_len(&self) -> usize {
        self.state
            .lock()
            .records
            .iter()
            .filter(|r| r.lease_id.is_none())
            .count()
    }

    /// Records currently leased.
    pub fn in_flight_len(&self) -> usize {
        self.len() - self.pending_len()
    }
}
