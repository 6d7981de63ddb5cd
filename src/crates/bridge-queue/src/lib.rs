//! Lease-based in-memory queues for the patch pipeline.
//!
//! Each pipeline stage hands records to the next through a [`LeaseQueue`]:
//! pulls stamp a lease so a record is in flight with exactly one consumer,
//! acks remove it, nacks return it to the pool, and expired leases are
//! swept back to eligibility by the scheduler tick. Partition keys
//! serialize records belonging to one agent conversation while round-robin
//! keeps a chatty thread from starving the rest.

pub mod queue;

pub use queue::{LeaseQueue, QueueConfig, QueueError, QueueRecord, Result};
