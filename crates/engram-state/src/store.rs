//! Storage trait definitions for the memory subsystem.
//!
//! These traits define the durable layer the coordinator is built on:
//! - `EventStore`: append-only log of raw conversation turns
//! - `SummaryStore`: condensed memory items with opaque metadata
//! - `AdmissionLedger`: durable per-tenant admitted-event sequence
//!
//! All traits are async and backend-agnostic. Every operation is scoped by a
//! tenant string; a wrong tenant yields an empty/false result, never another
//! tenant's row. In-memory fakes are provided for testing via the `fakes`
//! module; the SurrealDB implementation lives in `surreal`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::records::{EventRecord, Role, SummaryRecord};

/// Durable, tenant-scoped log of raw conversation turns.
///
/// Guarantees:
/// - Returned ids are unique within the store and never reused.
/// - `list_recent` and `search` order newest first.
/// - A missing (tenant, id) pair is `Ok(None)` / `Ok(false)`, not an error.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert a turn and return its durable id.
    async fn insert(&self, tenant: &str, content: &str, role: Role) -> StorageResult<u64>;

    /// Fetch one record, verifying tenant ownership.
    async fn get(&self, tenant: &str, id: u64) -> StorageResult<Option<EventRecord>>;

    /// The tenant's most recent turns, newest first.
    async fn list_recent(&self, tenant: &str, limit: usize) -> StorageResult<Vec<EventRecord>>;

    /// Substring match over the tenant's turns, newest first.
    async fn search(&self, tenant: &str, substring: &str) -> StorageResult<Vec<EventRecord>>;

    /// Replace the content of one turn. Role and timestamp stay fixed.
    async fn update_content(&self, tenant: &str, id: u64, content: &str) -> StorageResult<bool>;

    /// Delete one turn.
    async fn delete(&self, tenant: &str, id: u64) -> StorageResult<bool>;

    /// Delete every turn older than the cutoff, returning the count.
    async fn delete_older_than(&self, tenant: &str, cutoff: DateTime<Utc>) -> StorageResult<u64>;

    /// Delete every turn for the tenant, returning the count.
    async fn clear(&self, tenant: &str) -> StorageResult<u64>;
}

/// Durable, tenant-scoped table of condensed memory items.
///
/// `update_content` touches only the row; it has no embedding capability.
/// Keeping the vector index in step is the coordinator's job.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Insert a summary and return its durable id.
    async fn insert(
        &self,
        tenant: &str,
        content: &str,
        metadata: serde_json::Value,
    ) -> StorageResult<u64>;

    /// Fetch one record, verifying tenant ownership.
    async fn get(&self, tenant: &str, id: u64) -> StorageResult<Option<SummaryRecord>>;

    /// The tenant's most recent summaries, newest first.
    async fn list_recent(&self, tenant: &str, limit: usize) -> StorageResult<Vec<SummaryRecord>>;

    /// Resolve a batch of ids. Ids that are missing or belong to another
    /// tenant are silently dropped from the result.
    async fn get_many(&self, tenant: &str, ids: &[u64]) -> StorageResult<Vec<SummaryRecord>>;

    /// Substring match over the tenant's summaries, newest first.
    async fn search(&self, tenant: &str, substring: &str) -> StorageResult<Vec<SummaryRecord>>;

    /// Replace the content of one summary.
    async fn update_content(&self, tenant: &str, id: u64, content: &str) -> StorageResult<bool>;

    /// Delete one summary.
    async fn delete(&self, tenant: &str, id: u64) -> StorageResult<bool>;

    /// Delete every summary older than the cutoff, returning the count.
    async fn delete_older_than(&self, tenant: &str, cutoff: DateTime<Utc>) -> StorageResult<u64>;

    /// Delete every summary for the tenant, returning the count.
    async fn clear(&self, tenant: &str) -> StorageResult<u64>;
}

/// Durable per-tenant sequence of admitted events.
///
/// The counter only ever moves forward; later deletions or purges of the
/// events themselves never rewind it, so promotion decisions already made
/// stay made. Only full tenant erasure resets it.
#[async_trait]
pub trait AdmissionLedger: Send + Sync {
    /// Increment the tenant's counter and return the new value.
    async fn next_admitted(&self, tenant: &str) -> StorageResult<u64>;

    /// Current counter value; 0 for a tenant that never admitted anything.
    async fn admitted_count(&self, tenant: &str) -> StorageResult<u64>;

    /// Drop the tenant's counter. Used only by tenant erasure.
    async fn reset(&self, tenant: &str) -> StorageResult<()>;
}
