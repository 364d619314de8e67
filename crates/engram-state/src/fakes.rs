//! In-memory fakes for the storage traits (testing and local runs).
//!
//! Provides `MemoryEventStore`, `MemorySummaryStore`, and
//! `MemoryAdmissionLedger` that satisfy the trait contracts without any
//! external dependencies.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::records::{EventRecord, Role, SummaryRecord};
use crate::store::{AdmissionLedger, EventStore, SummaryStore};

// ---------------------------------------------------------------------------
// MemoryEventStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct EventInner {
    next_id: u64,
    rows: Vec<EventRecord>,
}

/// In-memory event log backed by a `Mutex<Vec<EventRecord>>`.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    inner: Mutex<EventInner>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, F: Fn(&T) -> (DateTime<Utc>, u64)>(rows: &mut [T], key: F) {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert(&self, tenant: &str, content: &str, role: Role) -> StorageResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.push(EventRecord {
            id,
            tenant: tenant.to_string(),
            content: content.to_string(),
            role,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn get(&self, tenant: &str, id: u64) -> StorageResult<Option<EventRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rows
            .iter()
            .find(|r| r.id == id && r.tenant == tenant)
            .cloned())
    }

    async fn list_recent(&self, tenant: &str, limit: usize) -> StorageResult<Vec<EventRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<EventRecord> = inner
            .rows
            .iter()
            .filter(|r| r.tenant == tenant)
            .cloned()
            .collect();
        newest_first(&mut rows, |r| (r.created_at, r.id));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn search(&self, tenant: &str, substring: &str) -> StorageResult<Vec<EventRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<EventRecord> = inner
            .rows
            .iter()
            .filter(|r| r.tenant == tenant && r.content.contains(substring))
            .cloned()
            .collect();
        newest_first(&mut rows, |r| (r.created_at, r.id));
        Ok(rows)
    }

    async fn update_content(&self, tenant: &str, id: u64, content: &str) -> StorageResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .rows
            .iter_mut()
            .find(|r| r.id == id && r.tenant == tenant)
        {
            Some(row) => {
                row.content = content.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, tenant: &str, id: u64) -> StorageResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.rows.len();
        inner.rows.retain(|r| !(r.id == id && r.tenant == tenant));
        Ok(inner.rows.len() < before)
    }

    async fn delete_older_than(&self, tenant: &str, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.rows.len();
        inner
            .rows
            .retain(|r| !(r.tenant == tenant && r.created_at < cutoff));
        Ok((before - inner.rows.len()) as u64)
    }

    async fn clear(&self, tenant: &str) -> StorageResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.rows.len();
        inner.rows.retain(|r| r.tenant != tenant);
        Ok((before - inner.rows.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// MemorySummaryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SummaryInner {
    next_id: u64,
    rows: Vec<SummaryRecord>,
}

/// In-memory summary store backed by a `Mutex<Vec<SummaryRecord>>`.
#[derive(Debug, Default)]
pub struct MemorySummaryStore {
    inner: Mutex<SummaryInner>,
}

impl MemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SummaryStore for MemorySummaryStore {
    async fn insert(
        &self,
        tenant: &str,
        content: &str,
        metadata: serde_json::Value,
    ) -> StorageResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.push(SummaryRecord {
            id,
            tenant: tenant.to_string(),
            content: content.to_string(),
            metadata,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn get(&self, tenant: &str, id: u64) -> StorageResult<Option<SummaryRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rows
            .iter()
            .find(|r| r.id == id && r.tenant == tenant)
            .cloned())
    }

    async fn list_recent(&self, tenant: &str, limit: usize) -> StorageResult<Vec<SummaryRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<SummaryRecord> = inner
            .rows
            .iter()
            .filter(|r| r.tenant == tenant)
            .cloned()
            .collect();
        newest_first(&mut rows, |r| (r.created_at, r.id));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn get_many(&self, tenant: &str, ids: &[u64]) -> StorageResult<Vec<SummaryRecord>> {
        let inner = self.inner.lock().unwrap();
        // Preserve the requested order so ranked search results stay ranked.
        Ok(ids
            .iter()
            .filter_map(|id| {
                inner
                    .rows
                    .iter()
                    .find(|r| r.id == *id && r.tenant == tenant)
                    .cloned()
            })
            .collect())
    }

    async fn search(&self, tenant: &str, substring: &str) -> StorageResult<Vec<SummaryRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<SummaryRecord> = inner
            .rows
            .iter()
            .filter(|r| r.tenant == tenant && r.content.contains(substring))
            .cloned()
            .collect();
        newest_first(&mut rows, |r| (r.created_at, r.id));
        Ok(rows)
    }

    async fn update_content(&self, tenant: &str, id: u64, content: &str) -> StorageResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .rows
            .iter_mut()
            .find(|r| r.id == id && r.tenant == tenant)
        {
            Some(row) => {
                row.content = content.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, tenant: &str, id: u64) -> StorageResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.rows.len();
        inner.rows.retain(|r| !(r.id == id && r.tenant == tenant));
        Ok(inner.rows.len() < before)
    }

    async fn delete_older_than(&self, tenant: &str, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.rows.len();
        inner
            .rows
            .retain(|r| !(r.tenant == tenant && r.created_at < cutoff));
        Ok((before - inner.rows.len()) as u64)
    }

    async fn clear(&self, tenant: &str) -> StorageResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.rows.len();
        inner.rows.retain(|r| r.tenant != tenant);
        Ok((before - inner.rows.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// MemoryAdmissionLedger
// ---------------------------------------------------------------------------

/// In-memory admission ledger backed by a `HashMap<tenant, count>`.
#[derive(Debug, Default)]
pub struct MemoryAdmissionLedger {
    counts: Mutex<HashMap<String, u64>>,
}

impl MemoryAdmissionLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AdmissionLedger for MemoryAdmissionLedger {
    async fn next_admitted(&self, tenant: &str) -> StorageResult<u64> {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(tenant.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn admitted_count(&self, tenant: &str) -> StorageResult<u64> {
        let counts = self.counts.lock().unwrap();
        Ok(counts.get(tenant).copied().unwrap_or(0))
    }

    async fn reset(&self, tenant: &str) -> StorageResult<()> {
        let mut counts = self.counts.lock().unwrap();
        counts.remove(tenant);
        Ok(())
    }
}
