//! Memory coordinator: the single write path across the event log, the
//! summary store, and the vector index.
//!
//! Every collaborator is injected at construction; there is no ambient
//! singleton. Mutations serialize per tenant, and the slow processor calls
//! are awaited before the tenant lock is taken so an embedding stall never
//! blocks the tenant's other writers.
//!
//! Ordering discipline for anything indexed: durable store write first, index
//! mutation second. A storage failure therefore leaves the index untouched,
//! and the only reachable inconsistency is a stale index entry pointing at a
//! deleted row, which resolution via the store filters out.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use engram_state::{
    AdmissionLedger, EventRecord, EventStore, MemoryKind, Role, SummaryRecord, SummaryStore,
};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::error::MemoryResult;
use crate::index::{VectorIndex, VectorKey};
use crate::policy::GatingPolicy;
use crate::processor::{MemoryProcessor, ProcessorError};

/// Outcome of offering one conversation turn to memory.
///
/// Rejection is a normal decision, not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The turn was persisted as event memory.
    Admitted {
        id: u64,
        /// Whether the admission pushed the tenant's counter onto a
        /// promotion boundary. The caller decides when to run the pass.
        promotion_due: bool,
    },
    /// The gating policy declined the turn; nothing was written.
    Rejected,
}

/// One retrievable memory item, either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryItem {
    Event(EventRecord),
    Summary(SummaryRecord),
}

impl MemoryItem {
    pub fn id(&self) -> u64 {
        match self {
            Self::Event(e) => e.id,
            Self::Summary(s) => s.id,
        }
    }

    pub fn kind(&self) -> MemoryKind {
        match self {
            Self::Event(_) => MemoryKind::Event,
            Self::Summary(_) => MemoryKind::Summary,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Event(e) => &e.content,
            Self::Summary(s) => &s.content,
        }
    }
}

/// Tuning knobs for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Result cap for each retrieval arm of `hybrid_search`.
    pub search_k: usize,
    /// Upper bound on one embedding call.
    pub embed_timeout: Duration,
    /// How many recent events one promotion pass condenses.
    pub promotion_window: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            search_k: 5,
            embed_timeout: Duration::from_secs(10),
            promotion_window: 10,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_search_k(mut self, k: usize) -> Self {
        self.search_k = k;
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn with_promotion_window(mut self, window: usize) -> Self {
        self.promotion_window = window;
        self
    }
}

/// Lazily-populated per-tenant mutexes. Distinct tenants never contend.
#[derive(Default)]
struct TenantLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TenantLocks {
    fn for_tenant(&self, tenant: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(tenant.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop a tenant's entry. Writers already holding the Arc keep
    /// serializing among themselves; the next writer gets a fresh mutex.
    fn release(&self, tenant: &str) {
        self.locks.lock().unwrap().remove(tenant);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

/// Orchestrates event memory, summary memory, the vector index, the gating
/// policy, and the content processor behind one tenant-scoped API.
pub struct MemoryCoordinator {
    events: Arc<dyn EventStore>,
    summaries: Arc<dyn SummaryStore>,
    ledger: Arc<dyn AdmissionLedger>,
    index: Arc<VectorIndex>,
    policy: Arc<dyn GatingPolicy>,
    processor: Arc<dyn MemoryProcessor>,
    config: CoordinatorConfig,
    tenant_locks: TenantLocks,
}

impl MemoryCoordinator {
    pub fn new(
        events: Arc<dyn EventStore>,
        summaries: Arc<dyn SummaryStore>,
        ledger: Arc<dyn AdmissionLedger>,
        index: Arc<VectorIndex>,
        policy: Arc<dyn GatingPolicy>,
        processor: Arc<dyn MemoryProcessor>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            events,
            summaries,
            ledger,
            index,
            policy,
            processor,
            config,
            tenant_locks: TenantLocks::default(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    async fn embed_bounded(&self, text: &str) -> Result<Vec<f32>, ProcessorError> {
        match timeout(self.config.embed_timeout, self.processor.embed(text)).await {
            Ok(result) => result,
            Err(_) => Err(ProcessorError::Timeout(self.config.embed_timeout)),
        }
    }

    /// Offer one conversation turn to memory.
    ///
    /// The gating decision is made before any lock or write; a rejected turn
    /// leaves no trace anywhere. An admitted turn is durably inserted, then
    /// the tenant's admission counter advances, and the new count decides
    /// `promotion_due`.
    #[instrument(skip(self, content), fields(tenant = %tenant))]
    pub async fn record_event(
        &self,
        tenant: &str,
        content: &str,
        role: Role,
    ) -> MemoryResult<RecordOutcome> {
        if !self.policy.admit_event(tenant, content) {
            debug!("gating policy rejected turn");
            return Ok(RecordOutcome::Rejected);
        }

        let lock = self.tenant_locks.for_tenant(tenant);
        let _guard = lock.lock().await;

        let id = self.events.insert(tenant, content, role).await?;
        let count = self.ledger.next_admitted(tenant).await?;
        let promotion_due = self.policy.promotion_due(tenant, count);

        debug!(id, admitted = count, promotion_due, "event admitted");
        Ok(RecordOutcome::Admitted { id, promotion_due })
    }

    /// The tenant's most recent memory: events first, then summaries. The two
    /// lists are each newest-first but not merged by timestamp.
    pub async fn list_recent(&self, tenant: &str, limit: usize) -> MemoryResult<Vec<MemoryItem>> {
        let events = self.events.list_recent(tenant, limit).await?;
        let summaries = self.summaries.list_recent(tenant, limit).await?;

        let mut items: Vec<MemoryItem> = events.into_iter().map(MemoryItem::Event).collect();
        items.extend(summaries.into_iter().map(MemoryItem::Summary));
        Ok(items)
    }

    /// Hybrid retrieval: substring scan over event memory plus similarity
    /// search over summary memory.
    ///
    /// The vector arm embeds the query under `embed_timeout`; if embedding
    /// fails or times out the search degrades to keyword-only results. Index
    /// hits are resolved through the summary store, which silently drops ids
    /// whose rows have since been deleted.
    #[instrument(skip(self, query), fields(tenant = %tenant))]
    pub async fn hybrid_search(&self, tenant: &str, query: &str) -> MemoryResult<Vec<MemoryItem>> {
        let k = self.config.search_k;

        let mut keyword_hits = self.events.search(tenant, query).await?;
        keyword_hits.truncate(k);

        let summary_hits = match self.embed_bounded(query).await {
            Ok(vector) => {
                let row_ids = self.index.search(tenant, MemoryKind::Summary, &vector, k)?;
                self.summaries.get_many(tenant, &row_ids).await?
            }
            Err(err) => {
                warn!(error = %err, "embedding unavailable, keyword-only search");
                Vec::new()
            }
        };

        debug!(
            keyword = keyword_hits.len(),
            vector = summary_hits.len(),
            "hybrid search complete"
        );
        let mut items: Vec<MemoryItem> = keyword_hits.into_iter().map(MemoryItem::Event).collect();
        items.extend(summary_hits.into_iter().map(MemoryItem::Summary));
        Ok(items)
    }

    /// Archive one summary: embed, durably insert, then index.
    ///
    /// Embedding failure here is fatal; an unindexed summary would be
    /// invisible to similarity search. Embedding is awaited before the tenant
    /// lock, and the store write precedes the index upsert, so a storage
    /// failure leaves the index untouched.
    #[instrument(skip(self, content, metadata), fields(tenant = %tenant))]
    pub async fn insert_summary(
        &self,
        tenant: &str,
        content: &str,
        metadata: serde_json::Value,
    ) -> MemoryResult<u64> {
        let vector = self.embed_bounded(content).await?;

        let lock = self.tenant_locks.for_tenant(tenant);
        let _guard = lock.lock().await;

        let id = self.summaries.insert(tenant, content, metadata).await?;
        self.index
            .upsert(VectorKey::new(tenant, MemoryKind::Summary, id), &vector)?;

        info!(id, "summary archived");
        Ok(id)
    }

    /// Condense the tenant's most recent event window into one archived
    /// summary. Returns the new summary id, or `None` when the tenant has no
    /// events to promote.
    ///
    /// Typically driven by the caller after `record_event` reports
    /// `promotion_due`, but safe to invoke at any time.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn run_promotion(&self, tenant: &str) -> MemoryResult<Option<u64>> {
        let window = self
            .events
            .list_recent(tenant, self.config.promotion_window)
            .await?;
        if window.is_empty() {
            debug!("nothing to promote");
            return Ok(None);
        }

        // list_recent is newest-first; summarize in conversation order.
        let turns: Vec<String> = window
            .iter()
            .rev()
            .map(|e| format!("{}: {}", e.role, e.content))
            .collect();
        let summary = self.processor.summarize(&turns).await.map_err(|err| {
            warn!(error = %err, "promotion summarization failed");
            err
        })?;

        let metadata = serde_json::json!({
            "source": "promotion",
            "window": turns.len(),
        });
        let id = self.insert_summary(tenant, &summary, metadata).await?;
        info!(id, window = turns.len(), "promotion pass archived summary");
        Ok(Some(id))
    }

    /// Fetch one memory item of either kind, verifying tenant ownership.
    pub async fn get_item(
        &self,
        tenant: &str,
        id: u64,
        kind: MemoryKind,
    ) -> MemoryResult<Option<MemoryItem>> {
        let item = match kind {
            MemoryKind::Event => self.events.get(tenant, id).await?.map(MemoryItem::Event),
            MemoryKind::Summary => self.summaries.get(tenant, id).await?.map(MemoryItem::Summary),
        };
        Ok(item)
    }

    /// Replace the content of one memory item.
    ///
    /// Gated by the policy's edit permission; denial returns `Ok(false)`
    /// without touching anything. For summaries the replacement text is
    /// embedded first (fatal on failure, before any store mutation) and the
    /// index is re-upserted only after the store confirms the row existed.
    #[instrument(skip(self, content), fields(tenant = %tenant, id, kind = %kind))]
    pub async fn update_item(
        &self,
        tenant: &str,
        id: u64,
        kind: MemoryKind,
        content: &str,
    ) -> MemoryResult<bool> {
        if !self.policy.allow_edit(tenant, kind) {
            debug!("edit denied by policy");
            return Ok(false);
        }

        match kind {
            MemoryKind::Event => {
                let lock = self.tenant_locks.for_tenant(tenant);
                let _guard = lock.lock().await;
                Ok(self.events.update_content(tenant, id, content).await?)
            }
            MemoryKind::Summary => {
                let vector = self.embed_bounded(content).await?;

                let lock = self.tenant_locks.for_tenant(tenant);
                let _guard = lock.lock().await;

                let updated = self.summaries.update_content(tenant, id, content).await?;
                if updated {
                    self.index
                        .upsert(VectorKey::new(tenant, MemoryKind::Summary, id), &vector)?;
                }
                Ok(updated)
            }
        }
    }

    /// Delete one memory item. The store delete runs first; the index entry
    /// is removed only once the store confirms the row existed.
    #[instrument(skip(self), fields(tenant = %tenant, id, kind = %kind))]
    pub async fn delete_item(&self, tenant: &str, id: u64, kind: MemoryKind) -> MemoryResult<bool> {
        let lock = self.tenant_locks.for_tenant(tenant);
        let _guard = lock.lock().await;

        let deleted = match kind {
            MemoryKind::Event => self.events.delete(tenant, id).await?,
            MemoryKind::Summary => {
                let deleted = self.summaries.delete(tenant, id).await?;
                if deleted {
                    self.index
                        .remove(&VectorKey::new(tenant, MemoryKind::Summary, id));
                }
                deleted
            }
        };
        debug!(deleted, "delete item");
        Ok(deleted)
    }

    /// Delete every event and summary older than the cutoff, returning the
    /// total row count.
    ///
    /// Index entries for purged summaries are left stale on purpose: `get_many`
    /// filters them out of search results, and [`Self::reconcile_index`]
    /// removes them in bulk. This is the one place store and index are allowed
    /// to disagree, and the disagreement is never caller-visible.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn purge_before(&self, tenant: &str, cutoff: DateTime<Utc>) -> MemoryResult<u64> {
        let lock = self.tenant_locks.for_tenant(tenant);
        let _guard = lock.lock().await;

        let events = self.events.delete_older_than(tenant, cutoff).await?;
        let summaries = self.summaries.delete_older_than(tenant, cutoff).await?;

        info!(events, summaries, %cutoff, "purged aged memory");
        Ok(events + summaries)
    }

    /// Purge everything older than the policy's retention horizon.
    pub async fn purge_expired(&self, tenant: &str) -> MemoryResult<u64> {
        let cutoff = Utc::now() - self.policy.retention(tenant);
        self.purge_before(tenant, cutoff).await
    }

    /// Sweep the tenant's live index entries and logically remove any whose
    /// row no longer resolves in the summary store. Returns the number
    /// removed. Run after bulk purges to reclaim the stale set.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn reconcile_index(&self, tenant: &str) -> MemoryResult<u64> {
        let live = self.index.live_row_ids(tenant, MemoryKind::Summary);
        if live.is_empty() {
            return Ok(0);
        }

        let resolvable: HashSet<u64> = self
            .summaries
            .get_many(tenant, &live)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();

        let mut removed = 0;
        for row_id in live {
            if !resolvable.contains(&row_id) {
                self.index
                    .remove(&VectorKey::new(tenant, MemoryKind::Summary, row_id));
                removed += 1;
            }
        }
        info!(removed, "index reconciled");
        Ok(removed)
    }

    /// Erase every trace of a tenant: both stores, the admission counter,
    /// and the index. Unlike purge, no stale index entries survive.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn erase_tenant(&self, tenant: &str) -> MemoryResult<u64> {
        let (events, summaries, vectors) = {
            let lock = self.tenant_locks.for_tenant(tenant);
            let _guard = lock.lock().await;

            let events = self.events.clear(tenant).await?;
            let summaries = self.summaries.clear(tenant).await?;
            self.ledger.reset(tenant).await?;
            let vectors = self.index.clear_tenant(tenant);
            (events, summaries, vectors)
        };
        // The tenant is gone; keeping its mutex around would leak one entry
        // per erased tenant in a long-lived process.
        self.tenant_locks.release(tenant);

        info!(events, summaries, vectors, "tenant erased");
        Ok(events + summaries)
    }
}
