//! Flat inner-product vector index with logical deletion.
//!
//! Vectors are L2-normalized on insert so inner product equals cosine
//! similarity. The underlying slot array only ever grows: deletion removes
//! the handle mapping, never the vector, matching the behavior of flat
//! approximate indexes that cannot reclaim storage. Handles increase
//! monotonically and are never reused, so a stale search candidate can never
//! alias a newer entry.
//!
//! Index growth is bounded by reconciliation: the coordinator's
//! `reconcile_index` sweep drops mappings whose rows are gone, and a caller
//! can rebuild by constructing a fresh index and re-embedding live rows.

use std::collections::HashMap;
use std::sync::RwLock;

use engram_state::MemoryKind;
use thiserror::Error;
use tracing::debug;

/// Default embedding dimension, matching common text-embedding models.
pub const DEFAULT_DIMENSION: usize = 768;

/// Candidate over-fetch multiplier, absorbing candidates that are later
/// filtered out by tenant/kind mismatch or stale handles.
const OVERFETCH_FACTOR: usize = 3;

/// Errors produced by index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector has zero norm and cannot be normalized")]
    ZeroVector,
}

/// Namespaced identity of one vector: the tenant, the memory kind, and the
/// durable row id of the record it embeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VectorKey {
    pub tenant: String,
    pub kind: MemoryKind,
    pub row_id: u64,
}

impl VectorKey {
    pub fn new(tenant: impl Into<String>, kind: MemoryKind, row_id: u64) -> Self {
        Self {
            tenant: tenant.into(),
            kind,
            row_id,
        }
    }
}

#[derive(Debug, Default)]
struct IndexInner {
    /// Slot storage; the slot position is the handle. Never shrinks.
    vectors: Vec<Vec<f32>>,
    handle_to_key: HashMap<u64, VectorKey>,
    key_to_handle: HashMap<VectorKey, u64>,
}

/// Tenant-isolated similarity index over normalized vectors.
///
/// Reads take a shared lock and may run concurrently; every mutation is a
/// single exclusive-lock section, so an overlapping read observes either the
/// pre- or post-state, never a partial one.
pub struct VectorIndex {
    dim: usize,
    inner: RwLock<IndexInner>,
}

impl VectorIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            inner: RwLock::new(IndexInner::default()),
        }
    }

    /// The fixed dimension every stored and query vector must have.
    pub fn dimension(&self) -> usize {
        self.dim
    }

    fn normalized(&self, vector: &[f32]) -> Result<Vec<f32>, IndexError> {
        if vector.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return Err(IndexError::ZeroVector);
        }
        Ok(vector.iter().map(|x| x / norm).collect())
    }

    /// Insert or replace the vector for a key, returning the new handle.
    ///
    /// If the key already has a live handle it is logically removed first, so
    /// at most one live handle exists per key.
    pub fn upsert(&self, key: VectorKey, vector: &[f32]) -> Result<u64, IndexError> {
        let normalized = self.normalized(vector)?;
        let mut inner = self.inner.write().unwrap();

        if let Some(old) = inner.key_to_handle.remove(&key) {
            inner.handle_to_key.remove(&old);
            debug!(handle = old, row_id = key.row_id, "replaced live handle");
        }

        let handle = inner.vectors.len() as u64;
        inner.vectors.push(normalized);
        inner.handle_to_key.insert(handle, key.clone());
        inner.key_to_handle.insert(key, handle);
        Ok(handle)
    }

    /// Similarity search over live entries of one (tenant, kind) namespace.
    ///
    /// Returns up to `k` row ids, most similar first, ties broken by smaller
    /// row id. Returns fewer than `k` when fewer live matches exist; never
    /// pads. Every returned id resolved to a live mapping at filter time.
    pub fn search(
        &self,
        tenant: &str,
        kind: MemoryKind,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<u64>, IndexError> {
        let query = self.normalized(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let inner = self.inner.read().unwrap();

        // Score every slot, live or orphaned, the way a flat index would.
        let mut candidates: Vec<(u64, f32)> = inner
            .vectors
            .iter()
            .enumerate()
            .map(|(slot, v)| {
                let score: f32 = v.iter().zip(query.iter()).map(|(a, b)| a * b).sum();
                (slot as u64, score)
            })
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        candidates.truncate(k.saturating_mul(OVERFETCH_FACTOR));

        // Drop stale handles and foreign namespaces, then rank what is left.
        let mut hits: Vec<(u64, f32)> = candidates
            .into_iter()
            .filter_map(|(handle, score)| {
                let key = inner.handle_to_key.get(&handle)?;
                (key.tenant == tenant && key.kind == kind).then_some((key.row_id, score))
            })
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        hits.truncate(k);

        Ok(hits.into_iter().map(|(row_id, _)| row_id).collect())
    }

    /// Logically delete the vector for a key. Idempotent; the slot is
    /// retained but can never be returned again.
    pub fn remove(&self, key: &VectorKey) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.key_to_handle.remove(key) {
            Some(handle) => {
                inner.handle_to_key.remove(&handle);
                true
            }
            None => false,
        }
    }

    /// Logically delete every live handle for a tenant, atomically with
    /// respect to concurrent searches. Returns the number removed.
    pub fn clear_tenant(&self, tenant: &str) -> usize {
        let mut inner = self.inner.write().unwrap();
        let doomed: Vec<VectorKey> = inner
            .key_to_handle
            .keys()
            .filter(|key| key.tenant == tenant)
            .cloned()
            .collect();
        for key in &doomed {
            if let Some(handle) = inner.key_to_handle.remove(key) {
                inner.handle_to_key.remove(&handle);
            }
        }
        debug!(tenant = %tenant, removed = doomed.len(), "cleared tenant vectors");
        doomed.len()
    }

    /// Whether a key currently has a live handle.
    pub fn contains(&self, key: &VectorKey) -> bool {
        self.inner.read().unwrap().key_to_handle.contains_key(key)
    }

    /// Number of live mappings.
    pub fn live_len(&self) -> usize {
        self.inner.read().unwrap().key_to_handle.len()
    }

    /// Number of occupied slots, live plus logically deleted. Monotonically
    /// increasing; the gap to `live_len` is the reclaimable growth.
    pub fn slot_count(&self) -> usize {
        self.inner.read().unwrap().vectors.len()
    }

    /// Row ids of every live entry in one (tenant, kind) namespace. Used by
    /// index reconciliation after bulk purges.
    pub fn live_row_ids(&self, tenant: &str, kind: MemoryKind) -> Vec<u64> {
        let inner = self.inner.read().unwrap();
        let mut ids: Vec<u64> = inner
            .key_to_handle
            .keys()
            .filter(|key| key.tenant == tenant && key.kind == kind)
            .map(|key| key.row_id)
            .collect();
        ids.sort_unstable();
        ids
    }
}
