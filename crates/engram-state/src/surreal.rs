//! SurrealDB-backed implementation of the storage traits.
//!
//! One connection handle implements `EventStore`, `SummaryStore`, and
//! `AdmissionLedger`. Numeric row ids come from durable `counter` records so
//! they are unique per store and survive restarts; the admission ledger is a
//! separate counter record per tenant, deliberately independent of row
//! counts.
//!
//! Supports the in-memory engine (`connect_memory`, used by tests and local
//! runs) and any URL the `any` engine accepts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::{StorageError, StorageResult};
use crate::records::{EventRecord, Role, SummaryRecord};
use crate::store::{AdmissionLedger, EventStore, SummaryStore};

const EVENT_TABLE: &str = "event_memory";
const SUMMARY_TABLE: &str = "summary_memory";
const EVENT_SEQ: &str = "event_ids";
const SUMMARY_SEQ: &str = "summary_ids";

/// SurrealDB connection handle for the memory subsystem.
#[derive(Clone)]
pub struct SurrealMemoryStore {
    db: Surreal<Any>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbEventRecord {
    mem_id: u64,
    tenant: String,
    content: String,
    role: Role,
    created_at: SurrealDatetime,
}

impl DbEventRecord {
    fn into_record(self) -> EventRecord {
        EventRecord {
            id: self.mem_id,
            tenant: self.tenant,
            content: self.content,
            role: self.role,
            created_at: DateTime::<Utc>::from(self.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbSummaryRecord {
    mem_id: u64,
    tenant: String,
    content: String,
    metadata: serde_json::Value,
    created_at: SurrealDatetime,
}

impl DbSummaryRecord {
    fn into_record(self) -> SummaryRecord {
        SummaryRecord {
            id: self.mem_id,
            tenant: self.tenant,
            content: self.content,
            metadata: self.metadata,
            created_at: DateTime::<Utc>::from(self.created_at),
        }
    }
}

impl SurrealMemoryStore {
    /// Connect to SurrealDB in-memory and set up the schema.
    #[instrument(skip_all)]
    pub async fn connect_memory() -> StorageResult<Self> {
        info!("Connecting to SurrealDB (in-memory)");
        Self::connect("mem://").await
    }

    /// Connect to any SurrealDB endpoint the `any` engine accepts and set up
    /// the schema.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        db.use_ns("engram")
            .use_db("memory")
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = SurrealMemoryStore { db };
        store.init_schema().await?;

        info!("SurrealDB connected and schema initialized");
        Ok(store)
    }

    /// Define the memory tables and tenant indexes. Idempotent.
    async fn init_schema(&self) -> StorageResult<()> {
        debug!("Initializing memory tables");

        let sql = r#"
            DEFINE TABLE IF NOT EXISTS event_memory SCHEMALESS;
            DEFINE INDEX IF NOT EXISTS idx_event_tenant ON TABLE event_memory COLUMNS tenant;
            DEFINE INDEX IF NOT EXISTS idx_event_tenant_id ON TABLE event_memory COLUMNS tenant, mem_id UNIQUE;

            DEFINE TABLE IF NOT EXISTS summary_memory SCHEMALESS;
            DEFINE INDEX IF NOT EXISTS idx_summary_tenant ON TABLE summary_memory COLUMNS tenant;
            DEFINE INDEX IF NOT EXISTS idx_summary_tenant_id ON TABLE summary_memory COLUMNS tenant, mem_id UNIQUE;

            DEFINE TABLE IF NOT EXISTS counter SCHEMALESS;
        "#;

        self.db
            .query(sql)
            .await
            .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;

        Ok(())
    }

    /// Bump a named durable counter and return the new value.
    async fn next_seq(&self, name: &str) -> StorageResult<u64> {
        let name = name.to_string();
        let mut result = self
            .db
            .query("UPSERT type::thing('counter', $name) SET value += 1 RETURN VALUE value")
            .bind(("name", name))
            .await?;
        let values: Vec<u64> = result.take(0)?;
        values
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::Transaction("counter bump returned no value".to_string()))
    }
}

#[async_trait]
impl EventStore for SurrealMemoryStore {
    #[instrument(skip(self, content), fields(tenant = %tenant))]
    async fn insert(&self, tenant: &str, content: &str, role: Role) -> StorageResult<u64> {
        let mem_id = self.next_seq(EVENT_SEQ).await?;
        let record = DbEventRecord {
            mem_id,
            tenant: tenant.to_string(),
            content: content.to_string(),
            role,
            created_at: SurrealDatetime::from(Utc::now()),
        };
        let created: Option<DbEventRecord> = self.db.create(EVENT_TABLE).content(record).await?;
        created
            .map(|r| r.mem_id)
            .ok_or_else(|| StorageError::Transaction("event insert returned nothing".to_string()))
    }

    async fn get(&self, tenant: &str, id: u64) -> StorageResult<Option<EventRecord>> {
        let mut result = self
            .db
            .query("SELECT * FROM event_memory WHERE tenant = $tenant AND mem_id = $id")
            .bind(("tenant", tenant.to_string()))
            .bind(("id", id))
            .await?;
        let rows: Vec<DbEventRecord> = result.take(0)?;
        Ok(rows.into_iter().next().map(DbEventRecord::into_record))
    }

    async fn list_recent(&self, tenant: &str, limit: usize) -> StorageResult<Vec<EventRecord>> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM event_memory WHERE tenant = $tenant \
                 ORDER BY created_at DESC, mem_id DESC LIMIT $limit",
            )
            .bind(("tenant", tenant.to_string()))
            .bind(("limit", limit as i64))
            .await?;
        let rows: Vec<DbEventRecord> = result.take(0)?;
        Ok(rows.into_iter().map(DbEventRecord::into_record).collect())
    }

    async fn search(&self, tenant: &str, substring: &str) -> StorageResult<Vec<EventRecord>> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM event_memory WHERE tenant = $tenant \
                 AND string::contains(content, $q) \
                 ORDER BY created_at DESC, mem_id DESC",
            )
            .bind(("tenant", tenant.to_string()))
            .bind(("q", substring.to_string()))
            .await?;
        let rows: Vec<DbEventRecord> = result.take(0)?;
        Ok(rows.into_iter().map(DbEventRecord::into_record).collect())
    }

    async fn update_content(&self, tenant: &str, id: u64, content: &str) -> StorageResult<bool> {
        let mut result = self
            .db
            .query(
                "UPDATE event_memory SET content = $content \
                 WHERE tenant = $tenant AND mem_id = $id RETURN AFTER",
            )
            .bind(("content", content.to_string()))
            .bind(("tenant", tenant.to_string()))
            .bind(("id", id))
            .await?;
        let rows: Vec<DbEventRecord> = result.take(0)?;
        Ok(!rows.is_empty())
    }

    async fn delete(&self, tenant: &str, id: u64) -> StorageResult<bool> {
        let mut result = self
            .db
            .query(
                "DELETE FROM event_memory WHERE tenant = $tenant AND mem_id = $id RETURN BEFORE",
            )
            .bind(("tenant", tenant.to_string()))
            .bind(("id", id))
            .await?;
        let rows: Vec<DbEventRecord> = result.take(0)?;
        Ok(!rows.is_empty())
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    async fn delete_older_than(&self, tenant: &str, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let mut result = self
            .db
            .query(
                "DELETE FROM event_memory WHERE tenant = $tenant \
                 AND created_at < $cutoff RETURN BEFORE",
            )
            .bind(("tenant", tenant.to_string()))
            .bind(("cutoff", SurrealDatetime::from(cutoff)))
            .await?;
        let rows: Vec<DbEventRecord> = result.take(0)?;
        debug!(count = rows.len(), "purged aged events");
        Ok(rows.len() as u64)
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    async fn clear(&self, tenant: &str) -> StorageResult<u64> {
        let mut result = self
            .db
            .query("DELETE FROM event_memory WHERE tenant = $tenant RETURN BEFORE")
            .bind(("tenant", tenant.to_string()))
            .await?;
        let rows: Vec<DbEventRecord> = result.take(0)?;
        Ok(rows.len() as u64)
    }
}

#[async_trait]
impl SummaryStore for SurrealMemoryStore {
    #[instrument(skip(self, content, metadata), fields(tenant = %tenant))]
    async fn insert(
        &self,
        tenant: &str,
        content: &str,
        metadata: serde_json::Value,
    ) -> StorageResult<u64> {
        let mem_id = self.next_seq(SUMMARY_SEQ).await?;
        let record = DbSummaryRecord {
            mem_id,
            tenant: tenant.to_string(),
            content: content.to_string(),
            metadata,
            created_at: SurrealDatetime::from(Utc::now()),
        };
        let created: Option<DbSummaryRecord> =
            self.db.create(SUMMARY_TABLE).content(record).await?;
        created
            .map(|r| r.mem_id)
            .ok_or_else(|| StorageError::Transaction("summary insert returned nothing".to_string()))
    }

    async fn get(&self, tenant: &str, id: u64) -> StorageResult<Option<SummaryRecord>> {
        let mut result = self
            .db
            .query("SELECT * FROM summary_memory WHERE tenant = $tenant AND mem_id = $id")
            .bind(("tenant", tenant.to_string()))
            .bind(("id", id))
            .await?;
        let rows: Vec<DbSummaryRecord> = result.take(0)?;
        Ok(rows.into_iter().next().map(DbSummaryRecord::into_record))
    }

    async fn list_recent(&self, tenant: &str, limit: usize) -> StorageResult<Vec<SummaryRecord>> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM summary_memory WHERE tenant = $tenant \
                 ORDER BY created_at DESC, mem_id DESC LIMIT $limit",
            )
            .bind(("tenant", tenant.to_string()))
            .bind(("limit", limit as i64))
            .await?;
        let rows: Vec<DbSummaryRecord> = result.take(0)?;
        Ok(rows.into_iter().map(DbSummaryRecord::into_record).collect())
    }

    async fn get_many(&self, tenant: &str, ids: &[u64]) -> StorageResult<Vec<SummaryRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut result = self
            .db
            .query("SELECT * FROM summary_memory WHERE tenant = $tenant AND mem_id IN $ids")
            .bind(("tenant", tenant.to_string()))
            .bind(("ids", ids.to_vec()))
            .await?;
        let rows: Vec<DbSummaryRecord> = result.take(0)?;
        // Re-impose the requested order so ranked search results stay ranked.
        let mut by_id: std::collections::HashMap<u64, SummaryRecord> = rows
            .into_iter()
            .map(DbSummaryRecord::into_record)
            .map(|r| (r.id, r))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn search(&self, tenant: &str, substring: &str) -> StorageResult<Vec<SummaryRecord>> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM summary_memory WHERE tenant = $tenant \
                 AND string::contains(content, $q) \
                 ORDER BY created_at DESC, mem_id DESC",
            )
            .bind(("tenant", tenant.to_string()))
            .bind(("q", substring.to_string()))
            .await?;
        let rows: Vec<DbSummaryRecord> = result.take(0)?;
        Ok(rows.into_iter().map(DbSummaryRecord::into_record).collect())
    }

    async fn update_content(&self, tenant: &str, id: u64, content: &str) -> StorageResult<bool> {
        let mut result = self
            .db
            .query(
                "UPDATE summary_memory SET content = $content \
                 WHERE tenant = $tenant AND mem_id = $id RETURN AFTER",
            )
            .bind(("content", content.to_string()))
            .bind(("tenant", tenant.to_string()))
            .bind(("id", id))
            .await?;
        let rows: Vec<DbSummaryRecord> = result.take(0)?;
        Ok(!rows.is_empty())
    }

    async fn delete(&self, tenant: &str, id: u64) -> StorageResult<bool> {
        let mut result = self
            .db
            .query(
                "DELETE FROM summary_memory WHERE tenant = $tenant AND mem_id = $id RETURN BEFORE",
            )
            .bind(("tenant", tenant.to_string()))
            .bind(("id", id))
            .await?;
        let rows: Vec<DbSummaryRecord> = result.take(0)?;
        Ok(!rows.is_empty())
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    async fn delete_older_than(&self, tenant: &str, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let mut result = self
            .db
            .query(
                "DELETE FROM summary_memory WHERE tenant = $tenant \
                 AND created_at < $cutoff RETURN BEFORE",
            )
            .bind(("tenant", tenant.to_string()))
            .bind(("cutoff", SurrealDatetime::from(cutoff)))
            .await?;
        let rows: Vec<DbSummaryRecord> = result.take(0)?;
        debug!(count = rows.len(), "purged aged summaries");
        Ok(rows.len() as u64)
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    async fn clear(&self, tenant: &str) -> StorageResult<u64> {
        let mut result = self
            .db
            .query("DELETE FROM summary_memory WHERE tenant = $tenant RETURN BEFORE")
            .bind(("tenant", tenant.to_string()))
            .await?;
        let rows: Vec<DbSummaryRecord> = result.take(0)?;
        Ok(rows.len() as u64)
    }
}

#[async_trait]
impl AdmissionLedger for SurrealMemoryStore {
    async fn next_admitted(&self, tenant: &str) -> StorageResult<u64> {
        self.next_seq(&format!("admitted:{tenant}")).await
    }

    async fn admitted_count(&self, tenant: &str) -> StorageResult<u64> {
        let name = format!("admitted:{tenant}");
        let mut result = self
            .db
            .query("SELECT VALUE value FROM type::thing('counter', $name)")
            .bind(("name", name))
            .await?;
        let values: Vec<u64> = result.take(0)?;
        Ok(values.into_iter().next().unwrap_or(0))
    }

    async fn reset(&self, tenant: &str) -> StorageResult<()> {
        let name = format!("admitted:{tenant}");
        self.db
            .query("DELETE type::thing('counter', $name)")
            .bind(("name", name))
            .await?;
        Ok(())
    }
}
