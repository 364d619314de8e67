//! End-to-end coordinator scenarios over the in-memory fakes, with one suite
//! at the bottom wiring the same flows over the SurrealDB backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use engram_core::{
    CoordinatorConfig, DefaultGatingPolicy, MemoryCoordinator, MemoryError, MemoryItem,
    MemoryKind, MemoryProcessor, ProcessorError, RecordOutcome, Role, VectorIndex,
};
use engram_state::fakes::{MemoryAdmissionLedger, MemoryEventStore, MemorySummaryStore};
use engram_state::{AdmissionLedger, EventStore, SummaryStore};

const DIM: usize = 4;

/// Embeds by keyword presence, one axis per topic, so similarity ranking in
/// tests is meaningful and deterministic. A trailing bias component keeps
/// vectors away from zero norm.
struct KeywordProcessor {
    fail: AtomicBool,
}

impl KeywordProcessor {
    fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
        }
    }

    fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MemoryProcessor for KeywordProcessor {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProcessorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProcessorError::Embed("injected failure".into()));
        }
        let lower = text.to_lowercase();
        let feature = |word: &str| if lower.contains(word) { 1.0 } else { 0.0 };
        Ok(vec![
            feature("cat"),
            feature("paris"),
            feature("weather"),
            0.01,
        ])
    }

    async fn summarize(&self, turns: &[String]) -> Result<String, ProcessorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProcessorError::Summarize("injected failure".into()));
        }
        Ok(format!("Summary of {} turns: {}", turns.len(), turns.join(" | ")))
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

/// Embeds slower than any test timeout allows.
struct StalledProcessor;

#[async_trait]
impl MemoryProcessor for StalledProcessor {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProcessorError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(vec![0.0; DIM])
    }

    async fn summarize(&self, _turns: &[String]) -> Result<String, ProcessorError> {
        Ok(String::new())
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

struct Harness {
    coordinator: MemoryCoordinator,
    events: Arc<MemoryEventStore>,
    summaries: Arc<MemorySummaryStore>,
    ledger: Arc<MemoryAdmissionLedger>,
    index: Arc<VectorIndex>,
    processor: Arc<KeywordProcessor>,
}

fn harness_with_policy(policy: DefaultGatingPolicy) -> Harness {
    let events = Arc::new(MemoryEventStore::new());
    let summaries = Arc::new(MemorySummaryStore::new());
    let ledger = Arc::new(MemoryAdmissionLedger::new());
    let index = Arc::new(VectorIndex::new(DIM));
    let processor = Arc::new(KeywordProcessor::new());

    let coordinator = MemoryCoordinator::new(
        events.clone(),
        summaries.clone(),
        ledger.clone(),
        index.clone(),
        Arc::new(policy),
        processor.clone(),
        CoordinatorConfig::default(),
    );

    Harness {
        coordinator,
        events,
        summaries,
        ledger,
        index,
        processor,
    }
}

fn harness() -> Harness {
    harness_with_policy(DefaultGatingPolicy::default())
}

fn summary_contents(items: &[MemoryItem]) -> Vec<&str> {
    items
        .iter()
        .filter(|i| i.kind() == MemoryKind::Summary)
        .map(|i| i.content())
        .collect()
}

#[tokio::test]
async fn test_cats_and_paris_hybrid_retrieval() {
    let h = harness();

    let outcome = h
        .coordinator
        .record_event("t1", "I love cats very much", Role::User)
        .await
        .unwrap();
    assert!(matches!(outcome, RecordOutcome::Admitted { .. }));
    h.coordinator
        .record_event("t1", "I moved to Paris last spring", Role::User)
        .await
        .unwrap();

    h.coordinator
        .insert_summary("t1", "User loves cats", serde_json::json!({}))
        .await
        .unwrap();
    h.coordinator
        .insert_summary("t1", "User lives in Paris", serde_json::json!({}))
        .await
        .unwrap();

    let hits = h.coordinator.hybrid_search("t1", "cats").await.unwrap();

    let event_hits: Vec<&str> = hits
        .iter()
        .filter(|i| i.kind() == MemoryKind::Event)
        .map(|i| i.content())
        .collect();
    assert_eq!(event_hits, vec!["I love cats very much"]);

    // Vector arm ranks the cats summary above the Paris one.
    let summaries = summary_contents(&hits);
    assert_eq!(summaries.first(), Some(&"User loves cats"));
}

#[tokio::test]
async fn test_rejected_turn_writes_nothing() {
    let h = harness();

    let outcome = h.coordinator.record_event("t1", "ok", Role::User).await.unwrap();
    assert_eq!(outcome, RecordOutcome::Rejected);

    assert!(h.events.list_recent("t1", 10).await.unwrap().is_empty());
    assert_eq!(h.ledger.admitted_count("t1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_promotion_due_at_multiples_despite_deletions() {
    let h = harness();

    let mut boundaries = Vec::new();
    let mut first_batch_ids = Vec::new();
    for i in 0..10 {
        let outcome = h
            .coordinator
            .record_event("t1", &format!("substantive turn number {i}"), Role::User)
            .await
            .unwrap();
        if let RecordOutcome::Admitted { id, promotion_due } = outcome {
            first_batch_ids.push(id);
            if promotion_due {
                boundaries.push(h.ledger.admitted_count("t1").await.unwrap());
            }
        }
    }
    assert_eq!(boundaries, vec![10]);

    // Deleting admitted events must not rewind the counter.
    for id in &first_batch_ids[..5] {
        assert!(h
            .coordinator
            .delete_item("t1", *id, MemoryKind::Event)
            .await
            .unwrap());
    }

    for i in 10..20 {
        let outcome = h
            .coordinator
            .record_event("t1", &format!("substantive turn number {i}"), Role::User)
            .await
            .unwrap();
        if let RecordOutcome::Admitted { promotion_due, .. } = outcome {
            if promotion_due {
                boundaries.push(h.ledger.admitted_count("t1").await.unwrap());
            }
        }
    }
    assert_eq!(boundaries, vec![10, 20]);
}

#[tokio::test]
async fn test_run_promotion_archives_indexed_summary() {
    let h = harness();

    h.coordinator
        .record_event("t1", "my cat is named Felix", Role::User)
        .await
        .unwrap();
    h.coordinator
        .record_event("t1", "what a lovely cat name", Role::Assistant)
        .await
        .unwrap();

    let id = h.coordinator.run_promotion("t1").await.unwrap();
    let id = id.unwrap();

    let record = h.summaries.get("t1", id).await.unwrap().unwrap();
    assert!(record.content.contains("2 turns"));
    assert_eq!(record.metadata["source"], "promotion");
    assert_eq!(record.metadata["window"], 2);
    assert_eq!(h.index.live_row_ids("t1", MemoryKind::Summary), vec![id]);
}

#[tokio::test]
async fn test_run_promotion_with_no_events_is_none() {
    let h = harness();
    assert_eq!(h.coordinator.run_promotion("t1").await.unwrap(), None);
}

#[tokio::test]
async fn test_embed_failure_degrades_to_keyword_only() {
    let h = harness();

    h.coordinator
        .record_event("t1", "the weather here is awful", Role::User)
        .await
        .unwrap();
    h.coordinator
        .insert_summary("t1", "User complains about weather", serde_json::json!({}))
        .await
        .unwrap();

    h.processor.set_fail(true);
    let hits = h.coordinator.hybrid_search("t1", "weather").await.unwrap();

    assert!(summary_contents(&hits).is_empty());
    assert_eq!(
        hits.iter().filter(|i| i.kind() == MemoryKind::Event).count(),
        1
    );
}

#[tokio::test]
async fn test_embed_failure_is_fatal_for_insert_summary() {
    let h = harness();
    h.processor.set_fail(true);

    let err = h
        .coordinator
        .insert_summary("t1", "User loves cats", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Embedding(_)));

    // Nothing was written anywhere.
    assert!(h.summaries.list_recent("t1", 10).await.unwrap().is_empty());
    assert_eq!(h.index.live_len(), 0);
}

#[tokio::test]
async fn test_embed_timeout_degrades_search_and_mutates_nothing() {
    let events = Arc::new(MemoryEventStore::new());
    let summaries = Arc::new(MemorySummaryStore::new());
    let index = Arc::new(VectorIndex::new(DIM));
    let coordinator = MemoryCoordinator::new(
        events.clone(),
        summaries,
        Arc::new(MemoryAdmissionLedger::new()),
        index.clone(),
        Arc::new(DefaultGatingPolicy::default()),
        Arc::new(StalledProcessor),
        CoordinatorConfig::default().with_embed_timeout(Duration::from_millis(20)),
    );

    events.insert("t1", "talking about cats", Role::User).await.unwrap();

    let hits = coordinator.hybrid_search("t1", "cats").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].kind(), MemoryKind::Event);
    assert_eq!(index.slot_count(), 0);
}

#[tokio::test]
async fn test_edit_denied_by_policy_touches_nothing() {
    let h = harness_with_policy(
        DefaultGatingPolicy::default().deny_edits_for_kind(MemoryKind::Summary),
    );

    let id = h
        .coordinator
        .insert_summary("t1", "User loves cats", serde_json::json!({}))
        .await
        .unwrap();

    let updated = h
        .coordinator
        .update_item("t1", id, MemoryKind::Summary, "User hates cats")
        .await
        .unwrap();
    assert!(!updated);

    let record = h.summaries.get("t1", id).await.unwrap().unwrap();
    assert_eq!(record.content, "User loves cats");
}

#[tokio::test]
async fn test_summary_update_reembeds_for_search() {
    let h = harness();

    let id = h
        .coordinator
        .insert_summary("t1", "User loves cats", serde_json::json!({}))
        .await
        .unwrap();
    h.coordinator
        .insert_summary("t1", "User hates mondays", serde_json::json!({}))
        .await
        .unwrap();

    assert!(h
        .coordinator
        .update_item("t1", id, MemoryKind::Summary, "User moved to Paris")
        .await
        .unwrap());

    let hits = h.coordinator.hybrid_search("t1", "paris").await.unwrap();
    assert_eq!(summary_contents(&hits).first(), Some(&"User moved to Paris"));
}

#[tokio::test]
async fn test_update_missing_summary_leaves_index_alone() {
    let h = harness();

    let updated = h
        .coordinator
        .update_item("t1", 999, MemoryKind::Summary, "ghost content")
        .await
        .unwrap();
    assert!(!updated);
    assert_eq!(h.index.live_len(), 0);
}

#[tokio::test]
async fn test_delete_summary_removes_index_entry() {
    let h = harness();

    let id = h
        .coordinator
        .insert_summary("t1", "User loves cats", serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(h.index.live_len(), 1);

    assert!(h.coordinator.delete_item("t1", id, MemoryKind::Summary).await.unwrap());
    assert_eq!(h.index.live_len(), 0);
    // Idempotent at the coordinator surface too.
    assert!(!h.coordinator.delete_item("t1", id, MemoryKind::Summary).await.unwrap());
}

#[tokio::test]
async fn test_reinserted_summary_gets_fresh_id_and_is_discoverable() {
    let h = harness();

    let first = h
        .coordinator
        .insert_summary("t1", "User loves cats", serde_json::json!({}))
        .await
        .unwrap();
    assert!(h.coordinator.delete_item("t1", first, MemoryKind::Summary).await.unwrap());

    // Identical content comes back under a new id and a new live handle.
    let slots_before = h.index.slot_count();
    let second = h
        .coordinator
        .insert_summary("t1", "User loves cats", serde_json::json!({}))
        .await
        .unwrap();
    assert!(second > first);
    assert_eq!(h.index.live_row_ids("t1", MemoryKind::Summary), vec![second]);
    assert_eq!(h.index.slot_count(), slots_before + 1);

    let hits = h.coordinator.hybrid_search("t1", "cats").await.unwrap();
    let ids: Vec<u64> = hits
        .iter()
        .filter(|i| i.kind() == MemoryKind::Summary)
        .map(|i| i.id())
        .collect();
    assert_eq!(ids, vec![second]);
}

#[tokio::test]
async fn test_purge_leaves_index_stale_but_filtered_then_reconcile() {
    let h = harness();

    h.coordinator
        .insert_summary("t1", "User loves cats", serde_json::json!({}))
        .await
        .unwrap();
    h.coordinator
        .insert_summary("t1", "User lives in Paris", serde_json::json!({}))
        .await
        .unwrap();

    let purged = h
        .coordinator
        .purge_before("t1", Utc::now() + chrono::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(purged, 2);

    // Index entries linger, but resolution filters them out of results.
    assert_eq!(h.index.live_len(), 2);
    let hits = h.coordinator.hybrid_search("t1", "cats").await.unwrap();
    assert!(hits.is_empty());

    assert_eq!(h.coordinator.reconcile_index("t1").await.unwrap(), 2);
    assert_eq!(h.index.live_len(), 0);
    assert_eq!(h.coordinator.reconcile_index("t1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_erase_tenant_leaves_no_trace_and_spares_others() {
    let h = harness();

    for tenant in ["t1", "t2"] {
        h.coordinator
            .record_event(tenant, "I love cats very much", Role::User)
            .await
            .unwrap();
        h.coordinator
            .insert_summary(tenant, "User loves cats", serde_json::json!({}))
            .await
            .unwrap();
    }

    h.coordinator.erase_tenant("t1").await.unwrap();

    assert!(h.coordinator.list_recent("t1", 10).await.unwrap().is_empty());
    assert!(h.coordinator.hybrid_search("t1", "cats").await.unwrap().is_empty());
    assert!(h.index.live_row_ids("t1", MemoryKind::Summary).is_empty());
    assert_eq!(h.ledger.admitted_count("t1").await.unwrap(), 0);

    // The other tenant is untouched.
    assert_eq!(h.coordinator.list_recent("t2", 10).await.unwrap().len(), 2);
    assert!(!h.coordinator.hybrid_search("t2", "cats").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tenants_never_see_each_other() {
    let h = harness();

    h.coordinator
        .record_event("t1", "my cat is named Felix", Role::User)
        .await
        .unwrap();
    h.coordinator
        .insert_summary("t1", "User has a cat named Felix", serde_json::json!({}))
        .await
        .unwrap();

    assert!(h.coordinator.hybrid_search("t2", "cat").await.unwrap().is_empty());
    assert!(h.coordinator.list_recent("t2", 10).await.unwrap().is_empty());
    assert!(h
        .coordinator
        .get_item("t2", 1, MemoryKind::Summary)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_list_recent_interleaves_kinds() {
    let h = harness();

    h.coordinator
        .record_event("t1", "substantive turn one", Role::User)
        .await
        .unwrap();
    h.coordinator
        .insert_summary("t1", "condensed item", serde_json::json!({}))
        .await
        .unwrap();

    let items = h.coordinator.list_recent("t1", 10).await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().any(|i| i.kind() == MemoryKind::Event));
    assert!(items.iter().any(|i| i.kind() == MemoryKind::Summary));
}

mod surreal_backend {
    //! The same coordinator flows over the durable backend.

    use super::*;
    use engram_state::SurrealMemoryStore;

    async fn coordinator() -> (MemoryCoordinator, Arc<VectorIndex>) {
        let store = Arc::new(SurrealMemoryStore::connect_memory().await.unwrap());
        let index = Arc::new(VectorIndex::new(DIM));
        let coordinator = MemoryCoordinator::new(
            store.clone(),
            store.clone(),
            store,
            index.clone(),
            Arc::new(DefaultGatingPolicy::default()),
            Arc::new(KeywordProcessor::new()),
            CoordinatorConfig::default(),
        );
        (coordinator, index)
    }

    #[tokio::test]
    async fn test_record_search_delete_round_trip() {
        let (coordinator, index) = coordinator().await;
        let tenant = uuid::Uuid::new_v4().to_string();

        let outcome = coordinator
            .record_event(&tenant, "I love cats very much", Role::User)
            .await
            .unwrap();
        assert!(matches!(outcome, RecordOutcome::Admitted { .. }));

        let summary_id = coordinator
            .insert_summary(&tenant, "User loves cats", serde_json::json!({}))
            .await
            .unwrap();

        let hits = coordinator.hybrid_search(&tenant, "cats").await.unwrap();
        assert!(hits.iter().any(|i| i.kind() == MemoryKind::Event));
        assert!(hits.iter().any(|i| i.kind() == MemoryKind::Summary));

        assert!(coordinator
            .delete_item(&tenant, summary_id, MemoryKind::Summary)
            .await
            .unwrap());
        assert_eq!(index.live_len(), 0);
    }

    #[tokio::test]
    async fn test_promotion_counter_is_durable_across_deletes() {
        let (coordinator, _index) = coordinator().await;
        let tenant = uuid::Uuid::new_v4().to_string();

        let mut ids = Vec::new();
        let mut due_count = 0;
        for i in 0..10 {
            let outcome = coordinator
                .record_event(&tenant, &format!("substantive turn number {i}"), Role::User)
                .await
                .unwrap();
            if let RecordOutcome::Admitted { id, promotion_due } = outcome {
                ids.push(id);
                if promotion_due {
                    due_count += 1;
                }
            }
        }
        assert_eq!(due_count, 1);

        for id in &ids[..3] {
            coordinator
                .delete_item(&tenant, *id, MemoryKind::Event)
                .await
                .unwrap();
        }

        // The next boundary is still at 20 admissions, not earlier.
        for i in 10..19 {
            let outcome = coordinator
                .record_event(&tenant, &format!("substantive turn number {i}"), Role::User)
                .await
                .unwrap();
            assert!(matches!(
                outcome,
                RecordOutcome::Admitted { promotion_due: false, .. }
            ));
        }
        let last = coordinator
            .record_event(&tenant, "substantive turn number 19", Role::User)
            .await
            .unwrap();
        assert!(matches!(
            last,
            RecordOutcome::Admitted { promotion_due: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_erase_tenant_clears_durable_rows() {
        let (coordinator, index) = coordinator().await;
        let tenant = uuid::Uuid::new_v4().to_string();

        coordinator
            .record_event(&tenant, "I love cats very much", Role::User)
            .await
            .unwrap();
        coordinator
            .insert_summary(&tenant, "User loves cats", serde_json::json!({}))
            .await
            .unwrap();

        let removed = coordinator.erase_tenant(&tenant).await.unwrap();
        assert_eq!(removed, 2);
        assert!(coordinator.list_recent(&tenant, 10).await.unwrap().is_empty());
        assert!(index.live_row_ids(&tenant, MemoryKind::Summary).is_empty());
    }
}
