//! Gating policy: pure decision functions for admission, promotion, edit
//! permission, and retention.
//!
//! Policies are side-effect free; the coordinator supplies the durable
//! admitted-event counter and acts on the answers.

use std::collections::HashSet;

use chrono::Duration;
use engram_state::MemoryKind;

/// Decision surface consulted by the coordinator.
pub trait GatingPolicy: Send + Sync {
    /// Should this raw turn be persisted as event memory at all?
    fn admit_event(&self, tenant: &str, content: &str) -> bool;

    /// Is a promotion pass due after the given admitted-event count?
    ///
    /// The count comes from the durable admission ledger, so later deletions
    /// of the events themselves never change the answer for a count already
    /// reached.
    fn promotion_due(&self, tenant: &str, admitted_count: u64) -> bool;

    /// May the caller edit memory of this kind for this tenant?
    fn allow_edit(&self, tenant: &str, kind: MemoryKind) -> bool;

    /// Retention horizon consumed by age-based purge.
    fn retention(&self, tenant: &str) -> Duration;
}

/// Default policy: length/stop-list admission, interval-based promotion,
/// edits permitted unless denied per tenant or per kind, 7-day retention.
#[derive(Debug, Clone)]
pub struct DefaultGatingPolicy {
    min_content_len: usize,
    stop_list: HashSet<String>,
    promotion_interval: u64,
    retention_days: i64,
    edit_denied_tenants: HashSet<String>,
    edit_denied_kinds: HashSet<MemoryKind>,
}

impl Default for DefaultGatingPolicy {
    fn default() -> Self {
        let stop_list = ["ok", "okay", "yes", "no", "thanks", "hello", "hmm"]
            .into_iter()
            .map(str::to_string)
            .collect();
        Self {
            min_content_len: 5,
            stop_list,
            promotion_interval: 10,
            retention_days: 7,
            edit_denied_tenants: HashSet::new(),
            edit_denied_kinds: HashSet::new(),
        }
    }
}

impl DefaultGatingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum trimmed content length for admission.
    pub fn with_min_content_len(mut self, len: usize) -> Self {
        self.min_content_len = len;
        self
    }

    /// Replace the low-information stop-list (matched lowercased, trimmed).
    pub fn with_stop_list<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_list = words.into_iter().map(|w| w.into().to_lowercase()).collect();
        self
    }

    /// Promote every `interval` admitted events. 0 disables promotion.
    pub fn with_promotion_interval(mut self, interval: u64) -> Self {
        self.promotion_interval = interval;
        self
    }

    /// Retention horizon in days.
    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    /// Deny edits for one tenant.
    pub fn deny_edits_for_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.edit_denied_tenants.insert(tenant.into());
        self
    }

    /// Deny edits for one memory kind.
    pub fn deny_edits_for_kind(mut self, kind: MemoryKind) -> Self {
        self.edit_denied_kinds.insert(kind);
        self
    }
}

impl GatingPolicy for DefaultGatingPolicy {
    fn admit_event(&self, _tenant: &str, content: &str) -> bool {
        let trimmed = content.trim();
        if trimmed.chars().count() < self.min_content_len {
            return false;
        }
        !self.stop_list.contains(&trimmed.to_lowercase())
    }

    fn promotion_due(&self, _tenant: &str, admitted_count: u64) -> bool {
        self.promotion_interval > 0
            && admitted_count > 0
            && admitted_count % self.promotion_interval == 0
    }

    fn allow_edit(&self, tenant: &str, kind: MemoryKind) -> bool {
        !self.edit_denied_tenants.contains(tenant) && !self.edit_denied_kinds.contains(&kind)
    }

    fn retention(&self, _tenant: &str) -> Duration {
        Duration::days(self.retention_days)
    }
}
