//! Record types shared across the memory subsystem.
//!
//! Every record carries its tenant; the tenant string is the sole isolation
//! boundary and is never inferred from context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Discriminator separating raw event memory from condensed summary memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Event,
    Summary,
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event => write!(f, "event"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

/// An unrecognized memory-kind discriminator.
///
/// Produced by [`MemoryKind::from_str`] before any side effect, so a caller
/// handing over a bad kind string never reaches a store or the index.
#[derive(Debug, Clone, Error)]
#[error("unrecognized memory kind: {0}")]
pub struct InvalidKind(pub String);

impl std::str::FromStr for MemoryKind {
    type Err = InvalidKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" => Ok(Self::Event),
            "summary" => Ok(Self::Summary),
            other => Err(InvalidKind(other.to_string())),
        }
    }
}

/// A raw conversation turn in the per-tenant event log.
///
/// `content` is mutable via edit; `id`, `role`, and `created_at` are fixed at
/// insert time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: u64,
    pub tenant: String,
    pub content: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A condensed fact in the per-tenant summary (archival) store.
///
/// `metadata` is an opaque blob the store never interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub id: u64,
    pub tenant: String,
    pub content: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
