//! Engram-State: durable storage for the hybrid memory subsystem.
//!
//! This crate provides the persistence layer for Engram. It defines the
//! record types and tenant-scoped storage traits, ships in-memory fakes for
//! testing, and implements the traits on SurrealDB.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: tenant isolation at the row level, durable ids, and the admission
//! sequence that promotion decisions depend on.
//!
//! ## Key Components
//!
//! - `EventStore` / `SummaryStore`: tenant-scoped CRUD over the two memory
//!   tables
//! - `AdmissionLedger`: durable per-tenant admitted-event counter
//! - `SurrealMemoryStore`: one SurrealDB handle implementing all three

mod error;
pub mod fakes;
mod records;
mod store;
mod surreal;

pub use error::{StorageError, StorageResult};
pub use records::{EventRecord, InvalidKind, MemoryKind, Role, SummaryRecord};
pub use store::{AdmissionLedger, EventStore, SummaryStore};
pub use surreal::SurrealMemoryStore;
