//! Engram core: hybrid memory for multi-tenant conversational agents.
//!
//! Three retrieval surfaces back one coordinator:
//! - an append-style event log of raw turns (substring retrieval),
//! - a summary store of condensed items (batch resolution),
//! - a flat vector index over summary embeddings (similarity retrieval).
//!
//! The [`coordinator::MemoryCoordinator`] is the only component allowed to
//! write more than one of them, and it always writes the durable store before
//! the index. Admission and promotion decisions come from a pluggable
//! [`policy::GatingPolicy`]; embeddings and summaries come from a pluggable
//! [`processor::MemoryProcessor`]. Persistence traits and backends live in
//! the `engram-state` crate.

pub mod coordinator;
pub mod error;
pub mod index;
pub mod policy;
pub mod processor;
pub mod telemetry;

pub use coordinator::{CoordinatorConfig, MemoryCoordinator, MemoryItem, RecordOutcome};
pub use error::{MemoryError, MemoryResult};
pub use index::{IndexError, VectorIndex, VectorKey, DEFAULT_DIMENSION};
pub use policy::{DefaultGatingPolicy, GatingPolicy};
pub use processor::{MemoryProcessor, ProcessorError, StubProcessor};

pub use engram_state::{
    AdmissionLedger, EventRecord, EventStore, MemoryKind, Role, StorageError, SummaryRecord,
    SummaryStore,
};
