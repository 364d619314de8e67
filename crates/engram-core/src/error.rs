//! Error taxonomy for the memory subsystem.
//!
//! Only genuine failures are errors. An event rejected by the gating policy
//! is a [`crate::coordinator::RecordOutcome::Rejected`] value; a missing
//! (tenant, id) pair is `None`/`false`. Neither ever aborts the caller.

use engram_state::{InvalidKind, StorageError};

use crate::index::IndexError;
use crate::processor::ProcessorError;

/// Failures surfaced by memory operations.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Durable backend I/O or transaction error. The operation aborts with
    /// no partial index mutation.
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    /// Embedding collaborator error or timeout. Recovered locally inside
    /// `hybrid_search`; fatal for operations that require a vector.
    #[error("embedding failure: {0}")]
    Embedding(#[from] ProcessorError),

    /// Vector index rejected the operation (dimension mismatch, degenerate
    /// vector).
    #[error("vector index failure: {0}")]
    Index(#[from] IndexError),

    /// Unrecognized memory-kind discriminator, rejected before any side
    /// effect.
    #[error(transparent)]
    InvalidKind(#[from] InvalidKind),
}

/// Result type for memory operations.
pub type MemoryResult<T> = std::result::Result<T, MemoryError>;
