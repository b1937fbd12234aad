// VecBatch — lib.rs
// Public API, error types, re-exports.
// Batch ingestion engine for a remote vector database: buffers records,
// sends them in bounded batches, retries transient failures and reconciles
// timed-out writes before resubmitting.
// Author: d65v <https://github.com/d65v>

pub mod buffer;
pub mod config;
pub mod delay;
pub mod engine;
pub mod memory;
pub mod merge;
pub mod orchestrator;
pub mod reconcile;
pub mod record;
pub mod scheduler;
pub mod transport;

#[cfg(test)]
pub(crate) mod testkit;

use thiserror::Error;

pub use crate::config::{AutoBatchPolicy, OutcomeOrdering, RetryBudget};
pub use crate::engine::{BatchEngine, EngineBuilder};
pub use crate::memory::{Fault, MemoryServer};
pub use crate::record::{
    AggregatedError, AggregatedResult, ConsistencyLevel, OutcomeStatus, Record, RecordOutcome,
    StoredRecord,
};
pub use crate::transport::{Transport, TransportError, TransportErrorKind};
pub use crate::reconcile::ReconciliationProbe;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum VecBatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Engine closed: no further batches are accepted")]
    Closed,

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Response decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VecBatchError>;
