//! Error types for the Ferry engine.

use crate::outcome::StrategyKind;
use thiserror::Error;

/// Errors raised by a record store adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// I/O or connectivity failure. Transient; the caller decides whether to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Constraint violation on insert or update (e.g. duplicate identity).
    #[error("store write rejected: {0}")]
    Write(String),

    /// The filter cannot be expressed by this store.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

impl StoreError {
    /// Returns true if the failure is transient and the call may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Errors raised by the sync strategies and the scheduler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A store call failed and retries (if any) were exhausted.
    #[error("{strategy} sync failed after {processed} records: {source}")]
    Store {
        strategy: StrategyKind,
        processed: u64,
        #[source]
        source: StoreError,
    },

    /// The run was stopped by its cancellation token.
    #[error("{strategy} sync cancelled after {processed} records")]
    Cancelled {
        strategy: StrategyKind,
        processed: u64,
    },

    #[error("batch size must be greater than zero")]
    InvalidBatchSize,

    /// The initial paginated sync did not complete; the target is in a partial state.
    #[error("bootstrap failed after {processed} records: {source}")]
    BootstrapFailed {
        processed: u64,
        #[source]
        source: Box<SyncError>,
    },

    /// An error that must stop the process (e.g. a write conflict on the upsert path).
    #[error("fatal error in cycle {cycle}: {source}")]
    Fatal {
        cycle: u64,
        processed: u64,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Number of records applied before the failure.
    pub fn processed(&self) -> u64 {
        match self {
            SyncError::Store { processed, .. }
            | SyncError::Cancelled { processed, .. }
            | SyncError::BootstrapFailed { processed, .. }
            | SyncError::Fatal { processed, .. } => *processed,
            SyncError::InvalidBatchSize => 0,
        }
    }

    /// Returns true if the failure only aborts the current cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Store { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Result type for store adapter calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
