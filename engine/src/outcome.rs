//! Per-cycle results reported to logs and status observers.

use crate::{error::SyncError, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which sync algorithm ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Single unbounded read of the whole source
    Full,
    /// Full copy in fixed-size pages
    Paginated,
    /// Changes since the watermark
    Delta,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::Full => "full",
            StrategyKind::Paginated => "paginated",
            StrategyKind::Delta => "delta",
        })
    }
}

/// What a strategy run accomplished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyReport {
    pub strategy: StrategyKind,
    /// Records written to the target
    pub processed: u64,
    /// Greatest `updated_at` among the records written
    pub max_updated_at: Option<Timestamp>,
}

impl StrategyReport {
    pub(crate) fn new(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            processed: 0,
            max_updated_at: None,
        }
    }

    pub(crate) fn record_applied(&mut self, updated_at: Timestamp) {
        self.processed += 1;
        self.max_updated_at = Some(self.max_updated_at.map_or(updated_at, |m| m.max(updated_at)));
    }
}

/// Transient record of one scheduler cycle. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleOutcome {
    /// 1-based cycle number; the bootstrap is cycle 1
    pub cycle: u64,
    pub strategy: StrategyKind,
    /// Records applied, including those applied before a failure
    pub processed: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Watermark after the cycle
    pub watermark: Timestamp,
    pub duration_ms: u64,
}

impl CycleOutcome {
    /// Outcome of a completed run.
    pub fn succeeded(
        cycle: u64,
        report: &StrategyReport,
        watermark: Timestamp,
        duration_ms: u64,
    ) -> Self {
        Self {
            cycle,
            strategy: report.strategy,
            processed: report.processed,
            success: true,
            error: None,
            watermark,
            duration_ms,
        }
    }

    /// Outcome of a run that stopped with `error`.
    pub fn failed(
        cycle: u64,
        strategy: StrategyKind,
        error: &SyncError,
        watermark: Timestamp,
        duration_ms: u64,
    ) -> Self {
        Self {
            cycle,
            strategy,
            processed: error.processed(),
            success: false,
            error: Some(error.to_string()),
            watermark,
            duration_ms,
        }
    }

    /// Emit the outcome as a structured log event.
    pub fn log(&self) {
        if self.success {
            tracing::info!(
                cycle = self.cycle,
                strategy = %self.strategy,
                processed = self.processed,
                watermark = self.watermark,
                duration_ms = self.duration_ms,
                "sync cycle completed"
            );
        } else {
            tracing::warn!(
                cycle = self.cycle,
                strategy = %self.strategy,
                processed = self.processed,
                watermark = self.watermark,
                error = self.error.as_deref().unwrap_or_default(),
                "sync cycle failed"
            );
        }
    }
}
