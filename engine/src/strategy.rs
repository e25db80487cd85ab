//! The three sync strategies: full, paginated full, and delta.
//!
//! Every adapter call (a count, a page read, a delta query, one apply) is an
//! independent unit of retry, so retrying a failed read never re-emits
//! records that were already written.

use crate::{
    clock::{Clock, SystemClock},
    error::{Result, StoreError, SyncError},
    outcome::{StrategyKind, StrategyReport},
    retry::RetryConfig,
    AdvancePolicy, Filter, Page, RecordStore, Sink, Watermark,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Moves records from a source store into a target store.
#[derive(Debug)]
pub struct SyncEngine<S, T> {
    source: S,
    sink: Sink<T>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    policy: AdvancePolicy,
    cancel: CancellationToken,
}

impl<S: RecordStore, T: RecordStore> SyncEngine<S, T> {
    /// Create an engine with wall-clock time, default retries and the
    /// max-observed watermark policy.
    pub fn new(source: S, target: T) -> Self {
        Self {
            source,
            sink: Sink::new(target),
            clock: Arc::new(SystemClock),
            retry: RetryConfig::default(),
            policy: AdvancePolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use `clock` for watermark decisions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_policy(mut self, policy: AdvancePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop cooperatively when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &Sink<T> {
        &self.sink
    }

    pub fn policy(&self) -> AdvancePolicy {
        self.policy
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Copy the whole source in one unbounded read.
    ///
    /// Holds the full result set in memory and cannot resume; only suitable
    /// for small sources and an empty target.
    pub async fn sync_all_no_limit(&self) -> Result<StrategyReport> {
        let kind = StrategyKind::Full;
        let mut report = StrategyReport::new(kind);
        self.check_cancelled(kind, &report)?;

        let all = Filter::all();
        let records = self
            .retry
            .run(&self.cancel, "find", || self.source.find(&all, Page::unbounded()))
            .await
            .map_err(|e| store_failure(kind, &report, e))?;

        tracing::debug!(records = records.len(), "full sync read source");

        for record in &records {
            self.retry
                .run(&self.cancel, "emit", || self.sink.emit(record))
                .await
                .map_err(|e| store_failure(kind, &report, e))?;
            report.record_applied(record.updated_at);
        }

        Ok(report)
    }

    /// Copy the whole source in pages of `batch_size` into an empty target.
    ///
    /// The source is counted once up front; records added after that are
    /// left to the next delta cycle. Termination depends on the count, not
    /// on page length.
    pub async fn sync_all_safely(&self, batch_size: u64) -> Result<StrategyReport> {
        if batch_size == 0 {
            return Err(SyncError::InvalidBatchSize);
        }

        let kind = StrategyKind::Paginated;
        let mut report = StrategyReport::new(kind);

        let count = self
            .retry
            .run(&self.cancel, "count", || self.source.count())
            .await
            .map_err(|e| store_failure(kind, &report, e))?;

        let all = Filter::all();
        let mut offset = 0u64;
        while offset < count {
            self.check_cancelled(kind, &report)?;

            let page = Page::new(batch_size, offset);
            let records = self
                .retry
                .run(&self.cancel, "find", || self.source.find(&all, page))
                .await
                .map_err(|e| store_failure(kind, &report, e))?;

            tracing::debug!(offset, count, page_len = records.len(), "paginated sync page");

            for record in &records {
                self.retry
                    .run(&self.cancel, "emit", || self.sink.emit(record))
                    .await
                    .map_err(|e| store_failure(kind, &report, e))?;
                report.record_applied(record.updated_at);
            }

            offset += batch_size;
        }

        Ok(report)
    }

    /// Upsert every record written after the watermark, then advance it.
    ///
    /// The watermark only moves once the whole batch has been applied. A
    /// failed or cancelled batch leaves it untouched; re-applying the batch
    /// later is safe because upserts are idempotent.
    pub async fn sync_new_changes(&self, watermark: &mut Watermark) -> Result<StrategyReport> {
        let kind = StrategyKind::Delta;
        let mut report = StrategyReport::new(kind);
        let since = watermark.last_synced_at();

        let changes = Filter::updated_after(since);
        let query_started = self.clock.now();
        let changed = self
            .retry
            .run(&self.cancel, "find", || self.source.find(&changes, Page::unbounded()))
            .await
            .map_err(|e| store_failure(kind, &report, e))?;

        for record in &changed {
            self.check_cancelled(kind, &report)?;
            self.retry
                .run(&self.cancel, "upsert", || self.sink.upsert(record))
                .await
                .map_err(|e| store_failure(kind, &report, e))?;
            report.record_applied(record.updated_at);
        }

        let finished = self.clock.now();
        if let Some(next) = self
            .policy
            .select(report.max_updated_at, query_started, finished)
        {
            if watermark.advance(next) {
                tracing::debug!(from = since, to = next, "watermark advanced");
            }
        }

        Ok(report)
    }

    fn check_cancelled(&self, kind: StrategyKind, report: &StrategyReport) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled {
                strategy: kind,
                processed: report.processed,
            })
        } else {
            Ok(())
        }
    }
}

fn store_failure(kind: StrategyKind, report: &StrategyReport, source: StoreError) -> SyncError {
    SyncError::Store {
        strategy: kind,
        processed: report.processed,
        source,
    }
}
