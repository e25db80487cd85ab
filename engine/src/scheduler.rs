//! Sync scheduler.
//!
//! Runs the paginated full sync exactly once, then delta sync on a fixed
//! interval until cancelled. Exactly one cycle is in flight at a time.

use crate::{
    error::{Result, SyncError},
    outcome::{CycleOutcome, StrategyKind},
    RecordStore, SyncEngine, Timestamp, Watermark,
};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Lifecycle phase of a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Initial paginated copy has not completed yet.
    Bootstrapping,
    /// Delta sync on every tick.
    SteadyState,
    /// Cancelled, or halted by a fatal error.
    Stopped,
}

/// Scheduler tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Page size for the bootstrap copy.
    pub bootstrap_batch_size: u64,
    /// Pause between delta cycles.
    pub interval: Duration,
}

impl SchedulerConfig {
    pub fn new(bootstrap_batch_size: u64, interval: Duration) -> Self {
        Self {
            bootstrap_batch_size,
            interval,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(1))
    }
}

/// Snapshot published after every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub phase: Phase,
    /// Cycles started so far
    pub cycle: u64,
    pub watermark: Timestamp,
    pub last_outcome: Option<CycleOutcome>,
}

/// Drives a [`SyncEngine`] through bootstrap and steady-state delta cycles.
///
/// The scheduler owns the watermark; nothing else reads or writes it.
pub struct Scheduler<S, T> {
    engine: SyncEngine<S, T>,
    config: SchedulerConfig,
    watermark: Watermark,
    phase: Phase,
    cycle: u64,
    status: watch::Sender<SchedulerStatus>,
}

impl<S: RecordStore, T: RecordStore> Scheduler<S, T> {
    /// A scheduler for a fresh, empty target. Starts by bootstrapping.
    pub fn new(engine: SyncEngine<S, T>, config: SchedulerConfig) -> Self {
        Self::with_state(engine, config, Phase::Bootstrapping, Watermark::origin())
    }

    /// A scheduler for a target that is already populated up to `watermark`.
    /// Skips the bootstrap.
    pub fn resume(engine: SyncEngine<S, T>, config: SchedulerConfig, watermark: Watermark) -> Self {
        Self::with_state(engine, config, Phase::SteadyState, watermark)
    }

    fn with_state(
        engine: SyncEngine<S, T>,
        config: SchedulerConfig,
        phase: Phase,
        watermark: Watermark,
    ) -> Self {
        let (status, _) = watch::channel(SchedulerStatus {
            phase,
            cycle: 0,
            watermark: watermark.last_synced_at(),
            last_outcome: None,
        });

        Self {
            engine,
            config,
            watermark,
            phase,
            cycle: 0,
            status,
        }
    }

    /// Receive a status snapshot after every cycle.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.status.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn engine(&self) -> &SyncEngine<S, T> {
        &self.engine
    }

    /// Run one cycle: the bootstrap copy, or a single delta pass.
    ///
    /// Transient failures and cancellation end a delta cycle with a failed
    /// outcome and leave the scheduler running. A failed bootstrap or a
    /// non-transient delta failure stops it and is returned as an error. A
    /// cancelled bootstrap stops it and returns [`SyncError::Cancelled`].
    pub async fn step(&mut self) -> Result<CycleOutcome> {
        match self.phase {
            Phase::Bootstrapping => self.bootstrap().await,
            Phase::SteadyState => self.delta().await,
            Phase::Stopped => Err(SyncError::Cancelled {
                strategy: StrategyKind::Delta,
                processed: 0,
            }),
        }
    }

    /// Run exactly `cycles` steps, stopping early on a fatal error.
    pub async fn run_cycles(&mut self, cycles: u64) -> Result<Vec<CycleOutcome>> {
        let mut outcomes = Vec::new();
        for _ in 0..cycles {
            outcomes.push(self.step().await?);
        }
        Ok(outcomes)
    }

    /// Run until the engine's cancellation token fires.
    ///
    /// Returns the final watermark so the caller can persist it. Cancellation
    /// mid-cycle, including during the bootstrap, is a clean stop.
    pub async fn run(mut self) -> Result<Watermark> {
        let cancel = self.engine.cancellation().clone();
        tracing::info!(
            phase = ?self.phase,
            watermark = %self.watermark,
            interval_ms = self.config.interval.as_millis() as u64,
            "scheduler started"
        );

        while !cancel.is_cancelled() {
            let was_bootstrapping = self.phase == Phase::Bootstrapping;
            match self.step().await {
                Ok(_) => {}
                Err(SyncError::Cancelled { .. }) => break,
                Err(err) => return Err(err),
            }

            // The first delta runs straight after the bootstrap.
            if was_bootstrapping {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        self.phase = Phase::Stopped;
        self.publish(None);
        tracing::info!(cycles = self.cycle, watermark = %self.watermark, "scheduler stopped");
        Ok(self.watermark)
    }

    async fn bootstrap(&mut self) -> Result<CycleOutcome> {
        self.cycle += 1;
        let started = Instant::now();
        tracing::info!(
            cycle = self.cycle,
            batch_size = self.config.bootstrap_batch_size,
            "bootstrap started"
        );

        match self
            .engine
            .sync_all_safely(self.config.bootstrap_batch_size)
            .await
        {
            Ok(report) => {
                // The watermark stays where it was. Records written behind the
                // scan cursor may carry timestamps below the greatest one the
                // scan saw, so the first delta re-upserts from here.
                self.phase = Phase::SteadyState;
                let outcome = CycleOutcome::succeeded(
                    self.cycle,
                    &report,
                    self.watermark.last_synced_at(),
                    elapsed_ms(started),
                );
                self.finish(outcome.clone());
                Ok(outcome)
            }
            Err(err) => {
                self.phase = Phase::Stopped;
                let outcome = CycleOutcome::failed(
                    self.cycle,
                    StrategyKind::Paginated,
                    &err,
                    self.watermark.last_synced_at(),
                    elapsed_ms(started),
                );
                self.finish(outcome);

                if matches!(err, SyncError::Cancelled { .. }) {
                    tracing::info!(
                        cycle = self.cycle,
                        processed = err.processed(),
                        "bootstrap cancelled"
                    );
                    return Err(err);
                }

                tracing::error!(
                    cycle = self.cycle,
                    processed = err.processed(),
                    error = %err,
                    "bootstrap failed, target left partially populated"
                );
                Err(SyncError::BootstrapFailed {
                    processed: err.processed(),
                    source: Box::new(err),
                })
            }
        }
    }

    async fn delta(&mut self) -> Result<CycleOutcome> {
        self.cycle += 1;
        let started = Instant::now();

        match self.engine.sync_new_changes(&mut self.watermark).await {
            Ok(report) => {
                let outcome = CycleOutcome::succeeded(
                    self.cycle,
                    &report,
                    self.watermark.last_synced_at(),
                    elapsed_ms(started),
                );
                self.finish(outcome.clone());
                Ok(outcome)
            }
            Err(err) => {
                let outcome = CycleOutcome::failed(
                    self.cycle,
                    StrategyKind::Delta,
                    &err,
                    self.watermark.last_synced_at(),
                    elapsed_ms(started),
                );

                if err.is_transient() || matches!(err, SyncError::Cancelled { .. }) {
                    self.finish(outcome.clone());
                    return Ok(outcome);
                }

                // Upserts resolve by identity first, so a rejected write here
                // means the target is corrupt or the adapter is broken.
                self.phase = Phase::Stopped;
                self.finish(outcome);
                tracing::error!(cycle = self.cycle, error = %err, "fatal delta failure");
                Err(SyncError::Fatal {
                    cycle: self.cycle,
                    processed: err.processed(),
                    source: Box::new(err),
                })
            }
        }
    }

    fn finish(&mut self, outcome: CycleOutcome) {
        outcome.log();
        self.publish(Some(outcome));
    }

    fn publish(&self, outcome: Option<CycleOutcome>) {
        let last_outcome = outcome.or_else(|| self.status.borrow().last_outcome.clone());
        self.status.send_replace(SchedulerStatus {
            phase: self.phase,
            cycle: self.cycle,
            watermark: self.watermark.last_synced_at(),
            last_outcome,
        });
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{StoreError, StoreResult};
    use crate::retry::RetryConfig;
    use crate::testing::{seeded_source, FlakyStore};
    use crate::{Document, Filter, MemoryStore, Page, Patch, Record};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    type MemoryScheduler = Scheduler<Arc<MemoryStore>, Arc<MemoryStore>>;

    fn scheduler(source: Arc<MemoryStore>, clock: Arc<ManualClock>, batch: u64) -> MemoryScheduler {
        let target = MemoryStore::new_shared(clock.clone());
        let engine = SyncEngine::new(source, target)
            .with_clock(clock)
            .with_retry(RetryConfig::no_retry());
        Scheduler::new(engine, SchedulerConfig::new(batch, Duration::from_millis(10)))
    }

    fn resumed<S: RecordStore, T: RecordStore>(engine: SyncEngine<S, T>) -> Scheduler<S, T> {
        Scheduler::resume(engine, SchedulerConfig::default(), Watermark::origin())
    }

    #[tokio::test]
    async fn bootstrap_then_steady_state() {
        let (clock, source) = seeded_source(&[10, 20, 30]).await;
        let mut scheduler = scheduler(source, clock, 2);
        assert_eq!(scheduler.phase(), Phase::Bootstrapping);

        let bootstrap = scheduler.step().await.unwrap();

        assert_eq!(bootstrap.cycle, 1);
        assert_eq!(bootstrap.strategy, StrategyKind::Paginated);
        assert_eq!(bootstrap.processed, 3);
        assert_eq!(scheduler.phase(), Phase::SteadyState);
        assert_eq!(scheduler.watermark(), Watermark::origin());

        // The first delta re-applies the bootstrap copy.
        let catch_up = scheduler.step().await.unwrap();
        assert_eq!(catch_up.strategy, StrategyKind::Delta);
        assert_eq!(catch_up.processed, 3);
        assert_eq!(scheduler.watermark().last_synced_at(), 30);
        assert_eq!(scheduler.engine().sink().target().len().await, 3);

        let idle = scheduler.step().await.unwrap();
        assert_eq!(idle.processed, 0);
    }

    #[tokio::test]
    async fn writes_behind_the_scan_cursor_reach_the_target() {
        let (clock, source) = seeded_source(&[10, 20]).await;
        let writer = Arc::new(WritesAfterFirstPage {
            store: source.clone(),
            clock: clock.clone(),
            fired: AtomicBool::new(false),
        });
        let engine = SyncEngine::new(writer, MemoryStore::new_shared(clock.clone()))
            .with_clock(clock)
            .with_retry(RetryConfig::no_retry());
        let mut scheduler = Scheduler::new(engine, SchedulerConfig::new(1, Duration::ZERO));

        scheduler.run_cycles(3).await.unwrap();

        let target = scheduler.engine().sink().target();
        assert_eq!(source.len().await, 3);
        assert_eq!(target.len().await, 3);
        assert!(target.get("new").await.is_some());
        assert_eq!(target.get("rec-1").await.unwrap().payload["owner"], "Y");
        assert_eq!(scheduler.watermark().last_synced_at(), 40);
    }

    #[tokio::test]
    async fn bounded_cycles_propagate_updates() {
        let (clock, source) = seeded_source(&[10, 20]).await;
        let mut scheduler = scheduler(source.clone(), clock.clone(), 10);
        scheduler.run_cycles(2).await.unwrap();

        clock.set(50);
        source
            .update(&Filter::by_id("rec-1"), Patch::set("owner", json!("Y")))
            .await
            .unwrap();
        let outcomes = scheduler.run_cycles(2).await.unwrap();

        assert_eq!(outcomes[0].processed, 1);
        assert_eq!(outcomes[1].processed, 0);
        assert_eq!(scheduler.cycle(), 4);
        assert_eq!(scheduler.watermark().last_synced_at(), 50);
        let copy = scheduler.engine().sink().target().get("rec-1").await.unwrap();
        assert_eq!(copy.payload["owner"], "Y");
    }

    #[tokio::test]
    async fn status_is_published_per_cycle() {
        let (clock, source) = seeded_source(&[10]).await;
        let mut scheduler = scheduler(source, clock, 10);
        let status = scheduler.subscribe();

        scheduler.run_cycles(2).await.unwrap();

        let current = status.borrow().clone();
        assert_eq!(current.phase, Phase::SteadyState);
        assert_eq!(current.cycle, 2);
        assert_eq!(current.watermark, 10);
        assert_eq!(
            current.last_outcome.map(|o| o.strategy),
            Some(StrategyKind::Delta)
        );
    }

    #[tokio::test]
    async fn bootstrap_failure_halts() {
        let (clock, source) = seeded_source(&[10, 20]).await;
        let flaky = Arc::new(FlakyStore::new(source));
        flaky.fail_next_reads(1);
        let engine = SyncEngine::new(flaky, MemoryStore::new_shared(clock.clone()))
            .with_clock(clock)
            .with_retry(RetryConfig::no_retry());
        let mut scheduler = Scheduler::new(engine, SchedulerConfig::default());

        let result = scheduler.step().await;

        assert!(matches!(result, Err(SyncError::BootstrapFailed { .. })));
        assert_eq!(scheduler.phase(), Phase::Stopped);
        assert!(scheduler.step().await.is_err());
    }

    #[tokio::test]
    async fn cancelled_bootstrap_is_not_a_failure() {
        let (clock, source) = seeded_source(&[10, 20]).await;
        let token = CancellationToken::new();
        let cancelling = Arc::new(CancelsAfterFirstPage {
            store: source,
            token: token.clone(),
        });
        let engine = SyncEngine::new(cancelling, MemoryStore::new_shared(clock.clone()))
            .with_clock(clock)
            .with_retry(RetryConfig::no_retry())
            .with_cancellation(token);
        let mut scheduler = Scheduler::new(engine, SchedulerConfig::new(1, Duration::ZERO));

        let result = scheduler.step().await;

        assert!(matches!(
            result,
            Err(SyncError::Cancelled {
                strategy: StrategyKind::Paginated,
                processed: 1
            })
        ));
        assert_eq!(scheduler.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn run_returns_cleanly_when_cancelled_mid_bootstrap() {
        let (clock, source) = seeded_source(&[10, 20]).await;
        let token = CancellationToken::new();
        let cancelling = Arc::new(CancelsAfterFirstPage {
            store: source,
            token: token.clone(),
        });
        let engine = SyncEngine::new(cancelling, MemoryStore::new_shared(clock.clone()))
            .with_clock(clock)
            .with_retry(RetryConfig::no_retry())
            .with_cancellation(token);
        let scheduler = Scheduler::new(engine, SchedulerConfig::new(1, Duration::ZERO));
        let status = scheduler.subscribe();

        let watermark = scheduler.run().await.unwrap();

        assert_eq!(watermark, Watermark::origin());
        assert_eq!(status.borrow().phase, Phase::Stopped);
        assert_eq!(status.borrow().cycle, 1);
    }

    #[tokio::test]
    async fn transient_delta_failure_keeps_running() {
        let (clock, source) = seeded_source(&[10, 20]).await;
        let flaky = Arc::new(FlakyStore::new(source));
        let engine = SyncEngine::new(flaky.clone(), MemoryStore::new_shared(clock.clone()))
            .with_clock(clock)
            .with_retry(RetryConfig::no_retry());
        let mut scheduler = resumed(engine);

        flaky.fail_next_reads(1);
        let failed = scheduler.step().await.unwrap();
        assert!(!failed.success);
        assert_eq!(scheduler.watermark(), Watermark::origin());
        assert_eq!(scheduler.phase(), Phase::SteadyState);

        let recovered = scheduler.step().await.unwrap();
        assert!(recovered.success);
        assert_eq!(recovered.processed, 2);
        assert_eq!(scheduler.watermark().last_synced_at(), 20);
    }

    #[tokio::test]
    async fn write_rejection_in_delta_is_fatal() {
        let (clock, source) = seeded_source(&[10]).await;
        let target = RejectingWrites(MemoryStore::new_shared(clock.clone()));
        let engine = SyncEngine::new(source, target)
            .with_clock(clock)
            .with_retry(RetryConfig::no_retry());
        let mut scheduler = resumed(engine);
        let status = scheduler.subscribe();

        let result = scheduler.step().await;

        assert!(matches!(result, Err(SyncError::Fatal { cycle: 1, .. })));
        assert_eq!(scheduler.phase(), Phase::Stopped);
        assert_eq!(scheduler.watermark(), Watermark::origin());
        assert_eq!(status.borrow().phase, Phase::Stopped);
        assert_eq!(status.borrow().last_outcome.as_ref().map(|o| o.success), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn run_loops_until_cancelled() {
        let (clock, source) = seeded_source(&[10, 20]).await;
        let token = CancellationToken::new();
        let target = MemoryStore::new_shared(clock.clone());
        let engine = SyncEngine::new(source, target)
            .with_clock(clock)
            .with_retry(RetryConfig::no_retry())
            .with_cancellation(token.clone());
        let scheduler = Scheduler::new(engine, SchedulerConfig::new(1, Duration::from_secs(5)));
        let mut status = scheduler.subscribe();

        let handle = tokio::spawn(scheduler.run());
        while status.borrow_and_update().cycle < 4 {
            status.changed().await.unwrap();
        }
        token.cancel();

        let watermark = handle.await.unwrap().unwrap();
        assert_eq!(watermark.last_synced_at(), 20);
        assert_eq!(status.borrow().phase, Phase::Stopped);
    }

    /// Target that rejects every insert as a constraint violation.
    struct RejectingWrites<S>(S);

    #[async_trait::async_trait]
    impl<S: RecordStore> RecordStore for RejectingWrites<S> {
        async fn count(&self) -> StoreResult<u64> {
            self.0.count().await
        }

        async fn find(&self, filter: &Filter, page: Page) -> StoreResult<Vec<Record>> {
            self.0.find(filter, page).await
        }

        async fn insert(&self, document: Document) -> StoreResult<Record> {
            Err(StoreError::Write(format!(
                "constraint violated for {:?}",
                document.id
            )))
        }

        async fn update(&self, filter: &Filter, patch: Patch) -> StoreResult<Option<Record>> {
            self.0.update(filter, patch).await
        }
    }

    /// Source that, once the first page has been read, inserts `new` at 30
    /// and then updates `rec-1` at 40.
    struct WritesAfterFirstPage {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        fired: AtomicBool,
    }

    #[async_trait::async_trait]
    impl RecordStore for WritesAfterFirstPage {
        async fn count(&self) -> StoreResult<u64> {
            self.store.count().await
        }

        async fn find(&self, filter: &Filter, page: Page) -> StoreResult<Vec<Record>> {
            let records = self.store.find(filter, page).await?;
            if !self.fired.swap(true, Ordering::SeqCst) {
                self.clock.set(30);
                self.store
                    .insert(Document::new(json!({"name": "new"})).with_id("new"))
                    .await?;
                self.clock.set(40);
                self.store
                    .update(&Filter::by_id("rec-1"), Patch::set("owner", json!("Y")))
                    .await?;
            }
            Ok(records)
        }

        async fn insert(&self, document: Document) -> StoreResult<Record> {
            self.store.insert(document).await
        }

        async fn update(&self, filter: &Filter, patch: Patch) -> StoreResult<Option<Record>> {
            self.store.update(filter, patch).await
        }
    }

    /// Source that cancels `token` after serving a page.
    struct CancelsAfterFirstPage {
        store: Arc<MemoryStore>,
        token: CancellationToken,
    }

    #[async_trait::async_trait]
    impl RecordStore for CancelsAfterFirstPage {
        async fn count(&self) -> StoreResult<u64> {
            self.store.count().await
        }

        async fn find(&self, filter: &Filter, page: Page) -> StoreResult<Vec<Record>> {
            let records = self.store.find(filter, page).await?;
            self.token.cancel();
            Ok(records)
        }

        async fn insert(&self, document: Document) -> StoreResult<Record> {
            self.store.insert(document).await
        }

        async fn update(&self, filter: &Filter, patch: Patch) -> StoreResult<Option<Record>> {
            self.store.update(filter, patch).await
        }
    }
}
