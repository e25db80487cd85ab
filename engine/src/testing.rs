//! Demo data and fault injection for tests, benches and local experiments.
//!
//! Nothing here is part of the sync contract.

use crate::{
    clock::ManualClock,
    error::{StoreError, StoreResult},
    Document, Filter, MemoryStore, Page, Patch, Record, RecordStore, Timestamp,
};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const ENGINES: &[&str] = &[
    "MySQL", "MongoDB", "Redis", "CouchDB", "ArangoDB", "Cassandra", "SQLite",
];
const OWNERS: &[&str] = &["Ada", "Grace", "Linus", "Barbara", "Ken", "Margaret"];

/// Builds demo payloads with `name`, `owner` and `amount` fields.
#[derive(Debug, Default, Clone)]
pub struct RecordFactory {
    name: Option<String>,
    owner: Option<String>,
    amount: Option<String>,
}

impl RecordFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    /// A payload with random values for every field not set explicitly.
    pub fn create(&self) -> Value {
        let mut rng = rand::thread_rng();
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| ENGINES.choose(&mut rng).unwrap_or(&"Postgres").to_string());
        let owner = self
            .owner
            .clone()
            .unwrap_or_else(|| OWNERS.choose(&mut rng).unwrap_or(&"Alan").to_string());
        let amount = self
            .amount
            .clone()
            .unwrap_or_else(|| format!("{:.2}", rng.gen_range(1.0..1000.0)));

        json!({ "name": name, "owner": owner, "amount": amount })
    }

    /// A fresh insertable document.
    pub fn document(&self) -> Document {
        Document::new(self.create())
    }
}

/// Deterministic payload for the `index`th fixture record.
pub fn fixture_payload(index: usize) -> Value {
    json!({
        "name": format!("db-{index}"),
        "owner": OWNERS[index % OWNERS.len()],
        "amount": format!("{}.00", (index + 1) * 10),
    })
}

/// A manual clock and a source store holding one fixture record per
/// timestamp, with ids `rec-0`, `rec-1`, ...
pub async fn seeded_source(timestamps: &[Timestamp]) -> (Arc<ManualClock>, Arc<MemoryStore>) {
    let clock = Arc::new(ManualClock::new(timestamps.first().copied().unwrap_or(1)));
    let store = MemoryStore::new_shared(clock.clone());

    for (index, ts) in timestamps.iter().enumerate() {
        clock.set(*ts);
        let doc = Document::new(fixture_payload(index)).with_id(format!("rec-{index}"));
        // Fresh ids on an empty in-memory store cannot collide.
        if let Err(err) = store.insert(doc).await {
            tracing::error!(error = %err, "fixture insert failed");
        }
    }

    (clock, store)
}

/// Insert three demo records, the first one named `GE`. Returns the last insert.
pub async fn load_demo<S: RecordStore + ?Sized>(store: &S) -> StoreResult<Record> {
    store
        .insert(RecordFactory::new().name("GE").document())
        .await?;
    store.insert(RecordFactory::new().document()).await?;
    store.insert(RecordFactory::new().document()).await
}

/// Set `owner` on the first record named `name`, refreshing its `updated_at`.
pub async fn touch<S: RecordStore + ?Sized>(
    store: &S,
    name: &str,
    owner: &str,
) -> StoreResult<Option<Record>> {
    store
        .update(
            &Filter::all().field_eq("name", json!(name)),
            Patch::set("owner", json!(owner)),
        )
        .await
}

/// Fetch and log the first record named `name`.
pub async fn read<S: RecordStore + ?Sized>(store: &S, name: &str) -> StoreResult<Option<Record>> {
    let record = store
        .find_one(&Filter::all().field_eq("name", json!(name)))
        .await?;
    tracing::info!(name, record = ?record, "read record");
    Ok(record)
}

/// Wraps a store and fails chosen calls with [`StoreError::Unavailable`].
///
/// Reads are `count`, `find` and `find_one`; writes are `insert` and `update`.
#[derive(Debug)]
pub struct FlakyStore<S> {
    inner: S,
    failing_reads: AtomicU64,
    read_budget: AtomicU64,
    failing_writes: AtomicU64,
    failed: AtomicU64,
}

impl<S: RecordStore> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing_reads: AtomicU64::new(0),
            read_budget: AtomicU64::new(u64::MAX),
            failing_writes: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Fail the next `n` reads, then recover.
    pub fn fail_next_reads(&self, n: u64) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    /// Let `n` more reads succeed, then fail every read.
    pub fn fail_reads_after(&self, n: u64) {
        self.read_budget.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` writes, then recover.
    pub fn fail_next_writes(&self, n: u64) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Recover from every injected failure mode.
    pub fn heal(&self) {
        self.failing_reads.store(0, Ordering::SeqCst);
        self.read_budget.store(u64::MAX, Ordering::SeqCst);
        self.failing_writes.store(0, Ordering::SeqCst);
    }

    /// Calls failed so far.
    pub fn failures(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn gate_read(&self) -> StoreResult<()> {
        if take_one(&self.failing_reads) {
            return self.fail("injected read failure");
        }
        let budget = self.read_budget.load(Ordering::SeqCst);
        if budget == 0 {
            return self.fail("read budget exhausted");
        }
        if budget != u64::MAX {
            self.read_budget.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn gate_write(&self) -> StoreResult<()> {
        if take_one(&self.failing_writes) {
            return self.fail("injected write failure");
        }
        Ok(())
    }

    fn fail(&self, reason: &str) -> StoreResult<()> {
        self.failed.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable(reason.to_string()))
    }
}

/// Decrement `counter` if positive; true if it was.
fn take_one(counter: &AtomicU64) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl<S: RecordStore> RecordStore for FlakyStore<S> {
    async fn count(&self) -> StoreResult<u64> {
        self.gate_read()?;
        self.inner.count().await
    }

    async fn find(&self, filter: &Filter, page: Page) -> StoreResult<Vec<Record>> {
        self.gate_read()?;
        self.inner.find(filter, page).await
    }

    async fn insert(&self, document: Document) -> StoreResult<Record> {
        self.gate_write()?;
        self.inner.insert(document).await
    }

    async fn update(&self, filter: &Filter, patch: Patch) -> StoreResult<Option<Record>> {
        self.gate_write()?;
        self.inner.update(filter, patch).await
    }

    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<Record>> {
        self.gate_read()?;
        self.inner.find_one(filter).await
    }
}
