//! Record store adapters.
//!
//! [`RecordStore`] is the uniform read/write contract the strategies use for
//! both the source and the target. [`MemoryStore`] is an in-process
//! implementation with a stable insertion order, used by tests, benches and
//! embedded deployments.

use crate::{
    clock::{Clock, SystemClock},
    error::{StoreError, StoreResult},
    Document, Filter, Page, Patch, Record, RecordId, Timestamp,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read/write contract over a document collection.
///
/// `find` must return matches in an order that is stable across calls within
/// one synchronization session, otherwise paginated reads can skip or
/// duplicate records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Total number of documents.
    async fn count(&self) -> StoreResult<u64>;

    /// Documents matching `filter` within `page`, in store order.
    async fn find(&self, filter: &Filter, page: Page) -> StoreResult<Vec<Record>>;

    /// Append a document, assigning `id` and timestamps if absent.
    ///
    /// Fails with [`StoreError::Write`] if the identity already exists.
    async fn insert(&self, document: Document) -> StoreResult<Record>;

    /// Patch the first match and refresh its `updated_at`.
    ///
    /// Returns `None` when nothing matches.
    async fn update(&self, filter: &Filter, patch: Patch) -> StoreResult<Option<Record>>;

    /// The first match, if any.
    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<Record>> {
        Ok(self.find(filter, Page::new(1, 0)).await?.into_iter().next())
    }
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    async fn count(&self) -> StoreResult<u64> {
        (**self).count().await
    }

    async fn find(&self, filter: &Filter, page: Page) -> StoreResult<Vec<Record>> {
        (**self).find(filter, page).await
    }

    async fn insert(&self, document: Document) -> StoreResult<Record> {
        (**self).insert(document).await
    }

    async fn update(&self, filter: &Filter, patch: Patch) -> StoreResult<Option<Record>> {
        (**self).update(filter, patch).await
    }

    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<Record>> {
        (**self).find_one(filter).await
    }
}

/// Next `updated_at` for a record: the clock reading, but always past the previous value.
pub fn next_write_time(now: Timestamp, previous: Option<Timestamp>) -> Timestamp {
    match previous {
        Some(prev) => now.max(prev.saturating_add(1)),
        None => now,
    }
}

/// Records ordered by insertion sequence.
#[derive(Debug, Default)]
struct Collection {
    records: BTreeMap<u64, Record>,
    by_id: HashMap<RecordId, u64>,
    next_seq: u64,
}

impl Collection {
    fn get_mut(&mut self, id: &str) -> Option<&mut Record> {
        let seq = self.by_id.get(id)?;
        self.records.get_mut(seq)
    }

    fn insert(&mut self, record: Record) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_id.insert(record.id.clone(), seq);
        self.records.insert(seq, record);
    }

    fn matching<'a>(&'a self, filter: &'a Filter) -> impl Iterator<Item = &'a Record> + 'a {
        // Identity lookups skip the scan.
        let by_id = filter.conditions().iter().find_map(|c| match c {
            crate::filter::Condition::Id(id) => Some(id),
            _ => None,
        });

        let candidates: Box<dyn Iterator<Item = &'a Record> + 'a> = match by_id {
            Some(id) => Box::new(
                self.by_id
                    .get(id)
                    .and_then(|seq| self.records.get(seq))
                    .into_iter(),
            ),
            None => Box::new(self.records.values()),
        };

        candidates.filter(move |r| filter.matches(r))
    }
}

/// An in-memory record store.
///
/// Timestamps come from the injected [`Clock`]; order is insertion order and
/// never changes on update.
#[derive(Debug)]
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    collection: RwLock<Collection>,
}

impl MemoryStore {
    /// Create an empty store stamping writes with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            collection: RwLock::new(Collection::default()),
        }
    }

    /// Create an empty store stamping writes with wall-clock time.
    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Create an empty store wrapped in `Arc` for sharing.
    pub fn new_shared(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self::new(clock))
    }

    /// All records in store order.
    pub async fn records(&self) -> Vec<Record> {
        self.collection.read().await.records.values().cloned().collect()
    }

    /// Look a record up by identity.
    pub async fn get(&self, id: &str) -> Option<Record> {
        let collection = self.collection.read().await;
        collection
            .by_id
            .get(id)
            .and_then(|seq| collection.records.get(seq))
            .cloned()
    }

    /// Number of records, without going through the fallible contract.
    pub async fn len(&self) -> usize {
        self.collection.read().await.records.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn count(&self) -> StoreResult<u64> {
        Ok(self.collection.read().await.records.len() as u64)
    }

    async fn find(&self, filter: &Filter, page: Page) -> StoreResult<Vec<Record>> {
        let collection = self.collection.read().await;
        let skip = usize::try_from(page.offset).unwrap_or(usize::MAX);
        let take = page
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        Ok(collection
            .matching(filter)
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    async fn insert(&self, document: Document) -> StoreResult<Record> {
        let mut collection = self.collection.write().await;

        let id = document
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if collection.by_id.contains_key(&id) {
            return Err(StoreError::Write(format!("duplicate record id: {id}")));
        }

        let now = self.clock.now();
        let updated_at = document.updated_at.unwrap_or(now);
        let record = Record {
            id,
            created_at: document.created_at.unwrap_or(updated_at),
            updated_at,
            payload: document.payload,
        };

        collection.insert(record.clone());
        Ok(record)
    }

    async fn update(&self, filter: &Filter, patch: Patch) -> StoreResult<Option<Record>> {
        let mut collection = self.collection.write().await;

        let Some(id) = collection.matching(filter).next().map(|r| r.id.clone()) else {
            return Ok(None);
        };

        let now = self.clock.now();
        let Some(record) = collection.get_mut(&id) else {
            return Ok(None);
        };
        patch.apply_to(&mut record.payload);
        record.updated_at = next_write_time(now, Some(record.updated_at));

        Ok(Some(record.clone()))
    }
}
