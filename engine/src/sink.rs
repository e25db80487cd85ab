//! The apply path into the target store.

use crate::{error::StoreResult, Document, Filter, Patch, Record, RecordStore};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lands source records in the target store.
///
/// `emit` is a raw append used by the bulk strategies; `upsert` is the
/// identity-keyed, idempotent path used by delta sync.
#[derive(Debug)]
pub struct Sink<T> {
    target: T,
    emitted: AtomicU64,
    upserted: AtomicU64,
}

impl<T: RecordStore> Sink<T> {
    /// Create a sink writing into `target`.
    pub fn new(target: T) -> Self {
        Self {
            target,
            emitted: AtomicU64::new(0),
            upserted: AtomicU64::new(0),
        }
    }

    /// The underlying target store.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Append `record` verbatim.
    ///
    /// Not idempotent: a second emit of the same record is rejected by the
    /// target as a duplicate identity.
    pub async fn emit(&self, record: &Record) -> StoreResult<Record> {
        let stored = self.target.insert(Document::from(record.clone())).await?;
        self.emitted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(id = %record.id, "record emitted");
        Ok(stored)
    }

    /// Insert `record`, or overwrite the target copy with the same identity.
    pub async fn upsert(&self, record: &Record) -> StoreResult<Record> {
        let by_id = Filter::by_id(record.id.clone());

        let stored = match self.target.find_one(&by_id).await? {
            Some(_) => {
                let replaced = self
                    .target
                    .update(&by_id, Patch::Replace(record.payload.clone()))
                    .await?;
                match replaced {
                    Some(stored) => stored,
                    // Gone between the lookup and the write.
                    None => self.target.insert(Document::from(record.clone())).await?,
                }
            }
            None => self.target.insert(Document::from(record.clone())).await?,
        };

        self.upserted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(id = %record.id, "record upserted");
        Ok(stored)
    }

    /// Records appended through `emit` so far.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Records applied through `upsert` so far.
    pub fn upserted(&self) -> u64 {
        self.upserted.load(Ordering::Relaxed)
    }
}
