//! # Ferry Engine
//!
//! One-way record replication from a source store into a target store.
//!
//! The engine copies records with one of three strategies and keeps the
//! target converged with a scheduler that alternates between them.
//!
//! ## Core Concepts
//!
//! ### Stores
//!
//! A [`RecordStore`] is anything that can count, filter, insert and update
//! JSON records. Every record carries an opaque id, a creation time and a
//! last-modified time that the store itself assigns. [`MemoryStore`] is the
//! in-process implementation used by tests and benches.
//!
//! ### Strategies
//!
//! [`SyncEngine`] offers:
//! - [`SyncEngine::sync_all_no_limit`] - one unbounded read, raw appends
//! - [`SyncEngine::sync_all_safely`] - the same copy in fixed-size pages
//! - [`SyncEngine::sync_new_changes`] - idempotent upserts of everything
//!   modified after a [`Watermark`]
//!
//! ### Watermark
//!
//! The watermark only moves forward, and only after a whole delta batch has
//! been applied. [`AdvancePolicy`] chooses the value it advances to.
//!
//! ### Scheduler
//!
//! [`Scheduler`] bootstraps an empty target with a paginated copy, then runs
//! delta cycles on an interval until its cancellation token fires.
//!
//! ## Quick Start
//!
//! ```rust
//! use ferry_engine::{MemoryStore, Scheduler, SchedulerConfig, SyncEngine};
//! use ferry_engine::testing::load_demo;
//!
//! # tokio_test_block_on(async {
//! let source = MemoryStore::with_system_clock();
//! load_demo(&source).await.unwrap();
//!
//! let engine = SyncEngine::new(source, MemoryStore::with_system_clock());
//! let mut scheduler = Scheduler::new(engine, SchedulerConfig::default());
//!
//! // Bootstrap, then one delta cycle.
//! let outcomes = scheduler.run_cycles(2).await.unwrap();
//! assert_eq!(outcomes[0].processed, 3);
//! assert_eq!(scheduler.engine().sink().target().len().await, 3);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

pub mod clock;
pub mod error;
pub mod filter;
pub mod outcome;
pub mod record;
pub mod retry;
pub mod scheduler;
pub mod sink;
pub mod store;
pub mod strategy;
pub mod testing;
pub mod watermark;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, SyncError};
pub use filter::{Comparison, Condition, Filter, Page};
pub use outcome::{CycleOutcome, StrategyKind, StrategyReport};
pub use record::{Document, Patch, Record};
pub use retry::RetryConfig;
pub use scheduler::{Phase, Scheduler, SchedulerConfig, SchedulerStatus};
pub use sink::Sink;
pub use store::{MemoryStore, RecordStore};
pub use strategy::SyncEngine;
pub use watermark::{AdvancePolicy, Watermark};

/// Type aliases for clarity
pub type RecordId = String;
pub type Timestamp = u64;
