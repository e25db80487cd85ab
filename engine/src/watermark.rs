//! The change watermark: how far delta sync has propagated the source.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cursor marking the last synchronized point in source time.
///
/// Records with `updated_at <= last_synced_at` have already been propagated.
/// The value never decreases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    last_synced_at: Timestamp,
}

impl Watermark {
    /// The beginning of time, for a fresh target.
    pub fn origin() -> Self {
        Self::default()
    }

    /// A watermark seeded at `timestamp`.
    pub fn at(timestamp: Timestamp) -> Self {
        Self {
            last_synced_at: timestamp,
        }
    }

    /// The current bound.
    pub fn last_synced_at(&self) -> Timestamp {
        self.last_synced_at
    }

    /// Move the bound forward to `candidate`. Lower values are ignored.
    ///
    /// Returns true if the watermark moved.
    pub fn advance(&mut self, candidate: Timestamp) -> bool {
        if candidate > self.last_synced_at {
            self.last_synced_at = candidate;
            true
        } else {
            false
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.last_synced_at)
    }
}

/// How the delta strategy picks the next watermark after applying a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdvancePolicy {
    /// Greatest `updated_at` in the applied batch. An empty batch leaves the
    /// watermark unchanged.
    #[default]
    MaxObserved,
    /// Clock reading taken just before the query was issued. Only sound when
    /// the engine clock is the store clock.
    QueryStart,
    /// Clock reading after the batch was applied. Skips writes that land
    /// between the query and the advance with an earlier timestamp.
    WallClock,
}

impl AdvancePolicy {
    /// Pick the advance target from what one delta cycle observed.
    pub fn select(
        self,
        max_observed: Option<Timestamp>,
        query_started: Timestamp,
        finished: Timestamp,
    ) -> Option<Timestamp> {
        match self {
            AdvancePolicy::MaxObserved => max_observed,
            AdvancePolicy::QueryStart => Some(query_started),
            AdvancePolicy::WallClock => Some(finished),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            AdvancePolicy::MaxObserved => "max-observed",
            AdvancePolicy::QueryStart => "query-start",
            AdvancePolicy::WallClock => "wall-clock",
        }
    }
}

impl fmt::Display for AdvancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdvancePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max-observed" => Ok(AdvancePolicy::MaxObserved),
            "query-start" => Ok(AdvancePolicy::QueryStart),
            "wall-clock" => Ok(AdvancePolicy::WallClock),
            other => Err(format!("unknown watermark policy: {other}")),
        }
    }
}
