//! Query filters and pagination windows understood by every record store.

use crate::{Record, RecordId, Timestamp};
use serde_json::Value;
use std::cmp::Ordering;

/// Comparison operator used by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    /// Whether an ordering between a stored value and the operand satisfies this operator.
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Gte => ordering != Ordering::Less,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Lte => ordering != Ordering::Greater,
        }
    }

    /// SQL spelling of the operator.
    pub fn as_sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
        }
    }
}

/// A single predicate over a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Identity equality
    Id(RecordId),
    /// Comparison against `updated_at`
    UpdatedAt(Comparison, Timestamp),
    /// Comparison against a top-level payload field
    Field(String, Comparison, Value),
}

impl Condition {
    /// Evaluate the condition against a record.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Condition::Id(id) => record.id == *id,
            Condition::UpdatedAt(op, ts) => op.accepts(record.updated_at.cmp(ts)),
            Condition::Field(name, op, operand) => match record.payload.get(name) {
                Some(value) => compare_json(value, operand).is_some_and(|o| op.accepts(o)),
                None => false,
            },
        }
    }
}

/// Order two JSON scalars of the same kind. Mixed kinds are incomparable.
fn compare_json(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

/// A conjunction of conditions. The empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Match every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match the record with the given identity.
    pub fn by_id(id: impl Into<RecordId>) -> Self {
        Self::all().id(id)
    }

    /// Match records written strictly after `timestamp`.
    pub fn updated_after(timestamp: Timestamp) -> Self {
        Self::all().updated_at(Comparison::Gt, timestamp)
    }

    /// Add an identity condition.
    pub fn id(mut self, id: impl Into<RecordId>) -> Self {
        self.conditions.push(Condition::Id(id.into()));
        self
    }

    /// Add an `updated_at` comparison.
    pub fn updated_at(mut self, op: Comparison, timestamp: Timestamp) -> Self {
        self.conditions.push(Condition::UpdatedAt(op, timestamp));
        self
    }

    /// Add a payload field equality.
    pub fn field_eq(self, name: impl Into<String>, value: Value) -> Self {
        self.field(name, Comparison::Eq, value)
    }

    /// Add a payload field comparison.
    pub fn field(mut self, name: impl Into<String>, op: Comparison, value: Value) -> Self {
        self.conditions.push(Condition::Field(name.into(), op, value));
        self
    }

    /// The conditions, in the order they were added.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Whether the filter places no restriction at all.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate every condition against a record.
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }
}

/// A window into an ordered result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    /// Maximum number of records; `None` means no limit
    pub limit: Option<u64>,
    /// Number of leading records to skip
    pub offset: u64,
}

impl Page {
    /// Every matching record.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// At most `limit` records after skipping `offset`.
    pub fn new(limit: u64, offset: u64) -> Self {
        Self {
            limit: Some(limit),
            offset,
        }
    }
}
