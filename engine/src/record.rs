//! Record types exchanged with record stores.

use crate::{RecordId, Timestamp};
use serde::{Deserialize, Serialize};

/// A document held by a record store.
///
/// `id` is assigned by the store on first insert and never changes.
/// `updated_at` is refreshed by the store on every successful write and
/// strictly increases over the record's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable unique identifier
    pub id: RecordId,
    /// When the record was first inserted (milliseconds since epoch)
    pub created_at: Timestamp,
    /// When the record was last written (milliseconds since epoch)
    pub updated_at: Timestamp,
    /// Business fields (opaque JSON object)
    pub payload: serde_json::Value,
}

impl Record {
    /// Create a record with identical creation and update times.
    pub fn new(id: impl Into<RecordId>, payload: serde_json::Value, timestamp: Timestamp) -> Self {
        Self {
            id: id.into(),
            created_at: timestamp,
            updated_at: timestamp,
            payload,
        }
    }

    /// Read a top-level payload field.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.payload.get(name)
    }
}

/// A document about to be inserted.
///
/// Missing `id` and timestamps are assigned by the store. A document built
/// from an existing [`Record`] carries every field verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    pub payload: serde_json::Value,
}

impl Document {
    /// A fresh document; the store assigns identity and timestamps.
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: None,
            created_at: None,
            updated_at: None,
            payload,
        }
    }

    /// Set an explicit identifier.
    pub fn with_id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl From<Record> for Document {
    fn from(record: Record) -> Self {
        Self {
            id: Some(record.id),
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
            payload: record.payload,
        }
    }
}

/// A modification applied by `update`.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Overwrite the listed top-level payload fields, keeping the rest.
    Set(serde_json::Map<String, serde_json::Value>),
    /// Replace the whole payload.
    Replace(serde_json::Value),
}

impl Patch {
    /// Convenience for a single-field `Set`.
    pub fn set(field: impl Into<String>, value: serde_json::Value) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert(field.into(), value);
        Patch::Set(fields)
    }

    /// Apply the patch to a payload in place.
    pub fn apply_to(&self, payload: &mut serde_json::Value) {
        match self {
            Patch::Replace(value) => *payload = value.clone(),
            Patch::Set(fields) => {
                if !payload.is_object() {
                    *payload = serde_json::Value::Object(serde_json::Map::new());
                }
                if let Some(object) = payload.as_object_mut() {
                    for (key, value) in fields {
                        object.insert(key.clone(), value.clone());
                    }
                }
            }
        }
    }
}
