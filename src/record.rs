// VecBatch — record.rs
// Records, per-record outcomes and the aggregated batch result.
// Author: d65v <https://github.com/d65v>

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Property map of a record, as sent to and returned by the server.
pub type Properties = Map<String, Value>;

/// Named vectors of a record (`name → vector`).
pub type NamedVectors = HashMap<String, Vec<f32>>;

// ── Consistency ───────────────────────────────────────────────────────────────

/// Replication consistency hint forwarded to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsistencyLevel {
    One,
    Quorum,
    All,
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::All => "ALL",
        };
        f.write_str(s)
    }
}

// ── Record ────────────────────────────────────────────────────────────────────

/// A record waiting to be written.
///
/// `id` may be left empty by the caller; the buffer assigns a random UUID
/// when the record is appended and never touches it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "class")]
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(skip)]
    pub consistency_level: Option<ConsistencyLevel>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub vectors: NamedVectors,
}

impl Record {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            id: None,
            collection: collection.into(),
            tenant: None,
            consistency_level: None,
            properties: Properties::new(),
            vector: None,
            vectors: NamedVectors::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.consistency_level = Some(level);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_named_vector(mut self, name: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(name.into(), vector);
        self
    }

    /// Identifier of the record, or `""` if none has been assigned yet.
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Assign a fresh UUID if the record has no identifier. Returns the id.
    pub fn ensure_id(&mut self) -> &str {
        self.id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .as_str()
    }
}

// ── Stored Record ─────────────────────────────────────────────────────────────

/// A record as the server holds it, returned by point lookups.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: String,
    #[serde(rename = "class")]
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub vectors: NamedVectors,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time_unix: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time_unix: Option<i64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional: Map<String, Value>,
}

// ── Outcomes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// Per-record verdict of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub id: String,
    pub collection: String,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub vectors: NamedVectors,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time_unix: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time_unix: Option<i64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl RecordOutcome {
    /// Success echoing what was submitted.
    pub fn succeeded(record: &Record) -> Self {
        Self {
            id: record.id().to_string(),
            collection: record.collection.clone(),
            status: OutcomeStatus::Success,
            tenant: record.tenant.clone(),
            vector: record.vector.clone(),
            vectors: record.vectors.clone(),
            creation_time_unix: None,
            last_update_time_unix: None,
            additional: Map::new(),
            errors: Vec::new(),
        }
    }

    pub fn failed(record: &Record, message: impl Into<String>) -> Self {
        Self {
            id: record.id().to_string(),
            collection: record.collection.clone(),
            status: OutcomeStatus::Failed,
            tenant: record.tenant.clone(),
            vector: None,
            vectors: NamedVectors::new(),
            creation_time_unix: None,
            last_update_time_unix: None,
            additional: Map::new(),
            errors: vec![message.into()],
        }
    }

    /// Success synthesised from the server's copy of a record.
    pub fn from_stored(stored: StoredRecord) -> Self {
        Self {
            id: stored.id,
            collection: stored.collection,
            status: OutcomeStatus::Success,
            tenant: stored.tenant,
            vector: stored.vector,
            vectors: stored.vectors,
            creation_time_unix: stored.creation_time_unix,
            last_update_time_unix: stored.last_update_time_unix,
            additional: stored.additional,
            errors: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

// ── Aggregated Result ─────────────────────────────────────────────────────────

/// Error attached to a result: one message per still-failing condition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Error)]
#[error("{}", .messages.join("; "))]
pub struct AggregatedError {
    pub status_code: u16,
    pub messages: Vec<String>,
}

impl AggregatedError {
    pub fn new(status_code: u16, messages: Vec<String>) -> Self {
        Self {
            status_code,
            messages,
        }
    }
}

/// Terminal outcome of submitting one batch, merging all attempts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregatedResult {
    pub status_code: u16,
    /// `None` when no record produced an outcome.
    pub outcomes: Option<Vec<RecordOutcome>>,
    pub error: Option<AggregatedError>,
    /// Transport calls consumed by the batch.
    pub attempts: u32,
}

impl AggregatedResult {
    pub fn has_errors(&self) -> bool {
        self.error.is_some()
    }

    pub fn outcomes(&self) -> &[RecordOutcome] {
        self.outcomes.as_deref().unwrap_or_default()
    }

    pub fn failed(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes().iter().filter(|o| !o.is_success())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_id_assigns_once() {
        let mut record = Record::new("Article");
        let first = record.ensure_id().to_string();
        assert!(!first.is_empty());
        assert_eq!(record.ensure_id(), first);
        assert_eq!(record.id(), first);
    }

    #[test]
    fn test_ensure_id_keeps_preset() {
        let mut record = Record::new("Article").with_id("fixed");
        assert_eq!(record.ensure_id(), "fixed");
    }

    #[test]
    fn test_record_serializes_collection_as_class() {
        let record = Record::new("Article")
            .with_id("a1")
            .with_property("title", "hello")
            .with_vector(vec![0.5, 0.5]);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["class"], "Article");
        assert_eq!(json["properties"]["title"], "hello");
        assert!(json.get("vectors").is_none());
    }

    #[test]
    fn test_outcome_from_stored_keeps_server_metadata() {
        let stored = StoredRecord {
            id: "a1".into(),
            collection: "Article".into(),
            creation_time_unix: Some(42),
            vector: Some(vec![1.0]),
            ..Default::default()
        };
        let outcome = RecordOutcome::from_stored(stored);
        assert!(outcome.is_success());
        assert_eq!(outcome.creation_time_unix, Some(42));
        assert_eq!(outcome.vector, Some(vec![1.0]));
    }

    #[test]
    fn test_aggregated_error_display_joins_messages() {
        let err = AggregatedError::new(500, vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "a; b");
    }

    #[test]
    fn test_result_outcomes_empty_when_none() {
        let result = AggregatedResult::default();
        assert!(result.outcomes().is_empty());
        assert!(!result.has_errors());
    }
}
