// VecBatch — transport.rs
// Transport boundary and translation of raw batch responses into
// per-record outcomes.
// Author: d65v <https://github.com/d65v>
//
// Two response shapes exist:
//   REST — one JSON object per submitted record, same order, each with its
//          own status.
//   RPC  — a sparse list of (index, error) pairs; every index not listed
//          succeeded.
// Wire mechanics (HTTP, gRPC channels, TLS) live behind `Transport`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::record::{
    AggregatedError, ConsistencyLevel, NamedVectors, OutcomeStatus, Properties, Record,
    RecordOutcome,
};

pub const STATUS_OK: u16 = 200;
/// Response-level status reported alongside per-record failures.
pub const STATUS_PARTIAL_FAILURE: u16 = 207;

// ── Transport Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Target unreachable or refused the connection.
    Connection,
    /// No response within the deadline; the write may still have landed.
    Timeout,
    Other,
}

/// A batch request that could not be completed at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Connection,
            status: None,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Timeout,
            status: None,
            message: message.into(),
        }
    }

    pub fn other(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Other,
            status,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status.unwrap_or(0)
    }
}

// ── Raw Response Shapes ───────────────────────────────────────────────────────

/// One element of a REST batch response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestObjectResponse {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "class", default)]
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vectors: Option<NamedVectors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time_unix: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time_unix: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RestObjectResult>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RestObjectResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<RestErrors>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RestErrors {
    #[serde(default)]
    pub error: Vec<RestErrorItem>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RestErrorItem {
    pub message: String,
}

impl RestObjectResponse {
    fn error_messages(&self) -> Vec<String> {
        self.result
            .as_ref()
            .and_then(|r| r.errors.as_ref())
            .map(|e| e.error.iter().map(|item| item.message.clone()).collect())
            .unwrap_or_default()
    }

    fn is_failed(&self) -> bool {
        let failed_status = self
            .result
            .as_ref()
            .and_then(|r| r.status.as_deref())
            .is_some_and(|s| s.eq_ignore_ascii_case("FAILED"));
        failed_status || !self.error_messages().is_empty()
    }
}

/// Decode a REST batch response body.
pub fn decode_rest_body(body: &str) -> crate::Result<Vec<RestObjectResponse>> {
    Ok(serde_json::from_str(body)?)
}

/// One entry of the sparse RPC error list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcBatchError {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RpcBatchReply {
    /// Server-side processing time in seconds.
    pub took: f32,
    pub errors: Vec<RpcBatchError>,
}

/// What a transport hands back for a batch it managed to deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum RawBatchResponse {
    Rest(Vec<RestObjectResponse>),
    Rpc(RpcBatchReply),
}

// ── Transport Trait ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Rest,
    Rpc,
}

/// Whether per-record failures also raise a response-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialFailurePolicy {
    /// Per-record statuses only; the response itself stays successful.
    PerRecordOnly,
    /// Per-record statuses plus a `STATUS_PARTIAL_FAILURE` response and an
    /// aggregated error mirroring the per-record messages.
    ReportPartialFailure,
}

impl TransportKind {
    pub fn default_policy(self) -> PartialFailurePolicy {
        match self {
            TransportKind::Rest => PartialFailurePolicy::PerRecordOnly,
            TransportKind::Rpc => PartialFailurePolicy::ReportPartialFailure,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn partial_failure_policy(&self) -> PartialFailurePolicy {
        self.kind().default_policy()
    }

    /// Send one batch.
    ///
    /// # Errors
    /// Returns `TransportError` when the request could not be completed;
    /// per-record rejections are part of the `Ok` response.
    async fn send(
        &self,
        batch: &[Record],
        consistency: Option<ConsistencyLevel>,
    ) -> Result<RawBatchResponse, TransportError>;
}

// ── Translation ───────────────────────────────────────────────────────────────

/// A delivered batch, translated into outcomes aligned with the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResponse {
    pub status_code: u16,
    pub outcomes: Vec<RecordOutcome>,
    pub error: Option<AggregatedError>,
}

pub fn translate(
    batch: &[Record],
    raw: RawBatchResponse,
    policy: PartialFailurePolicy,
) -> BatchResponse {
    match raw {
        RawBatchResponse::Rest(objects) => translate_rest(batch, objects, policy),
        RawBatchResponse::Rpc(reply) => translate_rpc(batch, reply, policy),
    }
}

/// Index-for-index translation of a REST response.
pub fn translate_rest(
    batch: &[Record],
    objects: Vec<RestObjectResponse>,
    policy: PartialFailurePolicy,
) -> BatchResponse {
    if objects.len() != batch.len() {
        log::warn!(
            "REST batch response has {} objects for {} submitted records",
            objects.len(),
            batch.len()
        );
    }

    let answered = objects.len();
    let mut messages = Vec::new();
    let mut outcomes: Vec<RecordOutcome> = objects
        .into_iter()
        .map(|object| {
            let errors = object.error_messages();
            let status = if object.is_failed() {
                OutcomeStatus::Failed
            } else {
                OutcomeStatus::Success
            };
            if status == OutcomeStatus::Failed {
                messages.extend(errors.iter().cloned());
            }
            RecordOutcome {
                id: object.id,
                collection: object.collection,
                status,
                tenant: object.tenant,
                vector: object.vector,
                vectors: object.vectors.unwrap_or_default(),
                creation_time_unix: object.creation_time_unix,
                last_update_time_unix: object.last_update_time_unix,
                additional: object.additional.unwrap_or_default(),
                errors,
            }
        })
        .collect();

    // Records the server never answered for.
    for record in batch.iter().skip(answered) {
        let message = format!("no response object for record {}", record.id());
        messages.push(message.clone());
        outcomes.push(RecordOutcome::failed(record, message));
    }

    let has_failures = outcomes.iter().any(|o| !o.is_success());
    finish(outcomes, messages, has_failures, policy)
}

/// Expand a sparse RPC error list over the whole batch.
pub fn translate_rpc(
    batch: &[Record],
    reply: RpcBatchReply,
    policy: PartialFailurePolicy,
) -> BatchResponse {
    let errors: BTreeMap<usize, String> = reply
        .errors
        .into_iter()
        .map(|e| (e.index, e.error))
        .collect();

    let mut messages = Vec::with_capacity(errors.len());
    let outcomes: Vec<RecordOutcome> = batch
        .iter()
        .enumerate()
        .map(|(index, record)| match errors.get(&index) {
            Some(message) => {
                messages.push(message.clone());
                RecordOutcome::failed(record, message.clone())
            }
            None => RecordOutcome::succeeded(record),
        })
        .collect();

    if let Some((&index, _)) = errors.range(batch.len()..).next() {
        log::warn!(
            "RPC batch reply reports error for index {} beyond batch of {}",
            index,
            batch.len()
        );
    }

    let has_failures = !messages.is_empty();
    finish(outcomes, messages, has_failures, policy)
}

fn finish(
    outcomes: Vec<RecordOutcome>,
    messages: Vec<String>,
    has_failures: bool,
    policy: PartialFailurePolicy,
) -> BatchResponse {
    match policy {
        PartialFailurePolicy::ReportPartialFailure if has_failures => BatchResponse {
            status_code: STATUS_PARTIAL_FAILURE,
            outcomes,
            error: Some(AggregatedError::new(STATUS_PARTIAL_FAILURE, messages)),
        },
        _ => BatchResponse {
            status_code: STATUS_OK,
            outcomes,
            error: None,
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
