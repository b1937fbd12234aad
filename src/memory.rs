// VecBatch — memory.rs
// In-process vector store that speaks both batch response shapes, with
// fault injection. Backs the demo binary, the bench and the engine tests.
// Author: d65v <https://github.com/d65v>

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;

use crate::reconcile::ReconciliationProbe;
use crate::record::{ConsistencyLevel, Record, StoredRecord};
use crate::transport::{
    decode_rest_body, RawBatchResponse, RestErrorItem, RestErrors, RestObjectResponse,
    RestObjectResult, RpcBatchError, RpcBatchReply, Transport, TransportError, TransportKind,
};

// ── Faults ────────────────────────────────────────────────────────────────────

/// A failure the server simulates for one batch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Nothing is written; the client sees a refused connection.
    ConnectionRefused,
    /// The client gives up waiting. With `landed` the write still happens.
    Timeout { landed: bool },
    /// Nothing is written; the server answers with this status.
    Unavailable(u16),
}

impl Fault {
    fn into_error(self) -> TransportError {
        match self {
            Fault::ConnectionRefused => TransportError::connection("connection refused"),
            Fault::Timeout { .. } => TransportError::timeout("read timed out"),
            Fault::Unavailable(status) => {
                TransportError::other(Some(status), format!("server answered {status}"))
            }
        }
    }
}

type Key = (String, String);

// ── Server ────────────────────────────────────────────────────────────────────

pub struct MemoryServer {
    /// Required vector dimensionality, if any.
    dim: Option<usize>,
    records: Mutex<HashMap<Key, StoredRecord>>,
    faults: Mutex<VecDeque<Fault>>,
    /// Probability of a random fault per request, in `[0, 1]`.
    fault_rate: f64,
    requests: AtomicUsize,
    levels: Mutex<Vec<Option<ConsistencyLevel>>>,
    started: Instant,
}

impl MemoryServer {
    pub fn new(dim: Option<usize>) -> Self {
        Self {
            dim,
            records: Mutex::new(HashMap::new()),
            faults: Mutex::new(VecDeque::new()),
            fault_rate: 0.0,
            requests: AtomicUsize::new(0),
            levels: Mutex::new(Vec::new()),
            started: Instant::now(),
        }
    }

    /// Fail a random share of requests (connection, timeout or 503).
    pub fn with_random_faults(mut self, rate: f64) -> Self {
        self.fault_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Queue `fault` for the next batch request.
    pub fn inject(&self, fault: Fault) {
        self.faults.lock().push_back(fault);
    }

    /// REST-shaped front: JSON body with one object per record.
    pub fn rest(self: &Arc<Self>) -> RestFront {
        RestFront {
            server: Arc::clone(self),
        }
    }

    /// RPC-shaped front: sparse per-index errors.
    pub fn rpc(self: &Arc<Self>) -> RpcFront {
        RpcFront {
            server: Arc::clone(self),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<StoredRecord> {
        self.records
            .lock()
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
    }

    /// Batch requests received, faulted ones included.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Consistency level of each batch request, in arrival order.
    pub fn consistency_levels(&self) -> Vec<Option<ConsistencyLevel>> {
        self.levels.lock().clone()
    }

    fn next_fault(&self) -> Option<Fault> {
        if let Some(fault) = self.faults.lock().pop_front() {
            return Some(fault);
        }
        if self.fault_rate <= 0.0 {
            return None;
        }
        let mut rng = rand::thread_rng();
        if !rng.gen_bool(self.fault_rate) {
            return None;
        }
        Some(match rng.gen_range(0..4) {
            0 => Fault::ConnectionRefused,
            1 => Fault::Timeout { landed: false },
            2 => Fault::Timeout { landed: true },
            _ => Fault::Unavailable(503),
        })
    }

    /// Apply a batch request: either a fault or one verdict per record
    /// (`None` = written, `Some(reason)` = rejected).
    fn receive(
        &self,
        batch: &[Record],
        consistency: Option<ConsistencyLevel>,
    ) -> Result<Vec<Option<String>>, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.levels.lock().push(consistency);
        match self.next_fault() {
            Some(Fault::Timeout { landed: true }) => {
                self.write_batch(batch);
                Err(Fault::Timeout { landed: true }.into_error())
            }
            Some(fault) => Err(fault.into_error()),
            None => Ok(self.write_batch(batch)),
        }
    }

    fn write_batch(&self, batch: &[Record]) -> Vec<Option<String>> {
        let now = unix_millis();
        let mut records = self.records.lock();
        batch
            .iter()
            .map(|record| {
                if let Err(reason) = self.validate(record) {
                    return Some(reason);
                }
                let key = (record.collection.clone(), record.id().to_string());
                let created = records
                    .get(&key)
                    .and_then(|existing| existing.creation_time_unix)
                    .unwrap_or(now);
                records.insert(
                    key,
                    StoredRecord {
                        id: record.id().to_string(),
                        collection: record.collection.clone(),
                        tenant: record.tenant.clone(),
                        properties: record.properties.clone(),
                        vector: record.vector.clone(),
                        vectors: record.vectors.clone(),
                        creation_time_unix: Some(created),
                        last_update_time_unix: Some(now),
                        ..Default::default()
                    },
                );
                None
            })
            .collect()
    }

    fn validate(&self, record: &Record) -> Result<(), String> {
        if record.collection.is_empty() {
            return Err("collection name is empty".to_string());
        }
        if record.id().is_empty() {
            return Err("record has no id".to_string());
        }
        if let (Some(dim), Some(vector)) = (self.dim, record.vector.as_ref()) {
            if vector.len() != dim {
                return Err(format!(
                    "Dimension mismatch: expected {}, got {}",
                    dim,
                    vector.len()
                ));
            }
        }
        Ok(())
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl ReconciliationProbe for MemoryServer {
    async fn fetch_by_id_with_vector(
        &self,
        id: &str,
        collection: &str,
        tenant: Option<&str>,
    ) -> Result<Option<StoredRecord>, TransportError> {
        Ok(self
            .get(collection, id)
            .filter(|stored| tenant.is_none() || stored.tenant.as_deref() == tenant))
    }
}

// ── Fronts ────────────────────────────────────────────────────────────────────

pub struct RestFront {
    server: Arc<MemoryServer>,
}

#[async_trait]
impl Transport for RestFront {
    fn kind(&self) -> TransportKind {
        TransportKind::Rest
    }

    async fn send(
        &self,
        batch: &[Record],
        consistency: Option<ConsistencyLevel>,
    ) -> Result<RawBatchResponse, TransportError> {
        log::trace!("rest: {} records, consistency={:?}", batch.len(), consistency);
        let verdicts = self.server.receive(batch, consistency)?;

        let objects: Vec<RestObjectResponse> = batch
            .iter()
            .zip(verdicts)
            .map(|(record, verdict)| rest_object(record, verdict))
            .collect();

        // Round-trip through JSON, as a real HTTP body would.
        let body = serde_json::to_string(&objects)
            .map_err(|e| TransportError::other(Some(500), e.to_string()))?;
        let decoded = decode_rest_body(&body)
            .map_err(|e| TransportError::other(Some(500), e.to_string()))?;
        Ok(RawBatchResponse::Rest(decoded))
    }
}

fn rest_object(record: &Record, verdict: Option<String>) -> RestObjectResponse {
    let (status, errors) = match verdict {
        None => ("SUCCESS", None),
        Some(message) => (
            "FAILED",
            Some(RestErrors {
                error: vec![RestErrorItem { message }],
            }),
        ),
    };
    RestObjectResponse {
        id: record.id().to_string(),
        collection: record.collection.clone(),
        tenant: record.tenant.clone(),
        properties: Some(record.properties.clone()),
        vector: record.vector.clone(),
        vectors: (!record.vectors.is_empty()).then(|| record.vectors.clone()),
        result: Some(RestObjectResult {
            status: Some(status.to_string()),
            errors,
        }),
        ..Default::default()
    }
}

pub struct RpcFront {
    server: Arc<MemoryServer>,
}

#[async_trait]
impl Transport for RpcFront {
    fn kind(&self) -> TransportKind {
        TransportKind::Rpc
    }

    async fn send(
        &self,
        batch: &[Record],
        consistency: Option<ConsistencyLevel>,
    ) -> Result<RawBatchResponse, TransportError> {
        log::trace!("rpc: {} records, consistency={:?}", batch.len(), consistency);
        let start = Instant::now();
        let verdicts = self.server.receive(batch, consistency)?;
        let errors = verdicts
            .into_iter()
            .enumerate()
            .filter_map(|(index, verdict)| verdict.map(|error| RpcBatchError { index, error }))
            .collect();
        Ok(RawBatchResponse::Rpc(RpcBatchReply {
            took: start.elapsed().as_secs_f32(),
            errors,
        }))
    }
}

impl std::fmt::Debug for MemoryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryServer")
            .field("dim", &self.dim)
            .field("records", &self.len())
            .field("requests", &self.requests())
            .field("uptime", &self.started.elapsed())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
