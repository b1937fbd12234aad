// VecBatch — testkit.rs
// Fakes shared by the unit tests: scripted transport, stub probe,
// zero-time recording delay.
// Author: d65v <https://github.com/d65v>

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::delay::DelayStrategy;
use crate::reconcile::ReconciliationProbe;
use crate::record::{ConsistencyLevel, Record, StoredRecord};
use crate::transport::{
    RawBatchResponse, RestObjectResponse, RestObjectResult, RpcBatchReply, Transport,
    TransportError, TransportKind,
};

pub fn records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            Record::new("Doc")
                .with_id(format!("rec-{i}"))
                .with_property("n", i as u64)
                .with_vector(vec![i as f32, 1.0])
        })
        .collect()
}

/// REST response reporting every record of `batch` as written.
pub fn ok_rest(batch: &[Record]) -> Vec<RestObjectResponse> {
    batch
        .iter()
        .map(|r| RestObjectResponse {
            id: r.id().to_string(),
            collection: r.collection.clone(),
            vector: r.vector.clone(),
            result: Some(RestObjectResult {
                status: Some("SUCCESS".into()),
                errors: None,
            }),
            ..Default::default()
        })
        .collect()
}

// ── Scripted Transport ────────────────────────────────────────────────────────

/// Replays a script of responses; once it runs out, either repeats
/// `fallback` or reports every record as written.
pub struct ScriptedTransport {
    kind: TransportKind,
    script: Mutex<VecDeque<Result<RawBatchResponse, TransportError>>>,
    fallback: Option<TransportError>,
    sizes: Mutex<Vec<usize>>,
    levels: Mutex<Vec<Option<ConsistencyLevel>>>,
}

impl ScriptedTransport {
    pub fn new(kind: TransportKind, script: Vec<Result<RawBatchResponse, TransportError>>) -> Self {
        Self {
            kind,
            script: Mutex::new(script.into()),
            fallback: None,
            sizes: Mutex::new(Vec::new()),
            levels: Mutex::new(Vec::new()),
        }
    }

    pub fn rest(script: Vec<Result<RawBatchResponse, TransportError>>) -> Self {
        Self::new(TransportKind::Rest, script)
    }

    pub fn always(err: TransportError) -> Self {
        Self {
            fallback: Some(err),
            ..Self::rest(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.sizes.lock().len()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.sizes.lock().clone()
    }

    /// Consistency level passed to each `send`.
    pub fn consistency_levels(&self) -> Vec<Option<ConsistencyLevel>> {
        self.levels.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn send(
        &self,
        batch: &[Record],
        consistency: Option<ConsistencyLevel>,
    ) -> Result<RawBatchResponse, TransportError> {
        self.sizes.lock().push(batch.len());
        self.levels.lock().push(consistency);
        if let Some(next) = self.script.lock().pop_front() {
            return next;
        }
        if let Some(err) = &self.fallback {
            return Err(err.clone());
        }
        Ok(match self.kind {
            TransportKind::Rest => RawBatchResponse::Rest(ok_rest(batch)),
            TransportKind::Rpc => RawBatchResponse::Rpc(RpcBatchReply::default()),
        })
    }
}

// ── Stub Probe ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct StubProbe {
    stored: HashMap<String, StoredRecord>,
    failing: HashSet<String>,
}

impl StubProbe {
    pub fn with(mut self, record: StoredRecord) -> Self {
        self.stored.insert(record.id.clone(), record);
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }
}

#[async_trait]
impl ReconciliationProbe for StubProbe {
    async fn fetch_by_id_with_vector(
        &self,
        id: &str,
        _collection: &str,
        _tenant: Option<&str>,
    ) -> Result<Option<StoredRecord>, TransportError> {
        if self.failing.contains(id) {
            return Err(TransportError::connection("probe unavailable"));
        }
        Ok(self.stored.get(id).cloned())
    }
}

// ── Recording Delay ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingDelay {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().clone()
    }
}

#[async_trait]
impl DelayStrategy for RecordingDelay {
    async fn wait(&self, delay: Duration) {
        self.waits.lock().push(delay);
    }
}
