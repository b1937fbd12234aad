// VecBatch — reconcile.rs
// Post-timeout verification: did the write land anyway?
// Author: d65v <https://github.com/d65v>
//
// A client-side timeout says nothing about the server; the request may have
// completed after the client stopped waiting. Before resubmitting, each
// record is looked up by id and compared with what was sent.

use async_trait::async_trait;
use futures::future::join_all;

use crate::record::{Record, RecordOutcome, StoredRecord};
use crate::transport::TransportError;

// ── Probe Trait ───────────────────────────────────────────────────────────────

#[async_trait]
pub trait ReconciliationProbe: Send + Sync {
    /// Point read by id, including the vector(s).
    ///
    /// `Ok(None)` means the record does not exist on the server.
    async fn fetch_by_id_with_vector(
        &self,
        id: &str,
        collection: &str,
        tenant: Option<&str>,
    ) -> Result<Option<StoredRecord>, TransportError>;
}

// ── Reconciliation ────────────────────────────────────────────────────────────

/// Outcome of one reconciliation round.
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Records confirmed on the server, as the server reports them.
    pub created: Vec<RecordOutcome>,
    /// Records that must be sent again, in batch order.
    pub rerun: Vec<Record>,
}

/// Look up every record of `batch` and split it into confirmed and rerun.
///
/// Lookups run concurrently; lookup errors and misses count as "not written".
pub async fn reconcile(probe: &dyn ReconciliationProbe, batch: Vec<Record>) -> Reconciliation {
    let lookups = batch.iter().map(|record| {
        probe.fetch_by_id_with_vector(record.id(), &record.collection, record.tenant.as_deref())
    });
    let found = join_all(lookups).await;

    let mut round = Reconciliation::default();
    for (record, lookup) in batch.into_iter().zip(found) {
        match lookup {
            Ok(Some(stored)) if matches_submitted(&record, &stored) => {
                round.created.push(RecordOutcome::from_stored(stored));
            }
            Ok(Some(_)) => {
                log::debug!("reconcile: '{}' exists but differs, rerunning", record.id());
                round.rerun.push(record);
            }
            Ok(None) => round.rerun.push(record),
            Err(e) => {
                log::debug!("reconcile: lookup of '{}' failed: {}", record.id(), e);
                round.rerun.push(record);
            }
        }
    }
    round
}

/// The server copy counts as the submitted record only if the default
/// vector, the named vectors and the properties all compare equal.
pub fn matches_submitted(record: &Record, stored: &StoredRecord) -> bool {
    record.vector == stored.vector
        && record.vectors == stored.vectors
        && record.properties == stored.properties
}

// ── Tests ─────────────────────────────────────────────────────────────────────
