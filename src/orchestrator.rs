// VecBatch — orchestrator.rs
// Drives one batch through as many attempts as the retry budget allows.
// Author: d65v <https://github.com/d65v>
//
// Failure classes:
//   Connection → wait `n × interval`, resend the unmodified batch.
//   Timeout    → reconcile, wait `n × interval`, resend only what is
//                still unconfirmed.
//   Other      → terminal.
// Per-record rejections arrive inside a delivered response and are never
// retried here.

use std::sync::Arc;

use crate::config::{OutcomeOrdering, RetryBudget};
use crate::delay::DelayStrategy;
use crate::merge::{merge_results, MergeInput};
use crate::reconcile::{reconcile, ReconciliationProbe};
use crate::record::{AggregatedResult, ConsistencyLevel, Record, RecordOutcome};
use crate::transport::{translate, BatchResponse, Transport, TransportError, TransportErrorKind};

/// Mutable state of one batch across attempts.
#[derive(Debug)]
struct RetryState {
    batch: Vec<Record>,
    attempts: u32,
    connection_errors: u32,
    timeout_errors: u32,
    reconciled: Vec<RecordOutcome>,
    transport_errors: Vec<String>,
    last_error_status: u16,
}

impl RetryState {
    fn new(batch: Vec<Record>) -> Self {
        Self {
            batch,
            attempts: 0,
            connection_errors: 0,
            timeout_errors: 0,
            reconciled: Vec::new(),
            transport_errors: Vec::new(),
            last_error_status: 0,
        }
    }

    fn record_error(&mut self, err: &TransportError) {
        self.transport_errors.push(err.message.clone());
        self.last_error_status = err.status_code();
    }
}

pub struct RetryOrchestrator {
    budget: RetryBudget,
    transport: Arc<dyn Transport>,
    probe: Arc<dyn ReconciliationProbe>,
    delay: Arc<dyn DelayStrategy>,
    consistency: Option<ConsistencyLevel>,
    ordering: OutcomeOrdering,
}

impl RetryOrchestrator {
    pub fn new(
        budget: RetryBudget,
        transport: Arc<dyn Transport>,
        probe: Arc<dyn ReconciliationProbe>,
        delay: Arc<dyn DelayStrategy>,
    ) -> Self {
        Self {
            budget,
            transport,
            probe,
            delay,
            consistency: None,
            ordering: OutcomeOrdering::default(),
        }
    }

    pub fn with_consistency_level(mut self, level: Option<ConsistencyLevel>) -> Self {
        self.consistency = level;
        self
    }

    pub fn with_ordering(mut self, ordering: OutcomeOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Submit `batch` and retry until it succeeds, is fully reconciled, or
    /// the budget for its failure class is spent.
    pub async fn run(&self, batch: Vec<Record>) -> AggregatedResult {
        if batch.is_empty() {
            return AggregatedResult::default();
        }

        let submitted: Vec<(String, String)> = batch
            .iter()
            .map(|r| (r.collection.clone(), r.id().to_string()))
            .collect();
        // Engine-wide level wins; otherwise the first record's hint applies
        // to the whole batch.
        let consistency = self
            .consistency
            .or_else(|| batch.first().and_then(|r| r.consistency_level));
        let policy = self.transport.partial_failure_policy();
        let mut state = RetryState::new(batch);

        loop {
            state.attempts += 1;
            log::debug!(
                "sending batch of {} records (attempt {})",
                state.batch.len(),
                state.attempts
            );

            let sent = self.transport.send(&state.batch, consistency).await;
            let err = match sent {
                Ok(raw) => {
                    let response = translate(&state.batch, raw, policy);
                    return self.finish(state, Some(response), &[], &submitted);
                }
                Err(err) => err,
            };
            state.record_error(&err);

            match err.kind {
                TransportErrorKind::Connection => {
                    if state.connection_errors >= self.budget.max_connection_retries() {
                        log::warn!(
                            "connection retries exhausted after {} attempts: {}",
                            state.attempts,
                            err
                        );
                        break;
                    }
                    state.connection_errors += 1;
                    let delay = self.budget.delay_for(state.connection_errors);
                    log::warn!(
                        "connection error ({}), retry {}/{} in {:?}",
                        err,
                        state.connection_errors,
                        self.budget.max_connection_retries(),
                        delay
                    );
                    self.delay.wait(delay).await;
                }
                TransportErrorKind::Timeout => {
                    let batch = std::mem::take(&mut state.batch);
                    let round = reconcile(self.probe.as_ref(), batch).await;
                    log::debug!(
                        "timeout reconciliation: {} confirmed, {} to rerun",
                        round.created.len(),
                        round.rerun.len()
                    );
                    state.reconciled.extend(round.created);
                    state.batch = round.rerun;

                    if state.batch.is_empty() {
                        return self.finish(state, None, &[], &submitted);
                    }
                    if state.timeout_errors >= self.budget.max_timeout_retries() {
                        log::warn!(
                            "timeout retries exhausted, {} records unconfirmed",
                            state.batch.len()
                        );
                        break;
                    }
                    state.timeout_errors += 1;
                    let delay = self.budget.delay_for(state.timeout_errors);
                    log::warn!(
                        "timeout ({}), retry {}/{} of {} records in {:?}",
                        err,
                        state.timeout_errors,
                        self.budget.max_timeout_retries(),
                        state.batch.len(),
                        delay
                    );
                    self.delay.wait(delay).await;
                }
                TransportErrorKind::Other => {
                    log::warn!("batch failed, not retrying: {}", err);
                    break;
                }
            }
        }

        let failed = std::mem::take(&mut state.batch);
        self.finish(state, None, &failed, &submitted)
    }

    fn finish(
        &self,
        state: RetryState,
        latest: Option<BatchResponse>,
        failed: &[Record],
        submitted: &[(String, String)],
    ) -> AggregatedResult {
        merge_results(MergeInput {
            latest,
            reconciled: state.reconciled,
            failed,
            transport_errors: state.transport_errors,
            last_error_status: state.last_error_status,
            attempts: state.attempts,
            ordering: self.ordering,
            submitted,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
