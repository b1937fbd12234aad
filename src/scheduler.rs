// VecBatch — scheduler.rs
// Background worker pool for auto-batch mode.
// Author: d65v <https://github.com/d65v>
//
// Batches are handed over on the caller's thread and then run entirely on
// the pool, retry waits included. Retry waits are timer-scheduled, so a
// waiting batch does not occupy a worker. Completion order across batches
// is not defined.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;

use crate::config::{AutoBatchPolicy, BatchCallback};
use crate::orchestrator::RetryOrchestrator;
use crate::record::{AggregatedResult, Record};
use crate::{Result, VecBatchError};

// ── In-Flight Set ─────────────────────────────────────────────────────────────

/// Tickets of submitted batches that have not completed yet.
#[derive(Default)]
pub(crate) struct InFlight {
    tickets: Mutex<HashSet<u64>>,
    idle: Condvar,
}

impl InFlight {
    fn enter(self: &Arc<Self>, ticket: u64) -> InFlightGuard {
        self.tickets.lock().insert(ticket);
        InFlightGuard {
            set: Arc::clone(self),
            ticket,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tickets.lock().len()
    }

    fn wait_idle(&self) {
        let mut tickets = self.tickets.lock();
        while !tickets.is_empty() {
            self.idle.wait(&mut tickets);
        }
    }

    /// Returns `false` if batches were still in flight at `deadline`.
    fn wait_idle_until(&self, deadline: Instant) -> bool {
        let mut tickets = self.tickets.lock();
        while !tickets.is_empty() {
            if self.idle.wait_until(&mut tickets, deadline).timed_out() {
                return tickets.is_empty();
            }
        }
        true
    }
}

/// Removes its ticket on drop, whether the batch completed, panicked or
/// was dropped by a forced shutdown.
struct InFlightGuard {
    set: Arc<InFlight>,
    ticket: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut tickets = self.set.tickets.lock();
        tickets.remove(&self.ticket);
        if tickets.is_empty() {
            self.set.idle.notify_all();
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

pub struct AutoBatchScheduler {
    runtime: Option<Runtime>,
    orchestrator: Arc<RetryOrchestrator>,
    in_flight: Arc<InFlight>,
    callback: Option<BatchCallback>,
    shutdown_timeout: Duration,
    next_ticket: AtomicU64,
}

impl AutoBatchScheduler {
    /// Start a pool of `policy.worker_pool_size()` threads.
    pub fn new(policy: &AutoBatchPolicy, orchestrator: Arc<RetryOrchestrator>) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(policy.worker_pool_size())
            .thread_name("vecbatch-worker")
            .enable_time()
            .build()?;

        log::info!(
            "auto-batch scheduler started: batch_size={}, workers={}",
            policy.batch_size(),
            policy.worker_pool_size()
        );

        Ok(Self {
            runtime: Some(runtime),
            orchestrator,
            in_flight: Arc::new(InFlight::default()),
            callback: policy.callback().cloned(),
            shutdown_timeout: policy.shutdown_timeout(),
            next_ticket: AtomicU64::new(0),
        })
    }

    /// Run `batch` on the pool.
    ///
    /// The returned handle resolves to the batch's result; dropping it does
    /// not cancel the batch.
    ///
    /// # Errors
    /// Returns `VecBatchError::Closed` after `close()`.
    pub fn submit(&self, batch: Vec<Record>) -> Result<JoinHandle<AggregatedResult>> {
        let runtime = self.runtime.as_ref().ok_or(VecBatchError::Closed)?;

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let guard = self.in_flight.enter(ticket);
        let orchestrator = Arc::clone(&self.orchestrator);
        let callback = self.callback.clone();

        log::debug!("scheduling batch #{} of {} records", ticket, batch.len());
        Ok(runtime.spawn(async move {
            let _guard = guard;
            let result = orchestrator.run(batch).await;
            if let Some(error) = &result.error {
                log::warn!("batch #{} finished with errors: {}", ticket, error);
            }
            if let Some(callback) = callback {
                callback(&result);
            }
            result
        }))
    }

    /// Block until every batch submitted so far has completed.
    pub fn wait_idle(&self) {
        self.in_flight.wait_idle();
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_closed(&self) -> bool {
        self.runtime.is_none()
    }

    /// Stop accepting batches, give in-flight ones up to the shutdown
    /// timeout, then tear the pool down. Batches still running at that
    /// point are abandoned and never report a result.
    pub fn close(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };

        let deadline = Instant::now() + self.shutdown_timeout;
        if !self.in_flight.wait_idle_until(deadline) {
            log::warn!(
                "shutdown timeout of {:?} elapsed, abandoning {} in-flight batches",
                self.shutdown_timeout,
                self.in_flight.len()
            );
        }

        // Dropping a runtime from inside another runtime's worker panics.
        if tokio::runtime::Handle::try_current().is_ok() {
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(deadline.saturating_duration_since(Instant::now()));
        }
        log::info!("auto-batch scheduler stopped");
    }
}

impl Drop for AutoBatchScheduler {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::config::RetryBudget;
    use crate::delay::ScheduledDelay;
    use crate::record::ConsistencyLevel;
    use crate::testkit::{records, ScriptedTransport, StubProbe};
    use crate::transport::{RawBatchResponse, Transport, TransportError, TransportKind};

    fn orchestrator(transport: Arc<dyn Transport>) -> Arc<RetryOrchestrator> {
        Arc::new(RetryOrchestrator::new(
            RetryBudget::new(1, 1, 10).unwrap(),
            transport,
            Arc::new(StubProbe::default()),
            Arc::new(ScheduledDelay),
        ))
    }

    /// Holds every send for a fixed time.
    struct SlowTransport(Duration);

    #[async_trait]
    impl Transport for SlowTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Rest
        }

        async fn send(
            &self,
            batch: &[Record],
            _consistency: Option<ConsistencyLevel>,
        ) -> std::result::Result<RawBatchResponse, TransportError> {
            tokio::time::sleep(self.0).await;
            Ok(RawBatchResponse::Rest(crate::testkit::ok_rest(batch)))
        }
    }

    #[test]
    fn test_submit_runs_and_invokes_callback() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = Arc::clone(&seen);
        let policy = AutoBatchPolicy::new(2, 2, 1_000)
            .unwrap()
            .with_callback(move |result| {
                seen_cb.fetch_add(result.outcomes().len(), Ordering::SeqCst);
            });
        let mut scheduler =
            AutoBatchScheduler::new(&policy, orchestrator(Arc::new(ScriptedTransport::rest(vec![]))))
                .unwrap();

        scheduler.submit(records(2)).unwrap();
        scheduler.submit(records(3)).unwrap();
        scheduler.wait_idle();

        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert_eq!(scheduler.in_flight(), 0);
        scheduler.close();
    }

    #[test]
    fn test_in_flight_cleared_after_retry_exhaustion() {
        let policy = AutoBatchPolicy::new(2, 1, 1_000).unwrap();
        let transport = Arc::new(ScriptedTransport::always(TransportError::connection("refused")));
        let scheduler = AutoBatchScheduler::new(&policy, orchestrator(transport.clone())).unwrap();

        scheduler.submit(records(2)).unwrap();
        scheduler.wait_idle();

        assert_eq!(transport.calls(), 2);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[test]
    fn test_close_is_idempotent_and_rejects_submit() {
        let policy = AutoBatchPolicy::new(2, 1, 100).unwrap();
        let mut scheduler =
            AutoBatchScheduler::new(&policy, orchestrator(Arc::new(ScriptedTransport::rest(vec![]))))
                .unwrap();
        scheduler.close();
        scheduler.close();
        assert!(scheduler.is_closed());
        assert!(matches!(scheduler.submit(records(1)), Err(VecBatchError::Closed)));
    }

    #[test]
    fn test_close_abandons_after_timeout() {
        let policy = AutoBatchPolicy::new(1, 1, 50).unwrap();
        let mut scheduler = AutoBatchScheduler::new(
            &policy,
            orchestrator(Arc::new(SlowTransport(Duration::from_secs(30)))),
        )
        .unwrap();

        scheduler.submit(records(1)).unwrap();
        let start = Instant::now();
        scheduler.close();

        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(scheduler.is_closed());
    }

    #[test]
    fn test_join_handle_yields_result() {
        let policy = AutoBatchPolicy::new(2, 1, 1_000).unwrap();
        let scheduler =
            AutoBatchScheduler::new(&policy, orchestrator(Arc::new(ScriptedTransport::rest(vec![]))))
                .unwrap();

        let handle = scheduler.submit(records(2)).unwrap();
        let result = futures::executor::block_on(handle).unwrap();
        assert_eq!(result.outcomes().len(), 2);
        assert_eq!(result.attempts, 1);
    }
}
