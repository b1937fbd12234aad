// VecBatch — engine.rs
// Public entry point: buffer records, submit them synchronously or let the
// auto-batch scheduler flush them in the background.
// Author: d65v <https://github.com/d65v>

use std::sync::Arc;

use crate::buffer::RecordBuffer;
use crate::config::{AutoBatchPolicy, OutcomeOrdering, RetryBudget};
use crate::delay::{BlockingDelay, DelayStrategy, ScheduledDelay};
use crate::orchestrator::RetryOrchestrator;
use crate::reconcile::ReconciliationProbe;
use crate::record::{AggregatedResult, ConsistencyLevel, Record};
use crate::scheduler::AutoBatchScheduler;
use crate::transport::Transport;
use crate::{Result, VecBatchError};

enum Mode {
    /// Everything runs on the caller's thread.
    Sync { orchestrator: RetryOrchestrator },
    Auto {
        scheduler: AutoBatchScheduler,
        batch_size: usize,
    },
}

/// Batch ingestion engine.
///
/// Mutating calls take `&mut self`: the buffer has exactly one writer, so
/// producers on several threads must share the engine behind their own
/// lock.
pub struct BatchEngine {
    buffer: RecordBuffer,
    mode: Mode,
}

impl BatchEngine {
    pub fn builder(
        transport: Arc<dyn Transport>,
        probe: Arc<dyn ReconciliationProbe>,
    ) -> EngineBuilder {
        EngineBuilder::new(transport, probe)
    }

    /// Buffer `records`, assigning ids where missing.
    ///
    /// In auto-batch mode every full batch is handed to the pool before
    /// this returns.
    ///
    /// # Errors
    /// Returns `VecBatchError::Closed` if the engine was closed in
    /// auto-batch mode.
    pub fn append<I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = Record>,
    {
        if let Mode::Auto { scheduler, .. } = &self.mode {
            if scheduler.is_closed() {
                return Err(VecBatchError::Closed);
            }
        }
        self.buffer.append(records);
        if let Mode::Auto {
            scheduler,
            batch_size,
        } = &self.mode
        {
            let submitted = self.buffer.drain_ready(*batch_size, |batch| {
                scheduler.submit(batch).map(|_| ())
            })?;
            if submitted > 0 {
                log::debug!(
                    "auto-batch: scheduled {} batches, {} records buffered",
                    submitted,
                    self.buffer.len()
                );
            }
        }
        Ok(())
    }

    /// Send everything buffered as one batch and wait for its result.
    ///
    /// In auto-batch mode this is `flush()`: results are delivered through
    /// the callback and `None` is returned.
    ///
    /// # Errors
    /// Returns `VecBatchError::Closed` in auto-batch mode after `close()`;
    /// buffered records are kept.
    pub fn submit(&mut self) -> Result<Option<AggregatedResult>> {
        match &self.mode {
            Mode::Sync { orchestrator } => {
                let batch = self.buffer.extract_all();
                Ok(Some(futures::executor::block_on(orchestrator.run(batch))))
            }
            Mode::Auto { scheduler, .. } => {
                if scheduler.is_closed() {
                    return Err(VecBatchError::Closed);
                }
                let remainder = self.buffer.extract_all();
                if !remainder.is_empty() {
                    scheduler.submit(remainder)?;
                }
                scheduler.wait_idle();
                Ok(None)
            }
        }
    }

    /// Send everything buffered as one batch without blocking the caller.
    ///
    /// In synchronous mode the batch runs on the calling task; retry waits
    /// use the engine's delay strategy, so async callers should build with
    /// `delay_strategy(Arc::new(ScheduledDelay))`. In auto-batch mode the
    /// remainder goes to the pool and its result is awaited; batches
    /// already in flight keep reporting through the callback.
    ///
    /// # Errors
    /// Returns `VecBatchError::Closed` in auto-batch mode after `close()`,
    /// or if the pool was shut down before the batch completed.
    pub async fn submit_async(&mut self) -> Result<AggregatedResult> {
        match &self.mode {
            Mode::Sync { orchestrator } => {
                let batch = self.buffer.extract_all();
                Ok(orchestrator.run(batch).await)
            }
            Mode::Auto { scheduler, .. } => {
                if scheduler.is_closed() {
                    return Err(VecBatchError::Closed);
                }
                let remainder = self.buffer.extract_all();
                if remainder.is_empty() {
                    return Ok(AggregatedResult::default());
                }
                match scheduler.submit(remainder)?.await {
                    Ok(result) => Ok(result),
                    Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                    Err(_) => Err(VecBatchError::Closed),
                }
            }
        }
    }

    /// Submit the partial remainder and block until no batch is in flight.
    /// Outside auto-batch mode this behaves as `submit()`.
    pub fn flush(&mut self) -> Result<Option<AggregatedResult>> {
        self.submit()
    }

    /// Shut the worker pool down. No-op in synchronous mode; idempotent.
    ///
    /// Buffered records are not flushed; call `flush()` first.
    pub fn close(&mut self) {
        if let Mode::Auto { scheduler, .. } = &mut self.mode {
            if !self.buffer.is_empty() {
                log::warn!(
                    "closing with {} unflushed records in the buffer",
                    self.buffer.len()
                );
            }
            scheduler.close();
        }
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Batches submitted to the pool that have not completed.
    pub fn in_flight(&self) -> usize {
        match &self.mode {
            Mode::Sync { .. } => 0,
            Mode::Auto { scheduler, .. } => scheduler.in_flight(),
        }
    }

    pub fn is_auto_batch(&self) -> bool {
        matches!(self.mode, Mode::Auto { .. })
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

pub struct EngineBuilder {
    transport: Arc<dyn Transport>,
    probe: Arc<dyn ReconciliationProbe>,
    budget: RetryBudget,
    auto_batch: Option<AutoBatchPolicy>,
    consistency: Option<ConsistencyLevel>,
    ordering: OutcomeOrdering,
    delay: Option<Arc<dyn DelayStrategy>>,
}

impl EngineBuilder {
    pub fn new(transport: Arc<dyn Transport>, probe: Arc<dyn ReconciliationProbe>) -> Self {
        Self {
            transport,
            probe,
            budget: RetryBudget::default(),
            auto_batch: None,
            consistency: None,
            ordering: OutcomeOrdering::default(),
            delay: None,
        }
    }

    pub fn retry_budget(mut self, budget: RetryBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Enable auto-batch mode.
    pub fn auto_batch(mut self, policy: AutoBatchPolicy) -> Self {
        self.auto_batch = Some(policy);
        self
    }

    pub fn consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.consistency = Some(level);
        self
    }

    pub fn outcome_ordering(mut self, ordering: OutcomeOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Override the mode's default delay strategy.
    pub fn delay_strategy(mut self, delay: Arc<dyn DelayStrategy>) -> Self {
        self.delay = Some(delay);
        self
    }

    /// # Errors
    /// Returns `VecBatchError::Runtime` if the auto-batch pool cannot be
    /// started.
    pub fn build(self) -> Result<BatchEngine> {
        let auto = self.auto_batch.is_some();
        let delay: Arc<dyn DelayStrategy> = match self.delay {
            Some(delay) => delay,
            None if auto => Arc::new(ScheduledDelay),
            None => Arc::new(BlockingDelay),
        };
        let orchestrator = RetryOrchestrator::new(self.budget, self.transport, self.probe, delay)
            .with_consistency_level(self.consistency)
            .with_ordering(self.ordering);

        let mode = match self.auto_batch {
            Some(policy) => Mode::Auto {
                scheduler: AutoBatchScheduler::new(&policy, Arc::new(orchestrator))?,
                batch_size: policy.batch_size(),
            },
            None => Mode::Sync { orchestrator },
        };

        Ok(BatchEngine {
            buffer: RecordBuffer::new(),
            mode,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
