// VecBatch — config.rs
// Retry budget and auto-batch policy. Both are validated once, at
// construction, and are read-only afterwards.
// Author: d65v <https://github.com/d65v>

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::record::AggregatedResult;
use crate::{Result, VecBatchError};

/// Callback invoked on a pool thread after each auto-batched submission.
pub type BatchCallback = Arc<dyn Fn(&AggregatedResult) + Send + Sync>;

// ── Env helpers ───────────────────────────────────────────────────────────────

/// Read `name` from the environment. Absent → `default`; unparsable → error.
fn env_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            VecBatchError::ConfigError(format!("{name}: cannot parse '{raw}'"))
        }),
        Err(_) => Ok(default),
    }
}

// ── Retry Budget ──────────────────────────────────────────────────────────────

/// Bounds on how often one batch may be retried.
///
/// Connection failures and timeouts have independent counters and budgets.
/// The n-th retry within a class waits `n × retry_interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    max_connection_retries: u32,
    max_timeout_retries: u32,
    retry_interval_ms: u64,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            max_connection_retries: 3,
            max_timeout_retries: 3,
            retry_interval_ms: 2_000,
        }
    }
}

impl RetryBudget {
    /// # Errors
    /// Returns `VecBatchError::ConfigError` if `retry_interval_ms` is 0.
    pub fn new(
        max_connection_retries: u32,
        max_timeout_retries: u32,
        retry_interval_ms: u64,
    ) -> Result<Self> {
        if retry_interval_ms == 0 {
            return Err(VecBatchError::ConfigError(
                "retry_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            max_connection_retries,
            max_timeout_retries,
            retry_interval_ms,
        })
    }

    /// Load from `VECBATCH_MAX_CONNECTION_RETRIES`,
    /// `VECBATCH_MAX_TIMEOUT_RETRIES` and `VECBATCH_RETRY_INTERVAL_MS`,
    /// falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Self::new(
            env_or(
                "VECBATCH_MAX_CONNECTION_RETRIES",
                defaults.max_connection_retries,
            )?,
            env_or("VECBATCH_MAX_TIMEOUT_RETRIES", defaults.max_timeout_retries)?,
            env_or("VECBATCH_RETRY_INTERVAL_MS", defaults.retry_interval_ms)?,
        )
    }

    pub fn max_connection_retries(&self) -> u32 {
        self.max_connection_retries
    }

    pub fn max_timeout_retries(&self) -> u32 {
        self.max_timeout_retries
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Linear backoff: `attempt × interval`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_interval_ms.saturating_mul(u64::from(attempt)))
    }
}

// ── Auto-Batch Policy ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AutoBatchPolicy {
    batch_size: usize,
    worker_pool_size: usize,
    shutdown_timeout_ms: u64,
    callback: Option<BatchCallback>,
}

impl fmt::Debug for AutoBatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoBatchPolicy")
            .field("batch_size", &self.batch_size)
            .field("worker_pool_size", &self.worker_pool_size)
            .field("shutdown_timeout_ms", &self.shutdown_timeout_ms)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl Default for AutoBatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: 100,
            worker_pool_size: 1,
            shutdown_timeout_ms: 10_000,
            callback: None,
        }
    }
}

impl AutoBatchPolicy {
    /// # Errors
    /// Returns `VecBatchError::ConfigError` if any argument is 0.
    pub fn new(batch_size: usize, worker_pool_size: usize, shutdown_timeout_ms: u64) -> Result<Self> {
        if batch_size < 1 {
            return Err(VecBatchError::ConfigError(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if worker_pool_size < 1 {
            return Err(VecBatchError::ConfigError(
                "worker_pool_size must be at least 1".to_string(),
            ));
        }
        if shutdown_timeout_ms == 0 {
            return Err(VecBatchError::ConfigError(
                "shutdown_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            batch_size,
            worker_pool_size,
            shutdown_timeout_ms,
            callback: None,
        })
    }

    /// Load from `VECBATCH_BATCH_SIZE`, `VECBATCH_POOL_SIZE` and
    /// `VECBATCH_SHUTDOWN_TIMEOUT_MS`, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Self::new(
            env_or("VECBATCH_BATCH_SIZE", defaults.batch_size)?,
            env_or("VECBATCH_POOL_SIZE", defaults.worker_pool_size)?,
            env_or("VECBATCH_SHUTDOWN_TIMEOUT_MS", defaults.shutdown_timeout_ms)?,
        )
    }

    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&AggregatedResult) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn worker_pool_size(&self) -> usize {
        self.worker_pool_size
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn callback(&self) -> Option<&BatchCallback> {
        self.callback.as_ref()
    }
}

// ── Outcome Ordering ──────────────────────────────────────────────────────────

/// Where outcomes of reconciled records end up in the merged array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutcomeOrdering {
    /// Reconciled outcomes follow the last attempt's outcomes.
    #[default]
    AppendReconciled,
    /// Outcomes are re-sorted into the order records were submitted.
    SubmissionOrder,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_budget_rejects_zero_interval() {
        let err = RetryBudget::new(3, 3, 0).unwrap_err();
        assert!(matches!(err, VecBatchError::ConfigError(_)));
        assert!(err.to_string().contains("retry_interval_ms"));
    }

    #[test]
    fn test_retry_budget_allows_zero_retries() {
        let budget = RetryBudget::new(0, 0, 10).unwrap();
        assert_eq!(budget.max_connection_retries(), 0);
        assert_eq!(budget.max_timeout_retries(), 0);
    }

    #[test]
    fn test_delay_grows_linearly() {
        let budget = RetryBudget::new(5, 5, 250).unwrap();
        assert_eq!(budget.delay_for(1), Duration::from_millis(250));
        assert_eq!(budget.delay_for(2), Duration::from_millis(500));
        assert_eq!(budget.delay_for(4), Duration::from_millis(1_000));
    }

    #[test]
    fn test_auto_batch_rejects_zero_batch_size() {
        let err = AutoBatchPolicy::new(0, 1, 1_000).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_auto_batch_rejects_zero_pool_and_timeout() {
        assert!(AutoBatchPolicy::new(10, 0, 1_000).is_err());
        assert!(AutoBatchPolicy::new(10, 1, 0).is_err());
    }

    #[test]
    fn test_config_defaults() {
        let budget = RetryBudget::default();
        assert_eq!(budget.retry_interval(), Duration::from_secs(2));
        let policy = AutoBatchPolicy::default();
        assert_eq!(policy.batch_size(), 100);
        assert_eq!(policy.worker_pool_size(), 1);
        assert!(policy.callback().is_none());
    }

    #[test]
    fn test_callback_is_attached() {
        let policy = AutoBatchPolicy::new(5, 2, 100)
            .unwrap()
            .with_callback(|_| {});
        assert!(policy.callback().is_some());
        assert!(format!("{policy:?}").contains("callback: true"));
    }
}
