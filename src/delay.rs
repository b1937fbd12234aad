// VecBatch — delay.rs
// "Wait, then continue" between retry attempts.
// Author: d65v <https://github.com/d65v>

use std::time::Duration;

use async_trait::async_trait;

/// How the orchestrator waits between attempts.
#[async_trait]
pub trait DelayStrategy: Send + Sync {
    async fn wait(&self, delay: Duration);
}

/// Sleeps the calling thread. Used in synchronous mode, where the whole
/// submission runs on the caller's thread anyway.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingDelay;

#[async_trait]
impl DelayStrategy for BlockingDelay {
    async fn wait(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Schedules the continuation on the runtime timer; the worker thread is
/// free to drive other batches meanwhile.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScheduledDelay;

#[async_trait]
impl DelayStrategy for ScheduledDelay {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}
