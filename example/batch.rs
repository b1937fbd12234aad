// VecBatch — example/batch.rs
// Auto-batch mode: records are flushed in the background as batches fill,
// results arrive through the callback.
// Run with:  cargo run --example batch

use std::sync::Arc;

use bcore::{AutoBatchPolicy, BatchEngine, MemoryServer, Record, RetryBudget};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let server = Arc::new(MemoryServer::new(Some(3)).with_random_faults(0.3));

    let policy = AutoBatchPolicy::new(8, 2, 5_000)?.with_callback(|result| {
        println!(
            "batch done: status={} attempts={} ok={} failed={}",
            result.status_code,
            result.attempts,
            result.outcomes().len() - result.failed().count(),
            result.failed().count()
        );
        for outcome in result.failed() {
            println!("  {} => {}", outcome.id, outcome.errors.join("; "));
        }
    });

    let mut engine = BatchEngine::builder(Arc::new(server.rpc()), server.clone())
        .retry_budget(RetryBudget::new(3, 3, 50)?)
        .auto_batch(policy)
        .build()?;

    for i in 0..30 {
        // Every tenth record has the wrong dimensionality.
        let vector = if i % 10 == 9 {
            vec![1.0, 2.0]
        } else {
            vec![i as f32, 0.0, 1.0]
        };
        engine.append([Record::new("Point").with_property("i", i).with_vector(vector)])?;
    }

    println!("buffered={} in_flight={}", engine.buffered_len(), engine.in_flight());
    engine.flush()?;
    engine.close();

    println!("stored={} requests={}", server.len(), server.requests());
    Ok(())
}
