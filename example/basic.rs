// VecBatch — example/basic.rs
// Synchronous mode: buffer a handful of records, submit them as one batch
// and inspect the per-record outcomes.
// Run with:  cargo run --example basic

use std::sync::Arc;

use bcore::{BatchEngine, Fault, MemoryServer, Record, RetryBudget};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("── VecBatch Basic Example ────────────────────");

    let server = Arc::new(MemoryServer::new(Some(4)));
    // The first request times out after the write landed; the engine finds
    // the records on the server instead of writing them twice.
    server.inject(Fault::Timeout { landed: true });

    let mut engine = BatchEngine::builder(Arc::new(server.rest()), server.clone())
        .retry_budget(RetryBudget::new(3, 3, 200)?)
        .build()?;

    let items = vec![
        ("cat", vec![0.9, 0.1, 0.0, 0.0]),
        ("dog", vec![0.8, 0.2, 0.0, 0.0]),
        ("car", vec![0.0, 0.0, 0.9, 0.1]),
        ("bus", vec![0.0, 0.0, 0.8, 0.2]),
    ];
    engine.append(items.into_iter().map(|(label, vector)| {
        Record::new("Thing")
            .with_property("label", label)
            .with_vector(vector)
    }))?;
    // Wrong dimensionality; rejected per record.
    engine.append([Record::new("Thing")
        .with_property("label", "fish")
        .with_vector(vec![0.5, 0.5])])?;

    println!("Buffered {} records.\n", engine.buffered_len());

    if let Some(result) = engine.submit()? {
        println!(
            "status={}  attempts={}  requests={}",
            result.status_code,
            result.attempts,
            server.requests()
        );
        for outcome in result.outcomes() {
            println!("  {:36}  {:?}  {:?}", outcome.id, outcome.status, outcome.errors);
        }
        if let Some(error) = &result.error {
            println!("\nerror: {}", error);
        }
    }

    println!("\nStored on server: {}", server.len());
    println!("\n── Done ──────────────────────────────────────");
    Ok(())
}
