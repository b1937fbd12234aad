// VecBatch — main.rs
// Binary entry point: demo ingestion run and a quick throughput check
// against the in-process server.
// Author: d65v <https://github.com/d65v>

use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use rand::Rng;

use bcore::{AutoBatchPolicy, BatchEngine, MemoryServer, Record, RetryBudget};

fn main() -> anyhow::Result<()> {
    // Respects RUST_LOG
    env_logger::init();

    // Load .env if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let args: Vec<String> = env::args().collect();
    let mode = args.get(1).map(|s| s.as_str()).unwrap_or("run");

    match mode {
        "run" => run_ingest(),
        "bench" => run_bench(),
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        unknown => {
            eprintln!("[VecBatch] Unknown mode: '{}'. Try --help.", unknown);
            std::process::exit(1);
        }
    }
}

fn env_usize(name: &str, default: usize) -> anyhow::Result<usize> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} must be a non-negative integer, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn random_vector(dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn run_ingest() -> anyhow::Result<()> {
    let dim = env_usize("VECBATCH_DEMO_DIM", 128)?;
    let total = env_usize("VECBATCH_DEMO_RECORDS", 1_000)?;
    let budget = RetryBudget::from_env()?;

    let written = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let (written_cb, failed_cb) = (Arc::clone(&written), Arc::clone(&failed));
    let policy = AutoBatchPolicy::from_env()?.with_callback(move |result| {
        let bad = result.failed().count();
        written_cb.fetch_add(result.outcomes().len() - bad, Ordering::Relaxed);
        failed_cb.fetch_add(bad, Ordering::Relaxed);
        if let Some(error) = &result.error {
            log::warn!("batch error (status {}): {}", result.status_code, error);
        }
    });

    log::info!(
        "Config: dim={}, records={}, batch_size={}, workers={}, retry_interval={:?}",
        dim,
        total,
        policy.batch_size(),
        policy.worker_pool_size(),
        budget.retry_interval()
    );

    // A flaky server, so retries and reconciliation actually happen.
    let server = Arc::new(MemoryServer::new(Some(dim)).with_random_faults(0.2));
    let mut engine = BatchEngine::builder(Arc::new(server.rest()), server.clone())
        .retry_budget(budget)
        .auto_batch(policy)
        .build()?;

    let t0 = Instant::now();
    for i in 0..total {
        let record = Record::new("Document")
            .with_property("title", format!("document {i}"))
            .with_vector(random_vector(dim));
        engine.append([record])?;
    }
    engine.flush()?;
    engine.close();

    println!("\n[VecBatch] Ingestion finished in {:?}", t0.elapsed());
    println!("  written  = {}", written.load(Ordering::Relaxed));
    println!("  failed   = {}", failed.load(Ordering::Relaxed));
    println!("  stored   = {}", server.len());
    println!("  requests = {}", server.requests());
    Ok(())
}

fn run_bench() -> anyhow::Result<()> {
    println!("[VecBatch] Running internal benchmark...");

    let dim = 128;
    let n = 10_000usize;
    let server = Arc::new(MemoryServer::new(Some(dim)));
    let mut engine = BatchEngine::builder(Arc::new(server.rpc()), server.clone())
        .auto_batch(AutoBatchPolicy::new(200, 4, 10_000)?)
        .build()?;

    let records: Vec<Record> = (0..n)
        .map(|i| {
            Record::new("Bench")
                .with_id(format!("b_{i}"))
                .with_vector((0..dim).map(|j| (i as f32 * j as f32).sin()).collect())
        })
        .collect();

    let t0 = Instant::now();
    engine.append(records)?;
    engine.flush()?;
    let ingest_ms = t0.elapsed().as_millis();
    engine.close();

    println!("  Ingested {} records in {}ms ({} requests)", server.len(), ingest_ms, server.requests());
    Ok(())
}

fn print_help() {
    println!(
        r#"
VecBatch — Batch Ingestion for Vector Databases

USAGE:
  vecbatch [MODE]

MODES:
  run     Ingest demo records into a flaky in-process server (default)
  bench   Run internal throughput benchmark
  help    Show this message

ENVIRONMENT:
  VECBATCH_MAX_CONNECTION_RETRIES  Retries after connection failures (default: 3)
  VECBATCH_MAX_TIMEOUT_RETRIES     Retries after timeouts (default: 3)
  VECBATCH_RETRY_INTERVAL_MS       Base retry interval, linear backoff (default: 2000)
  VECBATCH_BATCH_SIZE              Records per auto-batch (default: 100)
  VECBATCH_POOL_SIZE               Worker pool size (default: 1)
  VECBATCH_SHUTDOWN_TIMEOUT_MS     Close grace period (default: 10000)
  VECBATCH_DEMO_DIM                Demo vector dimensionality (default: 128)
  VECBATCH_DEMO_RECORDS            Demo record count (default: 1000)
  RUST_LOG                         Log level: info | debug | warn | error

AUTHOR:
  d65v <https://github.com/d65v>
"#
    );
}
