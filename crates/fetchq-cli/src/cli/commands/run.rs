//! `fetchq run` and `fetchq serve` – process queued jobs.

use anyhow::{Context, Result};
use std::time::Instant;
use tokio::sync::watch;

use crate::cli::engine::Engine;

/// Drain the queue once: run every pending job, then exit.
pub async fn run_workers(engine: &Engine) -> Result<()> {
    let dispatcher = engine.dispatcher();
    let recovered = dispatcher.recover().await?;
    if recovered > 0 {
        println!("Recovered {recovered} job(s) whose worker stopped renewing its lease.");
    }
    let started = Instant::now();
    let run_count = dispatcher.run_until_idle().await?;
    if run_count == 0 {
        println!("No pending jobs.");
    } else {
        println!(
            "Processed {} job(s) in {:.1}s.",
            run_count,
            started.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

/// Run workers and the retention sweeper until Ctrl-C. Running jobs finish
/// before the process exits.
pub async fn run_serve(engine: &Engine) -> Result<()> {
    let dispatcher = engine.dispatcher();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = engine.sweeper();
    let sweep_rx = shutdown_rx.clone();
    let sweep_handle = tokio::spawn(async move { sweeper.run(sweep_rx).await });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            eprintln!("Shutting down; waiting for running jobs...");
        }
        let _ = shutdown_tx.send(true);
    });

    println!(
        "Serving with {} worker(s); Ctrl-C to stop.",
        engine.cfg.worker_pool_size.max(1)
    );
    let run_count = dispatcher.serve(shutdown_rx).await?;
    sweep_handle.await.context("sweeper task join")??;
    println!("Processed {run_count} job(s).");
    Ok(())
}
