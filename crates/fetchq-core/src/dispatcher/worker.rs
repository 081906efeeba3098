//! Run one claimed job to a terminal status.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::mpsc;

use super::persist::run_result_persistence_loop;
use super::WorkerContext;
use crate::control::{CancelToken, JobControl};
use crate::governor::{aggregate_status, PlannedItem};
use crate::job_store::{JobDb, JobId, JobStatus, Lease};
use crate::layout::plan_filenames;

/// Unregisters the job's cancel token when the worker is done with it.
struct ControlGuard<'a> {
    control: &'a JobControl,
    job_id: &'a str,
}

impl Drop for ControlGuard<'_> {
    fn drop(&mut self) {
        self.control.unregister(self.job_id);
    }
}

/// Mirror the store's `cancel_requested` flag into the in-process token.
async fn poll_cancel_flag(db: JobDb, job_id: JobId, token: CancelToken, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        if token.is_cancelled() {
            return;
        }
        match db.is_cancel_requested(&job_id).await {
            Ok(true) => {
                tracing::info!(job_id = %job_id, "cancel requested");
                token.cancel();
                return;
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(job_id = %job_id, "cancel flag poll failed: {:#}", e),
        }
    }
}

/// Keep the job's lease alive while it runs. If the lease was lost (another
/// process recovered the job) the job is cancelled here.
async fn keep_lease(db: JobDb, job_id: JobId, lease: Lease, token: CancelToken) {
    let every = (lease.ttl / 3).max(Duration::from_millis(10));
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match db.renew_lease(&job_id, &lease).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(job_id = %job_id, holder = %lease.holder, "lease lost, stopping job");
                token.cancel();
                return;
            }
            Err(e) => tracing::warn!(job_id = %job_id, "lease renewal failed: {:#}", e),
        }
    }
}

/// Run a job this worker has claimed (status `in_progress`). Items that already
/// have a result (a job recovered after a crash) are not run again.
pub(super) async fn process_job(ctx: &WorkerContext, job_id: &str) -> Result<JobStatus> {
    let record = ctx
        .db
        .get_job(job_id)
        .await?
        .with_context(|| format!("claimed job {} vanished", job_id))?;

    let token = ctx.control.register(job_id);
    let _guard = ControlGuard {
        control: &ctx.control,
        job_id,
    };
    if record.cancel_requested {
        token.cancel();
    }

    let job_dir = ctx.layout.job_dir(&record.owner_id, job_id);
    let names = plan_filenames(&record.items);
    let planned: Vec<PlannedItem> = record
        .items
        .iter()
        .zip(names)
        .enumerate()
        .filter(|(index, _)| !record.results.contains_key(index))
        .map(|(index, (item, name))| PlannedItem {
            index,
            url: item.url.clone(),
            destination: job_dir.join(name),
            expected_size: item.expected_size,
        })
        .collect();

    tracing::info!(
        job_id,
        owner_id = %record.owner_id,
        total = record.items.len(),
        remaining = planned.len(),
        "job started"
    );

    let (results_tx, results_rx) =
        mpsc::channel(ctx.governor.settings().per_job_concurrency.max(1) * 2);
    let persist = tokio::spawn(run_result_persistence_loop(
        results_rx,
        ctx.db.clone(),
        job_id.to_string(),
    ));
    let poll = tokio::spawn(poll_cancel_flag(
        ctx.db.clone(),
        job_id.to_string(),
        token.clone(),
        ctx.cancel_poll_interval,
    ));
    let heartbeat = tokio::spawn(keep_lease(
        ctx.db.clone(),
        job_id.to_string(),
        ctx.lease.clone(),
        token.clone(),
    ));

    let report = ctx.governor.run(job_id, planned, &token, results_tx).await;
    poll.abort();
    heartbeat.abort();
    persist.await.context("persistence task join")??;

    let record = ctx
        .db
        .get_job(job_id)
        .await?
        .with_context(|| format!("job {} vanished while running", job_id))?;
    let status = aggregate_status(record.items.len(), &record.results, report.cancelled);
    if !ctx.db.finish_job(job_id, status, &ctx.lease).await? {
        tracing::warn!(job_id, "job was no longer held by this worker when finishing");
    }

    let progress = record.progress();
    tracing::info!(
        job_id,
        status = status.as_str(),
        completed = progress.completed,
        failed = progress.failed,
        timed_out = report.timed_out.len(),
        "job finished"
    );
    Ok(status)
}
