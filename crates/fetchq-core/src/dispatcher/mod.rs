//! Job queue dispatcher: a pool of workers claiming jobs from the store.
//!
//! Each worker claims the highest-priority, oldest pending job, runs it
//! through the governor and writes its terminal status, then claims the next.
//! The store's claim is a single conditional update, so two workers (or two
//! processes sharing the database) never run the same job. Each claim carries
//! this dispatcher's lease; workers renew it while the job runs, and recovery
//! only requeues jobs whose lease has lapsed.

mod persist;
mod worker;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};

use crate::config::FetchqConfig;
use crate::control::JobControl;
use crate::governor::Governor;
use crate::job_store::{JobDb, JobId, JobStatus, Lease};
use crate::layout::Layout;

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub worker_pool_size: usize,
    pub cancel_poll_interval: Duration,
    pub idle_poll_interval: Duration,
    pub lease_ttl: Duration,
}

impl DispatcherSettings {
    pub fn from_config(cfg: &FetchqConfig) -> Self {
        Self {
            worker_pool_size: cfg.worker_pool_size.max(1),
            cancel_poll_interval: cfg.cancel_poll_interval(),
            idle_poll_interval: cfg.idle_poll_interval(),
            lease_ttl: cfg.lease_ttl(),
        }
    }
}

/// Shared by every worker task.
pub(crate) struct WorkerContext {
    db: JobDb,
    governor: Governor,
    layout: Layout,
    control: Arc<JobControl>,
    lease: Lease,
    cancel_poll_interval: Duration,
}

type JobOutcome = (JobId, Result<JobStatus>);

pub struct Dispatcher {
    ctx: Arc<WorkerContext>,
    worker_pool_size: usize,
    idle_poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        db: JobDb,
        governor: Governor,
        layout: Layout,
        control: Arc<JobControl>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            ctx: Arc::new(WorkerContext {
                db,
                governor,
                layout,
                control,
                lease: Lease::for_this_process(settings.lease_ttl),
                cancel_poll_interval: settings.cancel_poll_interval,
            }),
            worker_pool_size: settings.worker_pool_size.max(1),
            idle_poll_interval: settings.idle_poll_interval,
        }
    }

    /// Registry of the cancel tokens of jobs this dispatcher is running.
    pub fn control(&self) -> Arc<JobControl> {
        Arc::clone(&self.ctx.control)
    }

    /// The lease this dispatcher claims jobs under.
    pub fn lease(&self) -> &Lease {
        &self.ctx.lease
    }

    /// Return jobs whose lease has lapsed (their process died) to the queue.
    /// Jobs another live dispatcher is running keep their lease and are left
    /// alone. `serve` also calls this on every pass.
    pub async fn recover(&self) -> Result<u64> {
        let n = self.ctx.db.recover_in_progress().await?;
        if n > 0 {
            tracing::info!(jobs = n, "returned interrupted jobs to the queue");
        }
        Ok(n)
    }

    /// Claim jobs until every worker slot is busy or the queue is empty.
    async fn fill(&self, workers: &mut JoinSet<JobOutcome>) -> Result<()> {
        while workers.len() < self.worker_pool_size {
            let Some(job_id) = self.ctx.db.claim_next_pending(&self.ctx.lease).await? else {
                break;
            };
            tracing::debug!(job_id = %job_id, "claimed job");
            let ctx = Arc::clone(&self.ctx);
            workers.spawn(async move {
                let result = worker::process_job(&ctx, &job_id).await;
                (job_id, result)
            });
        }
        Ok(())
    }

    /// Run jobs until the queue is empty and every worker is idle. Returns the
    /// number of jobs run.
    pub async fn run_until_idle(&self) -> Result<u32> {
        let mut workers = JoinSet::new();
        let mut run_count = 0u32;
        loop {
            self.fill(&mut workers).await?;
            let Some(joined) = workers.join_next().await else {
                break;
            };
            run_count += 1;
            log_outcome(joined);
        }
        Ok(run_count)
    }

    /// Run jobs as they arrive until `shutdown` turns true (or its sender is
    /// dropped). Running jobs are finished before returning; no new job is
    /// claimed after shutdown.
    pub async fn serve(&self, mut shutdown: watch::Receiver<bool>) -> Result<u32> {
        let mut workers = JoinSet::new();
        let mut run_count = 0u32;
        tracing::info!(workers = self.worker_pool_size, "dispatcher serving");

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.recover().await?;
            self.fill(&mut workers).await?;
            tokio::select! {
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    run_count += 1;
                    log_outcome(joined);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.idle_poll_interval) => {}
            }
        }

        tracing::info!(running = workers.len(), "dispatcher stopping, waiting for running jobs");
        while let Some(joined) = workers.join_next().await {
            run_count += 1;
            log_outcome(joined);
        }
        Ok(run_count)
    }
}

/// A failed job stays `in_progress` in the store until its lease lapses, then
/// `recover` returns it to the queue.
fn log_outcome(joined: std::result::Result<JobOutcome, JoinError>) {
    match joined {
        Ok((job_id, Ok(status))) => tracing::debug!(job_id = %job_id, status = status.as_str(), "worker done"),
        Ok((job_id, Err(e))) => tracing::error!(job_id = %job_id, "job aborted: {:#}", e),
        Err(e) => tracing::error!("worker task join: {}", e),
    }
}
