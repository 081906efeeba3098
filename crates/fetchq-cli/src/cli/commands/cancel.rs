//! `fetchq cancel <job_id>` – stop a job from admitting further items.

use anyhow::Result;
use fetchq_core::job_store::JobStatus;

use crate::cli::engine::Engine;

pub async fn run_cancel(engine: &Engine, owner: &str, job_id: &str, reason: Option<&str>) -> Result<()> {
    let status = engine.service.cancel(owner, job_id, reason).await?;
    match status {
        JobStatus::Cancelled => println!("Job {job_id} cancelled."),
        JobStatus::InProgress => {
            println!("Cancel requested for job {job_id}; running transfers will finish.")
        }
        other => println!("Job {job_id} already {other}; nothing to cancel."),
    }
    Ok(())
}
