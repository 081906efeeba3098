//! Per-job persistence loop: the single writer of a running job's results.

use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::governor::ItemCompletion;
use crate::job_store::{JobDb, JobId};

const WRITE_ATTEMPTS: u32 = 3;
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Receive completions and write each as the item's result. Keeps draining
/// after a failed write so the governor never blocks, and returns the first
/// error at the end so the job is not finished with results missing.
pub(super) async fn run_result_persistence_loop(
    mut results_rx: mpsc::Receiver<ItemCompletion>,
    db: JobDb,
    job_id: JobId,
) -> Result<usize> {
    let mut written = 0usize;
    let mut first_error = None;

    while let Some(completion) = results_rx.recv().await {
        match write_with_retry(&db, &job_id, &completion).await {
            Ok(true) => {
                written += 1;
                tracing::debug!(
                    job_id = %job_id,
                    index = completion.index,
                    status = completion.result.status.as_str(),
                    "item result recorded"
                );
            }
            Ok(false) => {
                tracing::debug!(job_id = %job_id, index = completion.index, "result already recorded");
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, index = completion.index, "durable result write failed: {:#}", e);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(written),
    }
}

async fn write_with_retry(db: &JobDb, job_id: &str, completion: &ItemCompletion) -> Result<bool> {
    let mut attempt = 1;
    loop {
        match db
            .record_item_result(job_id, completion.index, &completion.result, Some(&completion.url))
            .await
        {
            Ok(written) => return Ok(written),
            Err(e) if attempt < WRITE_ATTEMPTS => {
                tracing::warn!(job_id, index = completion.index, attempt, "result write failed, retrying: {:#}", e);
                tokio::time::sleep(WRITE_RETRY_DELAY).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
