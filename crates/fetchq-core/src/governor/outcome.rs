//! Terminal status of a job from its item results.

use std::collections::BTreeMap;

use crate::job_store::{ItemResult, ItemStatus, JobStatus};

/// Aggregate `results` of a job with `total` items.
///
/// Cancelled with fewer than all items finished → `Cancelled`. Otherwise all
/// success → `Completed`, some success → `Partial`, none → `Failed`.
pub fn aggregate_status(
    total: usize,
    results: &BTreeMap<usize, ItemResult>,
    cancelled: bool,
) -> JobStatus {
    let finished = results.values().filter(|r| r.status != ItemStatus::Skipped).count();
    if cancelled && finished < total {
        return JobStatus::Cancelled;
    }
    let succeeded = results
        .values()
        .filter(|r| r.status == ItemStatus::Success)
        .count();
    if total > 0 && succeeded == total {
        JobStatus::Completed
    } else if succeeded > 0 {
        JobStatus::Partial
    } else {
        JobStatus::Failed
    }
}
