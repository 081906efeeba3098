use std::sync::Arc;

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};

use super::{Governor, GovernorReport, ItemCompletion, PlannedItem, TIMEOUT_ERROR};
use crate::control::CancelToken;
use crate::job_store::{unix_timestamp, ItemResult, ItemStatus};
use crate::transfer::{transfer_item, TransferOutcome, TransferRequest};

/// Permits held for the lifetime of one transfer unit.
struct Permits {
    _slot: OwnedSemaphorePermit,
    _global: Option<OwnedSemaphorePermit>,
}

enum Admission {
    Granted(Permits),
    Cancelled,
    TimedOut,
}

fn item_result(outcome: TransferOutcome) -> ItemResult {
    let completed_at = unix_timestamp();
    if outcome.success {
        ItemResult {
            status: ItemStatus::Success,
            filepath: Some(outcome.filepath.to_string_lossy().into_owned()),
            size: outcome.size,
            checksum: outcome.checksum,
            error: None,
            attempts: outcome.attempts,
            completed_at,
        }
    } else {
        ItemResult::failed(
            outcome.error.unwrap_or_else(|| "transfer failed".to_string()),
            outcome.attempts,
            completed_at,
        )
    }
}

impl Governor {
    /// Run `items` with at most K in flight and send each terminal result on
    /// `results`. Returns once every started transfer has finished.
    pub async fn run(
        &self,
        job_id: &str,
        items: Vec<PlannedItem>,
        cancel: &CancelToken,
        results: mpsc::Sender<ItemCompletion>,
    ) -> GovernorReport {
        let slots = Arc::new(Semaphore::new(self.settings.per_job_concurrency.max(1)));
        let deadline = Instant::now() + self.settings.job_timeout;
        let mut report = GovernorReport::default();
        let mut tasks = JoinSet::new();
        let mut queue = items.into_iter();

        tracing::debug!(
            job_id,
            items = queue.len(),
            k = self.settings.per_job_concurrency,
            "governor start"
        );

        while let Some(item) = queue.next() {
            match self.admit(&slots, deadline, cancel).await {
                Admission::Granted(permits) => {
                    report.started += 1;
                    self.spawn_unit(&mut tasks, job_id, item, permits, deadline, results.clone());
                }
                Admission::Cancelled => {
                    report.cancelled = true;
                    report.not_started = std::iter::once(item.index)
                        .chain(queue.by_ref().map(|i| i.index))
                        .collect();
                    tracing::info!(
                        job_id,
                        not_started = report.not_started.len(),
                        "cancellation observed, no further items admitted"
                    );
                    break;
                }
                Admission::TimedOut => {
                    let now = unix_timestamp();
                    for item in std::iter::once(item).chain(queue.by_ref()) {
                        report.timed_out.push(item.index);
                        let completion = ItemCompletion {
                            index: item.index,
                            url: item.url,
                            result: ItemResult::failed(TIMEOUT_ERROR, 0, now),
                        };
                        if results.send(completion).await.is_err() {
                            tracing::warn!(job_id, "result receiver closed");
                        }
                    }
                    tracing::warn!(
                        job_id,
                        timed_out = report.timed_out.len(),
                        "job deadline passed, remaining items marked failed"
                    );
                    break;
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(job_id, "transfer task join: {}", e);
            }
        }
        report
    }

    async fn admit(&self, slots: &Arc<Semaphore>, deadline: Instant, cancel: &CancelToken) -> Admission {
        if cancel.is_cancelled() {
            return Admission::Cancelled;
        }
        if Instant::now() >= deadline {
            return Admission::TimedOut;
        }
        let slot = match timeout_at(deadline, Arc::clone(slots).acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            // A closed semaphore stops admission like a cancel.
            Ok(Err(_)) => return Admission::Cancelled,
            Err(_) => return Admission::TimedOut,
        };
        let global = match &self.budget {
            Some(budget) => match timeout_at(deadline, budget.acquire()).await {
                Ok(Some(permit)) => Some(permit),
                Ok(None) => return Admission::Cancelled,
                Err(_) => return Admission::TimedOut,
            },
            None => None,
        };
        // Waiting for a slot can take a while; look again before starting.
        if cancel.is_cancelled() {
            return Admission::Cancelled;
        }
        if Instant::now() >= deadline {
            return Admission::TimedOut;
        }
        Admission::Granted(Permits {
            _slot: slot,
            _global: global,
        })
    }

    fn spawn_unit(
        &self,
        tasks: &mut JoinSet<()>,
        job_id: &str,
        item: PlannedItem,
        permits: Permits,
        deadline: Instant,
        results: mpsc::Sender<ItemCompletion>,
    ) {
        let fetcher = Arc::clone(&self.fetcher);
        let policy = self.settings.retry;
        let job_id = job_id.to_string();
        tasks.spawn(async move {
            let _permits = permits;
            let PlannedItem {
                index,
                url,
                destination,
                expected_size,
            } = item;
            let request = TransferRequest {
                url: url.clone(),
                destination,
                expected_size,
            };
            let deadline = Some(deadline.into_std());
            let joined = tokio::task::spawn_blocking(move || {
                transfer_item(fetcher.as_ref(), &request, &policy, deadline)
            })
            .await;
            let result = match joined {
                Ok(outcome) => item_result(outcome),
                Err(e) => {
                    tracing::error!(job_id = %job_id, index, "transfer unit panicked: {}", e);
                    ItemResult::failed(format!("transfer task failed: {e}"), 0, unix_timestamp())
                }
            };
            if results.send(ItemCompletion { index, url, result }).await.is_err() {
                tracing::warn!(job_id = %job_id, index, "result receiver closed");
            }
        });
    }
}
