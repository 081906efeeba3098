//! Concurrency governor: bounded fan-out/fan-in of transfer units for one job.
//!
//! At most K transfers of a job are in flight (a per-job semaphore), and
//! optionally every transfer also holds a permit from the process-wide
//! `GlobalTransferBudget`. Completions are sent over a channel as they
//! arrive, tagged with the item index. Admission stops when the job's cancel
//! token is set or its deadline passes. In-flight transfers finish their
//! current attempt but start no retry past the deadline.

mod budget;
mod outcome;
mod run;

pub use budget::GlobalTransferBudget;
pub use outcome::aggregate_status;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::FetchqConfig;
use crate::job_store::ItemResult;
use crate::retry::RetryPolicy;
use crate::transfer::Fetcher;

/// Error recorded for items the job's deadline stopped: never started, or
/// stopped between retries (`TransferError::DeadlinePassed` displays the same).
pub const TIMEOUT_ERROR: &str = "timeout";

#[derive(Debug, Clone)]
pub struct GovernorSettings {
    /// K: transfers in flight per job.
    pub per_job_concurrency: usize,
    /// Wall-clock budget for admitting items and starting retries.
    pub job_timeout: Duration,
    pub retry: RetryPolicy,
}

impl GovernorSettings {
    pub fn from_config(cfg: &FetchqConfig) -> Self {
        Self {
            per_job_concurrency: cfg.per_job_concurrency.max(1),
            job_timeout: cfg.job_timeout(),
            retry: cfg.retry.policy(),
        }
    }
}

/// One item ready to run: original index plus its resolved destination.
#[derive(Debug, Clone)]
pub struct PlannedItem {
    pub index: usize,
    pub url: String,
    pub destination: PathBuf,
    pub expected_size: Option<u64>,
}

/// Terminal result of one item as sent to the job's persistence loop.
#[derive(Debug, Clone)]
pub struct ItemCompletion {
    pub index: usize,
    pub url: String,
    pub result: ItemResult,
}

/// What the governor did with a job's items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GovernorReport {
    /// Items handed to a transfer unit.
    pub started: usize,
    /// Set when admission stopped because of cancellation.
    pub cancelled: bool,
    /// Items never started because of cancellation (no result is sent).
    pub not_started: Vec<usize>,
    /// Items never started because the deadline passed (sent as failed: timeout).
    pub timed_out: Vec<usize>,
}

#[derive(Clone)]
pub struct Governor {
    fetcher: Arc<dyn Fetcher>,
    settings: GovernorSettings,
    budget: Option<Arc<GlobalTransferBudget>>,
}

impl Governor {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: GovernorSettings) -> Self {
        Self {
            fetcher,
            settings,
            budget: None,
        }
    }

    /// Share a process-wide transfer budget with other governors.
    pub fn with_budget(mut self, budget: Arc<GlobalTransferBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn settings(&self) -> &GovernorSettings {
        &self.settings
    }
}
