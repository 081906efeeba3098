//! Job record types shared by the store, governor, dispatcher and service.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Job identifier (UUID v4, hyphenated lowercase).
pub type JobId = String;

/// Lowest and highest accepted queue priority.
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;
pub const DEFAULT_PRIORITY: u8 = 5;

/// Lifecycle status of a job, stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Partial => "partial",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// No further transitions happen from a terminal status.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::InProgress)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => JobStatus::Pending,
            "in_progress" => JobStatus::InProgress,
            "completed" => JobStatus::Completed,
            "partial" => JobStatus::Partial,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            other => anyhow::bail!("unknown job status {:?}", other),
        })
    }
}

/// Per-item terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Success,
    Failed,
    /// Never started because the job was cancelled first.
    Skipped,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Success => "success",
            ItemStatus::Failed => "failed",
            ItemStatus::Skipped => "skipped",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "success" => ItemStatus::Success,
            "failed" => ItemStatus::Failed,
            "skipped" => ItemStatus::Skipped,
            other => anyhow::bail!("unknown item status {:?}", other),
        })
    }
}

/// One requested download, fixed at job creation. Stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedItem {
    pub url: String,
    /// Filename to save as inside the job directory; derived from the URL when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl RequestedItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            destination_hint: None,
            expected_size: None,
            metadata: None,
        }
    }
}

/// Terminal outcome of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub status: ItemStatus,
    pub filepath: Option<String>,
    pub size: Option<u64>,
    pub checksum: Option<String>,
    pub error: Option<String>,
    pub attempts: u32,
    pub completed_at: i64,
}

impl ItemResult {
    pub fn failed(error: impl Into<String>, attempts: u32, completed_at: i64) -> Self {
        Self {
            status: ItemStatus::Failed,
            filepath: None,
            size: None,
            checksum: None,
            error: Some(error.into()),
            attempts,
            completed_at,
        }
    }
}

/// Counters derived from a job's results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub percentage: f64,
    pub current_file: Option<String>,
}

/// A worker's claim on the jobs it runs: who holds them, and how long a claim
/// stays valid without renewal. Expired claims are returned to the queue by
/// `JobDb::recover_in_progress`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub holder: String,
    pub ttl: Duration,
}

impl Lease {
    pub fn new(holder: impl Into<String>, ttl: Duration) -> Self {
        Self {
            holder: holder.into(),
            ttl,
        }
    }

    /// Holder id unique to this dispatcher instance: process id plus a random suffix.
    pub fn for_this_process(ttl: Duration) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self::new(format!("{}-{}", std::process::id(), &suffix[..8]), ttl)
    }

    pub(crate) fn ttl_millis(&self) -> i64 {
        self.ttl.as_millis().min(i64::MAX as u128) as i64
    }
}

/// Data needed to insert a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub owner_id: String,
    pub priority: u8,
    pub items: Vec<RequestedItem>,
    pub metadata: Option<serde_json::Value>,
}

/// Full job record.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_id: JobId,
    pub owner_id: String,
    pub status: JobStatus,
    pub priority: u8,
    pub items: Vec<RequestedItem>,
    pub results: BTreeMap<usize, ItemResult>,
    pub metadata: Option<serde_json::Value>,
    pub current_file: Option<String>,
    pub cancel_requested: bool,
    pub cancel_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl JobRecord {
    /// Recompute progress from `results`. In a cancelled job, items that never
    /// got a result count as skipped.
    pub fn progress(&self) -> Progress {
        let total = self.items.len();
        let mut completed = 0;
        let mut failed = 0;
        let mut skipped = 0;
        for r in self.results.values() {
            match r.status {
                ItemStatus::Success => completed += 1,
                ItemStatus::Failed => failed += 1,
                ItemStatus::Skipped => skipped += 1,
            }
        }
        if self.status == JobStatus::Cancelled {
            skipped += total.saturating_sub(self.results.len());
        }
        let done = completed + failed + skipped;
        let percentage = if total == 0 {
            100.0
        } else {
            (done as f64 / total as f64 * 100.0).min(100.0)
        };
        Progress {
            total,
            completed,
            failed,
            skipped,
            percentage,
            current_file: self.current_file.clone(),
        }
    }

    /// Status of item `index` as a caller sees it: its result, or `Skipped` when
    /// the job was cancelled before it ran, or None while it may still run.
    pub fn item_status(&self, index: usize) -> Option<ItemStatus> {
        match self.results.get(&index) {
            Some(r) => Some(r.status),
            None if self.status == JobStatus::Cancelled => Some(ItemStatus::Skipped),
            None => None,
        }
    }
}

/// Row view used by list queries.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub owner_id: String,
    pub status: JobStatus,
    pub priority: u8,
    pub total_items: usize,
    pub created_at: i64,
    pub updated_at: i64,
    pub finished_at: Option<i64>,
}

/// Job selected for deletion by the retention sweeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredJob {
    pub job_id: JobId,
    pub owner_id: String,
    pub finished_at: i64,
}
