//! Request and view types of the job service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::job_store::{
    ItemResult, ItemStatus, JobId, JobRecord, JobStatus, JobSummary, Progress, RequestedItem,
};

/// A batch submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub owner_id: String,
    pub items: Vec<RequestedItem>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub job_id: JobId,
    pub status: JobStatus,
    /// 1-based position among pending jobs in dispatch order.
    pub queue_position: u64,
    pub estimated_time_secs: u64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: Progress,
    pub queue_position: Option<u64>,
    pub cancel_requested: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl JobStatusView {
    pub(crate) fn from_record(record: &JobRecord, queue_position: Option<u64>) -> Self {
        Self {
            job_id: record.job_id.clone(),
            status: record.status,
            progress: record.progress(),
            queue_position,
            cancel_requested: record.cancel_requested,
            created_at: record.created_at,
            updated_at: record.updated_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    pub total_requested: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Bytes across successful items.
    pub total_size: u64,
}

/// One recorded item result, with the URL it was for.
#[derive(Debug, Clone, Serialize)]
pub struct ItemResultView {
    pub index: usize,
    pub url: String,
    #[serde(flatten)]
    pub result: ItemResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobResultView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub summary: ResultSummary,
    /// Recorded results in item order. Items skipped by cancellation have none.
    pub results: Vec<ItemResultView>,
    pub metadata: Option<serde_json::Value>,
    pub cancel_reason: Option<String>,
    pub finished_at: Option<i64>,
}

impl JobResultView {
    pub(crate) fn from_record(record: &JobRecord) -> Self {
        let progress = record.progress();
        let results: Vec<ItemResultView> = record
            .results
            .iter()
            .map(|(index, result)| ItemResultView {
                index: *index,
                url: record
                    .items
                    .get(*index)
                    .map(|i| i.url.clone())
                    .unwrap_or_default(),
                result: result.clone(),
            })
            .collect();
        let total_size = results
            .iter()
            .filter(|r| r.result.status == ItemStatus::Success)
            .filter_map(|r| r.result.size)
            .sum();
        Self {
            job_id: record.job_id.clone(),
            status: record.status,
            summary: ResultSummary {
                total_requested: progress.total,
                successful: progress.completed,
                failed: progress.failed,
                skipped: progress.skipped,
                total_size,
            },
            results,
            metadata: record.metadata.clone(),
            cancel_reason: record.cancel_reason.clone(),
            finished_at: record.finished_at,
        }
    }

    /// URLs of failed items, in item order; resubmit these to retry exactly the failures.
    pub fn failed_urls(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.result.status == ItemStatus::Failed)
            .map(|r| r.url.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    pub status: Option<JobStatus>,
    /// 1-based.
    pub page: u64,
    pub per_page: u64,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            status: None,
            page: 1,
            per_page: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<JobSummary>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zip" => Ok(ArchiveFormat::Zip),
            "tar_gz" | "tar.gz" | "tgz" => Ok(ArchiveFormat::TarGz),
            other => anyhow::bail!("unknown archive format {:?} (expected zip or tar_gz)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExportSource {
    /// Successful files of one job.
    Job(JobId),
    /// Files already on disk under the owner's directory.
    Files(Vec<PathBuf>),
}

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub source: ExportSource,
    pub format: ArchiveFormat,
    /// Archive base name; defaults to the job id or `export-<uuid>`.
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportReceipt {
    pub archive_path: PathBuf,
    pub format: ArchiveFormat,
    pub file_count: usize,
    pub archive_size: u64,
}
