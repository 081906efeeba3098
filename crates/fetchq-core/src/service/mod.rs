//! Status/control surface over the job store: submit, query, cancel, export.
//!
//! Every read is scoped by owner: a job that exists but belongs to someone
//! else is reported as not found.

mod archive;
mod export;
mod types;

pub use types::{
    ArchiveFormat, ExportReceipt, ExportRequest, ExportSource, ItemResultView, JobPage,
    JobResultView, JobStatusView, ListQuery, ResultSummary, SubmitReceipt, SubmitRequest,
};

use std::sync::Arc;
use std::time::Duration;

use crate::config::FetchqConfig;
use crate::control::JobControl;
use crate::error::ServiceError;
use crate::job_store::{
    JobDb, JobFilter, JobRecord, JobStatus, NewJob, DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY,
};
use crate::layout::{is_safe_component, Layout};
use crate::transfer::validate_url;

/// Rough per-item duration used for `estimated_time_secs`.
pub const ESTIMATED_SECS_PER_ITEM: u64 = 30;

#[derive(Debug, Clone)]
pub struct ServiceLimits {
    pub max_batch_size: usize,
    pub max_page_size: u64,
}

impl ServiceLimits {
    pub fn from_config(cfg: &FetchqConfig) -> Self {
        Self {
            max_batch_size: cfg.max_batch_size.max(1),
            max_page_size: cfg.max_page_size.max(1) as u64,
        }
    }
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self::from_config(&FetchqConfig::default())
    }
}

#[derive(Clone)]
pub struct JobService {
    db: JobDb,
    layout: Layout,
    limits: ServiceLimits,
    control: Option<Arc<JobControl>>,
}

fn validate_owner(owner_id: &str) -> Result<(), ServiceError> {
    if is_safe_component(owner_id) {
        Ok(())
    } else {
        Err(ServiceError::validation(format!(
            "owner id {:?} must be non-empty and usable as a directory name",
            owner_id
        )))
    }
}

impl JobService {
    pub fn new(db: JobDb, layout: Layout, limits: ServiceLimits) -> Self {
        Self {
            db,
            layout,
            limits,
            control: None,
        }
    }

    /// Signal in-process workers directly on cancel instead of waiting for
    /// their next poll of the store.
    pub fn with_control(mut self, control: Arc<JobControl>) -> Self {
        self.control = Some(control);
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Validate and enqueue a batch. Nothing is written when validation fails.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitReceipt, ServiceError> {
        validate_owner(&request.owner_id)?;
        if request.items.is_empty() {
            return Err(ServiceError::validation("a job needs at least one item"));
        }
        if request.items.len() > self.limits.max_batch_size {
            return Err(ServiceError::validation(format!(
                "{} items exceeds the maximum batch size of {}",
                request.items.len(),
                self.limits.max_batch_size
            )));
        }
        let priority = request.priority.unwrap_or(DEFAULT_PRIORITY);
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(ServiceError::validation(format!(
                "priority {} is outside {}..={}",
                priority, MIN_PRIORITY, MAX_PRIORITY
            )));
        }
        for (index, item) in request.items.iter().enumerate() {
            validate_url(&item.url)
                .map_err(|e| ServiceError::validation(format!("item {}: {}", index, e)))?;
        }

        let total = request.items.len();
        let job_id = self
            .db
            .create_job(&NewJob {
                owner_id: request.owner_id,
                priority,
                items: request.items,
                metadata: request.metadata,
            })
            .await?;
        let record = self.fetch(&job_id).await?;
        let queue_position = self.db.queue_position(&job_id).await?.unwrap_or(1);
        tracing::info!(job_id = %job_id, owner_id = %record.owner_id, items = total, priority, "job submitted");

        Ok(SubmitReceipt {
            job_id,
            status: record.status,
            queue_position,
            estimated_time_secs: total as u64 * ESTIMATED_SECS_PER_ITEM,
            created_at: record.created_at,
        })
    }

    async fn fetch(&self, job_id: &str) -> Result<JobRecord, ServiceError> {
        self.db
            .get_job(job_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(job_id))
    }

    /// Full record of one of the owner's jobs.
    pub async fn get(&self, owner_id: &str, job_id: &str) -> Result<JobRecord, ServiceError> {
        let record = self.fetch(job_id).await?;
        if record.owner_id != owner_id {
            return Err(ServiceError::not_found(job_id));
        }
        Ok(record)
    }

    pub async fn status(&self, owner_id: &str, job_id: &str) -> Result<JobStatusView, ServiceError> {
        let record = self.get(owner_id, job_id).await?;
        let queue_position = match record.status {
            JobStatus::Pending => self.db.queue_position(job_id).await?,
            _ => None,
        };
        Ok(JobStatusView::from_record(&record, queue_position))
    }

    /// Results of a finished job; `NotReady` while pending or in progress.
    pub async fn result(&self, owner_id: &str, job_id: &str) -> Result<JobResultView, ServiceError> {
        let record = self.get(owner_id, job_id).await?;
        if !record.status.is_terminal() {
            return Err(ServiceError::NotReady {
                job_id: record.job_id,
                status: record.status,
            });
        }
        Ok(JobResultView::from_record(&record))
    }

    /// The owner's jobs, newest first.
    pub async fn list(&self, owner_id: &str, query: ListQuery) -> Result<JobPage, ServiceError> {
        if query.page == 0 {
            return Err(ServiceError::validation("page numbers start at 1"));
        }
        let per_page = query.per_page.clamp(1, self.limits.max_page_size);
        let filter = JobFilter {
            owner_id: Some(owner_id.to_string()),
            status: query.status,
        };
        let offset = (query.page - 1).saturating_mul(per_page);
        let (jobs, total) = self.db.list_jobs(&filter, offset, per_page).await?;
        Ok(JobPage {
            jobs,
            page: query.page,
            per_page,
            total,
        })
    }

    /// Request cancellation and return the job's status afterwards. A pending
    /// job becomes `cancelled` at once; a running job stays `in_progress`
    /// until its worker stops admitting items. Terminal jobs are unchanged.
    pub async fn cancel(
        &self,
        owner_id: &str,
        job_id: &str,
        reason: Option<&str>,
    ) -> Result<JobStatus, ServiceError> {
        let record = self.get(owner_id, job_id).await?;
        if record.status.is_terminal() {
            return Ok(record.status);
        }
        let status = self
            .db
            .request_cancel(job_id, reason)
            .await?
            .ok_or_else(|| ServiceError::not_found(job_id))?;
        if status == JobStatus::InProgress {
            if let Some(control) = &self.control {
                control.request_cancel(job_id);
            }
        }
        tracing::info!(job_id, status = status.as_str(), "cancel requested");
        Ok(status)
    }

    /// Poll until the job is terminal; `Timeout` once `limit` has passed.
    pub async fn wait(
        &self,
        owner_id: &str,
        job_id: &str,
        limit: Duration,
        poll_every: Duration,
    ) -> Result<JobStatusView, ServiceError> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let view = self.status(owner_id, job_id).await?;
            if view.status.is_terminal() {
                return Ok(view);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ServiceError::Timeout {
                    job_id: job_id.to_string(),
                    waited: limit,
                });
            }
            tokio::time::sleep(poll_every).await;
        }
    }
}
