//! Errors returned by the status/control surface (`JobService`).

use std::time::Duration;

use crate::job_store::{JobId, JobStatus};

/// One item that blocked an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingItem {
    pub index: usize,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("job {job_id} not found")]
    NotFound { job_id: JobId },
    #[error("job {job_id} is not finished (status: {status})")]
    NotReady { job_id: JobId, status: JobStatus },
    #[error("{} item(s) unavailable for export", missing.len())]
    PartialInput { missing: Vec<MissingItem> },
    /// The caller's wait limit ran out; the job itself keeps running.
    #[error("gave up waiting for job {job_id} after {waited:?}")]
    Timeout { job_id: JobId, waited: Duration },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ServiceError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }

    pub(crate) fn not_found(job_id: &str) -> Self {
        ServiceError::NotFound {
            job_id: job_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_job() {
        let e = ServiceError::NotReady {
            job_id: "abc".into(),
            status: JobStatus::InProgress,
        };
        assert_eq!(e.to_string(), "job abc is not finished (status: in_progress)");
        let e = ServiceError::PartialInput {
            missing: vec![MissingItem {
                index: 1,
                url: "https://h/x".into(),
                reason: "failed".into(),
            }],
        };
        assert_eq!(e.to_string(), "1 item(s) unavailable for export");
    }

    #[test]
    fn wait_timeout_blames_the_caller_not_the_job() {
        let e = ServiceError::Timeout {
            job_id: "abc".into(),
            waited: Duration::from_secs(60),
        };
        assert_eq!(e.to_string(), "gave up waiting for job abc after 60s");
        let e = ServiceError::Timeout {
            job_id: "abc".into(),
            waited: Duration::from_millis(50),
        };
        assert_eq!(e.to_string(), "gave up waiting for job abc after 50ms");
    }
}
