//! Cancel tokens for running jobs.
//!
//! Each job a worker is running is registered here with a token. Cancellation
//! requested in-process (or observed in the store by the worker's poll task)
//! sets the token; the governor checks it before admitting each item.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::job_store::JobId;

/// Shared cancel flag for one job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Registry of job id -> cancel token for jobs running in this process.
#[derive(Debug, Default)]
pub struct JobControl {
    jobs: RwLock<HashMap<JobId, CancelToken>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-updated, so
    // poisoned guards are used as-is.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, CancelToken>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, CancelToken>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a job that is about to run and return its token.
    pub fn register(&self, job_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.write().insert(job_id.to_string(), token.clone());
        token
    }

    /// Drop the token once the job has reached a terminal status.
    pub fn unregister(&self, job_id: &str) {
        self.write().remove(job_id);
    }

    /// Set the token of a running job. Returns false if the job is not running here.
    pub fn request_cancel(&self, job_id: &str) -> bool {
        match self.read().get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.read().contains_key(job_id)
    }
}
