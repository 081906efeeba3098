//! Retention sweeper: delete finished jobs older than the retention window.
//!
//! Files go first, then the record. A crash in between leaves a record whose
//! directory is already gone; the next sweep treats the missing directory as
//! done and deletes the record.
//!
//! Export archives are not tied to a job by name (`--files` exports and custom
//! names), so each pass also drops any archive in an owner's `exports/` whose
//! modification time is older than the retention window.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

use crate::config::FetchqConfig;
use crate::job_store::{unix_timestamp, ExpiredJob, JobDb};
use crate::layout::{Layout, EXPORTS_DIR};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub jobs_removed: u64,
    pub archives_removed: u64,
    pub bytes_freed: u64,
}

pub struct Sweeper {
    db: JobDb,
    layout: Layout,
    retention: Duration,
    interval: Duration,
}

/// Total size of regular files under `dir`; 0 if it does not exist.
fn dir_size(dir: &Path) -> io::Result<u64> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut total = 0;
    for entry in entries {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}

/// Remove a job's directory. Returns the bytes it held; a missing directory is 0.
fn remove_job_dir(dir: &Path) -> io::Result<u64> {
    let size = dir_size(dir)?;
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(size),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

/// Remove export archives built from a job (`<job_id>.zip`, `<job_id>.tar.gz`).
fn remove_job_exports(exports_dir: &Path, job_id: &str) -> io::Result<u64> {
    let mut freed = 0;
    for ext in ["zip", "tar.gz"] {
        let path = exports_dir.join(format!("{job_id}.{ext}"));
        match std::fs::metadata(&path) {
            Ok(meta) => {
                std::fs::remove_file(&path)?;
                freed += meta.len();
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(freed)
}

/// Remove archives last modified before `cutoff` from every `<owner>/exports/`
/// under `root`. Returns (files removed, bytes freed).
fn remove_stale_exports(root: &Path, cutoff: SystemTime) -> io::Result<(u64, u64)> {
    let owners = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((0, 0)),
        Err(e) => return Err(e),
    };
    let (mut removed, mut freed) = (0, 0);
    for owner in owners {
        let owner = owner?;
        if !owner.file_type()?.is_dir() {
            continue;
        }
        let exports = owner.path().join(EXPORTS_DIR);
        if !exports.is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(&exports)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() || meta.modified()? >= cutoff {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    removed += 1;
                    freed += meta.len();
                    tracing::debug!(path = %entry.path().display(), "stale export removed");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok((removed, freed))
}

impl Sweeper {
    pub fn new(db: JobDb, layout: Layout, retention: Duration, interval: Duration) -> Self {
        Self {
            db,
            layout,
            retention,
            interval,
        }
    }

    pub fn from_config(db: JobDb, layout: Layout, cfg: &FetchqConfig) -> Self {
        Self::new(db, layout, cfg.retention(), cfg.sweep_interval())
    }

    async fn remove_artifacts(&self, job: &ExpiredJob) -> Result<u64> {
        let dir = self.layout.job_dir(&job.owner_id, &job.job_id);
        let exports = self.layout.exports_dir(&job.owner_id);
        let job_id = job.job_id.clone();
        tokio::task::spawn_blocking(move || -> Result<u64> {
            let freed = remove_job_dir(&dir).with_context(|| format!("remove {}", dir.display()))?;
            let archives = remove_job_exports(&exports, &job_id)
                .with_context(|| format!("remove exports of {}", job_id))?;
            Ok(freed + archives)
        })
        .await
        .context("sweep task join")?
    }

    /// One pass: every job finished before `now - retention` loses its files,
    /// then its record. A job whose files cannot be removed keeps its record
    /// and is retried on the next pass.
    pub async fn sweep_once(&self, now: i64) -> Result<SweepReport> {
        let cutoff = now.saturating_sub(self.retention.as_secs().min(i64::MAX as u64) as i64);
        let expired = self.db.list_expired(cutoff).await?;
        let mut report = SweepReport::default();

        for job in &expired {
            let freed = match self.remove_artifacts(job).await {
                Ok(freed) => freed,
                Err(e) => {
                    tracing::warn!(job_id = %job.job_id, "could not remove job files: {:#}", e);
                    continue;
                }
            };
            if self.db.delete_job(&job.job_id).await? {
                report.jobs_removed += 1;
            }
            report.bytes_freed += freed;
            tracing::debug!(job_id = %job.job_id, bytes = freed, "expired job removed");
        }

        let root = self.layout.root().to_path_buf();
        let cutoff_time = UNIX_EPOCH + Duration::from_secs(cutoff.max(0) as u64);
        match tokio::task::spawn_blocking(move || remove_stale_exports(&root, cutoff_time))
            .await
            .context("sweep task join")?
        {
            Ok((removed, freed)) => {
                report.archives_removed = removed;
                report.bytes_freed += freed;
            }
            Err(e) => tracing::warn!("could not prune export archives: {}", e),
        }

        if report.jobs_removed > 0 || report.archives_removed > 0 {
            tracing::info!(
                jobs = report.jobs_removed,
                archives = report.archives_removed,
                bytes = report.bytes_freed,
                "retention sweep done"
            );
        }
        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once(unix_timestamp()).await {
                        tracing::error!("retention sweep failed: {:#}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }
}
