//! Export: pack successful downloads into an archive under the owner's
//! `exports/` directory.

use std::path::{Path, PathBuf};

use super::archive::{write_archive, ArchiveEntry};
use super::types::{ExportReceipt, ExportRequest, ExportSource};
use super::{validate_owner, JobService};
use crate::error::{MissingItem, ServiceError};
use crate::job_store::{ItemStatus, JobRecord, JobStatus};
use crate::layout::{sanitize_component, unique_filenames};

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| sanitize_component(&n.to_string_lossy()))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "file".to_string())
}

fn with_unique_names(sources: Vec<PathBuf>) -> Vec<ArchiveEntry> {
    let names = unique_filenames(sources.iter().map(|p| entry_name(p)));
    sources
        .into_iter()
        .zip(names)
        .map(|(source, name)| ArchiveEntry { source, name })
        .collect()
}

/// Files of a finished job's successful items. Every item must be terminal and
/// every success must still be on disk; otherwise all offenders are reported.
fn job_sources(record: &JobRecord) -> Result<Vec<PathBuf>, ServiceError> {
    let mut sources = Vec::new();
    let mut missing = Vec::new();
    for (index, item) in record.items.iter().enumerate() {
        let reason = match record.results.get(&index) {
            None if record.status == JobStatus::Cancelled => Some("skipped".to_string()),
            None => Some(format!("not finished (job is {})", record.status)),
            Some(r) if r.status != ItemStatus::Success => None,
            Some(r) => match r.filepath.as_deref().map(PathBuf::from) {
                Some(path) if path.is_file() => {
                    sources.push(path);
                    None
                }
                Some(path) => Some(format!("file {} no longer exists", path.display())),
                None => Some("no file recorded".to_string()),
            },
        };
        if let Some(reason) = reason {
            missing.push(MissingItem {
                index,
                url: item.url.clone(),
                reason,
            });
        }
    }
    if !missing.is_empty() {
        return Err(ServiceError::PartialInput { missing });
    }
    if sources.is_empty() {
        return Err(ServiceError::validation(format!(
            "job {} has no successful items to export",
            record.job_id
        )));
    }
    Ok(sources)
}

impl JobService {
    /// Build an archive of a job's successful files, or of explicit files under
    /// the owner's directory.
    pub async fn export(&self, owner_id: &str, request: ExportRequest) -> Result<ExportReceipt, ServiceError> {
        validate_owner(owner_id)?;
        let (default_name, sources) = match &request.source {
            ExportSource::Job(job_id) => {
                let record = self.get(owner_id, job_id).await?;
                (record.job_id.clone(), job_sources(&record)?)
            }
            ExportSource::Files(paths) => {
                if paths.is_empty() {
                    return Err(ServiceError::validation("no files to export"));
                }
                let missing: Vec<MissingItem> = paths
                    .iter()
                    .enumerate()
                    .filter_map(|(index, path)| {
                        let reason = if !path.is_file() {
                            "not found"
                        } else if !self.layout.is_owned_by(owner_id, path) {
                            "outside the owner's directory"
                        } else {
                            return None;
                        };
                        Some(MissingItem {
                            index,
                            url: path.display().to_string(),
                            reason: reason.to_string(),
                        })
                    })
                    .collect();
                if !missing.is_empty() {
                    return Err(ServiceError::PartialInput { missing });
                }
                (format!("export-{}", uuid::Uuid::new_v4()), paths.clone())
            }
        };

        let name = request
            .name
            .as_deref()
            .map(sanitize_component)
            .filter(|n| !n.is_empty())
            .unwrap_or(default_name);
        let archive_path = self
            .layout
            .exports_dir(owner_id)
            .join(format!("{}.{}", name, request.format.extension()));
        let entries = with_unique_names(sources);
        let file_count = entries.len();
        let format = request.format;

        let target = archive_path.clone();
        let archive_size =
            tokio::task::spawn_blocking(move || write_archive(&target, format, &entries))
                .await
                .map_err(|e| anyhow::anyhow!("archive task join: {}", e))??;

        tracing::info!(
            owner_id,
            files = file_count,
            bytes = archive_size,
            "exported {}",
            archive_path.display()
        );
        Ok(ExportReceipt {
            archive_path,
            format,
            file_count,
            archive_size,
        })
    }
}
