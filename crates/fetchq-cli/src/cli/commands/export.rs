//! `fetchq export` – archive a job's files or a list of owned files.

use anyhow::Result;
use fetchq_core::service::{ArchiveFormat, ExportRequest, ExportSource};
use fetchq_core::ServiceError;
use std::path::PathBuf;

use super::output::print_json;
use crate::cli::engine::Engine;

pub async fn run_export(
    engine: &Engine,
    owner: &str,
    job: Option<String>,
    files: Vec<PathBuf>,
    format: ArchiveFormat,
    name: Option<String>,
    json: bool,
) -> Result<()> {
    let source = match job {
        Some(job_id) => ExportSource::Job(job_id),
        None => ExportSource::Files(files),
    };
    let receipt = match engine
        .service
        .export(
            owner,
            ExportRequest {
                source,
                format,
                name,
            },
        )
        .await
    {
        Ok(receipt) => receipt,
        Err(ServiceError::PartialInput { missing }) => {
            for m in &missing {
                eprintln!("  #{} {}: {}", m.index, m.url, m.reason);
            }
            anyhow::bail!("{} item(s) cannot be exported", missing.len());
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        print_json(&receipt)?;
    } else {
        println!(
            "Wrote {} ({} file(s), {} bytes)",
            receipt.archive_path.display(),
            receipt.file_count,
            receipt.archive_size
        );
    }
    Ok(())
}
