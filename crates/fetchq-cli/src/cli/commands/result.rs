//! `fetchq result` – per-item outcome of a finished job.

use anyhow::Result;
use fetchq_core::job_store::ItemStatus;

use super::output::{or_dash, print_json};
use crate::cli::engine::Engine;

pub async fn run_result(
    engine: &Engine,
    owner: &str,
    job_id: &str,
    failed_only: bool,
    json: bool,
) -> Result<()> {
    let view = engine.service.result(owner, job_id).await?;

    if failed_only {
        let urls = view.failed_urls();
        if json {
            return print_json(&urls);
        }
        for url in urls {
            println!("{url}");
        }
        return Ok(());
    }
    if json {
        return print_json(&view);
    }

    let s = &view.summary;
    println!(
        "Job {} {}: {} ok, {} failed, {} skipped of {} ({} bytes)",
        view.job_id, view.status, s.successful, s.failed, s.skipped, s.total_requested, s.total_size
    );
    if let Some(reason) = &view.cancel_reason {
        println!("Cancelled: {reason}");
    }
    println!("{:<5} {:<8} {:<4} {:<10} {}", "#", "STATUS", "TRY", "SIZE", "URL / FILE / ERROR");
    for r in &view.results {
        let detail = match r.result.status {
            ItemStatus::Success => or_dash(r.result.filepath.as_deref()),
            _ => or_dash(r.result.error.as_deref()),
        };
        println!(
            "{:<5} {:<8} {:<4} {:<10} {}",
            r.index,
            r.result.status.as_str(),
            r.result.attempts,
            or_dash(r.result.size),
            r.url
        );
        println!("{:<29} {}", "", detail);
    }
    Ok(())
}
