//! `fetchq sweep` – one retention pass.

use anyhow::Result;
use fetchq_core::job_store::unix_timestamp;

use super::output::print_json;
use crate::cli::engine::Engine;

pub async fn run_sweep(engine: &Engine, json: bool) -> Result<()> {
    let report = engine.sweeper().sweep_once(unix_timestamp()).await?;
    if json {
        print_json(&report)?;
    } else {
        println!(
            "Removed {} job(s) and {} stale archive(s), freed {} bytes.",
            report.jobs_removed, report.archives_removed, report.bytes_freed
        );
    }
    Ok(())
}
