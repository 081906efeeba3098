//! `fetchq status` and `fetchq list` – job progress and job listings.

use anyhow::Result;
use fetchq_core::job_store::JobStatus;
use fetchq_core::service::{JobStatusView, ListQuery};
use std::time::Duration;

use super::output::{or_dash, print_json};
use crate::cli::engine::Engine;

pub(crate) fn print_status(view: &JobStatusView) {
    let p = &view.progress;
    println!("Job:       {}", view.job_id);
    println!("Status:    {}", view.status);
    println!(
        "Progress:  {:.1}% ({} ok, {} failed, {} skipped of {})",
        p.percentage, p.completed, p.failed, p.skipped, p.total
    );
    if let Some(pos) = view.queue_position {
        println!("Queue:     #{pos}");
    }
    if let Some(current) = &p.current_file {
        println!("Current:   {current}");
    }
    if view.cancel_requested && !view.status.is_terminal() {
        println!("Cancel:    requested");
    }
}

pub async fn run_status(
    engine: &Engine,
    owner: &str,
    job_id: &str,
    wait: Option<u64>,
    json: bool,
) -> Result<()> {
    let view = match wait {
        Some(secs) => {
            engine
                .service
                .wait(owner, job_id, Duration::from_secs(secs), engine.wait_poll_interval())
                .await?
        }
        None => engine.service.status(owner, job_id).await?,
    };
    if json {
        print_json(&view)?;
    } else {
        print_status(&view);
    }
    Ok(())
}

pub async fn run_list(
    engine: &Engine,
    owner: &str,
    status: Option<JobStatus>,
    page: u64,
    per_page: u64,
    json: bool,
) -> Result<()> {
    let page = engine
        .service
        .list(
            owner,
            ListQuery {
                status,
                page,
                per_page,
            },
        )
        .await?;
    if json {
        return print_json(&page);
    }
    if page.jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }
    println!(
        "{:<36} {:<12} {:<4} {:<6} {:<11} {}",
        "ID", "STATUS", "PRI", "ITEMS", "CREATED", "FINISHED"
    );
    for j in &page.jobs {
        println!(
            "{:<36} {:<12} {:<4} {:<6} {:<11} {}",
            j.job_id,
            j.status.as_str(),
            j.priority,
            j.total_items,
            j.created_at,
            or_dash(j.finished_at)
        );
    }
    println!(
        "page {} ({} per page), {} job(s) total",
        page.page, page.per_page, page.total
    );
    Ok(())
}
