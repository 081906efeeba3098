//! `fetchq submit` – queue a batch of URLs as one job.

use anyhow::{Context, Result};
use fetchq_core::job_store::RequestedItem;
use fetchq_core::service::SubmitRequest;
use std::path::PathBuf;
use std::time::Duration;

use super::output::print_json;
use super::status::print_status;
use crate::cli::engine::Engine;

#[derive(Debug, Default)]
pub struct SubmitArgs {
    pub urls: Vec<String>,
    pub file: Option<PathBuf>,
    pub priority: Option<u8>,
    pub metadata: Option<String>,
    pub wait: Option<u64>,
}

/// Items from a `--file`: a JSON array of items, or one URL per line
/// (blank lines and `#` comments ignored).
pub(crate) fn items_from_text(text: &str) -> Result<Vec<RequestedItem>> {
    if text.trim_start().starts_with('[') {
        return serde_json::from_str(text).context("parse JSON item list");
    }
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(RequestedItem::new)
        .collect())
}

pub async fn run_submit(engine: &Engine, owner: &str, args: SubmitArgs, json: bool) -> Result<()> {
    let mut items: Vec<RequestedItem> = args.urls.into_iter().map(RequestedItem::new).collect();
    if let Some(path) = &args.file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        items.extend(items_from_text(&text)?);
    }
    let metadata = args
        .metadata
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--metadata is not valid JSON")?;

    let receipt = engine
        .service
        .submit(SubmitRequest {
            owner_id: owner.to_string(),
            items,
            priority: args.priority,
            metadata,
        })
        .await?;

    if json {
        print_json(&receipt)?;
    } else {
        println!(
            "Submitted job {} (queue position {}, ~{}s)",
            receipt.job_id, receipt.queue_position, receipt.estimated_time_secs
        );
    }

    if let Some(secs) = args.wait {
        let view = engine
            .service
            .wait(
                owner,
                &receipt.job_id,
                Duration::from_secs(secs),
                engine.wait_poll_interval(),
            )
            .await?;
        if json {
            print_json(&view)?;
        } else {
            print_status(&view);
        }
    }
    Ok(())
}
