//! Job read operations: get, list, queue position, expiry scan.

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;

use super::super::db::JobDb;
use super::super::types::{
    ExpiredJob, ItemResult, JobId, JobRecord, JobStatus, JobSummary, RequestedItem,
};

/// Filter for list queries; `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub owner_id: Option<String>,
    pub status: Option<JobStatus>,
}

fn priority_from_row(row: &SqliteRow) -> u8 {
    let p: i64 = row.get("priority");
    p.clamp(0, u8::MAX as i64) as u8
}

fn summary_from_row(row: &SqliteRow) -> Result<JobSummary> {
    let status: String = row.get("status");
    let total_items: i64 = row.get("total_items");
    Ok(JobSummary {
        job_id: row.get("job_id"),
        owner_id: row.get("owner_id"),
        status: status.parse()?,
        priority: priority_from_row(row),
        total_items: total_items.max(0) as usize,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        finished_at: row.get("finished_at"),
    })
}

fn result_from_row(row: &SqliteRow) -> Result<(usize, ItemResult)> {
    let index: i64 = row.get("item_index");
    let status: String = row.get("status");
    let size: Option<i64> = row.get("size");
    let attempts: i64 = row.get("attempts");
    Ok((
        index.max(0) as usize,
        ItemResult {
            status: status.parse()?,
            filepath: row.get("filepath"),
            size: size.map(|s| s.max(0) as u64),
            checksum: row.get("checksum"),
            error: row.get("error"),
            attempts: attempts.max(0) as u32,
            completed_at: row.get("completed_at"),
        },
    ))
}

impl JobDb {
    /// Fetch one job with all of its item results.
    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let row = sqlx::query(
            r#"
            SELECT
                job_id, owner_id, status, priority, items_json, metadata_json,
                current_file, cancel_requested, cancel_reason,
                created_at, updated_at, started_at, finished_at
            FROM jobs
            WHERE job_id = ?1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.get("status");
        let items_json: String = row.get("items_json");
        let metadata_json: Option<String> = row.get("metadata_json");
        let cancel_requested: i64 = row.get("cancel_requested");

        let items: Vec<RequestedItem> =
            serde_json::from_str(&items_json).context("decode requested items")?;
        let metadata = metadata_json
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| serde_json::from_str::<serde_json::Value>(s))
            .transpose()
            .context("decode job metadata")?;

        let result_rows = sqlx::query(
            r#"
            SELECT item_index, status, filepath, size, checksum, error, attempts, completed_at
            FROM job_results
            WHERE job_id = ?1
            ORDER BY item_index ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        let mut results = BTreeMap::new();
        for r in &result_rows {
            let (index, result) = result_from_row(r)?;
            results.insert(index, result);
        }

        Ok(Some(JobRecord {
            job_id: row.get("job_id"),
            owner_id: row.get("owner_id"),
            status: status.parse()?,
            priority: priority_from_row(&row),
            items,
            results,
            metadata,
            current_file: row.get("current_file"),
            cancel_requested: cancel_requested != 0,
            cancel_reason: row.get("cancel_reason"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
        }))
    }

    /// Cheap poll used by running workers to observe cancellation.
    pub async fn is_cancel_requested(&self, job_id: &str) -> Result<bool> {
        let flag: Option<i64> =
            sqlx::query_scalar(r#"SELECT cancel_requested FROM jobs WHERE job_id = ?1"#)
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(flag.unwrap_or(0) != 0)
    }

    /// List jobs matching `filter`, newest first, with the total match count.
    pub async fn list_jobs(
        &self,
        filter: &JobFilter,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<JobSummary>, u64)> {
        let owner = filter.owner_id.as_deref();
        let status = filter.status.map(JobStatus::as_str);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE (?1 IS NULL OR owner_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            "#,
        )
        .bind(owner)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(
            r#"
            SELECT job_id, owner_id, status, priority, total_items,
                   created_at, updated_at, finished_at
            FROM jobs
            WHERE (?1 IS NULL OR owner_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at DESC, seq DESC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(owner)
        .bind(status)
        .bind(limit.min(i64::MAX as u64) as i64)
        .bind(offset.min(i64::MAX as u64) as i64)
        .fetch_all(&self.pool)
        .await?;

        let jobs = rows
            .iter()
            .map(summary_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok((jobs, total.max(0) as u64))
    }

    /// 1-based position among pending jobs in dispatch order, or None if not pending.
    pub async fn queue_position(&self, job_id: &str) -> Result<Option<u64>> {
        let row = sqlx::query(r#"SELECT seq, priority, status FROM jobs WHERE job_id = ?1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.get("status");
        if status != JobStatus::Pending.as_str() {
            return Ok(None);
        }
        let seq: i64 = row.get("seq");
        let priority: i64 = row.get("priority");
        let ahead: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE status = 'pending'
              AND (priority > ?1 OR (priority = ?1 AND seq < ?2))
            "#,
        )
        .bind(priority)
        .bind(seq)
        .fetch_one(&self.pool)
        .await?;
        Ok(Some(ahead.max(0) as u64 + 1))
    }

    /// Jobs with `finished_at` strictly before `cutoff` (Unix seconds).
    pub async fn list_expired(&self, cutoff: i64) -> Result<Vec<ExpiredJob>> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, owner_id, finished_at FROM jobs
            WHERE finished_at IS NOT NULL AND finished_at < ?1
            ORDER BY finished_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| ExpiredJob {
                job_id: row.get::<JobId, _>("job_id"),
                owner_id: row.get("owner_id"),
                finished_at: row.get("finished_at"),
            })
            .collect())
    }
}
