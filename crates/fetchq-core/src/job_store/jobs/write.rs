//! Job write operations: create, claim, record results, finish, cancel, delete.
//!
//! Every status change is guarded by a `WHERE status = ...` predicate so a
//! terminal job can never move back to `pending` or `in_progress`.

use anyhow::Result;

use super::super::db::{unix_millis, unix_timestamp, JobDb};
use super::super::types::{ItemResult, JobId, JobStatus, Lease, NewJob};

impl JobDb {
    /// Insert a new pending job and return its id.
    ///
    /// Callers validate the submission first; an empty item list is refused here too.
    pub async fn create_job(&self, job: &NewJob) -> Result<JobId> {
        anyhow::ensure!(!job.items.is_empty(), "refusing to store a job with no items");
        let job_id = uuid::Uuid::new_v4().to_string();
        let now = unix_timestamp();
        let items_json = serde_json::to_string(&job.items)?;
        let metadata_json = job.metadata.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                job_id, owner_id, status, priority, items_json, total_items,
                metadata_json, current_file, cancel_requested, cancel_reason,
                created_at, updated_at, started_at, finished_at
            ) VALUES (?1, ?2, 'pending', ?3, ?4, ?5,
                      ?6, NULL, 0, NULL,
                      ?7, ?7, NULL, NULL)
            "#,
        )
        .bind(&job_id)
        .bind(&job.owner_id)
        .bind(job.priority as i64)
        .bind(items_json)
        .bind(job.items.len() as i64)
        .bind(metadata_json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(job_id)
    }

    /// Atomically claim the highest-priority, oldest pending job by moving it to
    /// `in_progress` under `lease`. A single statement, so two workers never
    /// claim the same job.
    pub async fn claim_next_pending(&self, lease: &Lease) -> Result<Option<JobId>> {
        let now = unix_timestamp();
        let claimed: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET status = 'in_progress',
                started_at = COALESCE(started_at, ?1),
                updated_at = ?1,
                lease_holder = ?2,
                lease_expires_ms = ?3
            WHERE seq = (
                SELECT seq FROM jobs
                WHERE status = 'pending'
                ORDER BY priority DESC, seq ASC
                LIMIT 1
            )
              AND status = 'pending'
            RETURNING job_id
            "#,
        )
        .bind(now)
        .bind(&lease.holder)
        .bind(unix_millis().saturating_add(lease.ttl_millis()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(claimed)
    }

    /// Extend `lease` on a running job. Returns false if the job is no longer
    /// in progress under this holder (finished, or recovered by someone else).
    pub async fn renew_lease(&self, job_id: &str, lease: &Lease) -> Result<bool> {
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_ms = ?1
            WHERE job_id = ?2 AND status = 'in_progress' AND lease_holder = ?3
            "#,
        )
        .bind(unix_millis().saturating_add(lease.ttl_millis()))
        .bind(job_id)
        .bind(&lease.holder)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() > 0)
    }

    /// Record the terminal result of one item. The first write for an index wins;
    /// later writes for the same index are ignored. Returns whether a row was written.
    pub async fn record_item_result(
        &self,
        job_id: &str,
        index: usize,
        result: &ItemResult,
        current_file: Option<&str>,
    ) -> Result<bool> {
        let now = unix_timestamp();
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO job_results (
                job_id, item_index, status, filepath, size, checksum, error, attempts, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (job_id, item_index) DO NOTHING
            "#,
        )
        .bind(job_id)
        .bind(index as i64)
        .bind(result.status.as_str())
        .bind(&result.filepath)
        .bind(result.size.map(|s| s as i64))
        .bind(&result.checksum)
        .bind(&result.error)
        .bind(result.attempts as i64)
        .bind(result.completed_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            UPDATE jobs
            SET updated_at = ?1,
                current_file = COALESCE(?2, current_file)
            WHERE job_id = ?3 AND status = 'in_progress'
            "#,
        )
        .bind(now)
        .bind(current_file)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(inserted > 0)
    }

    /// Move an in-progress job held under `lease` to a terminal status. Returns
    /// false if the job was not in progress under this holder.
    pub async fn finish_job(&self, job_id: &str, status: JobStatus, lease: &Lease) -> Result<bool> {
        anyhow::ensure!(status.is_terminal(), "finish_job needs a terminal status, got {}", status);
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?1,
                finished_at = ?2,
                updated_at = ?2,
                current_file = NULL,
                lease_holder = NULL,
                lease_expires_ms = NULL
            WHERE job_id = ?3 AND status = 'in_progress' AND lease_holder = ?4
            "#,
        )
        .bind(status.as_str())
        .bind(now)
        .bind(job_id)
        .bind(&lease.holder)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() > 0)
    }

    /// Request cancellation. A pending job goes straight to `cancelled`; an
    /// in-progress job gets its cancel flag set for the worker to observe;
    /// terminal jobs are left untouched. Returns the status afterwards, or
    /// None if the job does not exist.
    pub async fn request_cancel(&self, job_id: &str, reason: Option<&str>) -> Result<Option<JobStatus>> {
        let now = unix_timestamp();
        let pending = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'cancelled',
                cancel_requested = 1,
                cancel_reason = COALESCE(cancel_reason, ?1),
                finished_at = ?2,
                updated_at = ?2
            WHERE job_id = ?3 AND status = 'pending'
            "#,
        )
        .bind(reason)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if pending.rows_affected() == 0 {
            sqlx::query(
                r#"
                UPDATE jobs
                SET cancel_requested = 1,
                    cancel_reason = COALESCE(cancel_reason, ?1),
                    updated_at = ?2
                WHERE job_id = ?3 AND status = 'in_progress' AND cancel_requested = 0
                "#,
            )
            .bind(reason)
            .bind(now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        }

        let status: Option<String> = sqlx::query_scalar(r#"SELECT status FROM jobs WHERE job_id = ?1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        status.map(|s| s.parse()).transpose()
    }

    /// Return in-progress jobs whose lease has expired (their worker died or
    /// stalled) to the queue. Jobs held under a live lease are left alone, so a
    /// second process starting up never takes over running work. Results
    /// already recorded are kept; the next worker only runs the rest.
    pub async fn recover_in_progress(&self) -> Result<u64> {
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                current_file = NULL,
                lease_holder = NULL,
                lease_expires_ms = NULL,
                updated_at = ?1
            WHERE status = 'in_progress'
              AND (lease_expires_ms IS NULL OR lease_expires_ms <= ?2)
            "#,
        )
        .bind(unix_timestamp())
        .bind(unix_millis())
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }

    /// Permanently remove a job and its results. Deleting a missing job is a no-op
    /// (returns false). File cleanup is the caller's job and must happen first.
    pub async fn delete_job(&self, job_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(r#"DELETE FROM job_results WHERE job_id = ?1"#)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        let r = sqlx::query(r#"DELETE FROM jobs WHERE job_id = ?1"#)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(r.rows_affected() > 0)
    }
}
