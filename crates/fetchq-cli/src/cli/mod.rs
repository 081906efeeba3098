//! CLI for the fetchq download job queue.

mod commands;
mod engine;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fetchq_core::config;
use fetchq_core::job_store::{JobDb, JobStatus};
use fetchq_core::service::ArchiveFormat;
use std::path::PathBuf;

use commands::{
    run_cancel, run_checksum, run_export, run_list, run_result, run_serve, run_status,
    run_submit, run_sweep, run_workers, SubmitArgs,
};
use engine::Engine;

/// Top-level CLI for fetchq.
#[derive(Debug, Parser)]
#[command(name = "fetchq")]
#[command(about = "fetchq: batched, bounded-parallel download jobs", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/fetchq/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Owner the command acts for. Jobs of other owners are invisible.
    #[arg(long, global = true, default_value = "local")]
    pub owner: String,

    /// Print JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Submit a batch of URLs as one job.
    Submit {
        /// HTTP/HTTPS URLs to download.
        urls: Vec<String>,

        /// Read items from a file: a JSON array of items, or one URL per line.
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,

        /// Queue priority, 1 (lowest) to 10 (highest). Default 5.
        #[arg(long)]
        priority: Option<u8>,

        /// Opaque JSON stored with the job and echoed in its result.
        #[arg(long, value_name = "JSON")]
        metadata: Option<String>,

        /// Block until the job finishes or SECS elapse.
        #[arg(long, value_name = "SECS")]
        wait: Option<u64>,
    },

    /// Process queued jobs until none are left, then exit.
    Run,

    /// Run workers and the retention sweeper until interrupted.
    Serve,

    /// Show status and progress of a job.
    Status {
        /// Job identifier.
        job_id: String,

        /// Block until the job finishes or SECS elapse.
        #[arg(long, value_name = "SECS")]
        wait: Option<u64>,
    },

    /// Show per-item results of a finished job.
    Result {
        /// Job identifier.
        job_id: String,

        /// Print only the URLs that failed, one per line.
        #[arg(long)]
        failed_only: bool,
    },

    /// List jobs, newest first.
    List {
        /// Only jobs in this status (pending, in_progress, completed, partial, failed, cancelled).
        #[arg(long)]
        status: Option<JobStatus>,

        #[arg(long, default_value = "1")]
        page: u64,

        #[arg(long, default_value = "20")]
        per_page: u64,
    },

    /// Cancel a pending or running job.
    Cancel {
        /// Job identifier.
        job_id: String,

        /// Reason recorded with the job.
        #[arg(long)]
        reason: Option<String>,
    },

    /// Pack a job's files, or files of your own, into an archive.
    Export {
        /// Export the successful files of this job.
        #[arg(long, value_name = "JOB_ID", conflicts_with = "files", required_unless_present = "files")]
        job: Option<String>,

        /// Export these files (must live under your download directory).
        #[arg(long, num_args = 1.., value_name = "PATH")]
        files: Vec<PathBuf>,

        /// Archive format: zip or tar_gz.
        #[arg(long, default_value = "zip")]
        format: ArchiveFormat,

        /// Archive name without extension.
        #[arg(long)]
        name: Option<String>,
    },

    /// Remove finished jobs past retention, with their files.
    Sweep,

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = match &cli.config {
            Some(path) => config::load_from(path)?,
            None => config::load_or_init()?,
        };
        tracing::debug!("loaded config: {:?}", cfg);

        if let CliCommand::Checksum { path } = &cli.command {
            return run_checksum(path).await;
        }

        let db_path = cfg.resolve_db_path()?;
        tracing::debug!(path = %db_path.display(), "opening job store");
        let db = JobDb::open_at(&db_path).await?;
        let engine = Engine::new(db, cfg)?;
        let owner = cli.owner.as_str();
        let json = cli.json;

        match cli.command {
            CliCommand::Submit {
                urls,
                file,
                priority,
                metadata,
                wait,
            } => {
                let args = SubmitArgs {
                    urls,
                    file,
                    priority,
                    metadata,
                    wait,
                };
                run_submit(&engine, owner, args, json).await?
            }
            CliCommand::Run => run_workers(&engine).await?,
            CliCommand::Serve => run_serve(&engine).await?,
            CliCommand::Status { job_id, wait } => {
                run_status(&engine, owner, &job_id, wait, json).await?
            }
            CliCommand::Result {
                job_id,
                failed_only,
            } => run_result(&engine, owner, &job_id, failed_only, json).await?,
            CliCommand::List {
                status,
                page,
                per_page,
            } => run_list(&engine, owner, status, page, per_page, json).await?,
            CliCommand::Cancel { job_id, reason } => {
                run_cancel(&engine, owner, &job_id, reason.as_deref()).await?
            }
            CliCommand::Export {
                job,
                files,
                format,
                name,
            } => run_export(&engine, owner, job, files, format, name, json).await?,
            CliCommand::Sweep => run_sweep(&engine, json).await?,
            CliCommand::Checksum { path } => run_checksum(&path).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
