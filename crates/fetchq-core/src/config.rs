use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Retry policy parameters for the transfer unit (`[retry]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per item (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.5 = 500ms). Also the jitter bound.
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds, before jitter.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 0.5,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// libcurl timeouts for a single transfer attempt (`[transfer]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    pub connect_timeout_secs: u64,
    /// Whole-attempt timeout; a stalled attempt counts as a transient failure.
    pub timeout_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            timeout_secs: 300,
        }
    }
}

/// Global configuration loaded from `~/.config/fetchq/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchqConfig {
    /// Number of jobs processed at once (one job per worker).
    pub worker_pool_size: usize,
    /// Maximum transfers in flight inside one job (K).
    pub per_job_concurrency: usize,
    /// Optional hard cap on transfers across all jobs. None = workers * K.
    pub global_max_transfers: Option<usize>,
    /// Largest accepted batch at submission.
    pub max_batch_size: usize,
    /// Upper clamp for `per_page` in list queries.
    pub max_page_size: usize,
    /// Wall-clock budget per job; once elapsed no new items are admitted.
    pub job_timeout_secs: u64,
    /// Finished jobs older than this are purged by the sweeper.
    pub retention_days: u64,
    pub sweep_interval_secs: u64,
    /// How often a running job re-reads its cancel flag from the store.
    pub cancel_poll_interval_ms: u64,
    /// How long an idle `serve` loop waits before polling the queue again.
    pub idle_poll_interval_ms: u64,
    /// A claimed job's lease lifetime. Workers renew it while running; a job
    /// whose lease lapses is returned to the queue by the next recovery pass.
    pub lease_secs: u64,
    /// Job database file. None = `~/.local/state/fetchq/jobs.db`.
    pub db_path: Option<PathBuf>,
    /// Root for per-owner/per-job artifacts. None = `~/.local/share/fetchq/downloads`.
    pub download_root: Option<PathBuf>,
    pub retry: RetryConfig,
    pub transfer: TransferConfig,
}

impl Default for FetchqConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 2,
            per_job_concurrency: 5,
            global_max_transfers: None,
            max_batch_size: 100,
            max_page_size: 100,
            job_timeout_secs: 3600,
            retention_days: 7,
            sweep_interval_secs: 3600,
            cancel_poll_interval_ms: 500,
            idle_poll_interval_ms: 1000,
            lease_secs: 30,
            db_path: None,
            download_root: None,
            retry: RetryConfig::default(),
            transfer: TransferConfig::default(),
        }
    }
}

impl FetchqConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(24 * 60 * 60))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn cancel_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cancel_poll_interval_ms.max(10))
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms.max(10))
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_secs.max(1))
    }

    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }
        crate::job_store::default_db_path()
    }

    /// Resolved artifact root: the configured path or the XDG data dir.
    pub fn resolve_download_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.download_root {
            return Ok(root.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("fetchq")?;
        Ok(xdg_dirs.get_data_home().join("downloads"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("fetchq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<FetchqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = FetchqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit path (e.g. `--config`).
pub fn load_from(path: &Path) -> Result<FetchqConfig> {
    let data = fs::read_to_string(path)?;
    let cfg: FetchqConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = FetchqConfig::default();
        assert_eq!(cfg.worker_pool_size, 2);
        assert_eq!(cfg.per_job_concurrency, 5);
        assert_eq!(cfg.max_batch_size, 100);
        assert_eq!(cfg.job_timeout(), Duration::from_secs(3600));
        assert_eq!(cfg.retention(), Duration::from_secs(7 * 24 * 3600));
        assert!(cfg.global_max_transfers.is_none());
        assert_eq!(cfg.lease_ttl(), Duration::from_secs(30));
        assert!(cfg.db_path.is_none());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = FetchqConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: FetchqConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.worker_pool_size, cfg.worker_pool_size);
        assert_eq!(parsed.per_job_concurrency, cfg.per_job_concurrency);
        assert_eq!(parsed.retry.max_attempts, cfg.retry.max_attempts);
        assert_eq!(parsed.transfer.timeout_secs, cfg.transfer.timeout_secs);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml = r#"
            worker_pool_size = 4
            per_job_concurrency = 2
        "#;
        let cfg: FetchqConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.worker_pool_size, 4);
        assert_eq!(cfg.per_job_concurrency, 2);
        assert_eq!(cfg.max_page_size, 100);
        assert_eq!(cfg.retry.max_attempts, 3);
    }

    #[test]
    fn config_toml_retry_and_root() {
        let toml = r#"
            global_max_transfers = 12
            download_root = "/srv/fetchq"

            [retry]
            max_attempts = 5
            base_delay_secs = 0.25
            max_delay_secs = 10
        "#;
        let cfg: FetchqConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.global_max_transfers, Some(12));
        assert_eq!(
            cfg.resolve_download_root().unwrap(),
            PathBuf::from("/srv/fetchq")
        );
        let policy = cfg.retry.policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn db_path_follows_config_file() {
        let cfg: FetchqConfig = toml::from_str(r#"db_path = "/srv/fetchq/jobs.db""#).unwrap();
        assert_eq!(
            cfg.resolve_db_path().unwrap(),
            PathBuf::from("/srv/fetchq/jobs.db")
        );

        let cfg: FetchqConfig = toml::from_str("").unwrap();
        assert!(cfg.resolve_db_path().unwrap().ends_with("fetchq/jobs.db"));
    }

    #[test]
    fn zero_lease_clamped_to_one_second() {
        let cfg: FetchqConfig = toml::from_str("lease_secs = 0").unwrap();
        assert_eq!(cfg.lease_ttl(), Duration::from_secs(1));
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        let retry = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(retry.policy().max_attempts, 1);
    }
}
