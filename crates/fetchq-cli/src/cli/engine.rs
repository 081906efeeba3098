//! Wiring of the core pieces for one CLI invocation.

use anyhow::Result;
use fetchq_core::config::FetchqConfig;
use fetchq_core::control::JobControl;
use fetchq_core::dispatcher::{Dispatcher, DispatcherSettings};
use fetchq_core::governor::{GlobalTransferBudget, Governor, GovernorSettings};
use fetchq_core::job_store::JobDb;
use fetchq_core::layout::Layout;
use fetchq_core::service::{JobService, ServiceLimits};
use fetchq_core::sweeper::Sweeper;
use fetchq_core::transfer::{CurlFetcher, Fetcher};
use std::sync::Arc;
use std::time::Duration;

pub struct Engine {
    pub cfg: FetchqConfig,
    pub db: JobDb,
    pub layout: Layout,
    pub control: Arc<JobControl>,
    pub service: JobService,
}

impl Engine {
    pub fn new(db: JobDb, cfg: FetchqConfig) -> Result<Self> {
        let layout = Layout::new(cfg.resolve_download_root()?);
        let control = Arc::new(JobControl::new());
        let service = JobService::new(db.clone(), layout.clone(), ServiceLimits::from_config(&cfg))
            .with_control(Arc::clone(&control));
        Ok(Self {
            cfg,
            db,
            layout,
            control,
            service,
        })
    }

    /// Worker pool over libcurl, sharing this engine's cancel registry.
    pub fn dispatcher(&self) -> Dispatcher {
        let fetcher: Arc<dyn Fetcher> = Arc::new(CurlFetcher::new(&self.cfg.transfer));
        let mut governor = Governor::new(fetcher, GovernorSettings::from_config(&self.cfg));
        if let Some(max) = self.cfg.global_max_transfers {
            governor = governor.with_budget(Arc::new(GlobalTransferBudget::new(max)));
        }
        Dispatcher::new(
            self.db.clone(),
            governor,
            self.layout.clone(),
            Arc::clone(&self.control),
            DispatcherSettings::from_config(&self.cfg),
        )
    }

    pub fn sweeper(&self) -> Sweeper {
        Sweeper::from_config(self.db.clone(), self.layout.clone(), &self.cfg)
    }

    /// Poll interval for `--wait`.
    pub fn wait_poll_interval(&self) -> Duration {
        self.cfg.idle_poll_interval().min(Duration::from_millis(500))
    }
}
