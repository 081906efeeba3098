//! Global transfer budget shared across jobs.
//!
//! With several workers each running up to K transfers, the process-wide
//! total is roughly `workers * K`. When `global_max_transfers` is set, every
//! transfer also holds a permit from this budget so the total stays under it.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
pub struct GlobalTransferBudget {
    max_total: usize,
    permits: Arc<Semaphore>,
}

impl GlobalTransferBudget {
    pub fn new(max_total: usize) -> Self {
        let max_total = max_total.max(1);
        Self {
            max_total,
            permits: Arc::new(Semaphore::new(max_total)),
        }
    }

    pub fn max_total(&self) -> usize {
        self.max_total
    }

    /// Transfers currently holding a permit.
    pub fn in_use(&self) -> usize {
        self.max_total - self.permits.available_permits()
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for one transfer slot. The slot is released when the permit drops.
    /// None only if the budget was closed.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.permits).acquire_owned().await.ok()
    }
}
