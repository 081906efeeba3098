//! Error for one transfer attempt, kept typed so it can be classified before
//! it is flattened into the item's error string.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Curl reported an error (timeout, connection, DNS, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// HTTP response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// URL did not parse or uses a scheme other than http/https. Not retried.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// Body length differed from the expected size (e.g. server closed early).
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// Disk write failed (disk full, permission denied). Not retried.
    #[error("storage: {0}")]
    Storage(#[source] std::io::Error),
    /// The job's deadline fell before the next attempt could start. Not retried.
    #[error("timeout")]
    DeadlinePassed,
}
