//! Transfer unit: one URL → one file, with retries.
//!
//! Each attempt streams into a fresh `.part` file through an incremental
//! hasher. Transient failures are retried under the shared `RetryPolicy`;
//! permanent ones fail at once. Whatever happens, no partial file outlives a
//! failed attempt.

mod fetch;
mod sink;

pub use fetch::{validate_url, CurlFetcher, Fetcher};
pub use sink::{temp_path, Delivered, FileSink, TEMP_SUFFIX};

use std::path::PathBuf;
use std::time::Instant;

use crate::retry::{run_with_retry, RetryPolicy, TransferError};

/// One item to download.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub url: String,
    pub destination: PathBuf,
    pub expected_size: Option<u64>,
}

/// Result of a transfer unit after all attempts.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub success: bool,
    pub filepath: PathBuf,
    pub size: Option<u64>,
    pub checksum: Option<String>,
    pub error: Option<String>,
    pub attempts: u32,
}

/// Runs one transfer to completion (success or terminal failure). Blocking.
/// No retry starts after `deadline`; the item then fails with `timeout`.
pub fn transfer_item(
    fetcher: &dyn Fetcher,
    request: &TransferRequest,
    policy: &RetryPolicy,
    deadline: Option<Instant>,
) -> TransferOutcome {
    let outcome = run_with_retry(policy, deadline, |attempt| {
        tracing::debug!(url = %request.url, attempt, "transfer attempt");
        attempt_once(fetcher, request)
    });

    match outcome.result {
        Ok(delivered) => {
            tracing::info!(
                url = %request.url,
                size = delivered.size,
                attempts = outcome.attempts,
                "downloaded {}",
                delivered.filepath.display()
            );
            TransferOutcome {
                success: true,
                filepath: delivered.filepath,
                size: Some(delivered.size),
                checksum: Some(delivered.checksum),
                error: None,
                attempts: outcome.attempts,
            }
        }
        Err(e) => {
            tracing::warn!(url = %request.url, attempts = outcome.attempts, "transfer failed: {}", e);
            TransferOutcome {
                success: false,
                filepath: request.destination.clone(),
                size: None,
                checksum: None,
                error: Some(e.to_string()),
                attempts: outcome.attempts,
            }
        }
    }
}

fn attempt_once(fetcher: &dyn Fetcher, request: &TransferRequest) -> Result<Delivered, TransferError> {
    let mut sink = FileSink::create(&request.destination).map_err(TransferError::Storage)?;
    let received = match fetcher.fetch(&request.url, &mut sink) {
        Ok(n) => n,
        Err(e) => {
            sink.discard();
            return Err(e);
        }
    };
    if let Some(expected) = request.expected_size {
        if received != expected {
            sink.discard();
            return Err(TransferError::PartialTransfer { expected, received });
        }
    }
    sink.finish().map_err(TransferError::Storage)
}
