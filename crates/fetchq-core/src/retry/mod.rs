//! Retry and backoff policy for transfer units.
//!
//! Classifies attempt failures (timeouts, throttling, connection failures,
//! 5xx) as transient or permanent and computes exponential backoff with
//! jitter, so every transfer shares one policy instead of ad-hoc loops.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::TransferError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, RetryOutcome};
