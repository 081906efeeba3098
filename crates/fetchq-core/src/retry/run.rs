//! Retry loop: run an attempt closure until success or the policy says stop.

use std::time::Instant;

use super::classify::classify;
use super::error::TransferError;
use super::policy::{RetryDecision, RetryPolicy};

/// Final result of a retried operation and how many attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, TransferError>,
    pub attempts: u32,
}

/// Runs `f` (given the 1-based attempt number) until it succeeds or the retry
/// policy refuses another attempt. Sleeps the calling thread for the backoff;
/// call from a blocking context.
///
/// With a `deadline`, no attempt starts at or after it: a backoff that would
/// end past the deadline ends the loop with [`TransferError::DeadlinePassed`].
pub fn run_with_retry<T, F>(policy: &RetryPolicy, deadline: Option<Instant>, mut f: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Result<T, TransferError>,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt) {
            Ok(v) => {
                return RetryOutcome {
                    result: Ok(v),
                    attempts: attempt,
                }
            }
            Err(e) => {
                let kind = classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => {
                        return RetryOutcome {
                            result: Err(e),
                            attempts: attempt,
                        }
                    }
                    RetryDecision::RetryAfter(d) => {
                        if deadline.is_some_and(|at| Instant::now() + d >= at) {
                            tracing::debug!(attempt, ?kind, "no time left for another attempt after: {}", e);
                            return RetryOutcome {
                                result: Err(TransferError::DeadlinePassed),
                                attempts: attempt,
                            };
                        }
                        tracing::debug!(attempt, ?kind, delay_ms = d.as_millis() as u64, "retrying after: {}", e);
                        std::thread::sleep(d);
                        attempt += 1;
                    }
                }
            }
        }
    }
}
