//! Test doubles shared by unit tests: a scripted fetcher that never touches the network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::job_store::Lease;
use crate::retry::TransferError;
use crate::transfer::{FileSink, Fetcher};

/// Lease for tests that claim jobs directly; never lapses within a test.
pub(crate) fn lease() -> Lease {
    Lease::new("test-worker", Duration::from_secs(60))
}

/// One scripted response. Steps for a URL are consumed in order; the last one repeats.
#[derive(Debug, Clone)]
pub(crate) enum FetchStep {
    Body(Vec<u8>),
    SlowBody(Duration, Vec<u8>),
    Status(u32),
}

#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<FetchStep>>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(self, url: &str, steps: Vec<FetchStep>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), steps.into_iter().collect());
        self
    }

    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    /// URLs in the order their first attempt started.
    pub(crate) fn first_call_order(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for u in self.calls.lock().unwrap().iter() {
            if !seen.contains(u) {
                seen.push(u.clone());
            }
        }
        seen
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, url: &str) -> FetchStep {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap_or(FetchStep::Status(404)),
            Some(steps) => steps.front().cloned().unwrap_or(FetchStep::Status(404)),
            None => FetchStep::Status(404),
        }
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, url: &str, sink: &mut FileSink) -> Result<u64, TransferError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = match self.next_step(url) {
            FetchStep::Body(body) => sink
                .write_chunk(&body)
                .map(|()| body.len() as u64)
                .map_err(TransferError::Storage),
            FetchStep::SlowBody(delay, body) => {
                std::thread::sleep(delay);
                sink.write_chunk(&body)
                    .map(|()| body.len() as u64)
                    .map_err(TransferError::Storage)
            }
            FetchStep::Status(code) => Err(TransferError::Http(code)),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
