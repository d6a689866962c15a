use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::capture::FrameFetcher;
use crate::core::lock::lock_mutex;
use crate::core::{CaptureError, CaptureResult};
use crate::relay::{Relay, RelayCredentials};

/// Smallest byte sequence that passes as a JPEG (SOI ... EOI).
pub const FAKE_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9];

/// Fetcher with scripted failures and per-address concurrency tracking.
pub struct MockFetcher {
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<String>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            failing: Mutex::new(HashSet::new()),
            delay: Mutex::new(Duration::ZERO),
            in_flight: Mutex::new(HashMap::new()),
            max_in_flight: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_address(&self, address: &str) {
        lock_mutex(&self.failing, "mock_fetcher.fail").insert(address.to_string());
    }

    pub fn heal_address(&self, address: &str) {
        lock_mutex(&self.failing, "mock_fetcher.heal").remove(address);
    }

    /// Every fetch sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        *lock_mutex(&self.delay, "mock_fetcher.delay") = delay;
    }

    pub fn calls(&self) -> Vec<String> {
        lock_mutex(&self.calls, "mock_fetcher.calls").clone()
    }

    pub fn call_count(&self, address: &str) -> usize {
        self.calls().iter().filter(|a| a.as_str() == address).count()
    }

    /// Highest number of concurrent fetches ever observed for `address`.
    pub fn max_in_flight(&self, address: &str) -> usize {
        lock_mutex(&self.max_in_flight, "mock_fetcher.max")
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    fn enter(&self, address: &str) {
        let mut in_flight = lock_mutex(&self.in_flight, "mock_fetcher.enter");
        let current = in_flight.entry(address.to_string()).or_insert(0);
        *current += 1;
        let mut max = lock_mutex(&self.max_in_flight, "mock_fetcher.enter.max");
        let high = max.entry(address.to_string()).or_insert(0);
        *high = (*high).max(*current);
    }

    fn leave(&self, address: &str) {
        let mut in_flight = lock_mutex(&self.in_flight, "mock_fetcher.leave");
        if let Some(current) = in_flight.get_mut(address) {
            *current = current.saturating_sub(1);
        }
    }
}

impl FrameFetcher for MockFetcher {
    fn fetch(&self, address: &str) -> CaptureResult<Vec<u8>> {
        lock_mutex(&self.calls, "mock_fetcher.record").push(address.to_string());
        self.enter(address);

        let delay = *lock_mutex(&self.delay, "mock_fetcher.fetch.delay");
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let failing = lock_mutex(&self.failing, "mock_fetcher.fetch").contains(address);

        self.leave(address);

        if failing {
            Err(CaptureError::unreachable(address, "mock: stream refused"))
        } else {
            Ok(FAKE_JPEG.to_vec())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub address: String,
    pub segments: Vec<String>,
    pub filename: String,
    pub size: usize,
}

/// Relay that records uploads instead of sending them.
#[derive(Default)]
pub struct MockRelay {
    uploads: Mutex<Vec<RecordedUpload>>,
    failing: AtomicBool,
}

impl MockRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        lock_mutex(&self.uploads, "mock_relay.uploads").clone()
    }
}

impl Relay for MockRelay {
    fn upload(
        &self,
        segments: &[String],
        filename: &str,
        bytes: &[u8],
        credentials: &RelayCredentials,
    ) -> CaptureResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CaptureError::RelayTransferFailure {
                address: credentials.address.clone(),
                reason: "mock: archive offline".into(),
            });
        }
        lock_mutex(&self.uploads, "mock_relay.record").push(RecordedUpload {
            address: credentials.address.clone(),
            segments: segments.to_vec(),
            filename: filename.to_string(),
            size: bytes.len(),
        });
        Ok(())
    }
}
