#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use framelift::capture::{CycleContext, LocalStore};
use framelift::core::ManualClock;
use framelift::registry::{MemoryRegistry, Source, StaticCredentials};
use framelift::relay::{Relay, RelayCredentials};
use framelift::scheduler::{CaptureScheduler, SchedulerConfig};
use framelift::testing::mocks::{MockFetcher, MockRelay};

pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub scheduler: CaptureScheduler,
    pub registry: Arc<MemoryRegistry>,
    pub fetcher: Arc<MockFetcher>,
    pub relay: Arc<MockRelay>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(root: &Path, sources: Vec<Source>) -> Self {
        Self::build(root, sources, None, None)
    }

    pub fn with_credentials(root: &Path, sources: Vec<Source>, credentials: RelayCredentials) -> Self {
        Self::build(root, sources, None, Some(credentials))
    }

    /// Uses `relay` instead of the recording mock.
    pub fn with_relay(
        root: &Path,
        sources: Vec<Source>,
        relay: Arc<dyn Relay>,
        credentials: RelayCredentials,
    ) -> Self {
        Self::build(root, sources, Some(relay), Some(credentials))
    }

    fn build(
        root: &Path,
        sources: Vec<Source>,
        relay: Option<Arc<dyn Relay>>,
        credentials: Option<RelayCredentials>,
    ) -> Self {
        let registry = Arc::new(MemoryRegistry::with_sources(sources));
        let fetcher = Arc::new(MockFetcher::new());
        let mock_relay = Arc::new(MockRelay::new());
        let clock = Arc::new(ManualClock::at_local(2024, 5, 1, 0, 0, 0));

        let relay: Arc<dyn Relay> = match relay {
            Some(relay) => relay,
            None => mock_relay.clone(),
        };

        let ctx = CycleContext {
            fetcher: fetcher.clone(),
            store: LocalStore::new(root),
            relay,
            credentials: Arc::new(StaticCredentials::new(credentials)),
            clock: clock.clone(),
        };

        let scheduler = CaptureScheduler::new(
            registry.clone(),
            ctx,
            SchedulerConfig {
                tick_interval: Duration::from_millis(20),
                workers: 4,
            },
        )
        .expect("scheduler");

        Self {
            scheduler,
            registry,
            fetcher,
            relay: mock_relay,
            clock,
        }
    }

    /// One tick, then wait for everything it dispatched.
    pub fn step(&self) -> Vec<u32> {
        let dispatched = self.scheduler.tick();
        assert!(self.scheduler.wait_idle(IDLE_TIMEOUT), "cycles did not finish");
        dispatched
    }

    pub fn advance(&self, secs: i64) {
        self.clock.advance_secs(secs);
    }
}

pub fn source(id: u32, address: &str, interval_secs: u64) -> Source {
    Source::new(id, address, interval_secs).enabled(true)
}
