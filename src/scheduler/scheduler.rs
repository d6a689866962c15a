// src/scheduler/scheduler.rs
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Local, SubsecRound};
use crossbeam::channel::{self, Sender, select};

use crate::capture::{CycleContext, CycleReport, RelayOutcome, run_cycle};
use crate::core::lock::{lock_mutex, lock_rwlock_read, lock_rwlock_write};
use crate::core::{CaptureError, CaptureResult, ComponentLogger, LogContext};
use crate::registry::{Source, SourceId, SourceRegistry};
use crate::scheduler::pool::WorkerPool;
use crate::scheduler::state::{CycleState, SourceMode, SourceStatus};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            workers: 4,
        }
    }
}

type SharedState = Arc<Mutex<CycleState>>;

/// Counts dispatched-but-unfinished cycles.
#[derive(Default)]
struct Activity {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Activity {
    fn enter(&self) {
        *lock_mutex(&self.count, "activity.enter") += 1;
    }

    fn leave(&self) {
        let mut count = lock_mutex(&self.count, "activity.leave");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn current(&self) -> usize {
        *lock_mutex(&self.count, "activity.current")
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let guard = lock_mutex(&self.count, "activity.wait_idle");
        let (guard, _) = self
            .idle
            .wait_timeout_while(guard, timeout, |count| *count > 0)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard == 0
    }
}

enum ClaimOutcome {
    Captured,
    Skipped,
    Failed(String),
    RelayFailed(String),
}

/// Admission ticket for one cycle of one source. Dropping it, on any path,
/// stamps `last_capture` with the dispatch time and frees the source.
struct CycleClaim {
    source_id: SourceId,
    cycle: u64,
    dispatched_at: DateTime<Local>,
    state: SharedState,
    activity: Arc<Activity>,
    outcome: Option<ClaimOutcome>,
}

impl CycleClaim {
    fn record(&mut self, result: CaptureResult<CycleReport>) {
        let outcome = match result {
            Ok(report) => {
                let stored = report.local_path.display().to_string();
                match report.relay {
                    RelayOutcome::Uploaded => {
                        self.info(&format!("stored {} and relayed {}", stored, report.artifact.remote_path()));
                        ClaimOutcome::Captured
                    }
                    RelayOutcome::Skipped => {
                        self.info(&format!("stored {} (relay not configured)", stored));
                        ClaimOutcome::Captured
                    }
                    RelayOutcome::Failed(e) => {
                        self.warn(&format!("stored {} but relay failed: {}", stored, e));
                        ClaimOutcome::RelayFailed(e.to_string())
                    }
                }
            }
            Err(CaptureError::ConfigurationMissing { what, .. }) => {
                self.debug(&format!("skipped: {} not configured", what));
                ClaimOutcome::Skipped
            }
            Err(e) if e.is_relay() => {
                self.warn(&format!("relay failed: {}", e));
                ClaimOutcome::RelayFailed(e.to_string())
            }
            Err(e) => {
                self.warn(&format!("cycle failed: {}", e));
                ClaimOutcome::Failed(e.to_string())
            }
        };
        self.outcome = Some(outcome);
    }
}

impl ComponentLogger for CycleClaim {
    fn log_context(&self) -> LogContext {
        LogContext::new("cycle", &self.source_id.to_string()).with_cycle(self.cycle)
    }
}

impl Drop for CycleClaim {
    fn drop(&mut self) {
        {
            let mut st = lock_mutex(&self.state, "claim.release");
            st.last_capture = self.dispatched_at;
            st.in_flight = false;
            st.cycles += 1;
            match self.outcome.take() {
                Some(ClaimOutcome::Captured) => st.last_error = None,
                Some(ClaimOutcome::Skipped) => {}
                Some(ClaimOutcome::Failed(e)) => {
                    st.failures += 1;
                    st.last_error = Some(e);
                }
                Some(ClaimOutcome::RelayFailed(e)) => {
                    st.relay_failures += 1;
                    st.last_error = Some(e);
                }
                None => {
                    st.failures += 1;
                    st.last_error = Some("cycle aborted before completion".into());
                }
            }
        }
        self.activity.leave();
    }
}

struct SchedulerInner {
    registry: Arc<dyn SourceRegistry>,
    ctx: Arc<CycleContext>,
    states: RwLock<BTreeMap<SourceId, SharedState>>,
    pool: WorkerPool,
    activity: Arc<Activity>,
    ticks: AtomicU64,
    /// Mode for ids first seen after `enable_all`/`disable_all`.
    blanket_mode: Mutex<Option<SourceMode>>,
}

impl SchedulerInner {
    fn tick(&self) -> Vec<SourceId> {
        // one registry read per tick; never re-read field by field
        let sources = self.registry.list_sources();
        // whole seconds, so tick jitter cannot push a source past its interval
        let now = self.ctx.clock.now().trunc_subsecs(0);
        self.ticks.fetch_add(1, Ordering::Relaxed);
        let blanket = *lock_mutex(&self.blanket_mode, "scheduler.tick.blanket");

        let mut dispatched = Vec::new();
        for source in sources {
            let initial = blanket.unwrap_or(SourceMode::from_enabled(source.enabled));
            let state = self.state_for(source.id, initial);
            if !source.has_address() {
                continue;
            }
            if let Some(claim) = self.try_claim(&source, state, now) {
                dispatched.push(source.id);
                self.dispatch(source, claim);
            }
        }
        dispatched
    }

    fn state_for(&self, id: SourceId, initial: SourceMode) -> SharedState {
        if let Some(state) = lock_rwlock_read(&self.states, "scheduler.state_for").get(&id) {
            return state.clone();
        }
        lock_rwlock_write(&self.states, "scheduler.state_for.insert")
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(CycleState::new(initial))))
            .clone()
    }

    /// Due-check and claim under the source's own lock.
    fn try_claim(&self, source: &Source, state: SharedState, now: DateTime<Local>) -> Option<CycleClaim> {
        let cycle = {
            let mut st = lock_mutex(&state, "scheduler.try_claim");
            if st.mode != SourceMode::Running
                || st.in_flight
                || !st.is_due(now, source.effective_interval_secs())
            {
                return None;
            }
            st.in_flight = true;
            st.cycles + 1
        };

        self.activity.enter();
        Some(CycleClaim {
            source_id: source.id,
            cycle,
            dispatched_at: now,
            state,
            activity: self.activity.clone(),
            outcome: None,
        })
    }

    fn dispatch(&self, source: Source, mut claim: CycleClaim) {
        let ctx = self.ctx.clone();
        let id = source.id;
        let job = Box::new(move || {
            let result = run_cycle(&ctx, source.id, &source.address);
            claim.record(result);
        });

        if !self.pool.execute(job) {
            log::warn!("[scheduler] worker pool closed, source {} not dispatched", id);
        }
    }

    fn known_states(&self) -> Vec<(SourceId, SharedState)> {
        lock_rwlock_read(&self.states, "scheduler.known_states")
            .iter()
            .map(|(id, state)| (*id, state.clone()))
            .collect()
    }
}

struct LoopHandle {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// Decides when each source is due and hands due sources to the worker pool.
pub struct CaptureScheduler {
    inner: Arc<SchedulerInner>,
    tick_interval: Duration,
    control: Mutex<Option<LoopHandle>>,
}

impl CaptureScheduler {
    pub fn new(
        registry: Arc<dyn SourceRegistry>,
        ctx: CycleContext,
        config: SchedulerConfig,
    ) -> anyhow::Result<Self> {
        let pool = WorkerPool::new(config.workers, "capture-worker")
            .context("failed to spawn capture workers")?;

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                registry,
                ctx: Arc::new(ctx),
                states: RwLock::new(BTreeMap::new()),
                pool,
                activity: Arc::new(Activity::default()),
                ticks: AtomicU64::new(0),
                blanket_mode: Mutex::new(None),
            }),
            tick_interval: config.tick_interval,
            control: Mutex::new(None),
        })
    }

    /// Runs one scheduling pass and returns the ids that were dispatched.
    pub fn tick(&self) -> Vec<SourceId> {
        self.inner.tick()
    }

    pub fn ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::Relaxed)
    }

    pub fn enable(&self, id: SourceId) {
        self.set_mode(id, SourceMode::Running);
    }

    pub fn disable(&self, id: SourceId) {
        self.set_mode(id, SourceMode::Paused);
    }

    pub fn enable_all(&self) {
        self.set_all(SourceMode::Running);
    }

    pub fn disable_all(&self) {
        self.set_all(SourceMode::Paused);
    }

    fn set_mode(&self, id: SourceId, mode: SourceMode) {
        let state = self.inner.state_for(id, mode);
        lock_mutex(&state, "scheduler.set_mode").mode = mode;
        self.debug(&format!("source {} -> {:?}", id, mode));
    }

    fn set_all(&self, mode: SourceMode) {
        *lock_mutex(&self.inner.blanket_mode, "scheduler.set_all.blanket") = Some(mode);
        for source in self.inner.registry.list_sources() {
            self.inner.state_for(source.id, mode);
        }
        let states = self.inner.known_states();
        for (_, state) in &states {
            lock_mutex(state, "scheduler.set_all").mode = mode;
        }
        self.info(&format!("{} sources -> {:?}", states.len(), mode));
    }

    pub fn mode(&self, id: SourceId) -> Option<SourceMode> {
        let state = lock_rwlock_read(&self.inner.states, "scheduler.mode").get(&id).cloned()?;
        let mode = lock_mutex(&state, "scheduler.mode.read").mode;
        Some(mode)
    }

    /// Starts the background tick loop. Calling it while running is a no-op.
    pub fn start(&self) -> anyhow::Result<()> {
        let mut control = lock_mutex(&self.control, "scheduler.start");
        if control.is_some() {
            return Ok(());
        }

        let inner = self.inner.clone();
        let ticker = channel::tick(self.tick_interval);
        let (stop, stop_rx) = channel::bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("capture-scheduler".into())
            .spawn(move || {
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            let dispatched = inner.tick();
                            if !dispatched.is_empty() {
                                log::debug!("[scheduler] dispatched {:?}", dispatched);
                            }
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
            })
            .context("failed to spawn scheduler loop")?;

        *control = Some(LoopHandle { stop, thread });
        self.info(&format!("started (tick {}ms)", self.tick_interval.as_millis()));
        Ok(())
    }

    /// Stops issuing ticks. Cycles already dispatched keep running.
    pub fn stop(&self) {
        let Some(handle) = lock_mutex(&self.control, "scheduler.stop").take() else {
            return;
        };
        let _ = handle.stop.send(());
        if handle.thread.join().is_err() {
            self.error("scheduler loop panicked");
        }
        self.info("stopped");
    }

    pub fn is_running(&self) -> bool {
        lock_mutex(&self.control, "scheduler.is_running").is_some()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.activity.current()
    }

    /// Blocks until no cycle is in flight or `timeout` elapses. True when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.inner.activity.wait_idle(timeout)
    }

    /// Stops the loop and waits for all dispatched cycles to finish.
    pub fn shutdown(&self) {
        self.stop();
        self.inner.pool.shutdown();
    }

    pub fn status(&self) -> Vec<SourceStatus> {
        let sources: BTreeMap<SourceId, Source> = self
            .inner
            .registry
            .list_sources()
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        self.inner
            .known_states()
            .into_iter()
            .map(|(id, state)| {
                let st = lock_mutex(&state, "scheduler.status").clone();
                let source = sources.get(&id);
                SourceStatus {
                    id,
                    registered: source.is_some(),
                    name: source.map(|s| s.name.clone()).unwrap_or_default(),
                    address: source.map(|s| s.address.clone()).unwrap_or_default(),
                    interval_secs: source.map(|s| s.effective_interval_secs()).unwrap_or(0),
                    mode: st.mode,
                    in_flight: st.in_flight,
                    last_capture: (!st.never_captured()).then(|| st.last_capture.to_rfc3339()),
                    cycles: st.cycles,
                    failures: st.failures,
                    relay_failures: st.relay_failures,
                    last_error: st.last_error,
                }
            })
            .collect()
    }
}

impl ComponentLogger for CaptureScheduler {
    fn log_context(&self) -> LogContext {
        LogContext::new("scheduler", "main")
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
