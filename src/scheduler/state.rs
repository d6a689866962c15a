// src/scheduler/state.rs
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::core::clock::epoch;
use crate::registry::SourceId;

/// Live run/pause toggle of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    Running,
    Paused,
}

impl SourceMode {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled { Self::Running } else { Self::Paused }
    }
}

/// Per-source bookkeeping owned by the scheduler.
#[derive(Debug, Clone)]
pub struct CycleState {
    pub mode: SourceMode,
    pub last_capture: DateTime<Local>,
    pub in_flight: bool,
    pub cycles: u64,
    pub failures: u64,
    pub relay_failures: u64,
    pub last_error: Option<String>,
}

impl CycleState {
    pub fn new(mode: SourceMode) -> Self {
        Self {
            mode,
            last_capture: epoch(),
            in_flight: false,
            cycles: 0,
            failures: 0,
            relay_failures: 0,
            last_error: None,
        }
    }

    pub fn never_captured(&self) -> bool {
        self.last_capture == epoch()
    }

    /// A wall clock that stepped backwards past the last capture counts as due,
    /// otherwise the source would stall until time caught up again.
    pub fn is_due(&self, now: DateTime<Local>, interval_secs: u64) -> bool {
        // compare whole seconds; sub-second dispatch jitter must not delay a cycle
        let elapsed = now.timestamp() - self.last_capture.timestamp();
        elapsed < 0 || elapsed as u64 >= interval_secs
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub id: SourceId,
    /// False when the registry no longer lists this id.
    pub registered: bool,
    pub name: String,
    pub address: String,
    pub interval_secs: u64,
    pub mode: SourceMode,
    pub in_flight: bool,
    pub last_capture: Option<String>,
    pub cycles: u64,
    pub failures: u64,
    pub relay_failures: u64,
    pub last_error: Option<String>,
}
