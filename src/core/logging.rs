// src/core/logging.rs
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::clock::utc_ns_now;

// Global sequence number for correlating lines across threads
static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub instance_id: String,
    pub cycle: Option<u64>,
    pub sequence: u64,
    pub timestamp_ns: u64,
}

impl LogContext {
    pub fn new(component: &str, instance_id: &str) -> Self {
        Self {
            component: component.to_string(),
            instance_id: instance_id.to_string(),
            cycle: None,
            sequence: LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp_ns: utc_ns_now(),
        }
    }

    pub fn with_cycle(mut self, cycle: u64) -> Self {
        self.cycle = Some(cycle);
        self
    }

    pub fn format(&self, level: &str, message: &str) -> String {
        let cycle_info = match self.cycle {
            Some(cycle) => format!(" cycle={}", cycle),
            None => String::new(),
        };

        format!(
            "[{}][seq={:06}][{}:{}{}] {}",
            level, self.sequence, self.component, self.instance_id, cycle_info, message
        )
    }
}

/// Uniform per-component logging on top of the `log` facade.
pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    fn debug(&self, message: &str) {
        let ctx = self.log_context();
        log::debug!("{}", ctx.format("DEBUG", message));
    }

    fn info(&self, message: &str) {
        let ctx = self.log_context();
        log::info!("{}", ctx.format("INFO", message));
    }

    fn warn(&self, message: &str) {
        let ctx = self.log_context();
        log::warn!("{}", ctx.format("WARN", message));
    }

    fn error(&self, message: &str) {
        let ctx = self.log_context();
        log::error!("{}", ctx.format("ERROR", message));
    }
}
