// src/scheduler/mod.rs
pub mod pool;
pub mod scheduler;
pub mod state;

pub use pool::WorkerPool;
pub use scheduler::{CaptureScheduler, SchedulerConfig};
pub use state::{CycleState, SourceMode, SourceStatus};
