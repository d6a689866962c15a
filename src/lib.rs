// src/lib.rs
pub mod api;
pub mod capture;
pub mod config;
pub mod core;
pub mod discovery;
pub mod monitoring;
pub mod registry;
pub mod relay;
pub mod scheduler;
pub mod testing;

// Re-export the main entry points
pub use capture::{CycleContext, FfmpegFetcher, FrameFetcher, LocalStore, run_cycle};
pub use core::{CaptureError, CaptureResult, Clock, ComponentLogger, LogContext, SystemClock};
pub use registry::{CredentialsProvider, MemoryRegistry, Source, SourceId, SourceRegistry, StaticCredentials};
pub use relay::{FtpRelay, Relay, RelayCredentials};
pub use scheduler::{CaptureScheduler, SchedulerConfig, SourceMode};
