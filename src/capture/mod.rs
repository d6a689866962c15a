// src/capture/mod.rs

use chrono::NaiveDateTime;

use crate::core::CaptureResult;
use crate::registry::SourceId;

/// Pulls exactly one encoded frame from a source address.
pub trait FrameFetcher: Send + Sync {
    fn fetch(&self, address: &str) -> CaptureResult<Vec<u8>>;
}

/// A frame between fetch and store/upload. Not kept afterwards.
#[derive(Debug, Clone)]
pub struct FrameArtifact {
    pub source_id: SourceId,
    pub captured_at: NaiveDateTime,
    pub bytes: Vec<u8>,
}

pub mod cycle;
pub mod fetcher_ffmpeg;
pub mod namer;
pub mod retention;
pub mod store_fs;

pub use cycle::{CycleContext, CycleReport, RelayOutcome, run_cycle};
pub use fetcher_ffmpeg::FfmpegFetcher;
pub use namer::{ArtifactName, FRAME_EXTENSION};
pub use retention::DateTreeRetention;
pub use store_fs::LocalStore;
