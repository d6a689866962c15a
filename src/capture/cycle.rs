// src/capture/cycle.rs
use std::path::PathBuf;
use std::sync::Arc;

use crate::capture::namer::{self, ArtifactName};
use crate::capture::{FrameArtifact, FrameFetcher, LocalStore};
use crate::core::{CaptureError, CaptureResult, Clock};
use crate::registry::{CredentialsProvider, SourceId};
use crate::relay::Relay;

/// Collaborators one cycle needs. Shared by all workers.
pub struct CycleContext {
    pub fetcher: Arc<dyn FrameFetcher>,
    pub store: LocalStore,
    pub relay: Arc<dyn Relay>,
    pub credentials: Arc<dyn CredentialsProvider>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug)]
pub enum RelayOutcome {
    Uploaded,
    /// No credentials configured.
    Skipped,
    Failed(CaptureError),
}

#[derive(Debug)]
pub struct CycleReport {
    pub artifact: ArtifactName,
    pub local_path: PathBuf,
    pub relay: RelayOutcome,
}

/// Fetch → name → store → relay for one source.
///
/// Fetch and store errors end the cycle and drop the frame. A relay error is
/// reported in the returned [`CycleReport`] since the local copy already exists.
pub fn run_cycle(ctx: &CycleContext, source_id: SourceId, address: &str) -> CaptureResult<CycleReport> {
    if address.trim().is_empty() {
        return Err(CaptureError::ConfigurationMissing {
            source_id,
            what: "address".into(),
        });
    }

    let frame = FrameArtifact {
        source_id,
        bytes: ctx.fetcher.fetch(address)?,
        captured_at: ctx.clock.now().naive_local(),
    };

    let artifact = namer::name(frame.source_id, &frame.captured_at);
    let local_path = ctx.store.store(&artifact.local_path(), &frame.bytes)?;

    let relay = match ctx.credentials.relay_credentials() {
        None => RelayOutcome::Skipped,
        Some(credentials) => match ctx.relay.upload(
            &artifact.remote_segments,
            &artifact.filename,
            &frame.bytes,
            &credentials,
        ) {
            Ok(()) => RelayOutcome::Uploaded,
            Err(e) => RelayOutcome::Failed(e),
        },
    };

    Ok(CycleReport {
        artifact,
        local_path,
        relay,
    })
}
