// src/relay/uploader.rs
use std::time::Duration;

use crate::core::{CaptureError, CaptureResult};
use crate::relay::ftp::{FtpError, FtpSession};
use crate::relay::{Relay, RelayCredentials};

/// One FTP session per artifact; nothing is pooled or retried.
pub struct FtpRelay {
    timeout: Duration,
}

impl FtpRelay {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Relay for FtpRelay {
    fn upload(
        &self,
        segments: &[String],
        filename: &str,
        bytes: &[u8],
        credentials: &RelayCredentials,
    ) -> CaptureResult<()> {
        let address = credentials.address.as_str();

        let mut session =
            FtpSession::connect(address, self.timeout).map_err(|e| classify(address, e))?;

        let result = transfer(&mut session, segments, filename, bytes, credentials);
        session.close();

        result.map_err(|e| classify(address, e))?;
        log::debug!(
            "[relay] stored {}/{} on {} ({} bytes)",
            segments.join("/"),
            filename,
            address,
            bytes.len()
        );
        Ok(())
    }
}

fn transfer(
    session: &mut FtpSession,
    segments: &[String],
    filename: &str,
    bytes: &[u8],
    credentials: &RelayCredentials,
) -> Result<(), FtpError> {
    session.login(&credentials.user, &credentials.password)?;
    for segment in segments {
        if session.ensure_dir(segment)? {
            log::info!("[relay] created remote directory {}", segment);
        }
    }
    session.store(filename, bytes)
}

fn classify(address: &str, err: FtpError) -> CaptureError {
    match err {
        FtpError::Login { .. } => CaptureError::RelayAuthFailure {
            address: address.to_string(),
            reason: err.to_string(),
        },
        other => CaptureError::RelayTransferFailure {
            address: address.to_string(),
            reason: other.to_string(),
        },
    }
}
