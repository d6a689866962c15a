// src/relay/mod.rs

use serde::{Deserialize, Serialize};

use crate::core::CaptureResult;

/// Login for the remote archive.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayCredentials {
    /// `host` or `host:port`
    pub address: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for RelayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayCredentials")
            .field("address", &self.address)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Pushes one artifact into `segments[0]/segments[1]/.../filename` on the archive,
/// creating missing directories on the way.
pub trait Relay: Send + Sync {
    fn upload(
        &self,
        segments: &[String],
        filename: &str,
        bytes: &[u8],
        credentials: &RelayCredentials,
    ) -> CaptureResult<()>;
}

pub mod ftp;
pub mod uploader;

pub use ftp::{FtpError, FtpSession};
pub use uploader::FtpRelay;
