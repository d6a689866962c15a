use std::error::Error as StdError;
use thiserror::Error;

use crate::registry::SourceId;

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Everything that can go wrong inside one capture cycle.
///
/// None of these are fatal: the scheduler logs them, counts them against the
/// source and tries again after the next full interval.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("source {address} unreachable: {reason}")]
    SourceUnreachable { address: String, reason: String },
    #[error("local write to {path} failed: {source}")]
    LocalWriteFailure {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("relay login to {address} rejected: {reason}")]
    RelayAuthFailure { address: String, reason: String },
    #[error("relay transfer to {address} failed: {reason}")]
    RelayTransferFailure { address: String, reason: String },
    #[error("source {source_id}: {what} not configured")]
    ConfigurationMissing { source_id: SourceId, what: String },
}

impl CaptureError {
    pub fn unreachable(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnreachable {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn local_write(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::LocalWriteFailure {
            path: path.into(),
            source,
        }
    }

    /// Relay failures are tracked separately from fetch/store failures.
    pub fn is_relay(&self) -> bool {
        matches!(
            self,
            Self::RelayAuthFailure { .. } | Self::RelayTransferFailure { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{message}")]
    Message { message: String },
    #[error("duplicate source id {id}")]
    DuplicateSource { id: SourceId },
    #[error("relay {field} must not be empty")]
    MissingRelayField { field: &'static str },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl ConfigError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
