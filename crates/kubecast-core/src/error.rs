//! Error types for kubecast-core

use thiserror::Error;

use crate::hub::HubError;
use crate::normalize::NormalizeError;
use crate::source::SourceError;
use crate::watcher::WatchError;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Upstream source failure
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Watcher stopped
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Change could not be normalized
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// Hub refused the operation
    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the process should stop because of this error
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Source(e) => e.is_fatal(),
            Self::Watch(WatchError::Fatal(_)) => true,
            Self::Normalize(_) | Self::Hub(_) => false,
        }
    }
}
