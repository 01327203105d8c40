use sgsync_sources::RemoteError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("local write failed: {0}")]
    Write(String),

    #[error("local read failed: {0}")]
    Read(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The part a remote plays in a sync. Merge flags, cursors and revocation
/// are keyed by this, not by a client's display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Cloud,
    Trakt,
    Metadata,
}

impl ServiceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKind::Cloud => "cloud",
            ServiceKind::Trakt => "trakt",
            ServiceKind::Metadata => "metadata",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a sync stage can fail with. Every remote and storage failure is
/// converted to one of these at the component boundary.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    #[error("network unavailable")]
    NetworkUnavailable,

    #[error("{service}: credentials rejected, sign in again")]
    Unauthorized { service: ServiceKind },

    #[error("{service}: {message}")]
    RemoteApi {
        service: ServiceKind,
        message: String,
        timeout: bool,
    },

    #[error(transparent)]
    LocalWrite(#[from] StoreError),

    #[error("malformed remote data: {0}")]
    MalformedRemoteData(String),

    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn from_remote(service: ServiceKind, error: RemoteError) -> Self {
        match error {
            RemoteError::NetworkUnavailable => SyncError::NetworkUnavailable,
            RemoteError::Unauthorized => SyncError::Unauthorized { service },
            RemoteError::Malformed(message) => SyncError::MalformedRemoteData(format!("{}: {}", service, message)),
            RemoteError::Api { .. } => SyncError::RemoteApi {
                service,
                message: error.to_string(),
                timeout: false,
            },
            RemoteError::Transport { ref message, timeout } => SyncError::RemoteApi {
                service,
                message: message.clone(),
                timeout,
            },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SyncError::RemoteApi { timeout: true, .. })
    }

    /// The service whose credentials were rejected, if that is what happened.
    pub fn unauthorized_service(&self) -> Option<ServiceKind> {
        match self {
            SyncError::Unauthorized { service } => Some(*service),
            _ => None,
        }
    }

    /// Network loss and cancellation stop the run instead of just the stage.
    pub fn stops_run(&self) -> bool {
        matches!(self, SyncError::NetworkUnavailable | SyncError::Cancelled)
    }
}
