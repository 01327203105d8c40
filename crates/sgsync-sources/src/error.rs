use thiserror::Error;

/// Failure outcomes every remote call can surface.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    /// No connectivity at all; nothing was sent.
    #[error("network unavailable")]
    NetworkUnavailable,

    /// Credentials were rejected or revoked.
    #[error("unauthorized")]
    Unauthorized,

    /// The remote answered with an error status, including rate limiting.
    #[error("remote API error (status {status:?}): {message}")]
    Api { status: Option<u16>, message: String },

    #[error("transport error: {message}")]
    Transport { message: String, timeout: bool },

    /// The remote answered, but the payload could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RemoteError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        RemoteError::Api {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        RemoteError::Transport {
            message: message.into(),
            timeout: true,
        }
    }

    /// Map a non-success HTTP status to the taxonomy.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            401 => RemoteError::Unauthorized,
            _ => RemoteError::api(status, body),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RemoteError::Transport { timeout: true, .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RemoteError::Api { status: Some(429), .. })
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            RemoteError::from_status(status.as_u16(), e.to_string())
        } else {
            RemoteError::Transport {
                message: e.to_string(),
                timeout: e.is_timeout(),
            }
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;
