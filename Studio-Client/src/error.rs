use thiserror::Error;

/// Errors returned by generation operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request or the server's response was malformed. Never retried.
    #[error("{0}")]
    Validation(String),

    /// The backend answered with a non-success HTTP status.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// The generation was cancelled before it could finish.
    #[error("Generation was cancelled")]
    Cancelled,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// True for the cancellation variant only.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }

    /// True for failures caused by the transport (status or network).
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Http { .. } | ClientError::Network { .. })
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            ClientError::Network { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ClientError>;
