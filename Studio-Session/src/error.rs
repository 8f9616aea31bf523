use studio_client::ClientError;
use thiserror::Error;

/// Errors raised by a [`KeyValueStore`](crate::storage::KeyValueStore).
#[derive(Error, Debug)]
pub enum StorageError {
    /// The write would push the store past its byte quota.
    #[error("Storage quota exceeded writing '{key}': {requested} bytes requested, quota is {quota}")]
    QuotaExceeded {
        key: String,
        requested: usize,
        quota: usize,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// True when the failure is a capacity problem that freeing space could fix.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

impl From<anyhow::Error> for StorageError {
    fn from(err: anyhow::Error) -> Self {
        StorageError::Backend(format!("{:#}", err))
    }
}

/// Errors raised by an [`ImageCodec`](crate::codec::ImageCodec).
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Not a base64 data URL")]
    InvalidDataUrl,

    /// Uploads must be PNG or JPEG.
    #[error("Please upload a PNG or JPG image.")]
    InvalidFormat { mime: String },

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// Even the lowest quality setting did not fit.
    #[error("Image is too large. Could not compress below {max_bytes} bytes")]
    TooLarge { max_bytes: usize },

    #[error("Compression task failed: {0}")]
    Task(String),
}

/// Top-level error for assembling a studio from configuration.
#[derive(Error, Debug)]
pub enum StudioError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, StudioError>;
