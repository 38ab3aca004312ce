use thiserror::Error;

/// The primary error type for all operations in the `assetport` crate.
#[derive(Debug, Error)]
pub enum AssetError {
    /// The bundle parser rejected a file (malformed or unsupported).
    /// Recorded per file; a batch load keeps going.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Key derivation or the block cipher failed, or the key material is unusable.
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// A bitmap could not be produced for an image object.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A single conversion task failed inside the worker pool.
    #[error("Conversion task failed: {0}")]
    PoolTask(String),

    /// The archive writer hit a fatal fault.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// An I/O error, typically while reading input files from the CLI.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller supplied options that cannot be honoured (bad key length, iteration count, ...).
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// The background service task has shut down.
    #[error("Asset service is no longer running")]
    ServiceClosed,

    /// A wrapper for any other error that doesn't fit the specific variants.
    #[error("An unexpected error occurred: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl From<serde_json::Error> for AssetError {
    fn from(err: serde_json::Error) -> Self {
        AssetError::InvalidOptions(err.to_string())
    }
}

impl From<image::ImageError> for AssetError {
    fn from(err: image::ImageError) -> Self {
        AssetError::PoolTask(err.to_string())
    }
}

pub type Result<T, E = AssetError> = std::result::Result<T, E>;
