use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Error type for frame differencing and mask computation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DifferenceError {
    /// Background and candidate dimensions do not match
    ///
    /// Returned before any pixel is touched, so no partial mask exists.
    #[error("Frame dimensions do not match: expected {expected:?}, actual {actual:?}")]
    DimensionMismatch {
        /// Background dimensions (width, height)
        expected: (u32, u32),
        /// Candidate dimensions (width, height)
        actual: (u32, u32),
    },

    /// Blur radius or noise threshold is negative or not finite
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Error type for compositing a candidate through a mask
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositeError {
    /// Candidate and mask dimensions do not match
    #[error("Candidate and mask dimensions do not match: expected {expected:?}, actual {actual:?}")]
    DimensionMismatch {
        /// Candidate dimensions (width, height)
        expected: (u32, u32),
        /// Mask dimensions (width, height)
        actual: (u32, u32),
    },
}

/// Error type for sprite serialization
#[derive(Debug, Error)]
pub enum EncodeError {
    /// An encoder knob is outside the range the target format accepts
    #[error("Invalid {format} setting `{key}`: {value} (accepted {accepted})")]
    InvalidSetting {
        format: &'static str,
        key: &'static str,
        value: i64,
        accepted: &'static str,
    },

    /// The underlying encoder rejected the image or configuration
    #[error("{format} encoder failed: {reason}")]
    Encoder { format: String, reason: String },
}

/// Error type for loading, migrating and validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The record was written by a newer release
    #[error("Unsupported config version {found} (this build understands up to {supported})")]
    UnsupportedVersion { found: u64, supported: u64 },

    /// A setting fails to parse or lies outside its accepted domain
    #[error("Invalid setting `{key}`: {reason}")]
    InvalidSetting { key: &'static str, reason: String },
}

/// Failure of a single (background, candidate) item in a batch
#[derive(Debug, Error)]
pub enum ItemError {
    /// Background or candidate could not be opened or decoded
    ///
    /// The source is shared because one unreadable background fails every
    /// item of its batch.
    #[error("Cannot read {}: {source}", path.display())]
    UnreadableInput {
        path: PathBuf,
        #[source]
        source: Arc<image::ImageError>,
    },

    /// Dimension mismatch or rejected mask parameters
    #[error(transparent)]
    Difference(#[from] DifferenceError),

    #[error(transparent)]
    Composite(#[from] CompositeError),

    #[error(transparent)]
    EncodeFailure(#[from] EncodeError),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error that prevents a batch from starting at all
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Failed to create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
