//! Error types for afw

use thiserror::Error;

/// afw error type
///
/// Variants are split by blast radius: chunk-local errors are recorded and the
/// chunk is skipped, everything else aborts the run. See [`Error::is_chunk_local`].
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error (configuration, composition, metadata)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A stage or fill rejected the data of one chunk
    #[error("Data error: {0}")]
    Data(String),

    /// Two accumulators with incompatible axes were merged
    #[error("Schema mismatch in '{spec}': {detail}")]
    SchemaMismatch {
        /// Histogram spec name.
        spec: String,
        /// What differed.
        detail: String,
    },

    /// Reading or writing one chunk failed
    #[error("Storage error at {location}: {message}")]
    Storage {
        /// Path or storage root involved.
        location: String,
        /// Underlying failure.
        message: String,
    },

    /// Shared storage is unavailable as a whole
    #[error("Storage outage at {location}: {message}")]
    StorageOutage {
        /// Storage root.
        location: String,
        /// Underlying failure.
        message: String,
    },

    /// A delta skim could not be rebuilt against its baseline
    #[error("Reconstruction error for skim '{skim}': {detail}")]
    Reconstruction {
        /// Skim identity (path of the delta file or dataset name).
        skim: String,
        /// What went wrong.
        detail: String,
    },
}

impl Error {
    /// Whether the error is confined to one chunk.
    ///
    /// Chunk-local errors mark the owning dataset partial; all other variants
    /// abort the run.
    pub fn is_chunk_local(&self) -> bool {
        matches!(self, Error::Data(_) | Error::Storage { .. } | Error::Io(_))
    }

    /// Whether retrying the same chunk may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage { .. } | Error::Io(_))
    }

    /// Shorthand for a storage error at `location`.
    pub fn storage(location: impl std::fmt::Display, message: impl std::fmt::Display) -> Self {
        Error::Storage { location: location.to_string(), message: message.to_string() }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
