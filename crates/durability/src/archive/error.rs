//! Archive error types

use std::io;

use keepsake_core::{LimitError, StoreError};
use thiserror::Error;

use super::types::ArchiveOptionsError;
use crate::pipeline::PipelineError;

/// Errors raised while writing or decoding an archive.
///
/// Everything here is structural: the container is unusable for the
/// current attempt. Per-asset failures are reported through the pipeline.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The writer or decoder failed earlier and must not be reused
    #[error("Archive codec is poisoned by an earlier failure")]
    Poisoned,

    /// Input ended before the container was complete
    #[error("Truncated archive: {0}")]
    Truncated(String),

    /// Malformed tar structure
    #[error("Archive error: {0}")]
    Archive(String),

    /// Compression/decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Invalid writer or reader options
    #[error("Invalid archive options: {0}")]
    Options(#[from] ArchiveOptionsError),

    /// Manifest declares a version this build cannot read
    #[error("Unsupported archive version: {version}")]
    UnsupportedVersion {
        /// The unsupported version number
        version: u32,
    },

    /// Payload entry does not match the manifest checksum
    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Entry that failed verification
        file: String,
        /// Checksum recorded in the manifest
        expected: String,
        /// Checksum of the decoded bytes
        actual: String,
    },

    /// Limits rejected the configuration or an entry
    #[error(transparent)]
    Limit(#[from] LimitError),

    /// Asset store failure while exporting
    #[error("Asset store error: {0}")]
    Store(#[from] StoreError),

    /// Asset pipeline could not accept work
    #[error("Asset pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArchiveError {
    /// Create an archive (tar structure) error
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a compression error
    pub fn compression(msg: impl Into<String>) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a truncation error
    pub fn truncated(msg: impl Into<String>) -> Self {
        Self::Truncated(msg.into())
    }
}

/// Result type for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;
