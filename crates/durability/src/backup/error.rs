//! Backup error types

use std::io;

use keepsake_core::{StateCodecError, StoreError};
use thiserror::Error;

/// Errors from writing, decoding or restoring chunked backups.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Input ended inside a record
    #[error("Truncated backup: {pending_bytes} byte(s) of an incomplete record")]
    Truncated {
        /// Bytes buffered for the unfinished record
        pending_bytes: usize,
    },

    /// A name or payload does not fit a u32 length prefix
    #[error("Record {name} too large: {size} bytes")]
    RecordTooLarge {
        /// Record name (possibly truncated for display)
        name: String,
        /// Offending length
        size: u64,
    },

    /// Record names must be non-empty
    #[error("Record name is empty")]
    EmptyName,

    /// Asset records cannot use the state record name
    #[error("Record name {0} is reserved for the state record")]
    ReservedName(String),

    /// The backup carries no state record
    #[error("Backup has no state record")]
    MissingState,

    /// The backup carries more than one state record
    #[error("Backup has more than one state record")]
    DuplicateState,

    /// The state record did not decode
    #[error("State record failed to decode: {0}")]
    StateDecode(#[from] StateCodecError),

    /// Asset store failure while exporting
    #[error("Asset store error: {0}")]
    Store(#[from] StoreError),

    /// The writer failed earlier and must not be reused
    #[error("Backup writer is poisoned by an earlier failure")]
    Poisoned,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for backup operations
pub type BackupResult<T> = Result<T, BackupError>;
