//! Size limits for container entries
//!
//! These limits are enforced by the archive decoder and writer. An entry
//! whose decoded size exceeds `max_entry_bytes` is never buffered: the
//! decoder records it as excluded and skips its bytes.
//!
//! ## Contract
//!
//! The default limits are part of the import contract: an archive that
//! imports on one client must import the same way on another.

use thiserror::Error;

/// Hard cap on a single buffered entry (50 MiB).
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Fixed boundary used to slice in-memory sources into decoder chunks (1 MiB).
pub const DEFAULT_CHUNK_BYTES: usize = 1024 * 1024;

/// Maximum sanitized entry name length in bytes.
pub const DEFAULT_MAX_NAME_BYTES: usize = 200;

/// Size limits for container entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum decoded entry size in bytes (default: 50 MiB)
    pub max_entry_bytes: u64,

    /// Chunk size used when feeding buffered sources to a decoder (default: 1 MiB)
    pub chunk_bytes: usize,

    /// Maximum sanitized entry name length (default: 200 bytes)
    pub max_name_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            max_name_bytes: DEFAULT_MAX_NAME_BYTES,
        }
    }
}

impl Limits {
    /// Create limits with small values for testing
    ///
    /// Lets unit tests exercise the size cap and chunking without
    /// allocating tens of megabytes.
    pub fn with_small_limits() -> Self {
        Limits {
            max_entry_bytes: 4 * 1024,
            chunk_bytes: 64,
            max_name_bytes: 64,
        }
    }

    /// Whether an entry of `size` decoded bytes may be buffered.
    pub fn admits(&self, size: u64) -> bool {
        size <= self.max_entry_bytes
    }

    /// Validate an entry size, returning a `LimitError` when over the cap.
    pub fn validate_entry_size(&self, name: &str, size: u64) -> Result<(), LimitError> {
        if !self.admits(size) {
            return Err(LimitError::EntryTooLarge {
                name: name.to_string(),
                actual: size,
                max: self.max_entry_bytes,
            });
        }
        Ok(())
    }

    /// Validate the limits themselves.
    pub fn validate(&self) -> Result<(), LimitError> {
        if self.chunk_bytes == 0 {
            return Err(LimitError::Invalid("chunk_bytes must be non-zero".into()));
        }
        // Room for a de-duplication suffix plus a short extension.
        if self.max_name_bytes < 16 {
            return Err(LimitError::Invalid(
                "max_name_bytes must be at least 16".into(),
            ));
        }
        Ok(())
    }
}

/// Limit violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    /// Entry exceeds the buffered size cap
    #[error("Entry '{name}' is {actual} bytes, exceeds maximum {max}")]
    EntryTooLarge {
        /// Entry name
        name: String,
        /// Decoded size
        actual: u64,
        /// Configured cap
        max: u64,
    },

    /// Limits are not usable
    #[error("Invalid limits: {0}")]
    Invalid(String),
}
