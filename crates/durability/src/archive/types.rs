//! Archive core types
//!
//! Types for the character archive container (tar inside a zstd stream).

use std::collections::BTreeMap;

use keepsake_core::{LimitError, Limits, METADATA_ENTRY};
use serde::{Deserialize, Serialize};

/// Format tag written to the manifest `type` field
pub const ARCHIVE_FORMAT_TAG: &str = "character_archive";

/// Current archive format version
pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

/// File extension for archives
pub const ARCHIVE_EXTENSION: &str = ".charx";

/// Archive paths
pub mod paths {
    /// Directory that holds exported assets
    pub const ASSETS_DIR: &str = keepsake_core::ASSETS_DIR;
}

// =============================================================================
// manifest.json
// =============================================================================

/// Archive manifest, written as the last entry.
///
/// Field names are part of the on-disk format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveManifest {
    /// Format tag
    #[serde(rename = "type")]
    pub format_tag: String,

    /// Format version
    #[serde(rename = "ver")]
    pub version: u32,

    /// Name of the metadata entry
    #[serde(rename = "payloadEntryName", alias = "chatFile")]
    pub payload_entry_name: String,

    /// Directory holding asset entries
    #[serde(rename = "assetsDir")]
    pub assets_dir: String,

    /// Asset index keyed by asset id
    #[serde(default)]
    pub assets: BTreeMap<String, ManifestAsset>,

    /// xxh3 checksum of the payload entry
    #[serde(
        rename = "payloadChecksum",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub payload_checksum: Option<String>,
}

impl ArchiveManifest {
    /// Empty manifest for the current format.
    pub fn new() -> Self {
        ArchiveManifest {
            format_tag: ARCHIVE_FORMAT_TAG.to_string(),
            version: ARCHIVE_FORMAT_VERSION,
            payload_entry_name: METADATA_ENTRY.to_string(),
            assets_dir: paths::ASSETS_DIR.to_string(),
            assets: BTreeMap::new(),
            payload_checksum: None,
        }
    }

    /// Look up an asset by the entry name it was written under.
    pub fn asset_by_file(&self, file: &str) -> Option<(&str, &ManifestAsset)> {
        self.assets
            .iter()
            .find(|(_, asset)| asset.file == file)
            .map(|(id, asset)| (id.as_str(), asset))
    }
}

impl Default for ArchiveManifest {
    fn default() -> Self {
        Self::new()
    }
}

/// One asset in the manifest index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestAsset {
    /// Entry name inside the archive
    pub file: String,

    /// File extension without the dot
    pub ext: String,

    /// Asset kind ("icon", "emotion", "background", ...)
    #[serde(rename = "type")]
    pub kind: String,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Pixel width
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Pixel height
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

// =============================================================================
// Options
// =============================================================================

/// Options for writing and reading archives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Zstd compression level for the whole stream (default: 3)
    pub compression_level: i32,

    /// Flush compressed bytes to the sink after every entry (default: true)
    pub flush_each_entry: bool,

    /// Entry size cap, chunk size, name length
    pub limits: Limits,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            compression_level: 3,
            flush_each_entry: true,
            limits: Limits::default(),
        }
    }
}

impl ArchiveOptions {
    /// Fast compression and small limits for tests.
    pub fn for_testing() -> Self {
        Self {
            compression_level: 1,
            flush_each_entry: true,
            limits: Limits::with_small_limits(),
        }
    }

    /// Set compression level (builder pattern).
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Set limits (builder pattern).
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set per-entry flushing (builder pattern).
    pub fn with_flush_each_entry(mut self, flush: bool) -> Self {
        self.flush_each_entry = flush;
        self
    }

    /// Validate options.
    pub fn validate(&self) -> Result<(), ArchiveOptionsError> {
        let range = zstd::compression_level_range();
        if !range.contains(&self.compression_level) {
            return Err(ArchiveOptionsError::CompressionLevel {
                level: self.compression_level,
                min: *range.start(),
                max: *range.end(),
            });
        }
        self.limits.validate()?;
        Ok(())
    }
}

/// Archive option errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArchiveOptionsError {
    /// Level outside what zstd accepts
    #[error("Compression level {level} outside {min}..={max}")]
    CompressionLevel {
        /// Requested level
        level: i32,
        /// Lowest accepted level
        min: i32,
        /// Highest accepted level
        max: i32,
    },

    /// Invalid limits
    #[error(transparent)]
    Limits(#[from] LimitError),
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Compute xxh3 hash of data and return as hex string
pub fn xxh3_hex(data: &[u8]) -> String {
    use xxhash_rust::xxh3::xxh3_64;
    format!("{:016x}", xxh3_64(data))
}
