//! Entry taxonomy for container formats
//!
//! Every named blob inside an archive is classified by its path:
//!
//! | Path                | Kind                 |
//! |---------------------|----------------------|
//! | `card.json`         | `Metadata`           |
//! | `module.*`          | `SecondaryMetadata`  |
//! | `manifest.json`     | `Manifest`           |
//! | `assets/...`        | `Asset`              |
//! | any other `*.json`  | `Auxiliary`          |
//! | anything else       | `Asset`              |
//!
//! The three reserved names only count at the archive root. Anything under
//! the assets directory is an asset whatever its name.
//!
//! `Excluded` is never produced by [`EntryKind::classify`]; the decoder
//! assigns it to entries that exceed the size cap.

use serde::{Deserialize, Serialize};

/// Name of the primary metadata entry.
pub const METADATA_ENTRY: &str = "card.json";

/// Name of the manifest entry, always written last.
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Stem shared by every secondary metadata entry (`module.<ext>`).
pub const SECONDARY_METADATA_STEM: &str = "module";

/// Top-level directory holding exported assets.
pub const ASSETS_DIR: &str = "assets";

/// Kind of an entry inside a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Primary structured metadata (character card)
    Metadata,
    /// Secondary metadata blob (module)
    SecondaryMetadata,
    /// Archive manifest
    Manifest,
    /// Other JSON documents, kept in memory but never persisted as assets
    Auxiliary,
    /// Binary media asset
    Asset,
    /// Entry over the size cap, recorded by name and dropped
    Excluded,
}

impl EntryKind {
    /// Classify an entry by its archive path.
    ///
    /// Matching is case-insensitive.
    pub fn classify(name: &str) -> EntryKind {
        let path = name.to_ascii_lowercase();
        let mut parts = path.split(['/', '\\']).filter(|p| !p.is_empty());
        let first = parts.next().unwrap_or("");
        let nested = parts.next().is_some();

        if nested {
            if first == ASSETS_DIR {
                return EntryKind::Asset;
            }
        } else {
            if first == METADATA_ENTRY {
                return EntryKind::Metadata;
            }
            if first == MANIFEST_ENTRY {
                return EntryKind::Manifest;
            }
            if let Some((stem, _)) = first.split_once('.') {
                if stem == SECONDARY_METADATA_STEM {
                    return EntryKind::SecondaryMetadata;
                }
            }
        }
        if path.ends_with(".json") {
            return EntryKind::Auxiliary;
        }
        EntryKind::Asset
    }

    /// Whether entries of this kind are buffered in memory by the decoder.
    pub fn is_buffered(&self) -> bool {
        matches!(
            self,
            EntryKind::Metadata
                | EntryKind::SecondaryMetadata
                | EntryKind::Manifest
                | EntryKind::Auxiliary
        )
    }
}

/// One named blob inside a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Archive path
    pub name: String,
    /// Kind derived from the name
    pub kind: EntryKind,
    /// Owned entry bytes
    pub bytes: Vec<u8>,
}

impl Entry {
    /// Create an entry, deriving its kind from `name`.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let kind = EntryKind::classify(&name);
        Entry { name, kind, bytes }
    }

    /// Decoded size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the entry carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Final path component of an archive path (`/` or `\` separated).
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Lowercase extension of an archive path, without the dot.
pub fn extension(name: &str) -> Option<String> {
    let file = base_name(name);
    match file.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(file[idx + 1..].to_ascii_lowercase()),
    }
}
