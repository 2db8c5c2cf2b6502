//! Core types for Keepsake
//!
//! This crate defines the vocabulary shared by every container format:
//! - Entry: named blob and its kind (metadata, secondary metadata, asset, ...)
//! - Limits: the per-entry size cap and decoder chunk size
//! - Name sanitization and per-archive de-duplication
//! - AssetStore / RemoteAssetIndex: content-addressed persistence capabilities
//! - StateCodec: structured-state encode/decode capability

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod asset;
pub mod codec;
pub mod entry;
pub mod limits;
pub mod name;

pub use asset::{
    sha256_hex, AssetId, AssetStore, ContentHash, RemoteAssetIndex, StoreError, StoreResult,
};
pub use codec::{CompressionMode, StateCodec, StateCodecError};
pub use entry::{
    base_name, extension, Entry, EntryKind, ASSETS_DIR, MANIFEST_ENTRY, METADATA_ENTRY,
    SECONDARY_METADATA_STEM,
};
pub use limits::{LimitError, Limits, DEFAULT_CHUNK_BYTES, DEFAULT_MAX_ENTRY_BYTES};
pub use name::{sanitize_name, NameRegistry};
