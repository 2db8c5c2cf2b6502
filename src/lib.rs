//! Keepsake - streaming export, import and recovery for character-chat state
//!
//! Keepsake moves a chat client's characters, media and whole application
//! state in and out of portable containers without holding them in memory:
//!
//! - Character archives: tar inside zstd, decoded from arbitrary chunks while
//!   assets persist concurrently through a bounded worker pool
//! - Chunked backups: length-prefixed records of every asset plus the state
//! - Recovery: primary save, then dated backups, then a remote fallback
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use keepsake::{ArchiveExporter, ArchiveOptions, ArchiveReader, ExportAsset};
//! use keepsake::storage::{FileSink, FsAssetStore};
//!
//! let mut exporter = ArchiveExporter::new(FileSink::create("ada.charx")?, ArchiveOptions::default())?;
//! exporter.write_payload(br#"{"name":"Ada"}"#)?;
//! exporter.write_asset(ExportAsset::new("avatar", "icon", "png"), &png)?;
//! exporter.finish()?;
//!
//! let store = Arc::new(FsAssetStore::open("assets")?);
//! let imported = ArchiveReader::new(store).parse_file("ada.charx")?;
//! let report = imported.wait_report()?;
//! ```

pub use keepsake_durability as durability;
pub use keepsake_storage as storage;

pub use keepsake_core::{
    AssetId, AssetStore, CompressionMode, ContentHash, Entry, EntryKind, Limits, RemoteAssetIndex,
    StateCodec, StateCodecError, StoreError,
};
pub use keepsake_durability::*;
