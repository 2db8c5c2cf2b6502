//! Character archive format
//!
//! A portable container for one character: structured metadata plus any
//! number of media assets, stored as a tar stream inside a zstd frame.
//!
//! ## Structure
//!
//! ```text
//! card.json          primary metadata (payload)
//! module.<ext>       optional secondary metadata
//! assets/<kind>/...  media assets
//! *.json             auxiliary documents
//! manifest.json      asset index, always last
//! ```
//!
//! Both directions stream: the writer pushes compressed bytes to an
//! `EntrySink` after every entry, and the decoder accepts compressed bytes
//! in arbitrary chunks, persisting assets concurrently while decoding
//! continues.

mod decoder;
mod error;
mod exporter;
mod import;
mod reader;
mod types;
mod writer;

pub use decoder::ArchiveDecoder;
pub use error::{ArchiveError, ArchiveResult};
pub use exporter::{ArchiveExporter, ExportAsset};
pub use import::{ImportReport, ImportedArchive, PendingAssets, SecondaryMetadata};
pub use reader::{ArchiveReader, ArchiveSource, ChunkSource};
pub use types::{
    paths, xxh3_hex, ArchiveManifest, ArchiveOptions, ArchiveOptionsError, ManifestAsset,
    ARCHIVE_EXTENSION, ARCHIVE_FORMAT_TAG, ARCHIVE_FORMAT_VERSION,
};
pub use writer::ArchiveWriter;
