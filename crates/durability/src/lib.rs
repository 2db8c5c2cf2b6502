//! Durability layer for Keepsake
//!
//! This crate turns application state and media into portable bytes and
//! back:
//!
//! - Archive: streaming tar + zstd character archives with a manifest
//! - Pipeline: bounded-concurrency asset persistence with one-shot completion
//! - Backup: chunked length-prefixed full backups and their restore path
//! - Chain: primary save plus dated, pruned backups
//! - Recovery: primary, then backups, then remote fallback
//! - JSON state codec with optional zstd compression

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod archive;
pub mod backup;
pub mod chain;
pub mod pipeline;
pub mod recovery;
pub mod state_codec;

// === Re-exports ===
pub use archive::{
    ArchiveDecoder, ArchiveError, ArchiveExporter, ArchiveManifest, ArchiveOptions, ArchiveReader,
    ArchiveResult, ArchiveSource, ArchiveWriter, ExportAsset, ImportReport, ImportedArchive,
    ManifestAsset, PendingAssets, ARCHIVE_EXTENSION, ARCHIVE_FORMAT_TAG, ARCHIVE_FORMAT_VERSION,
};
pub use backup::{
    BackupDecoder, BackupError, BackupRecord, BackupRestorer, BackupResult, BackupWriter,
    RestoreOutcome, RestoreReport, STATE_RECORD_NAME,
};
pub use chain::{BackupChain, BackupChainConfig, BackupEntry, BackupKind, ChainError, ChainResult};
pub use pipeline::{
    AssetFailure, AssetMap, AssetOrigin, AssetPipeline, AssetPipelineBuilder, Completion,
    PersistMode, PersistedAsset, PipelineConfig, PipelineError, PipelineProgress, PipelineResult,
};
pub use recovery::{
    ContainerSource, FnSource, Recovered, RecoveryAttempt, RecoveryConfig, RecoveryError,
    RecoveryOrchestrator, RecoveryTier, SourceError, StateContainer, StateSource,
};
pub use state_codec::JsonStateCodec;
