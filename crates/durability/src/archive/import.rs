//! Import results
//!
//! Metadata is available as soon as decoding finishes; assets may still be
//! persisting in the background and are reached through [`PendingAssets`].

use std::collections::BTreeMap;
use std::time::Duration;

use crate::pipeline::{
    AssetFailure, AssetMap, AssetPipeline, Completion, PipelineError, PipelineOutcome,
    PipelineProgress, PipelineResult,
};

use super::types::ArchiveManifest;

/// The secondary metadata entry and the name it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryMetadata {
    /// Entry name (`module.<ext>`)
    pub name: String,
    /// Entry bytes
    pub bytes: Vec<u8>,
}

/// Assets still being persisted after decode.
#[derive(Debug)]
pub struct PendingAssets {
    pipeline: AssetPipeline,
    excluded_files: Vec<String>,
}

impl PendingAssets {
    pub(crate) fn new(pipeline: AssetPipeline, excluded_files: Vec<String>) -> Self {
        PendingAssets {
            pipeline,
            excluded_files,
        }
    }

    /// Handle that resolves once every asset has been processed.
    pub fn done(&self) -> Completion {
        self.pipeline.completion()
    }

    /// Block until every asset has been processed.
    pub fn wait(&self) -> PipelineOutcome {
        self.pipeline.completion().wait()
    }

    /// Block up to `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<PipelineOutcome> {
        self.pipeline.completion().wait_timeout(timeout)
    }

    /// Block, then describe a possibly partial import.
    ///
    /// Asset failures are folded into the report; only an aborted pipeline
    /// is an error.
    pub fn wait_report(&self) -> PipelineResult<ImportReport> {
        let (assets, failures) = match self.wait() {
            Ok(assets) => (assets, Vec::new()),
            Err(PipelineError::AssetsFailed { failures, persisted }) => (persisted, failures),
            Err(e) => return Err(e),
        };
        Ok(ImportReport {
            assets,
            excluded_files: self.excluded_files.clone(),
            failures,
        })
    }

    /// Current persistence progress.
    pub fn progress(&self) -> PipelineProgress {
        self.pipeline.progress()
    }
}

/// Outcome of an import that may have partially succeeded.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// Persisted assets by entry name
    pub assets: AssetMap,
    /// Entries skipped for exceeding the size cap
    pub excluded_files: Vec<String>,
    /// Assets that failed to persist
    pub failures: Vec<AssetFailure>,
}

impl ImportReport {
    /// Whether every entry made it into the asset map.
    pub fn is_clean(&self) -> bool {
        self.excluded_files.is_empty() && self.failures.is_empty()
    }

    /// Names of every entry that is missing from the asset map.
    pub fn missing(&self) -> Vec<&str> {
        self.excluded_files
            .iter()
            .map(String::as_str)
            .chain(self.failures.iter().map(|f| f.name.as_str()))
            .collect()
    }
}

/// A decoded archive.
#[derive(Debug)]
pub struct ImportedArchive {
    /// Primary metadata (`card.json`)
    pub metadata: Option<Vec<u8>>,
    /// Secondary metadata (`module.*`)
    pub secondary_metadata: Option<SecondaryMetadata>,
    /// Parsed manifest, if the archive carried one
    pub manifest: Option<ArchiveManifest>,
    /// Other JSON entries by name
    pub auxiliary: BTreeMap<String, Vec<u8>>,
    /// Entries skipped for exceeding the size cap
    pub excluded_files: Vec<String>,
    /// Number of entries decoded (excluded ones included)
    pub entry_count: u64,
    complete: bool,
    assets: PendingAssets,
}

impl ImportedArchive {
    pub(crate) fn new(
        metadata: Option<Vec<u8>>,
        secondary_metadata: Option<SecondaryMetadata>,
        manifest: Option<ArchiveManifest>,
        complete: bool,
        auxiliary: BTreeMap<String, Vec<u8>>,
        excluded_files: Vec<String>,
        entry_count: u64,
        pipeline: AssetPipeline,
    ) -> Self {
        let assets = PendingAssets::new(pipeline, excluded_files.clone());
        ImportedArchive {
            metadata,
            secondary_metadata,
            manifest,
            auxiliary,
            excluded_files,
            entry_count,
            complete,
            assets,
        }
    }

    /// Whether the manifest was present and was the last entry.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Primary metadata bytes.
    pub fn metadata(&self) -> Option<&[u8]> {
        self.metadata.as_deref()
    }

    /// Assets still being persisted.
    pub fn assets(&self) -> &PendingAssets {
        &self.assets
    }

    /// Block until every asset has been processed.
    pub fn wait(&self) -> PipelineOutcome {
        self.assets.wait()
    }

    /// Block, then describe a possibly partial import.
    pub fn wait_report(&self) -> PipelineResult<ImportReport> {
        self.assets.wait_report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepsake_core::StoreError;

    #[test]
    fn test_report_missing_lists_excluded_and_failed() {
        let report = ImportReport {
            assets: AssetMap::new(),
            excluded_files: vec!["huge.mp4".to_string()],
            failures: vec![AssetFailure::new("broken.png", StoreError::backend("x"))],
        };
        assert!(!report.is_clean());
        assert_eq!(report.missing(), vec!["huge.mp4", "broken.png"]);
        assert!(ImportReport::default().is_clean());
    }
}
