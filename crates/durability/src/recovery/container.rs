//! On-disk containers as state sources

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keepsake_core::{AssetStore, StateCodec};
use tracing::{debug, warn};

use super::source::{SourceError, StateSource};
use crate::archive::{ArchiveReader, ArchiveSource};
use crate::backup::{BackupError, BackupRestorer};

/// The container formats state can be recovered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateContainer {
    /// One file holding codec-encoded state, optionally zstd-compressed
    SaveFile {
        /// File path
        path: PathBuf,
    },
    /// Chunked backup: assets plus the state record
    ChunkedBackup {
        /// File path
        path: PathBuf,
    },
    /// Character archive whose metadata entry holds the state
    Archive {
        /// File path
        path: PathBuf,
    },
}

impl StateContainer {
    /// Path of the container file.
    pub fn path(&self) -> &Path {
        match self {
            StateContainer::SaveFile { path }
            | StateContainer::ChunkedBackup { path }
            | StateContainer::Archive { path } => path,
        }
    }

    /// Format name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StateContainer::SaveFile { .. } => "save",
            StateContainer::ChunkedBackup { .. } => "backup",
            StateContainer::Archive { .. } => "archive",
        }
    }
}

/// A [`StateContainer`] bound to the codec and store needed to load it.
pub struct ContainerSource<C: StateCodec> {
    container: StateContainer,
    codec: Arc<C>,
    store: Arc<dyn AssetStore>,
}

impl<C: StateCodec> ContainerSource<C> {
    /// Bind `container`.
    pub fn new(container: StateContainer, codec: Arc<C>, store: Arc<dyn AssetStore>) -> Self {
        ContainerSource {
            container,
            codec,
            store,
        }
    }

    /// The bound container.
    pub fn container(&self) -> &StateContainer {
        &self.container
    }

    fn missing(&self) -> SourceError {
        SourceError::Missing(self.describe())
    }

    fn load_save_file(&self, path: &Path) -> Result<C::State, SourceError> {
        let bytes = fs::read(path).map_err(|e| self.classify_io(e))?;
        if bytes.is_empty() {
            return Err(SourceError::other(format!("{} is empty", self.describe())));
        }
        Ok(self.codec.decode(&bytes)?)
    }

    fn load_backup(&self, path: &Path) -> Result<C::State, SourceError> {
        let source = ArchiveSource::open(path).map_err(|e| self.classify_io(e))?;
        let outcome = BackupRestorer::new(self.codec.as_ref(), self.store.as_ref())
            .restore_reader(source)
            .map_err(|e| match e {
                BackupError::Io(io) => self.classify_io(io),
                other => SourceError::Backup(other),
            })?;
        for skipped in &outcome.report.skipped {
            warn!(
                target: "keepsake::recovery",
                container = %self.describe(),
                record = %skipped.name,
                reason = %skipped.reason,
                "Asset not restored"
            );
        }
        Ok(outcome.state)
    }

    fn load_archive(&self, path: &Path) -> Result<C::State, SourceError> {
        let source = ArchiveSource::open(path).map_err(|e| self.classify_io(e))?;
        let imported = ArchiveReader::new(Arc::clone(&self.store)).parse(source)?;
        let metadata = imported
            .metadata()
            .ok_or_else(|| SourceError::other(format!("{} has no metadata entry", self.describe())))?;
        let state = self.codec.decode(metadata)?;

        match imported.wait_report() {
            Ok(report) if report.is_clean() => {}
            Ok(report) => warn!(
                target: "keepsake::recovery",
                container = %self.describe(),
                failed = report.failures.len(),
                excluded = report.excluded_files.len(),
                "Archive recovered with missing assets"
            ),
            Err(e) => warn!(
                target: "keepsake::recovery",
                container = %self.describe(),
                error = %e,
                "Archive assets did not complete"
            ),
        }
        Ok(state)
    }

    fn classify_io(&self, e: io::Error) -> SourceError {
        if e.kind() == io::ErrorKind::NotFound {
            self.missing()
        } else {
            SourceError::Io(e)
        }
    }
}

impl<C: StateCodec> StateSource<C::State> for ContainerSource<C> {
    fn describe(&self) -> String {
        format!("{} {}", self.container.kind(), self.container.path().display())
    }

    fn load(&self) -> Result<C::State, SourceError> {
        debug!(target: "keepsake::recovery", container = %self.describe(), "Loading container");
        match &self.container {
            StateContainer::SaveFile { path } => self.load_save_file(path),
            StateContainer::ChunkedBackup { path } => self.load_backup(path),
            StateContainer::Archive { path } => self.load_archive(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveExporter, ArchiveOptions};
    use crate::backup::BackupWriter;
    use crate::state_codec::JsonStateCodec;
    use keepsake_core::CompressionMode;
    use keepsake_storage::{FileSink, MemoryAssetStore};
    use serde_json::{json, Value};

    fn source(container: StateContainer, store: Arc<MemoryAssetStore>) -> ContainerSource<JsonStateCodec<Value>> {
        ContainerSource::new(container, Arc::new(JsonStateCodec::new()), store)
    }

    #[test]
    fn test_save_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.save");
        let codec = JsonStateCodec::<Value>::new();
        fs::write(&path, codec.encode(&json!({"a": 1}), CompressionMode::Zstd(1)).unwrap()).unwrap();

        let src = source(StateContainer::SaveFile { path }, Arc::new(MemoryAssetStore::new()));
        assert_eq!(src.load().unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryAssetStore::new());
        let missing = source(
            StateContainer::ChunkedBackup {
                path: dir.path().join("nope.bak"),
            },
            Arc::clone(&store),
        );
        assert!(missing.load().unwrap_err().is_missing());

        let path = dir.path().join("bad.save");
        fs::write(&path, b"{truncated").unwrap();
        let corrupt = source(StateContainer::SaveFile { path }, store);
        assert!(matches!(corrupt.load(), Err(SourceError::Codec(_))));
    }

    #[test]
    fn test_chunked_backup_restores_assets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.bak");
        let mut writer = BackupWriter::new(FileSink::create(&path).unwrap());
        writer.write_record("user/avatar.png", b"png").unwrap();
        writer.write_state(br#"{"b":2}"#).unwrap();
        writer.finish().unwrap();

        let store = Arc::new(MemoryAssetStore::new());
        let src = source(StateContainer::ChunkedBackup { path }, Arc::clone(&store));
        assert_eq!(src.load().unwrap(), json!({"b": 2}));
        assert_eq!(store.get("user/avatar.png").unwrap(), b"png");
    }

    #[test]
    fn test_archive_metadata_is_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("card.charx");
        let sink = FileSink::create(&path).unwrap();
        let mut exporter = ArchiveExporter::new(sink, ArchiveOptions::for_testing()).unwrap();
        exporter.write_payload(br#"{"c":3}"#).unwrap();
        exporter.finish().unwrap();

        let src = source(StateContainer::Archive { path }, Arc::new(MemoryAssetStore::new()));
        assert_eq!(src.load().unwrap(), json!({"c": 3}));
        assert!(src.describe().starts_with("archive "));
    }
}
