//! Restoring application state from a chunked backup

use std::path::Path;

use keepsake_core::{AssetStore, StateCodec};
use tracing::{debug, info, warn};

use super::decoder::BackupDecoder;
use super::error::{BackupError, BackupResult};
use super::format::BackupRecord;
use crate::archive::ArchiveSource;

/// Read size used by [`BackupRestorer::restore_reader`].
pub const RESTORE_CHUNK_BYTES: usize = 64 * 1024;

/// An asset record that was not restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Record name as decoded
    pub name: String,
    /// Why it was skipped
    pub reason: String,
}

/// What a restore did besides producing the state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Asset records written to the store
    pub assets_restored: u64,
    /// Asset records that failed and were skipped
    pub skipped: Vec<SkippedRecord>,
    /// The restart hook ran
    pub restart_requested: bool,
}

/// Successful restore.
#[derive(Debug)]
pub struct RestoreOutcome<S> {
    /// Decoded application state
    pub state: S,
    /// Asset bookkeeping
    pub report: RestoreReport,
}

type RestartHook<'a, S> = Box<dyn FnMut(&S) + Send + 'a>;

/// Applies decoded backup records.
///
/// The state record goes through the codec and its failure is fatal. Every
/// other record is `put` into the store under its name; failures there are
/// logged and skipped so one bad asset does not lose the whole backup.
pub struct BackupRestorer<'a, C: StateCodec> {
    codec: &'a C,
    store: &'a dyn AssetStore,
    decoder: BackupDecoder,
    state: Option<C::State>,
    report: RestoreReport,
    on_restart: Option<RestartHook<'a, C::State>>,
}

impl<'a, C: StateCodec> BackupRestorer<'a, C> {
    /// Restore through `codec` into `store`.
    pub fn new(codec: &'a C, store: &'a dyn AssetStore) -> Self {
        BackupRestorer {
            codec,
            store,
            decoder: BackupDecoder::new(),
            state: None,
            report: RestoreReport::default(),
            on_restart: None,
        }
    }

    /// Use a preconfigured decoder.
    pub fn with_decoder(mut self, decoder: BackupDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Called with the decoded state once the restore succeeds.
    pub fn on_restart(mut self, hook: impl FnMut(&C::State) + Send + 'a) -> Self {
        self.on_restart = Some(Box::new(hook));
        self
    }

    /// Decode `chunk` and apply every record it completes.
    pub fn push(&mut self, chunk: &[u8]) -> BackupResult<()> {
        for record in self.decoder.push(chunk)? {
            self.apply(record)?;
        }
        Ok(())
    }

    /// Apply one already-decoded record.
    pub fn apply(&mut self, record: BackupRecord) -> BackupResult<()> {
        if record.is_state() {
            if self.state.is_some() {
                return Err(BackupError::DuplicateState);
            }
            let state = self.codec.decode(&record.data)?;
            debug!(target: "keepsake::backup", size = record.data.len(), "State record decoded");
            self.state = Some(state);
            return Ok(());
        }

        if record.lossy_name {
            warn!(target: "keepsake::backup", record = %record.name, "Skipping record with non UTF-8 name");
            self.skip(record.name, "record name is not valid UTF-8".to_string());
            return Ok(());
        }

        match self.store.put(&record.name, &record.data) {
            Ok(()) => self.report.assets_restored += 1,
            Err(e) => {
                warn!(target: "keepsake::backup", record = %record.name, error = %e, "Failed to restore asset");
                self.skip(record.name, e.to_string());
            }
        }
        Ok(())
    }

    /// End of input: checks for truncation and a state record, then runs
    /// the restart hook.
    pub fn finish(mut self) -> BackupResult<RestoreOutcome<C::State>> {
        self.decoder.finish()?;
        let state = self.state.ok_or(BackupError::MissingState)?;
        if let Some(mut hook) = self.on_restart.take() {
            hook(&state);
            self.report.restart_requested = true;
        }
        info!(
            target: "keepsake::backup",
            assets = self.report.assets_restored,
            skipped = self.report.skipped.len(),
            "Backup restored"
        );
        Ok(RestoreOutcome {
            state,
            report: self.report,
        })
    }

    /// Restore from any readable source.
    pub fn restore_reader(
        mut self,
        source: impl Into<ArchiveSource>,
    ) -> BackupResult<RestoreOutcome<C::State>> {
        for chunk in source.into().chunks(RESTORE_CHUNK_BYTES) {
            self.push(&chunk?)?;
        }
        self.finish()
    }

    /// Restore from a backup file.
    pub fn restore_file(self, path: impl AsRef<Path>) -> BackupResult<RestoreOutcome<C::State>> {
        let source = ArchiveSource::open(path)?;
        self.restore_reader(source)
    }

    fn skip(&mut self, name: String, reason: String) {
        self.report.skipped.push(SkippedRecord { name, reason });
    }
}
