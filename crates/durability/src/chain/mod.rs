//! Primary save plus dated backups
//!
//! Every successful save atomically replaces the primary file and then
//! snapshots a dated backup next to it. Backups are named
//!
//! ```text
//! <prefix><YYYYMMDD-HHMMSS>[-<seq>].save   state only
//! <prefix><YYYYMMDD-HHMMSS>[-<seq>].bak    chunked backup with assets
//! ```
//!
//! `seq` separates backups taken within the same second. Listing returns
//! the newest backup first, which is the order recovery consults them in.

mod config;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use keepsake_core::{AssetStore, StateCodec, StateCodecError};
use keepsake_storage::{EntrySink, FileSink};
use tracing::{debug, info, warn};

use crate::backup::{BackupError, BackupWriter};
use crate::recovery::StateContainer;

pub use config::{
    BackupChainConfig, BackupChainConfigError, DEFAULT_BACKUP_PREFIX, DEFAULT_PRIMARY_NAME,
    DEFAULT_RETENTION,
};

/// Extension of state-only backups.
pub const SAVE_EXTENSION: &str = "save";

/// Extension of chunked backups.
pub const CHUNKED_EXTENSION: &str = "bak";

const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const STAMP_LEN: usize = 15;

/// Backup chain errors
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Invalid configuration
    #[error("Invalid backup chain config: {0}")]
    Config(#[from] BackupChainConfigError),

    /// State failed to encode
    #[error("State codec error: {0}")]
    Codec(#[from] StateCodecError),

    /// Chunked backup failed to write
    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for backup chain operations
pub type ChainResult<T> = Result<T, ChainError>;

/// Format of a backup file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// Codec-encoded state
    SaveFile,
    /// Chunked backup of state and assets
    Chunked,
}

impl BackupKind {
    fn extension(self) -> &'static str {
        match self {
            BackupKind::SaveFile => SAVE_EXTENSION,
            BackupKind::Chunked => CHUNKED_EXTENSION,
        }
    }
}

/// One backup on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    /// File path
    pub path: PathBuf,
    /// File format
    pub kind: BackupKind,
    /// When it was taken (UTC, second precision)
    pub taken_at: NaiveDateTime,
    /// Disambiguates backups taken in the same second
    pub seq: u32,
}

impl BackupEntry {
    /// Recovery container for this backup.
    pub fn container(&self) -> StateContainer {
        match self.kind {
            BackupKind::SaveFile => StateContainer::SaveFile {
                path: self.path.clone(),
            },
            BackupKind::Chunked => StateContainer::ChunkedBackup {
                path: self.path.clone(),
            },
        }
    }
}

/// Parse a backup file name into its kind, timestamp and sequence number.
pub fn parse_backup_name(prefix: &str, file_name: &str) -> Option<(BackupKind, NaiveDateTime, u32)> {
    let rest = file_name.strip_prefix(prefix)?;
    let (stem, ext) = rest.rsplit_once('.')?;
    let kind = match ext {
        SAVE_EXTENSION => BackupKind::SaveFile,
        CHUNKED_EXTENSION => BackupKind::Chunked,
        _ => return None,
    };
    if stem.len() < STAMP_LEN || !stem.is_char_boundary(STAMP_LEN) {
        return None;
    }
    let (stamp, suffix) = stem.split_at(STAMP_LEN);
    let taken_at = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
    let seq = match suffix {
        "" => 0,
        s => s.strip_prefix('-')?.parse().ok()?,
    };
    Some((kind, taken_at, seq))
}

/// Primary save and its dated backups in one directory.
pub struct BackupChain<C: StateCodec> {
    config: BackupChainConfig,
    codec: Arc<C>,
}

impl<C: StateCodec> BackupChain<C> {
    /// Open a chain, creating its directory if needed.
    pub fn open(config: BackupChainConfig, codec: Arc<C>) -> ChainResult<Self> {
        config.validate()?;
        fs::create_dir_all(&config.dir)?;
        Ok(BackupChain { config, codec })
    }

    /// Chain configuration.
    pub fn config(&self) -> &BackupChainConfig {
        &self.config
    }

    /// Codec used for state.
    pub fn codec(&self) -> &Arc<C> {
        &self.codec
    }

    /// Path of the primary save.
    pub fn primary_path(&self) -> PathBuf {
        self.config.dir.join(&self.config.primary_name)
    }

    /// Save `state` as the primary file and as a state-only backup.
    pub fn save(&self, state: &C::State) -> ChainResult<BackupEntry> {
        let bytes = self.codec.encode(state, self.config.compression)?;
        self.write_primary(&bytes)?;

        let entry = self.next_entry(BackupKind::SaveFile)?;
        write_atomic(&entry.path, &bytes)?;
        self.finish_backup(entry)
    }

    /// Save `state` as the primary file and write a chunked backup holding
    /// the state and every keyed asset in `store`.
    pub fn save_full(&self, state: &C::State, store: &dyn AssetStore) -> ChainResult<BackupEntry> {
        let bytes = self.codec.encode(state, self.config.compression)?;
        self.write_primary(&bytes)?;

        let entry = self.next_entry(BackupKind::Chunked)?;
        let mut writer = BackupWriter::new(FileSink::create(&entry.path)?);
        writer.write_store(store)?;
        writer.write_state(&bytes)?;
        writer.finish()?;
        self.finish_backup(entry)
    }

    /// Backups on disk, newest first.
    pub fn list(&self) -> ChainResult<Vec<BackupEntry>> {
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&self.config.dir)? {
            let dir_entry = dir_entry?;
            let file_name = dir_entry.file_name().to_string_lossy().to_string();
            if let Some((kind, taken_at, seq)) =
                parse_backup_name(&self.config.backup_prefix, &file_name)
            {
                entries.push(BackupEntry {
                    path: dir_entry.path(),
                    kind,
                    taken_at,
                    seq,
                });
            }
        }
        entries.sort_by(|a, b| (b.taken_at, b.seq).cmp(&(a.taken_at, a.seq)));
        Ok(entries)
    }

    /// Delete all but the newest `retention` backups. Returns how many
    /// were removed.
    pub fn prune(&self) -> ChainResult<usize> {
        let mut removed = 0;
        for entry in self.list()?.into_iter().skip(self.config.retention) {
            match fs::remove_file(&entry.path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(target: "keepsake::chain", path = %entry.path.display(), error = %e, "Failed to prune backup")
                }
            }
        }
        if removed > 0 {
            debug!(target: "keepsake::chain", removed, "Pruned backups");
        }
        Ok(removed)
    }

    /// The primary save followed by every backup, newest first.
    pub fn containers(&self) -> ChainResult<(StateContainer, Vec<StateContainer>)> {
        let primary = StateContainer::SaveFile {
            path: self.primary_path(),
        };
        let backups = self.list()?.iter().map(BackupEntry::container).collect();
        Ok((primary, backups))
    }

    fn write_primary(&self, bytes: &[u8]) -> ChainResult<()> {
        let path = self.primary_path();
        write_atomic(&path, bytes)?;
        debug!(target: "keepsake::chain", path = %path.display(), bytes = bytes.len(), "Primary save written");
        Ok(())
    }

    fn next_entry(&self, kind: BackupKind) -> ChainResult<BackupEntry> {
        let now = Utc::now().naive_utc();
        let stamp = now.format(STAMP_FORMAT).to_string();
        // Second precision; the parsed value is what listing compares.
        let taken_at = NaiveDateTime::parse_from_str(&stamp, STAMP_FORMAT)
            .unwrap_or(now);
        let seq = self
            .list()?
            .iter()
            .filter(|e| e.taken_at == taken_at)
            .map(|e| e.seq + 1)
            .max()
            .unwrap_or(0);

        let name = if seq == 0 {
            format!("{}{}.{}", self.config.backup_prefix, stamp, kind.extension())
        } else {
            format!("{}{}-{}.{}", self.config.backup_prefix, stamp, seq, kind.extension())
        };
        Ok(BackupEntry {
            path: self.config.dir.join(name),
            kind,
            taken_at,
            seq,
        })
    }

    fn finish_backup(&self, entry: BackupEntry) -> ChainResult<BackupEntry> {
        info!(target: "keepsake::chain", path = %entry.path.display(), kind = ?entry.kind, "Backup taken");
        self.prune()?;
        Ok(entry)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut sink = FileSink::create(path)?;
    sink.write_chunk(bytes)?;
    sink.close()
}
