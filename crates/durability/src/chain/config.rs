//! Backup chain configuration

use std::path::PathBuf;

use keepsake_core::CompressionMode;

/// Default file name of the primary save.
pub const DEFAULT_PRIMARY_NAME: &str = "state.save";

/// Default prefix of dated backup files.
pub const DEFAULT_BACKUP_PREFIX: &str = "backup-";

/// Default number of backups kept after pruning.
pub const DEFAULT_RETENTION: usize = 10;

/// Where and how the primary save and its backups are written.
#[derive(Debug, Clone)]
pub struct BackupChainConfig {
    /// Directory holding the primary save and the backups
    pub dir: PathBuf,
    /// File name of the primary save
    pub primary_name: String,
    /// File name prefix of dated backups
    pub backup_prefix: String,
    /// Backups kept after each save
    pub retention: usize,
    /// Compression applied to encoded state
    pub compression: CompressionMode,
}

impl Default for BackupChainConfig {
    fn default() -> Self {
        BackupChainConfig {
            dir: PathBuf::from("."),
            primary_name: DEFAULT_PRIMARY_NAME.to_string(),
            backup_prefix: DEFAULT_BACKUP_PREFIX.to_string(),
            retention: DEFAULT_RETENTION,
            compression: CompressionMode::Zstd(3),
        }
    }
}

impl BackupChainConfig {
    /// Chain rooted at `dir` with default naming.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        BackupChainConfig {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Create config for testing
    ///
    /// Keeps three uncompressed backups.
    pub fn for_testing(dir: impl Into<PathBuf>) -> Self {
        BackupChainConfig {
            dir: dir.into(),
            retention: 3,
            compression: CompressionMode::None,
            ..Default::default()
        }
    }

    /// Set the primary save file name
    pub fn with_primary_name(mut self, name: impl Into<String>) -> Self {
        self.primary_name = name.into();
        self
    }

    /// Set the backup file prefix
    pub fn with_backup_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.backup_prefix = prefix.into();
        self
    }

    /// Set the retention count
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    /// Set state compression
    pub fn with_compression(mut self, compression: CompressionMode) -> Self {
        self.compression = compression;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), BackupChainConfigError> {
        if self.retention == 0 {
            return Err(BackupChainConfigError::ZeroRetention);
        }
        if !is_plain_file_name(&self.primary_name) {
            return Err(BackupChainConfigError::InvalidName(self.primary_name.clone()));
        }
        if !is_plain_file_name(&self.backup_prefix) {
            return Err(BackupChainConfigError::InvalidName(self.backup_prefix.clone()));
        }
        if self.primary_name.starts_with(&self.backup_prefix) {
            return Err(BackupChainConfigError::PrimaryShadowsBackups {
                primary: self.primary_name.clone(),
                prefix: self.backup_prefix.clone(),
            });
        }
        if let CompressionMode::Zstd(level) = self.compression {
            let range = zstd::compression_level_range();
            if !range.contains(&level) {
                return Err(BackupChainConfigError::CompressionLevel(level));
            }
        }
        Ok(())
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != ".."
}

/// Backup chain configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackupChainConfigError {
    /// At least one backup must be kept
    #[error("Backup retention must be at least 1")]
    ZeroRetention,

    /// Names must be single path components
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    /// The primary file would be listed as a backup
    #[error("Primary save {primary} starts with backup prefix {prefix}")]
    PrimaryShadowsBackups {
        /// Primary file name
        primary: String,
        /// Backup prefix
        prefix: String,
    },

    /// zstd level out of range
    #[error("Invalid zstd compression level {0}")]
    CompressionLevel(i32),
}
