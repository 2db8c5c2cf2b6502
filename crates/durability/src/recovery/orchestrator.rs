//! Tiered recovery
//!
//! ```text
//! TryPrimary        -> ok: Done(Primary)              | err: TryBackups
//! TryBackups        -> first ok: Done(Backup)         | exhausted: TryRemoteFallback
//! TryRemoteFallback -> ok: Done(RemoteFallback)       | err: FatalCorruption
//! ```
//!
//! The orchestrator never substitutes an empty default state: when every
//! tier fails the caller gets [`RecoveryError::CorruptionExhausted`] with
//! the full attempt history.

use std::fmt;
use std::sync::Arc;

use keepsake_core::{AssetStore, StateCodec};
use thiserror::Error;
use tracing::{error, info, warn};

use super::container::ContainerSource;
use super::source::{SourceError, StateSource};
use crate::chain::{BackupChain, ChainResult};

/// Recovery configuration
#[derive(Debug, Clone, Default)]
pub struct RecoveryConfig {
    /// Account sync owns the state; local backups are never consulted
    pub account_sync_authoritative: bool,
    /// Try at most this many backups (all when `None`)
    pub backup_limit: Option<usize>,
}

impl RecoveryConfig {
    /// Create config for testing
    pub fn for_testing() -> Self {
        RecoveryConfig::default()
    }

    /// Set whether account sync is authoritative
    pub fn with_account_sync_authoritative(mut self, authoritative: bool) -> Self {
        self.account_sync_authoritative = authoritative;
        self
    }

    /// Limit the number of backups tried
    pub fn with_backup_limit(mut self, limit: usize) -> Self {
        self.backup_limit = Some(limit);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), RecoveryConfigError> {
        if self.backup_limit == Some(0) && !self.account_sync_authoritative {
            return Err(RecoveryConfigError::ZeroBackupLimit);
        }
        Ok(())
    }
}

/// Recovery configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryConfigError {
    /// A zero limit silently disables the backup tier
    #[error("Backup limit of 0 disables backups; set account_sync_authoritative instead")]
    ZeroBackupLimit,
}

/// Which tier produced (or failed to produce) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryTier {
    /// The primary save
    Primary,
    /// A backup, by position in the chain (0 = most recent)
    Backup {
        /// Position in the backup list
        index: usize,
    },
    /// The remote fallback
    RemoteFallback,
}

impl fmt::Display for RecoveryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryTier::Primary => write!(f, "primary"),
            RecoveryTier::Backup { index } => write!(f, "backup[{}]", index),
            RecoveryTier::RemoteFallback => write!(f, "remote"),
        }
    }
}

/// One failed attempt.
#[derive(Debug)]
pub struct RecoveryAttempt {
    /// Tier tried
    pub tier: RecoveryTier,
    /// Source description
    pub source: String,
    /// Why it failed
    pub error: SourceError,
}

/// Successful recovery.
#[derive(Debug)]
pub struct Recovered<S> {
    /// Recovered state
    pub state: S,
    /// Tier that produced it
    pub tier: RecoveryTier,
    /// Source that produced it
    pub source: String,
    /// Attempts that failed before it
    pub attempts: Vec<RecoveryAttempt>,
    /// State came from the remote fallback and may be older than local data
    pub degraded: bool,
}

/// Recovery failure
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// Every tier held state and every one failed to load
    #[error("All {} recovery source(s) failed; state is unrecoverable", attempts.len())]
    CorruptionExhausted {
        /// Every failed attempt, in order
        attempts: Vec<RecoveryAttempt>,
    },

    /// No tier held any state (fresh install)
    #[error("No saved state found in {} source(s)", attempts.len())]
    NoState {
        /// Every attempt, all reporting missing state
        attempts: Vec<RecoveryAttempt>,
    },

    /// Invalid configuration
    #[error("Invalid recovery config: {0}")]
    Config(#[from] RecoveryConfigError),
}

impl RecoveryError {
    /// Attempts made before giving up.
    pub fn attempts(&self) -> &[RecoveryAttempt] {
        match self {
            RecoveryError::CorruptionExhausted { attempts } | RecoveryError::NoState { attempts } => {
                attempts
            }
            RecoveryError::Config(_) => &[],
        }
    }
}

type BoxedSource<S> = Box<dyn StateSource<S> + Send + Sync>;

enum RecoveryPhase {
    TryPrimary,
    TryBackups { next: usize },
    TryRemoteFallback,
    Done { tier: RecoveryTier, source: String },
    FatalCorruption,
}

/// Runs the tiers in order until one yields state.
pub struct RecoveryOrchestrator<S> {
    config: RecoveryConfig,
    primary: BoxedSource<S>,
    backups: Vec<BoxedSource<S>>,
    remote: Option<BoxedSource<S>>,
}

impl<S> RecoveryOrchestrator<S> {
    /// Start with the primary source only.
    pub fn new(primary: impl StateSource<S> + Send + Sync + 'static) -> Self {
        RecoveryOrchestrator {
            config: RecoveryConfig::default(),
            primary: Box::new(primary),
            backups: Vec::new(),
            remote: None,
        }
    }

    /// Set configuration
    pub fn with_config(mut self, config: RecoveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a backup; backups are tried in the order added.
    pub fn with_backup(mut self, backup: impl StateSource<S> + Send + Sync + 'static) -> Self {
        self.backups.push(Box::new(backup));
        self
    }

    /// Set the remote fallback.
    pub fn with_remote(mut self, remote: impl StateSource<S> + Send + Sync + 'static) -> Self {
        self.remote = Some(Box::new(remote));
        self
    }

    /// Number of backups registered.
    pub fn backup_count(&self) -> usize {
        self.backups.len()
    }

    /// Run recovery.
    pub fn recover(&self) -> Result<Recovered<S>, RecoveryError> {
        self.config.validate()?;

        let mut attempts = Vec::new();
        let mut state = None;
        let mut phase = RecoveryPhase::TryPrimary;

        loop {
            phase = match phase {
                RecoveryPhase::TryPrimary => {
                    match self.attempt(RecoveryTier::Primary, &self.primary, &mut attempts) {
                        Some((loaded, source)) => {
                            state = Some(loaded);
                            RecoveryPhase::Done {
                                tier: RecoveryTier::Primary,
                                source,
                            }
                        }
                        None if self.config.account_sync_authoritative => {
                            info!(target: "keepsake::recovery", "Account sync is authoritative; skipping backups");
                            RecoveryPhase::TryRemoteFallback
                        }
                        None => RecoveryPhase::TryBackups { next: 0 },
                    }
                }
                RecoveryPhase::TryBackups { next } => {
                    let limit = self.config.backup_limit.unwrap_or(usize::MAX);
                    match self.backups.get(next).filter(|_| next < limit) {
                        None => RecoveryPhase::TryRemoteFallback,
                        Some(backup) => {
                            let tier = RecoveryTier::Backup { index: next };
                            match self.attempt(tier, backup, &mut attempts) {
                                Some((loaded, source)) => {
                                    state = Some(loaded);
                                    RecoveryPhase::Done { tier, source }
                                }
                                None => RecoveryPhase::TryBackups { next: next + 1 },
                            }
                        }
                    }
                }
                RecoveryPhase::TryRemoteFallback => {
                    let tier = RecoveryTier::RemoteFallback;
                    match self
                        .remote
                        .as_ref()
                        .and_then(|remote| self.attempt(tier, remote, &mut attempts))
                    {
                        Some((loaded, source)) => {
                            state = Some(loaded);
                            RecoveryPhase::Done { tier, source }
                        }
                        None => RecoveryPhase::FatalCorruption,
                    }
                }
                RecoveryPhase::Done { tier, source } => {
                    let Some(state) = state.take() else {
                        return Err(RecoveryError::CorruptionExhausted { attempts });
                    };
                    let degraded = tier == RecoveryTier::RemoteFallback;
                    info!(
                        target: "keepsake::recovery",
                        %tier,
                        source = %source,
                        failed_attempts = attempts.len(),
                        degraded,
                        "State recovered"
                    );
                    return Ok(Recovered {
                        state,
                        tier,
                        source,
                        attempts,
                        degraded,
                    });
                }
                RecoveryPhase::FatalCorruption => {
                    if attempts.iter().all(|a| a.error.is_missing()) {
                        info!(target: "keepsake::recovery", sources = attempts.len(), "No saved state found");
                        return Err(RecoveryError::NoState { attempts });
                    }
                    error!(target: "keepsake::recovery", attempts = attempts.len(), "Every recovery source failed");
                    return Err(RecoveryError::CorruptionExhausted { attempts });
                }
            };
        }
    }

    fn attempt(
        &self,
        tier: RecoveryTier,
        source: &BoxedSource<S>,
        attempts: &mut Vec<RecoveryAttempt>,
    ) -> Option<(S, String)> {
        let name = source.describe();
        match source.load() {
            Ok(state) => Some((state, name)),
            Err(e) => {
                if e.is_missing() {
                    info!(target: "keepsake::recovery", %tier, source = %name, "Source has no state");
                } else {
                    warn!(target: "keepsake::recovery", %tier, source = %name, error = %e, "Recovery attempt failed");
                }
                attempts.push(RecoveryAttempt {
                    tier,
                    source: name,
                    error: e,
                });
                None
            }
        }
    }
}

impl<S: 'static> RecoveryOrchestrator<S> {
    /// Orchestrator over a backup chain: its primary save, then every
    /// backup newest first.
    pub fn from_chain<C>(chain: &BackupChain<C>, store: Arc<dyn AssetStore>) -> ChainResult<Self>
    where
        C: StateCodec<State = S> + 'static,
    {
        let (primary, backups) = chain.containers()?;
        let codec = Arc::clone(chain.codec());
        let mut orchestrator =
            RecoveryOrchestrator::new(ContainerSource::new(primary, Arc::clone(&codec), Arc::clone(&store)));
        for backup in backups {
            orchestrator = orchestrator.with_backup(ContainerSource::new(
                backup,
                Arc::clone(&codec),
                Arc::clone(&store),
            ));
        }
        Ok(orchestrator)
    }
}
