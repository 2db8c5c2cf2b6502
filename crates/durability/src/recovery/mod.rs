//! State recovery
//!
//! Application state can live in three container formats (a plain save
//! file, a chunked backup, a character archive). Each is wrapped as a
//! [`StateSource`] so the [`RecoveryOrchestrator`] can walk the tiers
//! uniformly: primary save, then backups most recent first, then the remote
//! fallback.

mod container;
mod orchestrator;
mod source;

pub use container::{ContainerSource, StateContainer};
pub use orchestrator::{
    Recovered, RecoveryAttempt, RecoveryConfig, RecoveryConfigError, RecoveryError,
    RecoveryOrchestrator, RecoveryTier,
};
pub use source::{FnSource, SourceError, StateSource};
