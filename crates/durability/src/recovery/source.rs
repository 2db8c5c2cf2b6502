//! State sources consulted during recovery

use std::io;

use keepsake_core::{StateCodecError, StoreError};
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::backup::BackupError;

/// Why a source could not produce state.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Nothing stored at this source
    #[error("No state at {0}")]
    Missing(String),

    /// Archive failed to decode
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Chunked backup failed to decode or restore
    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    /// State bytes failed to decode
    #[error("State codec error: {0}")]
    Codec(#[from] StateCodecError),

    /// Asset store failure
    #[error("Asset store error: {0}")]
    Store(#[from] StoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Any other failure, typically from a caller-supplied source
    #[error("{0}")]
    Other(String),
}

impl SourceError {
    /// Create an error from a message
    pub fn other(msg: impl Into<String>) -> Self {
        SourceError::Other(msg.into())
    }

    /// Whether the source simply had nothing to offer.
    pub fn is_missing(&self) -> bool {
        matches!(self, SourceError::Missing(_))
    }
}

/// Something that can materialize application state.
pub trait StateSource<S> {
    /// Short human-readable description for logs and attempt records.
    fn describe(&self) -> String;

    /// Produce the state.
    fn load(&self) -> Result<S, SourceError>;
}

impl<S, T: StateSource<S> + ?Sized> StateSource<S> for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn load(&self) -> Result<S, SourceError> {
        (**self).load()
    }
}

/// A source backed by a closure, used for account sync and tests.
pub struct FnSource<F> {
    name: String,
    load: F,
}

impl<F> FnSource<F> {
    /// Wrap `load` under `name`.
    pub fn new(name: impl Into<String>, load: F) -> Self {
        FnSource {
            name: name.into(),
            load,
        }
    }
}

impl<S, F> StateSource<S> for FnSource<F>
where
    F: Fn() -> Result<S, SourceError>,
{
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn load(&self) -> Result<S, SourceError> {
        (self.load)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_source() {
        let ok = FnSource::new("sync", || Ok::<_, SourceError>(7));
        assert_eq!(ok.describe(), "sync");
        assert_eq!(ok.load().unwrap(), 7);

        let boxed: Box<dyn StateSource<i32>> =
            Box::new(FnSource::new("empty", || Err(SourceError::Missing("empty".into()))));
        assert!(boxed.load().unwrap_err().is_missing());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(SourceError::other("offline").to_string(), "offline");
        assert!(SourceError::Missing("state.save".into())
            .to_string()
            .contains("state.save"));
    }
}
