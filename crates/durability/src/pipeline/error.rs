//! Pipeline error types

use std::fmt;
use std::sync::Arc;

use keepsake_core::StoreError;
use thiserror::Error;

use super::state::AssetMap;
use super::PipelineConfigError;

/// One asset that could not be persisted.
#[derive(Debug, Clone)]
pub struct AssetFailure {
    /// Entry name as it appeared in the container
    pub name: String,
    /// Underlying store failure
    pub error: Arc<StoreError>,
}

impl AssetFailure {
    /// Create a failure record.
    pub fn new(name: impl Into<String>, error: StoreError) -> Self {
        AssetFailure {
            name: name.into(),
            error: Arc::new(error),
        }
    }
}

impl fmt::Display for AssetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.error)
    }
}

/// Errors produced by the asset pipeline.
///
/// Cloneable because every holder of the completion handle receives the
/// same outcome.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// One or more assets failed; the rest were persisted.
    #[error("{} asset(s) failed to persist: {}", failures.len(), format_failures(failures))]
    AssetsFailed {
        /// Every failed asset, in completion order
        failures: Vec<AssetFailure>,
        /// Assets that did persist
        persisted: AssetMap,
    },

    /// The pipeline was dropped before it was finalized.
    #[error("Asset pipeline aborted before finalize")]
    Aborted,

    /// `enqueue` was called after `finalize`.
    #[error("Asset pipeline is closed")]
    Closed,

    /// Invalid configuration.
    #[error("Invalid pipeline configuration: {0}")]
    Config(#[from] PipelineConfigError),

    /// A worker thread could not be started.
    #[error("Failed to spawn pipeline worker: {0}")]
    Spawn(String),
}

impl PipelineError {
    /// Failed assets, if this is an aggregated asset error.
    pub fn failures(&self) -> &[AssetFailure] {
        match self {
            PipelineError::AssetsFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}

fn format_failures(failures: &[AssetFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
