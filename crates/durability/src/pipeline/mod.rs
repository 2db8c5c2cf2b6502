//! Asset pipeline
//!
//! Persists assets concurrently while the container that carries them is
//! still being decoded, and reports a single outcome once the feeder has
//! finished and every asset has been processed.

mod completion;
mod config;
mod error;
mod state;
mod worker;

pub use completion::Completion;
pub use config::{
    PersistMode, PipelineConfig, PipelineConfigError, DEFAULT_CONCURRENCY, DEFAULT_QUEUE_CEILING,
};
pub use error::{AssetFailure, PipelineError, PipelineResult};
pub use state::{
    AssetMap, AssetOrigin, PersistedAsset, PipelineOutcome, PipelineProgress, PipelineState,
};
pub use worker::{AssetPipeline, AssetPipelineBuilder, ProgressCallback};
