//! Asset pipeline configuration.

/// Default number of concurrent asset saves.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default ceiling on enqueued-but-unfinished assets before the feeder blocks.
pub const DEFAULT_QUEUE_CEILING: usize = 30;

/// What a worker does with each asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// Save through the asset store (content-addressed write)
    #[default]
    Store,
    /// Only compute and record the content hash
    HashOnly,
}

/// Asset pipeline configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of worker threads, i.e. concurrent saves (default: 10).
    pub concurrency: usize,

    /// Maximum enqueued-but-unfinished assets (default: 30).
    ///
    /// `enqueue` blocks while this many assets are queued or running.
    pub queue_ceiling: usize,

    /// Persistence mode (default: `Store`).
    pub mode: PersistMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            concurrency: DEFAULT_CONCURRENCY,
            queue_ceiling: DEFAULT_QUEUE_CEILING,
            mode: PersistMode::Store,
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Small pool and queue so tests hit backpressure quickly.
    pub fn for_testing() -> Self {
        PipelineConfig {
            concurrency: 2,
            queue_ceiling: 4,
            mode: PersistMode::Store,
        }
    }

    /// Set worker count (builder pattern).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set queue ceiling (builder pattern).
    pub fn with_queue_ceiling(mut self, ceiling: usize) -> Self {
        self.queue_ceiling = ceiling;
        self
    }

    /// Set persistence mode (builder pattern).
    pub fn with_mode(mut self, mode: PersistMode) -> Self {
        self.mode = mode;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), PipelineConfigError> {
        if self.concurrency == 0 {
            return Err(PipelineConfigError::NoWorkers);
        }
        if self.queue_ceiling < self.concurrency {
            return Err(PipelineConfigError::CeilingBelowConcurrency {
                ceiling: self.queue_ceiling,
                concurrency: self.concurrency,
            });
        }
        Ok(())
    }
}

/// Pipeline configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineConfigError {
    /// At least one worker is required.
    #[error("Pipeline concurrency must be at least 1")]
    NoWorkers,

    /// A ceiling below the worker count would leave workers idle.
    #[error("Queue ceiling {ceiling} is below concurrency {concurrency}")]
    CeilingBelowConcurrency {
        /// Configured ceiling
        ceiling: usize,
        /// Configured worker count
        concurrency: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.queue_ceiling, 30);
        assert_eq!(config.mode, PersistMode::Store);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = PipelineConfig::new()
            .with_concurrency(4)
            .with_queue_ceiling(8)
            .with_mode(PersistMode::HashOnly);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.queue_ceiling, 8);
        assert_eq!(config.mode, PersistMode::HashOnly);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = PipelineConfig::default().with_concurrency(0);
        assert_eq!(config.validate(), Err(PipelineConfigError::NoWorkers));
    }

    #[test]
    fn test_validate_rejects_low_ceiling() {
        let config = PipelineConfig::default().with_queue_ceiling(3);
        assert!(matches!(
            config.validate(),
            Err(PipelineConfigError::CeilingBelowConcurrency { .. })
        ));
    }

    #[test]
    fn test_for_testing_is_valid() {
        assert!(PipelineConfig::for_testing().validate().is_ok());
    }
}
