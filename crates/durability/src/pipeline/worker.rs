//! Bounded worker pool that persists assets while a container is decoded.
//!
//! `concurrency` workers pull assets off a FIFO queue. The feeder blocks in
//! `enqueue` while `queue_ceiling` assets are queued or running, so a fast
//! decoder cannot buffer an unbounded number of assets in memory.
//!
//! Lifecycle: `enqueue`* then `finalize`, then the completion resolves once
//! every enqueued asset has finished. Dropping the pipeline without
//! finalizing discards queued assets, lets running saves finish, and
//! resolves the completion with `PipelineError::Aborted`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

use keepsake_core::{AssetId, AssetStore, RemoteAssetIndex, StoreError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use super::completion::Completion;
use super::config::{PersistMode, PipelineConfig};
use super::error::{AssetFailure, PipelineError, PipelineResult};
use super::state::{AssetOrigin, PersistedAsset, PipelineOutcome, PipelineProgress, PipelineState};

/// Callback invoked after each asset finishes.
pub type ProgressCallback = Arc<dyn Fn(PipelineProgress) + Send + Sync>;

struct Job {
    name: String,
    bytes: Vec<u8>,
}

struct Inner {
    state: PipelineState,
    queue: VecDeque<Job>,
    shutdown: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    work_ready: Condvar,
    capacity_ready: Condvar,
    store: Arc<dyn AssetStore>,
    remote: Option<Arc<dyn RemoteAssetIndex>>,
    config: PipelineConfig,
    completion: Completion,
    progress: Option<ProgressCallback>,
}

/// Builder for [`AssetPipeline`].
pub struct AssetPipelineBuilder {
    store: Arc<dyn AssetStore>,
    config: PipelineConfig,
    remote: Option<Arc<dyn RemoteAssetIndex>>,
    progress: Option<ProgressCallback>,
}

impl AssetPipelineBuilder {
    /// Use `config` instead of the defaults.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Consult `remote` before saving each asset (store mode only).
    pub fn remote_index(mut self, remote: Arc<dyn RemoteAssetIndex>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Invoke `callback` after each asset finishes.
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Validate the configuration and start the workers.
    pub fn spawn(self) -> PipelineResult<AssetPipeline> {
        self.config.validate()?;

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: PipelineState::new(),
                queue: VecDeque::new(),
                shutdown: false,
            }),
            work_ready: Condvar::new(),
            capacity_ready: Condvar::new(),
            store: self.store,
            remote: self.remote,
            config: self.config,
            completion: Completion::new(),
            progress: self.progress,
        });

        let mut workers = Vec::with_capacity(shared.config.concurrency);
        for i in 0..shared.config.concurrency {
            let worker_shared = Arc::clone(&shared);
            let spawned = std::thread::Builder::new()
                .name(format!("keepsake-asset-{}", i))
                .spawn(move || worker_loop(&worker_shared));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Release the workers that did start.
                    abort(&shared);
                    return Err(PipelineError::Spawn(e.to_string()));
                }
            }
        }

        debug!(
            target: "keepsake::pipeline",
            concurrency = shared.config.concurrency,
            queue_ceiling = shared.config.queue_ceiling,
            mode = ?shared.config.mode,
            "Asset pipeline started"
        );

        Ok(AssetPipeline { shared, workers })
    }
}

/// Concurrency-limited asset persistence.
pub struct AssetPipeline {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl AssetPipeline {
    /// Start a pipeline with `config` over `store`.
    pub fn new(store: Arc<dyn AssetStore>, config: PipelineConfig) -> PipelineResult<Self> {
        Self::builder(store).config(config).spawn()
    }

    /// Builder with default configuration.
    pub fn builder(store: Arc<dyn AssetStore>) -> AssetPipelineBuilder {
        AssetPipelineBuilder {
            store,
            config: PipelineConfig::default(),
            remote: None,
            progress: None,
        }
    }

    /// Queue one asset, blocking while the queue ceiling is reached.
    ///
    /// Store failures never surface here; they are aggregated into the
    /// completion outcome.
    pub fn enqueue(&self, name: impl Into<String>, bytes: Vec<u8>) -> PipelineResult<()> {
        let name = name.into();
        let ceiling = self.shared.config.queue_ceiling as u64;

        let mut inner = self.shared.inner.lock();
        if inner.state.is_finalized() || inner.shutdown {
            return Err(PipelineError::Closed);
        }
        while inner.state.in_flight() >= ceiling {
            self.shared.capacity_ready.wait(&mut inner);
            if inner.shutdown {
                return Err(PipelineError::Closed);
            }
        }

        inner.state.record_enqueued();
        inner.queue.push_back(Job { name, bytes });
        self.shared.work_ready.notify_one();
        Ok(())
    }

    /// Mark the feeder finished. Idempotent.
    ///
    /// If every enqueued asset has already completed, the completion
    /// resolves here; otherwise the last worker to finish resolves it.
    pub fn finalize(&self) {
        let outcome = {
            let mut inner = self.shared.inner.lock();
            if !inner.state.finalize() {
                return;
            }
            // Idle workers re-check their exit condition.
            self.shared.work_ready.notify_all();
            inner.state.take_outcome()
        };
        if let Some(outcome) = outcome {
            self.shared.completion.resolve(outcome);
        }
    }

    /// Handle to the outcome.
    pub fn completion(&self) -> Completion {
        self.shared.completion.clone()
    }

    /// Finalize, wait for the outcome, and join the workers.
    pub fn wait(mut self) -> PipelineOutcome {
        self.finalize();
        let outcome = self.shared.completion.wait();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        outcome
    }

    /// Current progress.
    pub fn progress(&self) -> PipelineProgress {
        self.shared.inner.lock().state.progress()
    }

    /// Whether `finalize` has been called.
    pub fn is_finalized(&self) -> bool {
        self.shared.inner.lock().state.is_finalized()
    }

    /// Active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }
}

impl Drop for AssetPipeline {
    fn drop(&mut self) {
        let finalized = self.shared.inner.lock().state.is_finalized();
        if !finalized {
            abort(&self.shared);
        }
        // Workers are detached: running saves finish on their own.
    }
}

impl std::fmt::Debug for AssetPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetPipeline")
            .field("config", &self.shared.config)
            .field("progress", &self.progress())
            .finish()
    }
}

fn abort(shared: &Shared) {
    let outcome = {
        let mut inner = shared.inner.lock();
        inner.shutdown = true;
        let discarded = inner.queue.len() as u64;
        inner.queue.clear();
        inner.state.record_discarded(discarded);
        if discarded > 0 {
            warn!(
                target: "keepsake::pipeline",
                discarded,
                "Asset pipeline dropped before finalize"
            );
        }
        shared.work_ready.notify_all();
        shared.capacity_ready.notify_all();
        inner.state.take_abort()
    };
    if let Some(outcome) = outcome {
        shared.completion.resolve(outcome);
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut inner = shared.inner.lock();
            loop {
                if inner.shutdown {
                    return;
                }
                if let Some(job) = inner.queue.pop_front() {
                    break job;
                }
                // Nothing can be enqueued after finalize.
                if inner.state.is_finalized() {
                    return;
                }
                shared.work_ready.wait(&mut inner);
            }
        };

        let size = job.bytes.len() as u64;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            persist(shared, &job.bytes)
        }))
        .unwrap_or_else(|e| {
            let msg = e
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("(non-string panic)");
            error!(target: "keepsake::pipeline", name = %job.name, "Asset save panicked: {}", msg);
            Err(StoreError::backend(format!("asset save panicked: {}", msg)))
        });

        let (outcome, progress) = {
            let mut inner = shared.inner.lock();
            match result {
                Ok((id, origin)) => {
                    inner
                        .state
                        .record_success(job.name, PersistedAsset { id, origin, size });
                }
                Err(e) => {
                    warn!(target: "keepsake::pipeline", name = %job.name, error = %e, "Asset failed to persist");
                    inner.state.record_failure(AssetFailure::new(job.name, e));
                }
            }
            shared.capacity_ready.notify_all();
            (inner.state.take_outcome(), inner.state.progress())
        };

        if let Some(callback) = &shared.progress {
            callback(progress);
        }
        if let Some(outcome) = outcome {
            shared.completion.resolve(outcome);
        }
    }
}

fn persist(shared: &Shared, bytes: &[u8]) -> Result<(AssetId, AssetOrigin), StoreError> {
    match shared.config.mode {
        PersistMode::HashOnly => {
            let hash = shared.store.hash(bytes)?;
            Ok((AssetId::new(hash.as_str()), AssetOrigin::Hashed))
        }
        PersistMode::Store => {
            if let Some(remote) = &shared.remote {
                let hash = shared.store.hash(bytes)?;
                match remote.contains(&hash.double_hashed()) {
                    Ok(true) => return Ok((AssetId::new(hash.as_str()), AssetOrigin::Remote)),
                    Ok(false) => {}
                    // The mirror is an optimization; fall back to a local save.
                    Err(e) => {
                        warn!(target: "keepsake::pipeline", error = %e, "Remote index lookup failed")
                    }
                }
            }
            let id = shared.store.save(bytes)?;
            Ok((id, AssetOrigin::Stored))
        }
    }
}
