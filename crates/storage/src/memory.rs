//! In-memory asset store
//!
//! Backs ephemeral sessions and tests. Besides plain storage it can
//! simulate a slow or failing backend:
//!
//! - `with_latency`: every save sleeps, making concurrent saves overlap
//! - `fail_when`: saves whose bytes match a predicate fail
//!
//! and it records the peak number of concurrent saves it has observed.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use keepsake_core::{AssetId, AssetStore, ContentHash, StoreError, StoreResult};
use parking_lot::RwLock;

type FaultPredicate = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// In-memory content-addressed store
#[derive(Default)]
pub struct MemoryAssetStore {
    objects: RwLock<HashMap<AssetId, Vec<u8>>>,
    keyed: RwLock<BTreeMap<String, Vec<u8>>>,
    latency: Option<Duration>,
    fault: Option<FaultPredicate>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    saves: AtomicUsize,
}

impl MemoryAssetStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `latency` inside every `save` and `put`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every `save`/`put` whose bytes satisfy `predicate`.
    pub fn fail_when(mut self, predicate: impl Fn(&[u8]) -> bool + Send + Sync + 'static) -> Self {
        self.fault = Some(Box::new(predicate));
        self
    }

    /// Number of content-addressed objects held.
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Number of completed `save` calls (including duplicates).
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Acquire)
    }

    /// Highest number of saves observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::Acquire)
    }

    fn write_guarded<T>(&self, bytes: &[u8], op: impl FnOnce() -> T) -> StoreResult<T> {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::AcqRel);

        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        let result = match &self.fault {
            Some(fault) if fault(bytes) => Err(StoreError::backend("injected write failure")),
            _ => Ok(op()),
        };

        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        result
    }
}

impl AssetStore for MemoryAssetStore {
    fn save(&self, bytes: &[u8]) -> StoreResult<AssetId> {
        let id = AssetId::new(ContentHash::of(bytes).as_str());
        self.write_guarded(bytes, || {
            self.objects
                .write()
                .entry(id.clone())
                .or_insert_with(|| bytes.to_vec());
        })?;
        self.saves.fetch_add(1, Ordering::AcqRel);
        Ok(id)
    }

    fn load(&self, id: &AssetId) -> StoreResult<Vec<u8>> {
        self.objects
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        self.write_guarded(bytes, || {
            self.keyed.write().insert(key.to_string(), bytes.to_vec());
        })
    }

    fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.keyed
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.keyed.read().keys().cloned().collect())
    }
}
