//! Pipeline bookkeeping
//!
//! Counters and results live together behind one lock so that the
//! completion predicate is evaluated atomically with every mutation:
//!
//! ```text
//! fires once  <=>  is_finalized && total_completed >= total_enqueued
//! ```
//!
//! Both the finalize call and each asset completion re-check the predicate,
//! so completion fires whichever of the two happens last.

use std::collections::BTreeMap;

use keepsake_core::AssetId;
use serde::{Deserialize, Serialize};

use super::error::{AssetFailure, PipelineError};

/// How an asset ended up referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetOrigin {
    /// Written to the local store
    Stored,
    /// Hash recorded, nothing written
    Hashed,
    /// Already held by the remote mirror
    Remote,
}

/// A successfully processed asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAsset {
    /// Store id (content hash)
    pub id: AssetId,
    /// Where the asset is referenced from
    pub origin: AssetOrigin,
    /// Asset size in bytes
    pub size: u64,
}

/// Entry name to persisted asset.
pub type AssetMap = BTreeMap<String, PersistedAsset>;

/// Outcome delivered through the completion signal.
pub type PipelineOutcome = Result<AssetMap, PipelineError>;

/// Snapshot of pipeline progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineProgress {
    /// Assets accepted so far
    pub enqueued: u64,
    /// Assets finished (success or failure)
    pub completed: u64,
    /// Assets that failed
    pub failed: u64,
    /// Whether the feeder has finished
    pub finalized: bool,
}

impl PipelineProgress {
    /// Completion percentage in `[0, 100]`.
    ///
    /// An empty pipeline reports 0 until finalized, then 100.
    pub fn percent(&self) -> f64 {
        if self.enqueued == 0 {
            return if self.finalized { 100.0 } else { 0.0 };
        }
        (self.completed as f64 / self.enqueued as f64) * 100.0
    }
}

/// Mutable pipeline state.
#[derive(Debug, Default)]
pub struct PipelineState {
    total_enqueued: u64,
    total_completed: u64,
    is_finalized: bool,
    completion_fired: bool,
    errors: Vec<AssetFailure>,
    assets: AssetMap,
}

impl PipelineState {
    /// Fresh state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more accepted asset.
    pub fn record_enqueued(&mut self) {
        self.total_enqueued += 1;
    }

    /// Record a successful asset.
    pub fn record_success(&mut self, name: String, asset: PersistedAsset) {
        self.assets.insert(name, asset);
        self.total_completed += 1;
    }

    /// Record a failed asset.
    pub fn record_failure(&mut self, failure: AssetFailure) {
        self.errors.push(failure);
        self.total_completed += 1;
    }

    /// Count assets that were discarded without running (abort path).
    pub fn record_discarded(&mut self, count: u64) {
        self.total_completed += count;
    }

    /// Mark the feeder finished. Returns false if already finalized.
    pub fn finalize(&mut self) -> bool {
        let first = !self.is_finalized;
        self.is_finalized = true;
        first
    }

    /// Whether `finalize` has been called.
    pub fn is_finalized(&self) -> bool {
        self.is_finalized
    }

    /// Whether the completion outcome has been taken.
    pub fn completion_fired(&self) -> bool {
        self.completion_fired
    }

    /// Assets enqueued but not yet completed.
    pub fn in_flight(&self) -> u64 {
        self.total_enqueued - self.total_completed
    }

    /// Current progress snapshot.
    pub fn progress(&self) -> PipelineProgress {
        PipelineProgress {
            enqueued: self.total_enqueued,
            completed: self.total_completed,
            failed: self.errors.len() as u64,
            finalized: self.is_finalized,
        }
    }

    /// Take the outcome if the completion predicate holds and it has not
    /// fired yet. Returns `Some` at most once over the state's lifetime.
    pub fn take_outcome(&mut self) -> Option<PipelineOutcome> {
        if self.completion_fired
            || !self.is_finalized
            || self.total_completed < self.total_enqueued
        {
            return None;
        }
        self.completion_fired = true;

        let assets = std::mem::take(&mut self.assets);
        if self.errors.is_empty() {
            Some(Ok(assets))
        } else {
            Some(Err(PipelineError::AssetsFailed {
                failures: std::mem::take(&mut self.errors),
                persisted: assets,
            }))
        }
    }

    /// Take the abort outcome unless completion already fired.
    pub fn take_abort(&mut self) -> Option<PipelineOutcome> {
        if self.completion_fired {
            return None;
        }
        self.completion_fired = true;
        Some(Err(PipelineError::Aborted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepsake_core::StoreError;

    fn asset(id: &str) -> PersistedAsset {
        PersistedAsset {
            id: AssetId::new(id),
            origin: AssetOrigin::Stored,
            size: 1,
        }
    }

    #[test]
    fn test_empty_pipeline_completes_on_finalize() {
        let mut state = PipelineState::new();
        assert!(state.take_outcome().is_none());
        assert!(state.finalize());
        let outcome = state.take_outcome().unwrap();
        assert!(outcome.unwrap().is_empty());
    }

    #[test]
    fn test_finalize_before_last_completion() {
        let mut state = PipelineState::new();
        state.record_enqueued();
        state.record_enqueued();
        state.record_success("a".into(), asset("1"));

        state.finalize();
        assert!(state.take_outcome().is_none());

        state.record_success("b".into(), asset("2"));
        let map = state.take_outcome().unwrap().unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_last_completion_before_finalize() {
        let mut state = PipelineState::new();
        state.record_enqueued();
        state.record_success("a".into(), asset("1"));
        assert!(state.take_outcome().is_none());

        state.finalize();
        let map = state.take_outcome().unwrap().unwrap();
        assert!(map.contains_key("a"));
    }

    #[test]
    fn test_outcome_fires_once() {
        let mut state = PipelineState::new();
        state.finalize();
        assert!(state.take_outcome().is_some());
        assert!(state.take_outcome().is_none());
        assert!(state.take_abort().is_none());
    }

    #[test]
    fn test_failures_aggregate_with_persisted() {
        let mut state = PipelineState::new();
        for _ in 0..3 {
            state.record_enqueued();
        }
        state.record_success("a".into(), asset("1"));
        state.record_failure(AssetFailure::new("b", StoreError::backend("x")));
        state.record_success("c".into(), asset("3"));
        state.finalize();

        match state.take_outcome().unwrap() {
            Err(PipelineError::AssetsFailed { failures, persisted }) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].name, "b");
                assert_eq!(persisted.len(), 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_double_finalize() {
        let mut state = PipelineState::new();
        assert!(state.finalize());
        assert!(!state.finalize());
    }

    #[test]
    fn test_progress_percent() {
        let mut state = PipelineState::new();
        assert_eq!(state.progress().percent(), 0.0);
        state.record_enqueued();
        state.record_enqueued();
        state.record_success("a".into(), asset("1"));
        assert_eq!(state.progress().percent(), 50.0);
        assert_eq!(state.in_flight(), 1);
    }
}
