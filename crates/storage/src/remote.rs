//! Remote asset mirror lookups
//!
//! The only network call the import path makes: before saving an asset
//! locally, ask the mirror whether it already holds the same content.
//! A hit means the local save is skipped and the remote copy is referenced.

use std::collections::HashSet;

use keepsake_core::{RemoteAssetIndex, StoreResult};
use parking_lot::RwLock;

/// Fixed set of known double-hashed content hashes.
///
/// Used when the mirror's inventory is already known (offline sync,
/// tests).
#[derive(Debug, Default)]
pub struct StaticRemoteIndex {
    known: RwLock<HashSet<String>>,
}

impl StaticRemoteIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the mirror holds `double_hash`.
    pub fn insert(&self, double_hash: impl Into<String>) {
        self.known.write().insert(double_hash.into());
    }
}

impl RemoteAssetIndex for StaticRemoteIndex {
    fn contains(&self, double_hash: &str) -> StoreResult<bool> {
        Ok(self.known.read().contains(double_hash))
    }
}

#[cfg(feature = "remote")]
pub use http::HttpRemoteIndex;

#[cfg(feature = "remote")]
mod http {
    use std::time::Duration;

    use keepsake_core::{RemoteAssetIndex, StoreError, StoreResult};
    use tracing::debug;

    /// `GET {base}/assets/{double_hash}` against a mirror; any 2xx is a hit.
    pub struct HttpRemoteIndex {
        base_url: String,
        agent: ureq::Agent,
    }

    impl HttpRemoteIndex {
        /// Create an index for the mirror at `base_url`.
        pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
            let base_url = base_url.into().trim_end_matches('/').to_string();
            let agent = ureq::AgentBuilder::new().timeout(timeout).build();
            HttpRemoteIndex { base_url, agent }
        }

        /// Lookup URL for a double-hashed content hash.
        pub fn url_for(&self, double_hash: &str) -> String {
            format!("{}/assets/{}", self.base_url, double_hash)
        }
    }

    impl RemoteAssetIndex for HttpRemoteIndex {
        fn contains(&self, double_hash: &str) -> StoreResult<bool> {
            let url = self.url_for(double_hash);
            match self.agent.get(&url).call() {
                Ok(response) => {
                    let status = response.status();
                    debug!(target: "keepsake::remote", %url, status, "Remote asset lookup");
                    Ok((200..300).contains(&status))
                }
                Err(ureq::Error::Status(status, _)) => {
                    debug!(target: "keepsake::remote", %url, status, "Remote asset miss");
                    Ok(false)
                }
                Err(e) => Err(StoreError::backend(format!("remote lookup failed: {}", e))),
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_index() {
        let index = StaticRemoteIndex::new();
        assert!(!index.contains("abc").unwrap());
        index.insert("abc");
        assert!(index.contains("abc").unwrap());
    }
}
