//! Asset store capability
//!
//! Assets are binary media blobs referenced by content-addressed ids. The
//! core never builds storage paths itself; it talks to an [`AssetStore`]
//! implementation and only deals in ids and hashes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Stable identifier returned by [`AssetStore::save`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Wrap an identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        AssetId(id.into())
    }

    /// Borrow the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the identifier string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex-encoded SHA-256 of an asset's bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash raw bytes.
    pub fn of(bytes: &[u8]) -> Self {
        ContentHash(sha256_hex(bytes))
    }

    /// Wrap an already-computed hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        ContentHash(hex.into())
    }

    /// Borrow the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hash of the hex digest itself, used as the key for remote lookups.
    pub fn double_hashed(&self) -> String {
        sha256_hex(self.0.as_bytes())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Asset store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Asset or key not present
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Key cannot be mapped to storage
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Stored bytes do not match their content address
    #[error("Integrity error for {id}: stored content hashes to {actual}")]
    Integrity {
        /// Asset id that was read
        id: String,
        /// Hash of the bytes actually found
        actual: String,
    },

    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        StoreError::Backend(msg.into())
    }
}

/// Result type for asset store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Content-addressed asset persistence.
///
/// # Thread Safety
///
/// Stores are shared by every pipeline worker, so implementations must be
/// `Send + Sync` and tolerate concurrent `save` calls, including concurrent
/// saves of identical content.
pub trait AssetStore: Send + Sync {
    /// Persist bytes and return their content-addressed id.
    fn save(&self, bytes: &[u8]) -> StoreResult<AssetId>;

    /// Compute the content hash without persisting anything.
    fn hash(&self, bytes: &[u8]) -> StoreResult<ContentHash> {
        Ok(ContentHash::of(bytes))
    }

    /// Load previously saved bytes.
    fn load(&self, id: &AssetId) -> StoreResult<Vec<u8>>;

    /// Persist bytes under an explicit storage key (full-state backups).
    fn put(&self, key: &str, bytes: &[u8]) -> StoreResult<()>;

    /// Load bytes stored under a key.
    fn get(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// Every key written through [`AssetStore::put`], in sorted order.
    fn keys(&self) -> StoreResult<Vec<String>>;
}

/// Read-only lookup against a remote asset mirror.
pub trait RemoteAssetIndex: Send + Sync {
    /// Whether the mirror holds an asset with the given double-hashed content hash.
    fn contains(&self, double_hash: &str) -> StoreResult<bool>;
}
