//! Filesystem asset store
//!
//! Layout under the store root:
//!
//! ```text
//! root/
//! ├── objects/ab/abcdef...   content-addressed blobs (sha256, 2-char shards)
//! └── keys/assets/x.png      keyed blobs written by full-state restores
//! ```
//!
//! All writes go through temp file + fsync + rename, so concurrent saves of
//! the same content race harmlessly: whichever rename lands last leaves
//! identical bytes behind.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use keepsake_core::{AssetId, AssetStore, ContentHash, StoreError, StoreResult};
use tracing::{debug, trace};

use crate::sink::{sync_parent, temp_path_for};

const OBJECTS_DIR: &str = "objects";
const KEYS_DIR: &str = "keys";

/// Content-addressed store rooted at a directory
#[derive(Debug, Clone)]
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    /// Open (creating if needed) a store at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(OBJECTS_DIR))?;
        fs::create_dir_all(root.join(KEYS_DIR))?;
        debug!(target: "keepsake::store", root = %root.display(), "Opened filesystem asset store");
        Ok(FsAssetStore { root })
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the blob for a content-addressed id.
    pub fn object_path(&self, id: &AssetId) -> StoreResult<PathBuf> {
        let hex = id.as_str();
        if hex.len() < 3 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidKey(hex.to_string()));
        }
        Ok(self.root.join(OBJECTS_DIR).join(&hex[..2]).join(hex))
    }

    /// Path of the blob for a storage key.
    ///
    /// Keys are `/`-separated relative paths; absolute paths and `..`
    /// components are rejected.
    pub fn key_path(&self, key: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(key);
        let mut path = self.root.join(KEYS_DIR);
        let mut depth = 0;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                _ => return Err(StoreError::InvalidKey(key.to_string())),
            }
        }
        if depth == 0 {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(path)
    }

    /// Number of content-addressed objects on disk.
    pub fn object_count(&self) -> StoreResult<usize> {
        let mut count = 0;
        for shard in fs::read_dir(self.root.join(OBJECTS_DIR))? {
            let shard = shard?;
            if shard.file_type()?.is_dir() {
                count += fs::read_dir(shard.path())?
                    .filter_map(|e| e.ok())
                    .filter(|e| !is_temp(&e.path()))
                    .count();
            }
        }
        Ok(count)
    }
}

fn is_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(".tmp"))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = temp_path_for(path);
    let result = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)?;
        sync_parent(path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn collect_keys(dir: &Path, prefix: &str, out: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if is_temp(&path) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let key = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        if entry.file_type()?.is_dir() {
            collect_keys(&path, &key, out)?;
        } else {
            out.push(key);
        }
    }
    Ok(())
}

impl AssetStore for FsAssetStore {
    fn save(&self, bytes: &[u8]) -> StoreResult<AssetId> {
        let id = AssetId::new(ContentHash::of(bytes).as_str());
        let path = self.object_path(&id)?;
        if path.exists() {
            trace!(target: "keepsake::store", id = %id, "Asset already present");
            return Ok(id);
        }
        write_atomic(&path, bytes)?;
        trace!(target: "keepsake::store", id = %id, size = bytes.len(), "Saved asset");
        Ok(id)
    }

    fn load(&self, id: &AssetId) -> StoreResult<Vec<u8>> {
        let path = self.object_path(id)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let actual = ContentHash::of(&bytes);
        if actual.as_str() != id.as_str() {
            return Err(StoreError::Integrity {
                id: id.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(bytes)
    }

    fn put(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        let path = self.key_path(key)?;
        write_atomic(&path, bytes)?;
        trace!(target: "keepsake::store", key, size = bytes.len(), "Stored keyed asset");
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.key_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        collect_keys(&self.root.join(KEYS_DIR), "", &mut keys)?;
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsAssetStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = FsAssetStore::open(temp_dir.path().join("assets")).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_save_is_content_addressed() {
        let (_dir, store) = store();
        let a = store.save(b"png bytes").unwrap();
        let b = store.save(b"png bytes").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), ContentHash::of(b"png bytes").as_str());
        assert_eq!(store.object_count().unwrap(), 1);
        assert_eq!(store.load(&a).unwrap(), b"png bytes");
    }

    #[test]
    fn test_load_missing() {
        let (_dir, store) = store();
        let id = AssetId::new(ContentHash::of(b"nothing").as_str());
        assert!(matches!(store.load(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_load_detects_tampering() {
        let (_dir, store) = store();
        let id = store.save(b"original").unwrap();
        fs::write(store.object_path(&id).unwrap(), b"tampered").unwrap();
        assert!(matches!(store.load(&id), Err(StoreError::Integrity { .. })));
    }

    #[test]
    fn test_invalid_object_id() {
        let (_dir, store) = store();
        assert!(matches!(
            store.load(&AssetId::new("../etc")),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_keyed_round_trip_and_listing() {
        let (_dir, store) = store();
        store.put("assets/b.png", b"B").unwrap();
        store.put("assets/a.png", b"A").unwrap();
        store.put("root.bin", b"R").unwrap();

        assert_eq!(store.get("assets/a.png").unwrap(), b"A");
        assert_eq!(
            store.keys().unwrap(),
            vec!["assets/a.png", "assets/b.png", "root.bin"]
        );

        store.put("assets/a.png", b"A2").unwrap();
        assert_eq!(store.get("assets/a.png").unwrap(), b"A2");
    }

    #[test]
    fn test_key_traversal_rejected() {
        let (_dir, store) = store();
        assert!(matches!(
            store.put("../escape", b"x"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(store.put("/abs", b"x"), Err(StoreError::InvalidKey(_))));
        assert!(matches!(store.put("", b"x"), Err(StoreError::InvalidKey(_))));
        assert!(matches!(store.get("missing"), Err(StoreError::NotFound(_))));
    }

    /// Records the target of every event it sees.
    struct TargetRecorder(std::sync::Arc<parking_lot::Mutex<Vec<String>>>);

    impl tracing::Subscriber for TargetRecorder {
        fn register_callsite(
            &self,
            _: &'static tracing::Metadata<'static>,
        ) -> tracing::subscriber::Interest {
            tracing::subscriber::Interest::sometimes()
        }
        fn enabled(&self, _: &tracing::Metadata<'_>) -> bool {
            true
        }
        fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
            tracing::span::Id::from_u64(1)
        }
        fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}
        fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}
        fn event(&self, event: &tracing::Event<'_>) {
            self.0.lock().push(event.metadata().target().to_string());
        }
        fn enter(&self, _: &tracing::span::Id) {}
        fn exit(&self, _: &tracing::span::Id) {}
    }

    #[test]
    fn test_store_events_use_store_target() {
        let targets = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let recorder = TargetRecorder(std::sync::Arc::clone(&targets));

        tracing::subscriber::with_default(recorder, || {
            let (_dir, store) = store();
            store.save(b"a").unwrap();
            store.save(b"a").unwrap();
            store.put("user/avatar.png", b"b").unwrap();
        });

        let targets = targets.lock();
        assert!(targets.iter().any(|t| t == "keepsake::store"));
        assert!(
            targets.iter().all(|t| t.starts_with("keepsake::")),
            "{:?}",
            *targets
        );
    }
}
