//! Chunked backup writer

use keepsake_core::AssetStore;
use keepsake_storage::EntrySink;
use tracing::{debug, info};

use super::error::{BackupError, BackupResult};
use super::format::{encode_record_header, STATE_RECORD_NAME};

/// Streams records to an [`EntrySink`].
///
/// A sink failure poisons the writer.
pub struct BackupWriter<S: EntrySink> {
    sink: S,
    records: u64,
    state_written: bool,
    poisoned: bool,
}

impl<S: EntrySink> BackupWriter<S> {
    /// Start a backup on `sink`.
    pub fn new(sink: S) -> Self {
        BackupWriter {
            sink,
            records: 0,
            state_written: false,
            poisoned: false,
        }
    }

    /// Append an asset record.
    pub fn write_record(&mut self, name: &str, data: &[u8]) -> BackupResult<()> {
        if name.is_empty() {
            return Err(BackupError::EmptyName);
        }
        if name == STATE_RECORD_NAME {
            return Err(BackupError::ReservedName(name.to_string()));
        }
        self.emit(name, data)
    }

    /// Append the state record. Exactly one is allowed.
    pub fn write_state(&mut self, state: &[u8]) -> BackupResult<()> {
        if self.state_written {
            return Err(BackupError::DuplicateState);
        }
        self.emit(STATE_RECORD_NAME, state)?;
        self.state_written = true;
        Ok(())
    }

    /// Append one record per keyed entry of `store`, in key order.
    ///
    /// Returns the number of records written.
    pub fn write_store(&mut self, store: &dyn AssetStore) -> BackupResult<u64> {
        let mut written = 0;
        for key in store.keys()? {
            let data = store.get(&key)?;
            self.write_record(&key, &data)?;
            written += 1;
        }
        debug!(target: "keepsake::backup", records = written, "Store exported to backup");
        Ok(written)
    }

    /// Number of records written.
    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Close the sink and return it. Fails if no state record was written.
    pub fn finish(mut self) -> BackupResult<S> {
        if self.poisoned {
            return Err(BackupError::Poisoned);
        }
        if !self.state_written {
            return Err(BackupError::MissingState);
        }
        self.sink.close()?;
        info!(
            target: "keepsake::backup",
            records = self.records,
            bytes = self.sink.bytes_written(),
            "Backup written"
        );
        Ok(self.sink)
    }

    fn emit(&mut self, name: &str, data: &[u8]) -> BackupResult<()> {
        if self.poisoned {
            return Err(BackupError::Poisoned);
        }
        let header = encode_record_header(name, data.len() as u64)?;
        let written = self
            .sink
            .write_chunk(&header)
            .and_then(|()| self.sink.write_chunk(data));
        if let Err(e) = written {
            self.poisoned = true;
            return Err(e.into());
        }
        self.records += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepsake_storage::{MemoryAssetStore, MemorySink};

    #[test]
    fn test_record_bytes() {
        let mut writer = BackupWriter::new(MemorySink::new());
        writer.write_record("a", b"A").unwrap();
        writer.write_state(b"{}").unwrap();
        let bytes = writer.finish().unwrap().into_bytes();

        let mut expected = vec![1, 0, 0, 0, b'a', 1, 0, 0, 0, b'A'];
        expected.extend_from_slice(&[8, 0, 0, 0]);
        expected.extend_from_slice(b"database");
        expected.extend_from_slice(&[2, 0, 0, 0, b'{', b'}']);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_state_required_and_unique() {
        let mut writer = BackupWriter::new(MemorySink::new());
        writer.write_record("a", b"1").unwrap();
        assert!(matches!(
            BackupWriter::new(MemorySink::new()).finish(),
            Err(BackupError::MissingState)
        ));
        writer.write_state(b"{}").unwrap();
        assert!(matches!(writer.write_state(b"{}"), Err(BackupError::DuplicateState)));
    }

    #[test]
    fn test_reserved_and_empty_names() {
        let mut writer = BackupWriter::new(MemorySink::new());
        assert!(matches!(
            writer.write_record("database", b"x"),
            Err(BackupError::ReservedName(_))
        ));
        assert!(matches!(writer.write_record("", b"x"), Err(BackupError::EmptyName)));
        assert_eq!(writer.records_written(), 0);
    }

    #[test]
    fn test_write_store() {
        let store = MemoryAssetStore::new();
        store.put("user/avatar.png", b"png").unwrap();
        store.put("chats/a.jsonl", b"{}").unwrap();

        let mut writer = BackupWriter::new(MemorySink::new());
        assert_eq!(writer.write_store(&store).unwrap(), 2);
        writer.write_state(b"{}").unwrap();
        assert_eq!(writer.records_written(), 3);
    }
}
