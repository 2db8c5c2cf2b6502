//! Chunk-boundary independent backup decoder
//!
//! Bytes accumulate in a growing buffer; a record is emitted only once its
//! whole `name_len | name | data_len | data` span has arrived, after which
//! the read offset slides past it. Consumed bytes are compacted away once
//! they make up more than half the buffer.

use byteorder::{ByteOrder, LittleEndian};
use tracing::trace;

use super::error::{BackupError, BackupResult};
use super::format::{BackupRecord, LEN_PREFIX_BYTES};

/// Push-based record decoder
#[derive(Debug)]
pub struct BackupDecoder {
    buf: Vec<u8>,
    start: usize,
    records: u64,
    bytes_in: u64,
    max_record_bytes: u32,
}

impl Default for BackupDecoder {
    fn default() -> Self {
        BackupDecoder {
            buf: Vec::new(),
            start: 0,
            records: 0,
            bytes_in: 0,
            max_record_bytes: u32::MAX,
        }
    }
}

impl BackupDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject records whose declared name or data length exceeds `max`.
    pub fn with_max_record_bytes(mut self, max: u32) -> Self {
        self.max_record_bytes = max;
        self
    }

    /// Feed the next chunk; returns every record it completed.
    pub fn push(&mut self, chunk: &[u8]) -> BackupResult<Vec<BackupRecord>> {
        self.compact();
        self.buf.extend_from_slice(chunk);
        self.bytes_in += chunk.len() as u64;

        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            trace!(target: "keepsake::backup", record = %record.name, size = record.data.len(), "Record decoded");
            records.push(record);
        }
        self.records += records.len() as u64;
        Ok(records)
    }

    /// End of input. Fails if a record is incomplete.
    pub fn finish(self) -> BackupResult<u64> {
        let pending_bytes = self.pending();
        if pending_bytes > 0 {
            return Err(BackupError::Truncated { pending_bytes });
        }
        Ok(self.records)
    }

    /// Bytes buffered for the record in progress.
    pub fn pending(&self) -> usize {
        self.buf.len() - self.start
    }

    /// Records emitted so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Bytes pushed so far.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    fn next_record(&mut self) -> BackupResult<Option<BackupRecord>> {
        let avail = &self.buf[self.start..];
        if avail.len() < LEN_PREFIX_BYTES {
            return Ok(None);
        }
        let name_len = LittleEndian::read_u32(&avail[..LEN_PREFIX_BYTES]);
        self.check_len("<name>", name_len)?;
        let data_len_at = LEN_PREFIX_BYTES + name_len as usize;
        let data_at = data_len_at + LEN_PREFIX_BYTES;
        if avail.len() < data_at {
            return Ok(None);
        }
        let data_len = LittleEndian::read_u32(&avail[data_len_at..data_at]);
        if data_len > self.max_record_bytes {
            let name = String::from_utf8_lossy(&avail[LEN_PREFIX_BYTES..data_len_at]).into_owned();
            return Err(BackupError::RecordTooLarge {
                name,
                size: u64::from(data_len),
            });
        }
        let end = data_at + data_len as usize;
        if avail.len() < end {
            return Ok(None);
        }

        let name_bytes = &avail[LEN_PREFIX_BYTES..data_len_at];
        let (name, lossy_name) = match std::str::from_utf8(name_bytes) {
            Ok(name) => (name.to_string(), false),
            Err(_) => (String::from_utf8_lossy(name_bytes).into_owned(), true),
        };
        let data = avail[data_at..end].to_vec();
        self.start += end;

        Ok(Some(BackupRecord {
            name,
            data,
            lossy_name,
        }))
    }

    fn check_len(&self, name: &str, len: u32) -> BackupResult<()> {
        if len > self.max_record_bytes {
            return Err(BackupError::RecordTooLarge {
                name: name.to_string(),
                size: u64::from(len),
            });
        }
        Ok(())
    }

    fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        if self.start == self.buf.len() {
            self.buf.clear();
            self.start = 0;
        } else if self.start * 2 > self.buf.len() {
            self.buf.drain(..self.start);
            self.start = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupWriter;
    use keepsake_storage::MemorySink;
    use proptest::prelude::*;

    fn encode(records: &[(&str, &[u8])], state: &[u8]) -> Vec<u8> {
        let mut writer = BackupWriter::new(MemorySink::new());
        for (name, data) in records {
            writer.write_record(name, data).unwrap();
        }
        writer.write_state(state).unwrap();
        writer.finish().unwrap().into_bytes()
    }

    fn decode_split(bytes: &[u8], splits: &[usize]) -> Vec<BackupRecord> {
        let mut decoder = BackupDecoder::new();
        let mut records = Vec::new();
        let mut last = 0;
        for &split in splits {
            records.extend(decoder.push(&bytes[last..split]).unwrap());
            last = split;
        }
        records.extend(decoder.push(&bytes[last..]).unwrap());
        decoder.finish().unwrap();
        records
    }

    fn names(records: &[BackupRecord]) -> Vec<(&str, &[u8])> {
        records
            .iter()
            .map(|r| (r.name.as_str(), r.data.as_slice()))
            .collect()
    }

    #[test]
    fn test_split_offsets_inside_headers_and_bodies() {
        let bytes = encode(&[("a", b"A")], b"{}");
        for split in [1, 5, 9, 13] {
            let records = decode_split(&bytes, &[split]);
            assert_eq!(
                names(&records),
                vec![("a", &b"A"[..]), ("database", &b"{}"[..])],
                "split at {}",
                split
            );
            assert!(records[1].is_state());
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let bytes = encode(&[("x/y.png", &[1, 2, 3]), ("empty", b"")], b"state");
        let splits: Vec<usize> = (1..bytes.len()).collect();
        let records = decode_split(&bytes, &splits);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].name, "empty");
        assert!(records[1].data.is_empty());
    }

    #[test]
    fn test_truncated_input() {
        let bytes = encode(&[("a", b"AAAA")], b"{}");
        let mut decoder = BackupDecoder::new();
        let records = decoder.push(&bytes[..bytes.len() - 1]).unwrap();
        assert_eq!(records.len(), 1);
        assert!(decoder.pending() > 0);
        assert!(matches!(decoder.finish(), Err(BackupError::Truncated { .. })));
    }

    #[test]
    fn test_invalid_utf8_name_is_flagged() {
        let mut bytes = vec![2, 0, 0, 0, 0xff, 0xfe, 1, 0, 0, 0, 9];
        bytes.extend(encode(&[], b"{}"));
        let mut decoder = BackupDecoder::new();
        let records = decoder.push(&bytes).unwrap();
        assert!(records[0].lossy_name);
        assert!(records[1].is_state());
    }

    #[test]
    fn test_huge_declared_length_does_not_allocate() {
        let mut decoder = BackupDecoder::new();
        let records = decoder.push(&[1, 0, 0, 0, b'a', 0xff, 0xff, 0xff, 0xff, 0]).unwrap();
        assert!(records.is_empty());
        assert_eq!(decoder.pending(), 10);
    }

    #[test]
    fn test_record_ceiling() {
        let bytes = encode(&[("big", &[0u8; 32])], b"{}");
        let mut decoder = BackupDecoder::new().with_max_record_bytes(16);
        let err = decoder.push(&bytes[..12]).unwrap_err();
        assert!(matches!(err, BackupError::RecordTooLarge { size: 32, .. }));
    }

    proptest! {
        #[test]
        fn prop_any_split_decodes_identically(
            records in prop::collection::vec(("[a-z/]{1,12}", prop::collection::vec(any::<u8>(), 0..64)), 0..6),
            state in prop::collection::vec(any::<u8>(), 0..32),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
        ) {
            let borrowed: Vec<(&str, &[u8])> = records
                .iter()
                .filter(|(n, _)| n != "database")
                .map(|(n, d)| (n.as_str(), d.as_slice()))
                .collect();
            let bytes = encode(&borrowed, &state);

            let mut splits: Vec<usize> = cuts.iter().map(|i| i.index(bytes.len())).collect();
            splits.sort_unstable();
            splits.dedup();

            let whole = decode_split(&bytes, &[]);
            let split = decode_split(&bytes, &splits);
            prop_assert_eq!(whole, split);
        }
    }
}
