//! Chunked backup record format
//!
//! A backup is a flat sequence of records with no header or trailer:
//!
//! ```text
//! u32 LE name_len | name (UTF-8) | u32 LE data_len | data
//! ```
//!
//! The record named [`STATE_RECORD_NAME`] holds the whole serialized
//! application state; every other record is an asset keyed by its
//! original storage path.

use byteorder::{LittleEndian, WriteBytesExt};

use super::error::{BackupError, BackupResult};

/// Name of the record carrying the application state.
pub const STATE_RECORD_NAME: &str = "database";

/// Size of each length prefix.
pub const LEN_PREFIX_BYTES: usize = 4;

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// Record name
    pub name: String,
    /// Record payload
    pub data: Vec<u8>,
    /// The stored name was not valid UTF-8 and was decoded lossily
    pub lossy_name: bool,
}

impl BackupRecord {
    /// Whether this is the state record.
    pub fn is_state(&self) -> bool {
        !self.lossy_name && self.name == STATE_RECORD_NAME
    }
}

/// Encode the bytes that precede a record's payload.
pub fn encode_record_header(name: &str, data_len: u64) -> BackupResult<Vec<u8>> {
    let name_len = u32::try_from(name.len()).map_err(|_| BackupError::RecordTooLarge {
        name: display_name(name),
        size: name.len() as u64,
    })?;
    let data_len = u32::try_from(data_len).map_err(|_| BackupError::RecordTooLarge {
        name: display_name(name),
        size: data_len,
    })?;

    let mut header = Vec::with_capacity(2 * LEN_PREFIX_BYTES + name.len());
    header.write_u32::<LittleEndian>(name_len)?;
    header.extend_from_slice(name.as_bytes());
    header.write_u32::<LittleEndian>(data_len)?;
    Ok(header)
}

/// Encoded size of a record.
pub fn encoded_len(name: &str, data_len: usize) -> usize {
    2 * LEN_PREFIX_BYTES + name.len() + data_len
}

fn display_name(name: &str) -> String {
    name.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = encode_record_header("ab", 3).unwrap();
        assert_eq!(header, vec![2, 0, 0, 0, b'a', b'b', 3, 0, 0, 0]);
        assert_eq!(encoded_len("ab", 3), 13);
    }

    #[test]
    fn test_data_over_u32_rejected() {
        let err = encode_record_header("big", u64::from(u32::MAX) + 1).unwrap_err();
        assert!(matches!(err, BackupError::RecordTooLarge { .. }));
    }

    #[test]
    fn test_state_record_detection() {
        let record = BackupRecord {
            name: STATE_RECORD_NAME.to_string(),
            data: Vec::new(),
            lossy_name: false,
        };
        assert!(record.is_state());
        let lossy = BackupRecord {
            lossy_name: true,
            ..record
        };
        assert!(!lossy.is_state());
    }
}
