//! Chunked backup format
//!
//! A full backup of the application: every keyed asset plus one reserved
//! record holding the serialized state. Records are length-prefixed and may
//! be decoded from arbitrarily split input.

mod decoder;
mod error;
mod format;
mod restore;
mod writer;

pub use decoder::BackupDecoder;
pub use error::{BackupError, BackupResult};
pub use format::{encode_record_header, encoded_len, BackupRecord, LEN_PREFIX_BYTES, STATE_RECORD_NAME};
pub use restore::{BackupRestorer, RestoreOutcome, RestoreReport, SkippedRecord, RESTORE_CHUNK_BYTES};
pub use writer::BackupWriter;
