//! Streaming archive writer
//!
//! Appends `(name, bytes)` entries to a tar stream compressed with zstd and
//! pushes compressed bytes to an [`EntrySink`] as they are produced, so the
//! whole archive never has to exist in memory.

use keepsake_core::NameRegistry;
use keepsake_storage::{EntrySink, SinkWriter};
use std::io::Write;
use tar::{Builder, EntryType, Header};
use tracing::{debug, trace};
use zstd::stream::write::Encoder;

use super::error::{ArchiveError, ArchiveResult};
use super::types::ArchiveOptions;

type ArchiveStream<S> = Builder<Encoder<'static, SinkWriter<S>>>;

/// Incremental archive writer
///
/// Any failure poisons the writer: later calls return
/// [`ArchiveError::Poisoned`].
pub struct ArchiveWriter<S: EntrySink> {
    stream: Option<ArchiveStream<S>>,
    names: NameRegistry,
    options: ArchiveOptions,
    entries_written: u64,
    poisoned: bool,
}

impl<S: EntrySink> ArchiveWriter<S> {
    /// Prepare `sink` for a new archive.
    pub fn new(sink: S, options: ArchiveOptions) -> ArchiveResult<Self> {
        options.validate()?;
        let encoder = Encoder::new(SinkWriter::new(sink), options.compression_level)
            .map_err(|e| ArchiveError::compression(format!("zstd encoder: {}", e)))?;

        Ok(Self {
            stream: Some(Builder::new(encoder)),
            names: NameRegistry::new(options.limits.max_name_bytes),
            options,
            entries_written: 0,
            poisoned: false,
        })
    }

    /// Append an entry at the stream's compression level.
    ///
    /// Returns the sanitized, de-duplicated name the entry was stored under.
    pub fn write(&mut self, name: &str, bytes: &[u8]) -> ArchiveResult<String> {
        let level = self.options.compression_level;
        self.write_with_level(name, bytes, level)
    }

    /// Append an entry, requesting a compression level.
    ///
    /// The zstd stream has one level for its whole frame; a request that
    /// differs from the writer's level is traced and the entry is written
    /// at the stream level.
    pub fn write_with_level(&mut self, name: &str, bytes: &[u8], level: i32) -> ArchiveResult<String> {
        if self.poisoned {
            return Err(ArchiveError::Poisoned);
        }
        if level != self.options.compression_level {
            trace!(
                target: "keepsake::archive",
                entry = name,
                requested = level,
                stream = self.options.compression_level,
                "Per-entry compression level ignored"
            );
        }

        let final_name = self.names.claim(name);
        let flush = self.options.flush_each_entry;
        let stream = self.stream.as_mut().ok_or(ArchiveError::Poisoned)?;

        match append_entry(stream, &final_name, bytes, flush) {
            Ok(()) => {
                self.entries_written += 1;
                debug!(
                    target: "keepsake::archive",
                    entry = %final_name,
                    size = bytes.len(),
                    "Archive entry written"
                );
                Ok(final_name)
            }
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// Finish the tar stream and the zstd frame, close the sink and return it.
    pub fn end(mut self) -> ArchiveResult<S> {
        if self.poisoned {
            return Err(ArchiveError::Poisoned);
        }
        let stream = self.stream.take().ok_or(ArchiveError::Poisoned)?;

        let encoder = stream
            .into_inner()
            .map_err(|e| ArchiveError::archive(format!("tar finish: {}", e)))?;
        let writer = encoder
            .finish()
            .map_err(|e| ArchiveError::compression(format!("zstd finish: {}", e)))?;

        let mut sink = writer.into_sink();
        sink.close()?;

        debug!(
            target: "keepsake::archive",
            entries = self.entries_written,
            bytes = sink.bytes_written(),
            "Archive finished"
        );
        Ok(sink)
    }

    /// Number of entries appended so far.
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    /// Whether an earlier failure poisoned the writer.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Active options.
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }
}

fn append_entry<S: EntrySink>(
    stream: &mut ArchiveStream<S>,
    name: &str,
    data: &[u8],
    flush: bool,
) -> ArchiveResult<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0); // Reproducible output: zero mtime

    // append_data writes a GNU long-name record for names over 100 bytes.
    stream
        .append_data(&mut header, name, data)
        .map_err(|e| ArchiveError::archive(format!("append '{}': {}", name, e)))?;

    if flush {
        stream
            .get_mut()
            .flush()
            .map_err(|e| ArchiveError::compression(format!("flush after '{}': {}", name, e)))?;
    }
    Ok(())
}
