//! Incremental byte sinks
//!
//! An [`EntrySink`] is the lowest layer of every writer: container writers
//! push encoded bytes into it chunk by chunk and close it exactly once.
//!
//! - [`MemorySink`]: growable in-memory buffer
//! - [`FileSink`]: crash-safe file (temp file, fsync, rename on close)
//! - [`StreamSink`]: any outbound `io::Write`
//!
//! [`SinkWriter`] adapts a sink to `io::Write` so compressors can drive it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Incremental byte consumer.
pub trait EntrySink: Send {
    /// Append a chunk. Chunks are written strictly in call order.
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Flush and finalize. Writing after `close` is an error.
    fn close(&mut self) -> io::Result<()>;

    /// Total bytes accepted so far.
    fn bytes_written(&self) -> u64;
}

impl<S: EntrySink + ?Sized> EntrySink for Box<S> {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        (**self).write_chunk(chunk)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }

    fn bytes_written(&self) -> u64 {
        (**self).bytes_written()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "sink already closed")
}

// =============================================================================
// MemorySink
// =============================================================================

/// In-memory sink
#[derive(Debug, Default)]
pub struct MemorySink {
    buffer: Vec<u8>,
    closed: bool,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the bytes written so far.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Consume the sink, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

impl EntrySink for MemorySink {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(closed_error());
        }
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.buffer.len() as u64
    }
}

// =============================================================================
// FileSink
// =============================================================================

/// Crash-safe file sink
///
/// Bytes go to a hidden temporary file next to the destination. `close`
/// fsyncs it, renames it over the destination and fsyncs the parent
/// directory, so the destination is either the complete new file or the
/// previous one. Dropping an unclosed sink removes the temporary file.
pub struct FileSink {
    path: PathBuf,
    temp_path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl FileSink {
    /// Create a sink that will atomically replace `path` on close.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let temp_path = temp_path_for(&path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)?;
        debug!(target: "keepsake::sink", path = %path.display(), "Opened file sink");

        Ok(FileSink {
            path,
            temp_path,
            writer: Some(BufWriter::new(file)),
            written: 0,
        })
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EntrySink for FileSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let writer = self.writer.as_mut().ok_or_else(closed_error)?;
        writer.write_all(chunk)?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        let writer = self.writer.take().ok_or_else(closed_error)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.temp_path, &self.path)?;
        sync_parent(&self.path)?;
        debug!(target: "keepsake::sink", path = %self.path.display(), bytes = self.written, "Closed file sink");
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            if let Err(e) = fs::remove_file(&self.temp_path) {
                warn!(target: "keepsake::sink", path = %self.temp_path.display(), error = %e, "Failed to remove abandoned temp file");
            }
        }
    }
}

/// Hidden, uniquely named temporary path in the same directory as `path`.
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()))
}

/// fsync the directory containing `path` so a rename is durable.
pub(crate) fn sync_parent(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            let dir = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            File::open(dir)?.sync_all()?;
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

// =============================================================================
// StreamSink
// =============================================================================

/// Sink over any outbound writer (socket, pipe, upload body).
pub struct StreamSink<W: Write + Send> {
    inner: W,
    written: u64,
    closed: bool,
}

impl<W: Write + Send> StreamSink<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        StreamSink {
            inner,
            written: 0,
            closed: false,
        }
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> EntrySink for StreamSink<W> {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(closed_error());
        }
        self.inner.write_all(chunk)?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Err(closed_error());
        }
        self.closed = true;
        self.inner.flush()
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }
}

// =============================================================================
// SinkWriter
// =============================================================================

/// `io::Write` adapter over an [`EntrySink`].
pub struct SinkWriter<S: EntrySink> {
    sink: S,
}

impl<S: EntrySink> SinkWriter<S> {
    /// Wrap a sink.
    pub fn new(sink: S) -> Self {
        SinkWriter { sink }
    }

    /// Borrow the sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Unwrap the sink without closing it.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S: EntrySink> Write for SinkWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write_chunk(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
