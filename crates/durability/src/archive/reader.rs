//! Archive reader
//!
//! Normalizes an in-memory buffer, a file or an arbitrary byte stream into
//! fixed-size chunks and drives an [`ArchiveDecoder`] over them.

use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::Path;
use std::sync::Arc;

use keepsake_core::{AssetStore, Limits, RemoteAssetIndex};
use tracing::info;

use super::decoder::ArchiveDecoder;
use super::error::ArchiveResult;
use super::import::ImportedArchive;
use crate::pipeline::{AssetPipeline, PipelineConfig, ProgressCallback};

/// Where archive bytes come from.
pub enum ArchiveSource {
    /// Whole archive in memory
    Buffer(Vec<u8>),
    /// Archive file
    File(File),
    /// Any byte stream (network body, pipe, ...)
    Stream(Box<dyn Read + Send>),
}

impl ArchiveSource {
    /// Open a file source.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(ArchiveSource::File(File::open(path)?))
    }

    /// Iterate over chunks of at most `chunk_bytes`.
    pub fn chunks(self, chunk_bytes: usize) -> ChunkSource {
        let chunk_bytes = chunk_bytes.max(1);
        let inner = match self {
            ArchiveSource::Buffer(bytes) => ChunkInner::Buffer { bytes, offset: 0 },
            ArchiveSource::File(file) => ChunkInner::Reader(Box::new(file)),
            ArchiveSource::Stream(stream) => ChunkInner::Reader(stream),
        };
        ChunkSource {
            inner,
            chunk_bytes,
            done: false,
        }
    }
}

impl From<Vec<u8>> for ArchiveSource {
    fn from(bytes: Vec<u8>) -> Self {
        ArchiveSource::Buffer(bytes)
    }
}

impl From<File> for ArchiveSource {
    fn from(file: File) -> Self {
        ArchiveSource::File(file)
    }
}

impl std::fmt::Debug for ArchiveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveSource::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
            ArchiveSource::File(file) => write!(f, "File({:?})", file),
            ArchiveSource::Stream(_) => write!(f, "Stream"),
        }
    }
}

enum ChunkInner {
    Buffer { bytes: Vec<u8>, offset: usize },
    Reader(Box<dyn Read + Send>),
}

/// Iterator of chunks read from an [`ArchiveSource`].
///
/// Reader-backed chunks are filled to `chunk_bytes` unless the source ends.
pub struct ChunkSource {
    inner: ChunkInner,
    chunk_bytes: usize,
    done: bool,
}

impl Iterator for ChunkSource {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match &mut self.inner {
            ChunkInner::Buffer { bytes, offset } => {
                if *offset >= bytes.len() {
                    self.done = true;
                    return None;
                }
                let end = (*offset + self.chunk_bytes).min(bytes.len());
                let chunk = bytes[*offset..end].to_vec();
                *offset = end;
                Some(Ok(chunk))
            }
            ChunkInner::Reader(reader) => {
                let mut chunk = vec![0u8; self.chunk_bytes];
                let mut filled = 0;
                while filled < chunk.len() {
                    match reader.read(&mut chunk[filled..]) {
                        Ok(0) => break,
                        Ok(n) => filled += n,
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }
                if filled == 0 {
                    self.done = true;
                    return None;
                }
                chunk.truncate(filled);
                Some(Ok(chunk))
            }
        }
    }
}

/// Imports archives into an asset store.
pub struct ArchiveReader {
    store: Arc<dyn AssetStore>,
    limits: Limits,
    pipeline: PipelineConfig,
    remote: Option<Arc<dyn RemoteAssetIndex>>,
    progress: Option<ProgressCallback>,
}

impl ArchiveReader {
    /// Reader with default limits and pipeline configuration.
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        ArchiveReader {
            store,
            limits: Limits::default(),
            pipeline: PipelineConfig::default(),
            remote: None,
            progress: None,
        }
    }

    /// Set limits (builder pattern).
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set pipeline configuration (builder pattern).
    pub fn with_pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline = config;
        self
    }

    /// Consult a remote mirror before saving assets (builder pattern).
    pub fn with_remote_index(mut self, remote: Arc<dyn RemoteAssetIndex>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Report asset progress (builder pattern).
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// A fresh push-based decoder with its own pipeline.
    pub fn decoder(&self) -> ArchiveResult<ArchiveDecoder> {
        let mut builder = AssetPipeline::builder(Arc::clone(&self.store)).config(self.pipeline.clone());
        if let Some(remote) = &self.remote {
            builder = builder.remote_index(Arc::clone(remote));
        }
        if let Some(progress) = &self.progress {
            builder = builder.on_progress(Arc::clone(progress));
        }
        ArchiveDecoder::new(builder.spawn()?, self.limits.clone())
    }

    /// Decode a whole source.
    ///
    /// Returns once every entry has been decoded; assets may still be
    /// persisting.
    pub fn parse(&self, source: impl Into<ArchiveSource>) -> ArchiveResult<ImportedArchive> {
        let mut decoder = self.decoder()?;
        for chunk in source.into().chunks(self.limits.chunk_bytes) {
            decoder.push(&chunk?)?;
        }
        let imported = decoder.finish()?;
        info!(
            target: "keepsake::archive",
            entries = imported.entry_count,
            excluded = imported.excluded_files.len(),
            complete = imported.is_complete(),
            "Archive imported"
        );
        Ok(imported)
    }

    /// Decode the archive at `path`.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> ArchiveResult<ImportedArchive> {
        self.parse(ArchiveSource::open(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveError, ArchiveOptions, ArchiveWriter};
    use keepsake_storage::{MemoryAssetStore, MemorySink};
    use std::io::Cursor;

    /// Reader that returns at most 3 bytes per call.
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(3);
            self.0.read(&mut buf[..n])
        }
    }

    fn sample() -> Vec<u8> {
        let mut writer = ArchiveWriter::new(MemorySink::new(), ArchiveOptions::default()).unwrap();
        writer.write("card.json", b"{\"v\":1}").unwrap();
        writer.write("assets/a.png", &[1u8; 2000]).unwrap();
        writer.end().unwrap().into_bytes()
    }

    #[test]
    fn test_buffer_chunks() {
        let chunks: Vec<_> = ArchiveSource::Buffer(vec![0u8; 10])
            .chunks(4)
            .map(|c| c.unwrap().len())
            .collect();
        assert_eq!(chunks, vec![4, 4, 2]);
    }

    #[test]
    fn test_stream_chunks_are_filled() {
        let source = ArchiveSource::Stream(Box::new(Trickle(Cursor::new(vec![0u8; 10]))));
        let chunks: Vec<_> = source.chunks(4).map(|c| c.unwrap().len()).collect();
        assert_eq!(chunks, vec![4, 4, 2]);
    }

    #[test]
    fn test_empty_source_yields_nothing() {
        assert_eq!(ArchiveSource::Buffer(Vec::new()).chunks(4).count(), 0);
    }

    #[test]
    fn test_parse_buffer_and_stream_agree() {
        let bytes = sample();
        let store = Arc::new(MemoryAssetStore::new());
        let reader = ArchiveReader::new(store).with_pipeline_config(PipelineConfig::for_testing());

        let from_buffer = reader.parse(bytes.clone()).unwrap();
        let from_stream = reader
            .parse(ArchiveSource::Stream(Box::new(Trickle(Cursor::new(bytes)))))
            .unwrap();

        assert_eq!(from_buffer.metadata(), from_stream.metadata());
        assert_eq!(
            from_buffer.wait().unwrap().keys().collect::<Vec<_>>(),
            from_stream.wait().unwrap().keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("card.charx");
        std::fs::write(&path, sample()).unwrap();

        let store = Arc::new(MemoryAssetStore::new());
        let reader = ArchiveReader::new(store.clone()).with_limits(Limits {
            chunk_bytes: 16,
            ..Limits::default()
        });
        let imported = reader.parse_file(&path).unwrap();
        assert_eq!(imported.metadata(), Some(&b"{\"v\":1}"[..]));
        assert_eq!(imported.wait().unwrap().len(), 1);
        assert_eq!(store.object_count(), 1);
    }

    #[test]
    fn test_parse_missing_file() {
        let store = Arc::new(MemoryAssetStore::new());
        let reader = ArchiveReader::new(store);
        assert!(matches!(
            reader.parse_file("/nonexistent/archive.charx"),
            Err(ArchiveError::Io(_))
        ));
    }
}
