//! Push-based archive decoder
//!
//! Compressed bytes are pushed in arbitrary chunks. A raw zstd stream
//! decoder hands decompressed bytes to `EntryAssembler`, a tar state
//! machine that survives any chunk boundary:
//!
//! ```text
//! Header ──(zero block)──────────────────────────────► End
//!   │
//!   ├─(size 0)──► emit ──► Header
//!   └─(size n)──► Data(n) ──► emit ──► Padding(pad) ──► Header
//! ```
//!
//! Completed entries are routed by kind: metadata and JSON are buffered,
//! assets go to the [`AssetPipeline`], entries over the size cap are
//! skipped using the size announced in their header and never buffered.

use std::collections::BTreeMap;

use keepsake_core::{EntryKind, Limits, METADATA_ENTRY};
use tar::{EntryType, Header};
use tracing::{debug, warn};
use zstd::stream::raw::{Decoder as RawDecoder, Operation};

use super::error::{ArchiveError, ArchiveResult};
use super::import::{ImportedArchive, SecondaryMetadata};
use super::types::{xxh3_hex, ArchiveManifest, ARCHIVE_FORMAT_VERSION};
use crate::pipeline::{AssetPipeline, PipelineProgress};

const BLOCK: usize = 512;

/// Decompression output buffer size.
const OUT_BUFFER_BYTES: usize = 128 * 1024;

/// Upper bound for a GNU long-name record.
const MAX_LONG_NAME_BYTES: u64 = 64 * 1024;

/// Byte range of the checksum field inside a tar header.
const CKSUM_FIELD: std::ops::Range<usize> = 148..156;

enum Phase {
    Header,
    Data {
        target: Target,
        remaining: u64,
        padding: u64,
    },
    Padding {
        remaining: u64,
    },
    End,
}

enum Target {
    Entry {
        name: String,
        kind: EntryKind,
        buf: Vec<u8>,
    },
    LongName(Vec<u8>),
    Skip,
}

/// Routes completed entries and keeps what the import returns.
struct EntryRouter {
    pipeline: AssetPipeline,
    limits: Limits,
    metadata: Option<Vec<u8>>,
    secondary: Option<SecondaryMetadata>,
    manifest: Option<Vec<u8>>,
    /// Entry count when the manifest arrived.
    manifest_at: u64,
    auxiliary: BTreeMap<String, Vec<u8>>,
    excluded: Vec<String>,
    entries: u64,
}

impl EntryRouter {
    fn open(&mut self, name: String, size: u64) -> Target {
        if !self.limits.admits(size) {
            warn!(
                target: "keepsake::archive",
                entry = %name,
                size,
                cap = self.limits.max_entry_bytes,
                "Entry exceeds size cap, skipping"
            );
            self.entries += 1;
            self.excluded.push(name);
            return Target::Skip;
        }
        let kind = EntryKind::classify(&name);
        // Only trust the header size as far as one chunk.
        let capacity = size.min(self.limits.chunk_bytes as u64) as usize;
        Target::Entry {
            name,
            kind,
            buf: Vec::with_capacity(capacity),
        }
    }

    fn complete(&mut self, name: String, kind: EntryKind, bytes: Vec<u8>) -> ArchiveResult<()> {
        self.entries += 1;
        debug!(target: "keepsake::archive", entry = %name, ?kind, size = bytes.len(), "Entry decoded");

        match kind {
            EntryKind::Metadata => {
                if self.metadata.is_some() {
                    warn!(target: "keepsake::archive", entry = %name, "Duplicate metadata entry, keeping the last");
                }
                self.metadata = Some(bytes);
            }
            EntryKind::SecondaryMetadata if self.secondary.is_none() => {
                self.secondary = Some(SecondaryMetadata { name, bytes });
            }
            EntryKind::SecondaryMetadata | EntryKind::Auxiliary => {
                self.auxiliary.insert(name, bytes);
            }
            EntryKind::Manifest => {
                self.manifest = Some(bytes);
                self.manifest_at = self.entries;
            }
            EntryKind::Asset => self.pipeline.enqueue(name, bytes)?,
            EntryKind::Excluded => self.excluded.push(name),
        }
        Ok(())
    }

    fn into_imported(self) -> ArchiveResult<ImportedArchive> {
        let manifest = match &self.manifest {
            Some(bytes) => Some(self.verify_manifest(bytes)?),
            None => {
                warn!(target: "keepsake::archive", "Archive has no manifest, marking import incomplete");
                None
            }
        };
        let trailing = self.entries - self.manifest_at;
        let complete = manifest.is_some() && trailing == 0;
        if manifest.is_some() && trailing > 0 {
            warn!(
                target: "keepsake::archive",
                trailing,
                "Entries follow the manifest, marking import incomplete"
            );
        }

        Ok(ImportedArchive::new(
            self.metadata,
            self.secondary,
            manifest,
            complete,
            self.auxiliary,
            self.excluded,
            self.entries,
            self.pipeline,
        ))
    }

    fn verify_manifest(&self, bytes: &[u8]) -> ArchiveResult<ArchiveManifest> {
        let manifest: ArchiveManifest = serde_json::from_slice(bytes)?;
        if manifest.version > ARCHIVE_FORMAT_VERSION {
            return Err(ArchiveError::UnsupportedVersion {
                version: manifest.version,
            });
        }

        if let Some(expected) = &manifest.payload_checksum {
            let payload = if manifest.payload_entry_name == METADATA_ENTRY {
                self.metadata.as_deref()
            } else {
                self.auxiliary
                    .get(&manifest.payload_entry_name)
                    .map(Vec::as_slice)
            };
            if let Some(payload) = payload {
                let actual = xxh3_hex(payload);
                if &actual != expected {
                    return Err(ArchiveError::ChecksumMismatch {
                        file: manifest.payload_entry_name.clone(),
                        expected: expected.clone(),
                        actual,
                    });
                }
            }
        }
        Ok(manifest)
    }
}

/// Tar state machine fed with decompressed bytes.
struct EntryAssembler {
    phase: Phase,
    header: [u8; BLOCK],
    filled: usize,
    long_name: Option<String>,
    router: EntryRouter,
}

impl EntryAssembler {
    fn consume(&mut self, mut input: &[u8]) -> ArchiveResult<()> {
        while !input.is_empty() {
            let phase = std::mem::replace(&mut self.phase, Phase::End);
            self.phase = match phase {
                // Trailing zero blocks after the end marker are ignored.
                Phase::End => return Ok(()),
                Phase::Header => {
                    let take = (BLOCK - self.filled).min(input.len());
                    self.header[self.filled..self.filled + take].copy_from_slice(&input[..take]);
                    self.filled += take;
                    input = &input[take..];
                    if self.filled == BLOCK {
                        self.filled = 0;
                        self.on_header()?
                    } else {
                        Phase::Header
                    }
                }
                Phase::Data {
                    mut target,
                    remaining,
                    padding,
                } => {
                    let take = remaining.min(input.len() as u64) as usize;
                    match &mut target {
                        Target::Entry { buf, .. } | Target::LongName(buf) => {
                            buf.extend_from_slice(&input[..take])
                        }
                        Target::Skip => {}
                    }
                    input = &input[take..];
                    let remaining = remaining - take as u64;
                    if remaining > 0 {
                        Phase::Data {
                            target,
                            remaining,
                            padding,
                        }
                    } else {
                        self.on_data(target)?;
                        if padding > 0 {
                            Phase::Padding { remaining: padding }
                        } else {
                            Phase::Header
                        }
                    }
                }
                Phase::Padding { remaining } => {
                    let take = remaining.min(input.len() as u64);
                    input = &input[take as usize..];
                    if remaining > take {
                        Phase::Padding {
                            remaining: remaining - take,
                        }
                    } else {
                        Phase::Header
                    }
                }
            };
        }
        Ok(())
    }

    fn on_header(&mut self) -> ArchiveResult<Phase> {
        if self.header.iter().all(|b| *b == 0) {
            return Ok(Phase::End);
        }

        let header = Header::from_byte_slice(&self.header);
        let stored = header
            .cksum()
            .map_err(|e| ArchiveError::archive(format!("unreadable header checksum: {}", e)))?;
        let computed: u32 = self
            .header
            .iter()
            .enumerate()
            .map(|(i, b)| if CKSUM_FIELD.contains(&i) { u32::from(b' ') } else { u32::from(*b) })
            .sum();
        if stored != computed {
            return Err(ArchiveError::archive(format!(
                "header checksum mismatch: stored {}, computed {}",
                stored, computed
            )));
        }

        let size = header
            .entry_size()
            .map_err(|e| ArchiveError::archive(format!("unreadable entry size: {}", e)))?;
        let entry_type = header.entry_type();
        let raw_name = String::from_utf8_lossy(&header.path_bytes()).into_owned();
        let padding = (BLOCK as u64 - size % BLOCK as u64) % BLOCK as u64;

        let target = match entry_type {
            EntryType::GNULongName => {
                if size > MAX_LONG_NAME_BYTES {
                    return Err(ArchiveError::archive(format!(
                        "long name record of {} bytes",
                        size
                    )));
                }
                Target::LongName(Vec::with_capacity(size as usize))
            }
            EntryType::Regular | EntryType::Continuous => {
                let name = self.long_name.take().unwrap_or(raw_name);
                self.router.open(name, size)
            }
            EntryType::XHeader | EntryType::XGlobalHeader => Target::Skip,
            _ => {
                self.long_name = None;
                Target::Skip
            }
        };

        if size == 0 {
            self.on_data(target)?;
            return Ok(Phase::Header);
        }
        Ok(Phase::Data {
            target,
            remaining: size,
            padding,
        })
    }

    fn on_data(&mut self, target: Target) -> ArchiveResult<()> {
        match target {
            Target::Entry { name, kind, buf } => self.router.complete(name, kind, buf),
            Target::LongName(buf) => {
                let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
                self.long_name = Some(String::from_utf8_lossy(&buf[..end]).into_owned());
                Ok(())
            }
            Target::Skip => Ok(()),
        }
    }
}

/// Streaming archive decoder.
///
/// Dropping the decoder before [`finish`](Self::finish) aborts the pipeline:
/// queued assets are discarded, saves already running complete.
pub struct ArchiveDecoder {
    zstd: RawDecoder<'static>,
    out: Vec<u8>,
    assembler: EntryAssembler,
    frame_complete: bool,
    bytes_in: u64,
    poisoned: bool,
}

impl ArchiveDecoder {
    /// Decoder that routes assets to `pipeline`.
    pub fn new(pipeline: AssetPipeline, limits: Limits) -> ArchiveResult<Self> {
        limits.validate()?;
        let zstd = RawDecoder::new()
            .map_err(|e| ArchiveError::compression(format!("zstd decoder: {}", e)))?;
        let assembler = EntryAssembler {
            phase: Phase::Header,
            header: [0u8; BLOCK],
            filled: 0,
            long_name: None,
            router: EntryRouter {
                pipeline,
                limits,
                metadata: None,
                secondary: None,
                manifest: None,
                manifest_at: 0,
                auxiliary: BTreeMap::new(),
                excluded: Vec::new(),
                entries: 0,
            },
        };
        Ok(Self {
            zstd,
            out: vec![0u8; OUT_BUFFER_BYTES],
            assembler,
            frame_complete: false,
            bytes_in: 0,
            poisoned: false,
        })
    }

    /// Feed the next chunk of compressed bytes.
    ///
    /// Every entry completed by this chunk is routed before returning.
    /// Blocks only while the asset pipeline is at its queue ceiling.
    pub fn push(&mut self, chunk: &[u8]) -> ArchiveResult<()> {
        if self.poisoned {
            return Err(ArchiveError::Poisoned);
        }
        self.bytes_in += chunk.len() as u64;
        let result = self.decompress(chunk);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn decompress(&mut self, mut input: &[u8]) -> ArchiveResult<()> {
        loop {
            let status = self
                .zstd
                .run_on_buffers(input, &mut self.out)
                .map_err(|e| ArchiveError::compression(format!("zstd: {}", e)))?;
            input = &input[status.bytes_read..];
            if status.bytes_read > 0 || status.bytes_written > 0 {
                self.frame_complete = status.remaining == 0;
            }
            if status.bytes_written > 0 {
                self.assembler.consume(&self.out[..status.bytes_written])?;
            }
            // A full output buffer may leave decoded bytes inside zstd.
            if input.is_empty() && status.bytes_written < self.out.len() {
                return Ok(());
            }
        }
    }

    /// End of input: verify the stream, finalize the pipeline and return
    /// the buffered metadata plus a handle to the pending assets.
    pub fn finish(self) -> ArchiveResult<ImportedArchive> {
        // Whatever happens next, let already-queued assets drain.
        self.assembler.router.pipeline.finalize();
        if self.poisoned {
            return Err(ArchiveError::Poisoned);
        }

        let assembler = self.assembler;
        match assembler.phase {
            Phase::End => {}
            Phase::Header if assembler.filled == 0 && assembler.router.entries == 0 => {
                return Err(ArchiveError::truncated("no entries"));
            }
            _ => {
                return Err(ArchiveError::truncated(format!(
                    "input ended after {} compressed bytes without an end-of-archive marker",
                    self.bytes_in
                )));
            }
        }
        if !self.frame_complete {
            return Err(ArchiveError::truncated("compressed stream ended mid-frame"));
        }

        let imported = assembler.router.into_imported()?;
        debug!(
            target: "keepsake::archive",
            entries = imported.entry_count,
            excluded = imported.excluded_files.len(),
            bytes_in = self.bytes_in,
            complete = imported.is_complete(),
            "Archive decoded"
        );
        Ok(imported)
    }

    /// Primary metadata, once its entry has been decoded.
    pub fn metadata(&self) -> Option<&[u8]> {
        self.assembler.router.metadata.as_deref()
    }

    /// Secondary metadata, once its entry has been decoded.
    pub fn secondary_metadata(&self) -> Option<&SecondaryMetadata> {
        self.assembler.router.secondary.as_ref()
    }

    /// Entries skipped so far for exceeding the size cap.
    pub fn excluded_files(&self) -> &[String] {
        &self.assembler.router.excluded
    }

    /// Asset persistence progress.
    pub fn progress(&self) -> PipelineProgress {
        self.assembler.router.pipeline.progress()
    }

    /// Compressed bytes pushed so far.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }
}

impl std::fmt::Debug for ArchiveDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveDecoder")
            .field("bytes_in", &self.bytes_in)
            .field("frame_complete", &self.frame_complete)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}
