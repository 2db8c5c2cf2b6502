//! Storage layer for Keepsake
//!
//! This crate implements the byte-level endpoints the container codecs talk to:
//! - EntrySink: incremental byte consumer (memory, crash-safe file, stream)
//! - FsAssetStore: sharded content-addressed store on disk
//! - MemoryAssetStore: in-memory store with latency and fault injection
//! - Remote indexes: existence checks against an asset mirror

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod fs_store;
pub mod memory;
pub mod remote;
pub mod sink;

pub use fs_store::FsAssetStore;
pub use memory::MemoryAssetStore;
#[cfg(feature = "remote")]
pub use remote::HttpRemoteIndex;
pub use remote::StaticRemoteIndex;
pub use sink::{EntrySink, FileSink, MemorySink, SinkWriter, StreamSink};
