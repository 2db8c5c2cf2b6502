//! Archive export with a manifest
//!
//! Writes the payload, optional secondary metadata and assets through an
//! [`ArchiveWriter`], indexing every asset, then appends `manifest.json` as
//! the final entry. An importer that finds no manifest knows the archive
//! was cut short.

use keepsake_core::{
    AssetId, AssetStore, Entry, EntryKind, MANIFEST_ENTRY, METADATA_ENTRY, SECONDARY_METADATA_STEM,
};
use keepsake_storage::EntrySink;
use tracing::{info, warn};

use super::error::{ArchiveError, ArchiveResult};
use super::types::{xxh3_hex, ArchiveManifest, ArchiveOptions, ManifestAsset};
use super::writer::ArchiveWriter;

/// Description of one exported asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportAsset {
    /// Asset id, the manifest key
    pub id: String,
    /// Asset kind; also the subdirectory under the assets dir
    pub kind: String,
    /// File extension without the dot
    pub ext: String,
    /// Display name, used as the file stem when present
    pub name: Option<String>,
    /// Pixel width
    pub width: Option<u32>,
    /// Pixel height
    pub height: Option<u32>,
}

impl ExportAsset {
    /// Asset with no display name or dimensions.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, ext: impl Into<String>) -> Self {
        ExportAsset {
            id: id.into(),
            kind: kind.into(),
            ext: ext.into(),
            name: None,
            width: None,
            height: None,
        }
    }

    /// Set display name (builder pattern).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set pixel dimensions (builder pattern).
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}

/// Writes a complete, manifest-terminated archive.
pub struct ArchiveExporter<S: EntrySink> {
    writer: ArchiveWriter<S>,
    manifest: ArchiveManifest,
}

impl<S: EntrySink> ArchiveExporter<S> {
    /// Start an archive on `sink`.
    pub fn new(sink: S, options: ArchiveOptions) -> ArchiveResult<Self> {
        Ok(ArchiveExporter {
            writer: ArchiveWriter::new(sink, options)?,
            manifest: ArchiveManifest::new(),
        })
    }

    /// Write the primary metadata entry and record its checksum.
    pub fn write_payload(&mut self, bytes: &[u8]) -> ArchiveResult<()> {
        if self.manifest.payload_checksum.is_some() {
            return Err(ArchiveError::archive("payload already written"));
        }
        self.writer.write(METADATA_ENTRY, bytes)?;
        self.manifest.payload_checksum = Some(xxh3_hex(bytes));
        Ok(())
    }

    /// Write the secondary metadata entry as `module.<ext>`.
    pub fn write_secondary(&mut self, ext: &str, bytes: &[u8]) -> ArchiveResult<String> {
        let name = format!("{}.{}", SECONDARY_METADATA_STEM, ext);
        self.writer.write(&name, bytes)
    }

    /// Write an auxiliary entry. Names that would be read back as metadata
    /// or manifest are rejected.
    pub fn write_entry(&mut self, entry: &Entry) -> ArchiveResult<String> {
        match entry.kind {
            EntryKind::Metadata | EntryKind::SecondaryMetadata | EntryKind::Manifest => Err(
                ArchiveError::archive(format!("reserved entry name: {}", entry.name)),
            ),
            _ => self.writer.write(&entry.name, &entry.bytes),
        }
    }

    /// Write an asset under `<assets_dir>/<kind>/<name or id>.<ext>` and
    /// index it in the manifest. Returns the stored entry name.
    pub fn write_asset(&mut self, asset: ExportAsset, bytes: &[u8]) -> ArchiveResult<String> {
        let stem = asset.name.as_deref().unwrap_or(&asset.id);
        let requested = format!(
            "{}/{}/{}.{}",
            self.manifest.assets_dir, asset.kind, stem, asset.ext
        );
        let file = self.writer.write(&requested, bytes)?;

        let entry = ManifestAsset {
            file: file.clone(),
            ext: asset.ext,
            kind: asset.kind,
            name: asset.name,
            width: asset.width,
            height: asset.height,
        };
        if self.manifest.assets.insert(asset.id.clone(), entry).is_some() {
            warn!(target: "keepsake::archive", id = %asset.id, "Asset id exported twice, manifest keeps the last");
        }
        Ok(file)
    }

    /// Load `id` from `store` and export it.
    pub fn write_stored_asset(
        &mut self,
        store: &dyn AssetStore,
        id: &AssetId,
        asset: ExportAsset,
    ) -> ArchiveResult<String> {
        let bytes = store.load(id)?;
        self.write_asset(asset, &bytes)
    }

    /// Manifest as built so far.
    pub fn manifest(&self) -> &ArchiveManifest {
        &self.manifest
    }

    /// Append the manifest, finish the stream and return the sink.
    pub fn finish(mut self) -> ArchiveResult<(S, ArchiveManifest)> {
        let manifest_json = serde_json::to_vec_pretty(&self.manifest)?;
        self.writer.write(MANIFEST_ENTRY, &manifest_json)?;
        let entries = self.writer.entries_written();
        let sink = self.writer.end()?;

        info!(
            target: "keepsake::archive",
            entries,
            assets = self.manifest.assets.len(),
            bytes = sink.bytes_written(),
            "Archive exported"
        );
        Ok((sink, self.manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveReader;
    use keepsake_storage::{MemoryAssetStore, MemorySink};
    use std::sync::Arc;

    #[test]
    fn test_export_then_import() {
        let mut exporter = ArchiveExporter::new(MemorySink::new(), ArchiveOptions::default()).unwrap();
        exporter.write_payload(b"{\"name\":\"Ada\"}").unwrap();
        exporter.write_secondary("bin", b"module").unwrap();
        let file = exporter
            .write_asset(
                ExportAsset::new("a1", "icon", "png")
                    .with_name("main")
                    .with_dimensions(64, 64),
                b"icon-bytes",
            )
            .unwrap();
        assert_eq!(file, "assets/icon/main.png");
        let (sink, manifest) = exporter.finish().unwrap();

        let store = Arc::new(MemoryAssetStore::new());
        let imported = ArchiveReader::new(store).parse(sink.into_bytes()).unwrap();
        assert!(imported.is_complete());
        assert_eq!(imported.manifest.as_ref(), Some(&manifest));
        assert_eq!(imported.secondary_metadata.as_ref().unwrap().bytes, b"module");

        let assets = imported.wait().unwrap();
        assert!(assets.contains_key("assets/icon/main.png"));
        let (id, entry) = manifest.asset_by_file(&file).unwrap();
        assert_eq!(id, "a1");
        assert_eq!(entry.width, Some(64));
    }

    #[test]
    fn test_duplicate_asset_names_get_distinct_files() {
        let mut exporter = ArchiveExporter::new(MemorySink::new(), ArchiveOptions::default()).unwrap();
        let a = exporter
            .write_asset(ExportAsset::new("1", "emotion", "png").with_name("joy"), b"a")
            .unwrap();
        let b = exporter
            .write_asset(ExportAsset::new("2", "emotion", "png").with_name("Joy"), b"b")
            .unwrap();
        assert_ne!(a.to_lowercase(), b.to_lowercase());
        let (_, manifest) = exporter.finish().unwrap();
        assert_eq!(manifest.assets.len(), 2);
    }

    #[test]
    fn test_reserved_looking_asset_names_round_trip() {
        let mut exporter = ArchiveExporter::new(MemorySink::new(), ArchiveOptions::default()).unwrap();
        exporter.write_payload(b"{\"name\":\"Ada\"}").unwrap();
        let module = exporter
            .write_asset(ExportAsset::new("a1", "emotion", "png").with_name("module"), b"m")
            .unwrap();
        let card = exporter
            .write_asset(ExportAsset::new("a2", "other", "json").with_name("card"), b"c")
            .unwrap();
        let manifest_like = exporter
            .write_asset(ExportAsset::new("a3", "other", "json").with_name("manifest"), b"x")
            .unwrap();
        let (sink, _) = exporter.finish().unwrap();

        let store = Arc::new(MemoryAssetStore::new());
        let imported = ArchiveReader::new(store.clone()).parse(sink.into_bytes()).unwrap();
        assert!(imported.is_complete());
        assert_eq!(imported.metadata(), Some(&b"{\"name\":\"Ada\"}"[..]));
        assert!(imported.secondary_metadata.is_none());
        assert!(imported.auxiliary.is_empty());

        let assets = imported.wait().unwrap();
        assert_eq!(assets.len(), 3);
        assert_eq!(store.load(&assets[&module].id).unwrap(), b"m");
        assert_eq!(store.load(&assets[&card].id).unwrap(), b"c");
        assert_eq!(store.load(&assets[&manifest_like].id).unwrap(), b"x");
    }

    #[test]
    fn test_payload_checksum_verified_on_import() {
        let mut exporter = ArchiveExporter::new(MemorySink::new(), ArchiveOptions::default()).unwrap();
        exporter.write_payload(b"{}").unwrap();
        exporter.manifest.payload_checksum = Some("0000000000000000".to_string());
        let (sink, _) = exporter.finish().unwrap();

        let store = Arc::new(MemoryAssetStore::new());
        let err = ArchiveReader::new(store).parse(sink.into_bytes()).unwrap_err();
        assert!(matches!(err, ArchiveError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_reserved_entry_rejected() {
        let mut exporter = ArchiveExporter::new(MemorySink::new(), ArchiveOptions::default()).unwrap();
        let entry = Entry::new("manifest.json", b"{}".to_vec());
        assert!(exporter.write_entry(&entry).is_err());
        let entry = Entry::new("notes/extra.json", b"[]".to_vec());
        assert_eq!(exporter.write_entry(&entry).unwrap(), "notes/extra.json");
    }

    #[test]
    fn test_payload_written_once() {
        let mut exporter = ArchiveExporter::new(MemorySink::new(), ArchiveOptions::default()).unwrap();
        exporter.write_payload(b"{}").unwrap();
        assert!(exporter.write_payload(b"{}").is_err());
    }

    #[test]
    fn test_export_from_store() {
        let store = MemoryAssetStore::new();
        let id = store.save(b"stored").unwrap();
        let mut exporter = ArchiveExporter::new(MemorySink::new(), ArchiveOptions::default()).unwrap();
        let file = exporter
            .write_stored_asset(&store, &id, ExportAsset::new(id.as_str(), "bg", "jpg"))
            .unwrap();
        assert!(file.starts_with("assets/bg/"));
        let missing = AssetId::new("0".repeat(64));
        assert!(matches!(
            exporter.write_stored_asset(&store, &missing, ExportAsset::new("m", "bg", "jpg")),
            Err(ArchiveError::Store(_))
        ));
    }
}
