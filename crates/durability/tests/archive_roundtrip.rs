//! Archive round-trip tests
//!
//! Exports archives to real files, imports them back through the
//! streaming decoder and checks what lands in the asset store.

use std::sync::Arc;

use keepsake_core::{AssetId, AssetStore, ContentHash, Limits};
use keepsake_durability::archive::{ArchiveExporter, ArchiveOptions, ArchiveReader, ExportAsset};
use keepsake_durability::pipeline::{AssetOrigin, PipelineConfig, PipelineError};
use keepsake_storage::{FileSink, FsAssetStore, MemoryAssetStore, MemorySink, StaticRemoteIndex};
use proptest::prelude::*;
use tempfile::TempDir;

/// Asset stems and extensions, including ones that match root entry names.
const ASSET_NAMES: &[(&str, &str)] = &[
    ("module", "png"),
    ("module", "risum"),
    ("card", "json"),
    ("manifest", "json"),
    ("notes", "json"),
    ("sprite", "webp"),
];

fn image(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[test]
fn test_export_import_through_files() {
    let dir = TempDir::new().unwrap();
    let archive_path = dir.path().join("ada.charx");

    let mut exporter =
        ArchiveExporter::new(FileSink::create(&archive_path).unwrap(), ArchiveOptions::default())
            .unwrap();
    exporter.write_payload(br#"{"name":"Ada"}"#).unwrap();
    for i in 0..25u8 {
        exporter
            .write_asset(
                ExportAsset::new(format!("emotion-{}", i), "emotion", "png"),
                &image(i, 2048),
            )
            .unwrap();
    }
    let (_, manifest) = exporter.finish().unwrap();
    assert_eq!(manifest.assets.len(), 25);

    let store = Arc::new(FsAssetStore::open(dir.path().join("store")).unwrap());
    let imported = ArchiveReader::new(store.clone())
        .with_pipeline_config(PipelineConfig::for_testing())
        .parse_file(&archive_path)
        .unwrap();

    assert!(imported.is_complete());
    assert_eq!(imported.metadata(), Some(&br#"{"name":"Ada"}"#[..]));
    let report = imported.wait_report().unwrap();
    assert!(report.is_clean());
    assert_eq!(report.assets.len(), 25);

    for (i, entry) in manifest.assets.values().enumerate() {
        let persisted = &report.assets[&entry.file];
        assert_eq!(persisted.origin, AssetOrigin::Stored);
        let bytes = store.load(&persisted.id).unwrap();
        assert_eq!(bytes.len(), 2048, "asset {}", i);
    }
}

#[test]
fn test_oversize_entries_are_excluded_not_persisted() {
    let limits = Limits::with_small_limits();
    let mut exporter = ArchiveExporter::new(MemorySink::new(), ArchiveOptions::default()).unwrap();
    exporter.write_payload(b"{}").unwrap();
    exporter
        .write_asset(ExportAsset::new("small", "icon", "png"), &image(1, 100))
        .unwrap();
    let big_name = exporter
        .write_asset(
            ExportAsset::new("big", "icon", "png"),
            &image(2, limits.max_entry_bytes as usize + 1),
        )
        .unwrap();
    let (sink, _) = exporter.finish().unwrap();

    let store = Arc::new(MemoryAssetStore::new());
    let imported = ArchiveReader::new(store.clone())
        .with_limits(limits)
        .parse(sink.into_bytes())
        .unwrap();
    let report = imported.wait_report().unwrap();

    assert_eq!(report.excluded_files, vec![big_name.clone()]);
    assert!(!report.assets.contains_key(&big_name));
    assert_eq!(report.assets.len(), 1);
    assert_eq!(store.object_count(), 1);
}

#[test]
fn test_one_failing_asset_is_isolated() {
    let mut exporter = ArchiveExporter::new(MemorySink::new(), ArchiveOptions::default()).unwrap();
    exporter.write_payload(b"{}").unwrap();
    let mut names = Vec::new();
    for i in 0..8u8 {
        let bytes = if i == 5 { b"POISON".to_vec() } else { image(i, 64) };
        names.push(
            exporter
                .write_asset(ExportAsset::new(format!("a{}", i), "other", "bin"), &bytes)
                .unwrap(),
        );
    }
    let (sink, _) = exporter.finish().unwrap();

    let store = Arc::new(MemoryAssetStore::new().fail_when(|b| b == b"POISON"));
    let imported = ArchiveReader::new(store).parse(sink.into_bytes()).unwrap();

    match imported.wait() {
        Err(PipelineError::AssetsFailed { failures, persisted }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].name, names[5]);
            assert_eq!(persisted.len(), 7);
            assert!(!persisted.contains_key(&names[5]));
        }
        other => panic!("expected AssetsFailed, got {:?}", other),
    }

    let report = imported.wait_report().unwrap();
    assert_eq!(report.missing(), vec![names[5].as_str()]);
}

#[test]
fn test_remote_index_skips_local_save() {
    let shared = image(9, 300);
    let remote = Arc::new(StaticRemoteIndex::new());
    remote.insert(ContentHash::of(&shared).double_hashed());

    let mut exporter = ArchiveExporter::new(MemorySink::new(), ArchiveOptions::default()).unwrap();
    exporter.write_payload(b"{}").unwrap();
    let shared_name = exporter
        .write_asset(ExportAsset::new("shared", "icon", "png"), &shared)
        .unwrap();
    exporter
        .write_asset(ExportAsset::new("local", "icon", "png"), &image(3, 300))
        .unwrap();
    let (sink, _) = exporter.finish().unwrap();

    let store = Arc::new(MemoryAssetStore::new());
    let imported = ArchiveReader::new(store.clone())
        .with_remote_index(remote)
        .parse(sink.into_bytes())
        .unwrap();
    let assets = imported.wait().unwrap();

    assert_eq!(assets[&shared_name].origin, AssetOrigin::Remote);
    assert_eq!(assets[&shared_name].id, AssetId::new(ContentHash::of(&shared).as_str()));
    assert_eq!(store.save_count(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_chunked_decode_matches_export(
        assets in prop::collection::vec((0usize..3000, 0usize..ASSET_NAMES.len()), 0..6),
        chunk in 1usize..700,
    ) {
        let mut exporter = ArchiveExporter::new(MemorySink::new(), ArchiveOptions::for_testing()).unwrap();
        exporter.write_payload(b"{\"n\":1}").unwrap();
        let mut expected = Vec::new();
        for (i, (size, pick)) in assets.iter().enumerate() {
            let (stem, ext) = ASSET_NAMES[*pick];
            let bytes = image(i as u8, *size);
            let name = exporter
                .write_asset(ExportAsset::new(format!("a{}", i), "other", ext).with_name(stem), &bytes)
                .unwrap();
            expected.push((name, bytes));
        }
        let (sink, _) = exporter.finish().unwrap();
        let archive = sink.into_bytes();

        let store = Arc::new(MemoryAssetStore::new());
        let reader = ArchiveReader::new(store.clone()).with_limits(Limits::default());
        let mut decoder = reader.decoder().unwrap();
        for piece in archive.chunks(chunk) {
            decoder.push(piece).unwrap();
        }
        let imported = decoder.finish().unwrap();
        let assets = imported.wait().unwrap();

        prop_assert_eq!(imported.metadata(), Some(&b"{\"n\":1}"[..]));
        prop_assert!(imported.is_complete());
        prop_assert!(imported.secondary_metadata.is_none());
        prop_assert_eq!(assets.len(), expected.len());
        for (name, bytes) in &expected {
            let id = &assets[name].id;
            prop_assert_eq!(&store.load(id).unwrap(), bytes);
        }
    }
}

mod random_imports {
    use std::sync::Arc;

    use ::rand::Rng;
    use keepsake_durability::archive::{ArchiveExporter, ArchiveOptions, ArchiveReader, ExportAsset};
    use keepsake_durability::pipeline::PipelineConfig;
    use keepsake_storage::{MemoryAssetStore, MemorySink};

    use super::image;

    #[test]
    fn test_random_archives_with_random_failures() {
        let mut rng = ::rand::thread_rng();

        for _ in 0..20 {
            let count = rng.gen_range(0..30);
            let mut exporter =
                ArchiveExporter::new(MemorySink::new(), ArchiveOptions::for_testing()).unwrap();
            exporter.write_payload(b"{}").unwrap();

            let mut expected_failures = Vec::new();
            for i in 0..count {
                let fail = rng.gen_bool(0.2);
                let mut bytes = image(rng.gen(), rng.gen_range(1..2048));
                if fail {
                    bytes.extend_from_slice(b"FAIL");
                }
                let name = exporter
                    .write_asset(ExportAsset::new(format!("r{}", i), "other", "bin"), &bytes)
                    .unwrap();
                if fail {
                    expected_failures.push(name);
                }
            }
            let (sink, _) = exporter.finish().unwrap();
            let archive = sink.into_bytes();

            let store = Arc::new(MemoryAssetStore::new().fail_when(|b| b.ends_with(b"FAIL")));
            let reader = ArchiveReader::new(store).with_pipeline_config(
                PipelineConfig::default()
                    .with_concurrency(rng.gen_range(1..6))
                    .with_queue_ceiling(8),
            );
            let mut decoder = reader.decoder().unwrap();
            let mut offset = 0;
            while offset < archive.len() {
                let end = (offset + rng.gen_range(1..4096)).min(archive.len());
                decoder.push(&archive[offset..end]).unwrap();
                offset = end;
            }
            let report = decoder.finish().unwrap().wait_report().unwrap();

            let mut failed: Vec<_> = report.failures.iter().map(|f| f.name.clone()).collect();
            failed.sort();
            expected_failures.sort();
            assert_eq!(failed, expected_failures);
            assert_eq!(report.assets.len() + failed.len(), count);
        }
    }
}
