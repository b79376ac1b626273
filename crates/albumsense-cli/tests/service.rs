//! Integration tests for the albumsense-cli retrieval service.
//!
//! Each test lays out a small data directory (covers, songs with pitch
//! sidecars, mapper.json) in a temp folder and drives the service against it.

use std::path::Path;

use image::{Rgb, RgbImage};

use albumsense::{EngineConfig, FeatureSpaceReader, Modality};
use albumsense_cli::config::DataPaths;
use albumsense_cli::service::{join_rebuild, RebuildHandle};
use albumsense_cli::{CliError, RetrievalService};

// ─────────────────────── helpers ───────────────────────

const MAPPER: &str = r#"[
    {"id": "1", "title": "Warm Fade", "imageSrc": "covers/warm.png",
     "songs": [{"file": "rise.mid", "title": "Rise"}]},
    {"id": "2", "title": "Grid", "imageSrc": "covers/grid.png",
     "songs": [{"file": "fall.mid", "title": "Fall"}]}
]"#;

fn data_dir(root: &Path) {
    let pictures = root.join("picture");
    let audio = root.join("audio");
    std::fs::create_dir_all(&pictures).unwrap();
    std::fs::create_dir_all(&audio).unwrap();

    RgbImage::from_fn(20, 20, |x, y| Rgb([200, (x * 12) as u8, (y * 6) as u8]))
        .save(pictures.join("warm.png"))
        .unwrap();
    RgbImage::from_fn(20, 20, |x, y| {
        if (x / 5 + y / 5) % 2 == 0 {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    })
    .save(pictures.join("grid.png"))
    .unwrap();

    for (name, pitches) in [("rise", "[60, 62, 64, 67, 72]"), ("fall", "[72, 67, 64, 62, 60]")] {
        std::fs::write(audio.join(format!("{name}.mid")), b"MThd").unwrap();
        std::fs::write(audio.join(format!("{name}.notes.json")), pitches).unwrap();
    }

    std::fs::write(root.join("mapper.json"), MAPPER).unwrap();
}

fn open(root: &Path) -> RetrievalService {
    let paths = DataPaths::resolve(Some(root), Some(&root.join("absent.json")));
    RetrievalService::open_with_config(paths, EngineConfig::default()).unwrap()
}

// ─────────────────────── lifecycle ───────────────────────

#[test]
fn search_without_index_reports_missing() {
    let dir = tempfile::tempdir().unwrap();
    data_dir(dir.path());
    let service = open(dir.path());

    let err = service
        .search_image_file(&dir.path().join("picture").join("warm.png"))
        .unwrap_err();
    assert!(matches!(err, CliError::MissingIndex(Modality::Image)));
    assert!(service.info().image.is_none());
    assert_eq!(service.albums().len(), 2);
}

#[test]
fn build_saves_index_that_reopens() {
    let dir = tempfile::tempdir().unwrap();
    data_dir(dir.path());

    let service = open(dir.path());
    let report = service.build(Modality::Image).unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.variants, 12);
    assert!(service.paths().index_file(Modality::Image).is_file());

    let reopened = open(dir.path());
    let info = reopened.info();
    let image = info.image.expect("image index should load from disk");
    assert_eq!(image.items, 2);
    assert_eq!(image.vectors, 12);
    assert_eq!(image.metric, "euclidean");
    assert!(image.reduced);
    assert!(info.audio.is_none());
}

#[test]
fn saved_index_is_the_space_just_built() {
    let dir = tempfile::tempdir().unwrap();
    data_dir(dir.path());
    let service = open(dir.path());

    for modality in [Modality::Image, Modality::Audio] {
        let handle = service.spawn_rebuild(modality).unwrap();
        join_rebuild(handle).unwrap();
        let file = service.paths().index_file(modality);
        let saved = FeatureSpaceReader::read_from_file(&file).unwrap();
        assert_eq!(saved, *service.engine().snapshot(modality).unwrap());
        assert_eq!(saved.preprocessing, service.engine().preprocessing(modality));
    }
}

#[test]
fn panicked_rebuild_is_reported() {
    let handle: RebuildHandle = std::thread::spawn(|| panic!("catalog vanished"));
    match join_rebuild(handle) {
        Err(CliError::Rebuild(reason)) => assert_eq!(reason, "catalog vanished"),
        other => panic!("expected rebuild error, got {other:?}"),
    }
}

#[test]
fn missing_catalog_folder_fails_build() {
    let dir = tempfile::tempdir().unwrap();
    let service = open(dir.path());
    assert!(service.build(Modality::Audio).is_err());
}

// ─────────────────────── searches ───────────────────────

#[test]
fn image_search_writes_result_and_media() {
    let dir = tempfile::tempdir().unwrap();
    data_dir(dir.path());
    let service = open(dir.path());
    service.build(Modality::Image).unwrap();

    let artifact = service
        .search_image_file(&dir.path().join("picture").join("grid.png"))
        .unwrap();
    assert_eq!(artifact.results[0].title, "Grid");
    assert_eq!(artifact.results[0].percentage, 100.0);

    let result_dir = dir.path().join("result");
    assert!(result_dir.join("result.json").is_file());
    assert!(result_dir.join("picture").join("1.png").is_file());
    assert!(result_dir.join("audio").join("1_fall.mid").is_file());
}

#[test]
fn base64_search_matches_file_search() {
    use base64::Engine as _;

    let dir = tempfile::tempdir().unwrap();
    data_dir(dir.path());
    let mut service = open(dir.path());
    service.set_export_media(false);
    service.build(Modality::Image).unwrap();

    let file = dir.path().join("picture").join("warm.png");
    let encoded = base64::engine::general_purpose::STANDARD.encode(std::fs::read(&file).unwrap());
    let by_b64 = service.search_image_base64(&encoded, "image/png").unwrap();
    let by_file = service.search_image_file(&file).unwrap();
    assert_eq!(by_b64, by_file);
    assert!(!dir.path().join("result").join("picture").exists());

    assert!(service.search_image_base64("%%%", "image/png").is_err());
}

#[test]
fn melody_search_joins_by_song_stem() {
    let dir = tempfile::tempdir().unwrap();
    data_dir(dir.path());
    let service = open(dir.path());
    service.build(Modality::Audio).unwrap();

    let query = dir.path().join("query.json");
    std::fs::write(&query, r#"{"pitches": [60, 62, 64, 67, 72]}"#).unwrap();
    let artifact = service.search_melody_file(&query).unwrap();
    assert_eq!(artifact.modality, Modality::Audio);
    assert_eq!(artifact.results[0].id, "1");
    assert_eq!(artifact.results[0].rank, 1);

    std::fs::write(&query, "[60, 300]").unwrap();
    assert!(service.search_melody_file(&query).is_err());
}

// ─────────────────────── concurrency ───────────────────────

#[test]
fn background_rebuild_keeps_serving_queries() {
    let dir = tempfile::tempdir().unwrap();
    data_dir(dir.path());
    let mut service = open(dir.path());
    service.set_export_media(false);
    service.build(Modality::Image).unwrap();

    let query = dir.path().join("picture").join("warm.png");
    let handle = service.spawn_rebuild(Modality::Image).unwrap();
    for _ in 0..5 {
        let artifact = service.search_image_file(&query).unwrap();
        assert_eq!(artifact.results[0].title, "Warm Fade");
    }
    let report = join_rebuild(handle).unwrap();
    assert_eq!(report.processed, 2);

    let artifact = service.search_image_file(&query).unwrap();
    assert_eq!(artifact.results[0].title, "Warm Fade");
}
