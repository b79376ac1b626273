//! End-to-end tests: catalog folder → feature space → query → joined results.

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

use albumsense::{
    export_media, load_mapper, AugmentPlan, Engine, EngineConfig, FsMediaSink, JsonNotesSource,
    MelodyConfig, Modality, Preprocessing, RetrievalError, Transform, VectorizerConfig, AUDIO_DIR,
    PICTURE_DIR,
};

// ─────────────────────── helpers ───────────────────────

fn gradient(path: &Path) {
    let img = RgbImage::from_fn(32, 24, |x, y| Rgb([(x * 8) as u8, (y * 10) as u8, 40]));
    img.save(path).unwrap();
}

fn checker(path: &Path) {
    let img = RgbImage::from_fn(32, 24, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 {
            Rgb([250, 250, 250])
        } else {
            Rgb([10, 30, 10])
        }
    });
    img.save(path).unwrap();
}

/// Identity, the three rotations, both flips, and two photometric variants.
fn eight_variant_plan() -> AugmentPlan {
    let mut transforms = AugmentPlan::standard().transforms;
    transforms.push(Transform::Brightness(0.8));
    transforms.push(Transform::Contrast(1.2));
    AugmentPlan::custom(transforms)
}

fn image_catalog(root: &Path) -> (PathBuf, PathBuf) {
    let pictures = root.join(PICTURE_DIR);
    std::fs::create_dir_all(&pictures).unwrap();
    let a = pictures.join("gradient.png");
    let b = pictures.join("checker.png");
    gradient(&a);
    checker(&b);
    (a, b)
}

const MELODIES: &[(&str, &[u8])] = &[
    ("ascending", &[60, 62, 64, 65, 67, 69, 71, 72]),
    ("descending", &[72, 71, 69, 67, 65, 64, 62, 60]),
    ("hook", &[60, 60, 67, 67, 69, 69, 67]),
];

fn audio_catalog(root: &Path) -> PathBuf {
    let audio = root.join(AUDIO_DIR);
    std::fs::create_dir_all(&audio).unwrap();
    for (name, pitches) in MELODIES {
        std::fs::write(audio.join(format!("{name}.mid")), b"MThd").unwrap();
        std::fs::write(
            audio.join(format!("{name}.notes.json")),
            serde_json::to_vec(pitches).unwrap(),
        )
        .unwrap();
    }
    audio
}

fn image_engine() -> Engine {
    Engine::new(EngineConfig {
        augmentation: eight_variant_plan(),
        ..EngineConfig::default()
    })
}

// ─────────────────────── image path ───────────────────────

#[test]
fn query_with_catalog_original_ranks_itself_first() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = image_catalog(dir.path());
    let engine = image_engine();

    let report = engine.rebuild_image(&dir.path().join(PICTURE_DIR)).unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.variants, 16);
    assert_eq!(report.dimensions, 3600);
    assert!(report.components >= 1);

    let space = engine.snapshot(Modality::Image).unwrap();
    assert_eq!(space.index.len(), 16);
    assert_eq!(space.index.distinct_owners(), 2);

    for (query, other) in [(&a, &b), (&b, &a)] {
        let ranked = engine.query_image_file(query).unwrap();
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].owner_id, query.display().to_string());
        assert_eq!(ranked[0].percentage, 100.0);
        assert!(ranked
            .iter()
            .all(|m| m.owner_id != other.display().to_string() || m.percentage >= 75.0));
    }
}

#[test]
fn query_by_bytes_matches_query_by_file() {
    let dir = tempfile::tempdir().unwrap();
    let (a, _) = image_catalog(dir.path());
    let engine = image_engine();
    engine.rebuild_image(&dir.path().join(PICTURE_DIR)).unwrap();

    let bytes = std::fs::read(&a).unwrap();
    let by_bytes = engine.query_image(&bytes, "image/png").unwrap();
    let by_file = engine.query_image_file(&a).unwrap();
    assert_eq!(by_bytes, by_file);

    assert!(engine.query_image(b"", "image/png").is_err());
    assert!(engine.query_image(b"not an image", "image/png").is_err());
}

#[test]
fn rotated_query_finds_its_source() {
    let dir = tempfile::tempdir().unwrap();
    let (a, _) = image_catalog(dir.path());
    let engine = image_engine();
    engine.rebuild_image(&dir.path().join(PICTURE_DIR)).unwrap();

    let rotated = dir.path().join("rotated.png");
    image::open(&a).unwrap().rotate90().save(&rotated).unwrap();

    let ranked = engine.query_image_file(&rotated).unwrap();
    assert_eq!(ranked[0].owner_id, a.display().to_string());
}

#[test]
fn corrupt_catalog_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let pictures = dir.path().join(PICTURE_DIR);
    std::fs::create_dir_all(&pictures).unwrap();
    std::fs::write(pictures.join("broken.jpg"), b"\xFF\xD8 truncated").unwrap();

    let engine = Engine::default();
    assert!(matches!(
        engine.build_image_space(&pictures),
        Err(RetrievalError::EmptyCatalog(Modality::Image))
    ));
    assert!(!engine.is_loaded(Modality::Image));
}

#[test]
fn persisted_space_answers_identically() {
    let dir = tempfile::tempdir().unwrap();
    let (a, _) = image_catalog(dir.path());
    let engine = image_engine();
    engine.rebuild_image(&dir.path().join(PICTURE_DIR)).unwrap();

    let path = dir.path().join("index").join("image.fspace");
    engine.save(Modality::Image, &path).unwrap();

    let restored = image_engine();
    assert_eq!(restored.load(&path).unwrap(), Modality::Image);
    assert_eq!(
        *restored.snapshot(Modality::Image).unwrap(),
        *engine.snapshot(Modality::Image).unwrap()
    );
    assert_eq!(
        restored.query_image_file(&a).unwrap(),
        engine.query_image_file(&a).unwrap()
    );
}

#[test]
fn loaded_image_space_keeps_its_own_image_size() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = image_catalog(dir.path());
    let tall = Engine::new(EngineConfig {
        image_width: 30,
        image_height: 120,
        augmentation: eight_variant_plan(),
        ..EngineConfig::default()
    });
    tall.rebuild_image(&dir.path().join(PICTURE_DIR)).unwrap();
    let path = dir.path().join("image.fspace");
    tall.save(Modality::Image, &path).unwrap();

    // Same vector length, transposed layout.
    let wide = Engine::new(EngineConfig {
        image_width: 120,
        image_height: 30,
        ..EngineConfig::default()
    });
    wide.load(&path).unwrap();
    assert_eq!(
        wide.snapshot(Modality::Image).unwrap().preprocessing,
        Preprocessing::Image(VectorizerConfig {
            width: 30,
            height: 120
        })
    );
    for query in [&a, &b] {
        assert_eq!(
            wide.query_image_file(query).unwrap(),
            tall.query_image_file(query).unwrap()
        );
    }
}

#[test]
fn loaded_melody_space_keeps_its_own_normalization() {
    let dir = tempfile::tempdir().unwrap();
    let audio = audio_catalog(dir.path());
    let normalized = Engine::default();
    normalized
        .rebuild_audio(&audio, &JsonNotesSource::new(None))
        .unwrap();
    let path = dir.path().join("audio.fspace");
    normalized.save(Modality::Audio, &path).unwrap();

    let raw = Engine::new(EngineConfig {
        melody: MelodyConfig { normalize: false },
        ..EngineConfig::default()
    });
    raw.load(&path).unwrap();
    assert_eq!(
        raw.snapshot(Modality::Audio).unwrap().preprocessing,
        Preprocessing::Melody(MelodyConfig { normalize: true })
    );
    for (_, pitches) in MELODIES {
        assert_eq!(
            raw.query_melody(pitches).unwrap(),
            normalized.query_melody(pitches).unwrap()
        );
    }
}

#[test]
fn results_join_metadata_and_export_media() {
    let dir = tempfile::tempdir().unwrap();
    let (a, _) = image_catalog(dir.path());
    audio_catalog(dir.path());

    let mapper = dir.path().join("mapper.json");
    std::fs::write(
        &mapper,
        r#"[
            {"id": "7", "title": "Slopes", "imageSrc": "covers/gradient.png",
             "songs": [{"file": "ascending.mid", "title": "Up"}]},
            {"id": "8", "title": "Tiles", "imageSrc": "covers/checker.png", "songs": []}
        ]"#,
    )
    .unwrap();
    let albums = load_mapper(&mapper).unwrap();

    let engine = image_engine();
    engine.rebuild_image(&dir.path().join(PICTURE_DIR)).unwrap();
    let ranked = engine.query_image_file(&a).unwrap();
    let artifact = engine.artifact(Modality::Image, &ranked, &albums);

    assert_eq!(artifact.threshold, 75.0);
    assert_eq!(artifact.results[0].id, "7");
    assert_eq!(artifact.results[0].title, "Slopes");
    assert_eq!(artifact.results[0].rank, 1);

    let out = dir.path().join("result");
    let sink = FsMediaSink::new(&out);
    let placed = export_media(&artifact, dir.path(), &sink).unwrap();
    assert!(placed >= 2);
    assert!(out.join(PICTURE_DIR).join("1.png").is_file());
    assert!(out.join(AUDIO_DIR).join("1_ascending.mid").is_file());

    let json_path = out.join("result.json");
    artifact.write_to_file(&json_path).unwrap();
    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(json_path).unwrap()).unwrap();
    assert_eq!(json["results"][0]["similarity_percentage"], 100.0);
}

// ─────────────────────── melody path ───────────────────────

#[test]
fn melody_query_ranks_itself_first() {
    let dir = tempfile::tempdir().unwrap();
    let audio = audio_catalog(dir.path());
    let engine = Engine::default();
    let report = engine
        .rebuild_audio(&audio, &JsonNotesSource::new(None))
        .unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(report.components, 638);

    for (name, pitches) in MELODIES {
        let ranked = engine.query_melody(pitches).unwrap();
        assert_eq!(ranked[0].percentage, 100.0);
        assert!(ranked[0].owner_id.ends_with(&format!("{name}.mid")));
    }
}

#[test]
fn reduced_melody_space_uses_cosine() {
    let dir = tempfile::tempdir().unwrap();
    let audio = audio_catalog(dir.path());
    let engine = Engine::new(EngineConfig {
        audio_components: Some(20),
        ..EngineConfig::default()
    });
    engine
        .rebuild_audio(&audio, &JsonNotesSource::new(None))
        .unwrap();

    let space = engine.snapshot(Modality::Audio).unwrap();
    assert!(space.model.is_some());
    assert!(space.index.dim() <= 3);

    let ranked = engine.query_melody(MELODIES[2].1).unwrap();
    assert!(ranked[0].owner_id.ends_with("hook.mid"));
}

#[test]
fn queries_before_build_are_unavailable() {
    let engine = Engine::default();
    assert!(matches!(
        engine.query_melody(&[60; 4]),
        Err(RetrievalError::IndexUnavailable(Modality::Audio))
    ));
    let dir = tempfile::tempdir().unwrap();
    let (a, _) = image_catalog(dir.path());
    assert!(matches!(
        engine.query_image_file(&a),
        Err(RetrievalError::IndexUnavailable(Modality::Image))
    ));
}
