//! Catalog enumeration and the per-item feature extraction driver.
//!
//! A catalog root holds a `picture/` folder of cover images and an `audio/`
//! folder of songs. Every item is visited in sorted path order so the index
//! order is reproducible; items that fail to decode are reported as
//! [`ItemOutcome::Skipped`] and the rest of the build continues.

use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::augment::{expand, AugmentPlan, Transform};
use crate::capture::decode_from_file;
use crate::melody::{extract, MelodyConfig, PitchSource};
use crate::types::{CatalogItem, ItemOutcome, Modality, RetrievalError, RetrievalResult, Variant};
use crate::vectorize::{vectorize, VectorizerConfig};

/// Sub-folder of the catalog root holding cover images.
pub const PICTURE_DIR: &str = "picture";

/// Sub-folder of the catalog root holding songs.
pub const AUDIO_DIR: &str = "audio";

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp", "tiff", "tif"];

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "ogg", "aac", "m4a", "wma", "mid", "midi",
];

fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Check if a file path has a supported image extension.
pub fn is_supported_image(path: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&extension_of(path).as_str())
}

/// Check if a file path has a supported audio extension.
pub fn is_supported_audio(path: &str) -> bool {
    AUDIO_EXTENSIONS.contains(&extension_of(path).as_str())
}

fn is_resource_fork(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("._"))
        .unwrap_or(false)
}

/// Default sub-folder of a catalog root for a modality.
pub fn modality_dir(root: &Path, modality: Modality) -> PathBuf {
    match modality {
        Modality::Image => root.join(PICTURE_DIR),
        Modality::Audio => root.join(AUDIO_DIR),
    }
}

/// List the supported files directly inside `dir`, sorted by path.
pub fn list_items(dir: &Path, modality: Modality) -> RetrievalResult<Vec<CatalogItem>> {
    if !dir.is_dir() {
        return Err(RetrievalError::InvalidInput(format!(
            "Catalog folder not found: {}",
            dir.display()
        )));
    }

    let supported: fn(&str) -> bool = match modality {
        Modality::Image => is_supported_image,
        Modality::Audio => is_supported_audio,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || is_resource_fork(&path) {
            continue;
        }
        if supported(&path.to_string_lossy()) {
            paths.push(path);
        }
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|p| CatalogItem {
            id: p.display().to_string(),
            modality,
        })
        .collect())
}

/// Decode one catalog image and vectorize each augmented variant.
pub fn image_variants(
    path: &Path,
    plan: &AugmentPlan,
    config: &VectorizerConfig,
) -> RetrievalResult<Vec<Variant>> {
    let img = decode_from_file(path)?;
    let owner_id = path.display().to_string();
    Ok(expand(&img, plan)
        .into_iter()
        .map(|(transform, variant)| Variant {
            owner_id: owner_id.clone(),
            transform,
            features: vectorize(&variant, config),
        })
        .collect())
}

/// Extract the melody feature vector of one catalog song.
pub fn melody_variant(
    path: &Path,
    source: &dyn PitchSource,
    config: &MelodyConfig,
) -> RetrievalResult<Variant> {
    let pitches = source.pitches(path)?;
    Ok(Variant {
        owner_id: path.display().to_string(),
        transform: Transform::Identity,
        features: extract(&pitches, config).concat(),
    })
}

fn record<F>(items: &[CatalogItem], mut per_item: F) -> (Vec<Variant>, Vec<ItemOutcome>)
where
    F: FnMut(&Path) -> RetrievalResult<Vec<Variant>>,
{
    let mut variants = Vec::new();
    let mut outcomes = Vec::with_capacity(items.len());
    for item in items {
        match per_item(Path::new(&item.id)) {
            Ok(found) => {
                tracing::debug!("Processed {} ({} variants)", item.id, found.len());
                outcomes.push(ItemOutcome::Processed {
                    id: item.id.clone(),
                    variants: found.len(),
                });
                variants.extend(found);
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {e}", item.id);
                outcomes.push(ItemOutcome::Skipped {
                    id: item.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    (variants, outcomes)
}

/// Run every image through the augmentation plan and vectorizer.
pub fn collect_image_variants(
    items: &[CatalogItem],
    plan: &AugmentPlan,
    config: &VectorizerConfig,
) -> (Vec<Variant>, Vec<ItemOutcome>) {
    record(items, |path| image_variants(path, plan, config))
}

/// Extract melody features for every song.
pub fn collect_melody_variants(
    items: &[CatalogItem],
    source: &dyn PitchSource,
    config: &MelodyConfig,
) -> (Vec<Variant>, Vec<ItemOutcome>) {
    record(items, |path| Ok(vec![melody_variant(path, source, config)?]))
}

/// Stack variant features into an N×D matrix with the parallel owner ids.
pub fn stack_variants(variants: &[Variant]) -> RetrievalResult<(Array2<f64>, Vec<String>)> {
    let dim = variants.first().map(|v| v.features.len()).unwrap_or(0);
    let mut flat = Vec::with_capacity(variants.len() * dim);
    let mut owners = Vec::with_capacity(variants.len());
    for v in variants {
        if v.features.len() != dim {
            return Err(RetrievalError::DimensionMismatch {
                expected: dim,
                actual: v.features.len(),
            });
        }
        flat.extend_from_slice(&v.features);
        owners.push(v.owner_id.clone());
    }
    let matrix = Array2::from_shape_vec((variants.len(), dim), flat)
        .map_err(|e| RetrievalError::Numeric(format!("Cannot stack variants: {e}")))?;
    Ok((matrix, owners))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::melody::JsonNotesSource;
    use image::{Rgb, RgbImage};

    fn write_png(path: &Path, shade: u8) {
        let img = RgbImage::from_fn(12, 8, |x, y| Rgb([shade, (x * 10) as u8, (y * 20) as u8]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_supported_formats() {
        assert!(is_supported_image("cover.png"));
        assert!(is_supported_image("cover.JPG"));
        assert!(is_supported_image("cover.tif"));
        assert!(!is_supported_image("cover.txt"));
        assert!(is_supported_audio("song.MID"));
        assert!(is_supported_audio("song.mp3"));
        assert!(!is_supported_audio("song.notes.json"));
    }

    #[test]
    fn test_list_items_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "._a.jpg", "notes.txt", "c.webp"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.png")).unwrap();

        let items = list_items(dir.path(), Modality::Image).unwrap();
        let names: Vec<String> = items
            .iter()
            .map(|i| Path::new(&i.id).file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "c.webp"]);
        assert!(items.iter().all(|i| i.modality == Modality::Image));
    }

    #[test]
    fn test_list_items_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_items(&dir.path().join("nope"), Modality::Audio).is_err());
    }

    #[test]
    fn test_collect_images_skips_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("a.png"), 10);
        std::fs::write(dir.path().join("b.png"), b"not a png").unwrap();
        write_png(&dir.path().join("c.png"), 200);

        let items = list_items(dir.path(), Modality::Image).unwrap();
        let config = VectorizerConfig { width: 4, height: 4 };
        let (variants, outcomes) =
            collect_image_variants(&items, &AugmentPlan::standard(), &config);

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_processed());
        assert!(!outcomes[1].is_processed());
        assert!(outcomes[2].is_processed());
        assert_eq!(variants.len(), 12);
        assert!(variants.iter().all(|v| v.features.len() == 16));
        assert_eq!(variants[0].transform, Transform::Identity);

        let (matrix, owners) = stack_variants(&variants).unwrap();
        assert_eq!(matrix.dim(), (12, 16));
        assert_eq!(owners[0], items[0].id);
        assert_eq!(owners[11], items[2].id);
    }

    #[test]
    fn test_collect_melodies_from_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.mid"), b"").unwrap();
        std::fs::write(dir.path().join("one.notes.json"), b"[60, 62, 64]").unwrap();
        std::fs::write(dir.path().join("two.mid"), b"").unwrap();

        let items = list_items(dir.path(), Modality::Audio).unwrap();
        let source = JsonNotesSource::new(None);
        let (variants, outcomes) =
            collect_melody_variants(&items, &source, &MelodyConfig::default());
        assert_eq!(variants.len(), 1);
        assert!(outcomes[0].is_processed());
        assert!(matches!(outcomes[1], ItemOutcome::Skipped { .. }));
    }

    #[test]
    fn test_stack_rejects_ragged() {
        let v = |n: usize| Variant {
            owner_id: "x".into(),
            transform: Transform::Identity,
            features: vec![0.0; n],
        };
        assert!(matches!(
            stack_variants(&[v(3), v(2)]),
            Err(RetrievalError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        let (m, o) = stack_variants(&[]).unwrap();
        assert_eq!(m.dim(), (0, 0));
        assert!(o.is_empty());
    }
}
