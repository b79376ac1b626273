//! Result artifact and media export for a finished query.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::{AUDIO_DIR, PICTURE_DIR};
use crate::types::{Modality, RankedResult, RetrievalResult};

/// File name of the JSON result artifact.
pub const RESULT_FILE: &str = "result.json";

/// Everything a query produced, ready to serialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultArtifact {
    pub modality: Modality,
    pub threshold: f64,
    pub results: Vec<RankedResult>,
}

impl ResultArtifact {
    pub fn new(modality: Modality, threshold: f64, results: Vec<RankedResult>) -> Self {
        Self {
            modality,
            threshold,
            results,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn to_json(&self) -> RetrievalResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to_file(&self, path: &Path) -> RetrievalResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Kind of media file placed next to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Picture,
    Audio,
}

/// Destination for the cover art and songs of ranked results.
pub trait MediaSink {
    /// Clear whatever a previous query left behind.
    fn prepare(&self) -> RetrievalResult<()>;

    /// Place one media file for the result at `rank`. Returns the destination.
    fn place(&self, rank: usize, kind: MediaKind, source: &Path) -> RetrievalResult<PathBuf>;
}

/// Copies media into `<root>/picture/` and `<root>/audio/`.
#[derive(Debug, Clone)]
pub struct FsMediaSink {
    root: PathBuf,
}

impl FsMediaSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, kind: MediaKind) -> PathBuf {
        match kind {
            MediaKind::Picture => self.root.join(PICTURE_DIR),
            MediaKind::Audio => self.root.join(AUDIO_DIR),
        }
    }
}

impl MediaSink for FsMediaSink {
    fn prepare(&self) -> RetrievalResult<()> {
        for kind in [MediaKind::Picture, MediaKind::Audio] {
            let dir = self.dir(kind);
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    fn place(&self, rank: usize, kind: MediaKind, source: &Path) -> RetrievalResult<PathBuf> {
        let name = match kind {
            MediaKind::Picture => {
                let ext = source
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("jpg");
                format!("{rank}.{ext}")
            }
            MediaKind::Audio => {
                let file = source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("{rank}_{file}")
            }
        };
        let dest = self.dir(kind).join(name);
        std::fs::copy(source, &dest)?;
        Ok(dest)
    }
}

/// Where a result's cover lives: `imageSrc` as given if that exists, else the
/// file of that name in the catalog's picture folder.
pub fn resolve_picture(catalog_root: &Path, image_src: &str) -> PathBuf {
    let direct = PathBuf::from(image_src);
    if direct.is_file() {
        return direct;
    }
    let name = Path::new(image_src)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_default();
    catalog_root.join(PICTURE_DIR).join(name)
}

/// Where a song file lives in the catalog.
pub fn resolve_song(catalog_root: &Path, file: &str) -> PathBuf {
    catalog_root.join(AUDIO_DIR).join(file)
}

/// Clear the sink and place the cover and songs of every result.
///
/// Individual copy failures are logged and skipped; the number of files
/// placed is returned.
pub fn export_media(
    artifact: &ResultArtifact,
    catalog_root: &Path,
    sink: &dyn MediaSink,
) -> RetrievalResult<usize> {
    sink.prepare()?;
    let mut placed = 0;
    for result in &artifact.results {
        let picture = resolve_picture(catalog_root, &result.image_src);
        match sink.place(result.rank, MediaKind::Picture, &picture) {
            Ok(_) => placed += 1,
            Err(e) => tracing::warn!("Could not copy cover {}: {e}", picture.display()),
        }
        for song in &result.songs {
            let source = resolve_song(catalog_root, &song.file);
            match sink.place(result.rank, MediaKind::Audio, &source) {
                Ok(_) => placed += 1,
                Err(e) => tracing::warn!("Could not copy song {}: {e}", source.display()),
            }
        }
    }
    tracing::info!("Exported {placed} media files for {} results", artifact.results.len());
    Ok(placed)
}
