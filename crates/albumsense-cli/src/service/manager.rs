//! Engine lifecycle, index persistence, and query output for the CLI.

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use serde::Serialize;

use albumsense::melody::parse_pitch_json;
use albumsense::{
    decode_base64, export_media, load_mapper, AlbumRecord, BuildReport, Engine, EngineConfig,
    FeatureSpace, FeatureSpaceWriter, FsMediaSink, JsonNotesSource, Modality, Preprocessing,
    RankedMatch, ResultArtifact,
};

use crate::config::{load_engine_config, DataPaths};
use crate::error::{CliError, CliResult};

/// A rebuild running on a background thread.
pub type RebuildHandle = JoinHandle<CliResult<BuildReport>>;

/// Summary of one installed feature space.
#[derive(Debug, Clone, Serialize)]
pub struct SpaceInfo {
    pub modality: Modality,
    pub items: usize,
    pub vectors: usize,
    pub input_dims: usize,
    pub components: usize,
    pub metric: String,
    pub preprocessing: Preprocessing,
    pub reduced: bool,
    pub built_at: String,
}

impl SpaceInfo {
    fn from_space(space: &FeatureSpace) -> Self {
        let built_at = chrono::DateTime::from_timestamp(space.built_at as i64, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| space.built_at.to_string());
        let metric = serde_json::to_value(&space.metric)
            .ok()
            .and_then(|v| v.get("kind").and_then(|k| k.as_str()).map(String::from))
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            modality: space.modality,
            items: space.index.distinct_owners(),
            vectors: space.index.len(),
            input_dims: space.input_dim(),
            components: space.index.dim(),
            metric,
            preprocessing: space.preprocessing,
            reduced: space.model.is_some(),
            built_at,
        }
    }
}

/// Snapshot of what the service has loaded.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub data_dir: String,
    pub config: Option<String>,
    pub albums: usize,
    pub similarity_threshold: f64,
    pub image: Option<SpaceInfo>,
    pub audio: Option<SpaceInfo>,
}

/// Owns the engine and knows where indexes, metadata, and results live.
pub struct RetrievalService {
    engine: Arc<Engine>,
    paths: DataPaths,
    albums: Vec<AlbumRecord>,
    export: bool,
}

impl RetrievalService {
    /// Open a data directory: load the config, any saved indexes, and the
    /// album mapper if present.
    pub fn open(paths: DataPaths) -> CliResult<Self> {
        let config = load_engine_config(paths.config.as_deref())?;
        Self::open_with_config(paths, config)
    }

    pub fn open_with_config(paths: DataPaths, config: EngineConfig) -> CliResult<Self> {
        config.validate()?;
        let engine = Arc::new(Engine::new(config));

        for modality in [Modality::Image, Modality::Audio] {
            let file = paths.index_file(modality);
            if file.is_file() {
                engine.load(&file)?;
            } else {
                tracing::debug!("No saved {} index at {}", modality, file.display());
            }
        }

        let mut service = Self {
            engine,
            paths,
            albums: Vec::new(),
            export: true,
        };
        service.reload_mapper()?;

        tracing::info!(
            "Data dir {}: image index {}, audio index {}, {} albums",
            service.paths.root.display(),
            if service.engine.is_loaded(Modality::Image) { "loaded" } else { "missing" },
            if service.engine.is_loaded(Modality::Audio) { "loaded" } else { "missing" },
            service.albums.len()
        );
        Ok(service)
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn albums(&self) -> &[AlbumRecord] {
        &self.albums
    }

    /// Turn copying of matched covers and songs into the result folder on or off.
    pub fn set_export_media(&mut self, export: bool) {
        self.export = export;
    }

    /// Re-read `mapper.json`. A missing file leaves the service with no albums.
    pub fn reload_mapper(&mut self) -> CliResult<usize> {
        let path = self.paths.mapper();
        self.albums = if path.is_file() {
            load_mapper(&path)?
        } else {
            tracing::warn!("No mapper at {}; results will be empty", path.display());
            Vec::new()
        };
        Ok(self.albums.len())
    }

    /// Install a feature space from an arbitrary .fspace file.
    pub fn load_index(&self, path: &Path) -> CliResult<Modality> {
        Ok(self.engine.load(path)?)
    }

    /// Build, install, and save the index for a modality.
    pub fn build(&self, modality: Modality) -> CliResult<BuildReport> {
        rebuild(&self.engine, &self.paths, modality)
    }

    /// Rebuild on a background thread. Queries keep using the previous
    /// snapshot until the new one is installed.
    pub fn spawn_rebuild(&self, modality: Modality) -> CliResult<RebuildHandle> {
        let engine = Arc::clone(&self.engine);
        let paths = self.paths.clone();
        std::thread::Builder::new()
            .name(format!("rebuild-{modality}"))
            .spawn(move || rebuild(&engine, &paths, modality))
            .map_err(CliError::Io)
    }

    pub fn search_image_file(&self, path: &Path) -> CliResult<ResultArtifact> {
        self.require(Modality::Image)?;
        let matches = self.engine.query_image_file(path)?;
        self.finish(Modality::Image, &matches)
    }

    pub fn search_image_base64(&self, data: &str, mime: &str) -> CliResult<ResultArtifact> {
        self.require(Modality::Image)?;
        let bytes = decode_base64(data)?;
        let matches = self.engine.query_image(&bytes, mime)?;
        self.finish(Modality::Image, &matches)
    }

    /// Search by a pitch document (`[60, 62, ...]` or `{"pitches": [...]}`).
    pub fn search_melody_file(&self, path: &Path) -> CliResult<ResultArtifact> {
        let bytes = std::fs::read(path)?;
        let pitches = parse_pitch_json(&bytes)?;
        self.search_pitches(&pitches)
    }

    pub fn search_pitches(&self, pitches: &[u8]) -> CliResult<ResultArtifact> {
        self.require(Modality::Audio)?;
        let matches = self.engine.query_melody(pitches)?;
        self.finish(Modality::Audio, &matches)
    }

    fn require(&self, modality: Modality) -> CliResult<()> {
        if self.engine.is_loaded(modality) {
            Ok(())
        } else {
            Err(CliError::MissingIndex(modality))
        }
    }

    /// Join, write `result.json`, and copy media.
    fn finish(&self, modality: Modality, matches: &[RankedMatch]) -> CliResult<ResultArtifact> {
        let artifact = self.engine.artifact(modality, matches, &self.albums);
        tracing::info!(
            "{} search: {} matches above threshold, {} joined",
            modality,
            matches.len(),
            artifact.results.len()
        );

        artifact.write_to_file(&self.paths.result_file())?;
        if self.export {
            let sink = FsMediaSink::new(self.paths.result_dir());
            export_media(&artifact, &self.paths.root, &sink)?;
        }
        Ok(artifact)
    }

    pub fn info(&self) -> ServiceInfo {
        let space = |m| self.engine.snapshot(m).ok().map(|s| SpaceInfo::from_space(&s));
        ServiceInfo {
            data_dir: self.paths.root.display().to_string(),
            config: self.paths.config.as_ref().map(|p| p.display().to_string()),
            albums: self.albums.len(),
            similarity_threshold: self.engine.config().similarity_threshold,
            image: space(Modality::Image),
            audio: space(Modality::Audio),
        }
    }
}

/// Wait for a background rebuild. A panicked thread becomes
/// [`CliError::Rebuild`].
pub fn join_rebuild(handle: RebuildHandle) -> CliResult<BuildReport> {
    handle.join().unwrap_or_else(|panic| {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "thread panicked".to_string());
        Err(CliError::Rebuild(reason))
    })
}

/// Build a space, persist it, then install it. The file always holds the
/// space this call built, whatever else was installed meanwhile.
fn rebuild(engine: &Engine, paths: &DataPaths, modality: Modality) -> CliResult<BuildReport> {
    let dir = paths.catalog_dir(modality);
    let (space, report) = match modality {
        Modality::Image => engine.build_image_space(&dir)?,
        Modality::Audio => {
            let source = JsonNotesSource::new(paths.notes.clone());
            engine.build_audio_space(&dir, &source)?
        }
    };
    FeatureSpaceWriter::write_to_file(&space, &paths.index_file(modality))?;
    engine.install(space);
    for (id, reason) in &report.skipped {
        tracing::debug!("Skipped {id}: {reason}");
    }
    Ok(report)
}
