//! Build and query entry points over swappable feature-space snapshots.
//!
//! Each modality has one [`SnapshotSlot`]. Queries take a cheap `Arc` clone
//! of the current snapshot and release the lock before scoring, so a rebuild
//! on another thread only blocks for the single pointer swap.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;
use parking_lot::RwLock;

use crate::capture::{decode_from_bytes, decode_from_file};
use crate::catalog::{collect_image_variants, collect_melody_variants, list_items, stack_variants};
use crate::config::EngineConfig;
use crate::index::{FeatureSpace, Preprocessing, ProjectionIndex};
use crate::mapper::{join, AlbumRecord};
use crate::melody::{extract, PitchSource};
use crate::rank::rank;
use crate::results::ResultArtifact;
use crate::similarity::Metric;
use crate::storage::{FeatureSpaceReader, FeatureSpaceWriter};
use crate::subspace::{fit, ComponentSelection};
use crate::types::{
    BuildReport, ItemOutcome, Modality, RankedMatch, RetrievalError, RetrievalResult, Variant,
};
use crate::vectorize::vectorize;

/// Holder of the current snapshot for one modality.
#[derive(Debug, Default)]
pub struct SnapshotSlot {
    inner: RwLock<Option<Arc<FeatureSpace>>>,
}

impl SnapshotSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<FeatureSpace>> {
        self.inner.read().clone()
    }

    /// Install a new snapshot, returning the one it replaced.
    pub fn replace(&self, space: Arc<FeatureSpace>) -> Option<Arc<FeatureSpace>> {
        self.inner.write().replace(space)
    }

    pub fn clear(&self) -> Option<Arc<FeatureSpace>> {
        self.inner.write().take()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.read().is_some()
    }
}

/// Retrieval engine for album covers and melodies.
#[derive(Debug, Default)]
pub struct Engine {
    config: EngineConfig,
    image: SnapshotSlot,
    audio: SnapshotSlot,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            image: SnapshotSlot::new(),
            audio: SnapshotSlot::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn slot(&self, modality: Modality) -> &SnapshotSlot {
        match modality {
            Modality::Image => &self.image,
            Modality::Audio => &self.audio,
        }
    }

    /// Current snapshot for a modality.
    pub fn snapshot(&self, modality: Modality) -> RetrievalResult<Arc<FeatureSpace>> {
        self.slot(modality)
            .get()
            .ok_or(RetrievalError::IndexUnavailable(modality))
    }

    pub fn is_loaded(&self, modality: Modality) -> bool {
        self.slot(modality).is_loaded()
    }

    /// Make `space` the snapshot for its modality. Returns the previous one.
    pub fn install(&self, space: FeatureSpace) -> Option<Arc<FeatureSpace>> {
        let modality = space.modality;
        tracing::info!(
            "Installing {} feature space: {} vectors, {} dims",
            modality,
            space.index.len(),
            space.index.dim()
        );
        self.slot(modality).replace(Arc::new(space))
    }

    /// Build an image feature space from a folder of cover images.
    ///
    /// The result is not installed; see [`Engine::install`].
    pub fn build_image_space(&self, dir: &Path) -> RetrievalResult<(FeatureSpace, BuildReport)> {
        let start = Instant::now();
        let items = list_items(dir, Modality::Image)?;
        tracing::info!(
            "Building image space from {} items in {} ({} variants each)",
            items.len(),
            dir.display(),
            self.config.augmentation.len()
        );

        let (variants, outcomes) =
            collect_image_variants(&items, &self.config.augmentation, &self.config.vectorizer());
        let (space, report) = self.assemble(
            self.preprocessing(Modality::Image),
            &variants,
            &outcomes,
            Some(self.config.image_selection()),
            Metric::Euclidean,
        )?;

        tracing::info!(
            "Image space ready in {:.2?}: {} items, {} variants, k = {}",
            start.elapsed(),
            report.processed,
            report.variants,
            report.components
        );
        Ok((space, report))
    }

    /// Build an audio feature space from a folder of songs, reading pitch
    /// sequences through `source`.
    pub fn build_audio_space(
        &self,
        dir: &Path,
        source: &dyn PitchSource,
    ) -> RetrievalResult<(FeatureSpace, BuildReport)> {
        let start = Instant::now();
        let items = list_items(dir, Modality::Audio)?;
        tracing::info!("Building audio space from {} items in {}", items.len(), dir.display());

        let (variants, outcomes) = collect_melody_variants(&items, source, &self.config.melody);
        let (selection, metric) = match self.config.audio_components {
            Some(n) => (Some(ComponentSelection::Fixed(n)), Metric::Cosine),
            None => (None, Metric::melody(self.config.melody_weights)),
        };
        let (space, report) = self.assemble(
            self.preprocessing(Modality::Audio),
            &variants,
            &outcomes,
            selection,
            metric,
        )?;

        tracing::info!(
            "Audio space ready in {:.2?}: {} items, {} dims",
            start.elapsed(),
            report.processed,
            report.components
        );
        Ok((space, report))
    }

    fn assemble(
        &self,
        preprocessing: Preprocessing,
        variants: &[Variant],
        outcomes: &[ItemOutcome],
        selection: Option<ComponentSelection>,
        metric: Metric,
    ) -> RetrievalResult<(FeatureSpace, BuildReport)> {
        let mut report = BuildReport::from_outcomes(outcomes);
        if report.processed == 0 {
            return Err(RetrievalError::EmptyCatalog(preprocessing.modality()));
        }

        let (rows, owners) = stack_variants(variants)?;
        report.dimensions = rows.ncols();

        let (model, index) = match selection {
            Some(selection) => {
                let model = fit(&rows, selection)?;
                let index = ProjectionIndex::build(&model, &rows, owners)?;
                (Some(model), index)
            }
            None => (None, ProjectionIndex::new(rows, owners)?),
        };
        report.components = index.dim();

        let space = FeatureSpace::new(preprocessing, metric, model, index)?;
        Ok((space, report))
    }

    /// Build and install the image space.
    pub fn rebuild_image(&self, dir: &Path) -> RetrievalResult<BuildReport> {
        let (space, report) = self.build_image_space(dir)?;
        self.install(space);
        Ok(report)
    }

    /// Build and install the audio space.
    pub fn rebuild_audio(
        &self,
        dir: &Path,
        source: &dyn PitchSource,
    ) -> RetrievalResult<BuildReport> {
        let (space, report) = self.build_audio_space(dir, source)?;
        self.install(space);
        Ok(report)
    }

    /// Preprocessing a space built by this engine would carry.
    pub fn preprocessing(&self, modality: Modality) -> Preprocessing {
        match modality {
            Modality::Image => Preprocessing::Image(self.config.vectorizer()),
            Modality::Audio => Preprocessing::Melody(self.config.melody),
        }
    }

    /// Load a persisted feature space and install it.
    ///
    /// Queries always use the preprocessing stored with the space, even when
    /// it differs from this engine's config.
    pub fn load(&self, path: &Path) -> RetrievalResult<Modality> {
        let space = FeatureSpaceReader::read_from_file(path)?;
        let modality = space.modality;
        if space.preprocessing != self.preprocessing(modality) {
            tracing::warn!(
                "{} index at {} was built with {:?}; config says {:?}. Queries use the stored settings",
                modality,
                path.display(),
                space.preprocessing,
                self.preprocessing(modality)
            );
        }
        self.install(space);
        Ok(modality)
    }

    /// Persist the current snapshot of a modality.
    pub fn save(&self, modality: Modality, path: &Path) -> RetrievalResult<()> {
        let space = self.snapshot(modality)?;
        FeatureSpaceWriter::write_to_file(&space, path)
    }

    /// Rank catalog items against an already-extracted feature vector.
    pub fn query_features(
        &self,
        modality: Modality,
        features: &[f64],
    ) -> RetrievalResult<Vec<RankedMatch>> {
        let space = self.snapshot(modality)?;
        self.query_space(&space, features)
    }

    fn query_space(
        &self,
        space: &FeatureSpace,
        features: &[f64],
    ) -> RetrievalResult<Vec<RankedMatch>> {
        let start = Instant::now();
        let scores = space.score(features)?;
        let ranked = rank(
            space.index.owner_ids(),
            &scores,
            &space.metric,
            &self.config.rank_config(),
        );
        tracing::debug!(
            "{} query scored {} vectors in {:.2?}, {} matches",
            space.modality,
            scores.len(),
            start.elapsed(),
            ranked.len()
        );
        Ok(ranked)
    }

    /// Query by encoded image bytes and their declared media type.
    pub fn query_image(&self, bytes: &[u8], mime: &str) -> RetrievalResult<Vec<RankedMatch>> {
        let space = self.snapshot(Modality::Image)?;
        let img = decode_from_bytes(bytes, mime)?;
        self.query_decoded(&space, &img)
    }

    /// Query by an image file on disk.
    pub fn query_image_file(&self, path: &Path) -> RetrievalResult<Vec<RankedMatch>> {
        let space = self.snapshot(Modality::Image)?;
        let img = decode_from_file(path)?;
        self.query_decoded(&space, &img)
    }

    fn query_decoded(
        &self,
        space: &FeatureSpace,
        img: &DynamicImage,
    ) -> RetrievalResult<Vec<RankedMatch>> {
        let features = vectorize(img, &space.preprocessing.vectorizer()?);
        self.query_space(space, &features)
    }

    /// Query by a MIDI pitch sequence.
    pub fn query_melody(&self, pitches: &[u8]) -> RetrievalResult<Vec<RankedMatch>> {
        let space = self.snapshot(Modality::Audio)?;
        let features = extract(pitches, &space.preprocessing.melody()?).concat();
        self.query_space(&space, &features)
    }

    /// Join ranked matches with album metadata into a result artifact.
    pub fn artifact(
        &self,
        modality: Modality,
        matches: &[RankedMatch],
        albums: &[AlbumRecord],
    ) -> ResultArtifact {
        ResultArtifact::new(
            modality,
            self.config.similarity_threshold,
            join(matches, albums, modality),
        )
    }
}
