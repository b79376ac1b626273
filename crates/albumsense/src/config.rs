//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::augment::AugmentPlan;
use crate::melody::{MelodyConfig, MELODY_WEIGHTS};
use crate::rank::{RankConfig, ScoreScale, DEFAULT_SIMILARITY_THRESHOLD};
use crate::subspace::{ComponentSelection, DEFAULT_VARIANCE_THRESHOLD};
use crate::types::{RetrievalError, RetrievalResult};
use crate::vectorize::{VectorizerConfig, DEFAULT_IMAGE_SIZE};

/// Tunables for building and querying both feature spaces.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub image_width: u32,
    pub image_height: u32,
    pub augmentation: AugmentPlan,
    /// Cumulative explained variance the image subspace must reach.
    pub variance_threshold: f64,
    /// Reduce melody vectors to this many principal components and compare
    /// with plain cosine. `None` compares raw histograms with weighted cosine.
    pub audio_components: Option<usize>,
    pub melody: MelodyConfig,
    pub melody_weights: [f64; 3],
    pub similarity_threshold: f64,
    pub score_scale: ScoreScale,
    pub max_results: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            image_width: DEFAULT_IMAGE_SIZE,
            image_height: DEFAULT_IMAGE_SIZE,
            augmentation: AugmentPlan::standard(),
            variance_threshold: DEFAULT_VARIANCE_THRESHOLD,
            audio_components: None,
            melody: MelodyConfig::default(),
            melody_weights: MELODY_WEIGHTS,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            score_scale: ScoreScale::MinMax,
            max_results: None,
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file.
    pub fn from_file(path: &Path) -> RetrievalResult<Self> {
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no build or query could work with.
    pub fn validate(&self) -> RetrievalResult<()> {
        if self.image_width == 0 || self.image_height == 0 {
            return Err(RetrievalError::InvalidInput(format!(
                "Image size must be positive, got {}x{}",
                self.image_width, self.image_height
            )));
        }
        if self.augmentation.is_empty() {
            return Err(RetrievalError::InvalidInput(
                "Augmentation plan has no transforms".to_string(),
            ));
        }
        if !(self.variance_threshold > 0.0 && self.variance_threshold <= 1.0) {
            return Err(RetrievalError::InvalidInput(format!(
                "Variance threshold must be in (0, 1], got {}",
                self.variance_threshold
            )));
        }
        if self.audio_components == Some(0) {
            return Err(RetrievalError::InvalidInput(
                "Audio components must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.similarity_threshold) {
            return Err(RetrievalError::InvalidInput(format!(
                "Similarity threshold must be in [0, 100], got {}",
                self.similarity_threshold
            )));
        }
        if self.melody_weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(RetrievalError::InvalidInput(
                "Melody weights must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn vectorizer(&self) -> VectorizerConfig {
        VectorizerConfig {
            width: self.image_width,
            height: self.image_height,
        }
    }

    pub fn image_selection(&self) -> ComponentSelection {
        ComponentSelection::VarianceThreshold(self.variance_threshold)
    }

    pub fn rank_config(&self) -> RankConfig {
        RankConfig {
            threshold: self.similarity_threshold,
            scale: self.score_scale,
            max_results: self.max_results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.vectorizer().feature_len(), 3600);
        assert_eq!(config.augmentation.len(), 6);
        assert_eq!(config.similarity_threshold, 75.0);
        assert_eq!(config.image_selection(), ComponentSelection::VarianceThreshold(0.95));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"similarity_threshold": 60.0, "audio_components": 20, "score_scale": "absolute"}"#,
        )
        .unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.similarity_threshold, 60.0);
        assert_eq!(config.audio_components, Some(20));
        assert_eq!(config.score_scale, ScoreScale::Absolute);
        assert_eq!(config.image_width, 60);
        assert_eq!(config.melody_weights, MELODY_WEIGHTS);
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad = EngineConfig {
            variance_threshold: 1.5,
            ..EngineConfig::default()
        };
        assert!(bad.validate().is_err());

        let bad = EngineConfig {
            augmentation: AugmentPlan::custom(vec![]),
            ..EngineConfig::default()
        };
        assert!(bad.validate().is_err());

        let bad = EngineConfig {
            audio_components: Some(0),
            ..EngineConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
