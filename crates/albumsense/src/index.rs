//! Projected catalog index and the feature-space snapshot queried against it.

use std::collections::HashSet;

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::melody::{MelodyConfig, MELODY_FEATURE_LEN};
use crate::similarity::{score_all, Metric};
use crate::subspace::SubspaceModel;
use crate::types::{Modality, RetrievalError, RetrievalResult};
use crate::vectorize::VectorizerConfig;

/// Project a feature vector: `(vector - mean) · basis`.
pub fn project(model: &SubspaceModel, vector: &[f64]) -> RetrievalResult<Array1<f64>> {
    if vector.len() != model.dim() {
        return Err(RetrievalError::DimensionMismatch {
            expected: model.dim(),
            actual: vector.len(),
        });
    }
    let centered = &ArrayView1::from(vector) - model.mean();
    Ok(centered.dot(model.basis()))
}

/// Project every row of an N×D matrix.
pub fn project_rows(model: &SubspaceModel, rows: &Array2<f64>) -> RetrievalResult<Array2<f64>> {
    if rows.ncols() != model.dim() {
        return Err(RetrievalError::DimensionMismatch {
            expected: model.dim(),
            actual: rows.ncols(),
        });
    }
    let centered = rows - model.mean();
    Ok(centered.dot(model.basis()))
}

/// Parallel arrays of projected variant vectors and the catalog item each one
/// belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionIndex {
    projected: Array2<f64>,
    owner_ids: Vec<String>,
}

impl ProjectionIndex {
    pub fn new(projected: Array2<f64>, owner_ids: Vec<String>) -> RetrievalResult<Self> {
        if projected.nrows() != owner_ids.len() {
            return Err(RetrievalError::InvalidInput(format!(
                "Index has {} vectors but {} owner ids",
                projected.nrows(),
                owner_ids.len()
            )));
        }
        Ok(Self {
            projected: projected.as_standard_layout().into_owned(),
            owner_ids,
        })
    }

    /// Project all variant rows through the model.
    pub fn build(
        model: &SubspaceModel,
        rows: &Array2<f64>,
        owner_ids: Vec<String>,
    ) -> RetrievalResult<Self> {
        Self::new(project_rows(model, rows)?, owner_ids)
    }

    pub fn len(&self) -> usize {
        self.owner_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owner_ids.is_empty()
    }

    /// Width of each stored vector.
    pub fn dim(&self) -> usize {
        self.projected.ncols()
    }

    pub fn projected(&self) -> &Array2<f64> {
        &self.projected
    }

    pub fn owner_ids(&self) -> &[String] {
        &self.owner_ids
    }

    /// Number of distinct catalog items in the index.
    pub fn distinct_owners(&self) -> usize {
        self.owner_ids.iter().collect::<HashSet<_>>().len()
    }

    /// Row-major view of the stored vectors.
    pub(crate) fn rows(&self) -> RetrievalResult<impl Iterator<Item = &[f64]>> {
        let width = self.dim().max(1);
        let flat = self
            .projected
            .as_slice()
            .ok_or_else(|| RetrievalError::Storage("Index matrix is not contiguous".to_string()))?;
        Ok(flat.chunks_exact(width))
    }
}

/// How raw inputs were turned into feature vectors when a space was built.
///
/// Queries against the space must go through the same settings, so they
/// travel with the snapshot and its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preprocessing {
    Image(VectorizerConfig),
    Melody(MelodyConfig),
}

impl Preprocessing {
    pub fn modality(&self) -> Modality {
        match self {
            Preprocessing::Image(_) => Modality::Image,
            Preprocessing::Melody(_) => Modality::Audio,
        }
    }

    /// Length of the raw feature vectors these settings produce.
    pub fn feature_len(&self) -> usize {
        match self {
            Preprocessing::Image(v) => v.feature_len(),
            Preprocessing::Melody(_) => MELODY_FEATURE_LEN,
        }
    }

    pub fn vectorizer(&self) -> RetrievalResult<VectorizerConfig> {
        match self {
            Preprocessing::Image(v) => Ok(*v),
            Preprocessing::Melody(_) => Err(RetrievalError::InvalidInput(
                "Melody space has no image vectorizer".to_string(),
            )),
        }
    }

    pub fn melody(&self) -> RetrievalResult<MelodyConfig> {
        match self {
            Preprocessing::Melody(m) => Ok(*m),
            Preprocessing::Image(_) => Err(RetrievalError::InvalidInput(
                "Image space has no melody settings".to_string(),
            )),
        }
    }
}

/// Everything needed to answer queries for one modality: the preprocessing
/// settings, the optional reduction model, the metric, and the projected
/// catalog.
///
/// Snapshots are immutable; a rebuild produces a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpace {
    pub modality: Modality,
    pub preprocessing: Preprocessing,
    pub metric: Metric,
    pub model: Option<SubspaceModel>,
    pub index: ProjectionIndex,
    pub built_at: u64,
}

impl FeatureSpace {
    pub fn new(
        preprocessing: Preprocessing,
        metric: Metric,
        model: Option<SubspaceModel>,
        index: ProjectionIndex,
    ) -> RetrievalResult<Self> {
        let built_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self::with_timestamp(preprocessing, metric, model, index, built_at)
    }

    pub fn with_timestamp(
        preprocessing: Preprocessing,
        metric: Metric,
        model: Option<SubspaceModel>,
        index: ProjectionIndex,
        built_at: u64,
    ) -> RetrievalResult<Self> {
        if let Some(model) = &model {
            if model.k() != index.dim() {
                return Err(RetrievalError::DimensionMismatch {
                    expected: model.k(),
                    actual: index.dim(),
                });
            }
        }
        let input_dim = match &model {
            Some(model) => model.dim(),
            None => index.dim(),
        };
        if input_dim != preprocessing.feature_len() {
            return Err(RetrievalError::DimensionMismatch {
                expected: preprocessing.feature_len(),
                actual: input_dim,
            });
        }
        metric.validate(index.dim())?;
        Ok(Self {
            modality: preprocessing.modality(),
            preprocessing,
            metric,
            model,
            index,
            built_at,
        })
    }

    /// Length of the raw feature vectors this space accepts.
    pub fn input_dim(&self) -> usize {
        match &self.model {
            Some(model) => model.dim(),
            None => self.index.dim(),
        }
    }

    /// Map a raw feature vector into the index space.
    pub fn embed(&self, features: &[f64]) -> RetrievalResult<Vec<f64>> {
        match &self.model {
            Some(model) => Ok(project(model, features)?.to_vec()),
            None => {
                if features.len() != self.index.dim() {
                    return Err(RetrievalError::DimensionMismatch {
                        expected: self.index.dim(),
                        actual: features.len(),
                    });
                }
                Ok(features.to_vec())
            }
        }
    }

    /// Raw score of a raw feature vector against every index row, in index order.
    pub fn score(&self, features: &[f64]) -> RetrievalResult<Vec<f64>> {
        let query = self.embed(features)?;
        score_all(&self.metric, &query, &self.index)
    }
}
