//! Distance and similarity metrics over feature vectors.

use serde::{Deserialize, Serialize};

use crate::index::ProjectionIndex;
use crate::melody::{MELODY_SEGMENTS, MELODY_WEIGHTS};
use crate::types::{RetrievalError, RetrievalResult};

/// Whether smaller or larger raw scores mean "more similar".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    LowerIsBetter,
    HigherIsBetter,
}

impl Orientation {
    /// True if `a` is a strictly better score than `b`.
    pub fn better(self, a: f64, b: f64) -> bool {
        match self {
            Orientation::LowerIsBetter => a < b,
            Orientation::HigherIsBetter => a > b,
        }
    }
}

/// Metric used to compare a query against index rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metric {
    /// L2 distance.
    Euclidean,
    /// Cosine similarity.
    Cosine,
    /// Weighted sum of per-segment cosine similarities.
    WeightedCosine {
        segments: Vec<usize>,
        weights: Vec<f64>,
    },
}

impl Metric {
    /// Weighted cosine over the ATB/RTB/FTB segments of a melody vector.
    pub fn melody(weights: [f64; 3]) -> Self {
        Metric::WeightedCosine {
            segments: MELODY_SEGMENTS.to_vec(),
            weights: weights.to_vec(),
        }
    }

    pub fn orientation(&self) -> Orientation {
        match self {
            Metric::Euclidean => Orientation::LowerIsBetter,
            Metric::Cosine | Metric::WeightedCosine { .. } => Orientation::HigherIsBetter,
        }
    }

    /// Score of two identical non-zero vectors, or `None` for distances.
    pub fn max_score(&self) -> Option<f64> {
        match self {
            Metric::Euclidean => None,
            Metric::Cosine => Some(1.0),
            Metric::WeightedCosine { weights, .. } => Some(weights.iter().sum()),
        }
    }

    /// Check the metric can be applied to vectors of length `dim`.
    pub fn validate(&self, dim: usize) -> RetrievalResult<()> {
        if let Metric::WeightedCosine { segments, weights } = self {
            if segments.len() != weights.len() {
                return Err(RetrievalError::InvalidInput(format!(
                    "Weighted cosine has {} segments but {} weights",
                    segments.len(),
                    weights.len()
                )));
            }
            let total: usize = segments.iter().sum();
            if total != dim {
                return Err(RetrievalError::DimensionMismatch {
                    expected: total,
                    actual: dim,
                });
            }
        }
        Ok(())
    }

    pub fn score(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Metric::Euclidean => euclidean_distance(a, b),
            Metric::Cosine => cosine_similarity(a, b),
            Metric::WeightedCosine { segments, weights } => {
                weighted_cosine(a, b, segments, weights)
            }
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Mismatched lengths, empty input, or a zero-norm side all give 0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    dot / denom
}

/// L2 distance. Lengths must match; extra trailing values are ignored.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// `Σ wᵢ · cos(aᵢ, bᵢ)` over consecutive segments of the two vectors.
pub fn weighted_cosine(a: &[f64], b: &[f64], segments: &[usize], weights: &[f64]) -> f64 {
    let mut offset = 0;
    let mut total = 0.0;
    for (&len, &w) in segments.iter().zip(weights.iter()) {
        let end = offset + len;
        if end > a.len() || end > b.len() {
            break;
        }
        total += w * cosine_similarity(&a[offset..end], &b[offset..end]);
        offset = end;
    }
    total
}

/// Weighted cosine of two melody vectors with the default weights.
pub fn melody_similarity(a: &[f64], b: &[f64]) -> f64 {
    weighted_cosine(a, b, &MELODY_SEGMENTS, &MELODY_WEIGHTS)
}

/// Score a query against every row of the index, preserving index order.
pub fn score_all(metric: &Metric, query: &[f64], index: &ProjectionIndex) -> RetrievalResult<Vec<f64>> {
    if query.len() != index.dim() {
        return Err(RetrievalError::DimensionMismatch {
            expected: index.dim(),
            actual: query.len(),
        });
    }
    Ok(index.rows()?.map(|row| metric.score(query, row)).collect())
}
