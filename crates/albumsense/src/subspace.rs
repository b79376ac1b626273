//! Principal-component subspace fitting.
//!
//! A [`SubspaceModel`] is the column mean of the training matrix plus the
//! leading eigenvectors of its covariance, ordered by descending eigenvalue.
//! The number of kept components is either the smallest count whose
//! cumulative explained variance reaches a threshold, or a fixed count.
//!
//! When there are fewer samples than dimensions (the usual case for
//! 3600-pixel image vectors), the decomposition runs on the N×N Gram matrix
//! of the centred data and the eigenvectors are mapped back through Xᵀ. The
//! non-zero eigenvalues and their eigenvectors are the same as those of the
//! D×D covariance matrix.

use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::linalg::{pin_sign, symmetric_eigen};
use crate::types::{RetrievalError, RetrievalResult};

/// Default cumulative explained-variance target.
pub const DEFAULT_VARIANCE_THRESHOLD: f64 = 0.95;

/// Eigenvalues at or below this fraction of the total variance are treated
/// as zero when mapping Gram eigenvectors back to feature space.
const NEGLIGIBLE_VARIANCE: f64 = 1e-12;

/// How many principal components to keep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum ComponentSelection {
    /// Smallest k whose cumulative explained variance ratio is >= the value.
    VarianceThreshold(f64),
    /// Exactly this many components (clamped to what the data supports).
    Fixed(usize),
}

impl Default for ComponentSelection {
    fn default() -> Self {
        ComponentSelection::VarianceThreshold(DEFAULT_VARIANCE_THRESHOLD)
    }
}

/// Mean and ordered orthonormal basis of a fitted subspace.
#[derive(Debug, Clone, PartialEq)]
pub struct SubspaceModel {
    mean: Array1<f64>,
    basis: Array2<f64>,
    eigenvalues: Vec<f64>,
}

impl SubspaceModel {
    /// Assemble a model from stored parts; `basis` is D×k.
    pub fn from_parts(
        mean: Array1<f64>,
        basis: Array2<f64>,
        eigenvalues: Vec<f64>,
    ) -> RetrievalResult<Self> {
        if basis.nrows() != mean.len() {
            return Err(RetrievalError::DimensionMismatch {
                expected: mean.len(),
                actual: basis.nrows(),
            });
        }
        if basis.ncols() == 0 {
            return Err(RetrievalError::InvalidInput(
                "Subspace basis has no components".to_string(),
            ));
        }
        Ok(Self {
            mean,
            basis,
            eigenvalues,
        })
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// D×k matrix whose columns are the basis vectors.
    pub fn basis(&self) -> &Array2<f64> {
        &self.basis
    }

    /// Eigenvalues of the training covariance, descending.
    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }

    /// Feature dimensionality D.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Number of kept components k.
    pub fn k(&self) -> usize {
        self.basis.ncols()
    }

    /// Cumulative explained-variance ratio of the first `components`.
    pub fn explained_variance(&self, components: usize) -> f64 {
        explained_variance(&self.eigenvalues, components)
    }
}

/// Cumulative explained-variance ratio of the first `components` eigenvalues.
///
/// Zero total variance counts as fully explained.
pub fn explained_variance(eigenvalues: &[f64], components: usize) -> f64 {
    let total: f64 = eigenvalues.iter().sum();
    if total <= 0.0 {
        return 1.0;
    }
    eigenvalues.iter().take(components).sum::<f64>() / total
}

/// Number of components the selection asks for, given descending eigenvalues.
pub fn select_components(eigenvalues: &[f64], selection: ComponentSelection) -> usize {
    let available = eigenvalues.len().max(1);
    match selection {
        ComponentSelection::Fixed(k) => k.clamp(1, available),
        ComponentSelection::VarianceThreshold(threshold) => {
            let total: f64 = eigenvalues.iter().sum();
            if total <= 0.0 {
                return 1;
            }
            let mut cumulative = 0.0;
            for (i, v) in eigenvalues.iter().enumerate() {
                cumulative += v;
                if cumulative / total >= threshold {
                    return i + 1;
                }
            }
            available
        }
    }
}

/// Unbiased covariance of already-centred rows (divisor N-1, or 1 for N = 1).
pub fn covariance(centered: &Array2<f64>) -> Array2<f64> {
    let n = centered.nrows();
    let denom = if n > 1 { (n - 1) as f64 } else { 1.0 };
    centered.t().dot(centered) / denom
}

/// Fit a subspace model to an N×D matrix of feature rows.
pub fn fit(data: &Array2<f64>, selection: ComponentSelection) -> RetrievalResult<SubspaceModel> {
    let (n, d) = data.dim();
    if n == 0 || d == 0 {
        return Err(RetrievalError::InvalidInput(format!(
            "Cannot fit a subspace to an empty {n}x{d} matrix"
        )));
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(RetrievalError::Numeric(
            "Feature matrix contains non-finite values".to_string(),
        ));
    }
    if let ComponentSelection::VarianceThreshold(t) = selection {
        if !(t > 0.0 && t <= 1.0) {
            return Err(RetrievalError::InvalidInput(format!(
                "Variance threshold must be in (0, 1], got {t}"
            )));
        }
    }

    let mean = data
        .mean_axis(Axis(0))
        .ok_or_else(|| RetrievalError::Numeric("Column mean of empty matrix".to_string()))?;
    let centered = data - &mean;
    let denom = if n > 1 { (n - 1) as f64 } else { 1.0 };

    let (eigenvalues, vectors) = if n < d {
        tracing::debug!("Fitting subspace via {n}x{n} Gram matrix (D = {d})");
        let gram = centered.dot(&centered.t()) / denom;
        let eig = symmetric_eigen(&gram)?;
        let values: Vec<f64> = eig.values.iter().map(|v| v.max(0.0)).collect();
        let total: f64 = values.iter().sum();

        let mut vectors = Array2::<f64>::zeros((d, n));
        let mut valid = 0;
        for (j, &value) in values.iter().enumerate() {
            if total <= 0.0 || value <= NEGLIGIBLE_VARIANCE * total {
                break;
            }
            let mut w = centered.t().dot(&eig.vectors.column(j));
            let norm = w.dot(&w).sqrt();
            if norm == 0.0 {
                break;
            }
            w /= norm;
            pin_sign(&mut w);
            vectors.column_mut(j).assign(&w);
            valid += 1;
        }
        (values, vectors.slice(s![.., ..valid]).to_owned())
    } else {
        tracing::debug!("Fitting subspace via {d}x{d} covariance matrix (N = {n})");
        let cov = covariance(&centered);
        let eig = symmetric_eigen(&cov)?;
        let values: Vec<f64> = eig.values.iter().map(|v| v.max(0.0)).collect();
        (values, eig.vectors)
    };

    let k = if vectors.ncols() == 0 {
        0
    } else {
        select_components(&eigenvalues, selection).min(vectors.ncols())
    };

    let basis = if k == 0 {
        // No variance at all: keep the first coordinate axis as a 1-D basis.
        let mut axis = Array2::<f64>::zeros((d, 1));
        axis[[0, 0]] = 1.0;
        axis
    } else {
        vectors.slice(s![.., ..k]).to_owned()
    };

    tracing::info!(
        "Fitted subspace: {n} samples, {d} dims, {} components ({:.2}% variance)",
        basis.ncols(),
        explained_variance(&eigenvalues, basis.ncols()) * 100.0
    );

    SubspaceModel::from_parts(mean, basis, eigenvalues)
}
