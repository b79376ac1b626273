//! Dense symmetric eigen-decomposition.
//!
//! Householder reduction to tridiagonal form, then the implicit QL algorithm
//! with Wilkinson shifts on the tridiagonal matrix. Both stages work on flat
//! row-major buffers; the QL rotations touch eigenvectors stored as rows so
//! every inner loop runs over contiguous memory.

use std::cmp::Ordering;

use ndarray::{Array1, Array2};

use crate::types::{RetrievalError, RetrievalResult};

/// QL iterations allowed per eigenvalue before giving up.
const MAX_ITERATIONS: usize = 60;

/// Eigenvalues in descending order and matching eigenvectors as columns.
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    pub values: Array1<f64>,
    pub vectors: Array2<f64>,
}

/// Decompose a real symmetric matrix.
///
/// Ordering is by descending eigenvalue; equal eigenvalues keep the order of
/// the diagonal position they converged on, so the result is reproducible for
/// a given input. Each eigenvector is signed so its largest-magnitude
/// component is positive.
pub fn symmetric_eigen(matrix: &Array2<f64>) -> RetrievalResult<SymmetricEigen> {
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(RetrievalError::Numeric(format!(
            "Eigen-decomposition needs a square matrix, got {rows}x{cols}"
        )));
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(RetrievalError::Numeric(
            "Matrix contains non-finite values".to_string(),
        ));
    }

    let n = rows;
    let mut z: Vec<f64> = matrix.as_standard_layout().iter().copied().collect();
    let mut d = vec![0.0; n];
    let mut e = vec![0.0; n];

    tridiagonalize(&mut z, &mut d, &mut e, n);
    // Eigenvectors are columns of `z`; QL rotates rows of the transpose.
    let mut zt = transpose(&z, n);
    tridiagonal_ql(&mut d, &mut e, &mut zt, n)?;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        d[j].partial_cmp(&d[i])
            .unwrap_or(Ordering::Equal)
            .then(i.cmp(&j))
    });

    let values = Array1::from_iter(order.iter().map(|&i| d[i]));
    let mut vectors = Array2::<f64>::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        let mut column = Array1::from(zt[src * n..(src + 1) * n].to_vec());
        pin_sign(&mut column);
        vectors.column_mut(dst).assign(&column);
    }

    Ok(SymmetricEigen { values, vectors })
}

/// Householder reduction of the symmetric matrix in `z` (row-major, n×n).
///
/// On return `d` holds the diagonal, `e[1..]` the sub-diagonal (`e[0] = 0`)
/// and `z` the orthogonal transform whose columns map tridiagonal
/// eigenvectors back to the input basis.
fn tridiagonalize(z: &mut [f64], d: &mut [f64], e: &mut [f64], n: usize) {
    if n == 0 {
        return;
    }
    for i in (1..n).rev() {
        let l = i - 1;
        let mut h = 0.0;
        if l > 0 {
            let scale: f64 = z[i * n..i * n + i].iter().map(|v| v.abs()).sum();
            if scale == 0.0 {
                e[i] = z[i * n + l];
            } else {
                for k in 0..i {
                    z[i * n + k] /= scale;
                    h += z[i * n + k] * z[i * n + k];
                }
                let f = z[i * n + l];
                let g = if f >= 0.0 { -h.sqrt() } else { h.sqrt() };
                e[i] = scale * g;
                h -= f * g;
                z[i * n + l] = f - g;

                let mut f = 0.0;
                for j in 0..i {
                    z[j * n + i] = z[i * n + j] / h;
                    let mut g = 0.0;
                    for k in 0..=j {
                        g += z[j * n + k] * z[i * n + k];
                    }
                    for k in (j + 1)..i {
                        g += z[k * n + j] * z[i * n + k];
                    }
                    e[j] = g / h;
                    f += e[j] * z[i * n + j];
                }
                let hh = f / (h + h);
                for j in 0..i {
                    let f = z[i * n + j];
                    let g = e[j] - hh * f;
                    e[j] = g;
                    for k in 0..=j {
                        z[j * n + k] -= f * e[k] + g * z[i * n + k];
                    }
                }
            }
        } else {
            e[i] = z[i * n + l];
        }
        d[i] = h;
    }

    d[0] = 0.0;
    e[0] = 0.0;
    for i in 0..n {
        if d[i] != 0.0 {
            for j in 0..i {
                let mut g = 0.0;
                for k in 0..i {
                    g += z[i * n + k] * z[k * n + j];
                }
                for k in 0..i {
                    z[k * n + j] -= g * z[k * n + i];
                }
            }
        }
        d[i] = z[i * n + i];
        z[i * n + i] = 1.0;
        for j in 0..i {
            z[j * n + i] = 0.0;
            z[i * n + j] = 0.0;
        }
    }
}

/// Implicit QL on the tridiagonal matrix `(d, e)`, rotating the rows of `zt`.
///
/// On return `d` holds the eigenvalues and row `i` of `zt` the eigenvector
/// for `d[i]`.
fn tridiagonal_ql(d: &mut [f64], e: &mut [f64], zt: &mut [f64], n: usize) -> RetrievalResult<()> {
    if n < 2 {
        return Ok(());
    }
    for i in 1..n {
        e[i - 1] = e[i];
    }
    e[n - 1] = 0.0;

    for l in 0..n {
        let mut iterations = 0;
        loop {
            let mut m = l;
            while m + 1 < n {
                let dd = d[m].abs() + d[m + 1].abs();
                if e[m].abs() <= f64::EPSILON * dd {
                    break;
                }
                m += 1;
            }
            if m == l {
                break;
            }
            iterations += 1;
            if iterations > MAX_ITERATIONS {
                return Err(RetrievalError::Numeric(format!(
                    "QL iteration did not converge for eigenvalue {l} of a {n}x{n} matrix"
                )));
            }

            let mut g = (d[l + 1] - d[l]) / (2.0 * e[l]);
            let mut r = g.hypot(1.0);
            g = d[m] - d[l] + e[l] / (g + if g >= 0.0 { r } else { -r });
            let (mut s, mut c, mut p) = (1.0, 1.0, 0.0);
            let mut deflated = false;

            let mut i = m;
            while i > l {
                i -= 1;
                let f = s * e[i];
                let b = c * e[i];
                r = f.hypot(g);
                e[i + 1] = r;
                if r == 0.0 {
                    d[i + 1] -= p;
                    e[m] = 0.0;
                    deflated = true;
                    break;
                }
                s = f / r;
                c = g / r;
                g = d[i + 1] - p;
                r = (d[i] - g) * s + 2.0 * c * b;
                p = s * r;
                d[i + 1] = g + p;
                g = c * r - b;
                rotate_rows(zt, n, i, s, c);
            }
            if deflated {
                continue;
            }
            d[l] -= p;
            e[l] = g;
            e[m] = 0.0;
        }
    }
    Ok(())
}

/// Apply a Givens rotation to rows `i` and `i + 1` of a row-major n×n buffer.
fn rotate_rows(zt: &mut [f64], n: usize, i: usize, s: f64, c: f64) {
    let (head, tail) = zt.split_at_mut((i + 1) * n);
    let lower = &mut head[i * n..];
    let upper = &mut tail[..n];
    for (a, b) in lower.iter_mut().zip(upper.iter_mut()) {
        let f = *b;
        *b = s * *a + c * f;
        *a = c * *a - s * f;
    }
}

fn transpose(z: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![0.0; n * n];
    for r in 0..n {
        for c in 0..n {
            out[c * n + r] = z[r * n + c];
        }
    }
    out
}

/// Flip a vector so its largest-magnitude component (first on ties) is positive.
pub(crate) fn pin_sign(v: &mut Array1<f64>) {
    let mut best = 0usize;
    let mut best_abs = -1.0;
    for (i, x) in v.iter().enumerate() {
        if x.abs() > best_abs {
            best = i;
            best_abs = x.abs();
        }
    }
    if !v.is_empty() && v[best] < 0.0 {
        v.mapv_inplace(|x| -x);
    }
}
