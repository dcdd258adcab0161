//! Dense linear-algebra helpers on top of nalgebra.
//!
//! Sorted symmetric eigen-decomposition, leading singular vectors and
//! pseudo-inverses with an explicit conditioning check.

use nalgebra::{DMatrix, SymmetricEigen, SVD};

use crate::error::{Result, UnmixError};
use crate::helpers::NUMERICAL_EPS;
use crate::matrix::SpectralMatrix;

fn check_square(mat: &SpectralMatrix, name: &'static str) -> Result<()> {
    if !mat.is_square() {
        return Err(UnmixError::invalid(
            name,
            format!("expected a square matrix, got {}", mat),
        ));
    }
    Ok(())
}

/// Eigenvalues of a symmetric matrix, sorted descending.
pub fn symmetric_eigenvalues_desc(mat: &SpectralMatrix) -> Result<Vec<f64>> {
    check_square(mat, "matrix")?;
    let eigen = SymmetricEigen::new(mat.to_dmatrix());
    let mut values: Vec<f64> = eigen.eigenvalues.iter().copied().collect();
    values.sort_unstable_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    Ok(values)
}

/// Leading `k` eigenpairs of a symmetric matrix, eigenvalues descending.
///
/// Returns `(eigenvalues, vectors)` with `vectors` of shape `n × k`.
pub fn leading_eigenvectors(mat: &SpectralMatrix, k: usize) -> Result<(Vec<f64>, DMatrix<f64>)> {
    check_square(mat, "matrix")?;
    let n = mat.nrows();
    if k > n {
        return Err(UnmixError::invalid(
            "k",
            format!("requested {} eigenvectors of a {}x{} matrix", k, n, n),
        ));
    }
    let eigen = SymmetricEigen::new(mat.to_dmatrix());
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut vectors = DMatrix::zeros(n, k);
    let mut values = Vec::with_capacity(k);
    for (dst, &src) in order.iter().take(k).enumerate() {
        vectors.set_column(dst, &eigen.eigenvectors.column(src));
        values.push(eigen.eigenvalues[src]);
    }
    Ok((values, vectors))
}

/// Ratio of the largest to the smallest singular value (`inf` if rank deficient).
pub fn condition_number(mat: &DMatrix<f64>) -> f64 {
    let svd = SVD::new(mat.clone(), false, false);
    let max = svd.singular_values.iter().copied().fold(0.0, f64::max);
    let min = svd
        .singular_values
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);
    if min <= 0.0 || !min.is_finite() {
        f64::INFINITY
    } else {
        max / min
    }
}

/// Moore-Penrose pseudo-inverse of a full-column-rank matrix.
///
/// Fails with `SingularOrIllConditionedMatrix` when the condition number of
/// `mat` exceeds `max_condition`.
pub fn checked_pseudo_inverse(
    mat: &DMatrix<f64>,
    max_condition: f64,
    context: &'static str,
) -> Result<DMatrix<f64>> {
    let condition = condition_number(mat);
    if !condition.is_finite() || condition > max_condition {
        return Err(UnmixError::SingularOrIllConditionedMatrix { context, condition });
    }
    let svd = SVD::new(mat.clone(), true, true);
    if svd.singular_values.iter().all(|&sv| sv <= NUMERICAL_EPS) {
        return Err(UnmixError::SingularOrIllConditionedMatrix { context, condition });
    }
    svd.pseudo_inverse(0.0)
        .map_err(|e| UnmixError::Decomposition(e.to_string()))
}

/// Pseudo-inverse that zeroes singular values below `eps * max_singular`.
///
/// Used for deliberately rank-deficient matrices such as a partially filled
/// vertex matrix.
pub fn truncated_pseudo_inverse(mat: &DMatrix<f64>, eps: f64) -> Result<DMatrix<f64>> {
    let svd = SVD::new(mat.clone(), true, true);
    let max = svd.singular_values.iter().copied().fold(0.0, f64::max);
    svd.pseudo_inverse(eps * max.max(NUMERICAL_EPS))
        .map_err(|e| UnmixError::Decomposition(e.to_string()))
}

/// Inverse of a symmetric positive definite matrix via Cholesky.
pub fn spd_inverse(mat: &DMatrix<f64>, context: &'static str) -> Result<DMatrix<f64>> {
    mat.clone()
        .cholesky()
        .map(|c| c.inverse())
        .ok_or(UnmixError::SingularOrIllConditionedMatrix {
            context,
            condition: f64::INFINITY,
        })
}
