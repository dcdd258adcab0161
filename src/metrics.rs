//! Quality measures for extracted endmembers and estimated abundances.

use crate::cube::HyperspectralCube;
use crate::error::{Result, UnmixError};
use crate::helpers::{all_finite, dot, norm};
use crate::iter_maybe_parallel;
use crate::matrix::SpectralMatrix;
#[cfg(feature = "parallel")]
use rayon::iter::ParallelIterator;

/// Angle in radians between two spectra.
///
/// Returns NaN when the lengths differ or either spectrum has zero norm.
pub fn spectral_angle(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return f64::NAN;
    }
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        return f64::NAN;
    }
    (dot(a, b) / denom).clamp(-1.0, 1.0).acos()
}

/// Root mean square error between the image and its reconstruction `A a`.
///
/// Pixels with non-finite abundances (skipped during unmixing) are left out.
///
/// # Arguments
/// * `image` - Original rows × cols × B image
/// * `endmembers` - B × p endmember matrix used for unmixing
/// * `abundances` - rows × cols × p abundance image
pub fn reconstruction_rmse(
    image: &HyperspectralCube,
    endmembers: &SpectralMatrix,
    abundances: &HyperspectralCube,
) -> Result<f64> {
    let (rows, cols, bands) = image.shape();
    let p = endmembers.ncols();
    if endmembers.nrows() != bands {
        return Err(UnmixError::InputShapeMismatch {
            expected: endmembers.nrows(),
            actual: bands,
        });
    }
    if abundances.shape() != (rows, cols, p) {
        return Err(UnmixError::invalid(
            "abundances",
            format!(
                "expected a {}x{}x{} abundance image, got {:?}",
                rows,
                cols,
                p,
                abundances.shape()
            ),
        ));
    }

    let x = image.pixel_matrix();
    let s = abundances.pixel_matrix();
    let partials: Vec<(f64, usize)> = iter_maybe_parallel!(0..rows * cols)
        .map(|j| {
            let a = s.column(j);
            if !all_finite(a) {
                return (0.0, 0);
            }
            let sse: f64 = x
                .column(j)
                .iter()
                .enumerate()
                .map(|(b, &value)| {
                    let model: f64 = (0..p).map(|e| endmembers[(b, e)] * a[e]).sum();
                    (model - value) * (model - value)
                })
                .sum();
            (sse, bands)
        })
        .collect();

    let (sse, count) = partials
        .iter()
        .fold((0.0, 0usize), |(s, c), &(ps, pc)| (s + ps, c + pc));
    if count == 0 {
        return Err(UnmixError::DegenerateStatistics);
    }
    Ok((sse / count as f64).sqrt())
}

/// Root mean square difference of two equally shaped abundance matrices.
pub fn abundance_rmse(estimated: &SpectralMatrix, truth: &SpectralMatrix) -> Result<f64> {
    if estimated.shape() != truth.shape() {
        return Err(UnmixError::invalid(
            "estimated",
            format!("shape {} does not match {}", estimated, truth),
        ));
    }
    if estimated.is_empty() {
        return Err(UnmixError::DegenerateStatistics);
    }
    let sse: f64 = estimated
        .as_slice()
        .iter()
        .zip(truth.as_slice())
        .map(|(a, b)| (a - b) * (a - b))
        .sum();
    Ok((sse / estimated.as_slice().len() as f64).sqrt())
}

/// Greedy assignment of estimated endmembers to reference endmembers.
///
/// Returns, for every reference column, the index of the estimated column with
/// the smallest spectral angle among those not yet taken.
pub fn match_endmembers(estimated: &SpectralMatrix, reference: &SpectralMatrix) -> Vec<usize> {
    let mut taken = vec![false; estimated.ncols()];
    let mut assignment = Vec::with_capacity(reference.ncols());
    for r in reference.columns() {
        let best = (0..estimated.ncols())
            .filter(|&e| !taken[e])
            .map(|e| (e, spectral_angle(estimated.column(e), r)))
            .filter(|(_, angle)| !angle.is_nan())
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((e, _)) = best {
            taken[e] = true;
            assignment.push(e);
        }
    }
    assignment
}

/// Rows of `matrix` reordered by `order` (used to align abundance rows after
/// [`match_endmembers`]).
pub fn reorder_rows(matrix: &SpectralMatrix, order: &[usize]) -> SpectralMatrix {
    let mut out = SpectralMatrix::zeros(order.len(), matrix.ncols());
    for (dst, &src) in order.iter().enumerate() {
        for j in 0..matrix.ncols() {
            out[(dst, j)] = matrix[(src, j)];
        }
    }
    out
}
