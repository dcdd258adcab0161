//! Eigenvalue Likelihood Maximization.
//!
//! Noise eigenvalues of the correlation (`r`) and covariance (`k`) matrices are
//! nearly equal, signal eigenvalues are not. For each split index `i` the
//! eigenvalue pairs `i..B` are scored as noise under a Gaussian model with
//! variance `2/N (r² + k²)`:
//!
//! ```text
//! L(i) = -½ Σ_{j≥i} [ (r_j − k_j)² / σ_j² + ln σ_j² ],   σ_j² = 2/N (r_j² + k_j²)
//! ```
//!
//! The endmember count is read off the first interior local maximum of `L`.

use crate::error::{Result, UnmixError};
use crate::helpers::NUMERICAL_EPS;
use crate::linalg::symmetric_eigenvalues_desc;
use crate::matrix::SpectralMatrix;

/// Endmember count with its likelihood curve.
#[derive(Debug, Clone, PartialEq)]
pub struct ElmResult {
    pub count: usize,
    /// One value per split index, length B
    pub likelihood: Vec<f64>,
}

/// Likelihood curve from descending eigenvalue sequences.
pub fn likelihood_curve(cov_eigen: &[f64], cor_eigen: &[f64], n_pixels: usize) -> Vec<f64> {
    let bands = cov_eigen.len();
    let scale = 2.0 / n_pixels as f64;
    (0..bands)
        .map(|i| {
            let mut sum = 0.0;
            for j in i..bands {
                let (k, r) = (cov_eigen[j], cor_eigen[j]);
                let variance = (scale * (r * r + k * k)).max(NUMERICAL_EPS);
                let mu = r - k;
                sum += mu * mu / variance + variance.ln();
            }
            -0.5 * sum
        })
        .collect()
}

/// Index of the first point strictly greater than both neighbours.
pub fn first_local_maximum(curve: &[f64]) -> Option<usize> {
    (1..curve.len().saturating_sub(1))
        .find(|&i| curve[i] > curve[i - 1] && curve[i] > curve[i + 1])
}

/// Estimate the number of endmembers from image statistics.
///
/// # Arguments
/// * `covariance` - B × B covariance matrix
/// * `correlation` - B × B correlation matrix
/// * `n_pixels` - Number of pixels the statistics were computed from
///
/// Fails with `NoLocalMaximumFound` when the likelihood curve is monotone.
pub fn elm(
    covariance: &SpectralMatrix,
    correlation: &SpectralMatrix,
    n_pixels: usize,
) -> Result<ElmResult> {
    super::check_statistics(covariance, correlation, n_pixels)?;
    let cov_eigen = symmetric_eigenvalues_desc(covariance)?;
    let cor_eigen = symmetric_eigenvalues_desc(correlation)?;

    let likelihood = likelihood_curve(&cov_eigen, &cor_eigen, n_pixels);
    let i_max = first_local_maximum(&likelihood).ok_or(UnmixError::NoLocalMaximumFound {
        bands: likelihood.len(),
    })?;

    Ok(ElmResult {
        count: i_max - 1,
        likelihood,
    })
}
