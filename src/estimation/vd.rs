//! Virtual Dimensionality (Harsanyi–Farrand–Chang).
//!
//! Each eigenvalue pair is a Neyman–Pearson test of `r_j − k_j = 0` against
//! `r_j − k_j > 0`, with the difference modelled as a zero-mean Gaussian of
//! variance `2/N (r_j² + k_j²)`. The threshold for false-alarm rate `far` is
//! `τ_j = σ_j Φ⁻¹(1 − far)`.
//!
//! The variance is floored relative to the leading eigenvalue, so pairs at
//! rounding level (rank-deficient, noise-free data) are scored as noise.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{Result, UnmixError};
use crate::helpers::NUMERICAL_EPS;
use crate::linalg::symmetric_eigenvalues_desc;
use crate::matrix::SpectralMatrix;

/// Endmember count with the per-band decisions behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct VdResult {
    pub count: usize,
    /// `true` where the eigenvalue pair signals a source, length B
    pub decisions: Vec<bool>,
}

/// Standard normal quantile at `1 − far`.
fn upper_quantile(far: f64) -> Result<f64> {
    if !(far > 0.0 && far < 1.0) {
        return Err(UnmixError::invalid(
            "far",
            format!("false-alarm rate must lie in (0, 1), got {}", far),
        ));
    }
    let normal = Normal::new(0.0, 1.0).map_err(|e| UnmixError::invalid("far", e.to_string()))?;
    Ok(normal.inverse_cdf(1.0 - far))
}

/// Per-band decisions from descending eigenvalue sequences.
pub fn vd_decisions(
    cov_eigen: &[f64],
    cor_eigen: &[f64],
    n_pixels: usize,
    far: f64,
) -> Result<Vec<bool>> {
    let z = upper_quantile(far)?;
    let scale = 2.0 / n_pixels as f64;
    let leading = cov_eigen
        .first()
        .into_iter()
        .chain(cor_eigen.first())
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let floor = NUMERICAL_EPS * leading * leading;
    Ok(cov_eigen
        .iter()
        .zip(cor_eigen)
        .map(|(&k, &r)| {
            let sigma = (scale * (r * r + k * k)).max(floor).sqrt();
            r - k > sigma * z
        })
        .collect())
}

/// Estimate the number of endmembers at false-alarm rate `far`.
pub fn vd(
    covariance: &SpectralMatrix,
    correlation: &SpectralMatrix,
    n_pixels: usize,
    far: f64,
) -> Result<VdResult> {
    super::check_statistics(covariance, correlation, n_pixels)?;
    let cov_eigen = symmetric_eigenvalues_desc(covariance)?;
    let cor_eigen = symmetric_eigenvalues_desc(correlation)?;
    let decisions = vd_decisions(&cov_eigen, &cor_eigen, n_pixels, far)?;
    Ok(VdResult {
        count: decisions.iter().filter(|&&d| d).count(),
        decisions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(values: &[f64]) -> SpectralMatrix {
        let mut m = SpectralMatrix::zeros(values.len(), values.len());
        for (i, &v) in values.iter().enumerate() {
            m[(i, i)] = v;
        }
        m
    }

    #[test]
    fn test_vd_counts_signal_pairs() {
        let cov = diag(&[4.0, 2.0, 0.5, 0.5, 0.5]);
        let cor = diag(&[8.0, 3.0, 0.5, 0.5, 0.5]);
        let result = vd(&cov, &cor, 1000, 1e-3).unwrap();
        assert_eq!(result.count, 2);
        assert_eq!(result.decisions, vec![true, true, false, false, false]);
    }

    #[test]
    fn test_vd_small_sample_is_conservative() {
        // With 100 pixels the wide first gap still sits inside its noise band
        let cov = diag(&[5.0, 3.0, 1.0, 0.1, 0.1, 0.1]);
        let cor = diag(&[9.0, 6.0, 1.5, 0.1, 0.1, 0.1]);
        let result = vd(&cov, &cor, 100, 1e-3).unwrap();
        assert!(!result.decisions[0]);
        assert_eq!(result.count, 1);
    }

    #[test]
    fn test_vd_identical_eigenvalues() {
        let values = [3.0, 2.0, 1.0];
        let result = vd(&diag(&values), &diag(&values), 500, 1e-2).unwrap();
        assert_eq!(result.count, 0);
    }

    #[test]
    fn test_vd_ignores_rounding_level_pairs() {
        // Rank-2 data: the trailing pairs are eigen-solver noise
        let cov = diag(&[4.0, 2.0, 1e-16, 3e-17, -2e-17]);
        let cor = diag(&[8.0, 3.0, 2e-16, 1e-16, -1e-17]);
        let result = vd(&cov, &cor, 1000, 1e-3).unwrap();
        assert_eq!(result.decisions, vec![true, true, false, false, false]);
        assert_eq!(result.count, 2);
    }

    #[test]
    fn test_vd_rejects_invalid_far() {
        let m = diag(&[1.0, 1.0]);
        for far in [0.0, 1.0, -0.1, f64::NAN] {
            assert!(matches!(
                vd(&m, &m, 10, far),
                Err(UnmixError::InvalidParameter { name: "far", .. })
            ));
        }
    }
}
