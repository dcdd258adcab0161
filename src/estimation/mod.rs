//! Endmember count estimation.
//!
//! Both estimators compare the eigenvalues of the correlation and covariance
//! matrices of an image:
//! - [`elm`]: Eigenvalue Likelihood Maximization
//! - [`vd`]: Virtual Dimensionality with a false-alarm rate

pub mod elm;
pub mod vd;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UnmixError};
use crate::matrix::SpectralMatrix;
use crate::statistics::SpectralStatistics;

pub use elm::{elm, ElmResult};
pub use vd::{vd, VdResult};

/// Default false-alarm rate for Virtual Dimensionality.
pub const DEFAULT_FAR: f64 = 1e-3;

/// Endmember count estimation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum EndmemberCountEstimator {
    Elm,
    Vd { far: f64 },
}

impl Default for EndmemberCountEstimator {
    fn default() -> Self {
        EndmemberCountEstimator::Vd { far: DEFAULT_FAR }
    }
}

/// Per-band evidence behind an estimated count.
#[derive(Debug, Clone, PartialEq)]
pub enum CountDiagnostic {
    /// ELM likelihood curve, one value per split index
    Likelihood(Vec<f64>),
    /// VD pass/fail decision per eigenvalue pair
    Decisions(Vec<bool>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountEstimate {
    pub count: usize,
    pub diagnostic: CountDiagnostic,
}

impl EndmemberCountEstimator {
    /// Estimate the endmember count from raw second-order statistics.
    pub fn estimate_count(
        &self,
        covariance: &SpectralMatrix,
        correlation: &SpectralMatrix,
        n_pixels: usize,
    ) -> Result<CountEstimate> {
        let estimate = match *self {
            EndmemberCountEstimator::Elm => {
                let result = elm(covariance, correlation, n_pixels)?;
                CountEstimate {
                    count: result.count,
                    diagnostic: CountDiagnostic::Likelihood(result.likelihood),
                }
            }
            EndmemberCountEstimator::Vd { far } => {
                let result = vd(covariance, correlation, n_pixels, far)?;
                CountEstimate {
                    count: result.count,
                    diagnostic: CountDiagnostic::Decisions(result.decisions),
                }
            }
        };
        tracing::info!(estimator = ?self, count = estimate.count, "endmember count estimated");
        Ok(estimate)
    }

    /// Estimate the endmember count from finalized image statistics.
    pub fn estimate(&self, stats: &SpectralStatistics) -> Result<CountEstimate> {
        self.estimate_count(&stats.covariance, &stats.correlation, stats.count)
    }
}

fn check_statistics(
    covariance: &SpectralMatrix,
    correlation: &SpectralMatrix,
    n_pixels: usize,
) -> Result<()> {
    if n_pixels == 0 {
        return Err(UnmixError::DegenerateStatistics);
    }
    if !covariance.is_square() || covariance.shape() != correlation.shape() {
        return Err(UnmixError::invalid(
            "covariance",
            format!(
                "covariance {} and correlation {} must be equal square matrices",
                covariance, correlation
            ),
        ));
    }
    Ok(())
}
