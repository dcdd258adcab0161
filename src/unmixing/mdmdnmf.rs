//! Minimum-dispersion constrained non-negative matrix factorization.
//!
//! Minimizes, over non-negative `A` (B × p) and `S` (p × N),
//!
//! ```text
//! J = ½‖X − AS‖² + ½δ²‖1ᵀS − 1ᵀ‖² + ½λ_D‖(I − 11ᵀ/B) A‖² + ½λ_S‖(I − 11ᵀ/p) S‖²
//! ```
//!
//! by alternating projected gradient steps on `S` and `A`. Each step length is
//! found by Armijo backtracking on the projected path; negative entries are
//! clamped to zero after every step.
//!
//! The sum-to-one term (weight δ²) pulls each abundance column towards unit
//! sum, the dispersion terms penalize the spread of each endmember over bands
//! and of each abundance column over endmembers.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UnmixError};
use crate::helpers::{all_finite, DEFAULT_CONVERGENCE_TOL, DEFAULT_MAX_CONDITION, NUMERICAL_EPS};
use crate::linalg::checked_pseudo_inverse;
use crate::matrix::SpectralMatrix;

/// Sufficient-decrease constant of the Armijo rule.
const ARMIJO_SIGMA: f64 = 0.01;
/// Step shrink factor per backtrack.
const ARMIJO_BETA: f64 = 0.1;
const ARMIJO_INITIAL_STEP: f64 = 1.0;
const MAX_BACKTRACKS: usize = 20;

/// Default iteration budget.
pub const DEFAULT_MDMDNMF_ITERATIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MdmdnmfConfig {
    pub max_iter: usize,
    /// Relative objective change below which the iteration stops
    pub tolerance: f64,
    /// Abundance dispersion weight λ_S
    pub lambda_s: f64,
    /// Endmember dispersion weight λ_D
    pub lambda_d: f64,
    /// Sum-to-one weight δ
    pub delta: f64,
    /// Refine the endmember matrix jointly when unmixing a whole image
    pub update_endmembers: bool,
}

impl Default for MdmdnmfConfig {
    fn default() -> Self {
        Self {
            max_iter: DEFAULT_MDMDNMF_ITERATIONS,
            tolerance: DEFAULT_CONVERGENCE_TOL,
            lambda_s: 0.01,
            lambda_d: 0.01,
            delta: 1.0,
            update_endmembers: true,
        }
    }
}

impl MdmdnmfConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            return Err(UnmixError::invalid(
                "tolerance",
                format!("must be a finite non-negative number, got {}", self.tolerance),
            ));
        }
        for (name, value) in [
            ("lambda_s", self.lambda_s),
            ("lambda_d", self.lambda_d),
            ("delta", self.delta),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(UnmixError::invalid(
                    name,
                    format!("must be a finite non-negative weight, got {}", value),
                ));
            }
        }
        Ok(())
    }
}

/// Result of a joint factorization.
#[derive(Debug, Clone, PartialEq)]
pub struct Factorization {
    /// Refined B × p endmember matrix
    pub endmembers: SpectralMatrix,
    /// p × N abundance matrix
    pub abundances: SpectralMatrix,
    pub iterations: usize,
    /// Whether the relative objective change fell below the tolerance
    pub converged: bool,
    /// Objective value after every iteration, starting with the seed
    pub objective: Vec<f64>,
}

/// Columns of `m` with their own mean removed.
fn center_columns(m: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = m.clone();
    for mut col in out.column_iter_mut() {
        let mean = col.mean();
        col.add_scalar_mut(-mean);
    }
    out
}

fn objective(
    x: &DMatrix<f64>,
    a: &DMatrix<f64>,
    s: &DMatrix<f64>,
    config: &MdmdnmfConfig,
) -> f64 {
    let fit = (a * s - x).norm_squared();
    let sum_to_one: f64 = s
        .column_iter()
        .map(|c| {
            let excess = c.sum() - 1.0;
            excess * excess
        })
        .sum();
    let dispersion_a = center_columns(a).norm_squared();
    let dispersion_s = center_columns(s).norm_squared();
    0.5 * (fit
        + config.delta * config.delta * sum_to_one
        + config.lambda_d * dispersion_a
        + config.lambda_s * dispersion_s)
}

fn abundance_gradient(
    x: &DMatrix<f64>,
    a: &DMatrix<f64>,
    s: &DMatrix<f64>,
    config: &MdmdnmfConfig,
) -> DMatrix<f64> {
    let residual = a * s - x;
    let mut grad = a.transpose() * residual;
    let weight = config.delta * config.delta;
    for (j, mut col) in grad.column_iter_mut().enumerate() {
        let excess = s.column(j).sum() - 1.0;
        col.add_scalar_mut(weight * excess);
    }
    grad + center_columns(s) * config.lambda_s
}

fn endmember_gradient(
    x: &DMatrix<f64>,
    a: &DMatrix<f64>,
    s: &DMatrix<f64>,
    config: &MdmdnmfConfig,
) -> DMatrix<f64> {
    let residual = a * s - x;
    residual * s.transpose() + center_columns(a) * config.lambda_d
}

/// Projected Armijo line search along `-grad` from `current`.
///
/// Returns the accepted point and its objective, or `None` when no step within
/// the backtracking budget gives sufficient decrease.
fn armijo_step<F>(
    current: &DMatrix<f64>,
    grad: &DMatrix<f64>,
    current_objective: f64,
    eval: F,
) -> Option<(DMatrix<f64>, f64)>
where
    F: Fn(&DMatrix<f64>) -> f64,
{
    let mut alpha = ARMIJO_INITIAL_STEP;
    for _ in 0..=MAX_BACKTRACKS {
        let candidate = (current - grad * alpha).map(|v| v.max(0.0));
        let decrease = grad.dot(&(&candidate - current));
        let value = eval(&candidate);
        if value <= current_objective + ARMIJO_SIGMA * decrease {
            return Some((candidate, value));
        }
        alpha *= ARMIJO_BETA;
    }
    None
}

/// Iteration state shared by the per-pixel and the joint mode.
pub(crate) struct Refinement {
    pub endmembers: DMatrix<f64>,
    pub abundances: DMatrix<f64>,
    pub iterations: usize,
    pub converged: bool,
    pub objective: Vec<f64>,
}

/// Whether an iteration that moved from `previous` to `current` has converged.
///
/// An iteration in which neither line search accepted a step never counts.
fn has_converged(previous: f64, current: f64, stepped: bool, tolerance: f64) -> bool {
    stepped && (previous - current).abs() / previous.abs().max(NUMERICAL_EPS) < tolerance
}

/// Alternate projected gradient steps from `(a, s)`.
///
/// Stops early when the relative objective change falls below the tolerance
/// (`converged`) or when both line searches fail (not converged).
pub(crate) fn refine(
    x: &DMatrix<f64>,
    mut a: DMatrix<f64>,
    mut s: DMatrix<f64>,
    config: &MdmdnmfConfig,
    update_endmembers: bool,
) -> Refinement {
    let mut current = objective(x, &a, &s, config);
    let mut history = vec![current];
    let mut iterations = 0;
    let mut converged = false;

    for iter in 1..=config.max_iter {
        let previous = current;
        let mut stepped = false;

        let grad_s = abundance_gradient(x, &a, &s, config);
        if let Some((next, value)) =
            armijo_step(&s, &grad_s, current, |c| objective(x, &a, c, config))
        {
            s = next;
            current = value;
            stepped = true;
        }

        if update_endmembers {
            let grad_a = endmember_gradient(x, &a, &s, config);
            if let Some((next, value)) =
                armijo_step(&a, &grad_a, current, |c| objective(x, c, &s, config))
            {
                a = next;
                current = value;
                stepped = true;
            }
        }

        history.push(current);
        iterations = iter;
        if !stepped {
            tracing::debug!(iteration = iter, "line search stalled");
            break;
        }
        if has_converged(previous, current, stepped, config.tolerance) {
            converged = true;
            break;
        }
    }

    Refinement {
        endmembers: a,
        abundances: s,
        iterations,
        converged,
        objective: history,
    }
}

/// Abundance seed: UCLS clamped to the non-negative orthant.
pub(crate) fn clamped_seed(pseudo_inverse: &DMatrix<f64>, x: &DMatrix<f64>) -> DMatrix<f64> {
    (pseudo_inverse * x).map(|v| v.max(0.0))
}

/// Per-pixel refinement with the endmember matrix held fixed.
///
/// Returns the abundances, the number of iterations and whether the tolerance
/// was reached.
pub fn solve_pixel(
    endmembers: &DMatrix<f64>,
    pseudo_inverse: &DMatrix<f64>,
    pixel: &[f64],
    config: &MdmdnmfConfig,
) -> (Vec<f64>, usize, bool) {
    let x = DMatrix::from_column_slice(pixel.len(), 1, pixel);
    let seed = clamped_seed(pseudo_inverse, &x);
    let result = refine(&x, endmembers.clone(), seed, config, false);
    (
        result.abundances.as_slice().to_vec(),
        result.iterations,
        result.converged,
    )
}

/// Jointly refine endmembers and abundances of a pixel matrix.
///
/// # Arguments
/// * `pixels` - B × N matrix, one pixel per column
/// * `initial` - B × p starting endmember matrix, e.g. from VCA
/// * `config` - Weights, tolerance and iteration budget
pub fn factorize(
    pixels: &SpectralMatrix,
    initial: &SpectralMatrix,
    config: &MdmdnmfConfig,
) -> Result<Factorization> {
    config.validate()?;
    if pixels.nrows() != initial.nrows() {
        return Err(UnmixError::InputShapeMismatch {
            expected: initial.nrows(),
            actual: pixels.nrows(),
        });
    }
    if !all_finite(pixels.as_slice()) {
        return Err(UnmixError::invalid(
            "pixels",
            "joint factorization requires finite pixel values",
        ));
    }
    let a0 = initial.to_dmatrix();
    let pseudo_inverse = checked_pseudo_inverse(&a0, DEFAULT_MAX_CONDITION, "MDMDNMF endmembers")?;
    let x = pixels.to_dmatrix();
    let seed = clamped_seed(&pseudo_inverse, &x);
    let result = refine(&x, a0, seed, config, true);
    tracing::debug!(
        iterations = result.iterations,
        converged = result.converged,
        "MDMDNMF factorization finished"
    );
    Ok(Factorization {
        endmembers: SpectralMatrix::from_dmatrix(&result.endmembers),
        abundances: SpectralMatrix::from_dmatrix(&result.abundances),
        iterations: result.iterations,
        converged: result.converged,
        objective: result.objective,
    })
}
