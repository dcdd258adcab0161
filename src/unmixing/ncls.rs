//! Non-negativity constrained least squares.
//!
//! Starting from the UCLS solution, each iteration applies the Gauss-Newton
//! correction towards the residual and projects onto the non-negative orthant:
//!
//! ```text
//! a ← max(0, a − (AᵀA)⁻¹ Aᵀ (A a − x))
//! ```
//!
//! There is no residual tolerance; the iteration budget is the only stopping
//! criterion.

use nalgebra::DMatrix;

/// Correction operator `(AᵀA)⁻¹ Aᵀ`, p × B.
pub fn correction_operator(endmembers: &DMatrix<f64>, gram_inverse: &DMatrix<f64>) -> DMatrix<f64> {
    gram_inverse * endmembers.transpose()
}

/// One projected correction step in place.
pub(crate) fn ncls_step(
    endmembers: &DMatrix<f64>,
    correction: &DMatrix<f64>,
    pixel: &[f64],
    abundances: &mut [f64],
) {
    let bands = endmembers.nrows();
    let p = endmembers.ncols();
    let residual: Vec<f64> = (0..bands)
        .map(|b| {
            let model: f64 = (0..p).map(|e| endmembers[(b, e)] * abundances[e]).sum();
            model - pixel[b]
        })
        .collect();
    for (e, a) in abundances.iter_mut().enumerate() {
        let delta: f64 = (0..bands).map(|b| correction[(e, b)] * residual[b]).sum();
        *a = (*a - delta).max(0.0);
    }
}

/// Run `max_iter` projected corrections from `seed`.
pub fn ncls(
    endmembers: &DMatrix<f64>,
    correction: &DMatrix<f64>,
    seed: Vec<f64>,
    pixel: &[f64],
    max_iter: usize,
) -> Vec<f64> {
    let mut abundances = seed;
    for _ in 0..max_iter {
        ncls_step(endmembers, correction, pixel, &mut abundances);
    }
    abundances
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{checked_pseudo_inverse, spd_inverse};
    use crate::unmixing::ucls::{residual_norm, ucls};
    use approx::assert_relative_eq;

    fn setup() -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
        let a = DMatrix::from_column_slice(
            4,
            3,
            &[
                1.0, 0.2, 0.1, 0.6, //
                0.1, 0.9, 0.3, 0.2, //
                0.2, 0.1, 0.8, 0.5,
            ],
        );
        let gram_inverse = spd_inverse(&(a.transpose() * &a), "test").unwrap();
        let correction = correction_operator(&a, &gram_inverse);
        let pinv = checked_pseudo_inverse(&a, 1e12, "test").unwrap();
        (a, correction, pinv)
    }

    #[test]
    fn test_correction_operator_matches_pseudo_inverse() {
        let (_, correction, pinv) = setup();
        for (c, p) in correction.iter().zip(pinv.iter()) {
            assert_relative_eq!(c, p, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_ncls_is_non_negative() {
        let (a, correction, pinv) = setup();
        // Outside the cone of the endmembers: UCLS goes negative
        let pixel = [0.1, 1.2, 0.0, 0.1];
        let seed = ucls(&pinv, &pixel);
        assert!(seed.iter().any(|&v| v < 0.0));

        let result = ncls(&a, &correction, seed, &pixel, 10);
        assert!(result.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_ncls_keeps_feasible_solution() {
        let (a, correction, pinv) = setup();
        let truth = [0.2, 0.5, 0.3];
        let pixel: Vec<f64> = (0..4)
            .map(|b| (0..3).map(|e| a[(b, e)] * truth[e]).sum())
            .collect();
        let result = ncls(&a, &correction, ucls(&pinv, &pixel), &pixel, 10);
        for (r, t) in result.iter().zip(truth) {
            assert_relative_eq!(*r, t, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_ncls_error_non_increasing_after_projection() {
        let (a, correction, pinv) = setup();
        let pixel = [0.1, 1.2, 0.0, 0.1];
        let mut abundances = ucls(&pinv, &pixel);
        ncls_step(&a, &correction, &pixel, &mut abundances);
        let mut previous = residual_norm(&a, &abundances, &pixel);
        for _ in 0..5 {
            ncls_step(&a, &correction, &pixel, &mut abundances);
            let current = residual_norm(&a, &abundances, &pixel);
            assert!(current <= previous + 1e-12);
            previous = current;
        }
    }

    #[test]
    fn test_zero_iterations_returns_seed() {
        let (a, correction, _) = setup();
        let seed = vec![-0.5, 0.2, 1.0];
        assert_eq!(ncls(&a, &correction, seed.clone(), &[0.0; 4], 0), seed);
    }
}
