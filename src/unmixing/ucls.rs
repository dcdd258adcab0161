//! Unconstrained least squares: `a = A⁺ x`.

use nalgebra::DMatrix;

/// Apply a precomputed p × B pseudo-inverse to one pixel.
pub fn ucls(pseudo_inverse: &DMatrix<f64>, pixel: &[f64]) -> Vec<f64> {
    (0..pseudo_inverse.nrows())
        .map(|e| {
            pseudo_inverse
                .row(e)
                .iter()
                .zip(pixel)
                .map(|(w, x)| w * x)
                .sum()
        })
        .collect()
}

/// Residual norm `‖A a − x‖`.
pub fn residual_norm(endmembers: &DMatrix<f64>, abundances: &[f64], pixel: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (b, &x) in pixel.iter().enumerate() {
        let model: f64 = abundances
            .iter()
            .enumerate()
            .map(|(e, &a)| endmembers[(b, e)] * a)
            .sum();
        sum += (model - x) * (model - x);
    }
    sum.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::checked_pseudo_inverse;
    use approx::assert_relative_eq;

    fn two_endmembers() -> DMatrix<f64> {
        DMatrix::from_column_slice(4, 2, &[1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0])
    }

    #[test]
    fn test_ucls_recovers_mixture() {
        let a = two_endmembers();
        let pinv = checked_pseudo_inverse(&a, 1e12, "test").unwrap();
        let abundances = ucls(&pinv, &[0.3, 0.7, 0.7, 0.3]);
        assert_relative_eq!(abundances[0], 0.3, epsilon = 1e-6);
        assert_relative_eq!(abundances[1], 0.7, epsilon = 1e-6);
    }

    #[test]
    fn test_ucls_is_least_squares_optimal() {
        let a = DMatrix::from_column_slice(
            5,
            3,
            &[
                0.9, 0.3, 0.1, 0.4, 0.2, //
                0.1, 0.8, 0.5, 0.2, 0.3, //
                0.3, 0.2, 0.7, 0.9, 0.6,
            ],
        );
        let pinv = checked_pseudo_inverse(&a, 1e12, "test").unwrap();
        let pixel = [0.5, 0.9, 0.2, 0.7, 0.1];
        let best = ucls(&pinv, &pixel);
        let best_err = residual_norm(&a, &best, &pixel);

        for step in [1e-3, 1e-1, 1.0] {
            for e in 0..3 {
                for sign in [-1.0, 1.0] {
                    let mut other = best.clone();
                    other[e] += sign * step;
                    assert!(residual_norm(&a, &other, &pixel) >= best_err);
                }
            }
        }
    }

    #[test]
    fn test_residual_norm_of_exact_fit_is_zero() {
        let a = two_endmembers();
        assert_relative_eq!(
            residual_norm(&a, &[0.3, 0.7], &[0.3, 0.7, 0.7, 0.3]),
            0.0,
            epsilon = 1e-12
        );
    }
}
