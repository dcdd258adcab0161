//! Image Space Reconstruction Algorithm.
//!
//! Multiplicative update seeded from UCLS:
//!
//! ```text
//! a_e ← a_e · (Aᵀx)_e / (AᵀA a)_e
//! ```
//!
//! The whole denominator uses the previous iterate. Non-negativity is kept only
//! when the seed is non-negative; a negative UCLS seed stays negative and is
//! reported by the caller instead of being altered.

use nalgebra::DMatrix;

/// `Aᵀx`, the constant numerator of every update.
pub fn numerator(endmembers: &DMatrix<f64>, pixel: &[f64]) -> Vec<f64> {
    (0..endmembers.ncols())
        .map(|e| {
            endmembers
                .column(e)
                .iter()
                .zip(pixel)
                .map(|(a, x)| a * x)
                .sum()
        })
        .collect()
}

/// One multiplicative update in place. Components with a zero denominator are
/// left unchanged.
pub(crate) fn isra_step(gram: &DMatrix<f64>, numerator: &[f64], abundances: &mut [f64]) {
    let p = abundances.len();
    let denominators: Vec<f64> = (0..p)
        .map(|e| (0..p).map(|s| gram[(e, s)] * abundances[s]).sum())
        .collect();
    for ((a, &num), den) in abundances.iter_mut().zip(numerator).zip(denominators) {
        if den != 0.0 {
            *a *= num / den;
        }
    }
}

/// Run `max_iter` updates from `seed` with the Gram matrix `AᵀA`.
pub fn isra(
    endmembers: &DMatrix<f64>,
    gram: &DMatrix<f64>,
    seed: Vec<f64>,
    pixel: &[f64],
    max_iter: usize,
) -> Vec<f64> {
    let num = numerator(endmembers, pixel);
    let mut abundances = seed;
    for _ in 0..max_iter {
        isra_step(gram, &num, &mut abundances);
    }
    abundances
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unmixing::ucls::residual_norm;
    use approx::assert_relative_eq;

    fn setup() -> (DMatrix<f64>, DMatrix<f64>) {
        let a = DMatrix::from_column_slice(
            4,
            3,
            &[
                1.0, 0.2, 0.1, 0.6, //
                0.1, 0.9, 0.3, 0.2, //
                0.2, 0.1, 0.8, 0.5,
            ],
        );
        let gram = a.transpose() * &a;
        (a, gram)
    }

    #[test]
    fn test_isra_error_is_monotone_from_positive_start() {
        let (a, gram) = setup();
        let pixel = [0.7, 0.4, 0.6, 0.5];
        let num = numerator(&a, &pixel);
        let mut abundances = vec![1.0 / 3.0; 3];
        let mut previous = residual_norm(&a, &abundances, &pixel);
        for _ in 0..20 {
            isra_step(&gram, &num, &mut abundances);
            let current = residual_norm(&a, &abundances, &pixel);
            assert!(current <= previous + 1e-12, "{} > {}", current, previous);
            previous = current;
        }
        assert!(abundances.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_isra_fixed_point_at_exact_mixture() {
        let (a, gram) = setup();
        let truth = [0.2, 0.5, 0.3];
        let pixel: Vec<f64> = (0..4)
            .map(|b| (0..3).map(|e| a[(b, e)] * truth[e]).sum())
            .collect();
        let result = isra(&a, &gram, truth.to_vec(), &pixel, 10);
        for (r, t) in result.iter().zip(truth) {
            assert_relative_eq!(*r, t, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_denominator_leaves_component() {
        let gram = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let mut abundances = [0.0, 2.0];
        isra_step(&gram, &[5.0, 4.0], &mut abundances);
        assert_eq!(abundances[0], 0.0);
        assert_relative_eq!(abundances[1], 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_negative_seed_keeps_its_sign() {
        let (a, gram) = setup();
        let pixel = [0.7, 0.4, 0.6, 0.5];
        let result = isra(&a, &gram, vec![-0.1, 0.6, 0.5], &pixel, 1);
        assert!(result[0] < 0.0);
        assert!(result[1] > 0.0);
    }
}
