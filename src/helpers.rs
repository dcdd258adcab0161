//! Small vector helpers and shared numerical constants.

/// Small epsilon for numerical comparisons (e.g., avoiding division by zero).
pub const NUMERICAL_EPS: f64 = 1e-10;

/// Default condition-number limit above which an endmember matrix is rejected.
pub const DEFAULT_MAX_CONDITION: f64 = 1e12;

/// Default relative-objective tolerance for MDMD-NMF.
pub const DEFAULT_CONVERGENCE_TOL: f64 = 5e-4;

/// Dot product of two equally long slices.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean norm.
#[inline]
pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Whether every value is finite.
#[inline]
pub fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}
