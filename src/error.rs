//! Error and diagnostic types.
//!
//! Fatal conditions are reported through [`UnmixError`]. Conditions that leave a
//! usable (if not fully converged) result behind are reported as [`Diagnostic`]
//! values next to that result instead.

use thiserror::Error;

/// Result type for unmixing operations.
pub type Result<T> = std::result::Result<T, UnmixError>;

/// Errors that stop a statistics pass, an estimation or an unmixing run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnmixError {
    /// Pixel band count does not match the endmember matrix row count
    #[error("Input shape mismatch: expected {expected} bands, got {actual}")]
    InputShapeMismatch { expected: usize, actual: usize },

    /// A pseudo-inverse or Gram inverse is not numerically reliable
    #[error("Singular or ill-conditioned matrix ({context}): condition number {condition:.3e}")]
    SingularOrIllConditionedMatrix { context: &'static str, condition: f64 },

    /// Statistics finalized without any relevant pixel
    #[error("Statistics cannot be computed from zero relevant pixels")]
    DegenerateStatistics,

    /// The ELM likelihood curve has no interior local maximum
    #[error("No interior local maximum in likelihood curve of {bands} values")]
    NoLocalMaximumFound { bands: usize },

    /// A parameter is outside its valid domain
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A tile request falls outside the image
    #[error("Region {height}x{width} at ({row}, {col}) exceeds {rows}x{cols} image")]
    RegionOutOfBounds {
        row: usize,
        col: usize,
        height: usize,
        width: usize,
        rows: usize,
        cols: usize,
    },

    /// A matrix decomposition did not produce the requested factors
    #[error("Decomposition failed: {0}")]
    Decomposition(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl UnmixError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        UnmixError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Whether the error describes a malformed model rather than bad input data.
    ///
    /// Model errors are raised before any per-pixel work starts.
    pub fn is_model_error(&self) -> bool {
        matches!(
            self,
            UnmixError::InputShapeMismatch { .. } | UnmixError::SingularOrIllConditionedMatrix { .. }
        )
    }
}

/// Non-fatal conditions reported alongside a result.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// An iterative solver stopped on its iteration budget rather than a tolerance
    IterationLimitReached {
        solver: &'static str,
        iterations: usize,
        pixels: usize,
    },
    /// ISRA started from an unconstrained seed with negative components
    NegativeSeed { pixels: usize },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::IterationLimitReached {
                solver,
                iterations,
                pixels,
            } => write!(
                f,
                "{solver}: iteration limit {iterations} reached on {pixels} pixel(s)"
            ),
            Diagnostic::NegativeSeed { pixels } => {
                write!(f, "ISRA seeded with negative abundances on {pixels} pixel(s)")
            }
        }
    }
}
