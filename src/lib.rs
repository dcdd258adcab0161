//! # hsi-unmix
//!
//! Linear spectral unmixing of hyperspectral images in Rust.
//!
//! The crate provides:
//! - Streaming image statistics (mean, covariance, correlation) with associative
//!   tile merges
//! - Endmember count estimation (Eigenvalue Likelihood Maximization, Virtual
//!   Dimensionality)
//! - Endmember extraction with Vertex Component Analysis
//! - Abundance solvers: UCLS, NCLS, ISRA and MDMD-NMF
//! - An end-to-end pipeline configured from TOML
//!
//! ## Data Layout
//!
//! Spectra are columns of column-major matrices:
//! - An image of `rows × cols` pixels with `B` bands is a `B × (rows * cols)`
//!   [`SpectralMatrix`]; pixel `(r, c)` is column `r * cols + c`
//! - The endmember matrix is `B × p`, the abundance matrix `p × N`
//!
//! Images are read through the [`PixelSource`] trait one [`Region`] at a time,
//! so every pass can run tile-parallel (feature `parallel`, on by default).

#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]

pub mod parallel;

pub mod config;
pub mod cube;
pub mod error;
pub mod estimation;
pub mod helpers;
pub mod linalg;
pub mod matrix;
pub mod metrics;
pub mod pipeline;
pub mod simulation;
pub mod statistics;
pub mod unmixing;
pub mod vca;

pub use config::{PipelineConfig, UnmixingConfig};
pub use cube::{collect_pixels, HyperspectralCube, PixelSource, Region, Tile, TilingConfig};
pub use error::{Diagnostic, Result, UnmixError};
pub use estimation::{CountDiagnostic, CountEstimate, EndmemberCountEstimator};
pub use helpers::{DEFAULT_CONVERGENCE_TOL, DEFAULT_MAX_CONDITION, NUMERICAL_EPS};
pub use matrix::SpectralMatrix;
pub use pipeline::{run_pipeline, PipelineOutput};
pub use statistics::{compute_statistics, SpectralStatistics, StatisticsAccumulator, StatisticsConfig};
pub use unmixing::{
    unmix_image, MdmdnmfConfig, PixelSolution, PreparedSolver, UnmixingOutput, UnmixingReport,
    UnmixingSolver,
};
pub use vca::{vca, vca_with_statistics, VcaConfig, VcaProjection, VcaResult};
