//! Linear unmixing: abundances of known endmembers in every pixel.
//!
//! A solver goes through two phases:
//! 1. [`PreparedSolver::new`] validates the endmember matrix once (rank,
//!    condition number) and precomputes its pseudo-inverse and Gram terms.
//!    Model errors surface here, before any pixel is touched.
//! 2. [`PreparedSolver::solve`] maps one pixel to its abundance vector, and
//!    [`unmix_image`] runs it over every tile of a [`PixelSource`].
//!
//! | Solver  | Constraint          | Stopping rule                    |
//! |---------|---------------------|----------------------------------|
//! | UCLS    | none                | closed form                      |
//! | NCLS    | a ≥ 0               | fixed iteration count            |
//! | ISRA    | a ≥ 0 (if seed ≥ 0) | fixed iteration count            |
//! | MDMDNMF | a ≥ 0, soft Σa = 1  | relative objective change or cap |

pub mod isra;
pub mod mdmdnmf;
pub mod ncls;
pub mod ucls;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::cube::{collect_pixels, HyperspectralCube, PixelSource, Region, Tile, TilingConfig};
use crate::error::{Diagnostic, Result, UnmixError};
use crate::helpers::{all_finite, DEFAULT_MAX_CONDITION};
use crate::iter_maybe_parallel;
use crate::linalg::{checked_pseudo_inverse, spd_inverse};
use crate::matrix::SpectralMatrix;
#[cfg(feature = "parallel")]
use rayon::iter::ParallelIterator;

pub use mdmdnmf::{factorize, Factorization, MdmdnmfConfig};

/// Default iteration budget of NCLS and ISRA.
pub const DEFAULT_SOLVER_ITERATIONS: usize = 10;

fn default_iterations() -> usize {
    DEFAULT_SOLVER_ITERATIONS
}

/// Unmixing algorithm and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum UnmixingSolver {
    Ucls,
    Ncls {
        #[serde(default = "default_iterations")]
        max_iter: usize,
    },
    Isra {
        #[serde(default = "default_iterations")]
        max_iter: usize,
    },
    Mdmdnmf(MdmdnmfConfig),
}

impl Default for UnmixingSolver {
    fn default() -> Self {
        UnmixingSolver::Ncls {
            max_iter: DEFAULT_SOLVER_ITERATIONS,
        }
    }
}

impl UnmixingSolver {
    pub fn name(&self) -> &'static str {
        match self {
            UnmixingSolver::Ucls => "UCLS",
            UnmixingSolver::Ncls { .. } => "NCLS",
            UnmixingSolver::Isra { .. } => "ISRA",
            UnmixingSolver::Mdmdnmf(_) => "MDMDNMF",
        }
    }

    /// Iteration budget, 0 for the closed-form solver.
    pub fn max_iter(&self) -> usize {
        match self {
            UnmixingSolver::Ucls => 0,
            UnmixingSolver::Ncls { max_iter } | UnmixingSolver::Isra { max_iter } => *max_iter,
            UnmixingSolver::Mdmdnmf(config) => config.max_iter,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            UnmixingSolver::Ucls => Ok(()),
            UnmixingSolver::Ncls { max_iter } | UnmixingSolver::Isra { max_iter } => {
                if *max_iter == 0 {
                    Err(UnmixError::invalid("max_iter", "must be at least 1"))
                } else {
                    Ok(())
                }
            }
            UnmixingSolver::Mdmdnmf(config) => {
                if config.max_iter == 0 {
                    return Err(UnmixError::invalid("max_iter", "must be at least 1"));
                }
                config.validate()
            }
        }
    }
}

/// Solver parameters with their precomputed operators.
#[derive(Debug, Clone)]
enum Workspace {
    Direct,
    Ncls {
        max_iter: usize,
        /// `(AᵀA)⁻¹ Aᵀ`
        correction: DMatrix<f64>,
    },
    Isra {
        max_iter: usize,
        /// `AᵀA`
        gram: DMatrix<f64>,
    },
    Mdmdnmf(MdmdnmfConfig),
}

/// Abundances of one pixel with per-pixel solver state.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelSolution {
    pub abundances: Vec<f64>,
    /// Iterations actually run (0 for UCLS)
    pub iterations: usize,
    /// The solver stopped on its iteration budget
    pub limit_reached: bool,
    /// ISRA started from a seed with a negative component
    pub seed_negative: bool,
}

/// A solver bound to a validated endmember matrix.
#[derive(Debug, Clone)]
pub struct PreparedSolver {
    solver: UnmixingSolver,
    endmembers: DMatrix<f64>,
    pseudo_inverse: DMatrix<f64>,
    workspace: Workspace,
}

impl PreparedSolver {
    /// Validate `endmembers` (B × p) and precompute the solver operators.
    ///
    /// Fails with `SingularOrIllConditionedMatrix` when `p > B` or the condition
    /// number of the endmember matrix exceeds `max_condition`.
    pub fn new(
        solver: UnmixingSolver,
        endmembers: &SpectralMatrix,
        max_condition: f64,
    ) -> Result<Self> {
        solver.validate()?;
        let (bands, p) = endmembers.shape();
        if bands == 0 || p == 0 {
            return Err(UnmixError::invalid(
                "endmembers",
                format!("empty endmember matrix {}", endmembers),
            ));
        }
        if !all_finite(endmembers.as_slice()) {
            return Err(UnmixError::invalid(
                "endmembers",
                "endmember matrix holds non-finite values",
            ));
        }
        if max_condition.is_nan() || max_condition < 1.0 {
            return Err(UnmixError::invalid(
                "max_condition",
                format!("must be at least 1, got {}", max_condition),
            ));
        }
        if p > bands {
            return Err(UnmixError::SingularOrIllConditionedMatrix {
                context: "endmember matrix has more columns than bands",
                condition: f64::INFINITY,
            });
        }

        let a = endmembers.to_dmatrix();
        let pseudo_inverse = checked_pseudo_inverse(&a, max_condition, "endmember matrix")?;
        let workspace = match solver {
            UnmixingSolver::Ucls => Workspace::Direct,
            UnmixingSolver::Ncls { max_iter } => {
                let gram_inverse = spd_inverse(&(a.transpose() * &a), "endmember Gram matrix")?;
                Workspace::Ncls {
                    max_iter,
                    correction: ncls::correction_operator(&a, &gram_inverse),
                }
            }
            UnmixingSolver::Isra { max_iter } => Workspace::Isra {
                max_iter,
                gram: a.transpose() * &a,
            },
            UnmixingSolver::Mdmdnmf(config) => Workspace::Mdmdnmf(config),
        };
        tracing::debug!(solver = solver.name(), bands, p, "solver prepared");

        Ok(Self {
            solver,
            endmembers: a,
            pseudo_inverse,
            workspace,
        })
    }

    /// Prepare with the default condition-number limit.
    pub fn with_default_condition(solver: UnmixingSolver, endmembers: &SpectralMatrix) -> Result<Self> {
        Self::new(solver, endmembers, DEFAULT_MAX_CONDITION)
    }

    pub fn solver(&self) -> &UnmixingSolver {
        &self.solver
    }

    #[inline]
    pub fn bands(&self) -> usize {
        self.endmembers.nrows()
    }

    #[inline]
    pub fn endmember_count(&self) -> usize {
        self.endmembers.ncols()
    }

    pub fn endmembers(&self) -> SpectralMatrix {
        SpectralMatrix::from_dmatrix(&self.endmembers)
    }

    /// Abundances of one pixel.
    ///
    /// MDMDNMF keeps the endmember matrix fixed here; joint refinement only
    /// happens in [`unmix_image`].
    pub fn solve(&self, pixel: &[f64]) -> Result<PixelSolution> {
        if pixel.len() != self.bands() {
            return Err(UnmixError::InputShapeMismatch {
                expected: self.bands(),
                actual: pixel.len(),
            });
        }
        if !all_finite(pixel) {
            return Err(UnmixError::invalid("pixel", "pixel holds non-finite values"));
        }
        Ok(self.solve_finite(pixel))
    }

    fn solve_finite(&self, pixel: &[f64]) -> PixelSolution {
        match &self.workspace {
            Workspace::Direct => PixelSolution {
                abundances: ucls::ucls(&self.pseudo_inverse, pixel),
                iterations: 0,
                limit_reached: false,
                seed_negative: false,
            },
            Workspace::Ncls {
                max_iter,
                correction,
            } => {
                let seed = ucls::ucls(&self.pseudo_inverse, pixel);
                PixelSolution {
                    abundances: ncls::ncls(&self.endmembers, correction, seed, pixel, *max_iter),
                    iterations: *max_iter,
                    limit_reached: true,
                    seed_negative: false,
                }
            }
            Workspace::Isra { max_iter, gram } => {
                let seed = ucls::ucls(&self.pseudo_inverse, pixel);
                let seed_negative = seed.iter().any(|&v| v < 0.0);
                PixelSolution {
                    abundances: isra::isra(&self.endmembers, gram, seed, pixel, *max_iter),
                    iterations: *max_iter,
                    limit_reached: true,
                    seed_negative,
                }
            }
            Workspace::Mdmdnmf(config) => {
                let (abundances, iterations, converged) =
                    mdmdnmf::solve_pixel(&self.endmembers, &self.pseudo_inverse, pixel, config);
                PixelSolution {
                    abundances,
                    iterations,
                    limit_reached: !converged,
                    seed_negative: false,
                }
            }
        }
    }

    fn joint(&self) -> Option<&MdmdnmfConfig> {
        match &self.workspace {
            Workspace::Mdmdnmf(config) if config.update_endmembers => Some(config),
            _ => None,
        }
    }
}

/// Summary of an image-level unmixing run.
#[derive(Debug, Clone, PartialEq)]
pub struct UnmixingReport {
    pub solver: &'static str,
    pub pixels: usize,
    /// Pixels skipped because a band value was NaN or infinite
    pub non_finite_pixels: usize,
    /// Largest iteration count used by any pixel (or by the joint run)
    pub iterations: usize,
    pub limit_reached_pixels: usize,
    pub negative_seed_pixels: usize,
    /// Final objective of a joint MDMDNMF run
    pub objective: Option<f64>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Abundance image plus report.
#[derive(Debug, Clone, PartialEq)]
pub struct UnmixingOutput {
    /// rows × cols image with one band per endmember
    pub abundances: HyperspectralCube,
    /// Refined endmembers, only from joint MDMDNMF
    pub endmembers: Option<SpectralMatrix>,
    pub report: UnmixingReport,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    pixels: usize,
    non_finite: usize,
    iterations: usize,
    limit_reached: usize,
    negative_seed: usize,
}

impl Tally {
    fn record(&mut self, solution: &PixelSolution) {
        self.pixels += 1;
        self.iterations = self.iterations.max(solution.iterations);
        self.limit_reached += usize::from(solution.limit_reached);
        self.negative_seed += usize::from(solution.seed_negative);
    }

    fn merge(&mut self, other: &Tally) {
        self.pixels += other.pixels;
        self.non_finite += other.non_finite;
        self.iterations = self.iterations.max(other.iterations);
        self.limit_reached += other.limit_reached;
        self.negative_seed += other.negative_seed;
    }
}

fn build_report(solver: &UnmixingSolver, tally: Tally, objective: Option<f64>) -> UnmixingReport {
    let mut diagnostics = Vec::new();
    if tally.limit_reached > 0 {
        diagnostics.push(Diagnostic::IterationLimitReached {
            solver: solver.name(),
            iterations: solver.max_iter(),
            pixels: tally.limit_reached,
        });
    }
    if tally.negative_seed > 0 {
        diagnostics.push(Diagnostic::NegativeSeed {
            pixels: tally.negative_seed,
        });
    }
    for diagnostic in &diagnostics {
        tracing::warn!(%diagnostic, "unmixing diagnostic");
    }
    if tally.non_finite > 0 {
        tracing::warn!(pixels = tally.non_finite, "non-finite pixels left unmixed");
    }
    UnmixingReport {
        solver: solver.name(),
        pixels: tally.pixels,
        non_finite_pixels: tally.non_finite,
        iterations: tally.iterations,
        limit_reached_pixels: tally.limit_reached,
        negative_seed_pixels: tally.negative_seed,
        objective,
        diagnostics,
    }
}

/// Unmix every pixel of `source`.
///
/// Tiles are solved in parallel and written back in tile order. Pixels with a
/// non-finite band value get NaN abundances and are counted in the report.
/// Joint MDMDNMF (`update_endmembers`) gathers the whole image first and also
/// returns the refined endmembers.
pub fn unmix_image<S>(
    source: &S,
    prepared: &PreparedSolver,
    tiling: &TilingConfig,
) -> Result<UnmixingOutput>
where
    S: PixelSource + Sync + ?Sized,
{
    if source.bands() != prepared.bands() {
        return Err(UnmixError::InputShapeMismatch {
            expected: prepared.bands(),
            actual: source.bands(),
        });
    }
    let (rows, cols) = (source.rows(), source.cols());
    let p = prepared.endmember_count();
    tracing::info!(
        solver = prepared.solver.name(),
        rows,
        cols,
        p,
        "unmixing started"
    );

    if let Some(config) = prepared.joint() {
        return unmix_joint(source, prepared, config, tiling);
    }

    let regions: Vec<Region> = tiling.layout(rows, cols).collect();
    let partials: Vec<Result<(Tile, Tally)>> = iter_maybe_parallel!(regions)
        .map(|region| {
            let tile = source.read_tile(region)?;
            let mut out = SpectralMatrix::zeros(p, tile.len());
            let mut tally = Tally::default();
            for i in 0..tile.len() {
                let pixel = tile.pixel(i);
                if !all_finite(pixel) {
                    out.column_mut(i).fill(f64::NAN);
                    tally.non_finite += 1;
                    continue;
                }
                let solution = prepared.solve_finite(pixel);
                out.column_mut(i).copy_from_slice(&solution.abundances);
                tally.record(&solution);
            }
            Ok((Tile::new(region, cols, out)?, tally))
        })
        .collect();

    let mut abundances = HyperspectralCube::new(rows, cols, p);
    let mut tally = Tally::default();
    for partial in partials {
        let (tile, part) = partial?;
        abundances.write_tile(&tile)?;
        tally.merge(&part);
    }

    Ok(UnmixingOutput {
        abundances,
        endmembers: None,
        report: build_report(&prepared.solver, tally, None),
    })
}

fn unmix_joint<S>(
    source: &S,
    prepared: &PreparedSolver,
    config: &MdmdnmfConfig,
    tiling: &TilingConfig,
) -> Result<UnmixingOutput>
where
    S: PixelSource + ?Sized,
{
    let pixels = collect_pixels(source, tiling)?;
    if !all_finite(pixels.as_slice()) {
        return Err(UnmixError::invalid(
            "source",
            "joint MDMDNMF requires finite pixel values",
        ));
    }
    let x = pixels.to_dmatrix();
    let seed = mdmdnmf::clamped_seed(&prepared.pseudo_inverse, &x);
    let result = mdmdnmf::refine(&x, prepared.endmembers.clone(), seed, config, true);
    let n = x.ncols();
    tracing::debug!(
        iterations = result.iterations,
        converged = result.converged,
        "joint MDMDNMF finished"
    );

    let abundances = HyperspectralCube::from_pixel_matrix(
        SpectralMatrix::from_dmatrix(&result.abundances),
        source.rows(),
        source.cols(),
    )?;
    let tally = Tally {
        pixels: n,
        non_finite: 0,
        iterations: result.iterations,
        limit_reached: if result.converged { 0 } else { n },
        negative_seed: 0,
    };
    Ok(UnmixingOutput {
        abundances,
        endmembers: Some(SpectralMatrix::from_dmatrix(&result.endmembers)),
        report: build_report(&prepared.solver, tally, result.objective.last().copied()),
    })
}
