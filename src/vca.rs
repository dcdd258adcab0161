//! Vertex Component Analysis.
//!
//! Pure pixels sit at the vertices of the simplex spanned by the data. VCA
//! projects the image to `p` dimensions and then, `p` times, draws a random
//! direction orthogonal to the vertices found so far and keeps the pixel with
//! the largest absolute projection on it.
//!
//! ```text
//! Projective:  y = x̃ / ⟨x̃, ū⟩     x̃ = U_pᵀ x,  U_p from the correlation matrix
//! Subspace:    y = [x̃; c]          x̃ = U_{p−1}ᵀ (x − m),  c = max ‖x̃‖
//! ```
//!
//! Every vertex search is one full pass over the image, reduced as a
//! tile-parallel argmax. Ties go to the lowest pixel index, so for a fixed seed
//! the result is bit-identical across runs and thread counts. Different seeds
//! may pick different vertex sets when several pixels are equally extreme;
//! that is expected, not a fault.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::cube::{HyperspectralCube, PixelSource, Region, TilingConfig};
use crate::error::{Result, UnmixError};
use crate::helpers::{dot, NUMERICAL_EPS};
use crate::iter_maybe_parallel;
use crate::linalg::{leading_eigenvectors, truncated_pseudo_inverse};
use crate::matrix::SpectralMatrix;
use crate::statistics::{compute_statistics, SpectralStatistics, StatisticsConfig};
#[cfg(feature = "parallel")]
use rayon::iter::ParallelIterator;

/// Redraws allowed when a random direction falls inside the vertex span.
const MAX_DIRECTION_DRAWS: usize = 16;

/// Dimensionality reduction used before the vertex search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcaProjection {
    /// Correlation subspace followed by the projective projection
    #[default]
    Projective,
    /// Mean-removed covariance subspace of dimension p − 1 (low SNR)
    Subspace,
    /// Pick by estimated SNR
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VcaConfig {
    pub projection: VcaProjection,
    /// SNR threshold in dB for `Auto`, defaults to `15 + 10 log10(p)`
    pub snr_threshold: Option<f64>,
}

/// Extracted endmembers.
#[derive(Debug, Clone, PartialEq)]
pub struct VcaResult {
    /// B × p matrix, one endmember signature per column
    pub endmembers: SpectralMatrix,
    /// Row-major pixel index of each selected vertex
    pub indices: Vec<usize>,
    /// Estimated signal-to-noise ratio in dB
    pub snr: f64,
    /// Projection actually used (never `Auto`)
    pub projection: VcaProjection,
}

impl VcaResult {
    /// Endmembers as a 1 × p image with B bands.
    pub fn as_image(&self) -> HyperspectralCube {
        let p = self.endmembers.ncols();
        // Shape always matches: p spectra on a 1 × p grid
        HyperspectralCube::from_pixel_matrix(self.endmembers.clone(), 1, p)
            .unwrap_or_else(|_| HyperspectralCube::new(1, p, self.endmembers.nrows()))
    }
}

/// Signal-to-noise estimate (dB) of a p-dimensional signal subspace.
///
/// `P_y` is the total power `trace(R)` and `P_p` the power captured by the
/// top-p eigenvalues of `R`; the result is infinite when the subspace holds
/// all the power.
pub fn estimate_snr(stats: &SpectralStatistics, p: usize) -> Result<f64> {
    let bands = stats.bands();
    let (values, _) = leading_eigenvectors(&stats.correlation, p)?;
    let p_y: f64 = (0..bands).map(|b| stats.correlation[(b, b)]).sum();
    let p_p: f64 = values.iter().sum();
    let noise = p_y - p_p;
    if noise <= NUMERICAL_EPS * p_y.abs().max(1.0) {
        return Ok(f64::INFINITY);
    }
    let signal = p_p - (p as f64 / bands as f64) * p_y;
    if signal <= 0.0 {
        return Ok(f64::NEG_INFINITY);
    }
    Ok(10.0 * (signal / noise).log10())
}

/// Maps a band-space pixel to the p-dimensional search space.
enum Projector {
    Projective {
        /// B × p
        basis: DMatrix<f64>,
        /// Projected image mean, length p
        mean: Vec<f64>,
    },
    Subspace {
        /// B × (p − 1)
        basis: DMatrix<f64>,
        mean: Vec<f64>,
        scale: f64,
    },
}

impl Projector {
    fn dim(&self) -> usize {
        match self {
            Projector::Projective { basis, .. } => basis.ncols(),
            Projector::Subspace { basis, .. } => basis.ncols() + 1,
        }
    }

    fn project(&self, pixel: &[f64], out: &mut [f64]) {
        match self {
            Projector::Projective { basis, mean } => {
                for (k, o) in out.iter_mut().enumerate() {
                    *o = dot(basis.column(k).as_slice(), pixel);
                }
                let denom = dot(out, mean);
                if denom.abs() > NUMERICAL_EPS {
                    out.iter_mut().for_each(|v| *v /= denom);
                } else {
                    out.iter_mut().for_each(|v| *v = 0.0);
                }
            }
            Projector::Subspace { basis, mean, scale } => {
                let k = basis.ncols();
                for (j, o) in out.iter_mut().take(k).enumerate() {
                    *o = basis
                        .column(j)
                        .iter()
                        .zip(pixel.iter().zip(mean))
                        .map(|(u, (x, m))| u * (x - m))
                        .sum();
                }
                out[k] = *scale;
            }
        }
    }
}

/// Best pixel of a scan.
#[derive(Debug, Clone)]
struct Candidate {
    score: f64,
    index: usize,
    projected: Vec<f64>,
    spectrum: Vec<f64>,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        self.score > other.score || (self.score == other.score && self.index < other.index)
    }
}

/// Argmax of `|⟨direction, y⟩|` over all pixels of `source`.
fn scan_direction<S>(
    source: &S,
    regions: &[Region],
    projector: &Projector,
    direction: &[f64],
) -> Result<Option<Candidate>>
where
    S: PixelSource + Sync + ?Sized,
{
    let dim = projector.dim();
    let partials: Vec<Result<Option<Candidate>>> = iter_maybe_parallel!(regions.to_vec())
        .map(|region| {
            let tile = source.read_tile(region)?;
            let mut y = vec![0.0; dim];
            let mut best: Option<(f64, usize)> = None;
            for i in 0..tile.len() {
                projector.project(tile.pixel(i), &mut y);
                let score = dot(direction, &y).abs();
                // NaN scores never compare greater and are skipped
                if best.map_or(!score.is_nan(), |(s, _)| score > s) {
                    best = Some((score, i));
                }
            }
            Ok(best.map(|(score, i)| {
                projector.project(tile.pixel(i), &mut y);
                Candidate {
                    score,
                    index: tile.global_index(i),
                    projected: y.clone(),
                    spectrum: tile.pixel(i).to_vec(),
                }
            }))
        })
        .collect();

    let mut best: Option<Candidate> = None;
    for partial in partials {
        if let Some(candidate) = partial? {
            if best.as_ref().map_or(true, |b| candidate.beats(b)) {
                best = Some(candidate);
            }
        }
    }
    Ok(best)
}

/// Largest norm of a projected pixel, the constant coordinate of the subspace
/// projection.
fn max_projected_norm<S>(source: &S, regions: &[Region], projector: &Projector) -> Result<f64>
where
    S: PixelSource + Sync + ?Sized,
{
    let dim = projector.dim();
    let partials: Vec<Result<f64>> = iter_maybe_parallel!(regions.to_vec())
        .map(|region| {
            let tile = source.read_tile(region)?;
            let mut y = vec![0.0; dim];
            let mut max = 0.0f64;
            for i in 0..tile.len() {
                projector.project(tile.pixel(i), &mut y);
                let norm_sq: f64 = y[..dim - 1].iter().map(|v| v * v).sum();
                if norm_sq.is_finite() {
                    max = max.max(norm_sq);
                }
            }
            Ok(max)
        })
        .collect();
    let mut max = 0.0f64;
    for partial in partials {
        max = max.max(partial?);
    }
    Ok(max.sqrt())
}

/// Unit direction orthogonal to the span of the current vertex matrix.
fn draw_direction<R>(vertices: &DMatrix<f64>, rng: &mut R) -> Result<Vec<f64>>
where
    R: Rng + ?Sized,
{
    let p = vertices.nrows();
    let projector = vertices * truncated_pseudo_inverse(vertices, 1e-10)?;
    for _ in 0..MAX_DIRECTION_DRAWS {
        let w = DVector::from_fn(p, |_, _| rng.sample::<f64, _>(StandardNormal));
        let f = &w - &projector * &w;
        let norm = f.norm();
        if norm > NUMERICAL_EPS {
            return Ok((f / norm).as_slice().to_vec());
        }
    }
    Err(UnmixError::SingularOrIllConditionedMatrix {
        context: "VCA vertex span",
        condition: f64::INFINITY,
    })
}

fn build_projector<S>(
    source: &S,
    regions: &[Region],
    stats: &SpectralStatistics,
    p: usize,
    projection: VcaProjection,
) -> Result<Projector>
where
    S: PixelSource + Sync + ?Sized,
{
    match projection {
        VcaProjection::Subspace => {
            let (_, basis) = leading_eigenvectors(&stats.covariance, p - 1)?;
            let mut projector = Projector::Subspace {
                basis,
                mean: stats.mean.clone(),
                scale: 0.0,
            };
            let c = max_projected_norm(source, regions, &projector)?;
            if let Projector::Subspace { scale, .. } = &mut projector {
                *scale = c;
            }
            Ok(projector)
        }
        _ => {
            let (_, basis) = leading_eigenvectors(&stats.correlation, p)?;
            let mean: Vec<f64> = (0..p)
                .map(|k| dot(basis.column(k).as_slice(), &stats.mean))
                .collect();
            Ok(Projector::Projective { basis, mean })
        }
    }
}

/// Extract `p` endmembers, computing the image statistics first.
pub fn vca<S, R>(
    source: &S,
    p: usize,
    rng: &mut R,
    tiling: &TilingConfig,
    config: &VcaConfig,
) -> Result<VcaResult>
where
    S: PixelSource + Sync + ?Sized,
    R: Rng + ?Sized,
{
    let stats = compute_statistics(source, tiling, &StatisticsConfig::default())?;
    vca_with_statistics(source, &stats, p, rng, tiling, config)
}

/// Extract `p` endmembers reusing statistics of the same image.
///
/// # Arguments
/// * `source` - Image to search
/// * `stats` - Statistics of `source` (mean, covariance, correlation)
/// * `p` - Number of endmembers, `1 ≤ p ≤ bands`
/// * `rng` - Seeded generator for the search directions
pub fn vca_with_statistics<S, R>(
    source: &S,
    stats: &SpectralStatistics,
    p: usize,
    rng: &mut R,
    tiling: &TilingConfig,
    config: &VcaConfig,
) -> Result<VcaResult>
where
    S: PixelSource + Sync + ?Sized,
    R: Rng + ?Sized,
{
    let bands = source.bands();
    if p == 0 || p > bands {
        return Err(UnmixError::invalid(
            "p",
            format!("endmember count must lie in 1..={}, got {}", bands, p),
        ));
    }
    if p > source.pixel_count() {
        return Err(UnmixError::invalid(
            "p",
            format!("{} endmembers requested from {} pixels", p, source.pixel_count()),
        ));
    }
    if stats.bands() != bands {
        return Err(UnmixError::InputShapeMismatch {
            expected: bands,
            actual: stats.bands(),
        });
    }

    let snr = estimate_snr(stats, p)?;
    let projection = match config.projection {
        VcaProjection::Auto if p > 1 => {
            let threshold = config
                .snr_threshold
                .unwrap_or(15.0 + 10.0 * (p as f64).log10());
            if snr > threshold {
                VcaProjection::Projective
            } else {
                VcaProjection::Subspace
            }
        }
        VcaProjection::Auto => VcaProjection::Projective,
        VcaProjection::Subspace if p == 1 => {
            return Err(UnmixError::invalid(
                "projection",
                "the subspace projection needs at least 2 endmembers",
            ));
        }
        other => other,
    };
    tracing::info!(p, bands, snr, ?projection, "VCA started");

    let regions: Vec<Region> = tiling.layout(source.rows(), source.cols()).collect();
    let projector = build_projector(source, &regions, stats, p, projection)?;

    let mut vertices = DMatrix::zeros(p, p);
    if p > 1 {
        vertices[(p - 1, 0)] = 1.0;
    }
    let mut endmembers = SpectralMatrix::zeros(bands, p);
    let mut indices = Vec::with_capacity(p);

    for i in 0..p {
        let direction = draw_direction(&vertices, rng)?;
        let best = scan_direction(source, &regions, &projector, &direction)?.ok_or_else(|| {
            UnmixError::invalid("source", "no finite pixel available for the vertex search")
        })?;
        tracing::debug!(iteration = i, pixel = best.index, score = best.score, "vertex selected");

        vertices.set_column(i, &DVector::from_column_slice(&best.projected));
        endmembers.column_mut(i).copy_from_slice(&best.spectrum);
        indices.push(best.index);
    }

    Ok(VcaResult {
        endmembers,
        indices,
        snr,
        projection,
    })
}
