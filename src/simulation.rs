//! Synthetic scenes for tests, benchmarks and demos.
//!
//! Scenes follow the linear mixing model
//! ```text
//! x_j = A s_j + n_j,     s_j ~ Dirichlet(1, …, 1),  n_j ~ N(0, σ² I)
//! ```
//! with smooth positive endmember spectra built from a few Gaussian absorption
//! features on a sloped baseline.

use rand::prelude::*;
use rand_distr::{Exp1, Normal};

use crate::cube::HyperspectralCube;
use crate::error::{Result, UnmixError};
use crate::matrix::SpectralMatrix;
use crate::maybe_par_chunks_mut_enumerate;

/// Options for [`simulate_scene`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneOptions {
    /// Place one pure pixel of each endmember at the first p positions
    pub pure_pixels: bool,
    /// Standard deviation of additive Gaussian noise (0 for none)
    pub noise_sd: f64,
    pub seed: Option<u64>,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            pure_pixels: true,
            noise_sd: 0.0,
            seed: Some(42),
        }
    }
}

/// A simulated image with its ground truth.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticScene {
    pub cube: HyperspectralCube,
    /// B × p
    pub endmembers: SpectralMatrix,
    /// p × (rows * cols), column `r * cols + c` belongs to pixel `(r, c)`
    pub abundances: SpectralMatrix,
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Random smooth positive spectra, one per column.
///
/// # Arguments
/// * `bands` - Spectral length B
/// * `p` - Number of endmembers
/// * `seed` - Optional random seed
pub fn random_endmembers(bands: usize, p: usize, seed: Option<u64>) -> SpectralMatrix {
    let mut rng = make_rng(seed);
    let mut endmembers = SpectralMatrix::zeros(bands, p);
    let span = bands.max(2) as f64 - 1.0;

    for e in 0..p {
        let baseline = rng.gen_range(0.2..0.6);
        let slope = rng.gen_range(-0.2..0.2);
        let features: Vec<(f64, f64, f64)> = (0..3)
            .map(|_| {
                let center = rng.gen_range(0.0..1.0);
                let width = rng.gen_range(0.03..0.15);
                let depth = rng.gen_range(-0.3..0.5);
                (center, width, depth)
            })
            .collect();

        for (b, value) in endmembers.column_mut(e).iter_mut().enumerate() {
            let t = b as f64 / span;
            let bumps: f64 = features
                .iter()
                .map(|&(c, w, d)| d * (-0.5 * ((t - c) / w).powi(2)).exp())
                .sum();
            *value = (baseline + slope * (t - 0.5) + bumps).max(0.01);
        }
    }
    endmembers
}

/// Dirichlet(1) sample of length `p` via normalized exponential draws.
fn dirichlet(rng: &mut StdRng, p: usize) -> Vec<f64> {
    let mut draws: Vec<f64> = (0..p).map(|_| rng.sample::<f64, _>(Exp1)).collect();
    let total: f64 = draws.iter().sum();
    if total > 0.0 {
        draws.iter_mut().for_each(|v| *v /= total);
    } else {
        draws.iter_mut().for_each(|v| *v = 1.0 / p as f64);
    }
    draws
}

/// Mix `endmembers` into a `rows × cols` scene.
pub fn simulate_scene(
    endmembers: &SpectralMatrix,
    rows: usize,
    cols: usize,
    options: &SceneOptions,
) -> Result<SyntheticScene> {
    let (bands, p) = endmembers.shape();
    let n = rows * cols;
    if p == 0 || bands == 0 {
        return Err(UnmixError::invalid(
            "endmembers",
            format!("empty endmember matrix {}", endmembers),
        ));
    }
    if !(options.noise_sd >= 0.0 && options.noise_sd.is_finite()) {
        return Err(UnmixError::invalid(
            "noise_sd",
            format!("must be finite and non-negative, got {}", options.noise_sd),
        ));
    }
    let mut rng = make_rng(options.seed);

    let mut abundances = SpectralMatrix::zeros(p, n);
    for j in 0..n {
        if options.pure_pixels && j < p {
            abundances[(j, j)] = 1.0;
        } else {
            abundances.column_mut(j).copy_from_slice(&dirichlet(&mut rng, p));
        }
    }

    let mut data = vec![0.0; bands * n];
    maybe_par_chunks_mut_enumerate!(data, bands, |(j, pixel): (usize, &mut [f64])| {
        let s = abundances.column(j);
        for (b, value) in pixel.iter_mut().enumerate() {
            *value = (0..p).map(|e| endmembers[(b, e)] * s[e]).sum();
        }
    });

    if options.noise_sd > 0.0 {
        let normal = Normal::new(0.0, options.noise_sd)
            .map_err(|e| UnmixError::invalid("noise_sd", e.to_string()))?;
        for value in data.iter_mut() {
            *value += rng.sample::<f64, _>(normal);
        }
    }

    let pixels = SpectralMatrix::from_column_major(data, bands, n)
        .ok_or_else(|| UnmixError::invalid("endmembers", "inconsistent scene dimensions"))?;
    Ok(SyntheticScene {
        cube: HyperspectralCube::from_pixel_matrix(pixels, rows, cols)?,
        endmembers: endmembers.clone(),
        abundances,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_endmembers_positive_and_reproducible() {
        let a = random_endmembers(20, 4, Some(1));
        let b = random_endmembers(20, 4, Some(1));
        assert_eq!(a, b);
        assert_eq!(a.shape(), (20, 4));
        assert!(a.as_slice().iter().all(|&v| v > 0.0));
        assert_ne!(a.column(0), a.column(1));
    }

    #[test]
    fn test_scene_abundances_on_simplex() {
        let endmembers = random_endmembers(6, 3, Some(5));
        let scene = simulate_scene(&endmembers, 4, 5, &SceneOptions::default()).unwrap();
        assert_eq!(scene.cube.shape(), (4, 5, 6));
        assert_eq!(scene.abundances.shape(), (3, 20));
        for s in scene.abundances.columns() {
            assert!(s.iter().all(|&v| v >= 0.0));
            assert!((s.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_pure_pixels_copy_endmembers() {
        let endmembers = random_endmembers(6, 3, Some(5));
        let scene = simulate_scene(&endmembers, 3, 3, &SceneOptions::default()).unwrap();
        for e in 0..3 {
            assert_eq!(scene.cube.pixel(0, e), endmembers.column(e));
        }
    }

    #[test]
    fn test_noise_changes_pixels() {
        let endmembers = random_endmembers(6, 2, Some(5));
        let clean = simulate_scene(&endmembers, 2, 2, &SceneOptions::default()).unwrap();
        let noisy = simulate_scene(
            &endmembers,
            2,
            2,
            &SceneOptions {
                noise_sd: 0.01,
                ..SceneOptions::default()
            },
        )
        .unwrap();
        assert_eq!(clean.abundances, noisy.abundances);
        assert_ne!(clean.cube, noisy.cube);
    }

    #[test]
    fn test_invalid_noise() {
        let endmembers = random_endmembers(6, 2, Some(5));
        let options = SceneOptions {
            noise_sd: -1.0,
            ..SceneOptions::default()
        };
        assert!(simulate_scene(&endmembers, 2, 2, &options).is_err());
    }
}
