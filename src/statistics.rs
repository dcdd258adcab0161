//! Streaming first- and second-order statistics of a multi-band image.
//!
//! A [`StatisticsAccumulator`] folds tiles into raw sums (no division), merges
//! with other accumulators associatively, and is finalized once into
//! [`SpectralStatistics`]:
//!
//! ```text
//! mean        = Σx / N
//! correlation = Σ x xᵀ / N
//! covariance  = correlation − mean meanᵀ      (× N/(N−1) when unbiased)
//! ```
//!
//! [`compute_statistics`] drives one tile-parallel pass over a [`PixelSource`],
//! building one accumulator per tile and merging them in tile order.

use serde::{Deserialize, Serialize};

use crate::cube::{PixelSource, Tile, TilingConfig};
use crate::error::{Result, UnmixError};
use crate::helpers::all_finite;
use crate::iter_maybe_parallel;
use crate::matrix::SpectralMatrix;
#[cfg(feature = "parallel")]
use rayon::iter::ParallelIterator;

/// Pixel filtering and estimator options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Skip pixels holding a NaN or infinite band value
    pub ignore_infinite: bool,
    /// Skip pixels whose every band equals this value (no-data marker)
    pub ignored_value: Option<f64>,
    /// Scale the covariance by N/(N−1)
    pub unbiased: bool,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            ignore_infinite: true,
            ignored_value: None,
            unbiased: false,
        }
    }
}

/// Running sums over the relevant pixels of an image.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsAccumulator {
    config: StatisticsConfig,
    bands: usize,
    count: usize,
    ignored_infinite: usize,
    ignored_user: usize,
    sum: Vec<f64>,
    /// Upper triangle of Σ x xᵀ; the lower triangle is filled on finalize
    sum_outer: SpectralMatrix,
    min: Vec<f64>,
    max: Vec<f64>,
    component_sum: f64,
    component_sum_sq: f64,
}

impl StatisticsAccumulator {
    pub fn new(bands: usize) -> Self {
        Self::with_config(bands, StatisticsConfig::default())
    }

    pub fn with_config(bands: usize, config: StatisticsConfig) -> Self {
        Self {
            config,
            bands,
            count: 0,
            ignored_infinite: 0,
            ignored_user: 0,
            sum: vec![0.0; bands],
            sum_outer: SpectralMatrix::zeros(bands, bands),
            min: vec![f64::INFINITY; bands],
            max: vec![f64::NEG_INFINITY; bands],
            component_sum: 0.0,
            component_sum_sq: 0.0,
        }
    }

    #[inline]
    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Number of relevant (not ignored) pixels folded in so far.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of pixels skipped so far, `(non-finite, user value)`.
    pub fn ignored(&self) -> (usize, usize) {
        (self.ignored_infinite, self.ignored_user)
    }

    /// Clear every sum, keeping the band count and configuration.
    pub fn reset(&mut self) {
        *self = Self::with_config(self.bands, self.config);
    }

    /// Fold one pixel spectrum into the sums.
    pub fn accumulate_pixel(&mut self, pixel: &[f64]) -> Result<()> {
        if pixel.len() != self.bands {
            return Err(UnmixError::InputShapeMismatch {
                expected: self.bands,
                actual: pixel.len(),
            });
        }
        if self.config.ignore_infinite && !all_finite(pixel) {
            self.ignored_infinite += 1;
            return Ok(());
        }
        if let Some(value) = self.config.ignored_value {
            if pixel.iter().all(|&v| v == value) {
                self.ignored_user += 1;
                return Ok(());
            }
        }

        self.count += 1;
        for (b, &v) in pixel.iter().enumerate() {
            self.sum[b] += v;
            self.min[b] = self.min[b].min(v);
            self.max[b] = self.max[b].max(v);
            self.component_sum += v;
            self.component_sum_sq += v * v;
        }
        for c in 0..self.bands {
            let vc = pixel[c];
            let col = self.sum_outer.column_mut(c);
            for r in 0..=c {
                col[r] += pixel[r] * vc;
            }
        }
        Ok(())
    }

    /// Fold every pixel of a tile into the sums.
    pub fn accumulate(&mut self, tile: &Tile) -> Result<()> {
        if tile.bands() != self.bands {
            return Err(UnmixError::InputShapeMismatch {
                expected: self.bands,
                actual: tile.bands(),
            });
        }
        for i in 0..tile.len() {
            self.accumulate_pixel(tile.pixel(i))?;
        }
        Ok(())
    }

    /// Add the sums of `other` into `self`.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if other.bands != self.bands {
            return Err(UnmixError::InputShapeMismatch {
                expected: self.bands,
                actual: other.bands,
            });
        }
        self.count += other.count;
        self.ignored_infinite += other.ignored_infinite;
        self.ignored_user += other.ignored_user;
        for b in 0..self.bands {
            self.sum[b] += other.sum[b];
            self.min[b] = self.min[b].min(other.min[b]);
            self.max[b] = self.max[b].max(other.max[b]);
        }
        for (dst, src) in self
            .sum_outer
            .as_mut_slice()
            .iter_mut()
            .zip(other.sum_outer.as_slice())
        {
            *dst += src;
        }
        self.component_sum += other.component_sum;
        self.component_sum_sq += other.component_sum_sq;
        Ok(())
    }

    /// Turn the sums into statistics over the accumulated relevant pixels.
    ///
    /// Fails with `DegenerateStatistics` when no relevant pixel was seen.
    pub fn finalize(&self) -> Result<SpectralStatistics> {
        if self.count == 0 {
            return Err(UnmixError::DegenerateStatistics);
        }
        let n = self.count as f64;
        let bands = self.bands;
        let mean: Vec<f64> = self.sum.iter().map(|s| s / n).collect();

        let regul = if self.config.unbiased && self.count > 1 {
            n / (n - 1.0)
        } else {
            1.0
        };

        let mut correlation = SpectralMatrix::zeros(bands, bands);
        let mut covariance = SpectralMatrix::zeros(bands, bands);
        for c in 0..bands {
            for r in 0..=c {
                let cor = self.sum_outer[(r, c)] / n;
                let cov = regul * (cor - mean[r] * mean[c]);
                correlation[(r, c)] = cor;
                correlation[(c, r)] = cor;
                covariance[(r, c)] = cov;
                covariance[(c, r)] = cov;
            }
        }

        let nc = n * bands as f64;
        let regul_component = if self.config.unbiased && nc > 1.0 {
            nc / (nc - 1.0)
        } else {
            1.0
        };
        let component_mean = self.component_sum / nc;
        let component_correlation = self.component_sum_sq / nc;
        let component_covariance =
            regul_component * (component_correlation - component_mean * component_mean);

        Ok(SpectralStatistics {
            count: self.count,
            ignored_infinite: self.ignored_infinite,
            ignored_user: self.ignored_user,
            mean,
            sum: self.sum.clone(),
            min: self.min.clone(),
            max: self.max.clone(),
            covariance,
            correlation,
            component_mean,
            component_correlation,
            component_covariance,
        })
    }
}

/// Finalized image statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralStatistics {
    /// Relevant pixel count N
    pub count: usize,
    pub ignored_infinite: usize,
    pub ignored_user: usize,
    /// Per-band mean, length B
    pub mean: Vec<f64>,
    /// Per-band sum, length B
    pub sum: Vec<f64>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    /// B × B centered second moment
    pub covariance: SpectralMatrix,
    /// B × B uncentered second moment
    pub correlation: SpectralMatrix,
    /// Mean over all bands of all pixels
    pub component_mean: f64,
    pub component_correlation: f64,
    pub component_covariance: f64,
}

impl SpectralStatistics {
    #[inline]
    pub fn bands(&self) -> usize {
        self.mean.len()
    }
}

/// One tile-parallel statistics pass over `source`.
pub fn compute_statistics<S>(
    source: &S,
    tiling: &TilingConfig,
    config: &StatisticsConfig,
) -> Result<SpectralStatistics>
where
    S: PixelSource + Sync + ?Sized,
{
    accumulate_source(source, tiling, config)?.finalize()
}

/// Accumulate every tile of `source` without finalizing.
pub fn accumulate_source<S>(
    source: &S,
    tiling: &TilingConfig,
    config: &StatisticsConfig,
) -> Result<StatisticsAccumulator>
where
    S: PixelSource + Sync + ?Sized,
{
    let bands = source.bands();
    let regions: Vec<_> = tiling.layout(source.rows(), source.cols()).collect();
    tracing::debug!(
        tiles = regions.len(),
        bands,
        pixels = source.pixel_count(),
        "statistics pass"
    );

    let partials: Vec<Result<StatisticsAccumulator>> = iter_maybe_parallel!(regions)
        .map(|region| {
            let tile = source.read_tile(region)?;
            let mut acc = StatisticsAccumulator::with_config(bands, *config);
            acc.accumulate(&tile)?;
            Ok(acc)
        })
        .collect();

    let mut total = StatisticsAccumulator::with_config(bands, *config);
    for partial in partials {
        total.merge(&partial?)?;
    }
    let (ignored_infinite, ignored_user) = total.ignored();
    if ignored_infinite + ignored_user > 0 {
        tracing::debug!(ignored_infinite, ignored_user, "pixels ignored");
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::HyperspectralCube;
    use approx::assert_relative_eq;

    fn sample_cube() -> HyperspectralCube {
        let (rows, cols, bands) = (6, 5, 3);
        let samples: Vec<f64> = (0..rows * cols * bands)
            .map(|i| ((i * 37 % 17) as f64).sin() * 3.0 + (i % bands) as f64)
            .collect();
        HyperspectralCube::from_samples(&samples, rows, cols, bands).unwrap()
    }

    fn direct_statistics(cube: &HyperspectralCube) -> (Vec<f64>, SpectralMatrix) {
        let pixels = cube.pixel_matrix();
        let (bands, n) = pixels.shape();
        let mut mean = vec![0.0; bands];
        for j in 0..n {
            for b in 0..bands {
                mean[b] += pixels[(b, j)] / n as f64;
            }
        }
        let mut cov = SpectralMatrix::zeros(bands, bands);
        for j in 0..n {
            for r in 0..bands {
                for c in 0..bands {
                    cov[(r, c)] +=
                        (pixels[(r, j)] - mean[r]) * (pixels[(c, j)] - mean[c]) / n as f64;
                }
            }
        }
        (mean, cov)
    }

    #[test]
    fn test_matches_direct_computation() {
        let cube = sample_cube();
        let stats =
            compute_statistics(&cube, &TilingConfig::default(), &StatisticsConfig::default())
                .unwrap();
        let (mean, cov) = direct_statistics(&cube);
        assert_eq!(stats.count, 30);
        for b in 0..3 {
            assert_relative_eq!(stats.mean[b], mean[b], epsilon = 1e-12);
            for c in 0..3 {
                assert_relative_eq!(stats.covariance[(b, c)], cov[(b, c)], epsilon = 1e-10);
                assert_relative_eq!(
                    stats.correlation[(b, c)],
                    cov[(b, c)] + mean[b] * mean[c],
                    epsilon = 1e-10
                );
            }
        }
    }

    #[test]
    fn test_covariance_symmetric() {
        let stats = compute_statistics(
            &sample_cube(),
            &TilingConfig::default(),
            &StatisticsConfig::default(),
        )
        .unwrap();
        for r in 0..3 {
            for c in 0..3 {
                assert_eq!(stats.covariance[(r, c)], stats.covariance[(c, r)]);
            }
        }
    }

    #[test]
    fn test_finalize_without_pixels_fails() {
        let acc = StatisticsAccumulator::new(4);
        assert_eq!(acc.finalize().unwrap_err(), UnmixError::DegenerateStatistics);
    }

    #[test]
    fn test_merge_is_commutative() {
        let mut a = StatisticsAccumulator::new(2);
        let mut b = StatisticsAccumulator::new(2);
        a.accumulate_pixel(&[1.0, 2.0]).unwrap();
        a.accumulate_pixel(&[3.0, -1.0]).unwrap();
        b.accumulate_pixel(&[0.5, 0.5]).unwrap();

        let mut ab = a.clone();
        ab.merge(&b).unwrap();
        let mut ba = b.clone();
        ba.merge(&a).unwrap();
        assert_eq!(ab.finalize().unwrap(), ba.finalize().unwrap());
        assert_eq!(ab.count(), 3);
    }

    #[test]
    fn test_merge_rejects_band_mismatch() {
        let mut a = StatisticsAccumulator::new(2);
        let b = StatisticsAccumulator::new(3);
        assert!(matches!(
            a.merge(&b),
            Err(UnmixError::InputShapeMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut acc = StatisticsAccumulator::new(2);
        acc.accumulate_pixel(&[1.0, 2.0]).unwrap();
        acc.reset();
        assert_eq!(acc, StatisticsAccumulator::new(2));
    }

    #[test]
    fn test_ignores_non_finite_and_user_values() {
        let config = StatisticsConfig {
            ignored_value: Some(0.0),
            ..StatisticsConfig::default()
        };
        let mut acc = StatisticsAccumulator::with_config(2, config);
        acc.accumulate_pixel(&[1.0, 3.0]).unwrap();
        acc.accumulate_pixel(&[f64::NAN, 1.0]).unwrap();
        acc.accumulate_pixel(&[0.0, 0.0]).unwrap();
        acc.accumulate_pixel(&[0.0, 1.0]).unwrap();
        assert_eq!(acc.count(), 2);
        assert_eq!(acc.ignored(), (1, 1));

        let stats = acc.finalize().unwrap();
        assert_eq!(stats.mean, vec![0.5, 2.0]);
        assert_eq!(stats.min, vec![0.0, 1.0]);
        assert_eq!(stats.max, vec![1.0, 3.0]);
        assert_eq!(stats.ignored_infinite, 1);
        assert_eq!(stats.ignored_user, 1);
    }

    #[test]
    fn test_unbiased_estimator() {
        let config = StatisticsConfig {
            unbiased: true,
            ..StatisticsConfig::default()
        };
        let mut acc = StatisticsAccumulator::with_config(1, config);
        for v in [1.0, 2.0, 3.0, 4.0] {
            acc.accumulate_pixel(&[v]).unwrap();
        }
        let stats = acc.finalize().unwrap();
        // Sample variance of 1..4
        assert_relative_eq!(stats.covariance[(0, 0)], 5.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(stats.correlation[(0, 0)], 7.5, epsilon = 1e-12);
    }

    #[test]
    fn test_component_statistics() {
        let mut acc = StatisticsAccumulator::new(2);
        acc.accumulate_pixel(&[1.0, 3.0]).unwrap();
        acc.accumulate_pixel(&[5.0, 7.0]).unwrap();
        let stats = acc.finalize().unwrap();
        assert_relative_eq!(stats.component_mean, 4.0, epsilon = 1e-12);
        assert_relative_eq!(stats.component_correlation, 21.0, epsilon = 1e-12);
        assert_relative_eq!(stats.component_covariance, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_accumulate_rejects_wrong_band_count() {
        let mut acc = StatisticsAccumulator::new(3);
        assert!(acc.accumulate_pixel(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_all_pixels_ignored_is_degenerate() {
        let samples = vec![f64::NAN; 8];
        let cube = HyperspectralCube::from_samples(&samples, 2, 2, 2).unwrap();
        let err = compute_statistics(&cube, &TilingConfig::default(), &StatisticsConfig::default())
            .unwrap_err();
        assert_eq!(err, UnmixError::DegenerateStatistics);
    }
}
