//! End-to-end unmixing of one image.
//!
//! ```text
//! statistics ──► endmember count ──► VCA ──► prepared solver ──► abundances
//!     (1 pass)     (ELM / VD or        (p passes)                  (1 pass)
//!                   fixed override)
//! ```

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::PipelineConfig;
use crate::cube::PixelSource;
use crate::error::Result;
use crate::estimation::CountEstimate;
use crate::statistics::{compute_statistics, SpectralStatistics};
use crate::unmixing::{unmix_image, PreparedSolver, UnmixingOutput};
use crate::vca::{vca_with_statistics, VcaResult};

/// Everything a pipeline run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub statistics: SpectralStatistics,
    /// `None` when the endmember count was fixed by configuration
    pub estimate: Option<CountEstimate>,
    pub extraction: VcaResult,
    pub unmixing: UnmixingOutput,
}

impl PipelineOutput {
    /// Number of endmembers actually extracted.
    pub fn endmember_count(&self) -> usize {
        self.extraction.endmembers.ncols()
    }
}

/// Run statistics, count estimation, extraction and unmixing over `source`.
pub fn run_pipeline<S>(source: &S, config: &PipelineConfig) -> Result<PipelineOutput>
where
    S: PixelSource + Sync + ?Sized,
{
    tracing::info!(
        rows = source.rows(),
        cols = source.cols(),
        bands = source.bands(),
        "pipeline started"
    );
    let statistics = compute_statistics(source, &config.tiling, &config.statistics)?;
    tracing::info!(
        pixels = statistics.count,
        ignored = statistics.ignored_infinite + statistics.ignored_user,
        "statistics finalized"
    );

    let (p, estimate) = match config.endmember_count {
        Some(p) => {
            tracing::info!(p, "endmember count fixed by configuration");
            (p, None)
        }
        None => {
            let estimate = config.estimator.estimate(&statistics)?;
            (estimate.count, Some(estimate))
        }
    };

    let mut rng = StdRng::seed_from_u64(config.seed);
    let extraction = vca_with_statistics(
        source,
        &statistics,
        p,
        &mut rng,
        &config.tiling,
        &config.vca,
    )?;
    tracing::info!(indices = ?extraction.indices, "endmembers extracted");

    let prepared = PreparedSolver::new(
        config.unmixing.solver,
        &extraction.endmembers,
        config.unmixing.max_condition,
    )?;
    let unmixing = unmix_image(source, &prepared, &config.tiling)?;
    for diagnostic in &unmixing.report.diagnostics {
        tracing::warn!(%diagnostic, "pipeline finished with diagnostic");
    }

    Ok(PipelineOutput {
        statistics,
        estimate,
        extraction,
        unmixing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::EndmemberCountEstimator;
    use crate::matrix::SpectralMatrix;
    use crate::simulation::{random_endmembers, simulate_scene, SceneOptions};
    use crate::unmixing::UnmixingSolver;

    fn scene() -> crate::simulation::SyntheticScene {
        let endmembers = random_endmembers(8, 3, Some(3));
        simulate_scene(&endmembers, 6, 6, &SceneOptions::default()).unwrap()
    }

    #[test]
    fn test_pipeline_with_fixed_count() {
        let scene = scene();
        let config = PipelineConfig {
            endmember_count: Some(3),
            ..PipelineConfig::default()
        };
        let output = run_pipeline(&scene.cube, &config).unwrap();
        assert!(output.estimate.is_none());
        assert_eq!(output.endmember_count(), 3);
        assert_eq!(output.unmixing.abundances.shape(), (6, 6, 3));
        assert_eq!(output.statistics.count, 36);
    }

    /// Flat, bumped and ramped spectra whose noise-free mixtures VD counts as 3.
    fn stretched_scene() -> crate::simulation::SyntheticScene {
        let bands = 8;
        let flat = vec![0.3; bands];
        let bump = (0..bands)
            .map(|b| 0.3 + 0.15 * (-((b as f64 - 1.5) / 1.2).powi(2)).exp())
            .collect();
        let ramp = (0..bands).map(|b| 0.3 + 0.08 * b as f64).collect();
        let endmembers = SpectralMatrix::from_columns(&[flat, bump, ramp]).unwrap();
        simulate_scene(&endmembers, 20, 20, &SceneOptions::default()).unwrap()
    }

    #[test]
    fn test_pipeline_with_estimated_count() {
        let scene = stretched_scene();
        let config = PipelineConfig {
            estimator: EndmemberCountEstimator::Vd { far: 1e-3 },
            unmixing: crate::config::UnmixingConfig {
                solver: UnmixingSolver::Ucls,
                ..Default::default()
            },
            ..PipelineConfig::default()
        };
        let output = run_pipeline(&scene.cube, &config).unwrap();
        let estimate = output.estimate.as_ref().unwrap();
        assert_eq!(estimate.count, 3);
        assert_eq!(output.endmember_count(), 3);
        assert_eq!(output.unmixing.abundances.shape(), (20, 20, 3));
    }

    #[test]
    fn test_default_pipeline_on_noise_free_scene() {
        let scene = stretched_scene();
        let output = run_pipeline(&scene.cube, &PipelineConfig::default()).unwrap();
        assert_eq!(output.estimate.as_ref().map(|e| e.count), Some(3));
        assert_eq!(output.unmixing.report.non_finite_pixels, 0);

        let mut indices = output.extraction.indices.clone();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let scene = scene();
        let config = PipelineConfig {
            endmember_count: Some(3),
            seed: 11,
            ..PipelineConfig::default()
        };
        let a = run_pipeline(&scene.cube, &config).unwrap();
        let b = run_pipeline(&scene.cube, &config).unwrap();
        assert_eq!(a.extraction, b.extraction);
        assert_eq!(a.unmixing.abundances, b.unmixing.abundances);
    }
}
