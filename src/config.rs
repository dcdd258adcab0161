//! Pipeline configuration loaded from TOML.
//!
//! Every section is optional; missing keys take their defaults.
//!
//! ```toml
//! seed = 7
//! endmember_count = 4
//!
//! [tiling]
//! tile_height = 32
//! tile_width = 32
//!
//! [estimator]
//! method = "vd"
//! far = 0.001
//!
//! [vca]
//! projection = "auto"
//!
//! [unmixing]
//! max_condition = 1e10
//! solver = { method = "isra", max_iter = 25 }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cube::TilingConfig;
use crate::error::{Result, UnmixError};
use crate::estimation::EndmemberCountEstimator;
use crate::helpers::DEFAULT_MAX_CONDITION;
use crate::statistics::StatisticsConfig;
use crate::unmixing::UnmixingSolver;
use crate::vca::VcaConfig;

/// Solver selection and model checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnmixingConfig {
    /// Largest accepted condition number of the endmember matrix
    pub max_condition: f64,
    pub solver: UnmixingSolver,
}

impl Default for UnmixingConfig {
    fn default() -> Self {
        Self {
            max_condition: DEFAULT_MAX_CONDITION,
            solver: UnmixingSolver::default(),
        }
    }
}

/// Configuration of a full statistics → count → VCA → unmixing run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seed of the VCA direction generator
    pub seed: u64,
    /// Skip estimation and extract exactly this many endmembers
    pub endmember_count: Option<usize>,
    pub tiling: TilingConfig,
    pub statistics: StatisticsConfig,
    pub estimator: EndmemberCountEstimator,
    pub vca: VcaConfig,
    pub unmixing: UnmixingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            endmember_count: None,
            tiling: TilingConfig::default(),
            statistics: StatisticsConfig::default(),
            estimator: EndmemberCountEstimator::default(),
            vca: VcaConfig::default(),
            unmixing: UnmixingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| UnmixError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| UnmixError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| UnmixError::Config(e.to_string()))
    }
}
