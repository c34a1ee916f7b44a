//! Analysis configuration.
//!
//! Stored as JSON (`.passage/config.json`). Every field has a default, so an
//! empty object is a valid config.

use crate::ids::SpeciesCode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Weighted average gain per barrier separating the two Rank-1 bands.
pub const DEFAULT_GAIN_BAND_THRESHOLD: f64 = 0.5;

/// Number of consecutive ranks covered by each tier letter.
pub const DEFAULT_TIER_WIDTH: u32 = 10;

/// Decimal places DCI values are rounded to.
pub const DEFAULT_DCI_PRECISION: u32 = 4;

/// Negative DCI down to this magnitude is float noise and clamps to zero.
pub const DEFAULT_NEGATIVE_DCI_TOLERANCE: f64 = 1e-9;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which barriers take part in grouping and ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingFilter {
    /// Skip barriers that are already fully passable.
    pub exclude_passable: bool,
    /// Skip barriers with no habitat upstream.
    pub require_upstream_habitat: bool,
    /// Skip natural barriers such as waterfalls.
    pub exclude_natural: bool,
}

impl Default for RankingFilter {
    fn default() -> Self {
        Self {
            exclude_passable: true,
            require_upstream_habitat: true,
            exclude_natural: true,
        }
    }
}

/// Settings for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Species to analyze. Empty means every species with habitat in the network.
    pub species: Vec<SpeciesCode>,
    pub gain_band_threshold: f64,
    pub tier_width: u32,
    pub dci_precision: u32,
    pub negative_dci_tolerance: f64,
    pub ranking: RankingFilter,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            species: Vec::new(),
            gain_band_threshold: DEFAULT_GAIN_BAND_THRESHOLD,
            tier_width: DEFAULT_TIER_WIDTH,
            dci_precision: DEFAULT_DCI_PRECISION,
            negative_dci_tolerance: DEFAULT_NEGATIVE_DCI_TOLERANCE,
            ranking: RankingFilter::default(),
        }
    }
}

impl AnalysisConfig {
    /// Loads and validates a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tier_width == 0 {
            return Err(ConfigError::Invalid("tier_width must be at least 1".into()));
        }
        if !self.gain_band_threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "gain_band_threshold must be a finite number".into(),
            ));
        }
        if self.negative_dci_tolerance.is_nan() || self.negative_dci_tolerance < 0.0 {
            return Err(ConfigError::Invalid(
                "negative_dci_tolerance must be non-negative".into(),
            ));
        }
        Ok(())
    }
}
