//! Configuration management for calibration parameters
//!
//! This module provides runtime configuration loading from JSON files so the
//! streaming batch size, FPR target and clustering strategy can be tuned
//! without recompilation. Every default reproduces the reference calibration
//! procedure exactly.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const BUNDLED_CONFIG: &str = "assets/calibration_config.json";

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Partition file streaming parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Rows per streamed batch (memory bound only, never affects results)
    pub batch_size: usize,
    /// Explicit header name of the well identifier column
    ///
    /// `None` selects a column named `Well`, falling back to the first column.
    pub well_column: Option<String>,
    /// Header name of the RFU column (exact match)
    pub rfu_column: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            well_column: None,
            rfu_column: "RFU".to_string(),
        }
    }
}

/// Threshold calibration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Multiplier on the positive-control standard deviation
    pub std_multiplier: f64,
    /// Maximum tolerated negative-control false-positive rate
    pub fpr_limit: f64,
    /// Increment applied by the FPR guard per step
    pub step: f64,
    /// Upper bound on FPR guard steps before failing
    pub max_refinement_steps: u64,
    /// Two-means clustering of the mixed-positive control
    pub kmeans: KMeansConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            std_multiplier: 2.0,
            fpr_limit: 0.0001,
            step: 0.01,
            max_refinement_steps: 10_000_000,
            kmeans: KMeansConfig::default(),
        }
    }
}

/// Center initialization strategy for two-means clustering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KMeansInit {
    /// Start from the minimum and maximum reading
    Extremes,
    /// k-means++ seeding from a fixed RNG seed, best of `restarts`
    Seeded,
}

/// Two-means clustering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    pub init: KMeansInit,
    /// RNG seed for `Seeded` initialization
    pub seed: u64,
    /// Independent seeded runs; lowest inertia wins
    pub restarts: usize,
    /// Lloyd iterations per run
    pub max_iterations: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            init: KMeansInit::Extremes,
            seed: 0,
            restarts: 10,
            max_iterations: 300,
        }
    }
}

/// Calibration job manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Capacity of the job event broadcast channel
    pub progress_buffer: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            progress_buffer: 64,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration. If the file doesn't exist or the JSON is
    /// invalid, a warning is logged and the default config is returned.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the bundled assets directory
    ///
    /// The path is anchored at the crate root so the result does not depend
    /// on the working directory.
    pub fn load() -> Self {
        Self::load_from_file(Self::bundled_path())
    }

    /// Location of the bundled `calibration_config.json`
    pub fn bundled_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join(BUNDLED_CONFIG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.extraction.batch_size, 10_000);
        assert_eq!(config.extraction.rfu_column, "RFU");
        assert_eq!(config.calibration.std_multiplier, 2.0);
        assert_eq!(config.calibration.fpr_limit, 0.0001);
        assert_eq!(config.calibration.step, 0.01);
        assert_eq!(config.calibration.kmeans.init, KMeansInit::Extremes);
        assert_eq!(config.jobs.progress_buffer, 64);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.extraction.batch_size, config.extraction.batch_size);
        assert_eq!(
            parsed.calibration.max_refinement_steps,
            config.calibration.max_refinement_steps
        );
    }

    #[test]
    fn test_partial_json_uses_section_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"calibration": {"kmeans": {"init": "seeded", "seed": 7}}}"#)
                .unwrap();
        assert_eq!(parsed.calibration.kmeans.init, KMeansInit::Seeded);
        assert_eq!(parsed.calibration.kmeans.seed, 7);
        assert_eq!(parsed.calibration.kmeans.restarts, 10);
        assert_eq!(parsed.calibration.step, 0.01);
        assert_eq!(parsed.extraction.batch_size, 10_000);
    }

    #[test]
    fn test_bundled_config_matches_defaults() {
        assert!(AppConfig::bundled_path().is_file());
        let bundled = AppConfig::load();
        let defaults = AppConfig::default();
        assert_eq!(
            serde_json::to_value(&bundled).unwrap(),
            serde_json::to_value(&defaults).unwrap()
        );
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/calibration_config.json");
        assert_eq!(config.extraction.batch_size, 10_000);
    }
}
