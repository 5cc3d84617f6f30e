//! Scientific parameters of the pipeline.
//!
//! [`PipelineConfig`] is the single source of truth for every analysis
//! parameter: filter band, condition codes, epoch window, covariance window,
//! beamformer regularization, ROI extent, and the decoding setup. The stage
//! runners always use [`PipelineConfig::default()`] — the artifact files are
//! the pipeline's only interface and none of these values is exposed on the
//! command line. JSON load/store is provided so a run's parameters can be
//! archived next to its artifacts.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Complete parameter set for one pipeline run.
///
/// All defaults match the analysis this pipeline teaches: auditory evoked
/// fields, band-passed 1–40 Hz, epoched −0.2…+0.5 s around left/right beep
/// onsets, beamformed with a unit-noise-gain LCMV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    // -----------------------------------------------------------------------
    // Stage 1 — sensor level
    // -----------------------------------------------------------------------
    /// Band-pass lower cutoff in Hz. Default: **1.0**.
    pub l_freq: f64,
    /// Band-pass upper cutoff in Hz. Default: **40.0**.
    pub h_freq: f64,
    /// Butterworth filter order. Default: **4**.
    pub filter_order: usize,
    /// Event code of the left auditory condition. Default: **3**.
    pub code_left: i32,
    /// Event code of the right auditory condition. Default: **4**.
    pub code_right: i32,
    /// Epoch window start relative to the event onset, seconds. Default: **−0.2**.
    pub tmin: f64,
    /// Epoch window end relative to the event onset, seconds. Default: **0.5**.
    pub tmax: f64,
    /// Decimation factor applied when epoching. Default: **3**.
    pub decim: usize,
    /// Covariance estimation window start, seconds. Default: **0.04**.
    pub cov_tmin: f64,
    /// Covariance estimation window end, seconds. Default: **0.15**.
    pub cov_tmax: f64,

    // -----------------------------------------------------------------------
    // Stage 2/4 — beamformer
    // -----------------------------------------------------------------------
    /// LCMV regularization as a fraction of mean sensor power. Default: **0.05**.
    pub reg: f64,

    // -----------------------------------------------------------------------
    // Stage 3 — ROI
    // -----------------------------------------------------------------------
    /// ROI search window start, seconds. Default: **0.04**.
    pub roi_tmin: f64,
    /// ROI search window end, seconds. Default: **0.15**.
    pub roi_tmax: f64,
    /// Label growth extent along the surface, meters. Default: **0.02** (20 mm).
    pub roi_extent: f64,

    // -----------------------------------------------------------------------
    // Stage 4 — decoding
    // -----------------------------------------------------------------------
    /// Inverse L2 regularization strength of the logistic regression.
    /// Default: **0.1**.
    pub logreg_c: f64,
    /// Maximum gradient-descent iterations per fit. Default: **300**.
    pub logreg_max_iter: usize,
    /// Gradient-norm convergence tolerance. Default: **1e-6**.
    pub logreg_tol: f64,
    /// Number of cross-validation folds. Default: **5**.
    pub n_folds: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            l_freq: 1.0,
            h_freq: 40.0,
            filter_order: 4,
            code_left: 3,
            code_right: 4,
            tmin: -0.2,
            tmax: 0.5,
            decim: 3,
            cov_tmin: 0.04,
            cov_tmax: 0.15,
            reg: 0.05,
            roi_tmin: 0.04,
            roi_tmax: 0.15,
            roi_extent: 0.02,
            logreg_c: 0.1,
            logreg_max_iter: 300,
            logreg_tol: 1e-6,
            n_folds: 5,
        }
    }
}

impl PipelineConfig {
    /// The two condition codes of interest, left first.
    #[must_use]
    pub fn condition_codes(&self) -> [i32; 2] {
        [self.code_left, self.code_right]
    }

    /// Load a `PipelineConfig` from a JSON file at `path` and validate it.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: PipelineConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize to pretty-printed JSON at `path`, creating parent
    /// directories if necessary.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::FileRead {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Validate all fields, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.l_freq > 0.0) {
            return Err(ConfigError::invalid_value("l_freq", "must be > 0"));
        }
        if self.h_freq <= self.l_freq {
            return Err(ConfigError::invalid_value("h_freq", "must be > l_freq"));
        }
        if self.filter_order == 0 {
            return Err(ConfigError::invalid_value("filter_order", "must be > 0"));
        }
        if self.code_left == self.code_right {
            return Err(ConfigError::invalid_value(
                "code_right",
                "conditions must use distinct codes",
            ));
        }
        if self.tmax <= self.tmin {
            return Err(ConfigError::invalid_value("tmax", "must be > tmin"));
        }
        if self.decim == 0 {
            return Err(ConfigError::invalid_value("decim", "must be >= 1"));
        }
        if self.cov_tmax <= self.cov_tmin {
            return Err(ConfigError::invalid_value("cov_tmax", "must be > cov_tmin"));
        }
        if self.cov_tmin < self.tmin || self.cov_tmax > self.tmax {
            return Err(ConfigError::invalid_value(
                "cov_tmin/cov_tmax",
                "covariance window must lie inside the epoch window",
            ));
        }
        if !(self.reg >= 0.0) {
            return Err(ConfigError::invalid_value("reg", "must be >= 0"));
        }
        if self.roi_tmax <= self.roi_tmin {
            return Err(ConfigError::invalid_value("roi_tmax", "must be > roi_tmin"));
        }
        if !(self.roi_extent > 0.0) {
            return Err(ConfigError::invalid_value("roi_extent", "must be > 0"));
        }
        if !(self.logreg_c > 0.0) {
            return Err(ConfigError::invalid_value("logreg_c", "must be > 0"));
        }
        if self.logreg_max_iter == 0 {
            return Err(ConfigError::invalid_value("logreg_max_iter", "must be > 0"));
        }
        if !(self.logreg_tol > 0.0) {
            return Err(ConfigError::invalid_value("logreg_tol", "must be > 0"));
        }
        if self.n_folds < 2 {
            return Err(ConfigError::invalid_value("n_folds", "must be >= 2"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_valid() {
        PipelineConfig::default().validate().expect("default config should be valid");
    }

    #[test]
    fn json_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.json");

        let original = PipelineConfig::default();
        original.to_json(&path).expect("serialization should succeed");

        let loaded = PipelineConfig::from_json(&path).expect("deserialization should succeed");
        assert_eq!(loaded.decim, original.decim);
        assert_eq!(loaded.n_folds, original.n_folds);
        assert!((loaded.reg - original.reg).abs() < 1e-12);
    }

    #[test]
    fn inverted_band_is_invalid() {
        let mut cfg = PipelineConfig::default();
        cfg.h_freq = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn covariance_window_must_fit_epoch() {
        let mut cfg = PipelineConfig::default();
        cfg.cov_tmax = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn identical_condition_codes_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.code_right = cfg.code_left;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn expected_defaults() {
        let cfg = PipelineConfig::default();
        assert!((cfg.l_freq - 1.0).abs() < 1e-12);
        assert!((cfg.h_freq - 40.0).abs() < 1e-12);
        assert_eq!(cfg.condition_codes(), [3, 4]);
        assert!((cfg.tmin + 0.2).abs() < 1e-12);
        assert!((cfg.tmax - 0.5).abs() < 1e-12);
        assert_eq!(cfg.decim, 3);
        assert!((cfg.cov_tmin - 0.04).abs() < 1e-12);
        assert!((cfg.cov_tmax - 0.15).abs() < 1e-12);
        assert!((cfg.reg - 0.05).abs() < 1e-12);
        assert!((cfg.roi_extent - 0.02).abs() < 1e-12);
        assert!((cfg.logreg_c - 0.1).abs() < 1e-12);
        assert_eq!(cfg.n_folds, 5);
    }
}
