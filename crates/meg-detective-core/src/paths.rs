//! Fixed artifact locations under the pipeline's data directory.
//!
//! The filesystem is the pipeline's only interface: each stage reads the
//! artifacts its predecessor wrote at these paths and writes its own. There
//! is no path configuration beyond choosing the base directory (the CLI
//! always uses `data/`; tests point this at a scratch directory).

use std::path::{Path, PathBuf};

/// The canonical artifact paths of one pipeline run.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    /// Base data directory.
    pub base: PathBuf,
    /// Raw recording (dataset provider output).
    pub raw: PathBuf,
    /// Forward model (dataset provider output).
    pub forward: PathBuf,
    /// Event list (stage 1).
    pub events: PathBuf,
    /// Epochs (stage 1).
    pub epochs: PathBuf,
    /// Evoked pair (stage 1).
    pub evoked: PathBuf,
    /// Data covariance (stage 1).
    pub covariance: PathBuf,
    /// Source estimate (stage 2).
    pub stc: PathBuf,
    /// Left-hemisphere ROI label (stage 3).
    pub roi_lh: PathBuf,
    /// Right-hemisphere ROI label (stage 3).
    pub roi_rh: PathBuf,
    /// Decoding performance figure (stage 4).
    pub results: PathBuf,
}

impl ArtifactPaths {
    /// Build the artifact paths rooted at `base`.
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref().to_path_buf();
        ArtifactPaths {
            raw: base.join("sample-raw.npz"),
            forward: base.join("sample-fwd.npz"),
            events: base.join("detective-eve.npz"),
            epochs: base.join("detective-epo.npz"),
            evoked: base.join("detective-ave.npz"),
            covariance: base.join("detective-cov.npz"),
            stc: base.join("detective-stc.npz"),
            roi_lh: base.join("roi-lh.npz"),
            roi_rh: base.join("roi-rh.npz"),
            results: base.join("results.svg"),
            base,
        }
    }
}
