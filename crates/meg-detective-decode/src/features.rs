//! Feature assembly for time-resolved decoding.
//!
//! The two per-ROI source tensors are concatenated along the source axis
//! into one feature tensor `[n_trials, n_features, n_times]`, then every
//! (feature, time) pair is z-scored across trials. The labels are the
//! per-epoch condition codes.

use ndarray::{concatenate, Array3, Axis};
use tracing::info;

use meg_detective_core::types::Epochs;

use crate::{DecodeError, DecodeResult};

/// The in-memory decoding input: normalized features plus labels.
///
/// This is the only stage-4 entity that never touches disk.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    /// Feature tensor, shape `[n_trials, n_features, n_times]`, z-scored
    /// per (feature, time) across trials.
    pub x: Array3<f64>,
    /// Per-trial condition codes.
    pub y: Vec<i32>,
    /// Epoch time axis in seconds.
    pub times: Vec<f64>,
}

/// Concatenate the left and right ROI timecourses and z-score across trials.
///
/// `stc_lh` and `stc_rh` are per-trial source tensors
/// (`[n_trials, n_sources, n_times]`) as produced by
/// `apply_lcmv_epochs`; `epochs` supplies the labels and time axis.
pub fn assemble_features(
    stc_lh: &Array3<f64>,
    stc_rh: &Array3<f64>,
    epochs: &Epochs,
) -> DecodeResult<FeatureSet> {
    let (n_lh, s_lh, t_lh) = stc_lh.dim();
    let (n_rh, s_rh, t_rh) = stc_rh.dim();
    if n_lh != n_rh || t_lh != t_rh {
        return Err(DecodeError::ShapeMismatch {
            message: format!(
                "left ROI is [{n_lh}, {s_lh}, {t_lh}], right ROI is [{n_rh}, {s_rh}, {t_rh}]"
            ),
        });
    }
    if n_lh != epochs.n_epochs() || t_lh != epochs.n_times() {
        return Err(DecodeError::ShapeMismatch {
            message: format!(
                "ROI tensors are [{n_lh}, _, {t_lh}] but epochs are [{}, _, {}]",
                epochs.n_epochs(),
                epochs.n_times()
            ),
        });
    }

    let mut x = concatenate(Axis(1), &[stc_lh.view(), stc_rh.view()]).map_err(|e| {
        DecodeError::ShapeMismatch { message: e.to_string() }
    })?;
    zscore_trials(&mut x);

    info!(
        "feature tensor: {} trials x {} features x {} times",
        n_lh,
        s_lh + s_rh,
        t_lh
    );

    Ok(FeatureSet { x, y: epochs.codes(), times: epochs.times() })
}

/// Z-score every (feature, time) pair across the trial axis in place.
///
/// Uses the population standard deviation; features with (numerically) zero
/// variance are set to zero rather than blown up.
pub fn zscore_trials(x: &mut Array3<f64>) {
    let (n_trials, n_features, n_times) = x.dim();
    if n_trials == 0 {
        return;
    }
    let n = n_trials as f64;
    for f in 0..n_features {
        for t in 0..n_times {
            let mut mean = 0.0;
            for e in 0..n_trials {
                mean += x[[e, f, t]];
            }
            mean /= n;
            let mut var = 0.0;
            for e in 0..n_trials {
                let d = x[[e, f, t]] - mean;
                var += d * d;
            }
            var /= n;
            let std = var.sqrt();
            if std < 1e-15 {
                for e in 0..n_trials {
                    x[[e, f, t]] = 0.0;
                }
            } else {
                for e in 0..n_trials {
                    x[[e, f, t]] = (x[[e, f, t]] - mean) / std;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use meg_detective_core::types::{ChannelKind, RecordingInfo};
    use ndarray::Array2;

    fn epochs(n_trials: usize, n_times: usize) -> Epochs {
        let info = RecordingInfo::new(
            100.0,
            vec!["MEG 001".into()],
            vec![ChannelKind::Grad],
        )
        .unwrap();
        let data = Array3::zeros((n_trials, 1, n_times));
        let mut events = Array2::<i64>::zeros((n_trials, 2));
        for e in 0..n_trials {
            events[[e, 0]] = (e as i64 + 1) * 100;
            events[[e, 1]] = if e % 2 == 0 { 3 } else { 4 };
        }
        Epochs::new(info, data, events, -0.2, 100.0).unwrap()
    }

    #[test]
    fn features_concatenate_left_then_right() {
        let stc_lh = Array3::from_elem((4, 2, 10), 1.0);
        let stc_rh = Array3::from_elem((4, 3, 10), 2.0);
        let set = assemble_features(&stc_lh, &stc_rh, &epochs(4, 10)).unwrap();
        assert_eq!(set.x.dim(), (4, 5, 10));
        assert_eq!(set.y, vec![3, 4, 3, 4]);
    }

    #[test]
    fn zscore_gives_zero_mean_unit_std() {
        let mut x = Array3::from_shape_fn((8, 3, 4), |(e, f, t)| {
            (e * 3 + f * 5 + t * 7) as f64 % 11.0
        });
        zscore_trials(&mut x);
        for f in 0..3 {
            for t in 0..4 {
                let column: Vec<f64> = (0..8).map(|e| x[[e, f, t]]).collect();
                let mean: f64 = column.iter().sum::<f64>() / 8.0;
                let var: f64 = column.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / 8.0;
                approx::assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-10);
                approx::assert_abs_diff_eq!(var.sqrt(), 1.0, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn constant_features_become_zero() {
        let mut x = Array3::from_elem((5, 1, 2), 42.0);
        zscore_trials(&mut x);
        assert!(x.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn trial_count_mismatch_is_rejected() {
        let stc_lh = Array3::zeros((4, 2, 10));
        let stc_rh = Array3::zeros((5, 2, 10));
        assert!(assemble_features(&stc_lh, &stc_rh, &epochs(4, 10)).is_err());
    }

    #[test]
    fn epoch_mismatch_is_rejected() {
        let stc_lh = Array3::zeros((4, 2, 10));
        let stc_rh = Array3::zeros((4, 2, 10));
        assert!(assemble_features(&stc_lh, &stc_rh, &epochs(4, 12)).is_err());
    }
}
