//! Windowed covariance estimation with Ledoit–Wolf shrinkage.
//!
//! The data covariance feeds the beamformer, which inverts it — so the
//! estimate must be well-conditioned even when the window contributes fewer
//! samples than there are channels. The closed-form Ledoit–Wolf coefficient
//! shrinks the empirical matrix toward a scaled identity by exactly as much
//! as the sample support warrants.

use ndarray::Array2;
use tracing::info;

use meg_detective_core::types::{ChannelKind, Covariance, Epochs};

use crate::{SignalError, SignalResult};

/// Estimate the sensor covariance from epoch samples in `tmin..=tmax`
/// seconds (inclusive within half a sample period).
///
/// Only data channels contribute. Samples from all epochs are pooled, the
/// per-channel mean over the pooled window is removed, and the empirical
/// covariance is shrunk with the Ledoit–Wolf coefficient.
///
/// # Errors
///
/// Returns [`SignalError::EmptyWindow`] when the window selects no samples.
pub fn compute_covariance(epochs: &Epochs, tmin: f64, tmax: f64) -> SignalResult<Covariance> {
    let picked = epochs.pick_by_kind(&[ChannelKind::Grad, ChannelKind::Mag, ChannelKind::Eeg])?;
    let p = picked.info.n_channels();

    let eps = 1.0 / (2.0 * picked.sfreq);
    let window: Vec<usize> = picked
        .times()
        .iter()
        .enumerate()
        .filter(|(_, &t)| t >= tmin - eps && t <= tmax + eps)
        .map(|(k, _)| k)
        .collect();
    if window.is_empty() {
        return Err(SignalError::EmptyWindow { tmin, tmax });
    }

    // Pool the window samples of every epoch into one observation matrix.
    let n_obs = picked.n_epochs() * window.len();
    let mut x = Array2::<f64>::zeros((n_obs, p));
    let mut row = 0;
    for e in 0..picked.n_epochs() {
        for &k in &window {
            for ch in 0..p {
                x[[row, ch]] = picked.data[[e, ch, k]];
            }
            row += 1;
        }
    }

    // Remove the per-channel mean.
    for ch in 0..p {
        let mean: f64 = x.column(ch).sum() / n_obs as f64;
        x.column_mut(ch).mapv_inplace(|v| v - mean);
    }

    let (sigma, shrinkage) = ledoit_wolf(&x);
    info!(
        "covariance from {} samples ({} per epoch), shrinkage {:.4}",
        n_obs,
        window.len(),
        shrinkage
    );

    Ok(Covariance::new(picked.info.ch_names.clone(), sigma, n_obs)?)
}

/// Ledoit–Wolf shrinkage of the empirical covariance of `x`
/// (`[n_observations, p]`, already demeaned).
///
/// Returns the shrunk matrix `ρ·μ·I + (1−ρ)·S` and the coefficient
/// `ρ ∈ [0, 1]`, where `S` is the empirical covariance and `μ` its mean
/// diagonal power.
#[must_use]
pub fn ledoit_wolf(x: &Array2<f64>) -> (Array2<f64>, f64) {
    let n = x.nrows() as f64;
    let p = x.ncols();
    let pf = p as f64;

    let s = x.t().dot(x) / n;
    let mu = s.diag().sum() / pf;

    // Squared Frobenius distances of the LW formula.
    let s_frob2: f64 = s.iter().map(|v| v * v).sum();
    let d2 = (s_frob2 - pf * mu * mu) / pf;

    // beta-bar² = (Σ_i ‖x_i x_iᵀ − S‖² ) / (n² p)
    //           = (Σ_i (x_iᵀ x_i)² − n‖S‖²) / (n² p)
    let quad: f64 = x
        .rows()
        .into_iter()
        .map(|r| {
            let ss: f64 = r.iter().map(|v| v * v).sum();
            ss * ss
        })
        .sum();
    let beta_bar2 = ((quad - n * s_frob2) / (n * n * pf)).max(0.0);

    let shrinkage = if d2 > 0.0 { (beta_bar2 / d2).min(1.0) } else { 0.0 };

    let mut sigma = s * (1.0 - shrinkage);
    for i in 0..p {
        sigma[[i, i]] += shrinkage * mu;
    }
    (sigma, shrinkage)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use meg_detective_core::types::RecordingInfo;
    use ndarray::Array3;

    fn epochs_from_fn(
        n_epochs: usize,
        n_ch: usize,
        n_times: usize,
        f: impl Fn(usize, usize, usize) -> f64,
    ) -> Epochs {
        let names = (0..n_ch).map(|i| format!("MEG {i:03}")).collect();
        let kinds = vec![ChannelKind::Grad; n_ch];
        let info = RecordingInfo::new(100.0, names, kinds).unwrap();
        let data = Array3::from_shape_fn((n_epochs, n_ch, n_times), |(e, c, t)| f(e, c, t));
        let mut events = Array2::<i64>::zeros((n_epochs, 2));
        for e in 0..n_epochs {
            events[[e, 0]] = (e as i64 + 1) * 100;
            events[[e, 1]] = 3;
        }
        Epochs::new(info, data, events, -0.2, 100.0).unwrap()
    }

    #[test]
    fn covariance_is_symmetric_with_positive_diagonal() {
        let epochs = epochs_from_fn(6, 4, 71, |e, c, t| {
            ((e * 31 + c * 17 + t * 7) % 13) as f64 - 6.0
        });
        let cov = compute_covariance(&epochs, 0.04, 0.15).unwrap();
        assert_eq!(cov.dim(), 4);
        for i in 0..4 {
            assert!(cov.data[[i, i]] > 0.0);
            for j in 0..4 {
                approx::assert_abs_diff_eq!(cov.data[[i, j]], cov.data[[j, i]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn sample_count_matches_window() {
        let epochs = epochs_from_fn(6, 4, 71, |e, c, t| (e + c + t) as f64);
        let cov = compute_covariance(&epochs, 0.04, 0.15).unwrap();
        // times run -0.2..0.5 at 100 Hz; [0.04, 0.15] selects 12 samples
        assert_eq!(cov.n_samples, 6 * 12);
    }

    #[test]
    fn empty_window_is_an_error() {
        let epochs = epochs_from_fn(2, 3, 71, |_, _, _| 0.0);
        let err = compute_covariance(&epochs, 5.0, 6.0);
        assert!(matches!(err, Err(SignalError::EmptyWindow { .. })));
    }

    #[test]
    fn ledoit_wolf_shrinkage_is_bounded() {
        let x = Array2::from_shape_fn((50, 6), |(i, j)| {
            ((i * 7 + j * 13) % 11) as f64 - 5.0
        });
        let mut x = x;
        for j in 0..6 {
            let m = x.column(j).sum() / 50.0;
            x.column_mut(j).mapv_inplace(|v| v - m);
        }
        let (sigma, rho) = ledoit_wolf(&x);
        assert!((0.0..=1.0).contains(&rho), "shrinkage {rho}");
        assert_eq!(sigma.dim(), (6, 6));
    }

    #[test]
    fn ledoit_wolf_keeps_strong_correlations() {
        // Two perfectly correlated channels: the shrunk off-diagonal must
        // stay clearly positive.
        let x = Array2::from_shape_fn((200, 2), |(i, _)| {
            if i % 2 == 0 { 1.0 } else { -1.0 }
        });
        let (sigma, _) = ledoit_wolf(&x);
        assert!(sigma[[0, 1]] > 0.5);
    }

    #[test]
    fn stim_channel_is_excluded() {
        let names = vec!["MEG 001".to_string(), "STI 001".to_string()];
        let kinds = vec![ChannelKind::Grad, ChannelKind::Stim];
        let info = RecordingInfo::new(100.0, names, kinds).unwrap();
        let data = Array3::from_shape_fn((3, 2, 71), |(e, c, t)| (e + c + t) as f64);
        let mut events = Array2::<i64>::zeros((3, 2));
        for e in 0..3 {
            events[[e, 0]] = (e as i64 + 1) * 100;
            events[[e, 1]] = 3;
        }
        let epochs = Epochs::new(info, data, events, -0.2, 100.0).unwrap();

        let cov = compute_covariance(&epochs, 0.04, 0.15).unwrap();
        assert_eq!(cov.names, vec!["MEG 001".to_string()]);
        assert_eq!(cov.dim(), 1);
    }
}
