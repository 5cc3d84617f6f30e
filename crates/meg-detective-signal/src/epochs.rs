//! Stimulus-locked epoching with decimation.
//!
//! Cuts a fixed window around every event of the requested condition codes,
//! keeps every `decim`-th sample, and baseline-corrects each epoch against
//! its pre-stimulus interval. Events whose window would reach outside the
//! recording are dropped with a warning rather than aborting the stage —
//! a truncated edge trial carries no usable data.

use ndarray::{Array2, Array3};
use tracing::{info, warn};

use meg_detective_core::types::{Epochs, EventList, Raw};

use crate::{SignalError, SignalResult};

/// Cut epochs around `events` with the given condition `codes`.
///
/// The window spans `tmin..=tmax` seconds relative to each event onset at
/// the raw sampling rate, then decimation keeps every `decim`-th sample.
/// Data channels are baseline-corrected by subtracting the per-channel mean
/// over the pre-stimulus samples (`t <= 0`).
///
/// # Errors
///
/// Returns [`SignalError::NoMatchingEvents`] when no event has one of the
/// requested codes or every matching event falls too close to the recording
/// edge.
pub fn epoch_around_events(
    raw: &Raw,
    events: &EventList,
    codes: &[i32],
    tmin: f64,
    tmax: f64,
    decim: usize,
) -> SignalResult<Epochs> {
    let sfreq = raw.info.sfreq;
    let offset = (tmin * sfreq).round() as i64;
    let n_full = ((tmax - tmin) * sfreq).round() as usize + 1;
    let n_times = (n_full + decim - 1) / decim;
    let n_channels = raw.info.n_channels();
    let n_samples = raw.n_samples() as i64;

    let selected = events.filter_codes(codes);
    if selected.is_empty() {
        return Err(SignalError::NoMatchingEvents { codes: codes.to_vec() });
    }

    // Keep only events whose full window fits into the recording.
    let mut kept_rows: Vec<usize> = Vec::with_capacity(selected.len());
    for row in 0..selected.len() {
        let start = selected.events[[row, 0]] + offset;
        if start < 0 || start + n_full as i64 > n_samples {
            warn!(
                "dropping event at sample {} (window outside recording)",
                selected.events[[row, 0]]
            );
            continue;
        }
        kept_rows.push(row);
    }
    if kept_rows.is_empty() {
        return Err(SignalError::NoMatchingEvents { codes: codes.to_vec() });
    }

    let sfreq_dec = sfreq / decim as f64;
    let tmin_exact = offset as f64 / sfreq;
    let mut data = Array3::<f64>::zeros((kept_rows.len(), n_channels, n_times));
    let mut kept_events = Array2::<i64>::zeros((kept_rows.len(), 2));

    for (e, &row) in kept_rows.iter().enumerate() {
        let start = (selected.events[[row, 0]] + offset) as usize;
        kept_events[[e, 0]] = selected.events[[row, 0]];
        kept_events[[e, 1]] = selected.events[[row, 1]];
        for ch in 0..n_channels {
            for k in 0..n_times {
                data[[e, ch, k]] = raw.data[[ch, start + k * decim]];
            }
        }
    }

    // Baseline correction over the pre-stimulus interval, data channels only.
    let eps = 1.0 / (2.0 * sfreq_dec);
    let baseline: Vec<usize> = (0..n_times)
        .filter(|&k| tmin_exact + k as f64 / sfreq_dec <= eps)
        .collect();
    if !baseline.is_empty() {
        for ch in raw.info.data_picks() {
            for e in 0..kept_rows.len() {
                let mean: f64 =
                    baseline.iter().map(|&k| data[[e, ch, k]]).sum::<f64>() / baseline.len() as f64;
                for k in 0..n_times {
                    data[[e, ch, k]] -= mean;
                }
            }
        }
    }

    info!(
        "epoched {} of {} matching events ({} samples at {} Hz)",
        kept_rows.len(),
        selected.len(),
        n_times,
        sfreq_dec
    );

    Ok(Epochs::new(raw.info.clone(), data, kept_events, tmin_exact, sfreq_dec)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use meg_detective_core::types::{ChannelKind, RecordingInfo};
    use ndarray::array;

    const FS: f64 = 300.0;

    fn ramp_raw(n: usize) -> Raw {
        let info = RecordingInfo::new(
            FS,
            vec!["MEG 001".into(), "STI 001".into()],
            vec![ChannelKind::Grad, ChannelKind::Stim],
        )
        .unwrap();
        let mut data = Array2::<f64>::zeros((2, n));
        for t in 0..n {
            data[[0, t]] = t as f64;
        }
        Raw::new(info, data).unwrap()
    }

    #[test]
    fn epoch_window_and_decimation() {
        let raw = ramp_raw(900);
        let events = EventList::new(array![[300, 3], [600, 4]]).unwrap();
        let epochs = epoch_around_events(&raw, &events, &[3, 4], -0.2, 0.5, 3).unwrap();

        assert_eq!(epochs.n_epochs(), 2);
        // 0.7 s at 300 Hz = 211 samples, decimated by 3 -> 71
        assert_eq!(epochs.n_times(), 71);
        assert!((epochs.sfreq - 100.0).abs() < 1e-12);

        let times = epochs.times();
        assert!((times[0] + 0.2).abs() < 1e-9);
        assert!((times[times.len() - 1] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn only_requested_codes_are_epoched() {
        let raw = ramp_raw(900);
        let events = EventList::new(array![[300, 1], [450, 3], [600, 4]]).unwrap();
        let epochs = epoch_around_events(&raw, &events, &[3, 4], -0.2, 0.5, 3).unwrap();
        assert_eq!(epochs.codes(), vec![3, 4]);
    }

    #[test]
    fn edge_events_are_dropped() {
        let raw = ramp_raw(900);
        // first event too early, last event too late
        let events = EventList::new(array![[10, 3], [450, 4], [880, 3]]).unwrap();
        let epochs = epoch_around_events(&raw, &events, &[3, 4], -0.2, 0.5, 3).unwrap();
        assert_eq!(epochs.n_epochs(), 1);
        assert_eq!(epochs.events[[0, 0]], 450);
    }

    #[test]
    fn no_matching_codes_is_an_error() {
        let raw = ramp_raw(900);
        let events = EventList::new(array![[300, 1]]).unwrap();
        let err = epoch_around_events(&raw, &events, &[3, 4], -0.2, 0.5, 3);
        assert!(matches!(err, Err(SignalError::NoMatchingEvents { .. })));
    }

    #[test]
    fn baseline_zeroes_prestimulus_mean() {
        let raw = ramp_raw(900);
        let events = EventList::new(array![[450, 3]]).unwrap();
        let epochs = epoch_around_events(&raw, &events, &[3], -0.2, 0.5, 3).unwrap();

        let times = epochs.times();
        let pre: Vec<f64> = times
            .iter()
            .enumerate()
            .filter(|(_, &t)| t <= 1e-9)
            .map(|(k, _)| epochs.data[[0, 0, k]])
            .collect();
        let mean: f64 = pre.iter().sum::<f64>() / pre.len() as f64;
        approx::assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn stim_channel_keeps_raw_values() {
        let mut raw = ramp_raw(900);
        raw.data[[1, 450]] = 3.0;
        let events = EventList::new(array![[450, 3]]).unwrap();
        let epochs = epoch_around_events(&raw, &events, &[3], -0.2, 0.5, 3).unwrap();

        // t = 0 sample carries the stim code, un-baselined
        let k0 = epochs.times().iter().position(|&t| t.abs() < 1e-9).unwrap();
        assert_eq!(epochs.data[[0, 1, k0]], 3.0);
    }
}
