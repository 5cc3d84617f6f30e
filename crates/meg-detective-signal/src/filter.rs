//! Zero-phase Butterworth band-pass filtering.
//!
//! The filter is designed as second-order sections and applied
//! forward-backward (`sosfiltfilt`), so the passband signal keeps its
//! latency — essential when later stages interpret epoch timing. Only data
//! channels are filtered; stimulus channels pass through untouched so event
//! codes stay intact.

use ndarray::Array2;
use rayon::prelude::*;
use sci_rs::signal::filter::{design::*, sosfiltfilt_dyn};
use tracing::info;

use meg_detective_core::types::Raw;

use crate::{SignalError, SignalResult};

/// Design a Butterworth band-pass filter as second-order sections.
///
/// `order` is the analog prototype order; the band edges are in Hz and must
/// satisfy `0 < low < high < fs / 2`.
pub fn design_band_pass(
    order: usize,
    low: f64,
    high: f64,
    fs: f64,
) -> SignalResult<Vec<Sos<f64>>> {
    if !(low > 0.0) || high <= low || high >= fs / 2.0 {
        return Err(SignalError::FilterDesign {
            message: format!("band edges ({low}, {high}) Hz invalid for fs = {fs} Hz"),
        });
    }
    let filter = butter_dyn(
        order,
        vec![low, high],
        Some(FilterBandType::Bandpass),
        Some(false),
        Some(FilterOutputType::Sos),
        Some(fs),
    );
    let DigitalFilter::Sos(SosFormatFilter { sos }) = filter else {
        return Err(SignalError::FilterDesign {
            message: "designer did not return second-order sections".to_string(),
        });
    };
    Ok(sos)
}

/// Band-pass filter a recording between `low` and `high` Hz.
///
/// Returns a new [`Raw`] with every data channel filtered forward-backward;
/// stimulus channels are copied through unchanged.
pub fn band_pass(raw: &Raw, low: f64, high: f64, order: usize) -> SignalResult<Raw> {
    let sos = design_band_pass(order, low, high, raw.info.sfreq)?;
    let picks = raw.info.data_picks();

    info!(
        "band-pass {low}-{high} Hz (order {order}) on {} of {} channels",
        picks.len(),
        raw.info.n_channels()
    );

    let filtered: Vec<(usize, Vec<f64>)> = picks
        .par_iter()
        .map(|&ch| {
            let out = sosfiltfilt_dyn(raw.data.row(ch).iter().copied(), &sos);
            (ch, out)
        })
        .collect();

    let mut data: Array2<f64> = raw.data.clone();
    for (ch, row) in filtered {
        for (t, v) in row.into_iter().enumerate() {
            data[[ch, t]] = v;
        }
    }

    Ok(Raw { info: raw.info.clone(), data })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use meg_detective_core::types::{ChannelKind, RecordingInfo};
    use ndarray::Array2;
    use std::f64::consts::PI;

    const FS: f64 = 300.0;
    const N: usize = 1800; // 6 s

    fn raw_with_rows(rows: Vec<Vec<f64>>, kinds: Vec<ChannelKind>) -> Raw {
        let names = (0..rows.len()).map(|i| format!("CH {i}")).collect();
        let info = RecordingInfo::new(FS, names, kinds).unwrap();
        let n = rows[0].len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let data = Array2::from_shape_vec((info.n_channels(), n), flat).unwrap();
        Raw::new(info, data).unwrap()
    }

    fn sine(freq: f64) -> Vec<f64> {
        (0..N).map(|t| (2.0 * PI * freq * t as f64 / FS).sin()).collect()
    }

    /// RMS over the middle half of the signal, away from edge transients.
    fn mid_rms(x: &[f64]) -> f64 {
        let a = x.len() / 4;
        let b = 3 * x.len() / 4;
        let ss: f64 = x[a..b].iter().map(|v| v * v).sum();
        (ss / (b - a) as f64).sqrt()
    }

    #[test]
    fn passband_sine_survives() {
        let raw = raw_with_rows(vec![sine(10.0)], vec![ChannelKind::Grad]);
        let out = band_pass(&raw, 1.0, 40.0, 4).unwrap();
        let filtered: Vec<f64> = out.data.row(0).to_vec();
        let ratio = mid_rms(&filtered) / mid_rms(&sine(10.0));
        assert!((0.8..1.1).contains(&ratio), "passband ratio {ratio}");
    }

    #[test]
    fn stopband_sine_is_attenuated() {
        let raw = raw_with_rows(vec![sine(90.0)], vec![ChannelKind::Grad]);
        let out = band_pass(&raw, 1.0, 40.0, 4).unwrap();
        let filtered: Vec<f64> = out.data.row(0).to_vec();
        let ratio = mid_rms(&filtered) / mid_rms(&sine(90.0));
        assert!(ratio < 0.1, "stopband ratio {ratio}");
    }

    #[test]
    fn dc_offset_is_removed() {
        let raw = raw_with_rows(vec![vec![5.0; N]], vec![ChannelKind::Grad]);
        let out = band_pass(&raw, 1.0, 40.0, 4).unwrap();
        let filtered: Vec<f64> = out.data.row(0).to_vec();
        assert!(mid_rms(&filtered) < 0.5, "residual DC {}", mid_rms(&filtered));
    }

    #[test]
    fn stim_channel_is_untouched() {
        let mut stim = vec![0.0; N];
        stim[600] = 3.0;
        let raw = raw_with_rows(
            vec![sine(10.0), stim.clone()],
            vec![ChannelKind::Grad, ChannelKind::Stim],
        );
        let out = band_pass(&raw, 1.0, 40.0, 4).unwrap();
        assert_eq!(out.data.row(1).to_vec(), stim);
    }

    #[test]
    fn invalid_band_rejected() {
        let raw = raw_with_rows(vec![sine(10.0)], vec![ChannelKind::Grad]);
        assert!(band_pass(&raw, 40.0, 1.0, 4).is_err());
        assert!(band_pass(&raw, 1.0, 200.0, 4).is_err());
    }
}
