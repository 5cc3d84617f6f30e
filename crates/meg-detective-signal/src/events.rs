//! Stimulus-event detection.
//!
//! The stimulus channel holds 0 between trials and the event code during a
//! trigger pulse. An event is the first sample of a 0 → nonzero transition;
//! the pulse length does not matter. A change between two nonzero values is
//! not treated as a new onset.

use ndarray::Array2;
use tracing::info;

use meg_detective_core::types::{EventList, Raw};

use crate::{SignalError, SignalResult};

/// Find stimulus events in a recording.
///
/// # Errors
///
/// Returns [`SignalError::NoStimChannel`] when the recording carries no
/// stimulus channel.
pub fn find_events(raw: &Raw) -> SignalResult<EventList> {
    let stim = raw.info.stim_pick().ok_or(SignalError::NoStimChannel)?;
    let row = raw.data.row(stim);

    let mut rows: Vec<[i64; 2]> = Vec::new();
    let mut prev: i64 = 0;
    for (sample, &value) in row.iter().enumerate() {
        let code = value.round() as i64;
        if prev == 0 && code != 0 {
            rows.push([sample as i64, code]);
        }
        prev = code;
    }

    info!("found {} events on channel {}", rows.len(), raw.info.ch_names[stim]);

    let mut events = Array2::<i64>::zeros((rows.len(), 2));
    for (i, r) in rows.iter().enumerate() {
        events[[i, 0]] = r[0];
        events[[i, 1]] = r[1];
    }
    Ok(EventList::new(events)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use meg_detective_core::types::{ChannelKind, RecordingInfo};

    fn raw_with_stim(stim: Vec<f64>) -> Raw {
        let n = stim.len();
        let info = RecordingInfo::new(
            300.0,
            vec!["MEG 001".into(), "STI 001".into()],
            vec![ChannelKind::Grad, ChannelKind::Stim],
        )
        .unwrap();
        let mut data = Array2::<f64>::zeros((2, n));
        for (t, v) in stim.into_iter().enumerate() {
            data[[1, t]] = v;
        }
        Raw::new(info, data).unwrap()
    }

    #[test]
    fn rising_edges_are_detected() {
        let mut stim = vec![0.0; 100];
        stim[10] = 3.0;
        stim[11] = 3.0;
        stim[50] = 4.0;
        let events = find_events(&raw_with_stim(stim)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events.events[[0, 0]], 10);
        assert_eq!(events.events[[0, 1]], 3);
        assert_eq!(events.events[[1, 0]], 50);
        assert_eq!(events.events[[1, 1]], 4);
    }

    #[test]
    fn long_pulse_yields_one_event() {
        let mut stim = vec![0.0; 100];
        for t in 20..40 {
            stim[t] = 3.0;
        }
        let events = find_events(&raw_with_stim(stim)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events.events[[0, 0]], 20);
    }

    #[test]
    fn nonzero_to_nonzero_change_is_not_an_onset() {
        let mut stim = vec![0.0; 100];
        for t in 20..30 {
            stim[t] = 3.0;
        }
        for t in 30..40 {
            stim[t] = 4.0;
        }
        let events = find_events(&raw_with_stim(stim)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events.events[[0, 1]], 3);
    }

    #[test]
    fn missing_stim_channel_is_an_error() {
        let info = RecordingInfo::new(
            300.0,
            vec!["MEG 001".into()],
            vec![ChannelKind::Grad],
        )
        .unwrap();
        let raw = Raw::new(info, Array2::zeros((1, 10))).unwrap();
        assert!(matches!(find_events(&raw), Err(SignalError::NoStimChannel)));
    }

    #[test]
    fn empty_stim_channel_yields_no_events() {
        let events = find_events(&raw_with_stim(vec![0.0; 100])).unwrap();
        assert!(events.is_empty());
    }
}
