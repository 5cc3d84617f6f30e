//! Entities exchanged between pipeline stages.
//!
//! Every type here maps one-to-one onto an on-disk artifact (see
//! [`crate::io`]) except [`RecordingInfo`], which travels embedded in the
//! artifacts that need it. Constructors validate the invariants the rest of
//! the pipeline relies on, so a loaded artifact is usable without further
//! checks.
//!
//! Array layouts follow the recording convention throughout:
//! channels × samples for continuous data, epochs × channels × samples for
//! segmented data, sources × samples in source space (left hemisphere block
//! first).

use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// The kind of signal a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Planar gradiometer (MEG).
    Grad,
    /// Magnetometer (MEG).
    Mag,
    /// EEG electrode.
    Eeg,
    /// Stimulus / trigger channel.
    Stim,
}

impl ChannelKind {
    /// Returns `true` for channels that carry neural data (everything except
    /// stimulus channels). Filters and covariance estimation only ever touch
    /// data channels.
    #[must_use]
    pub fn is_data(self) -> bool {
        !matches!(self, ChannelKind::Stim)
    }
}

/// Sampling rate plus per-channel names and kinds of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingInfo {
    /// Sampling rate in Hz.
    pub sfreq: f64,
    /// Channel names, unique within the recording.
    pub ch_names: Vec<String>,
    /// Channel kinds, parallel to `ch_names`.
    pub ch_kinds: Vec<ChannelKind>,
}

impl RecordingInfo {
    /// Create a new `RecordingInfo`, validating uniqueness of names and the
    /// sampling rate.
    pub fn new(
        sfreq: f64,
        ch_names: Vec<String>,
        ch_kinds: Vec<ChannelKind>,
    ) -> Result<Self, DataError> {
        if !(sfreq > 0.0) {
            return Err(DataError::InvalidSamplingRate { sfreq });
        }
        if ch_names.len() != ch_kinds.len() {
            return Err(DataError::shape_mismatch(
                "channel names vs kinds",
                vec![ch_names.len()],
                vec![ch_kinds.len()],
            ));
        }
        for (i, name) in ch_names.iter().enumerate() {
            if ch_names[..i].contains(name) {
                return Err(DataError::DuplicateChannel { name: name.clone() });
            }
        }
        Ok(RecordingInfo { sfreq, ch_names, ch_kinds })
    }

    /// Number of channels.
    #[must_use]
    pub fn n_channels(&self) -> usize {
        self.ch_names.len()
    }

    /// Indices of channels whose kind is in `kinds`, in recording order.
    #[must_use]
    pub fn picks_by_kind(&self, kinds: &[ChannelKind]) -> Vec<usize> {
        self.ch_kinds
            .iter()
            .enumerate()
            .filter(|(_, k)| kinds.contains(k))
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of all data (non-stimulus) channels.
    #[must_use]
    pub fn data_picks(&self) -> Vec<usize> {
        self.ch_kinds
            .iter()
            .enumerate()
            .filter(|(_, k)| k.is_data())
            .map(|(i, _)| i)
            .collect()
    }

    /// Index of the first stimulus channel, if any.
    #[must_use]
    pub fn stim_pick(&self) -> Option<usize> {
        self.ch_kinds.iter().position(|k| *k == ChannelKind::Stim)
    }

    /// A new `RecordingInfo` restricted to `picks` (in the given order).
    #[must_use]
    pub fn pick(&self, picks: &[usize]) -> RecordingInfo {
        RecordingInfo {
            sfreq: self.sfreq,
            ch_names: picks.iter().map(|&i| self.ch_names[i].clone()).collect(),
            ch_kinds: picks.iter().map(|&i| self.ch_kinds[i]).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw
// ---------------------------------------------------------------------------

/// A continuous multichannel recording.
#[derive(Debug, Clone)]
pub struct Raw {
    /// Channel metadata.
    pub info: RecordingInfo,
    /// Sample data, shape `[n_channels, n_samples]`.
    pub data: Array2<f64>,
}

impl Raw {
    /// Create a `Raw`, checking that `data` has one row per channel.
    pub fn new(info: RecordingInfo, data: Array2<f64>) -> Result<Self, DataError> {
        if data.nrows() != info.n_channels() {
            return Err(DataError::shape_mismatch(
                "raw data rows vs channels",
                vec![info.n_channels()],
                vec![data.nrows()],
            ));
        }
        Ok(Raw { info, data })
    }

    /// Number of samples per channel.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Restrict the recording to channels of the given kinds, preserving
    /// recording order.
    pub fn pick_by_kind(&self, kinds: &[ChannelKind]) -> Result<Raw, DataError> {
        let picks = self.info.picks_by_kind(kinds);
        if picks.is_empty() {
            return Err(DataError::Empty { what: "channel selection" });
        }
        let data = self.data.select(Axis(0), &picks);
        Ok(Raw { info: self.info.pick(&picks), data })
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Discrete stimulus markers: rows of `(sample index, event code)`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventList {
    /// Event rows, shape `[n_events, 2]`, sorted by sample index.
    pub events: Array2<i64>,
}

impl EventList {
    /// Create an `EventList`, checking the two-column layout and ordering.
    pub fn new(events: Array2<i64>) -> Result<Self, DataError> {
        if events.ncols() != 2 {
            return Err(DataError::shape_mismatch(
                "event columns",
                vec![2],
                vec![events.ncols()],
            ));
        }
        for row in 1..events.nrows() {
            if events[[row, 0]] <= events[[row - 1, 0]] {
                return Err(DataError::UnsortedEvents { row });
            }
        }
        Ok(EventList { events })
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.nrows()
    }

    /// Returns `true` when no events were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.nrows() == 0
    }

    /// The event codes column.
    #[must_use]
    pub fn codes(&self) -> Vec<i32> {
        self.events.column(1).iter().map(|&c| c as i32).collect()
    }

    /// A new list containing only events whose code is in `codes`.
    #[must_use]
    pub fn filter_codes(&self, codes: &[i32]) -> EventList {
        let rows: Vec<usize> = (0..self.events.nrows())
            .filter(|&r| codes.contains(&(self.events[[r, 1]] as i32)))
            .collect();
        EventList { events: self.events.select(Axis(0), &rows) }
    }
}

// ---------------------------------------------------------------------------
// Epochs
// ---------------------------------------------------------------------------

/// Stimulus-locked, decimated data segments, one per retained event.
#[derive(Debug, Clone)]
pub struct Epochs {
    /// Channel metadata of the picked channels.
    pub info: RecordingInfo,
    /// Segment data, shape `[n_epochs, n_channels, n_times]`.
    pub data: Array3<f64>,
    /// The event row each epoch was cut around, shape `[n_epochs, 2]`.
    pub events: Array2<i64>,
    /// Time of the first sample relative to the event onset, in seconds.
    pub tmin: f64,
    /// Effective sampling rate after decimation, in Hz.
    pub sfreq: f64,
}

impl Epochs {
    /// Create `Epochs`, checking that events, channels, and data agree.
    pub fn new(
        info: RecordingInfo,
        data: Array3<f64>,
        events: Array2<i64>,
        tmin: f64,
        sfreq: f64,
    ) -> Result<Self, DataError> {
        if !(sfreq > 0.0) {
            return Err(DataError::InvalidSamplingRate { sfreq });
        }
        let (n_epochs, n_channels, _) = data.dim();
        if n_epochs != events.nrows() {
            return Err(DataError::shape_mismatch(
                "epochs vs events",
                vec![events.nrows()],
                vec![n_epochs],
            ));
        }
        if n_channels != info.n_channels() {
            return Err(DataError::shape_mismatch(
                "epoch channels vs info",
                vec![info.n_channels()],
                vec![n_channels],
            ));
        }
        Ok(Epochs { info, data, events, tmin, sfreq })
    }

    /// Number of epochs.
    #[must_use]
    pub fn n_epochs(&self) -> usize {
        self.data.dim().0
    }

    /// Number of time samples per epoch.
    #[must_use]
    pub fn n_times(&self) -> usize {
        self.data.dim().2
    }

    /// Per-epoch condition codes.
    #[must_use]
    pub fn codes(&self) -> Vec<i32> {
        self.events.column(1).iter().map(|&c| c as i32).collect()
    }

    /// Time axis relative to the event onset, in seconds.
    #[must_use]
    pub fn times(&self) -> Vec<f64> {
        (0..self.n_times())
            .map(|k| self.tmin + k as f64 / self.sfreq)
            .collect()
    }

    /// Average epochs into an [`Evoked`].
    ///
    /// With `code = Some(c)` only epochs of that condition contribute; with
    /// `None` all epochs are averaged (the grand average).
    pub fn average(&self, code: Option<i32>, comment: &str) -> Result<Evoked, DataError> {
        let rows: Vec<usize> = match code {
            Some(c) => (0..self.n_epochs())
                .filter(|&e| self.events[[e, 1]] as i32 == c)
                .collect(),
            None => (0..self.n_epochs()).collect(),
        };
        if rows.is_empty() {
            return Err(DataError::Empty { what: "epoch selection for averaging" });
        }
        let mut sum = Array2::<f64>::zeros((self.info.n_channels(), self.n_times()));
        for &e in &rows {
            sum += &self.data.slice(s![e, .., ..]);
        }
        sum /= rows.len() as f64;
        Ok(Evoked {
            comment: comment.to_string(),
            nave: rows.len(),
            ch_names: self.info.ch_names.clone(),
            data: sum,
            tmin: self.tmin,
            sfreq: self.sfreq,
        })
    }

    /// Restrict the epochs to channels of the given kinds.
    pub fn pick_by_kind(&self, kinds: &[ChannelKind]) -> Result<Epochs, DataError> {
        let picks = self.info.picks_by_kind(kinds);
        if picks.is_empty() {
            return Err(DataError::Empty { what: "channel selection" });
        }
        let data = self.data.select(Axis(1), &picks);
        Ok(Epochs {
            info: self.info.pick(&picks),
            data,
            events: self.events.clone(),
            tmin: self.tmin,
            sfreq: self.sfreq,
        })
    }
}

// ---------------------------------------------------------------------------
// Evoked
// ---------------------------------------------------------------------------

/// A condition-averaged sensor waveform.
#[derive(Debug, Clone)]
pub struct Evoked {
    /// Condition name (e.g. `left_aud`).
    pub comment: String,
    /// Number of epochs averaged.
    pub nave: usize,
    /// Channel names, parallel to `data` rows.
    pub ch_names: Vec<String>,
    /// Averaged data, shape `[n_channels, n_times]`.
    pub data: Array2<f64>,
    /// Time of the first sample relative to the event onset, in seconds.
    pub tmin: f64,
    /// Sampling rate in Hz.
    pub sfreq: f64,
}

impl Evoked {
    /// Time axis relative to the event onset, in seconds.
    #[must_use]
    pub fn times(&self) -> Vec<f64> {
        (0..self.data.ncols())
            .map(|k| self.tmin + k as f64 / self.sfreq)
            .collect()
    }

    /// Combine two averages into their pooled (nave-weighted) grand average.
    pub fn grand_average(&self, other: &Evoked) -> Result<Evoked, DataError> {
        if self.ch_names != other.ch_names || self.data.dim() != other.data.dim() {
            return Err(DataError::shape_mismatch(
                "evoked pair",
                vec![self.data.nrows(), self.data.ncols()],
                vec![other.data.nrows(), other.data.ncols()],
            ));
        }
        let total = self.nave + other.nave;
        if total == 0 {
            return Err(DataError::Empty { what: "evoked averages" });
        }
        let data = (&self.data * self.nave as f64 + &other.data * other.nave as f64)
            / total as f64;
        Ok(Evoked {
            comment: format!("{} + {}", self.comment, other.comment),
            nave: total,
            ch_names: self.ch_names.clone(),
            data,
            tmin: self.tmin,
            sfreq: self.sfreq,
        })
    }
}

// ---------------------------------------------------------------------------
// Covariance
// ---------------------------------------------------------------------------

/// A sensor-by-sensor covariance estimate.
#[derive(Debug, Clone)]
pub struct Covariance {
    /// Channel names, parallel to the matrix rows/columns.
    pub names: Vec<String>,
    /// The covariance matrix, shape `[p, p]`.
    pub data: Array2<f64>,
    /// Number of time samples the estimate was computed from.
    pub n_samples: usize,
}

impl Covariance {
    /// Create a `Covariance`, checking squareness and name count.
    pub fn new(
        names: Vec<String>,
        data: Array2<f64>,
        n_samples: usize,
    ) -> Result<Self, DataError> {
        if data.nrows() != data.ncols() {
            return Err(DataError::shape_mismatch(
                "covariance matrix",
                vec![data.nrows(), data.nrows()],
                vec![data.nrows(), data.ncols()],
            ));
        }
        if names.len() != data.nrows() {
            return Err(DataError::shape_mismatch(
                "covariance names vs matrix",
                vec![data.nrows()],
                vec![names.len()],
            ));
        }
        Ok(Covariance { names, data, n_samples })
    }

    /// Matrix dimension (number of channels).
    #[must_use]
    pub fn dim(&self) -> usize {
        self.data.nrows()
    }
}

// ---------------------------------------------------------------------------
// Source space & forward model
// ---------------------------------------------------------------------------

/// A brain hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hemisphere {
    /// Left hemisphere.
    Left,
    /// Right hemisphere.
    Right,
}

impl Hemisphere {
    /// Conventional short name: `lh` or `rh`.
    #[must_use]
    pub fn short(self) -> &'static str {
        match self {
            Hemisphere::Left => "lh",
            Hemisphere::Right => "rh",
        }
    }
}

/// One hemisphere's source space: vertices on the cortical surface plus the
/// surface connectivity used for growing regions of interest.
#[derive(Debug, Clone)]
pub struct HemiSourceSpace {
    /// Vertex ids, strictly increasing.
    pub vertices: Vec<u32>,
    /// Vertex positions in meters, shape `[n_vertices, 3]`.
    pub positions: Array2<f64>,
    /// Undirected surface edges as pairs of local indices into `vertices`.
    pub edges: Vec<[u32; 2]>,
}

impl HemiSourceSpace {
    /// Create a `HemiSourceSpace`, validating ordering and index ranges.
    pub fn new(
        vertices: Vec<u32>,
        positions: Array2<f64>,
        edges: Vec<[u32; 2]>,
    ) -> Result<Self, DataError> {
        let n = vertices.len();
        if positions.dim() != (n, 3) {
            return Err(DataError::shape_mismatch(
                "source positions",
                vec![n, 3],
                vec![positions.nrows(), positions.ncols()],
            ));
        }
        for w in vertices.windows(2) {
            if w[1] <= w[0] {
                return Err(DataError::UnsortedVertices);
            }
        }
        for e in &edges {
            if e[0] as usize >= n || e[1] as usize >= n {
                return Err(DataError::shape_mismatch(
                    "edge index",
                    vec![n],
                    vec![e[0].max(e[1]) as usize],
                ));
            }
        }
        Ok(HemiSourceSpace { vertices, positions, edges })
    }

    /// Number of sources in this hemisphere.
    #[must_use]
    pub fn n_sources(&self) -> usize {
        self.vertices.len()
    }

    /// Local index of a vertex id, if present.
    #[must_use]
    pub fn index_of(&self, vertex: u32) -> Option<usize> {
        self.vertices.binary_search(&vertex).ok()
    }
}

/// A precomputed forward model: source-space geometry plus the
/// free-orientation leadfield mapping unit dipoles to sensor measurements.
#[derive(Debug, Clone)]
pub struct ForwardSolution {
    /// Sensor channel names, parallel to `gain` rows.
    pub ch_names: Vec<String>,
    /// Left-hemisphere source space.
    pub lh: HemiSourceSpace,
    /// Right-hemisphere source space.
    pub rh: HemiSourceSpace,
    /// Leadfield, shape `[n_channels, 3 * n_sources]`; left-hemisphere
    /// sources first, three orientation columns (x, y, z) per source.
    pub gain: Array2<f64>,
}

impl ForwardSolution {
    /// Create a `ForwardSolution`, checking leadfield dimensions.
    pub fn new(
        ch_names: Vec<String>,
        lh: HemiSourceSpace,
        rh: HemiSourceSpace,
        gain: Array2<f64>,
    ) -> Result<Self, DataError> {
        let n_src = lh.n_sources() + rh.n_sources();
        if gain.dim() != (ch_names.len(), 3 * n_src) {
            return Err(DataError::shape_mismatch(
                "leadfield",
                vec![ch_names.len(), 3 * n_src],
                vec![gain.nrows(), gain.ncols()],
            ));
        }
        Ok(ForwardSolution { ch_names, lh, rh, gain })
    }

    /// Total number of sources across both hemispheres.
    #[must_use]
    pub fn n_sources(&self) -> usize {
        self.lh.n_sources() + self.rh.n_sources()
    }

    /// The source space of `hemi`.
    #[must_use]
    pub fn hemi(&self, hemi: Hemisphere) -> &HemiSourceSpace {
        match hemi {
            Hemisphere::Left => &self.lh,
            Hemisphere::Right => &self.rh,
        }
    }

    /// Offset of `hemi`'s first source in the global source ordering.
    #[must_use]
    pub fn hemi_offset(&self, hemi: Hemisphere) -> usize {
        match hemi {
            Hemisphere::Left => 0,
            Hemisphere::Right => self.lh.n_sources(),
        }
    }

    /// Restrict the leadfield rows to `names`, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::UnknownChannel`] if a requested channel is not
    /// part of this forward model.
    pub fn pick_channels(&self, names: &[String]) -> Result<ForwardSolution, DataError> {
        let mut rows = Vec::with_capacity(names.len());
        for name in names {
            let idx = self
                .ch_names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| DataError::UnknownChannel { name: name.clone() })?;
            rows.push(idx);
        }
        Ok(ForwardSolution {
            ch_names: names.to_vec(),
            lh: self.lh.clone(),
            rh: self.rh.clone(),
            gain: self.gain.select(Axis(0), &rows),
        })
    }
}

// ---------------------------------------------------------------------------
// Source estimate
// ---------------------------------------------------------------------------

/// Reconstructed per-source activity over time.
#[derive(Debug, Clone)]
pub struct SourceEstimate {
    /// Left-hemisphere vertex ids.
    pub lh_vertices: Vec<u32>,
    /// Right-hemisphere vertex ids.
    pub rh_vertices: Vec<u32>,
    /// Source data, shape `[n_sources, n_times]`, left hemisphere first.
    pub data: Array2<f64>,
    /// Time of the first sample in seconds.
    pub tmin: f64,
    /// Sample period in seconds.
    pub tstep: f64,
}

impl SourceEstimate {
    /// Create a `SourceEstimate`, checking the vertex/row agreement.
    pub fn new(
        lh_vertices: Vec<u32>,
        rh_vertices: Vec<u32>,
        data: Array2<f64>,
        tmin: f64,
        tstep: f64,
    ) -> Result<Self, DataError> {
        let n_src = lh_vertices.len() + rh_vertices.len();
        if data.nrows() != n_src {
            return Err(DataError::shape_mismatch(
                "source estimate rows",
                vec![n_src],
                vec![data.nrows()],
            ));
        }
        if !(tstep > 0.0) {
            return Err(DataError::InvalidSamplingRate { sfreq: 1.0 / tstep });
        }
        Ok(SourceEstimate { lh_vertices, rh_vertices, data, tmin, tstep })
    }

    /// Number of time samples.
    #[must_use]
    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    /// Time axis in seconds.
    #[must_use]
    pub fn times(&self) -> Vec<f64> {
        (0..self.n_times())
            .map(|k| self.tmin + k as f64 * self.tstep)
            .collect()
    }

    /// Left-hemisphere block of the data.
    #[must_use]
    pub fn lh_data(&self) -> ArrayView2<'_, f64> {
        self.data.slice(s![..self.lh_vertices.len(), ..])
    }

    /// Right-hemisphere block of the data.
    #[must_use]
    pub fn rh_data(&self) -> ArrayView2<'_, f64> {
        self.data.slice(s![self.lh_vertices.len().., ..])
    }

    /// Restrict the estimate to samples with `tmin <= t <= tmax`.
    ///
    /// Boundaries are inclusive within half a sample period, matching the
    /// usual crop semantics of analysis toolboxes.
    #[must_use]
    pub fn crop(&self, tmin: f64, tmax: f64) -> SourceEstimate {
        let eps = self.tstep / 2.0;
        let keep: Vec<usize> = self
            .times()
            .iter()
            .enumerate()
            .filter(|(_, &t)| t >= tmin - eps && t <= tmax + eps)
            .map(|(k, _)| k)
            .collect();
        let new_tmin = keep.first().map_or(self.tmin, |&k| self.tmin + k as f64 * self.tstep);
        SourceEstimate {
            lh_vertices: self.lh_vertices.clone(),
            rh_vertices: self.rh_vertices.clone(),
            data: self.data.select(Axis(1), &keep),
            tmin: new_tmin,
            tstep: self.tstep,
        }
    }
}

// ---------------------------------------------------------------------------
// Label
// ---------------------------------------------------------------------------

/// A named set of source-space vertices in one hemisphere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// The hemisphere this label lives in.
    pub hemi: Hemisphere,
    /// Member vertex ids, sorted ascending.
    pub vertices: Vec<u32>,
    /// Label name.
    pub name: String,
}

impl Label {
    /// Create a `Label`; vertices are sorted and deduplicated.
    pub fn new(hemi: Hemisphere, mut vertices: Vec<u32>, name: &str) -> Result<Self, DataError> {
        if vertices.is_empty() {
            return Err(DataError::Empty { what: "label vertex set" });
        }
        vertices.sort_unstable();
        vertices.dedup();
        Ok(Label { hemi, vertices, name: name.to_string() })
    }

    /// Number of member vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Returns `true` when the label has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Check that every member vertex exists in `space`.
    pub fn validate_in(&self, space: &HemiSourceSpace) -> Result<(), DataError> {
        for &v in &self.vertices {
            if space.index_of(v).is_none() {
                return Err(DataError::LabelVertexOutOfSpace {
                    name: self.name.clone(),
                    vertex: v,
                    hemi: self.hemi.short(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
