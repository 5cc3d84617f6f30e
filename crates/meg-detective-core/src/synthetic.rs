//! Deterministic synthetic MEG session.
//!
//! The pipeline's raw recording and forward model normally come from an
//! external dataset provider. This module generates both from an analytic
//! model instead, for integration tests, dry runs, and the `simulate`
//! command. Everything is bit-reproducible: geometry and evoked responses
//! are closed-form functions of the configuration, and the sensor noise
//! comes from a seeded xorshift64* generator — no global RNG state, no
//! platform dependence.
//!
//! ## Model
//!
//! - Gradiometer channels on a helmet sphere (radius 0.12 m), one stimulus
//!   channel.
//! - Two source spaces on lateral spherical caps of a cortex sphere
//!   (radius 0.07 m), with nearest-neighbour surface edges.
//! - A quasi-static dipole leadfield `g = (e × d) · n / ‖d‖³` (tangential
//!   sources are visible, radial ones nearly silent, as in real MEG).
//! - Alternating left/right auditory events (codes 3/4); each event adds a
//!   Gabor-shaped response at one "auditory" source per hemisphere with
//!   contralateral dominance.

use ndarray::{s, Array2};
use tracing::info;

use crate::error::DataError;
use crate::types::{
    ChannelKind, ForwardSolution, HemiSourceSpace, Hemisphere, Raw, RecordingInfo,
};

/// Golden angle in radians, used for the deterministic spiral layouts.
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// Helmet radius in meters.
const HELMET_RADIUS: f64 = 0.12;

/// Cortex sphere radius in meters.
const CORTEX_RADIUS: f64 = 0.07;

/// Leadfield scale factor (arbitrary units).
const GAIN_SCALE: f64 = 1.0e-3;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the synthetic session.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Number of gradiometer channels. Default: **20**.
    pub n_grad: usize,
    /// Sampling rate in Hz. Default: **300.0**.
    pub sfreq: f64,
    /// Events per condition (total events = twice this). Default: **30**.
    pub n_events_per_condition: usize,
    /// Onset of the first event in seconds. Default: **1.0**.
    pub first_onset: f64,
    /// Inter-stimulus interval in seconds. Default: **0.75**.
    pub isi: f64,
    /// Sources per hemisphere. Default: **42**.
    pub sources_per_hemi: usize,
    /// Sensor noise standard deviation (arbitrary units). Default: **0.2**.
    pub noise_std: f64,
    /// Seed for the noise generator. Default: **0x5EED**.
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        SyntheticConfig {
            n_grad: 20,
            sfreq: 300.0,
            n_events_per_condition: 30,
            first_onset: 1.0,
            isi: 0.75,
            sources_per_hemi: 42,
            noise_std: 0.2,
            seed: 0x5EED,
        }
    }
}

impl SyntheticConfig {
    /// The deterministic event schedule: `(sample, code)` pairs, alternating
    /// left (3) and right (4), sorted by sample.
    #[must_use]
    pub fn event_schedule(&self) -> Vec<(usize, i32)> {
        (0..2 * self.n_events_per_condition)
            .map(|k| {
                let onset = self.first_onset + k as f64 * self.isi;
                let sample = (onset * self.sfreq).round() as usize;
                let code = if k % 2 == 0 { 3 } else { 4 };
                (sample, code)
            })
            .collect()
    }

    /// Total recording length in samples (last event window plus padding).
    #[must_use]
    pub fn n_samples(&self) -> usize {
        let last_onset =
            self.first_onset + (2 * self.n_events_per_condition - 1) as f64 * self.isi;
        ((last_onset + 1.0) * self.sfreq).ceil() as usize
    }
}

// ---------------------------------------------------------------------------
// Seeded noise (xorshift64*)
// ---------------------------------------------------------------------------

/// Minimal xorshift64* generator; reproducible across platforms and free of
/// external RNG state.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        XorShift64 { state: if seed == 0 { 0x853c_49e6_748f_ea9b } else { seed } }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    /// Uniform in `[0, 1)`.
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Standard normal via Box–Muller.
    fn next_gauss(&mut self) -> f64 {
        let u1 = self.next_f64().max(f64::MIN_POSITIVE);
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

// ---------------------------------------------------------------------------
// Geometry helpers
// ---------------------------------------------------------------------------

fn normalize(v: [f64; 3]) -> [f64; 3] {
    let n = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    [v[0] / n, v[1] / n, v[2] / n]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Gradiometer positions: golden spiral over the upper helmet sphere.
fn helmet_positions(n: usize) -> Array2<f64> {
    let mut pos = Array2::<f64>::zeros((n, 3));
    for i in 0..n {
        // z descends from near the vertex to 25% height
        let z = 1.0 - 0.75 * (i as f64 + 0.5) / n as f64;
        let r_xy = (1.0 - z * z).sqrt();
        let phi = GOLDEN_ANGLE * i as f64;
        pos[[i, 0]] = HELMET_RADIUS * r_xy * phi.cos();
        pos[[i, 1]] = HELMET_RADIUS * r_xy * phi.sin();
        pos[[i, 2]] = HELMET_RADIUS * z;
    }
    pos
}

/// Axis of a hemisphere's source cap (roughly temporal cortex).
fn hemi_axis(hemi: Hemisphere) -> [f64; 3] {
    match hemi {
        Hemisphere::Left => normalize([-0.8, -0.15, 0.35]),
        Hemisphere::Right => normalize([0.8, -0.15, 0.35]),
    }
}

/// Source positions: golden spiral within a spherical cap around `axis`.
fn cap_positions(n: usize, axis: [f64; 3]) -> Array2<f64> {
    // orthonormal basis (u, v, axis)
    let helper = if axis[2].abs() < 0.9 { [0.0, 0.0, 1.0] } else { [1.0, 0.0, 0.0] };
    let u = normalize(cross(axis, helper));
    let v = cross(axis, u);

    let cos_cap = (55.0_f64).to_radians().cos();
    let mut pos = Array2::<f64>::zeros((n, 3));
    for i in 0..n {
        let cos_a = 1.0 - (1.0 - cos_cap) * (i as f64 + 0.5) / n as f64;
        let sin_a = (1.0 - cos_a * cos_a).sqrt();
        let beta = GOLDEN_ANGLE * i as f64;
        for d in 0..3 {
            let dir =
                sin_a * beta.cos() * u[d] + sin_a * beta.sin() * v[d] + cos_a * axis[d];
            pos[[i, d]] = CORTEX_RADIUS * dir;
        }
    }
    pos
}

/// Nearest-neighbour surface edges (each vertex linked to its 4 closest
/// peers, pairs deduplicated).
fn neighbour_edges(positions: &Array2<f64>) -> Vec<[u32; 2]> {
    let n = positions.nrows();
    let mut edges: Vec<[u32; 2]> = Vec::new();
    for i in 0..n {
        let mut dists: Vec<(usize, f64)> = (0..n)
            .filter(|&j| j != i)
            .map(|j| {
                let mut d2 = 0.0;
                for k in 0..3 {
                    let d = positions[[i, k]] - positions[[j, k]];
                    d2 += d * d;
                }
                (j, d2)
            })
            .collect();
        dists.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        for &(j, _) in dists.iter().take(4) {
            let pair = if i < j { [i as u32, j as u32] } else { [j as u32, i as u32] };
            if !edges.contains(&pair) {
                edges.push(pair);
            }
        }
    }
    edges.sort_unstable();
    edges
}

// ---------------------------------------------------------------------------
// Forward model
// ---------------------------------------------------------------------------

/// Build the synthetic forward model (source spaces + leadfield).
pub fn generate_forward(cfg: &SyntheticConfig) -> Result<ForwardSolution, DataError> {
    let ch_names: Vec<String> = (0..cfg.n_grad).map(|i| format!("MEG {:03}", i + 1)).collect();
    let helmet = helmet_positions(cfg.n_grad);

    let build_space = |hemi: Hemisphere| -> Result<HemiSourceSpace, DataError> {
        let positions = cap_positions(cfg.sources_per_hemi, hemi_axis(hemi));
        let edges = neighbour_edges(&positions);
        let vertices: Vec<u32> = (0..cfg.sources_per_hemi as u32).map(|i| i * 13).collect();
        HemiSourceSpace::new(vertices, positions, edges)
    };
    let lh = build_space(Hemisphere::Left)?;
    let rh = build_space(Hemisphere::Right)?;

    let n_src = lh.n_sources() + rh.n_sources();
    let mut gain = Array2::<f64>::zeros((cfg.n_grad, 3 * n_src));
    let basis = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    for (block, space) in [(0, &lh), (lh.n_sources(), &rh)] {
        for j in 0..space.n_sources() {
            let r = [space.positions[[j, 0]], space.positions[[j, 1]], space.positions[[j, 2]]];
            for c in 0..cfg.n_grad {
                let p = [helmet[[c, 0]], helmet[[c, 1]], helmet[[c, 2]]];
                let n_c = normalize(p);
                let d = [p[0] - r[0], p[1] - r[1], p[2] - r[2]];
                let dist = dot(d, d).sqrt();
                for (o, e) in basis.iter().enumerate() {
                    let lead = dot(cross(*e, d), n_c) / dist.powi(3);
                    gain[[c, 3 * (block + j) + o]] = GAIN_SCALE * lead;
                }
            }
        }
    }

    ForwardSolution::new(ch_names, lh, rh, gain)
}

// ---------------------------------------------------------------------------
// Raw recording
// ---------------------------------------------------------------------------

/// Index of the cap source closest to the hemisphere's "auditory" direction.
fn auditory_source(space: &HemiSourceSpace, hemi: Hemisphere) -> usize {
    let target = match hemi {
        Hemisphere::Left => normalize([-0.95, -0.3, 0.1]),
        Hemisphere::Right => normalize([0.95, -0.3, 0.1]),
    };
    let mut best = 0;
    let mut best_score = f64::MIN;
    for j in 0..space.n_sources() {
        let r = normalize([
            space.positions[[j, 0]],
            space.positions[[j, 1]],
            space.positions[[j, 2]],
        ]);
        let score = dot(r, target);
        if score > best_score {
            best_score = score;
            best = j;
        }
    }
    best
}

/// Fixed tangential orientation for a simulated source.
fn tangential_orientation(position: [f64; 3]) -> [f64; 3] {
    let r_hat = normalize(position);
    let t = cross([0.0, 0.0, 1.0], r_hat);
    let norm = dot(t, t).sqrt();
    if norm < 1e-9 {
        [1.0, 0.0, 0.0]
    } else {
        [t[0] / norm, t[1] / norm, t[2] / norm]
    }
}

/// Gabor-shaped evoked waveform, peaking ~100 ms after the event onset.
fn evoked_waveform(t_rel: f64) -> f64 {
    if !(0.0..=0.25).contains(&t_rel) {
        return 0.0;
    }
    let x = (t_rel - 0.10) / 0.03;
    (-x * x).exp() * (2.0 * std::f64::consts::PI * 7.0 * (t_rel - 0.10)).cos()
}

/// Generate the full synthetic session: a raw recording plus the forward
/// model that explains it.
pub fn generate_session(cfg: &SyntheticConfig) -> Result<(Raw, ForwardSolution), DataError> {
    let fwd = generate_forward(cfg)?;
    let n_samples = cfg.n_samples();
    let n_channels = cfg.n_grad + 1;

    let mut ch_names = fwd.ch_names.clone();
    ch_names.push("STI 001".to_string());
    let mut ch_kinds = vec![ChannelKind::Grad; cfg.n_grad];
    ch_kinds.push(ChannelKind::Stim);
    let info = RecordingInfo::new(cfg.sfreq, ch_names, ch_kinds)?;

    // Sensor noise.
    let mut rng = XorShift64::new(cfg.seed);
    let mut data = Array2::<f64>::zeros((n_channels, n_samples));
    for c in 0..cfg.n_grad {
        for t in 0..n_samples {
            data[[c, t]] = cfg.noise_std * rng.next_gauss();
        }
    }

    // Unit-norm sensor patterns of the two auditory sources.
    let mut patterns = Vec::with_capacity(2);
    for hemi in [Hemisphere::Left, Hemisphere::Right] {
        let space = fwd.hemi(hemi);
        let j = auditory_source(space, hemi);
        let position = [
            space.positions[[j, 0]],
            space.positions[[j, 1]],
            space.positions[[j, 2]],
        ];
        let e = tangential_orientation(position);
        let col0 = 3 * (fwd.hemi_offset(hemi) + j);
        let mut pattern = vec![0.0; cfg.n_grad];
        for c in 0..cfg.n_grad {
            pattern[c] = fwd.gain[[c, col0]] * e[0]
                + fwd.gain[[c, col0 + 1]] * e[1]
                + fwd.gain[[c, col0 + 2]] * e[2];
        }
        let norm = pattern.iter().map(|g| g * g).sum::<f64>().sqrt().max(1e-12);
        pattern.iter_mut().for_each(|g| *g /= norm);
        patterns.push(pattern);
    }

    // Evoked responses with contralateral dominance.
    let stim_len = (0.05 * cfg.sfreq).round() as usize;
    let resp_len = (0.25 * cfg.sfreq).round() as usize;
    for (sample, code) in cfg.event_schedule() {
        // code 3 = left ear: right hemisphere dominates, and vice versa.
        let (amp_lh, amp_rh) = if code == 3 { (0.55, 1.0) } else { (1.0, 0.55) };
        for k in 0..=resp_len {
            let t_idx = sample + k;
            if t_idx >= n_samples {
                break;
            }
            let h = evoked_waveform(k as f64 / cfg.sfreq);
            for c in 0..cfg.n_grad {
                data[[c, t_idx]] += h * (amp_lh * patterns[0][c] + amp_rh * patterns[1][c]);
            }
        }
        // Stimulus pulse: the code value held for 50 ms.
        let end = (sample + stim_len).min(n_samples);
        data.slice_mut(s![cfg.n_grad, sample..end]).fill(f64::from(code));
    }

    info!(
        "synthetic session: {} grads, {} samples at {} Hz, {} events",
        cfg.n_grad,
        n_samples,
        cfg.sfreq,
        2 * cfg.n_events_per_condition
    );

    let raw = Raw::new(info, data)?;
    Ok((raw, fwd))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cfg() -> SyntheticConfig {
        SyntheticConfig {
            n_grad: 8,
            n_events_per_condition: 4,
            sources_per_hemi: 12,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn schedule_alternates_codes() {
        let cfg = small_cfg();
        let schedule = cfg.event_schedule();
        assert_eq!(schedule.len(), 8);
        let codes: Vec<i32> = schedule.iter().map(|&(_, c)| c).collect();
        assert_eq!(codes, vec![3, 4, 3, 4, 3, 4, 3, 4]);
        for w in schedule.windows(2) {
            assert!(w[1].0 > w[0].0);
        }
    }

    #[test]
    fn forward_dimensions_are_consistent() {
        let cfg = small_cfg();
        let fwd = generate_forward(&cfg).unwrap();
        assert_eq!(fwd.ch_names.len(), cfg.n_grad);
        assert_eq!(fwd.lh.n_sources(), cfg.sources_per_hemi);
        assert_eq!(fwd.rh.n_sources(), cfg.sources_per_hemi);
        assert_eq!(fwd.gain.dim(), (cfg.n_grad, 3 * 2 * cfg.sources_per_hemi));
        assert!(!fwd.lh.edges.is_empty());
    }

    #[test]
    fn source_caps_are_lateralized() {
        let cfg = small_cfg();
        let fwd = generate_forward(&cfg).unwrap();
        for j in 0..fwd.lh.n_sources() {
            assert!(fwd.lh.positions[[j, 0]] < 0.0, "lh source {j} not on the left");
        }
        for j in 0..fwd.rh.n_sources() {
            assert!(fwd.rh.positions[[j, 0]] > 0.0, "rh source {j} not on the right");
        }
    }

    #[test]
    fn stim_channel_holds_event_codes() {
        let cfg = small_cfg();
        let (raw, _) = generate_session(&cfg).unwrap();
        let stim = raw.info.stim_pick().unwrap();
        for (sample, code) in cfg.event_schedule() {
            assert_eq!(raw.data[[stim, sample]], f64::from(code));
            assert_eq!(raw.data[[stim, sample - 1]], 0.0);
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let cfg = small_cfg();
        let (a, _) = generate_session(&cfg).unwrap();
        let (b, _) = generate_session(&cfg).unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn waveform_is_zero_outside_support() {
        assert_eq!(evoked_waveform(-0.01), 0.0);
        assert_eq!(evoked_waveform(0.3), 0.0);
        assert!(evoked_waveform(0.10).abs() > 0.9);
    }
}
