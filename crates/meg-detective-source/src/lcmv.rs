//! LCMV beamformer construction and application.
//!
//! The filter is the scalar unit-noise-gain LCMV: per source, the dipole
//! orientation maximizing the noise-normalized output power is selected
//! (the generalized eigenproblem `A u = λ B u` with `A = Lᵀ C⁻¹ L`,
//! `B = Lᵀ C⁻² L`), and the weights are `w = C⁻¹ L u / ‖C⁻¹ L u‖`. The
//! covariance is regularized with `reg · tr(C)/p` on the diagonal before
//! inversion.
//!
//! One filter projects either a single average ([`apply_lcmv`]) or every
//! epoch ([`apply_lcmv_epochs`]); restricting construction to a
//! [`Label`] yields the per-ROI virtual sensors used by the decoding stage.

use nalgebra::{Cholesky, DMatrix, DVector, SymmetricEigen};
use ndarray::{Array2, Array3};
use tracing::info;

use meg_detective_core::types::{
    Covariance, Epochs, Evoked, ForwardSolution, Hemisphere, Label, RecordingInfo,
    SourceEstimate,
};

use crate::{SourceError, SourceResult};

/// A constructed LCMV spatial filter.
#[derive(Debug, Clone)]
pub struct LcmvFilter {
    /// Sensor channels the weights apply to, in weight-column order.
    pub ch_names: Vec<String>,
    /// Filter weights, shape `[n_sources, n_channels]`.
    pub weights: Array2<f64>,
    /// Left-hemisphere vertex ids covered by the filter.
    pub lh_vertices: Vec<u32>,
    /// Right-hemisphere vertex ids covered by the filter.
    pub rh_vertices: Vec<u32>,
}

impl LcmvFilter {
    /// Number of sources the filter reconstructs.
    #[must_use]
    pub fn n_sources(&self) -> usize {
        self.weights.nrows()
    }
}

/// Construct an LCMV beamformer.
///
/// `info` describes the sensor recording the filter will be applied to; its
/// data channels must match the covariance exactly and be present in the
/// forward model. With `label = Some(_)` only that label's sources receive
/// weights (the ROI-restricted filters of the decoding stage); with `None`
/// the filter covers the full source space.
///
/// `reg` scales the diagonal loading applied to the covariance before
/// inversion, as a fraction of the mean sensor power `tr(C)/p`.
pub fn make_lcmv(
    info: &RecordingInfo,
    fwd: &ForwardSolution,
    cov: &Covariance,
    reg: f64,
    label: Option<&Label>,
) -> SourceResult<LcmvFilter> {
    let picks = info.data_picks();
    let names: Vec<String> = picks.iter().map(|&i| info.ch_names[i].clone()).collect();
    if names != cov.names {
        return Err(SourceError::ChannelMismatch { left: "recording", right: "covariance" });
    }
    let fwd = fwd.pick_channels(&names)?;
    let p = names.len();

    // Regularized covariance and its inverse.
    let mut c = DMatrix::<f64>::zeros(p, p);
    for i in 0..p {
        for j in 0..p {
            c[(i, j)] = cov.data[[i, j]];
        }
    }
    let loading = reg * c.trace() / p as f64;
    for i in 0..p {
        c[(i, i)] += loading;
    }
    let c_inv = Cholesky::new(c)
        .ok_or(SourceError::SingularCovariance)?
        .inverse();
    let c_inv2 = &c_inv * &c_inv;

    // Sources to solve for, as (global index, hemisphere, vertex id).
    let mut sources: Vec<(usize, Hemisphere, u32)> = Vec::new();
    match label {
        None => {
            for hemi in [Hemisphere::Left, Hemisphere::Right] {
                let space = fwd.hemi(hemi);
                let offset = fwd.hemi_offset(hemi);
                for (j, &v) in space.vertices.iter().enumerate() {
                    sources.push((offset + j, hemi, v));
                }
            }
        }
        Some(label) => {
            let space = fwd.hemi(label.hemi);
            label.validate_in(space)?;
            let offset = fwd.hemi_offset(label.hemi);
            for &v in &label.vertices {
                // validate_in guarantees presence
                if let Some(j) = space.index_of(v) {
                    sources.push((offset + j, label.hemi, v));
                }
            }
        }
    }

    let mut weights = Array2::<f64>::zeros((sources.len(), p));
    let mut lh_vertices = Vec::new();
    let mut rh_vertices = Vec::new();

    for (row, &(global, hemi, vertex)) in sources.iter().enumerate() {
        let l = DMatrix::<f64>::from_fn(p, 3, |r, o| fwd.gain[[r, 3 * global + o]]);
        let u = max_power_orientation(&l, &c_inv, &c_inv2)
            .ok_or(SourceError::ZeroLeadfield { index: global })?;

        // Unit-noise-gain weights: w = C⁻¹ L u / ‖C⁻¹ L u‖.
        let l_ori: DVector<f64> = &l * u;
        let w: DVector<f64> = &c_inv * l_ori;
        let norm = w.norm();
        if norm < 1e-15 {
            return Err(SourceError::ZeroLeadfield { index: global });
        }
        for ch in 0..p {
            weights[[row, ch]] = w[ch] / norm;
        }
        match hemi {
            Hemisphere::Left => lh_vertices.push(vertex),
            Hemisphere::Right => rh_vertices.push(vertex),
        }
    }

    info!(
        "LCMV filter over {} sources ({} channels, reg {:.3})",
        sources.len(),
        p,
        reg
    );

    Ok(LcmvFilter { ch_names: names, weights, lh_vertices, rh_vertices })
}

/// Orientation maximizing the unit-noise-gain output power.
///
/// Solves the 3×3 generalized eigenproblem `A u = λ B u` with
/// `A = Lᵀ C⁻¹ L` and `B = Lᵀ C⁻² L` via the Cholesky reduction of `B`,
/// and returns the eigenvector of the largest eigenvalue with a
/// deterministic sign. Returns `None` for a numerically zero leadfield.
fn max_power_orientation(
    l: &DMatrix<f64>,
    c_inv: &DMatrix<f64>,
    c_inv2: &DMatrix<f64>,
) -> Option<DVector<f64>> {
    let a = l.transpose() * c_inv * l;
    let mut b = l.transpose() * c_inv2 * l;

    let b_trace = b.trace();
    if !(b_trace > 0.0) {
        return None;
    }
    // Ridge keeps the reduction stable when one orientation is nearly silent.
    let ridge = 1e-10 * b_trace / 3.0;
    for i in 0..3 {
        b[(i, i)] += ridge;
    }

    let chol = Cholesky::new(b)?;
    let l_fac = chol.l();
    let l_fac_inv = l_fac.clone().try_inverse()?;
    let m = &l_fac_inv * a * l_fac_inv.transpose();
    let m_sym = (&m + m.transpose()) * 0.5;

    let eig = SymmetricEigen::new(m_sym);
    let mut best = 0;
    for i in 1..3 {
        if eig.eigenvalues[i] > eig.eigenvalues[best] {
            best = i;
        }
    }
    let y = eig.eigenvectors.column(best).into_owned();
    let mut u = l_fac_inv.transpose() * y;
    let norm = u.norm();
    if norm < 1e-15 {
        return None;
    }
    u /= norm;

    // Deterministic sign: largest-magnitude component positive.
    let mut dominant = 0;
    for i in 1..3 {
        if u[i].abs() > u[dominant].abs() {
            dominant = i;
        }
    }
    if u[dominant] < 0.0 {
        u = -u;
    }
    Some(u)
}

/// Select the rows of `data` matching `filter.ch_names` given the row names
/// `names`.
fn pick_rows(names: &[String], filter: &LcmvFilter) -> SourceResult<Vec<usize>> {
    filter
        .ch_names
        .iter()
        .map(|name| {
            names
                .iter()
                .position(|n| n == name)
                .ok_or(SourceError::ChannelMismatch { left: "filter", right: "data" })
        })
        .collect()
}

/// Project an average through the filter into source space.
pub fn apply_lcmv(evoked: &Evoked, filter: &LcmvFilter) -> SourceResult<SourceEstimate> {
    let rows = pick_rows(&evoked.ch_names, filter)?;
    let picked = evoked.data.select(ndarray::Axis(0), &rows);
    let data = filter.weights.dot(&picked);
    Ok(SourceEstimate::new(
        filter.lh_vertices.clone(),
        filter.rh_vertices.clone(),
        data,
        evoked.tmin,
        1.0 / evoked.sfreq,
    )?)
}

/// Project every epoch through the filter into source space.
///
/// Returns a tensor of shape `[n_epochs, n_sources, n_times]`.
pub fn apply_lcmv_epochs(epochs: &Epochs, filter: &LcmvFilter) -> SourceResult<Array3<f64>> {
    let rows = pick_rows(&epochs.info.ch_names, filter)?;
    let n_epochs = epochs.n_epochs();
    let n_times = epochs.n_times();
    let mut out = Array3::<f64>::zeros((n_epochs, filter.n_sources(), n_times));
    for e in 0..n_epochs {
        let picked = epochs
            .data
            .index_axis(ndarray::Axis(0), e)
            .select(ndarray::Axis(0), &rows);
        out.index_axis_mut(ndarray::Axis(0), e)
            .assign(&filter.weights.dot(&picked));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use meg_detective_core::synthetic::{generate_session, SyntheticConfig};
    use meg_detective_core::types::ChannelKind;
    use ndarray::Array3;

    fn small_cfg() -> SyntheticConfig {
        SyntheticConfig {
            n_grad: 10,
            n_events_per_condition: 3,
            sources_per_hemi: 12,
            ..SyntheticConfig::default()
        }
    }

    /// Identity-ish covariance over the forward's channels.
    fn unit_cov(fwd: &ForwardSolution) -> Covariance {
        let p = fwd.ch_names.len();
        let mut data = Array2::<f64>::zeros((p, p));
        for i in 0..p {
            data[[i, i]] = 1.0;
        }
        Covariance::new(fwd.ch_names.clone(), data, 1000).unwrap()
    }

    fn grad_info(fwd: &ForwardSolution) -> RecordingInfo {
        RecordingInfo::new(
            300.0,
            fwd.ch_names.clone(),
            vec![ChannelKind::Grad; fwd.ch_names.len()],
        )
        .unwrap()
    }

    #[test]
    fn filter_covers_all_sources_and_has_unit_rows() {
        let (_, fwd) = generate_session(&small_cfg()).unwrap();
        let cov = unit_cov(&fwd);
        let info = grad_info(&fwd);

        let filter = make_lcmv(&info, &fwd, &cov, 0.05, None).unwrap();
        assert_eq!(filter.n_sources(), fwd.n_sources());
        assert_eq!(filter.lh_vertices, fwd.lh.vertices);
        assert_eq!(filter.rh_vertices, fwd.rh.vertices);

        // Unit-noise-gain: every weight row has unit norm.
        for row in filter.weights.rows() {
            let norm: f64 = row.iter().map(|v| v * v).sum::<f64>().sqrt();
            approx::assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn label_restricts_the_filter() {
        let (_, fwd) = generate_session(&small_cfg()).unwrap();
        let cov = unit_cov(&fwd);
        let info = grad_info(&fwd);

        let label = Label::new(
            Hemisphere::Left,
            fwd.lh.vertices[..5].to_vec(),
            "roi-lh",
        )
        .unwrap();
        let filter = make_lcmv(&info, &fwd, &cov, 0.05, Some(&label)).unwrap();
        assert_eq!(filter.n_sources(), 5);
        assert_eq!(filter.lh_vertices, fwd.lh.vertices[..5].to_vec());
        assert!(filter.rh_vertices.is_empty());
    }

    #[test]
    fn covariance_name_mismatch_is_rejected() {
        let (_, fwd) = generate_session(&small_cfg()).unwrap();
        let mut cov = unit_cov(&fwd);
        cov.names[0] = "BOGUS".to_string();
        let info = grad_info(&fwd);

        let err = make_lcmv(&info, &fwd, &cov, 0.05, None);
        assert!(matches!(err, Err(SourceError::ChannelMismatch { .. })));
    }

    #[test]
    fn apply_projects_to_source_space() {
        let (_, fwd) = generate_session(&small_cfg()).unwrap();
        let cov = unit_cov(&fwd);
        let info = grad_info(&fwd);
        let filter = make_lcmv(&info, &fwd, &cov, 0.05, None).unwrap();

        let evoked = Evoked {
            comment: "all".into(),
            nave: 6,
            ch_names: fwd.ch_names.clone(),
            data: Array2::from_shape_fn((fwd.ch_names.len(), 50), |(c, t)| {
                ((c + t) % 7) as f64
            }),
            tmin: -0.2,
            sfreq: 100.0,
        };
        let stc = apply_lcmv(&evoked, &filter).unwrap();
        assert_eq!(stc.data.nrows(), fwd.n_sources());
        assert_eq!(stc.n_times(), 50);
        assert!((stc.tstep - 0.01).abs() < 1e-12);
    }

    #[test]
    fn apply_epochs_keeps_trial_dimension() {
        let (_, fwd) = generate_session(&small_cfg()).unwrap();
        let cov = unit_cov(&fwd);
        let info = grad_info(&fwd);
        let filter = make_lcmv(&info, &fwd, &cov, 0.05, None).unwrap();

        let n_ch = fwd.ch_names.len();
        let data = Array3::from_shape_fn((4, n_ch, 30), |(e, c, t)| (e * c + t) as f64);
        let mut events = Array2::<i64>::zeros((4, 2));
        for e in 0..4 {
            events[[e, 0]] = (e as i64 + 1) * 100;
            events[[e, 1]] = if e % 2 == 0 { 3 } else { 4 };
        }
        let epochs = Epochs::new(info, data, events, -0.2, 100.0).unwrap();

        let stcs = apply_lcmv_epochs(&epochs, &filter).unwrap();
        assert_eq!(stcs.dim(), (4, fwd.n_sources(), 30));
    }

    #[test]
    fn beamformer_peaks_at_the_active_source() {
        // Simulate a single active source through the forward model and
        // check that the reconstructed power peaks at (or next to) it.
        let (_, fwd) = generate_session(&small_cfg()).unwrap();
        let info = grad_info(&fwd);
        let p = fwd.ch_names.len();
        let active = 7usize; // global index in the left hemisphere

        // Sensor pattern of the active source, x-orientation.
        let pattern: Vec<f64> = (0..p).map(|c| fwd.gain[[c, 3 * active]]).collect();

        // Rank-one-plus-identity covariance from that pattern.
        let mut cov_data = Array2::<f64>::zeros((p, p));
        for i in 0..p {
            for j in 0..p {
                cov_data[[i, j]] = pattern[i] * pattern[j];
            }
            cov_data[[i, i]] += 1e-4;
        }
        let cov = Covariance::new(fwd.ch_names.clone(), cov_data, 1000).unwrap();
        let filter = make_lcmv(&info, &fwd, &cov, 0.05, None).unwrap();

        // Project the pattern itself.
        let evoked = Evoked {
            comment: "one source".into(),
            nave: 1,
            ch_names: fwd.ch_names.clone(),
            data: Array2::from_shape_fn((p, 1), |(c, _)| pattern[c]),
            tmin: 0.0,
            sfreq: 100.0,
        };
        let stc = apply_lcmv(&evoked, &filter).unwrap();

        let powers: Vec<f64> = stc.data.column(0).iter().map(|v| v * v).collect();
        let peak = powers
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        // The peak must land on the active source or an immediate
        // neighbour on the cap.
        let d_peak = source_distance(&fwd, active, peak);
        assert!(
            d_peak < 0.03,
            "peak at source {peak}, {d_peak:.4} m from the active source"
        );
    }

    fn source_distance(fwd: &ForwardSolution, a: usize, b: usize) -> f64 {
        let pos = |g: usize| {
            let (space, local) = if g < fwd.lh.n_sources() {
                (&fwd.lh, g)
            } else {
                (&fwd.rh, g - fwd.lh.n_sources())
            };
            [
                space.positions[[local, 0]],
                space.positions[[local, 1]],
                space.positions[[local, 2]],
            ]
        };
        let pa = pos(a);
        let pb = pos(b);
        ((pa[0] - pb[0]).powi(2) + (pa[1] - pb[1]).powi(2) + (pa[2] - pb[2]).powi(2)).sqrt()
    }
}
