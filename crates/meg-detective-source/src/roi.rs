//! Region-of-interest determination.
//!
//! Per hemisphere: locate the vertex with the largest summed squared
//! activity over the (already cropped) source estimate, then grow a label
//! outward from that peak along the source-space surface edges until the
//! geodesic extent is exhausted. Ties in the peak search resolve to the
//! first-occurring vertex.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::info;

use meg_detective_core::types::{ForwardSolution, Hemisphere, Label, SourceEstimate};

use crate::{SourceError, SourceResult};

/// Vertex with maximum `Σₜ activity²` in `hemi`, ties to the first index.
///
/// # Errors
///
/// Returns [`SourceError::EmptyHemisphere`] when the estimate carries no
/// vertices for `hemi`.
pub fn find_peak_vertex(stc: &SourceEstimate, hemi: Hemisphere) -> SourceResult<u32> {
    let (vertices, data) = match hemi {
        Hemisphere::Left => (&stc.lh_vertices, stc.lh_data()),
        Hemisphere::Right => (&stc.rh_vertices, stc.rh_data()),
    };
    if vertices.is_empty() {
        return Err(SourceError::EmptyHemisphere { hemi: hemi.short() });
    }

    let mut best = 0usize;
    let mut best_power = f64::MIN;
    for (j, row) in data.rows().into_iter().enumerate() {
        let power: f64 = row.iter().map(|v| v * v).sum();
        if power > best_power {
            best_power = power;
            best = j;
        }
    }
    Ok(vertices[best])
}

/// Dijkstra queue entry ordered by smallest distance first.
struct QueueEntry {
    dist: f64,
    node: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.node == other.node
    }
}
impl Eq for QueueEntry {}
impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap pops the largest, we want the closest.
        other
            .dist
            .partial_cmp(&self.dist)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Grow a label of every vertex within `extent` meters geodesic distance of
/// `seed_vertex`, measured along the source-space surface edges.
///
/// # Errors
///
/// Returns a vertex error when `seed_vertex` is not part of `hemi`'s source
/// space.
pub fn grow_label(
    fwd: &ForwardSolution,
    hemi: Hemisphere,
    seed_vertex: u32,
    extent: f64,
    name: &str,
) -> SourceResult<Label> {
    let space = fwd.hemi(hemi);
    let seed = space.index_of(seed_vertex).ok_or_else(|| {
        SourceError::Data(meg_detective_core::error::DataError::LabelVertexOutOfSpace {
            name: name.to_string(),
            vertex: seed_vertex,
            hemi: hemi.short(),
        })
    })?;

    // Adjacency with Euclidean edge lengths.
    let n = space.n_sources();
    let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    for e in &space.edges {
        let (a, b) = (e[0] as usize, e[1] as usize);
        let mut d2 = 0.0;
        for k in 0..3 {
            let d = space.positions[[a, k]] - space.positions[[b, k]];
            d2 += d * d;
        }
        let d = d2.sqrt();
        adjacency[a].push((b, d));
        adjacency[b].push((a, d));
    }

    // Dijkstra from the seed, bounded by the extent.
    let mut dist = vec![f64::INFINITY; n];
    dist[seed] = 0.0;
    let mut heap = BinaryHeap::new();
    heap.push(QueueEntry { dist: 0.0, node: seed });
    while let Some(QueueEntry { dist: d, node }) = heap.pop() {
        if d > dist[node] {
            continue;
        }
        for &(next, w) in &adjacency[node] {
            let nd = d + w;
            if nd < dist[next] && nd <= extent + 1e-12 {
                dist[next] = nd;
                heap.push(QueueEntry { dist: nd, node: next });
            }
        }
    }

    let members: Vec<u32> = (0..n)
        .filter(|&j| dist[j] <= extent + 1e-12)
        .map(|j| space.vertices[j])
        .collect();

    info!(
        "grew {} label `{}` to {} vertices (extent {:.0} mm)",
        hemi.short(),
        name,
        members.len(),
        extent * 1000.0
    );

    Ok(Label::new(hemi, members, name)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use meg_detective_core::synthetic::{generate_forward, SyntheticConfig};
    use ndarray::Array2;

    fn forward() -> ForwardSolution {
        generate_forward(&SyntheticConfig {
            n_grad: 8,
            sources_per_hemi: 16,
            ..SyntheticConfig::default()
        })
        .unwrap()
    }

    fn stc_with_peak(fwd: &ForwardSolution, lh_peak: usize, rh_peak: usize) -> SourceEstimate {
        let n = fwd.n_sources();
        let mut data = Array2::<f64>::zeros((n, 5));
        data[[lh_peak, 2]] = 10.0;
        data[[fwd.lh.n_sources() + rh_peak, 3]] = -12.0;
        SourceEstimate::new(
            fwd.lh.vertices.clone(),
            fwd.rh.vertices.clone(),
            data,
            0.04,
            0.01,
        )
        .unwrap()
    }

    #[test]
    fn peak_is_found_per_hemisphere() {
        let fwd = forward();
        let stc = stc_with_peak(&fwd, 5, 9);
        assert_eq!(
            find_peak_vertex(&stc, Hemisphere::Left).unwrap(),
            fwd.lh.vertices[5]
        );
        assert_eq!(
            find_peak_vertex(&stc, Hemisphere::Right).unwrap(),
            fwd.rh.vertices[9]
        );
    }

    #[test]
    fn peak_uses_squared_activity() {
        // A large negative deflection must win over a small positive one.
        let fwd = forward();
        let n = fwd.n_sources();
        let mut data = Array2::<f64>::zeros((n, 3));
        data[[1, 0]] = 2.0;
        data[[3, 0]] = -5.0;
        let stc = SourceEstimate::new(
            fwd.lh.vertices.clone(),
            fwd.rh.vertices.clone(),
            data,
            0.0,
            0.01,
        )
        .unwrap();
        assert_eq!(
            find_peak_vertex(&stc, Hemisphere::Left).unwrap(),
            fwd.lh.vertices[3]
        );
    }

    #[test]
    fn tie_resolves_to_first_vertex() {
        let fwd = forward();
        let n = fwd.n_sources();
        let mut data = Array2::<f64>::zeros((n, 2));
        data[[2, 0]] = 3.0;
        data[[6, 0]] = 3.0;
        let stc = SourceEstimate::new(
            fwd.lh.vertices.clone(),
            fwd.rh.vertices.clone(),
            data,
            0.0,
            0.01,
        )
        .unwrap();
        assert_eq!(
            find_peak_vertex(&stc, Hemisphere::Left).unwrap(),
            fwd.lh.vertices[2]
        );
    }

    #[test]
    fn grown_label_contains_seed_and_stays_in_hemisphere() {
        let fwd = forward();
        let seed = fwd.lh.vertices[4];
        let label = grow_label(&fwd, Hemisphere::Left, seed, 0.02, "roi-lh").unwrap();

        assert!(label.vertices.contains(&seed));
        assert!(!label.is_empty());
        assert!(label.validate_in(&fwd.lh).is_ok());
    }

    #[test]
    fn zero_extent_yields_seed_only() {
        let fwd = forward();
        let seed = fwd.rh.vertices[0];
        let label = grow_label(&fwd, Hemisphere::Right, seed, 1e-9, "roi-rh").unwrap();
        assert_eq!(label.vertices, vec![seed]);
    }

    #[test]
    fn larger_extent_grows_monotonically() {
        let fwd = forward();
        let seed = fwd.lh.vertices[4];
        let small = grow_label(&fwd, Hemisphere::Left, seed, 0.01, "s").unwrap();
        let large = grow_label(&fwd, Hemisphere::Left, seed, 0.05, "l").unwrap();
        assert!(large.len() >= small.len());
        for v in &small.vertices {
            assert!(large.vertices.contains(v));
        }
    }

    #[test]
    fn members_respect_the_geodesic_bound() {
        let fwd = forward();
        let seed = fwd.lh.vertices[4];
        let extent = 0.02;
        let label = grow_label(&fwd, Hemisphere::Left, seed, extent, "roi").unwrap();

        // Straight-line distance can never exceed the geodesic distance.
        let space = &fwd.lh;
        let si = space.index_of(seed).unwrap();
        for &v in &label.vertices {
            let j = space.index_of(v).unwrap();
            let mut d2 = 0.0;
            for k in 0..3 {
                let d = space.positions[[j, k]] - space.positions[[si, k]];
                d2 += d * d;
            }
            assert!(
                d2.sqrt() <= extent + 1e-9,
                "vertex {v} lies {:.4} m from the seed",
                d2.sqrt()
            );
        }
    }

    #[test]
    fn unknown_seed_is_rejected() {
        let fwd = forward();
        let err = grow_label(&fwd, Hemisphere::Left, 9999, 0.02, "bad");
        assert!(err.is_err());
    }
}
