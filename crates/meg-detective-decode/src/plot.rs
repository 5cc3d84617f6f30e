//! Decoding performance figure.
//!
//! One SVG: mean cross-validated ROC-AUC against epoch time, with the
//! stimulus onset marked by a dashed vertical line and chance level by a
//! horizontal line at 0.5. The y-range is fixed to 0.3–1.0 so figures from
//! different runs are directly comparable.

use plotters::prelude::*;
use std::path::Path;
use tracing::info;

use crate::{DecodeError, DecodeResult};

/// Fixed y-axis range of the performance figure.
const Y_RANGE: (f64, f64) = (0.3, 1.0);

fn plot_err<E: std::fmt::Display>(e: E) -> DecodeError {
    DecodeError::Plot { message: e.to_string() }
}

/// Render the performance-over-time figure to `path` (SVG).
///
/// `times` and `mean_scores` must have equal length; `title` becomes the
/// figure caption.
pub fn plot_performance(
    path: &Path,
    times: &[f64],
    mean_scores: &[f64],
    title: &str,
) -> DecodeResult<()> {
    if times.len() != mean_scores.len() || times.is_empty() {
        return Err(DecodeError::ShapeMismatch {
            message: format!(
                "{} times vs {} scores",
                times.len(),
                mean_scores.len()
            ),
        });
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(plot_err)?;
        }
    }

    let t0 = times[0];
    let t1 = times[times.len() - 1];

    let root = SVGBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(45)
        .y_label_area_size(55)
        .build_cartesian_2d(t0..t1, Y_RANGE.0..Y_RANGE.1)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Time (s)")
        .y_desc("Performance (ROC-AUC)")
        .draw()
        .map_err(plot_err)?;

    // Chance level.
    chart
        .draw_series(LineSeries::new([(t0, 0.5), (t1, 0.5)], &BLACK))
        .map_err(plot_err)?;

    // Dashed stimulus-onset marker at t = 0, if it is in range.
    if t0 <= 0.0 && t1 >= 0.0 {
        let n_dashes = 14;
        let span = (Y_RANGE.1 - Y_RANGE.0) / (2 * n_dashes) as f64;
        for d in 0..n_dashes {
            let y_start = Y_RANGE.0 + (2 * d) as f64 * span;
            chart
                .draw_series(LineSeries::new(
                    [(0.0, y_start), (0.0, y_start + span)],
                    &BLACK,
                ))
                .map_err(plot_err)?;
        }
    }

    // The score curve itself.
    chart
        .draw_series(LineSeries::new(
            times.iter().copied().zip(mean_scores.iter().copied()),
            &BLUE,
        ))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    info!("wrote performance figure {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn figure_is_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.svg");
        let times: Vec<f64> = (0..71).map(|k| -0.2 + k as f64 * 0.01).collect();
        let scores: Vec<f64> = times
            .iter()
            .map(|&t| 0.5 + 0.3 * (-(t - 0.1) * (t - 0.1) / 0.002).exp())
            .collect();

        plot_performance(&path, &times, &scores, "Decoding left vs. right").unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"), "not an SVG file");
        assert!(svg.len() > 500);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.svg");
        let err = plot_performance(&path, &[0.0, 0.1], &[0.5], "bad");
        assert!(matches!(err, Err(DecodeError::ShapeMismatch { .. })));
    }

    #[test]
    fn empty_input_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.svg");
        assert!(plot_performance(&path, &[], &[], "empty").is_err());
    }
}
