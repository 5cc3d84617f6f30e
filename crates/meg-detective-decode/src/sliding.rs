//! Sliding-window decoding with cross-validated ROC-AUC scoring.
//!
//! One classifier is trained per time sample on that sample's feature
//! columns only, measuring how condition discriminability evolves over the
//! epoch. Scoring is the area under the ROC curve, evaluated with
//! stratified unshuffled k-fold cross-validation (per-class contiguous fold
//! assignment, so the split is a pure function of the label sequence).

use ndarray::{Array2, Array3, Axis};
use tracing::info;

use crate::logistic::LogisticRegression;
use crate::{DecodeError, DecodeResult};

// ---------------------------------------------------------------------------
// Cross-validation folds
// ---------------------------------------------------------------------------

/// Stratified unshuffled fold assignment.
///
/// Per class, trials are split (in order of appearance) into `n_folds`
/// contiguous chunks of near-equal size; fold `k`'s test set is the union
/// of every class's `k`-th chunk, sorted by trial index.
///
/// # Errors
///
/// Returns [`DecodeError::TooFewTrials`] when the smallest class has fewer
/// trials than folds.
pub fn stratified_folds(y: &[i32], n_folds: usize) -> DecodeResult<Vec<Vec<usize>>> {
    let mut classes: Vec<i32> = y.to_vec();
    classes.sort_unstable();
    classes.dedup();

    let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_folds];
    for class in classes {
        let indices: Vec<usize> =
            (0..y.len()).filter(|&i| y[i] == class).collect();
        if indices.len() < n_folds {
            return Err(DecodeError::TooFewTrials {
                smallest: indices.len(),
                n_folds,
            });
        }
        let base = indices.len() / n_folds;
        let remainder = indices.len() % n_folds;
        let mut cursor = 0;
        for (k, fold) in folds.iter_mut().enumerate() {
            let take = base + usize::from(k < remainder);
            fold.extend_from_slice(&indices[cursor..cursor + take]);
            cursor += take;
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    Ok(folds)
}

// ---------------------------------------------------------------------------
// ROC-AUC
// ---------------------------------------------------------------------------

/// Area under the ROC curve via the rank-sum formulation with tie-averaged
/// ranks. `positive` names the class treated as positive.
///
/// # Errors
///
/// Returns [`DecodeError::DegenerateClasses`] when either class is absent.
pub fn roc_auc(scores: &[f64], y: &[i32], positive: i32) -> DecodeResult<f64> {
    let n = scores.len();
    let n_pos = y.iter().filter(|&&c| c == positive).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        let mut found: Vec<i32> = y.to_vec();
        found.sort_unstable();
        found.dedup();
        return Err(DecodeError::DegenerateClasses { found });
    }

    // Average ranks (1-based), ties share the mean rank of their run.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let mean_rank = (i + j + 2) as f64 / 2.0; // 1-based average
        for &idx in &order[i..=j] {
            ranks[idx] = mean_rank;
        }
        i = j + 1;
    }

    let rank_sum_pos: f64 = (0..n)
        .filter(|&i| y[i] == positive)
        .map(|i| ranks[i])
        .sum();
    let auc = (rank_sum_pos - (n_pos * (n_pos + 1)) as f64 / 2.0)
        / (n_pos as f64 * n_neg as f64);
    Ok(auc)
}

// ---------------------------------------------------------------------------
// Sliding decoder
// ---------------------------------------------------------------------------

/// Configuration of the sliding-window decoder.
#[derive(Debug, Clone)]
pub struct SlidingDecoder {
    /// Inverse L2 regularization strength of the per-sample classifier.
    pub c: f64,
    /// Maximum solver iterations per fit.
    pub max_iter: usize,
    /// Solver convergence tolerance.
    pub tol: f64,
    /// Number of cross-validation folds.
    pub n_folds: usize,
}

impl SlidingDecoder {
    /// Cross-validated ROC-AUC per fold and time sample.
    ///
    /// `x` is the z-scored feature tensor `[n_trials, n_features, n_times]`
    /// and `y` the per-trial condition codes (exactly two distinct values;
    /// the larger code is the positive class). Returns scores of shape
    /// `[n_folds, n_times]`.
    pub fn cross_val_scores(&self, x: &Array3<f64>, y: &[i32]) -> DecodeResult<Array2<f64>> {
        let (n_trials, _, n_times) = x.dim();
        if n_trials != y.len() {
            return Err(DecodeError::ShapeMismatch {
                message: format!("{n_trials} trials vs {} labels", y.len()),
            });
        }
        let mut classes: Vec<i32> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() != 2 {
            return Err(DecodeError::DegenerateClasses { found: classes });
        }
        let positive = classes[1];

        let folds = stratified_folds(y, self.n_folds)?;
        let mut scores = Array2::<f64>::zeros((self.n_folds, n_times));

        for t in 0..n_times {
            let xt = x.index_axis(Axis(2), t);
            for (k, test) in folds.iter().enumerate() {
                let train: Vec<usize> =
                    (0..n_trials).filter(|i| !test.contains(i)).collect();

                let x_train = xt.select(Axis(0), &train);
                let y_train: Vec<f64> = train
                    .iter()
                    .map(|&i| if y[i] == positive { 1.0 } else { -1.0 })
                    .collect();
                let model =
                    LogisticRegression::fit(&x_train, &y_train, self.c, self.max_iter, self.tol);

                let x_test = xt.select(Axis(0), test);
                let y_test: Vec<i32> = test.iter().map(|&i| y[i]).collect();
                let decision = model.decision_function(&x_test);
                scores[[k, t]] = roc_auc(decision.as_slice().unwrap_or(&[]), &y_test, positive)?;
            }
        }

        info!(
            "sliding decoder: {} folds x {} times scored",
            self.n_folds, n_times
        );
        Ok(scores)
    }
}

/// Convenience wrapper: cross-validated scores with the given decoder
/// settings, averaged over folds.
pub fn cross_val_scores(
    x: &Array3<f64>,
    y: &[i32],
    decoder: &SlidingDecoder,
) -> DecodeResult<Vec<f64>> {
    let scores = decoder.cross_val_scores(x, y)?;
    let n_folds = scores.nrows() as f64;
    Ok(scores
        .columns()
        .into_iter()
        .map(|col| col.sum() / n_folds)
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
