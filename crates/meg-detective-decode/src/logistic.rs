//! L2-regularized logistic regression.
//!
//! Minimizes `0.5·‖w‖² + C·Σᵢ log(1 + exp(−yᵢ(w·xᵢ + b)))` with labels in
//! {−1, +1}; the intercept is not penalized. The solver is plain full-batch
//! gradient descent with a Lipschitz step size and zero initialization, so
//! a fit is a pure function of its inputs — identical data always yields
//! identical weights.

use ndarray::{Array1, Array2};

/// A fitted binary logistic-regression model.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    /// Feature weights.
    pub weights: Array1<f64>,
    /// Intercept term.
    pub intercept: f64,
}

impl LogisticRegression {
    /// Fit on `x` (`[n_samples, n_features]`) with labels `y` in {−1, +1}.
    ///
    /// `c` is the inverse regularization strength; `max_iter` and `tol`
    /// bound the gradient descent (stops early once the gradient norm falls
    /// below `tol`).
    #[must_use]
    pub fn fit(x: &Array2<f64>, y: &[f64], c: f64, max_iter: usize, tol: f64) -> Self {
        let (n, p) = x.dim();
        debug_assert_eq!(n, y.len());

        let mut weights = Array1::<f64>::zeros(p);
        let mut intercept = 0.0;

        // Lipschitz bound of the gradient: the loss curvature is at most
        // C/4 per sample along data directions plus the unit ridge.
        let x_frob2: f64 = x.iter().map(|v| v * v).sum();
        let lipschitz = 0.25 * c * (x_frob2 + n as f64) + 1.0;
        let step = 1.0 / lipschitz;

        for _ in 0..max_iter {
            // residual r_i = −y_i · σ(−y_i z_i)
            let z = x.dot(&weights) + intercept;
            let mut grad_w = weights.clone();
            let mut grad_b = 0.0;
            for i in 0..n {
                let margin = y[i] * z[i];
                let sigma = 1.0 / (1.0 + margin.exp());
                let r = -y[i] * sigma * c;
                grad_b += r;
                for j in 0..p {
                    grad_w[j] += r * x[[i, j]];
                }
            }

            let grad_norm =
                (grad_w.iter().map(|g| g * g).sum::<f64>() + grad_b * grad_b).sqrt();
            if grad_norm < tol {
                break;
            }

            for j in 0..p {
                weights[j] -= step * grad_w[j];
            }
            intercept -= step * grad_b;
        }

        LogisticRegression { weights, intercept }
    }

    /// Signed decision values `w·x + b`; larger means more likely positive.
    #[must_use]
    pub fn decision_function(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.weights) + self.intercept
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
