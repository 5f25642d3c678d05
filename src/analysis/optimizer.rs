/// Nonlinear least-squares fitting behind a minimal optimizer interface.
///
/// The infiltration search only needs "fit this model to these points and
/// give me parameters or a failure", so that is all `Optimizer` exposes.
/// `LevenbergMarquardt` is the stock implementation; the search is generic
/// over the trait so a different solver can be dropped in.

use thiserror::Error;

/// A parametric curve `y = f(t; p)` with an analytic gradient in `p`.
pub trait Model: Send + Sync {
    fn parameter_count(&self) -> usize;

    fn value(&self, t: f64, params: &[f64]) -> f64;

    /// Writes `∂f/∂p_j` at `t` into `gradient`.
    fn gradient(&self, t: f64, params: &[f64], gradient: &mut [f64]);
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("fit needs at least {needed} points, got {got}")]
    TooFewPoints { needed: usize, got: usize },

    #[error("no convergence after {0} iterations")]
    NotConverged(usize),

    #[error("non-finite residual or parameter")]
    NonFinite,
}

pub trait Optimizer: Send + Sync {
    /// Minimises the sum of squared residuals of `model` over `(t, y)`
    /// starting from `initial`.
    fn fit(&self, model: &dyn Model, t: &[f64], y: &[f64], initial: &[f64]) -> Result<Vec<f64>, FitError>;
}

// ---------------------------------------------------------------------------
// Exponential decay
// ---------------------------------------------------------------------------

/// `y = y0·exp(−k·t) + c`, parameters `[y0, k, c]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialDecay;

impl Model for ExponentialDecay {
    fn parameter_count(&self) -> usize {
        3
    }

    fn value(&self, t: f64, params: &[f64]) -> f64 {
        params[0] * (-params[1] * t).exp() + params[2]
    }

    fn gradient(&self, t: f64, params: &[f64], gradient: &mut [f64]) {
        let decay = (-params[1] * t).exp();
        gradient[0] = decay;
        gradient[1] = -params[0] * t * decay;
        gradient[2] = 1.0;
    }
}

// ---------------------------------------------------------------------------
// Levenberg–Marquardt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    pub max_iterations: usize,
    /// Relative change in cost (and in parameters) treated as converged.
    pub tolerance: f64,
    pub initial_damping: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-10,
            initial_damping: 1e-3,
        }
    }
}

const MAX_DAMPING: f64 = 1e12;

fn sum_of_squares(model: &dyn Model, t: &[f64], y: &[f64], params: &[f64]) -> f64 {
    t.iter()
        .zip(y)
        .map(|(&ti, &yi)| {
            let r = yi - model.value(ti, params);
            r * r
        })
        .sum()
}

impl Optimizer for LevenbergMarquardt {
    fn fit(&self, model: &dyn Model, t: &[f64], y: &[f64], initial: &[f64]) -> Result<Vec<f64>, FitError> {
        let n = model.parameter_count();
        if t.len() < n || y.len() != t.len() {
            return Err(FitError::TooFewPoints { needed: n, got: t.len().min(y.len()) });
        }

        let mut params = initial.to_vec();
        let mut cost = sum_of_squares(model, t, y, &params);
        if !cost.is_finite() {
            return Err(FitError::NonFinite);
        }

        let mut damping = self.initial_damping;
        let mut grad = vec![0.0; n];
        let mut jtj = vec![0.0; n * n];
        let mut jtr = vec![0.0; n];

        for _ in 0..self.max_iterations {
            if cost == 0.0 {
                return Ok(params);
            }

            // Normal equations J^T J and J^T r at the current point.
            jtj.iter_mut().for_each(|v| *v = 0.0);
            jtr.iter_mut().for_each(|v| *v = 0.0);
            for (&ti, &yi) in t.iter().zip(y) {
                let r = yi - model.value(ti, &params);
                model.gradient(ti, &params, &mut grad);
                for a in 0..n {
                    jtr[a] += grad[a] * r;
                    for b in 0..n {
                        jtj[a * n + b] += grad[a] * grad[b];
                    }
                }
            }

            // Raise damping until a step lowers the cost.
            loop {
                let mut system = jtj.clone();
                for a in 0..n {
                    let diag = jtj[a * n + a];
                    system[a * n + a] += damping * if diag > 0.0 { diag } else { 1.0 };
                }

                if let Some(step) = solve(&mut system, &jtr, n) {
                    let candidate: Vec<f64> = params.iter().zip(&step).map(|(p, d)| p + d).collect();
                    let candidate_cost = sum_of_squares(model, t, y, &candidate);

                    if candidate_cost.is_finite() && candidate_cost < cost {
                        let cost_change = cost - candidate_cost;
                        let step_norm = step.iter().map(|d| d * d).sum::<f64>().sqrt();
                        let param_norm = candidate.iter().map(|p| p * p).sum::<f64>().sqrt();

                        params = candidate;
                        cost = candidate_cost;
                        damping = (damping / 10.0).max(1e-15);

                        if cost_change <= self.tolerance * cost
                            || step_norm <= self.tolerance * (param_norm + self.tolerance)
                        {
                            return Ok(params);
                        }
                        break;
                    }
                }

                damping *= 10.0;
                if damping > MAX_DAMPING {
                    // No downhill step left: we are at a minimum.
                    return if params.iter().all(|p| p.is_finite()) {
                        Ok(params)
                    } else {
                        Err(FitError::NonFinite)
                    };
                }
            }
        }

        Err(FitError::NotConverged(self.max_iterations))
    }
}

/// Solves `a·x = b` for a small dense `n×n` system by Gaussian elimination
/// with partial pivoting. `None` if the matrix is singular.
fn solve(a: &mut [f64], b: &[f64], n: usize) -> Option<Vec<f64>> {
    let mut x = b.to_vec();

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i * n + col].abs().total_cmp(&a[j * n + col].abs()))?;
        if a[pivot * n + col].abs() < 1e-300 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap(col * n + k, pivot * n + k);
            }
            x.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[row * n + col] / a[col * n + col];
            for k in col..n {
                a[row * n + k] -= factor * a[col * n + k];
            }
            x[row] -= factor * x[col];
        }
    }

    for col in (0..n).rev() {
        let tail: f64 = (col + 1..n).map(|k| a[col * n + k] * x[k]).sum();
        x[col] = (x[col] - tail) / a[col * n + col];
    }

    x.iter().all(|v| v.is_finite()).then_some(x)
}
