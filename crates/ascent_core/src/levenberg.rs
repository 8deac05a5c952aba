use crate::autodiff::{seed_column, Dual};
use crate::traits::Scalar;
use anyhow::{anyhow, bail, Context, Result};
use nalgebra::linalg::SVD;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// A residual function the root finder drives to zero.
///
/// The residual is generic so the solver can evaluate it on dual numbers
/// and read exact Jacobian columns.
pub trait LeastSquaresProblem {
    /// Number of free variables n.
    fn parameter_count(&self) -> usize;

    /// Number of residual entries m.
    fn residual_count(&self) -> usize;

    /// Fill `out` (len m) with the residual at `x` (len n).
    fn residual<T: Scalar>(&self, x: &[T], out: &mut [T]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevenbergSettings {
    /// Jacobian evaluations before giving up. Squared residuals converge
    /// linearly near the root, so this is generous.
    pub max_iterations: usize,
    /// Converged once every residual entry is at most this in magnitude.
    pub tolerance: f64,
    pub initial_damping: f64,
    pub damping_increase: f64,
    pub damping_decrease: f64,
    /// Damping above which the iteration is considered stalled.
    pub max_damping: f64,
    /// Upper bound on the Euclidean length of a single step.
    pub max_step: f64,
}

impl Default for LevenbergSettings {
    fn default() -> Self {
        Self {
            max_iterations: 20_000,
            tolerance: 1e-20,
            initial_damping: 1e-3,
            damping_increase: 10.0,
            damping_decrease: 0.2,
            max_damping: 1e12,
            max_step: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevenbergReport {
    pub converged: bool,
    pub iterations: usize,
    /// Largest residual magnitude at the returned point.
    pub residual_norm: f64,
}

/// Minimizes `½‖f(x)‖²` in place with Levenberg-Marquardt.
///
/// Each step solves the damped system `[J; √λ·D] δ = [-f; 0]` by SVD, with
/// `D` the Marquardt column scaling. Steps that do not reduce the cost raise
/// the damping; accepted steps lower it. Returns `Ok` with `converged = false`
/// when the iteration budget runs out or the damping saturates, and `Err` on
/// a non-finite residual at the starting point or a failed factorization.
pub fn levenberg_marquardt<P: LeastSquaresProblem>(
    problem: &P,
    x: &mut [f64],
    settings: &LevenbergSettings,
) -> Result<LevenbergReport> {
    let n = problem.parameter_count();
    let m = problem.residual_count();
    if x.len() != n {
        bail!(
            "Free variable dimension mismatch. Expected {}, got {}.",
            n,
            x.len()
        );
    }
    if settings.max_iterations == 0 {
        bail!("max_iterations must be greater than zero.");
    }
    if !(settings.tolerance > 0.0) {
        bail!("tolerance must be positive.");
    }

    let mut f = evaluate(problem, x, m).context("Initial residual evaluation failed.")?;
    let mut cost = half_norm_sq(&f);
    let mut lambda = settings.initial_damping;
    let mut iterations = 0usize;

    loop {
        let residual_norm = inf_norm(&f);
        if residual_norm <= settings.tolerance {
            debug!(iterations, residual_norm, "levenberg-marquardt converged");
            return Ok(LevenbergReport {
                converged: true,
                iterations,
                residual_norm,
            });
        }
        if iterations >= settings.max_iterations {
            debug!(iterations, residual_norm, "levenberg-marquardt out of iterations");
            return Ok(LevenbergReport {
                converged: false,
                iterations,
                residual_norm,
            });
        }
        iterations += 1;

        let jacobian = jacobian(problem, x, m)?;
        let scaling = column_scaling(&jacobian);
        let rhs = {
            let mut rhs = DVector::zeros(m + n);
            for i in 0..m {
                rhs[i] = -f[i];
            }
            rhs
        };

        loop {
            let delta = damped_step(&jacobian, &scaling, &rhs, lambda)?;
            let step = clamp_step(delta, settings.max_step);

            let trial: Vec<f64> = x.iter().zip(step.iter()).map(|(a, d)| a + d).collect();
            let accepted = match evaluate(problem, &trial, m) {
                Ok(f_trial) => {
                    let trial_cost = half_norm_sq(&f_trial);
                    if trial_cost < cost {
                        x.copy_from_slice(&trial);
                        f = f_trial;
                        cost = trial_cost;
                        true
                    } else {
                        false
                    }
                }
                Err(err) => {
                    trace!(error = %err, "rejecting step with invalid residual");
                    false
                }
            };

            if accepted {
                lambda = (lambda * settings.damping_decrease).max(f64::MIN_POSITIVE);
                trace!(iterations, cost, lambda, "step accepted");
                break;
            }

            lambda *= settings.damping_increase;
            if lambda > settings.max_damping {
                let residual_norm = inf_norm(&f);
                debug!(iterations, residual_norm, "levenberg-marquardt stalled");
                return Ok(LevenbergReport {
                    converged: false,
                    iterations,
                    residual_norm,
                });
            }
        }
    }
}

fn evaluate<P: LeastSquaresProblem>(problem: &P, x: &[f64], m: usize) -> Result<Vec<f64>> {
    let mut out = vec![0.0; m];
    problem.residual(x, &mut out)?;
    if out.iter().any(|v| !v.is_finite()) {
        bail!("Residual is not finite.");
    }
    Ok(out)
}

/// Exact Jacobian, one dual-number sweep per column.
fn jacobian<P: LeastSquaresProblem>(problem: &P, x: &[f64], m: usize) -> Result<DMatrix<f64>> {
    let n = x.len();
    let mut jac = DMatrix::zeros(m, n);
    let mut out = vec![Dual::constant(0.0); m];
    for j in 0..n {
        let seeded = seed_column(x, j);
        problem.residual(&seeded, &mut out)?;
        for i in 0..m {
            jac[(i, j)] = out[i].eps;
        }
    }
    if jac.iter().any(|v| !v.is_finite()) {
        bail!("Jacobian is not finite.");
    }
    Ok(jac)
}

/// Marquardt scaling `√diag(JᵀJ)`, floored relative to the largest column so
/// columns the residual does not see stay damped.
fn column_scaling(jacobian: &DMatrix<f64>) -> DVector<f64> {
    let norms = DVector::from_iterator(
        jacobian.ncols(),
        jacobian.column_iter().map(|c| c.norm()),
    );
    let floor = norms.max().max(f64::MIN_POSITIVE) * 1e-8;
    norms.map(|v| v.max(floor))
}

fn damped_step(
    jacobian: &DMatrix<f64>,
    scaling: &DVector<f64>,
    rhs: &DVector<f64>,
    lambda: f64,
) -> Result<DVector<f64>> {
    let (m, n) = jacobian.shape();
    let mut augmented = DMatrix::zeros(m + n, n);
    augmented.view_mut((0, 0), (m, n)).copy_from(jacobian);
    let root_lambda = lambda.sqrt();
    for j in 0..n {
        augmented[(m + j, j)] = root_lambda * scaling[j];
    }

    let svd = SVD::new(augmented, true, true);
    let eps = svd.singular_values.max() * 1e-15;
    svd.solve(rhs, eps)
        .map_err(|msg| anyhow!("Failed to solve damped least-squares step: {}", msg))
}

fn clamp_step(step: DVector<f64>, max_step: f64) -> DVector<f64> {
    let len = step.norm();
    if len > max_step {
        step * (max_step / len)
    } else {
        step
    }
}

fn half_norm_sq(values: &[f64]) -> f64 {
    0.5 * values.iter().map(|v| v * v).sum::<f64>()
}

fn inf_norm(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |acc: f64, v| acc.max(v.abs()))
}
