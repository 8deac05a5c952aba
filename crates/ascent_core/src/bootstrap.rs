//! Cold-start initial guess built stage by stage.
//!
//! An i-arc converged trajectory is a good start for the (i+1)-arc problem
//! once the new arc's block is filled with the state at the end of the
//! i-arc solution, so the guess is grown one arc at a time.

use crate::arc::NormalizedArc;
use crate::dynamics::BLOCK;
use crate::levenberg::LevenbergSettings;
use crate::problem::{free_variable_len, PontryaginProblem, TrajectoryModel};
use anyhow::{bail, Context, Result};
use tracing::debug;

/// Ideal-rocket burn time (s) for `dv` on the given arc.
pub fn rocket_equation_burn_time(arc: &NormalizedArc, dv: f64) -> f64 {
    let ve = arc.source.exhaust_velocity();
    ve * arc.source.m0 / arc.source.thrust * (1.0 - (-dv / ve).exp())
}

/// Builds a free-variable vector for all of `arcs`.
///
/// Every sub-problem on `arcs[..i]` must converge; a failure aborts the
/// bootstrap rather than handing a degraded guess to the full problem.
pub fn bootstrap<M: TrajectoryModel>(
    problem: &PontryaginProblem,
    model: &M,
    arcs: &[NormalizedArc],
    settings: &LevenbergSettings,
) -> Result<Vec<f64>> {
    let Some(first) = arcs.first() else {
        bail!("Cannot bootstrap without arcs.");
    };
    if !(problem.dv.is_finite() && problem.dv > 0.0) {
        bail!("Delta-v estimate must be positive, got {}.", problem.dv);
    }

    let a = model.arc_index();
    let tgo = rocket_equation_burn_time(first, problem.dv);
    let tgo_bar = tgo / problem.scaling.t_scale;
    debug!(dv = problem.dv, tgo, tgo_bar, "bootstrap burn time estimate");

    let mut y = model.seed_parameters(tgo_bar);
    if y.len() != a {
        bail!(
            "Model seeded {} parameters but declares {}.",
            y.len(),
            a
        );
    }
    y.resize(free_variable_len(a, 1), 0.0);
    problem.update_y0_arc(&mut y, arcs, a, 0);

    for i in 1..arcs.len() {
        let subarcs = &arcs[..i];
        debug!(arcs = i, y0 = ?y, "solving bootstrap sub-problem");
        let report = problem
            .run_optimizer(model, subarcs, &mut y, settings)
            .with_context(|| format!("Bootstrap sub-problem with {} arc(s) failed.", i))?;
        if !report.converged {
            bail!(
                "Bootstrap sub-problem with {} arc(s) did not converge (residual {:e} after {} iterations).",
                i,
                report.residual_norm,
                report.iterations
            );
        }
        let tgo_bar = model.final_burn_time(&y);
        if tgo_bar < 0.0 {
            bail!(
                "Bootstrap sub-problem with {} arc(s) converged to a negative burn time {:e}.",
                i,
                tgo_bar
            );
        }

        let sol = problem.multiple_integrate(model, subarcs, &y, 0.0)?;
        let end = sol.state_bar(sol.tmax());

        y.resize(free_variable_len(a, i + 1), 0.0);
        let base = a + BLOCK * i;
        y[base..base + BLOCK].copy_from_slice(&end);
    }

    debug!(y0 = ?y, "bootstrap complete");
    Ok(y)
}
