//! Guidance-cycle entry point.
//!
//! [`AscentGuidance`] owns the free-variable vector between cycles. Each call
//! to [`AscentGuidance::optimize`] reconciles that vector with the current arc
//! list, cold-starts it through the stage bootstrapper when absent, solves the
//! full problem and publishes the sampled trajectory.

use crate::arc::{normalize_arcs, Arc, NormalizedArc};
use crate::bootstrap::bootstrap;
use crate::boundary::TerminalTarget;
use crate::launch::LaunchModel;
use crate::levenberg::LevenbergSettings;
use crate::problem::{free_variable_len, IntegrationSettings, PontryaginProblem, TrajectoryModel};
use crate::solution::Solution;
use anyhow::Result;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GuidanceSettings {
    pub levenberg: LevenbergSettings,
    pub integration: IntegrationSettings,
}

/// Why a guidance cycle produced no solution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailureReason {
    #[error("invalid arc list: {0}")]
    InvalidArcs(String),
    #[error("stage bootstrap failed: {0}")]
    BootstrapFailed(String),
    #[error("solver did not converge (residual {residual_norm:e} after {iterations} iterations)")]
    NotConverged { iterations: usize, residual_norm: f64 },
    #[error("converged to a negative final burn time {0}")]
    NegativeBurnTime(f64),
    #[error("numerical failure: {0}")]
    Numerical(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptimizationOutcome {
    Success(Solution),
    Failure(FailureReason),
}

impl OptimizationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Brings a stored free-variable vector in line with the required length.
///
/// A longer vector is truncated, keeping the solver parameters and the
/// leading arc blocks. Any other mismatch discards it.
pub fn reconcile_free_variables(y0: Option<Vec<f64>>, required: usize) -> Option<Vec<f64>> {
    let mut y = y0?;
    if y.len() > required {
        debug!(from = y.len(), to = required, "truncating free variables");
        y.truncate(required);
    } else if y.len() < required {
        debug!(len = y.len(), required, "discarding free variables");
        return None;
    }
    Some(y)
}

pub struct AscentGuidance<M: TrajectoryModel> {
    problem: PontryaginProblem,
    model: M,
    arcs: Vec<Arc>,
    settings: GuidanceSettings,
    y0: Option<Vec<f64>>,
    solution: Option<Solution>,
    initializing: bool,
    bootstraps: usize,
}

impl<M: TrajectoryModel> AscentGuidance<M> {
    pub fn new(problem: PontryaginProblem, model: M, arcs: Vec<Arc>, settings: GuidanceSettings) -> Self {
        Self {
            problem: problem.with_integration(settings.integration),
            model,
            arcs,
            settings,
            y0: None,
            solution: None,
            initializing: false,
            bootstraps: 0,
        }
    }

    pub fn problem(&self) -> &PontryaginProblem {
        &self.problem
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    pub fn settings(&self) -> &GuidanceSettings {
        &self.settings
    }

    /// The last published trajectory.
    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    pub fn free_variables(&self) -> Option<&[f64]> {
        self.y0.as_deref()
    }

    /// Installs a warm-start vector; it is reconciled on the next cycle.
    pub fn set_free_variables(&mut self, y0: Vec<f64>) {
        self.y0 = Some(y0);
    }

    pub fn clear_free_variables(&mut self) {
        self.y0 = None;
    }

    /// True from the start of a cold start until a full solve converges.
    pub fn is_initializing(&self) -> bool {
        self.initializing
    }

    /// Number of cold starts run so far.
    pub fn bootstraps(&self) -> usize {
        self.bootstraps
    }

    /// Live position (m) and velocity (m/s); canonical units stay fixed.
    pub fn update_vehicle_state(&mut self, r0: Vector3<f64>, v0: Vector3<f64>) {
        self.problem.r0 = r0;
        self.problem.v0 = v0;
    }

    pub fn set_costate_guess(&mut self, pv0: Vector3<f64>, pr0: Vector3<f64>) {
        self.problem.pv0 = pv0;
        self.problem.pr0 = pr0;
    }

    pub fn set_delta_v(&mut self, dv: f64) {
        self.problem.dv = dv;
    }

    /// Replaces the stage list; the free variables are reconciled against it
    /// on the next cycle.
    pub fn set_arcs(&mut self, arcs: Vec<Arc>) {
        self.arcs = arcs;
    }

    fn normalized_arcs(&self) -> Result<Vec<NormalizedArc>> {
        normalize_arcs(&self.arcs, &self.problem.scaling)
    }

    fn cold_start(&mut self, arcs: &[NormalizedArc]) -> Result<Vec<f64>> {
        self.initializing = true;
        self.bootstraps += 1;
        info!(arcs = arcs.len(), "bootstrapping initial guess");
        bootstrap(&self.problem, &self.model, arcs, &self.settings.levenberg)
    }

    /// Runs the stage bootstrapper and stores its result as the guess for
    /// the next cycle.
    pub fn bootstrap(&mut self) -> Result<()> {
        let arcs = self.normalized_arcs()?;
        let y = self.cold_start(&arcs)?;
        self.y0 = Some(y);
        Ok(())
    }

    /// One guidance cycle anchored at absolute time `t0`.
    ///
    /// Never panics or returns an error: every failure discards the stored
    /// free variables, so the next cycle cold-starts, and is reported as
    /// [`OptimizationOutcome::Failure`].
    pub fn optimize(&mut self, t0: f64) -> OptimizationOutcome {
        match self.run_cycle(t0) {
            Ok(solution) => {
                info!(
                    t0,
                    tf = solution.tf(),
                    arcs = solution.arc_count(),
                    "guidance solution published"
                );
                self.solution = Some(solution.clone());
                OptimizationOutcome::Success(solution)
            }
            Err(reason) => {
                warn!(%reason, "guidance cycle failed");
                self.y0 = None;
                OptimizationOutcome::Failure(reason)
            }
        }
    }

    fn run_cycle(&mut self, t0: f64) -> Result<Solution, FailureReason> {
        let arcs = self
            .normalized_arcs()
            .map_err(|err| FailureReason::InvalidArcs(format!("{err:#}")))?;

        let required = free_variable_len(self.model.arc_index(), arcs.len());
        let mut y = match reconcile_free_variables(self.y0.take(), required) {
            Some(mut y) => {
                self.problem.update_y0_arc(&mut y, &arcs, self.model.arc_index(), 0);
                y
            }
            None => self
                .cold_start(&arcs)
                .map_err(|err| FailureReason::BootstrapFailed(format!("{err:#}")))?,
        };

        debug!(arcs = arcs.len(), y0 = ?y, "solving full problem");
        let report = self
            .problem
            .run_optimizer(&self.model, &arcs, &mut y, &self.settings.levenberg)
            .map_err(|err| FailureReason::Numerical(format!("{err:#}")))?;
        if !report.converged {
            return Err(FailureReason::NotConverged {
                iterations: report.iterations,
                residual_norm: report.residual_norm,
            });
        }

        let tgo_bar = self.model.final_burn_time(&y);
        if tgo_bar < 0.0 {
            return Err(FailureReason::NegativeBurnTime(tgo_bar * self.problem.scaling.t_scale));
        }

        let solution = self
            .problem
            .multiple_integrate(&self.model, &arcs, &y, t0)
            .map_err(|err| FailureReason::Numerical(format!("{err:#}")))?;
        debug!(iterations = report.iterations, tgo_bar, "full problem converged");
        self.y0 = Some(y);
        self.initializing = false;
        Ok(solution)
    }
}

impl AscentGuidance<LaunchModel> {
    /// Replaces the insertion target. The stored free variables stay as the
    /// guess for the next cycle.
    pub fn configure_terminal_constraints(
        &mut self,
        radius: f64,
        speed: f64,
        flight_path_angle: f64,
        inclination: f64,
    ) {
        self.model.target = TerminalTarget::new(radius, speed, flight_path_angle, inclination);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::BLOCK;
    use crate::launch::LAUNCH_ARC_INDEX;
    use crate::scaling::Scaling;
    use crate::traits::{constant, Scalar};

    /// Free terminal state; the only extra condition pins the final burn time
    /// (squared, as the launch residuals are).
    struct FixedBurnTime {
        burn_time: f64,
    }

    impl TrajectoryModel for FixedBurnTime {
        fn arc_index(&self) -> usize {
            1
        }

        fn extra_residuals(&self) -> usize {
            1
        }

        fn boundary_residual<T: Scalar>(&self, _scaling: &Scaling, _terminal: &[T], out: &mut [T]) {
            for v in out.iter_mut() {
                *v = T::zero();
            }
        }

        fn complete_residual<T: Scalar>(&self, y: &[T], num_arcs: usize, z: &mut [T]) {
            let miss = y[0] - constant::<T>(self.burn_time);
            z[BLOCK * num_arcs] = miss * miss;
        }

        fn seed_parameters(&self, tgo_bar: f64) -> Vec<f64> {
            vec![tgo_bar]
        }
    }

    const MU: f64 = 3.986004418e14;
    const RADIUS: f64 = 6.571e6;

    fn inclination() -> f64 {
        28.5_f64.to_radians()
    }

    fn vehicle() -> (Vector3<f64>, Vector3<f64>) {
        let inc = 28.3_f64.to_radians();
        let gamma = 0.3_f64.to_radians();
        let e1 = Vector3::x();
        let e2 = Vector3::new(0.0, inc.cos(), inc.sin());
        (e1 * 6.566e6, (e1 * gamma.sin() + e2 * gamma.cos()) * 7250.0)
    }

    fn guidance(arcs: Vec<Arc>) -> AscentGuidance<LaunchModel> {
        let (r0, v0) = vehicle();
        let problem =
            PontryaginProblem::new(MU, r0, v0, Vector3::zeros(), Vector3::zeros(), 560.0, 1.2e4)
                .expect("problem");
        let model = LaunchModel::new(TerminalTarget::circular(MU, RADIUS, inclination()));
        AscentGuidance::new(problem, model, arcs, GuidanceSettings::default())
    }

    fn single_stage() -> Vec<Arc> {
        vec![Arc::new(320.0, 1.2e5, 1.2e4, 200.0)]
    }

    fn expect_success(outcome: OptimizationOutcome) -> Solution {
        match outcome {
            OptimizationOutcome::Success(sol) => sol,
            OptimizationOutcome::Failure(reason) => panic!("guidance failed: {reason}"),
        }
    }

    fn assert_rel(actual: f64, expected: f64, tol: f64) {
        let rel = ((actual - expected) / expected).abs();
        assert!(rel < tol, "expected {expected}, got {actual} (rel {rel:e})");
    }

    #[test]
    fn reconcile_truncates_longer_vectors() {
        let y: Vec<f64> = (0..LAUNCH_ARC_INDEX + 2 * BLOCK).map(|i| i as f64).collect();
        let kept = reconcile_free_variables(Some(y.clone()), LAUNCH_ARC_INDEX + BLOCK)
            .expect("truncated");
        assert_eq!(kept, y[..LAUNCH_ARC_INDEX + BLOCK].to_vec());
    }

    #[test]
    fn reconcile_discards_shorter_vectors_and_keeps_exact_ones() {
        let y = vec![1.0; LAUNCH_ARC_INDEX + BLOCK];
        assert!(reconcile_free_variables(Some(y.clone()), LAUNCH_ARC_INDEX + 2 * BLOCK).is_none());
        assert_eq!(reconcile_free_variables(Some(y.clone()), y.len()), Some(y));
        assert!(reconcile_free_variables(None, 16).is_none());
    }

    #[test]
    fn single_stage_reaches_circular_target() {
        let mut g = guidance(single_stage());
        let sol = expect_success(g.optimize(100.0));
        assert_eq!(g.bootstraps(), 1);
        assert!(!g.is_initializing());

        let y = g.free_variables().expect("stored");
        assert_eq!(y.len(), LAUNCH_ARC_INDEX + BLOCK);
        assert!(y[0] > 0.0);

        let tf = sol.tf();
        assert!(tf > 100.0);
        assert_rel(sol.r(tf).norm(), RADIUS, 1e-6);
        assert_rel(sol.v(tf).norm(), (MU / RADIUS).sqrt(), 1e-6);

        // circular insertion in the requested plane
        let r = sol.r(tf);
        let v = sol.v(tf);
        assert!(r.dot(&v).abs() / (r.norm() * v.norm()) < 1e-6);
        let h = r.cross(&v);
        assert!((h.z / h.norm() - inclination().cos()).abs() < 1e-6);

        // constant mass flow over the burn
        let burned = sol.m(sol.t0()) - sol.m(tf);
        assert_rel(burned, single_stage()[0].mass_flow() * (tf - sol.t0()), 1e-9);
        assert_eq!(g.solution(), Some(&sol));
    }

    #[test]
    fn warm_start_reproduces_solution_without_bootstrap() {
        let mut g = guidance(single_stage());
        let first = expect_success(g.optimize(0.0));
        let y_first = g.free_variables().expect("stored").to_vec();

        let second = expect_success(g.optimize(0.0));
        assert_eq!(g.bootstraps(), 1);
        let y_second = g.free_variables().expect("stored");
        for (a, b) in y_first.iter().zip(y_second) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
        assert!((first.tf() - second.tf()).abs() < 1e-6);
        assert!((first.r(first.tf()) - second.r(second.tf())).norm() < 1e-3);
    }

    #[test]
    fn burnt_out_stage_is_dropped_without_cold_start() {
        let mut g = guidance(single_stage());
        expect_success(g.optimize(0.0));
        let mut arcs = vec![Arc::new(300.0, 2.0e5, 3.0e4, 0.0)];
        arcs.extend(single_stage());
        g.set_arcs(arcs);
        expect_success(g.optimize(0.0));
        assert_eq!(g.bootstraps(), 1);
    }

    #[test]
    fn stale_vector_is_truncated_to_remaining_stages() {
        let mut g = guidance(single_stage());
        expect_success(g.optimize(0.0));
        let mut y = g.free_variables().expect("stored").to_vec();
        let tail: Vec<f64> = y[LAUNCH_ARC_INDEX..].to_vec();
        y.extend(tail);
        g.set_free_variables(y);
        expect_success(g.optimize(0.0));
        assert_eq!(g.bootstraps(), 1);
        assert_eq!(g.free_variables().expect("stored").len(), LAUNCH_ARC_INDEX + BLOCK);
    }

    #[test]
    fn invalid_arcs_fail_and_clear_state() {
        let mut g = guidance(single_stage());
        g.set_free_variables(vec![0.0; LAUNCH_ARC_INDEX + BLOCK]);
        g.set_arcs(vec![Arc::new(320.0, -1.0, 1.2e4, 100.0)]);
        match g.optimize(0.0) {
            OptimizationOutcome::Failure(FailureReason::InvalidArcs(_)) => {}
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(g.free_variables().is_none());
        assert!(g.solution().is_none());
    }

    #[test]
    fn two_stage_vehicle_reaches_target_through_staging() {
        let mut g = guidance(vec![
            Arc::new(320.0, 1.2e5, 1.2e4, 15.0),
            Arc::new(340.0, 6.0e4, 1.0e4, 300.0),
        ]);
        let sol = expect_success(g.optimize(0.0));
        assert_eq!(g.bootstraps(), 1);
        assert_eq!(sol.arc_count(), 2);
        assert_eq!(g.free_variables().map(|y| y.len()), Some(LAUNCH_ARC_INDEX + 2 * BLOCK));

        let scaling = *sol.scaling();
        let staging = sol.arc_end_bar(0).expect("first arc");
        assert!((staging * scaling.t_scale - 15.0).abs() < 1e-9);
        // the upper stage ignites at its own mass
        let upper = sol.m_bar(staging + 1e-12) * scaling.m_scale;
        assert!((upper - 1.0e4).abs() < 1e-3, "upper stage mass {upper}");

        let tf = sol.tf();
        assert!(tf > 15.0);
        assert_rel(sol.r(tf).norm(), RADIUS, 1e-6);
        assert_rel(sol.v(tf).norm(), (MU / RADIUS).sqrt(), 1e-6);

        // a second cycle warm-starts from the staged solution
        expect_success(g.optimize(0.0));
        assert_eq!(g.bootstraps(), 1);
    }

    #[test]
    fn negative_burn_time_fails_and_clears_state() {
        let (r0, v0) = vehicle();
        let problem =
            PontryaginProblem::new(MU, r0, v0, Vector3::zeros(), Vector3::zeros(), 560.0, 1.2e4)
                .expect("problem");
        let t_scale = problem.scaling.t_scale;
        let mut g = AscentGuidance::new(
            problem,
            FixedBurnTime { burn_time: -0.01 },
            single_stage(),
            GuidanceSettings::default(),
        );
        match g.optimize(0.0) {
            OptimizationOutcome::Failure(FailureReason::NegativeBurnTime(seconds)) => {
                assert!((seconds + 0.01 * t_scale).abs() < 1e-6 * t_scale, "{seconds}");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(g.free_variables().is_none());
        assert!(g.solution().is_none());
    }

    #[test]
    fn bootstrap_failure_is_reported() {
        let mut g = guidance(single_stage());
        g.set_delta_v(-1.0);
        match g.optimize(0.0) {
            OptimizationOutcome::Failure(FailureReason::BootstrapFailed(msg)) => {
                assert!(msg.contains("Delta-v"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(g.is_initializing());
    }

    #[test]
    fn exhausted_budget_is_not_converged() {
        let mut g = guidance(single_stage());
        g.settings.levenberg.max_iterations = 1;
        match g.optimize(0.0) {
            OptimizationOutcome::Failure(FailureReason::NotConverged { iterations, .. }) => {
                assert_eq!(iterations, 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(g.free_variables().is_none());
    }

    #[test]
    fn explicit_bootstrap_stores_guess() {
        let mut g = guidance(single_stage());
        g.bootstrap().expect("bootstrap");
        assert_eq!(g.free_variables().map(|y| y.len()), Some(LAUNCH_ARC_INDEX + BLOCK));
        expect_success(g.optimize(0.0));
        assert_eq!(g.bootstraps(), 1);
    }

    #[test]
    fn terminal_constraints_can_be_reconfigured() {
        let mut g = guidance(single_stage());
        g.configure_terminal_constraints(6.6e6, 7700.0, 0.01, 0.5);
        assert_eq!(g.model().target, TerminalTarget::new(6.6e6, 7700.0, 0.01, 0.5));
    }
}
