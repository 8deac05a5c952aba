//! Multi-arc Pontryagin shooting problem.
//!
//! Free-variable vector layout: `arc_index` solver parameters (the first is
//! the burn time of the final arc) followed by one 13-entry block per arc
//! holding `[r, v, pv, pr, m]` at the start of that arc, all in canonical
//! units. Every arc is integrated from its own block, so the residual ties
//! the blocks together with continuity conditions (multiple shooting).

use crate::arc::NormalizedArc;
use crate::dynamics::{CentralForceThrust, BLOCK};
use crate::levenberg::{levenberg_marquardt, LeastSquaresProblem, LevenbergReport, LevenbergSettings};
use crate::scaling::Scaling;
use crate::solution::Solution;
use crate::solvers::integrate_fixed;
use crate::traits::{constant, DynamicalSystem, Scalar};
use anyhow::{bail, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Residual entries produced by the boundary condition of a model.
pub const BOUNDARY_RESIDUALS: usize = 6;

/// The problem-specific half of a shooting problem: terminal conditions and
/// whatever extra parameters and residuals the variant carries.
pub trait TrajectoryModel {
    /// Solver parameters stored ahead of the per-arc blocks.
    fn arc_index(&self) -> usize;

    /// Residual entries appended after the `13 * num_arcs` shooting block.
    fn extra_residuals(&self) -> usize;

    /// Terminal residual from the final `[r, v, pv, pr]` (12 entries) into
    /// `out` (`BOUNDARY_RESIDUALS` entries).
    fn boundary_residual<T: Scalar>(&self, scaling: &Scaling, terminal: &[T], out: &mut [T]);

    /// Writes the extra residuals and applies any final transformation to
    /// the complete vector `z`.
    fn complete_residual<T: Scalar>(&self, y: &[T], num_arcs: usize, z: &mut [T]);

    /// Solver parameters for a cold start given an estimated burn time.
    fn seed_parameters(&self, tgo_bar: f64) -> Vec<f64>;

    /// Normalized burn time of the final arc.
    fn final_burn_time<T: Scalar>(&self, y: &[T]) -> T {
        y[0]
    }
}

/// Length of the free-variable vector for `num_arcs` arcs.
pub fn free_variable_len(arc_index: usize, num_arcs: usize) -> usize {
    arc_index + BLOCK * num_arcs
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegrationSettings {
    /// RK4 steps per arc, used both for residuals and for sampling.
    pub steps_per_arc: usize,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self { steps_per_arc: 64 }
    }
}

/// Vehicle initial conditions and canonical units for one guidance run.
#[derive(Debug, Clone, PartialEq)]
pub struct PontryaginProblem {
    pub mu: f64,
    pub scaling: Scaling,
    /// Live position (m) and velocity (m/s).
    pub r0: Vector3<f64>,
    pub v0: Vector3<f64>,
    /// Initial costate guess used when no converged costate exists.
    pub pv0: Vector3<f64>,
    pub pr0: Vector3<f64>,
    /// Estimated delta-v to go (m/s), used for the cold-start burn time.
    pub dv: f64,
    pub integration: IntegrationSettings,
}

impl PontryaginProblem {
    /// Canonical units are fixed here from `|r0|` and `m_scale`, so free
    /// variables stay comparable across guidance cycles.
    pub fn new(
        mu: f64,
        r0: Vector3<f64>,
        v0: Vector3<f64>,
        pv0: Vector3<f64>,
        pr0: Vector3<f64>,
        dv: f64,
        m_scale: f64,
    ) -> Result<Self> {
        let scaling = Scaling::new(mu, r0.norm(), m_scale)?;
        Ok(Self {
            mu,
            scaling,
            r0,
            v0,
            pv0,
            pr0,
            dv,
            integration: IntegrationSettings::default(),
        })
    }

    pub fn with_integration(mut self, integration: IntegrationSettings) -> Self {
        self.integration = integration;
        self
    }

    pub fn r0_bar(&self) -> Vector3<f64> {
        self.r0 / self.scaling.r_scale
    }

    pub fn v0_bar(&self) -> Vector3<f64> {
        self.v0 / self.scaling.v_scale
    }

    /// Costate seed normalized to unit length.
    ///
    /// A zero guess falls back to a prograde primer vector with zero position
    /// costate; a vehicle at rest falls back to radial.
    pub fn costate_seed(&self) -> (Vector3<f64>, Vector3<f64>) {
        let norm = (self.pv0.norm_squared() + self.pr0.norm_squared()).sqrt();
        if norm > 0.0 && norm.is_finite() {
            return (self.pv0 / norm, self.pr0 / norm);
        }
        let direction = if self.v0.norm() > 0.0 {
            self.v0.normalize()
        } else {
            self.r0.normalize()
        };
        (direction, Vector3::zeros())
    }

    /// Refreshes block `i` of `y` from live data: position, velocity and mass
    /// for the first arc, mass only for later arcs. The costate is kept
    /// unless the block has none yet.
    pub fn update_y0_arc(&self, y: &mut [f64], arcs: &[NormalizedArc], arc_index: usize, i: usize) {
        let base = arc_index + BLOCK * i;
        let block = &mut y[base..base + BLOCK];
        if i == 0 {
            block[0..3].copy_from_slice(self.r0_bar().as_slice());
            block[3..6].copy_from_slice(self.v0_bar().as_slice());
        }
        if block[6..12].iter().all(|&c| c == 0.0) {
            let (pv, pr) = self.costate_seed();
            block[6..9].copy_from_slice(pv.as_slice());
            block[9..12].copy_from_slice(pr.as_slice());
        }
        block[12] = arcs[i].m0_bar;
    }

    /// Burn duration of arc `i` in canonical time: the final arc burns for the
    /// model's free time, earlier arcs burn out.
    fn burn_time<T: Scalar, M: TrajectoryModel>(
        &self,
        model: &M,
        arcs: &[NormalizedArc],
        y: &[T],
        i: usize,
    ) -> T {
        if i + 1 == arcs.len() {
            model.final_burn_time(y)
        } else {
            constant(arcs[i].max_bt_bar)
        }
    }

    /// Full residual for the current arc list: the generic shooting block
    /// followed by the model's extra residuals.
    pub fn optimization_function<T: Scalar, M: TrajectoryModel>(
        &self,
        model: &M,
        arcs: &[NormalizedArc],
        y: &[T],
        z: &mut [T],
    ) -> Result<()> {
        let a = model.arc_index();
        let num_arcs = arcs.len();
        if num_arcs == 0 {
            bail!("Cannot evaluate a trajectory without arcs.");
        }
        if y.len() != free_variable_len(a, num_arcs) {
            bail!(
                "Free variable dimension mismatch. Expected {}, got {}.",
                free_variable_len(a, num_arcs),
                y.len()
            );
        }
        if z.len() != BLOCK * num_arcs + model.extra_residuals() {
            bail!(
                "Residual dimension mismatch. Expected {}, got {}.",
                BLOCK * num_arcs + model.extra_residuals(),
                z.len()
            );
        }

        let mut ends: Vec<[T; BLOCK]> = Vec::with_capacity(num_arcs);
        for (i, arc) in arcs.iter().enumerate() {
            let base = a + BLOCK * i;
            let mut state = [T::zero(); BLOCK];
            state.copy_from_slice(&y[base..base + BLOCK]);
            let system = CentralForceThrust::from(arc);
            let duration = self.burn_time(model, arcs, y, i);
            integrate_fixed(
                &system,
                T::zero(),
                &mut state,
                duration,
                self.integration.steps_per_arc,
                |_, _| {},
            );
            ends.push(state);
        }

        // initial conditions of the first arc
        let r0 = self.r0_bar();
        let v0 = self.v0_bar();
        for k in 0..3 {
            z[k] = y[a + k] - constant(r0[k]);
            z[3 + k] = y[a + 3 + k] - constant(v0[k]);
        }

        // terminal conditions at the end of the last arc
        let last = &ends[num_arcs - 1];
        model.boundary_residual(&self.scaling, &last[0..12], &mut z[6..6 + BOUNDARY_RESIDUALS]);
        z[12] = y[a + 12] - constant(arcs[0].m0_bar);

        // continuity across staging; mass jumps to the next stage's mass
        for i in 1..num_arcs {
            let base = a + BLOCK * i;
            let prev = &ends[i - 1];
            for k in 0..12 {
                z[BLOCK * i + k] = prev[k] - y[base + k];
            }
            z[BLOCK * i + 12] = constant::<T>(arcs[i].m0_bar) - y[base + 12];
        }

        model.complete_residual(y, num_arcs, z);
        Ok(())
    }

    /// Runs the root finder on `y` for the given arcs.
    pub fn run_optimizer<M: TrajectoryModel>(
        &self,
        model: &M,
        arcs: &[NormalizedArc],
        y: &mut [f64],
        settings: &LevenbergSettings,
    ) -> Result<LevenbergReport> {
        let shooting = Shooting {
            problem: self,
            model,
            arcs,
        };
        levenberg_marquardt(&shooting, y, settings)
    }

    /// Integrates every arc from `y` and records each integration node.
    pub fn multiple_integrate<M: TrajectoryModel>(
        &self,
        model: &M,
        arcs: &[NormalizedArc],
        y: &[f64],
        t0: f64,
    ) -> Result<Solution> {
        let a = model.arc_index();
        if y.len() != free_variable_len(a, arcs.len()) {
            bail!(
                "Free variable dimension mismatch. Expected {}, got {}.",
                free_variable_len(a, arcs.len()),
                y.len()
            );
        }
        let mut solution = Solution::new(self.scaling, t0);
        let mut t_start = 0.0;
        for (i, arc) in arcs.iter().enumerate() {
            let base = a + BLOCK * i;
            let mut state = [0.0; BLOCK];
            state.copy_from_slice(&y[base..base + BLOCK]);
            let system = CentralForceThrust::from(arc);
            let duration: f64 = self.burn_time(model, arcs, y, i);

            let mut rate = [0.0; BLOCK];
            system.apply(t_start, &state, &mut rate);
            solution.begin_arc(t_start, &state, &rate);
            integrate_fixed(
                &system,
                t_start,
                &mut state,
                duration,
                self.integration.steps_per_arc,
                |t, x| {
                    let mut node = [0.0; BLOCK];
                    node.copy_from_slice(x);
                    let mut rate = [0.0; BLOCK];
                    system.apply(t, x, &mut rate);
                    solution.push(t, &node, &rate);
                },
            );
            t_start += duration;
        }
        Ok(solution)
    }
}

/// Adapts a problem, model and arc subset to the root finder.
struct Shooting<'a, M> {
    problem: &'a PontryaginProblem,
    model: &'a M,
    arcs: &'a [NormalizedArc],
}

impl<M: TrajectoryModel> LeastSquaresProblem for Shooting<'_, M> {
    fn parameter_count(&self) -> usize {
        free_variable_len(self.model.arc_index(), self.arcs.len())
    }

    fn residual_count(&self) -> usize {
        BLOCK * self.arcs.len() + self.model.extra_residuals()
    }

    fn residual<T: Scalar>(&self, x: &[T], out: &mut [T]) -> Result<()> {
        self.problem
            .optimization_function(self.model, self.arcs, x, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::{normalize_arcs, Arc};

    const MU: f64 = 3.986004418e14;

    /// Terminal condition that only pins the final radius, for exercising the
    /// shooting block in isolation.
    struct RadiusOnly {
        radius: f64,
    }

    impl TrajectoryModel for RadiusOnly {
        fn arc_index(&self) -> usize {
            1
        }

        fn extra_residuals(&self) -> usize {
            1
        }

        fn boundary_residual<T: Scalar>(&self, scaling: &Scaling, terminal: &[T], out: &mut [T]) {
            let r = crate::vector::at(terminal, 0);
            let r_t: T = constant(self.radius / scaling.r_scale);
            out[0] = crate::vector::norm(&r) - r_t;
            for v in out.iter_mut().skip(1) {
                *v = T::zero();
            }
        }

        fn complete_residual<T: Scalar>(&self, _y: &[T], num_arcs: usize, z: &mut [T]) {
            z[BLOCK * num_arcs] = T::zero();
        }

        fn seed_parameters(&self, tgo_bar: f64) -> Vec<f64> {
            vec![tgo_bar]
        }
    }

    fn problem() -> PontryaginProblem {
        PontryaginProblem::new(
            MU,
            Vector3::new(6.5e6, 0.0, 0.0),
            Vector3::new(0.0, 7.5e3, 0.0),
            Vector3::zeros(),
            Vector3::zeros(),
            500.0,
            1.0e4,
        )
        .expect("problem")
    }

    fn two_arcs(p: &PontryaginProblem) -> Vec<NormalizedArc> {
        normalize_arcs(
            &[
                Arc::new(300.0, 1.0e5, 1.0e4, 20.0),
                Arc::new(330.0, 3.0e4, 6.0e3, 200.0),
            ],
            &p.scaling,
        )
        .expect("arcs")
    }

    fn seeded_vector(p: &PontryaginProblem, model: &RadiusOnly, arcs: &[NormalizedArc]) -> Vec<f64> {
        let mut y = model.seed_parameters(0.05);
        y.resize(free_variable_len(1, arcs.len()), 0.0);
        for i in 0..arcs.len() {
            p.update_y0_arc(&mut y, arcs, 1, i);
        }
        y
    }

    /// Seeded vector whose second block starts where the first arc burns out.
    fn chained_vector(p: &PontryaginProblem, model: &RadiusOnly, arcs: &[NormalizedArc]) -> Vec<f64> {
        let mut y = seeded_vector(p, model, arcs);
        y[0] = arcs[0].max_bt_bar;
        let sol = p
            .multiple_integrate(model, &arcs[..1], &y[..free_variable_len(1, 1)], 0.0)
            .expect("integrate");
        let end = sol.state_bar(sol.tmax());
        y[1 + BLOCK..1 + BLOCK + 12].copy_from_slice(&end[..12]);
        y[0] = 0.05;
        y
    }

    #[test]
    fn zero_costate_guess_seeds_prograde_unit_primer() {
        let p = problem();
        let (pv, pr) = p.costate_seed();
        assert!((pv - Vector3::y()).norm() < 1e-15);
        assert_eq!(pr, Vector3::zeros());
    }

    #[test]
    fn update_keeps_converged_costate() {
        let p = problem();
        let model = RadiusOnly { radius: 6.6e6 };
        let arcs = two_arcs(&p);
        let mut y = seeded_vector(&p, &model, &arcs);
        y[1 + 6] = 0.6;
        y[1 + 7] = 0.8;
        y[1] = 2.0;
        p.update_y0_arc(&mut y, &arcs, 1, 0);
        assert_eq!(y[1], 1.0);
        assert_eq!(y[1 + 6], 0.6);
        assert_eq!(y[1 + 7], 0.8);
        assert_eq!(y[1 + 12], 1.0);
        assert!((y[1 + BLOCK + 12] - 0.6).abs() < 1e-15);
    }

    #[test]
    fn continuity_residual_vanishes_when_blocks_chain() {
        let p = problem();
        let model = RadiusOnly { radius: 6.6e6 };
        let arcs = two_arcs(&p);
        let y = chained_vector(&p, &model, &arcs);

        let mut z = vec![0.0; BLOCK * 2 + 1];
        p.optimization_function(&model, &arcs, &y, &mut z).expect("residual");
        for k in 0..6 {
            assert!(z[k].abs() < 1e-15, "initial condition {} = {}", k, z[k]);
        }
        assert!(z[12].abs() < 1e-15);
        for k in 0..BLOCK {
            assert!(z[BLOCK + k].abs() < 1e-12, "continuity {} = {}", k, z[BLOCK + k]);
        }
    }

    #[test]
    fn sampled_solution_ends_where_the_residual_integrates() {
        let p = problem();
        let model = RadiusOnly { radius: 6.6e6 };
        let arcs = two_arcs(&p);
        let y = chained_vector(&p, &model, &arcs);
        let sol = p.multiple_integrate(&model, &arcs, &y, 10.0).expect("integrate");
        assert_eq!(sol.arc_count(), 2);
        assert!((sol.arc_end_bar(0).expect("arc 0") - arcs[0].max_bt_bar).abs() < 1e-13);
        assert!((sol.tmax() - (arcs[0].max_bt_bar + 0.05)).abs() < 1e-13);

        let mut z = vec![0.0; BLOCK * 2 + 1];
        p.optimization_function(&model, &arcs, &y, &mut z).expect("residual");
        let r_end = sol.r_bar(sol.tmax()).norm();
        assert!((z[6] - (r_end - 6.6e6 / p.scaling.r_scale)).abs() < 1e-14);
    }

    #[test]
    fn tiny_negative_burn_time_still_samples() {
        let p = problem();
        let model = RadiusOnly { radius: 6.6e6 };
        let arcs = two_arcs(&p);
        let mut y = seeded_vector(&p, &model, &arcs[..1]);
        y[0] = -1e-14;
        let sol = p.multiple_integrate(&model, &arcs[..1], &y, 0.0).expect("integrate");
        assert!(sol.tmax() < 0.0);
        let end = sol.state_bar(sol.tmax());
        assert!(end.iter().all(|v| v.is_finite()));
        assert!((end[0] - y[1]).abs() < 1e-12);
    }

    #[test]
    fn mismatched_vector_is_an_error() {
        let p = problem();
        let model = RadiusOnly { radius: 6.6e6 };
        let arcs = two_arcs(&p);
        let y = vec![0.0; 5];
        let mut z = vec![0.0; BLOCK * 2 + 1];
        assert!(p.optimization_function(&model, &arcs, &y, &mut z).is_err());
        assert!(p.multiple_integrate(&model, &arcs, &y, 0.0).is_err());
    }
}
