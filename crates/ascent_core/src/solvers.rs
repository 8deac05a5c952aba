use crate::traits::{constant, DynamicalSystem, Scalar, Steppable};

/// Classic Runge-Kutta 4th order stepper.
///
/// Scratch buffers are sized once for the system dimension so repeated arc
/// integrations inside the root finder do not allocate per step.
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let zero = T::zero();
        Self {
            k1: vec![zero; dim],
            k2: vec![zero; dim],
            k3: vec![zero; dim],
            k4: vec![zero; dim],
            tmp: vec![zero; dim],
        }
    }

    fn stage(&mut self, state: &[T], slope: Slope, scale: T) {
        let k = match slope {
            Slope::K1 => &self.k1,
            Slope::K2 => &self.k2,
            Slope::K3 => &self.k3,
        };
        for ((tmp, &y), &dy) in self.tmp.iter_mut().zip(state).zip(k.iter()) {
            *tmp = y + scale * dy;
        }
    }
}

#[derive(Clone, Copy)]
enum Slope {
    K1,
    K2,
    K3,
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half_dt = dt * constant(0.5);
        let two: T = constant(2.0);
        let sixth_dt = dt / constant(6.0);
        let t0 = *t;

        system.apply(t0, state, &mut self.k1);

        self.stage(state, Slope::K1, half_dt);
        system.apply(t0 + half_dt, &self.tmp, &mut self.k2);

        self.stage(state, Slope::K2, half_dt);
        system.apply(t0 + half_dt, &self.tmp, &mut self.k3);

        self.stage(state, Slope::K3, dt);
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        for i in 0..state.len() {
            state[i] = state[i]
                + sixth_dt * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

/// Integrates `state` over `duration` in `steps` equal RK4 steps starting at
/// `t0`. `observer` is called with the time and state after every step.
///
/// A negative duration integrates backwards; the root finder relies on this
/// while it explores burn times on the wrong side of zero.
pub fn integrate_fixed<T, S, F>(
    system: &S,
    t0: T,
    state: &mut [T],
    duration: T,
    steps: usize,
    mut observer: F,
) where
    T: Scalar,
    S: DynamicalSystem<T>,
    F: FnMut(T, &[T]),
{
    let steps = steps.max(1);
    let dt = duration / constant(steps as f64);
    let mut stepper = RK4::new(system.dimension());
    let mut t = t0;
    for _ in 0..steps {
        stepper.step(system, &mut t, state, dt);
        observer(t, state);
    }
}
