use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Numeric type the trajectory equations are written against.
/// Implemented by `f64` for plain evaluation and by `Dual` when the
/// root finder needs exact first derivatives.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Lifts an `f64` constant into the scalar type.
#[inline]
pub fn constant<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// A first-order ODE system `dy/dt = f(t, y)`.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the right-hand side.
    /// t: current time
    /// x: current state
    /// out: buffer receiving dx/dt
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A fixed-step integrator that can advance a system in place.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt, updating both `t` and `state`.
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}
