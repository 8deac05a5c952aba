use crate::arc::NormalizedArc;
use crate::traits::{constant, DynamicalSystem, Scalar};
use crate::vector::{at, dot, norm};

/// Entries per arc block: position, velocity, velocity costate, position
/// costate and mass.
pub const BLOCK: usize = 13;

/// Inverse-square gravity plus thrust along the primer vector.
///
/// State layout `[r(3), v(3), pv(3), pr(3), m]` in canonical units, with the
/// gravitational parameter normalized to one. The thrust direction is
/// `pv / |pv|`; a vanishing primer vector coasts.
#[derive(Debug, Clone, Copy)]
pub struct CentralForceThrust {
    pub thrust_bar: f64,
    pub mdot_bar: f64,
}

impl From<&NormalizedArc> for CentralForceThrust {
    fn from(arc: &NormalizedArc) -> Self {
        Self {
            thrust_bar: arc.thrust_bar,
            mdot_bar: arc.mdot_bar,
        }
    }
}

impl<T: Scalar> DynamicalSystem<T> for CentralForceThrust {
    fn dimension(&self) -> usize {
        BLOCK
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let r = at(x, 0);
        let pv = at(x, 6);
        let m = x[12];

        let r2 = dot(&r, &r);
        let r_mag = r2.sqrt();
        let r3 = r2 * r_mag;
        let r5 = r3 * r2;

        let pv_mag = norm(&pv);
        let accel = if pv_mag > T::zero() {
            constant::<T>(self.thrust_bar) / (m * pv_mag)
        } else {
            T::zero()
        };

        let three: T = constant(3.0);
        let r_dot_pv = dot(&r, &pv);

        for i in 0..3 {
            out[i] = x[3 + i];
            out[3 + i] = -r[i] / r3 + accel * pv[i];
            out[6 + i] = -x[9 + i];
            out[9 + i] = pv[i] / r3 - three * r_dot_pv * r[i] / r5;
        }
        out[12] = -constant::<T>(self.mdot_bar);
    }
}
