//! Terminal boundary conditions for insertion into an orbit of given
//! radius, speed, flight-path angle and inclination with a free longitude of
//! the ascending node.

use crate::scaling::Scaling;
use crate::traits::{constant, Scalar};
use crate::vector::{at, cross, dot, lift, norm};
use serde::{Deserialize, Serialize};

/// Desired insertion conditions, in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerminalTarget {
    /// Radius from the central body's center (m).
    pub radius: f64,
    /// Inertial speed (m/s).
    pub speed: f64,
    /// Flight-path angle above the local horizontal (rad).
    pub flight_path_angle: f64,
    /// Orbit inclination relative to the reference axis (rad).
    pub inclination: f64,
}

impl TerminalTarget {
    pub fn new(radius: f64, speed: f64, flight_path_angle: f64, inclination: f64) -> Self {
        Self {
            radius,
            speed,
            flight_path_angle,
            inclination,
        }
    }

    /// Circular orbit of the given radius.
    pub fn circular(mu: f64, radius: f64, inclination: f64) -> Self {
        Self::new(radius, (mu / radius).sqrt(), 0.0, inclination)
    }
}

/// The axis inclination is measured from.
///
/// A prograde equatorial orbit has its angular momentum along `orbit_normal`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceFrame {
    pub orbit_normal: [f64; 3],
}

impl ReferenceFrame {
    /// Right-handed inertial frame with the pole along +z.
    pub fn z_up() -> Self {
        Self {
            orbit_normal: [0.0, 0.0, 1.0],
        }
    }

    /// Left-handed y-up frame where prograde angular momentum points to -y.
    pub fn south_pointing() -> Self {
        Self {
            orbit_normal: [0.0, -1.0, 0.0],
        }
    }
}

impl Default for ReferenceFrame {
    fn default() -> Self {
        Self::z_up()
    }
}

/// Evaluates the four-constraint insertion residual with free LAN.
///
/// `terminal` holds `[r(3), v(3), pv(3), pr(3)]` at the end of the final arc
/// in canonical units. Entries of `out`:
/// 0. radius, 1. speed, 2. inclination, 3. flight-path angle,
/// 4. transversality of the in-plane terminal freedom,
/// 5. transversality of the free node.
pub fn flight_angle_4_constraint<T: Scalar>(
    target: &TerminalTarget,
    frame: &ReferenceFrame,
    scaling: &Scaling,
    terminal: &[T],
    out: &mut [T],
) {
    let half: T = constant(0.5);
    let r_t: T = constant(target.radius / scaling.r_scale);
    let v_t: T = constant(target.speed / scaling.v_scale);
    let (sin_gamma, cos_inc) = (
        constant::<T>(target.flight_path_angle.sin()),
        constant::<T>(target.inclination.cos()),
    );

    let rf = at(terminal, 0);
    let vf = at(terminal, 3);
    let pvf = at(terminal, 6);
    let prf = at(terminal, 9);

    let n = lift::<T>(&frame.orbit_normal);
    let rn = cross(&rf, &n);
    let vn = cross(&vf, &n);
    let hf = cross(&rf, &vf);

    let r_mag = norm(&rf);
    let v_mag = norm(&vf);

    out[0] = half * (r_mag * r_mag - r_t * r_t);
    out[1] = half * (v_mag * v_mag - v_t * v_t);
    out[2] = dot(&n, &hf) - norm(&hf) * cos_inc;
    out[3] = dot(&rf, &vf) - r_mag * v_mag * sin_gamma;
    out[4] = r_t * r_t * (dot(&vf, &prf) - v_t * sin_gamma / r_t * dot(&rf, &prf))
        - v_t * v_t * (dot(&rf, &pvf) - r_t * sin_gamma / v_t * dot(&vf, &pvf));
    out[5] = dot(&hf, &prf) * dot(&hf, &rn) + dot(&hf, &pvf) * dot(&hf, &vn);
}
