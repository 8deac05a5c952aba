use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Standard gravity used to turn specific impulse into exhaust velocity (m/s²).
pub const G0: f64 = 9.80665;

/// Canonical units of the guidance problem.
///
/// Lengths are measured in units of the initial radius and velocities in
/// units of the circular speed at that radius, which makes the normalized
/// gravitational parameter exactly one. Masses are measured in units of the
/// vehicle mass at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scaling {
    pub r_scale: f64,
    pub v_scale: f64,
    pub t_scale: f64,
    pub m_scale: f64,
    /// Acceleration unit, `mu / r_scale²` (m/s²).
    pub g_bar: f64,
}

impl Scaling {
    pub fn new(mu: f64, r_scale: f64, m_scale: f64) -> Result<Self> {
        if !(mu.is_finite() && mu > 0.0) {
            bail!("Gravitational parameter must be positive, got {}.", mu);
        }
        if !(r_scale.is_finite() && r_scale > 0.0) {
            bail!("Length scale must be positive, got {}.", r_scale);
        }
        if !(m_scale.is_finite() && m_scale > 0.0) {
            bail!("Mass scale must be positive, got {}.", m_scale);
        }
        let v_scale = (mu / r_scale).sqrt();
        Ok(Self {
            r_scale,
            v_scale,
            t_scale: r_scale / v_scale,
            m_scale,
            g_bar: mu / (r_scale * r_scale),
        })
    }
}
