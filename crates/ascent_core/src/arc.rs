use crate::scaling::{Scaling, G0};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One burn phase of the vehicle, in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    /// Vacuum specific impulse (s).
    pub isp: f64,
    /// Thrust (N).
    pub thrust: f64,
    /// Mass at ignition of this arc (kg).
    pub m0: f64,
    /// Remaining burn time of the stage (s).
    pub max_bt: f64,
}

impl Arc {
    pub fn new(isp: f64, thrust: f64, m0: f64, max_bt: f64) -> Self {
        Self {
            isp,
            thrust,
            m0,
            max_bt,
        }
    }

    /// Effective exhaust velocity (m/s).
    pub fn exhaust_velocity(&self) -> f64 {
        G0 * self.isp
    }

    /// Propellant mass flow (kg/s).
    pub fn mass_flow(&self) -> f64 {
        self.thrust / self.exhaust_velocity()
    }
}

/// An [`Arc`] expressed in the problem's canonical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedArc {
    pub source: Arc,
    pub thrust_bar: f64,
    pub mdot_bar: f64,
    pub m0_bar: f64,
    pub max_bt_bar: f64,
}

impl NormalizedArc {
    pub fn new(arc: Arc, scaling: &Scaling) -> Self {
        Self {
            source: arc,
            thrust_bar: arc.thrust / (scaling.m_scale * scaling.g_bar),
            mdot_bar: arc.mass_flow() * scaling.t_scale / scaling.m_scale,
            m0_bar: arc.m0 / scaling.m_scale,
            max_bt_bar: arc.max_bt / scaling.t_scale,
        }
    }
}

/// Validates the stage list and converts it to canonical units.
///
/// Spent stages (no burn time left) are dropped so the arc count tracks the
/// stages that can still contribute; anything non-physical is rejected.
pub fn normalize_arcs(arcs: &[Arc], scaling: &Scaling) -> Result<Vec<NormalizedArc>> {
    let mut normalized = Vec::with_capacity(arcs.len());
    for (i, arc) in arcs.iter().enumerate() {
        if !(arc.max_bt > 0.0) {
            debug!(stage = i, max_bt = arc.max_bt, "dropping spent stage");
            continue;
        }
        if !arc.max_bt.is_finite() {
            bail!("Stage {} has non-finite burn time.", i);
        }
        if !(arc.thrust.is_finite() && arc.thrust > 0.0) {
            bail!("Stage {} thrust must be positive, got {}.", i, arc.thrust);
        }
        if !(arc.isp.is_finite() && arc.isp > 0.0) {
            bail!("Stage {} specific impulse must be positive, got {}.", i, arc.isp);
        }
        if !(arc.m0.is_finite() && arc.m0 > 0.0) {
            bail!("Stage {} mass must be positive, got {}.", i, arc.m0);
        }
        normalized.push(NormalizedArc::new(*arc, scaling));
    }
    if normalized.is_empty() {
        bail!("No stage with remaining burn time.");
    }
    Ok(normalized)
}
