use crate::dynamics::BLOCK;
use crate::scaling::Scaling;
use nalgebra::Vector3;

/// Integrator output for one arc: nodes, states and state rates.
#[derive(Debug, Clone, PartialEq)]
struct Segment {
    times: Vec<f64>,
    states: Vec<[f64; BLOCK]>,
    rates: Vec<[f64; BLOCK]>,
}

impl Segment {
    fn start(&self) -> f64 {
        self.times[0]
    }

    fn end(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    /// Cubic Hermite interpolation between the bracketing nodes.
    fn interpolate(&self, t: f64) -> [f64; BLOCK] {
        let last = self.times.len() - 1;
        let k = self
            .times
            .partition_point(|&node| node <= t)
            .saturating_sub(1)
            .min(last.saturating_sub(1));
        if last == 0 {
            return self.states[0];
        }
        let (t_a, t_b) = (self.times[k], self.times[k + 1]);
        let h = t_b - t_a;
        if h == 0.0 {
            return self.states[k + 1];
        }
        let s = ((t - t_a) / h).clamp(0.0, 1.0);
        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;

        let (ya, yb) = (&self.states[k], &self.states[k + 1]);
        let (fa, fb) = (&self.rates[k], &self.rates[k + 1]);
        let mut out = [0.0; BLOCK];
        for i in 0..BLOCK {
            out[i] = h00 * ya[i] + h10 * h * fa[i] + h01 * yb[i] + h11 * h * fb[i];
        }
        out
    }
}

/// A converged trajectory sampled across all arcs.
///
/// Normalized time runs from zero at the start of the first arc; absolute
/// time is anchored at `t0`, the guidance cycle's epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    scaling: Scaling,
    t0: f64,
    segments: Vec<Segment>,
}

impl Solution {
    pub fn new(scaling: Scaling, t0: f64) -> Self {
        Self {
            scaling,
            t0,
            segments: Vec::new(),
        }
    }

    /// Starts a new arc at normalized time `t`.
    pub(crate) fn begin_arc(&mut self, t: f64, state: &[f64; BLOCK], rate: &[f64; BLOCK]) {
        self.segments.push(Segment {
            times: vec![t],
            states: vec![*state],
            rates: vec![*rate],
        });
    }

    /// Appends a node to the arc opened by the last `begin_arc`.
    pub(crate) fn push(&mut self, t: f64, state: &[f64; BLOCK], rate: &[f64; BLOCK]) {
        if let Some(segment) = self.segments.last_mut() {
            segment.times.push(t);
            segment.states.push(*state);
            segment.rates.push(*rate);
        }
    }

    pub fn scaling(&self) -> &Scaling {
        &self.scaling
    }

    pub fn arc_count(&self) -> usize {
        self.segments.len()
    }

    /// Normalized time at which arc `i` ends.
    pub fn arc_end_bar(&self, i: usize) -> Option<f64> {
        self.segments.get(i).map(Segment::end)
    }

    /// Total normalized duration.
    pub fn tmax(&self) -> f64 {
        self.segments.last().map_or(0.0, Segment::end)
    }

    /// Absolute epoch of the start of the trajectory (s).
    pub fn t0(&self) -> f64 {
        self.t0
    }

    /// Absolute end time (s).
    pub fn tf(&self) -> f64 {
        self.t0 + self.tmax() * self.scaling.t_scale
    }

    /// Full `[r, v, pv, pr, m]` at normalized time, clamped to the sampled
    /// interval. At a staging instant the state at the end of the earlier
    /// arc is returned.
    pub fn state_bar(&self, t_bar: f64) -> [f64; BLOCK] {
        let Some(first) = self.segments.first() else {
            return [f64::NAN; BLOCK];
        };
        let (start, end) = (first.start(), self.tmax());
        let t = t_bar.clamp(start.min(end), start.max(end));
        let idx = self
            .segments
            .iter()
            .position(|seg| t <= seg.end())
            .unwrap_or(self.segments.len() - 1);
        self.segments[idx].interpolate(t)
    }

    pub fn r_bar(&self, t_bar: f64) -> Vector3<f64> {
        Vector3::from_column_slice(&self.state_bar(t_bar)[0..3])
    }

    pub fn v_bar(&self, t_bar: f64) -> Vector3<f64> {
        Vector3::from_column_slice(&self.state_bar(t_bar)[3..6])
    }

    pub fn pv_bar(&self, t_bar: f64) -> Vector3<f64> {
        Vector3::from_column_slice(&self.state_bar(t_bar)[6..9])
    }

    pub fn pr_bar(&self, t_bar: f64) -> Vector3<f64> {
        Vector3::from_column_slice(&self.state_bar(t_bar)[9..12])
    }

    pub fn m_bar(&self, t_bar: f64) -> f64 {
        self.state_bar(t_bar)[12]
    }

    fn to_bar(&self, t: f64) -> f64 {
        (t - self.t0) / self.scaling.t_scale
    }

    /// Position at absolute time (m).
    pub fn r(&self, t: f64) -> Vector3<f64> {
        self.r_bar(self.to_bar(t)) * self.scaling.r_scale
    }

    /// Velocity at absolute time (m/s).
    pub fn v(&self, t: f64) -> Vector3<f64> {
        self.v_bar(self.to_bar(t)) * self.scaling.v_scale
    }

    /// Primer vector at absolute time; its direction is the thrust direction.
    pub fn pv(&self, t: f64) -> Vector3<f64> {
        self.pv_bar(self.to_bar(t))
    }

    pub fn pr(&self, t: f64) -> Vector3<f64> {
        self.pr_bar(self.to_bar(t))
    }

    /// Mass at absolute time (kg).
    pub fn m(&self, t: f64) -> f64 {
        self.m_bar(self.to_bar(t)) * self.scaling.m_scale
    }
}
