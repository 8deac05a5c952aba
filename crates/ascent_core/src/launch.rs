use crate::boundary::{flight_angle_4_constraint, ReferenceFrame, TerminalTarget};
use crate::problem::TrajectoryModel;
use crate::residual::{append_launch_residuals, LAUNCH_RESIDUALS};
use crate::scaling::Scaling;
use crate::traits::Scalar;
use serde::{Deserialize, Serialize};

/// Solver parameters ahead of the arc blocks: final-arc burn time, its
/// positivity slack, and the auxiliary parameter.
pub const LAUNCH_ARC_INDEX: usize = 3;

/// Ascent to orbit with four terminal constraints and a free node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaunchModel {
    pub target: TerminalTarget,
    pub frame: ReferenceFrame,
}

impl LaunchModel {
    pub fn new(target: TerminalTarget) -> Self {
        Self {
            target,
            frame: ReferenceFrame::default(),
        }
    }

    pub fn with_frame(mut self, frame: ReferenceFrame) -> Self {
        self.frame = frame;
        self
    }
}

impl TrajectoryModel for LaunchModel {
    fn arc_index(&self) -> usize {
        LAUNCH_ARC_INDEX
    }

    fn extra_residuals(&self) -> usize {
        LAUNCH_RESIDUALS
    }

    fn boundary_residual<T: Scalar>(&self, scaling: &Scaling, terminal: &[T], out: &mut [T]) {
        flight_angle_4_constraint(&self.target, &self.frame, scaling, terminal, out);
    }

    fn complete_residual<T: Scalar>(&self, y: &[T], num_arcs: usize, z: &mut [T]) {
        append_launch_residuals(y, LAUNCH_ARC_INDEX, num_arcs, z);
    }

    fn seed_parameters(&self, tgo_bar: f64) -> Vec<f64> {
        vec![tgo_bar, 0.0, 0.0]
    }
}
