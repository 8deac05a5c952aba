//! The `ascent_core` crate solves the two-point boundary value problem of
//! optimal multi-stage ascent guidance.
//! Residuals are generic over `Scalar`, so the same code runs on `f64` and on
//! dual numbers, which is how the root finder gets exact Jacobians.
//!
//! Key components:
//! - **Boundary**: terminal insertion conditions with a free ascending node.
//! - **Problem**: multiple-shooting residual over the burn arcs (`TrajectoryModel` seam).
//! - **Bootstrap**: stage-by-stage cold start of the free-variable vector.
//! - **Driver**: `AscentGuidance`, one call per guidance cycle.

pub mod arc;
pub mod autodiff;
pub mod boundary;
pub mod bootstrap;
pub mod driver;
pub mod dynamics;
pub mod launch;
pub mod levenberg;
pub mod problem;
pub mod residual;
pub mod scaling;
pub mod solution;
pub mod solvers;
pub mod traits;
pub mod vector;

pub use arc::{normalize_arcs, Arc, NormalizedArc};
pub use boundary::{ReferenceFrame, TerminalTarget};
pub use driver::{AscentGuidance, FailureReason, GuidanceSettings, OptimizationOutcome};
pub use launch::LaunchModel;
pub use problem::{PontryaginProblem, TrajectoryModel};
pub use solution::Solution;
