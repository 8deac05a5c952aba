//! Launch-specific residuals appended after the multiple-shooting block.

use crate::dynamics::BLOCK;
use crate::traits::{constant, Scalar};

/// Weight applied to a negative final-arc burn time.
pub const NEGATIVE_BURN_PENALTY: f64 = 1000.0;

/// Number of residuals written by [`append_launch_residuals`].
pub const LAUNCH_RESIDUALS: usize = 3;

/// `|[pv0, pr0]| - 1` for the costate of the first arc.
///
/// The costate is only defined up to a positive factor; pinning its norm
/// removes that freedom and stands in for the `H(tf) = 0` condition.
pub fn costate_norm_residual<T: Scalar>(y: &[T], arc_index: usize) -> T {
    let costate = &y[arc_index + 6..arc_index + 12];
    costate
        .iter()
        .fold(T::zero(), |acc, &c| acc + c * c)
        .sqrt()
        - T::one()
}

/// Keeps the free burn time `y[0]` non-negative through the slack `y[1]`.
pub fn positive_arc_time_residual<T: Scalar>(y: &[T]) -> T {
    if y[0] < T::zero() {
        (y[0] - y[1] * y[1]) * constant(NEGATIVE_BURN_PENALTY)
    } else {
        y[1] * y[1]
    }
}

/// Holds the auxiliary parameter `y[2]` at zero.
pub fn auxiliary_residual<T: Scalar>(y: &[T]) -> T {
    y[2] * y[2]
}

/// Writes the three launch residuals after the `13 * num_arcs` shooting
/// entries, then squares the whole vector for the least-squares solver.
pub fn append_launch_residuals<T: Scalar>(y: &[T], arc_index: usize, num_arcs: usize, z: &mut [T]) {
    let n = BLOCK * num_arcs;
    z[n] = costate_norm_residual(y, arc_index);
    z[n + 1] = positive_arc_time_residual(y);
    z[n + 2] = auxiliary_residual(y);
    square_in_place(z);
}

pub fn square_in_place<T: Scalar>(z: &mut [T]) {
    for v in z.iter_mut() {
        *v = *v * *v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn penalty_grows_with_negative_burn_time() {
        for &slack in &[0.0, 0.3, -1.2] {
            let mut previous = f64::NEG_INFINITY;
            for k in 1..=50 {
                let t = -0.02 * k as f64;
                let z = positive_arc_time_residual(&[t, slack, 0.0]).powi(2);
                assert!(z >= previous, "penalty fell at y0 = {}", t);
                previous = z;
            }
        }
    }

    #[test]
    fn non_negative_burn_time_sees_only_slack() {
        for &t in &[0.0, 1e-9, 0.4, 12.0] {
            for &slack in &[0.0, 0.5, -2.0] {
                assert_eq!(positive_arc_time_residual(&[t, slack, 9.0]), slack * slack);
            }
        }
    }

    #[test]
    fn costate_norm_reads_first_arc_block() {
        let mut y = vec![0.0; 3 + 13];
        y[3 + 6] = 3.0;
        y[3 + 11] = 4.0;
        assert_eq!(costate_norm_residual(&y, 3), 4.0);
    }

    #[test]
    fn appended_vector_is_fully_squared() {
        let mut y = vec![0.0; 3 + 13];
        y[0] = -0.5;
        y[1] = 0.5;
        y[2] = 2.0;
        y[3 + 6] = 1.0;
        let mut z = vec![-2.0; 13 + LAUNCH_RESIDUALS];
        append_launch_residuals(&y, 3, 1, &mut z);
        assert!(z[..13].iter().all(|&v| v == 4.0));
        assert_eq!(z[13], 0.0);
        assert_eq!(z[14], ((-0.5 - 0.25) * NEGATIVE_BURN_PENALTY).powi(2));
        assert_eq!(z[15], 16.0);
    }
}
