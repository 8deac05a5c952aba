//! Three-vector helpers over any [`Scalar`].
//!
//! nalgebra carries the `f64` side of the public API; these cover the
//! generic residual path where the element type may be a dual number.

use crate::traits::Scalar;

pub type Vec3<T> = [T; 3];

/// Reads three consecutive entries starting at `offset`.
#[inline]
pub fn at<T: Copy>(values: &[T], offset: usize) -> Vec3<T> {
    [values[offset], values[offset + 1], values[offset + 2]]
}

#[inline]
pub fn dot<T: Scalar>(a: &Vec3<T>, b: &Vec3<T>) -> T {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn cross<T: Scalar>(a: &Vec3<T>, b: &Vec3<T>) -> Vec3<T> {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub fn norm<T: Scalar>(a: &Vec3<T>) -> T {
    dot(a, a).sqrt()
}

/// Lifts an `f64` triple into the scalar type.
#[inline]
pub fn lift<T: Scalar>(a: &[f64; 3]) -> Vec3<T> {
    [
        crate::traits::constant(a[0]),
        crate::traits::constant(a[1]),
        crate::traits::constant(a[2]),
    ]
}
