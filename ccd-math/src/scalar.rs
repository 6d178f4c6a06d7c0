//! The scalar trait shared by all geometric kernels.

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use num_traits::{One, Zero};

/// A number type the geometric and barrier kernels can be instantiated over.
///
/// Implementors: `f64`, [`crate::Interval`], [`crate::Dual1`],
/// [`crate::Dual2`]. The supertraits make `nalgebra` vectors and matrices of
/// the scalar fully usable (`+`, `-`, scalar `*`, `dot`, matrix-vector
/// products).
///
/// `value` returns the primal part: the number itself for `f64`, the
/// midpoint for an interval, the undifferentiated value for duals. It exists
/// for branching on magnitudes (degeneracy guards, polynomial
/// classification) and must never be used to smuggle a scalar across an
/// interface at a different type.
pub trait Scalar:
    nalgebra::Scalar
    + Zero
    + One
    + Add<Output = Self>
    + AddAssign
    + Sub<Output = Self>
    + SubAssign
    + Mul<Output = Self>
    + MulAssign
    + Div<Output = Self>
    + DivAssign
    + Neg<Output = Self>
{
    /// Lift a constant into the scalar type.
    fn from_f64(v: f64) -> Self;

    /// The primal (undifferentiated, midpoint) value.
    fn value(&self) -> f64;

    /// Square root.
    fn sqrt(&self) -> Self;

    /// Absolute value.
    fn abs(&self) -> Self;

    /// Sine.
    fn sin(&self) -> Self;

    /// Cosine.
    fn cos(&self) -> Self;

    /// Natural logarithm; callers guarantee a positive argument.
    fn ln(&self) -> Self;

    /// `self * self`, exposed so intervals can produce tight bounds.
    fn square(&self) -> Self {
        self.clone() * self.clone()
    }
}

impl Scalar for f64 {
    fn from_f64(v: f64) -> Self {
        v
    }

    fn value(&self) -> f64 {
        *self
    }

    fn sqrt(&self) -> Self {
        f64::sqrt(*self)
    }

    fn abs(&self) -> Self {
        f64::abs(*self)
    }

    fn sin(&self) -> Self {
        f64::sin(*self)
    }

    fn cos(&self) -> Self {
        f64::cos(*self)
    }

    fn ln(&self) -> Self {
        f64::ln(*self)
    }
}
