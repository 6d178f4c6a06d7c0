//! Scalar abstraction for continuous collision detection.
//!
//! Every geometric predicate in the CCD pipeline is written once, generic
//! over a [`Scalar`], and instantiated for several number types:
//!
//! - [`f64`] for plain evaluation,
//! - [`Interval`] for certified enclosures (the narrow phase),
//! - [`Dual1`] / [`Dual2`] for first- and second-order forward-mode
//!   automatic differentiation (barrier gradients and Hessians).
//!
//! The scalar types never convert into each other implicitly; callers pick
//! the instantiation at the boundary and keep it through the whole
//! computation.
//!
//! The crate also provides [`interval_root_finder`], the certified bisection
//! solver used by every narrow-phase time-of-impact query.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Interval/dual constructors allocate or round
    clippy::suboptimal_flops,          // mul_add would break outward rounding symmetry
)]

mod dual;
mod interval;
mod root_finder;
mod scalar;

pub use dual::{Dual1, Dual2};
pub use interval::{Interval, IntervalOrdering};
pub use root_finder::interval_root_finder;
pub use scalar::Scalar;
