//! Forward-mode dual numbers.
//!
//! [`Dual1`] carries a value and a gradient vector; [`Dual2`] additionally
//! carries a Hessian. Arithmetic implements the chain rule, so any kernel
//! written over [`Scalar`](crate::Scalar) differentiates itself.
//!
//! Gradients are *local*: a kernel activates `n` variables (typically
//! `2 * ndof` for a two-body contact) and the caller scatters the resulting
//! gradient into the global system. A dual created with
//! [`Dual1::constant`] carries an empty gradient and behaves as a constant
//! of any arity, which keeps mixed constant/variable expressions cheap.

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use nalgebra::{DMatrix, DVector};
use num_traits::{One, Zero};

use crate::scalar::Scalar;

fn padded_grad(g: &DVector<f64>, n: usize) -> DVector<f64> {
    if g.len() == n {
        g.clone()
    } else {
        debug_assert!(g.is_empty(), "gradient arity mismatch: {} vs {}", g.len(), n);
        DVector::zeros(n)
    }
}

fn padded_hess(h: &DMatrix<f64>, n: usize) -> DMatrix<f64> {
    if h.nrows() == n {
        h.clone()
    } else {
        debug_assert!(h.is_empty(), "hessian arity mismatch: {} vs {}", h.nrows(), n);
        DMatrix::zeros(n, n)
    }
}

/// First-order dual number: value plus gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct Dual1 {
    /// Primal value.
    pub value: f64,
    /// Gradient with respect to the active variables (empty = constant).
    pub grad: DVector<f64>,
}

impl Dual1 {
    /// A constant (zero gradient of any arity).
    #[must_use]
    pub fn constant(value: f64) -> Self {
        Self {
            value,
            grad: DVector::zeros(0),
        }
    }

    /// The `index`-th of `n_vars` active variables.
    ///
    /// # Example
    ///
    /// ```
    /// use ccd_math::{Dual1, Scalar};
    ///
    /// // d/dx sqrt(x^2 + y^2) at (3, 4) is x / r = 0.6.
    /// let x = Dual1::variable(0, 3.0, 2);
    /// let y = Dual1::variable(1, 4.0, 2);
    /// let r = (x.square() + y.square()).sqrt();
    /// assert!((r.value - 5.0).abs() < 1e-12);
    /// assert!((r.grad[0] - 0.6).abs() < 1e-12);
    /// assert!((r.grad[1] - 0.8).abs() < 1e-12);
    /// ```
    #[must_use]
    pub fn variable(index: usize, value: f64, n_vars: usize) -> Self {
        let mut grad = DVector::zeros(n_vars);
        grad[index] = 1.0;
        Self { value, grad }
    }

    /// The gradient, padded with zeros to `n_vars` entries.
    #[must_use]
    pub fn gradient(&self, n_vars: usize) -> DVector<f64> {
        padded_grad(&self.grad, n_vars)
    }

    fn chain(&self, value: f64, derivative: f64) -> Self {
        Self {
            value,
            grad: self.grad.map(|g| derivative * g),
        }
    }
}

impl Add for Dual1 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let n = self.grad.len().max(rhs.grad.len());
        Self {
            value: self.value + rhs.value,
            grad: padded_grad(&self.grad, n) + padded_grad(&rhs.grad, n),
        }
    }
}

impl Sub for Dual1 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        let n = self.grad.len().max(rhs.grad.len());
        Self {
            value: self.value - rhs.value,
            grad: padded_grad(&self.grad, n) - padded_grad(&rhs.grad, n),
        }
    }
}

impl Mul for Dual1 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let n = self.grad.len().max(rhs.grad.len());
        Self {
            value: self.value * rhs.value,
            grad: padded_grad(&self.grad, n) * rhs.value + padded_grad(&rhs.grad, n) * self.value,
        }
    }
}

impl Div for Dual1 {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        let n = self.grad.len().max(rhs.grad.len());
        let denom = rhs.value * rhs.value;
        Self {
            value: self.value / rhs.value,
            grad: (padded_grad(&self.grad, n) * rhs.value
                - padded_grad(&rhs.grad, n) * self.value)
                / denom,
        }
    }
}

impl Neg for Dual1 {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            value: -self.value,
            grad: -self.grad,
        }
    }
}

impl AddAssign for Dual1 {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.clone() + rhs;
    }
}

impl SubAssign for Dual1 {
    fn sub_assign(&mut self, rhs: Self) {
        *self = self.clone() - rhs;
    }
}

impl MulAssign for Dual1 {
    fn mul_assign(&mut self, rhs: Self) {
        *self = self.clone() * rhs;
    }
}

impl DivAssign for Dual1 {
    fn div_assign(&mut self, rhs: Self) {
        *self = self.clone() / rhs;
    }
}

impl Zero for Dual1 {
    fn zero() -> Self {
        Self::constant(0.0)
    }

    fn is_zero(&self) -> bool {
        self.value == 0.0 && self.grad.iter().all(|g| *g == 0.0)
    }
}

impl One for Dual1 {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Scalar for Dual1 {
    fn from_f64(v: f64) -> Self {
        Self::constant(v)
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn sqrt(&self) -> Self {
        let s = self.value.sqrt();
        self.chain(s, 0.5 / s)
    }

    fn abs(&self) -> Self {
        self.chain(self.value.abs(), self.value.signum())
    }

    fn sin(&self) -> Self {
        self.chain(self.value.sin(), self.value.cos())
    }

    fn cos(&self) -> Self {
        self.chain(self.value.cos(), -self.value.sin())
    }

    fn ln(&self) -> Self {
        self.chain(self.value.ln(), 1.0 / self.value)
    }
}

/// Second-order dual number: value, gradient and Hessian.
#[derive(Debug, Clone, PartialEq)]
pub struct Dual2 {
    /// Primal value.
    pub value: f64,
    /// Gradient with respect to the active variables (empty = constant).
    pub grad: DVector<f64>,
    /// Hessian with respect to the active variables (empty = constant).
    pub hess: DMatrix<f64>,
}

impl Dual2 {
    /// A constant (zero derivatives of any arity).
    #[must_use]
    pub fn constant(value: f64) -> Self {
        Self {
            value,
            grad: DVector::zeros(0),
            hess: DMatrix::zeros(0, 0),
        }
    }

    /// The `index`-th of `n_vars` active variables.
    #[must_use]
    pub fn variable(index: usize, value: f64, n_vars: usize) -> Self {
        let mut grad = DVector::zeros(n_vars);
        grad[index] = 1.0;
        Self {
            value,
            grad,
            hess: DMatrix::zeros(n_vars, n_vars),
        }
    }

    /// The gradient, padded with zeros to `n_vars` entries.
    #[must_use]
    pub fn gradient(&self, n_vars: usize) -> DVector<f64> {
        padded_grad(&self.grad, n_vars)
    }

    /// The Hessian, padded with zeros to `n_vars x n_vars`.
    #[must_use]
    pub fn hessian(&self, n_vars: usize) -> DMatrix<f64> {
        padded_hess(&self.hess, n_vars)
    }

    /// Chain rule for a unary function with derivatives `d1`, `d2` at the
    /// primal value.
    fn chain(&self, value: f64, d1: f64, d2: f64) -> Self {
        let g = &self.grad;
        Self {
            value,
            grad: g.map(|gi| d1 * gi),
            hess: self.hess.map(|h| d1 * h) + (g * g.transpose()).map(|o| d2 * o),
        }
    }

    fn reciprocal(&self) -> Self {
        let v = self.value;
        self.chain(1.0 / v, -1.0 / (v * v), 2.0 / (v * v * v))
    }
}

impl Add for Dual2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let n = self.grad.len().max(rhs.grad.len());
        Self {
            value: self.value + rhs.value,
            grad: padded_grad(&self.grad, n) + padded_grad(&rhs.grad, n),
            hess: padded_hess(&self.hess, n) + padded_hess(&rhs.hess, n),
        }
    }
}

impl Sub for Dual2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        let n = self.grad.len().max(rhs.grad.len());
        Self {
            value: self.value - rhs.value,
            grad: padded_grad(&self.grad, n) - padded_grad(&rhs.grad, n),
            hess: padded_hess(&self.hess, n) - padded_hess(&rhs.hess, n),
        }
    }
}

impl Mul for Dual2 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let n = self.grad.len().max(rhs.grad.len());
        let ga = padded_grad(&self.grad, n);
        let gb = padded_grad(&rhs.grad, n);
        let ha = padded_hess(&self.hess, n);
        let hb = padded_hess(&rhs.hess, n);
        Self {
            value: self.value * rhs.value,
            grad: &ga * rhs.value + &gb * self.value,
            hess: ha * rhs.value + hb * self.value + &ga * gb.transpose() + gb * ga.transpose(),
        }
    }
}

impl Div for Dual2 {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        let r = rhs.reciprocal();
        self * r
    }
}

impl Neg for Dual2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            value: -self.value,
            grad: -self.grad,
            hess: -self.hess,
        }
    }
}

impl AddAssign for Dual2 {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.clone() + rhs;
    }
}

impl SubAssign for Dual2 {
    fn sub_assign(&mut self, rhs: Self) {
        *self = self.clone() - rhs;
    }
}

impl MulAssign for Dual2 {
    fn mul_assign(&mut self, rhs: Self) {
        *self = self.clone() * rhs;
    }
}

impl DivAssign for Dual2 {
    fn div_assign(&mut self, rhs: Self) {
        *self = self.clone() / rhs;
    }
}

impl Zero for Dual2 {
    fn zero() -> Self {
        Self::constant(0.0)
    }

    fn is_zero(&self) -> bool {
        self.value == 0.0
            && self.grad.iter().all(|g| *g == 0.0)
            && self.hess.iter().all(|h| *h == 0.0)
    }
}

impl One for Dual2 {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Scalar for Dual2 {
    fn from_f64(v: f64) -> Self {
        Self::constant(v)
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn sqrt(&self) -> Self {
        let s = self.value.sqrt();
        self.chain(s, 0.5 / s, -0.25 / (s * s * s))
    }

    fn abs(&self) -> Self {
        self.chain(self.value.abs(), self.value.signum(), 0.0)
    }

    fn sin(&self) -> Self {
        let (s, c) = self.value.sin_cos();
        self.chain(s, c, -s)
    }

    fn cos(&self) -> Self {
        let (s, c) = self.value.sin_cos();
        self.chain(c, -s, -c)
    }

    fn ln(&self) -> Self {
        let v = self.value;
        self.chain(v.ln(), 1.0 / v, -1.0 / (v * v))
    }
}
