//! Rigid pose generic over the CCD scalar.

use std::ops::{Add, Mul};

use ccd_math::Scalar;
use nalgebra::{DMatrix, DVector};

/// Position and orientation of a rigid body.
///
/// The translation has `dim` entries; the rotation is a scalar angle in 2D
/// and an axis-angle vector in 3D. Keeping the rotation as a plain vector
/// (rather than a matrix or quaternion) is what lets the same pose type be
/// interpolated and differentiated: a screwing trajectory between two poses
/// is the componentwise linear interpolation of their dof vectors, and the
/// rotation matrix is constructed on demand through any [`Scalar`].
#[derive(Debug, Clone, PartialEq)]
pub struct Pose<S: Scalar> {
    /// Position of the center of mass.
    pub position: DVector<S>,
    /// Rotation about the center of mass (angle in 2D, axis-angle in 3D).
    pub rotation: DVector<S>,
}

impl<S: Scalar> Pose<S> {
    /// Create a pose from its parts.
    ///
    /// # Example
    ///
    /// ```
    /// use ccd_types::Pose;
    /// use nalgebra::dvector;
    ///
    /// let pose = Pose::new(dvector![1.0, 2.0], dvector![0.0]);
    /// assert_eq!(pose.dim(), 2);
    /// assert_eq!(pose.ndof(), 3);
    /// ```
    #[must_use]
    pub fn new(position: DVector<S>, rotation: DVector<S>) -> Self {
        debug_assert!(matches!(
            (position.len(), rotation.len()),
            (2, 1) | (3, 3)
        ));
        Self { position, rotation }
    }

    /// The identity pose of the given spatial dimension.
    #[must_use]
    pub fn zero(dim: usize) -> Self {
        Self {
            position: DVector::from_element(dim, S::zero()),
            rotation: DVector::from_element(Self::dim_to_rot_ndof(dim), S::zero()),
        }
    }

    /// Spatial dimension (2 or 3).
    #[must_use]
    pub fn dim(&self) -> usize {
        self.position.len()
    }

    /// Translational degrees of freedom.
    #[must_use]
    pub fn pos_ndof(&self) -> usize {
        self.position.len()
    }

    /// Rotational degrees of freedom.
    #[must_use]
    pub fn rot_ndof(&self) -> usize {
        self.rotation.len()
    }

    /// Total degrees of freedom.
    #[must_use]
    pub fn ndof(&self) -> usize {
        self.pos_ndof() + self.rot_ndof()
    }

    /// Degrees of freedom of a pose in the given spatial dimension.
    #[must_use]
    pub fn dim_to_ndof(dim: usize) -> usize {
        dim + Self::dim_to_rot_ndof(dim)
    }

    /// Rotational degrees of freedom in the given spatial dimension.
    #[must_use]
    pub fn dim_to_rot_ndof(dim: usize) -> usize {
        match dim {
            2 => 1,
            3 => 3,
            _ => 0,
        }
    }

    /// Linear interpolation between two poses at parameter `t`.
    ///
    /// # Example
    ///
    /// ```
    /// use ccd_types::Pose;
    /// use nalgebra::dvector;
    ///
    /// let p0 = Pose::new(dvector![0.0, 0.0], dvector![0.0]);
    /// let p1 = Pose::new(dvector![2.0, 0.0], dvector![1.0]);
    /// let mid = Pose::interpolate(&p0, &p1, 0.5);
    /// assert_eq!(mid.position[0], 1.0);
    /// assert_eq!(mid.rotation[0], 0.5);
    /// ```
    #[must_use]
    pub fn interpolate(p0: &Self, p1: &Self, t: S) -> Self {
        Self {
            position: &p0.position + (&p1.position - &p0.position) * t.clone(),
            rotation: &p0.rotation + (&p1.rotation - &p0.rotation) * t,
        }
    }

    /// Flatten into a dof vector `[position; rotation]`.
    #[must_use]
    pub fn to_dof(&self) -> DVector<S> {
        let mut dof = DVector::from_element(self.ndof(), S::zero());
        for i in 0..self.pos_ndof() {
            dof[i] = self.position[i].clone();
        }
        for i in 0..self.rot_ndof() {
            dof[self.pos_ndof() + i] = self.rotation[i].clone();
        }
        dof
    }

    /// Rebuild a pose from a dof vector produced by [`Pose::to_dof`].
    #[must_use]
    pub fn from_dof(dof: &DVector<S>, dim: usize) -> Self {
        debug_assert_eq!(dof.len(), Self::dim_to_ndof(dim));
        Self {
            position: DVector::from_fn(dim, |i, _| dof[i].clone()),
            rotation: DVector::from_fn(Self::dim_to_rot_ndof(dim), |i, _| dof[dim + i].clone()),
        }
    }

    /// Flatten a sequence of poses into one global dof vector.
    #[must_use]
    pub fn poses_to_dofs(poses: &[Self]) -> DVector<S> {
        let ndof: usize = poses.iter().map(Self::ndof).sum();
        let mut dofs = DVector::from_element(ndof, S::zero());
        let mut offset = 0;
        for pose in poses {
            let dof = pose.to_dof();
            for i in 0..dof.len() {
                dofs[offset + i] = dof[i].clone();
            }
            offset += dof.len();
        }
        dofs
    }

    /// Split a global dof vector back into per-body poses.
    #[must_use]
    pub fn dofs_to_poses(dofs: &DVector<S>, dim: usize) -> Vec<Self> {
        let ndof = Self::dim_to_ndof(dim);
        debug_assert_eq!(dofs.len() % ndof, 0);
        (0..dofs.len() / ndof)
            .map(|b| {
                let dof = DVector::from_fn(ndof, |i, _| dofs[b * ndof + i].clone());
                Self::from_dof(&dof, dim)
            })
            .collect()
    }

    /// Construct the rotation matrix of this pose.
    ///
    /// 2D: rotation by the scalar angle. 3D: Rodrigues' formula on the
    /// axis-angle vector. For a rotation vector whose squared magnitude is
    /// certainly below machine noise the first-order expansion `I + K` is
    /// used; the trigonometric coefficients would otherwise divide by a
    /// vanishing angle.
    #[must_use]
    pub fn construct_rotation_matrix(&self) -> DMatrix<S> {
        match self.dim() {
            2 => {
                let c = self.rotation[0].cos();
                let s = self.rotation[0].sin();
                let mut r = DMatrix::from_element(2, 2, S::zero());
                r[(0, 0)] = c.clone();
                r[(0, 1)] = -s.clone();
                r[(1, 0)] = s;
                r[(1, 1)] = c;
                r
            }
            3 => {
                let k = self.hat();
                let identity = DMatrix::from_diagonal_element(3, 3, S::one());
                let theta_sq = self.rotation.dot(&self.rotation);
                if theta_sq.value() < 1e-24 {
                    return identity + k;
                }
                let theta = theta_sq.sqrt();
                let a = theta.sin() / theta.clone();
                let b = (S::one() - theta.cos()) / theta_sq;
                let k_sq = &k * &k;
                identity + k.map(|e| e * a.clone()) + k_sq.map(|e| e * b.clone())
            }
            dim => unreachable!("unsupported pose dimension {dim}"),
        }
    }

    /// The skew-symmetric (hat) matrix of the rotation vector (3D only).
    #[must_use]
    pub fn hat(&self) -> DMatrix<S> {
        debug_assert_eq!(self.rot_ndof(), 3);
        let (x, y, z) = (
            self.rotation[0].clone(),
            self.rotation[1].clone(),
            self.rotation[2].clone(),
        );
        let mut k = DMatrix::from_element(3, 3, S::zero());
        k[(0, 1)] = -z.clone();
        k[(0, 2)] = y.clone();
        k[(1, 0)] = z;
        k[(1, 2)] = -x.clone();
        k[(2, 0)] = -y;
        k[(2, 1)] = x;
        k
    }
}

impl Pose<f64> {
    /// Lift an `f64` pose into another scalar type.
    #[must_use]
    pub fn cast<S: Scalar>(&self) -> Pose<S> {
        Pose {
            position: self.position.map(S::from_f64),
            rotation: self.rotation.map(S::from_f64),
        }
    }

    /// Zero the entries flagged in `is_dof_fixed` (`[position; rotation]`
    /// order).
    pub fn zero_dof(&mut self, is_dof_fixed: &[bool]) {
        debug_assert_eq!(is_dof_fixed.len(), self.ndof());
        for i in 0..self.pos_ndof() {
            if is_dof_fixed[i] {
                self.position[i] = 0.0;
            }
        }
        for i in 0..self.rot_ndof() {
            if is_dof_fixed[self.pos_ndof() + i] {
                self.rotation[i] = 0.0;
            }
        }
    }
}

impl<S: Scalar> Add for Pose<S> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            position: self.position + rhs.position,
            rotation: self.rotation + rhs.rotation,
        }
    }
}

impl<S: Scalar> Mul<S> for Pose<S> {
    type Output = Self;

    fn mul(self, rhs: S) -> Self {
        Self {
            position: self.position * rhs.clone(),
            rotation: self.rotation * rhs,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ccd_math::Interval;
    use nalgebra::dvector;

    #[test]
    fn interpolation_endpoints() {
        let p0 = Pose::new(dvector![0.0, 0.0], dvector![0.0]);
        let p1 = Pose::new(dvector![2.0, -4.0], dvector![std::f64::consts::PI]);
        let at0 = Pose::interpolate(&p0, &p1, 0.0);
        let at1 = Pose::interpolate(&p0, &p1, 1.0);
        assert_eq!(at0, p0);
        assert_eq!(at1, p1);
        let mid = Pose::interpolate(&p0, &p1, 0.5);
        assert_relative_eq!(mid.position[0], 1.0);
        assert_relative_eq!(mid.rotation[0], std::f64::consts::FRAC_PI_2);
    }

    #[test]
    fn rotation_matrix_2d() {
        let pose = Pose::new(dvector![0.0, 0.0], dvector![std::f64::consts::FRAC_PI_2]);
        let r = pose.construct_rotation_matrix();
        // Rotating the x axis by pi/2 gives the y axis.
        assert_relative_eq!(r[(0, 0)], 0.0, epsilon = 1e-15);
        assert_relative_eq!(r[(1, 0)], 1.0, epsilon = 1e-15);
    }

    #[test]
    fn rotation_matrix_3d_quarter_turn_about_z() {
        let pose = Pose::new(
            dvector![0.0, 0.0, 0.0],
            dvector![0.0, 0.0, std::f64::consts::FRAC_PI_2],
        );
        let r = pose.construct_rotation_matrix();
        let x = dvector![1.0, 0.0, 0.0];
        let rotated = &r * &x;
        assert_relative_eq!(rotated[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(rotated[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(rotated[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn rotation_matrix_3d_zero_angle() {
        let pose = Pose::<f64>::zero(3);
        let r = pose.construct_rotation_matrix();
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(r[(i, j)], f64::from(u8::from(i == j)));
            }
        }
    }

    #[test]
    fn interval_rotation_encloses_pointwise() {
        let angle = 0.3;
        let exact = Pose::new(dvector![0.0, 0.0], dvector![angle]).construct_rotation_matrix();
        let pose_i: Pose<Interval> =
            Pose::new(dvector![0.0, 0.0], dvector![angle]).cast::<Interval>();
        let enclosed = pose_i.construct_rotation_matrix();
        for i in 0..2 {
            for j in 0..2 {
                assert!(enclosed[(i, j)].contains(exact[(i, j)]));
            }
        }
    }

    #[test]
    fn dof_round_trip() {
        let pose = Pose::new(dvector![1.0, 2.0, 3.0], dvector![0.1, -0.2, 0.3]);
        let dof = pose.to_dof();
        assert_eq!(dof.len(), 6);
        let back = Pose::from_dof(&dof, 3);
        assert_eq!(back, pose);
    }

    #[test]
    fn screwing_trajectory_add_mul_form() {
        // pose + displacement * t is the interpolation used by the narrow
        // phase when the displacement is a pose delta.
        let pose = Pose::new(dvector![1.0, 0.0], dvector![0.0]);
        let displacement = Pose::new(dvector![0.0, -2.0], dvector![1.0]);
        let at_half = pose.clone() + displacement * 0.5;
        assert_relative_eq!(at_half.position[1], -1.0);
        assert_relative_eq!(at_half.rotation[0], 0.5);
    }
}
