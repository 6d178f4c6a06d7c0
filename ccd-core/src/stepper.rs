//! Exponential-Euler time stepping for rigid bodies.
//!
//! Produces the unconstrained candidate pose pair consumed by the CCD
//! pipeline: `pose_prev` is saved, the pose is advanced by the current
//! velocity, and the velocity by the current acceleration.

use ccd_types::Pose;
use nalgebra::{DVector, Matrix3, Rotation3, Vector3};

use crate::rigid_body::RigidBody;

/// Advance a 2D body by one step.
pub fn exponential_euler_step_2d(body: &mut RigidBody, gravity: &DVector<f64>, time_step: f64) {
    debug_assert_eq!(body.dim(), 2);

    body.velocity.zero_dof(&body.is_dof_fixed);
    body.pose_prev = body.pose.clone();
    body.velocity_prev = body.velocity.clone();

    body.pose.position += &body.velocity.position * time_step;
    body.pose.rotation[0] += time_step * body.velocity.rotation[0];

    let mut acceleration = Pose::new(
        &body.force.position / body.mass + gravity,
        &body.force.rotation / body.moment_of_inertia[0],
    );
    acceleration.zero_dof(&body.is_dof_fixed);

    body.velocity.position += &acceleration.position * time_step;
    body.velocity.rotation += &acceleration.rotation * time_step;
}

/// Advance a 3D body by one step.
///
/// The orientation update `R1 = R0 + h R0 w_hat` is re-projected onto
/// SO(3) by SVD, and the recovered axis-angle is kept on the same branch
/// as the previous rotation vector. Rotation magnitudes near the branch
/// cut are reported, never normalized away: silently wrapping the angle
/// would teleport the interpolated CCD trajectory.
pub fn exponential_euler_step_3d(body: &mut RigidBody, gravity: &DVector<f64>, time_step: f64) {
    debug_assert_eq!(body.dim(), 3);
    use std::f64::consts::PI;

    body.velocity.zero_dof(&body.is_dof_fixed);
    body.pose_prev = body.pose.clone();
    body.velocity_prev = body.velocity.clone();

    body.pose.position += &body.velocity.position * time_step;

    // R1 = R0 + h * R0 * w_hat, projected back onto SO(3).
    let r0 = pose_rotation_matrix3(&body.pose_prev);
    let omega = Vector3::new(
        body.velocity.rotation[0],
        body.velocity.rotation[1],
        body.velocity.rotation[2],
    );
    let r1 = project_orientation(r0 + r0 * hat(omega) * time_step);

    let rotation = Rotation3::from_matrix_unchecked(r1);
    let (mut axis, mut angle) = match rotation.axis_angle() {
        Some((axis, angle)) => (axis.into_inner(), angle),
        None => (Vector3::zeros(), 0.0),
    };

    // The axis-angle extraction reports angle in [0, pi]. If the axis
    // flipped against the previous rotation vector, take the complementary
    // branch so the trajectory stays continuous.
    let prev = Vector3::new(
        body.pose_prev.rotation[0],
        body.pose_prev.rotation[1],
        body.pose_prev.rotation[2],
    );
    if axis.dot(&prev) < 0.0 {
        angle = 2.0 * PI - angle;
        axis = -axis;
    }
    let prev_norm = prev.norm();
    if (prev_norm > 3.0 * PI / 2.0 && angle < PI / 2.0)
        || (prev_norm < PI / 2.0 && angle > 3.0 * PI / 2.0)
    {
        tracing::warn!(
            previous = prev_norm,
            current = angle,
            "rotation magnitude jumped across the angle branch cut"
        );
    }
    let new_rotation = axis * angle;
    body.pose.rotation = DVector::from_vec(vec![new_rotation.x, new_rotation.y, new_rotation.z]);

    let mut acceleration = Pose::new(
        &body.force.position / body.mass + gravity,
        DVector::from_fn(3, |i, _| body.force.rotation[i] / body.moment_of_inertia[i]),
    );
    acceleration.zero_dof(&body.is_dof_fixed);

    body.velocity.position += &acceleration.position * time_step;
    body.velocity.rotation += &acceleration.rotation * time_step;
}

fn pose_rotation_matrix3(pose: &Pose<f64>) -> Matrix3<f64> {
    let r = pose.construct_rotation_matrix();
    Matrix3::from_fn(|i, j| r[(i, j)])
}

fn hat(v: Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Project a near-rotation matrix onto SO(3) via SVD (`U V^T`).
fn project_orientation(m: Matrix3<f64>) -> Matrix3<f64> {
    let svd = m.svd(true, true);
    match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => {
            let mut r = u * v_t;
            // Guard against a reflection (det = -1).
            if r.determinant() < 0.0 {
                let mut u_fixed = u;
                u_fixed.set_column(2, &(-u.column(2)));
                r = u_fixed * v_t;
            }
            r
        }
        _ => m,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    fn free_body_2d() -> RigidBody {
        RigidBody::from_points(
            dmatrix![
                -1.0, 0.0;
                 1.0, 0.0
            ],
            vec![[0, 1]],
            Vec::new(),
            Pose::new(dvector![0.0, 1.0], dvector![0.0]),
            Pose::new(dvector![1.0, 0.0], dvector![0.5]),
            Pose::zero(2),
            1.0,
            vec![false; 3],
            false,
            None,
        )
    }

    #[test]
    fn step_2d_advances_pose_and_velocity() {
        let mut body = free_body_2d();
        let gravity = dvector![0.0, -10.0];
        exponential_euler_step_2d(&mut body, &gravity, 0.1);

        assert_relative_eq!(body.pose.position[0], 0.1);
        assert_relative_eq!(body.pose.position[1], 1.0);
        assert_relative_eq!(body.pose.rotation[0], 0.05);
        assert_relative_eq!(body.velocity.position[1], -1.0);
        assert_relative_eq!(body.pose_prev.position[1], 1.0);
    }

    #[test]
    fn fixed_dofs_do_not_move() {
        let mut body = free_body_2d();
        body.is_dof_fixed = vec![true, true, true];
        let gravity = dvector![0.0, -10.0];
        exponential_euler_step_2d(&mut body, &gravity, 0.1);
        assert_relative_eq!(body.pose.position[0], 0.0);
        assert_relative_eq!(body.pose.position[1], 1.0);
        assert_relative_eq!(body.velocity.position[1], 0.0);
    }

    #[test]
    fn step_3d_spins_about_the_velocity_axis() {
        let mut body = RigidBody::from_points(
            dmatrix![
                -1.0, 0.0, 0.0;
                 1.0, 0.0, 0.0
            ],
            vec![[0, 1]],
            Vec::new(),
            Pose::zero(3),
            Pose::new(
                dvector![0.0, 0.0, 0.0],
                dvector![0.0, 0.0, std::f64::consts::FRAC_PI_4],
            ),
            Pose::zero(3),
            1.0,
            vec![false; 6],
            false,
            None,
        );
        let gravity = dvector![0.0, 0.0, 0.0];
        exponential_euler_step_3d(&mut body, &gravity, 0.5);

        // The body rotates about +z by roughly h * |omega|.
        assert!(body.pose.rotation[2] > 0.0);
        assert_relative_eq!(body.pose.rotation[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(
            body.pose.rotation[2],
            (0.5 * std::f64::consts::FRAC_PI_4).atan(),
            epsilon = 1e-2
        );
    }
}
