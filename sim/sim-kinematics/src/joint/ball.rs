//! Ball joint: free rotation in SO(3) with exponential-map coordinates.
//!
//! The three coordinates form an axis-angle vector. The chart is singular at
//! an angle of π, where the log map cannot pick an axis sign; callers that
//! rotate that far should expect coordinate jumps.

use nalgebra::{Isometry3, Matrix3, UnitQuaternion, Vector3};
use sim_types::JointType;

use super::{JointChart, MultiDofJoint};
use crate::spatial::{
    ad_t_jac, exp_angular, exp_map_jac, exp_map_jac_dot, exp_map_rot, log_map, SpatialJacobian,
};

/// Exponential-map chart of SO(3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BallChart;

/// Three-DOF rotational joint.
///
/// # Example
///
/// ```
/// use nalgebra::Vector3;
/// use sim_kinematics::joint::BallJoint;
/// use sim_types::JointProperties;
///
/// let mut joint = BallJoint::new(JointProperties::new("shoulder"));
/// joint.set_velocities(Vector3::new(0.0, 0.0, 1.0));
/// joint.integrate_positions(std::f64::consts::FRAC_PI_2).unwrap();
///
/// let rotated = joint.local_transform() * nalgebra::Point3::new(1.0, 0.0, 0.0);
/// assert!((rotated.y - 1.0).abs() < 1e-9);
/// ```
pub type BallJoint = MultiDofJoint<BallChart, 3>;

/// Angular rows of the local Jacobian, `R_child · J(-q)`.
///
/// Position differences and integration pull back through this block, so
/// a rotated child mounting rotates the coordinate updates with it.
fn angular_jacobian(q: &Vector3<f64>, child_to_joint: &Isometry3<f64>) -> Matrix3<f64> {
    child_to_joint.rotation.to_rotation_matrix().into_inner() * exp_map_jac(&-q)
}

impl JointChart<3> for BallChart {
    fn joint_type(&self) -> JointType {
        JointType::Ball
    }

    fn dof_suffix(&self, index: usize) -> &'static str {
        ["_x", "_y", "_z"].get(index).copied().unwrap_or("")
    }

    fn convert_to_transform(&self, positions: &Vector3<f64>) -> Isometry3<f64> {
        exp_angular(positions)
    }

    fn local_jacobian(
        &self,
        positions: &Vector3<f64>,
        child_to_joint: &Isometry3<f64>,
    ) -> SpatialJacobian<3> {
        let mut jac = SpatialJacobian::<3>::zeros();
        jac.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&exp_map_jac(&-positions));
        ad_t_jac(child_to_joint, &jac)
    }

    fn local_jacobian_time_deriv(
        &self,
        positions: &Vector3<f64>,
        velocities: &Vector3<f64>,
        child_to_joint: &Isometry3<f64>,
    ) -> SpatialJacobian<3> {
        let mut d_jac = SpatialJacobian::<3>::zeros();
        d_jac
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&exp_map_jac_dot(positions, velocities).transpose());
        ad_t_jac(child_to_joint, &d_jac)
    }

    /// `(R_child · J(-q0))⁻¹ · log(exp(-q0) · exp(q1))`.
    ///
    /// # Panics
    ///
    /// Panics where the exp-map Jacobian is singular (angles of 2π).
    fn position_differences(
        &self,
        q0: &Vector3<f64>,
        q1: &Vector3<f64>,
        child_to_joint: &Isometry3<f64>,
    ) -> Vector3<f64> {
        let Some(jw_inv) = angular_jacobian(q0, child_to_joint).try_inverse() else {
            panic!("exp-map Jacobian is singular at {q0:?}");
        };
        jw_inv * log_map(&(exp_map_rot(&-q0) * exp_map_rot(q1)))
    }

    /// Integrates on the rotation manifold: `R ← R · exp(R_child J(-q) q̇ dt)`.
    fn integrate_positions(
        &self,
        positions: &Vector3<f64>,
        velocities: &Vector3<f64>,
        dt: f64,
        child_to_joint: &Isometry3<f64>,
    ) -> Vector3<f64> {
        let omega = angular_jacobian(positions, child_to_joint) * velocities;
        log_map(&(exp_map_rot(positions) * exp_map_rot(&(omega * dt))))
    }
}

impl MultiDofJoint<BallChart, 3> {
    /// Rotation for exp-map coordinates.
    #[must_use]
    pub fn convert_to_rotation(positions: &Vector3<f64>) -> UnitQuaternion<f64> {
        exp_map_rot(positions)
    }

    /// Pure rotation transform for exp-map coordinates.
    #[must_use]
    pub fn convert_to_transform(positions: &Vector3<f64>) -> Isometry3<f64> {
        exp_angular(positions)
    }

    /// Exp-map coordinates of a rotation, with angle in `[0, π]`.
    #[must_use]
    pub fn convert_to_positions(rotation: &UnitQuaternion<f64>) -> Vector3<f64> {
        log_map(rotation)
    }
}
