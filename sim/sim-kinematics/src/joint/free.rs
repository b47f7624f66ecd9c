//! Free joint: six DOF floating base.
//!
//! Positions are `[exp-map rotation (3); translation (3)]`. The rotation uses
//! the ball joint chart; the translation is expressed in the parent frame.

use nalgebra::{Isometry3, Matrix3, Translation3, Vector3, Vector6};
use sim_types::JointType;

use super::{BallChart, JointChart, MultiDofJoint};
use crate::spatial::{
    ad_t_jac, exp_map_jac, exp_map_jac_dot, exp_map_rot, log_map, skew, SpatialJacobian,
};

/// Exp-map rotation plus Cartesian translation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreeChart;

/// Six-DOF joint for floating bases.
pub type FreeJoint = MultiDofJoint<FreeChart, 6>;

fn split(q: &Vector6<f64>) -> (Vector3<f64>, Vector3<f64>) {
    (q.fixed_rows::<3>(0).into_owned(), q.fixed_rows::<3>(3).into_owned())
}

fn join(rot: &Vector3<f64>, pos: &Vector3<f64>) -> Vector6<f64> {
    let mut q = Vector6::zeros();
    q.fixed_rows_mut::<3>(0).copy_from(rot);
    q.fixed_rows_mut::<3>(3).copy_from(pos);
    q
}

/// Rotation matrix of `exp(-q_rot)`, mapping parent-frame vectors to the
/// rotated frame.
fn inverse_rotation(q_rot: &Vector3<f64>) -> Matrix3<f64> {
    exp_map_rot(&-q_rot).to_rotation_matrix().into_inner()
}

impl JointChart<6> for FreeChart {
    fn joint_type(&self) -> JointType {
        JointType::Free
    }

    fn dof_suffix(&self, index: usize) -> &'static str {
        ["_rot_x", "_rot_y", "_rot_z", "_pos_x", "_pos_y", "_pos_z"]
            .get(index)
            .copied()
            .unwrap_or("")
    }

    fn convert_to_transform(&self, positions: &Vector6<f64>) -> Isometry3<f64> {
        let (rot, pos) = split(positions);
        Isometry3::from_parts(Translation3::from(pos), exp_map_rot(&rot))
    }

    fn local_jacobian(
        &self,
        positions: &Vector6<f64>,
        child_to_joint: &Isometry3<f64>,
    ) -> SpatialJacobian<6> {
        let (rot, _) = split(positions);
        let mut jac = SpatialJacobian::<6>::zeros();
        jac.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&exp_map_jac(&-rot));
        jac.fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&inverse_rotation(&rot));
        ad_t_jac(child_to_joint, &jac)
    }

    fn local_jacobian_time_deriv(
        &self,
        positions: &Vector6<f64>,
        velocities: &Vector6<f64>,
        child_to_joint: &Isometry3<f64>,
    ) -> SpatialJacobian<6> {
        let (rot, _) = split(positions);
        let (rot_dot, _) = split(velocities);
        let omega = exp_map_jac(&-rot) * rot_dot;

        let mut d_jac = SpatialJacobian::<6>::zeros();
        d_jac
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&exp_map_jac_dot(&rot, &rot_dot).transpose());
        d_jac
            .fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&(-skew(&omega) * inverse_rotation(&rot)));
        ad_t_jac(child_to_joint, &d_jac)
    }

    /// Rotational part as the ball joint, pulled back through the top-left
    /// block of the local Jacobian; translational part `q1 - q0`.
    fn position_differences(
        &self,
        q0: &Vector6<f64>,
        q1: &Vector6<f64>,
        child_to_joint: &Isometry3<f64>,
    ) -> Vector6<f64> {
        let (rot0, pos0) = split(q0);
        let (rot1, pos1) = split(q1);
        join(
            &BallChart.position_differences(&rot0, &rot1, child_to_joint),
            &(pos1 - pos0),
        )
    }

    fn integrate_positions(
        &self,
        positions: &Vector6<f64>,
        velocities: &Vector6<f64>,
        dt: f64,
        child_to_joint: &Isometry3<f64>,
    ) -> Vector6<f64> {
        let (rot, pos) = split(positions);
        let (rot_dot, pos_dot) = split(velocities);
        join(
            &BallChart.integrate_positions(&rot, &rot_dot, dt, child_to_joint),
            &(pos + pos_dot * dt),
        )
    }
}

impl MultiDofJoint<FreeChart, 6> {
    /// Rigid transform for `[rotation; translation]` coordinates.
    #[must_use]
    pub fn convert_to_transform(positions: &Vector6<f64>) -> Isometry3<f64> {
        FreeChart.convert_to_transform(positions)
    }

    /// Coordinates of a rigid transform, with rotation angle in `[0, π]`.
    #[must_use]
    pub fn convert_to_positions(tf: &Isometry3<f64>) -> Vector6<f64> {
        join(&log_map(&tf.rotation), &tf.translation.vector)
    }
}
