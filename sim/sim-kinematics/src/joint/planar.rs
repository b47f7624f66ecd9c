//! Planar joint: two translations in a plane plus rotation about its normal.
//!
//! Coordinates are `[q0, q1, q2]`: displacement along the two translational
//! axes, then the angle about `t1 × t2`.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use sim_types::{JointType, KinematicsError, PlaneType, Result};

use super::{JointChart, MultiDofJoint};
use crate::spatial::{ad_t_jac, spatial_vector, SpatialJacobian};

/// Below this norm two plane axes are treated as parallel.
const PARALLEL_EPSILON: f64 = 1e-9;

/// Plane geometry of a planar joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarChart {
    plane_type: PlaneType,
    translation_axes: [Vector3<f64>; 2],
    rotation_axis: Vector3<f64>,
}

impl Default for PlanarChart {
    fn default() -> Self {
        Self::canonical(PlaneType::XY)
    }
}

impl PlanarChart {
    /// Chart for one of the XY, YZ or ZX planes.
    ///
    /// [`PlaneType::Arbitrary`] falls back to the XY axes.
    #[must_use]
    pub fn canonical(plane_type: PlaneType) -> Self {
        let (t1, t2, axis) = plane_type
            .axes()
            .unwrap_or_else(|| (Vector3::x(), Vector3::y(), Vector3::z()));
        Self {
            plane_type,
            translation_axes: [t1, t2],
            rotation_axis: axis,
        }
    }

    /// Chart for the plane spanned by `t1` and `t2`.
    ///
    /// `t2` is orthogonalized against `t1` and both are normalized.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicsError::InvalidConfig`] if the axes are parallel or
    /// degenerate.
    pub fn arbitrary(t1: &Vector3<f64>, t2: &Vector3<f64>) -> Result<Self> {
        let n1 = t1.norm();
        if !n1.is_finite() || n1 < PARALLEL_EPSILON {
            return Err(KinematicsError::invalid_config(
                "planar joint translation axis has zero length",
            ));
        }
        let t1 = t1 / n1;
        let t2 = t2 - t1 * t1.dot(t2);
        let n2 = t2.norm();
        if !n2.is_finite() || n2 < PARALLEL_EPSILON {
            return Err(KinematicsError::invalid_config(
                "planar joint translation axes are parallel",
            ));
        }
        let t2 = t2 / n2;

        Ok(Self {
            plane_type: PlaneType::Arbitrary,
            translation_axes: [t1, t2],
            rotation_axis: t1.cross(&t2),
        })
    }

    /// Which plane this chart moves in.
    #[must_use]
    pub fn plane_type(&self) -> PlaneType {
        self.plane_type
    }

    /// Unit translational axes.
    #[must_use]
    pub fn translation_axes(&self) -> &[Vector3<f64>; 2] {
        &self.translation_axes
    }

    /// Unit rotational axis.
    #[must_use]
    pub fn rotation_axis(&self) -> &Vector3<f64> {
        &self.rotation_axis
    }

    fn rotation(&self, angle: f64) -> UnitQuaternion<f64> {
        UnitQuaternion::from_scaled_axis(self.rotation_axis * angle)
    }
}

/// Three-DOF joint moving in a plane.
pub type PlanarJoint = MultiDofJoint<PlanarChart, 3>;

impl JointChart<3> for PlanarChart {
    fn joint_type(&self) -> JointType {
        JointType::Planar
    }

    fn dof_suffix(&self, index: usize) -> &'static str {
        match index {
            0 | 1 => self.plane_type.dof_suffixes()[index],
            2 => "_rot",
            _ => "",
        }
    }

    fn convert_to_transform(&self, positions: &Vector3<f64>) -> Isometry3<f64> {
        let [t1, t2] = self.translation_axes;
        let offset = t1 * positions[0] + t2 * positions[1];
        Isometry3::from_parts(Translation3::from(offset), self.rotation(positions[2]))
    }

    fn local_jacobian(
        &self,
        positions: &Vector3<f64>,
        child_to_joint: &Isometry3<f64>,
    ) -> SpatialJacobian<3> {
        let undo = self.rotation(-positions[2]);
        let mut jac = SpatialJacobian::<3>::zeros();
        for (i, axis) in self.translation_axes.iter().enumerate() {
            jac.set_column(i, &spatial_vector(&Vector3::zeros(), &(undo * axis)));
        }
        jac.set_column(2, &spatial_vector(&self.rotation_axis, &Vector3::zeros()));
        ad_t_jac(child_to_joint, &jac)
    }

    fn local_jacobian_time_deriv(
        &self,
        positions: &Vector3<f64>,
        velocities: &Vector3<f64>,
        child_to_joint: &Isometry3<f64>,
    ) -> SpatialJacobian<3> {
        let undo = self.rotation(-positions[2]);
        let spin = self.rotation_axis * velocities[2];
        let mut d_jac = SpatialJacobian::<3>::zeros();
        for (i, axis) in self.translation_axes.iter().enumerate() {
            let lin = -spin.cross(&(undo * axis));
            d_jac.set_column(i, &spatial_vector(&Vector3::zeros(), &lin));
        }
        ad_t_jac(child_to_joint, &d_jac)
    }
}

impl MultiDofJoint<PlanarChart, 3> {
    /// Move in the XY plane.
    pub fn set_xy_plane(&mut self) {
        self.update_chart(|chart| *chart = PlanarChart::canonical(PlaneType::XY));
    }

    /// Move in the YZ plane.
    pub fn set_yz_plane(&mut self) {
        self.update_chart(|chart| *chart = PlanarChart::canonical(PlaneType::YZ));
    }

    /// Move in the ZX plane.
    pub fn set_zx_plane(&mut self) {
        self.update_chart(|chart| *chart = PlanarChart::canonical(PlaneType::ZX));
    }

    /// Move in the plane spanned by `t1` and `t2`.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicsError::InvalidConfig`] if the axes are parallel;
    /// the joint is left unchanged.
    pub fn set_arbitrary_plane(&mut self, t1: &Vector3<f64>, t2: &Vector3<f64>) -> Result<()> {
        let next = PlanarChart::arbitrary(t1, t2)?;
        self.update_chart(|chart| *chart = next);
        Ok(())
    }

    /// Which plane the joint moves in.
    #[must_use]
    pub fn plane_type(&self) -> PlaneType {
        self.chart().plane_type()
    }
}
