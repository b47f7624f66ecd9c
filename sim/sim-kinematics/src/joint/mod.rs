//! Joints: generalized coordinates to local transforms and Jacobians.
//!
//! A joint maps a small vector of generalized positions `q` to the transform
//! from its parent body to its child body:
//!
//! ```text
//! T(q) = T_parent_to_joint * M(q) * T_child_to_joint⁻¹
//! ```
//!
//! where `M(q)` is the joint motion supplied by a [`JointChart`]. The local
//! Jacobian maps `q̇` to the spatial velocity of the child body expressed in
//! the child body frame, `[angular; linear]`.
//!
//! [`MultiDofJoint`] owns the coordinates and three lazily recomputed caches
//! (transform, Jacobian, Jacobian time derivative):
//!
//! | Write               | Transform | Jacobian | Jacobian rate |
//! |---------------------|-----------|----------|---------------|
//! | positions           | dirty     | dirty    | dirty         |
//! | velocities          |           |          | dirty         |
//! | mounting transforms | dirty     | dirty    | dirty         |
//! | accelerations       |           |          |               |
//!
//! [`Joint`] is the object-safe view over dynamically sized vectors, so a
//! skeleton can keep heterogeneous joints in one collection.

mod ball;
mod free;
mod planar;

pub use ball::{BallChart, BallJoint};
pub use free::{FreeChart, FreeJoint};
pub use planar::{PlanarChart, PlanarJoint};

use std::fmt;

use nalgebra::{DMatrix, DVector, Isometry3, SVector};
use sim_types::{JointProperties, JointType, KinematicsConfig, KinematicsError, Result};
use tracing::trace;

use crate::cache::LazyCache;
use crate::spatial::{is_finite, verify_transform, SpatialJacobian};

/// Coordinate chart of a joint type.
///
/// Implementations are pure functions of their arguments. Mounting transforms
/// are handled by [`MultiDofJoint`], except where the chart works in the
/// child body frame: the Jacobians, and the position updates that are pulled
/// back through them, receive `child_to_joint`.
pub trait JointChart<const DOF: usize>: fmt::Debug {
    /// Kind of joint this chart parameterizes.
    fn joint_type(&self) -> JointType;

    /// Suffix appended to the joint name for coordinate `index`.
    fn dof_suffix(&self, index: usize) -> &'static str;

    /// Joint motion `M(q)`, without mounting transforms.
    fn convert_to_transform(&self, positions: &SVector<f64, DOF>) -> Isometry3<f64>;

    /// Jacobian of the child body's spatial velocity in its own frame.
    fn local_jacobian(
        &self,
        positions: &SVector<f64, DOF>,
        child_to_joint: &Isometry3<f64>,
    ) -> SpatialJacobian<DOF>;

    /// Time derivative of [`JointChart::local_jacobian`] along `velocities`.
    fn local_jacobian_time_deriv(
        &self,
        positions: &SVector<f64, DOF>,
        velocities: &SVector<f64, DOF>,
        child_to_joint: &Isometry3<f64>,
    ) -> SpatialJacobian<DOF>;

    /// Coordinate displacement that takes `q0` to `q1`.
    fn position_differences(
        &self,
        q0: &SVector<f64, DOF>,
        q1: &SVector<f64, DOF>,
        _child_to_joint: &Isometry3<f64>,
    ) -> SVector<f64, DOF> {
        q1 - q0
    }

    /// Positions after moving with `velocities` for `dt`.
    fn integrate_positions(
        &self,
        positions: &SVector<f64, DOF>,
        velocities: &SVector<f64, DOF>,
        dt: f64,
        _child_to_joint: &Isometry3<f64>,
    ) -> SVector<f64, DOF> {
        positions + velocities * dt
    }
}

/// Joint with `DOF` generalized coordinates and cached local kinematics.
#[derive(Debug)]
pub struct MultiDofJoint<C, const DOF: usize> {
    properties: JointProperties,
    chart: C,
    dof_names: Vec<String>,
    positions: SVector<f64, DOF>,
    velocities: SVector<f64, DOF>,
    accelerations: SVector<f64, DOF>,
    config: KinematicsConfig,
    transform: LazyCache<Isometry3<f64>>,
    jacobian: LazyCache<SpatialJacobian<DOF>>,
    jacobian_deriv: LazyCache<SpatialJacobian<DOF>>,
}

impl<C, const DOF: usize> MultiDofJoint<C, DOF>
where
    C: JointChart<DOF> + Default,
{
    /// Create a joint at zero coordinates with the chart's default setup.
    #[must_use]
    pub fn new(properties: JointProperties) -> Self {
        Self::with_chart(properties, C::default())
    }
}

impl<C: JointChart<DOF>, const DOF: usize> MultiDofJoint<C, DOF> {
    /// Create a joint at zero coordinates.
    #[must_use]
    pub fn with_chart(properties: JointProperties, chart: C) -> Self {
        let dof_names = dof_names_for(&chart, &properties.name, DOF);
        Self {
            properties,
            chart,
            dof_names,
            positions: SVector::zeros(),
            velocities: SVector::zeros(),
            accelerations: SVector::zeros(),
            config: KinematicsConfig::default(),
            transform: LazyCache::new(Isometry3::identity()),
            jacobian: LazyCache::new(SpatialJacobian::zeros()),
            jacobian_deriv: LazyCache::new(SpatialJacobian::zeros()),
        }
    }

    /// Use a custom configuration.
    #[must_use]
    pub fn with_config(mut self, config: KinematicsConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &KinematicsConfig {
        &self.config
    }

    /// Mounting and naming.
    #[must_use]
    pub fn properties(&self) -> &JointProperties {
        &self.properties
    }

    /// The coordinate chart.
    #[must_use]
    pub fn chart(&self) -> &C {
        &self.chart
    }

    /// Kind of joint.
    #[must_use]
    pub fn joint_type(&self) -> JointType {
        self.chart.joint_type()
    }

    /// Number of generalized coordinates.
    #[must_use]
    pub fn dof(&self) -> usize {
        DOF
    }

    /// Joint name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.properties.name
    }

    /// Rename the joint and its degrees of freedom.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.properties.name = name.into();
        self.refresh_dof_names();
    }

    /// Name of coordinate `index`.
    #[must_use]
    pub fn dof_name(&self, index: usize) -> Option<&str> {
        self.dof_names.get(index).map(String::as_str)
    }

    /// Names of all coordinates.
    #[must_use]
    pub fn dof_names(&self) -> &[String] {
        &self.dof_names
    }

    fn refresh_dof_names(&mut self) {
        self.dof_names = dof_names_for(&self.chart, &self.properties.name, DOF);
    }

    /// Replace the chart setup in place. All caches go stale.
    pub(crate) fn update_chart(&mut self, f: impl FnOnce(&mut C)) {
        f(&mut self.chart);
        self.refresh_dof_names();
        self.invalidate_position_caches();
    }

    // =========================================================================
    // Coordinates
    // =========================================================================

    /// Generalized positions.
    #[must_use]
    pub fn positions(&self) -> &SVector<f64, DOF> {
        &self.positions
    }

    /// Set the generalized positions.
    pub fn set_positions(&mut self, positions: SVector<f64, DOF>) {
        self.positions = positions;
        self.invalidate_position_caches();
    }

    /// Generalized velocities.
    #[must_use]
    pub fn velocities(&self) -> &SVector<f64, DOF> {
        &self.velocities
    }

    /// Set the generalized velocities.
    pub fn set_velocities(&mut self, velocities: SVector<f64, DOF>) {
        self.velocities = velocities;
        self.jacobian_deriv.invalidate();
    }

    /// Generalized accelerations.
    #[must_use]
    pub fn accelerations(&self) -> &SVector<f64, DOF> {
        &self.accelerations
    }

    /// Set the generalized accelerations.
    pub fn set_accelerations(&mut self, accelerations: SVector<f64, DOF>) {
        self.accelerations = accelerations;
    }

    /// Set the parent-body-to-joint mounting.
    pub fn set_parent_to_joint(&mut self, tf: Isometry3<f64>) {
        self.properties.parent_to_joint = tf;
        self.invalidate_position_caches();
    }

    /// Set the child-body-to-joint mounting.
    pub fn set_child_to_joint(&mut self, tf: Isometry3<f64>) {
        self.properties.child_to_joint = tf;
        self.invalidate_position_caches();
    }

    fn invalidate_position_caches(&self) {
        self.transform.invalidate();
        self.jacobian.invalidate();
        self.jacobian_deriv.invalidate();
    }

    /// Advance the positions by the current velocities over `dt`.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicsError::InvalidTimestep`] for a non-finite `dt`.
    pub fn integrate_positions(&mut self, dt: f64) -> Result<()> {
        KinematicsError::check_timestep(dt)?;
        let next = self
            .chart
            .integrate_positions(
                &self.positions,
                &self.velocities,
                dt,
                &self.properties.child_to_joint,
            );
        self.set_positions(next);
        Ok(())
    }

    /// Advance the velocities by the current accelerations over `dt`.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicsError::InvalidTimestep`] for a non-finite `dt`.
    pub fn integrate_velocities(&mut self, dt: f64) -> Result<()> {
        KinematicsError::check_timestep(dt)?;
        let next = self.velocities + self.accelerations * dt;
        self.set_velocities(next);
        Ok(())
    }

    /// Coordinate displacement that takes `q0` to `q1`.
    #[must_use]
    pub fn position_differences(
        &self,
        q0: &SVector<f64, DOF>,
        q1: &SVector<f64, DOF>,
    ) -> SVector<f64, DOF> {
        self.chart
            .position_differences(q0, q1, &self.properties.child_to_joint)
    }

    // =========================================================================
    // Cached kinematics
    // =========================================================================

    /// Whether the next [`Self::local_transform`] recomputes.
    #[must_use]
    pub fn needs_transform_update(&self) -> bool {
        self.transform.is_dirty()
    }

    /// Whether the next [`Self::local_jacobian`] recomputes.
    #[must_use]
    pub fn needs_jacobian_update(&self) -> bool {
        self.jacobian.is_dirty()
    }

    /// Whether the next [`Self::local_jacobian_time_deriv`] recomputes.
    #[must_use]
    pub fn needs_jacobian_deriv_update(&self) -> bool {
        self.jacobian_deriv.is_dirty()
    }

    /// Transform from the parent body to the child body.
    ///
    /// # Panics
    ///
    /// With `check_transforms` enabled, panics if the result is not a valid
    /// rigid transform.
    #[must_use]
    pub fn local_transform(&self) -> Isometry3<f64> {
        self.transform.get_or_recompute(|| {
            trace!(joint = %self.properties.name, "recomputing local transform");
            let tf = self.properties.parent_to_joint
                * self.chart.convert_to_transform(&self.positions)
                * self.properties.child_to_joint.inverse();
            if self.config.check_transforms {
                assert!(
                    verify_transform(&tf, self.config.transform_tolerance),
                    "joint '{}' produced an invalid transform: {tf:?}",
                    self.properties.name
                );
            }
            tf
        })
    }

    /// Local Jacobian at the current positions.
    #[must_use]
    pub fn local_jacobian(&self) -> SpatialJacobian<DOF> {
        self.jacobian.get_or_recompute(|| {
            trace!(joint = %self.properties.name, "recomputing local jacobian");
            self.local_jacobian_at(&self.positions)
        })
    }

    /// Local Jacobian at arbitrary positions, bypassing the cache.
    ///
    /// # Panics
    ///
    /// Panics if finite positions produce a non-finite Jacobian.
    #[must_use]
    pub fn local_jacobian_at(&self, positions: &SVector<f64, DOF>) -> SpatialJacobian<DOF> {
        let jac = self
            .chart
            .local_jacobian(positions, &self.properties.child_to_joint);
        assert!(
            is_finite(&jac) || !is_finite(positions),
            "joint '{}' produced a non-finite Jacobian at {positions:?}",
            self.properties.name
        );
        jac
    }

    /// Time derivative of the local Jacobian at the current positions and
    /// velocities.
    ///
    /// # Panics
    ///
    /// Panics if finite coordinates produce a non-finite result.
    #[must_use]
    pub fn local_jacobian_time_deriv(&self) -> SpatialJacobian<DOF> {
        self.jacobian_deriv.get_or_recompute(|| {
            trace!(joint = %self.properties.name, "recomputing local jacobian time derivative");
            let d_jac = self.chart.local_jacobian_time_deriv(
                &self.positions,
                &self.velocities,
                &self.properties.child_to_joint,
            );
            assert!(
                is_finite(&d_jac) || !is_finite(&self.positions) || !is_finite(&self.velocities),
                "joint '{}' produced a non-finite Jacobian derivative",
                self.properties.name
            );
            d_jac
        })
    }

    #[cfg(test)]
    pub(crate) fn recompute_counts(&self) -> (u64, u64, u64) {
        (
            self.transform.recompute_count(),
            self.jacobian.recompute_count(),
            self.jacobian_deriv.recompute_count(),
        )
    }
}

fn dof_names_for<C: JointChart<DOF>, const DOF: usize>(
    chart: &C,
    name: &str,
    dof: usize,
) -> Vec<String> {
    (0..dof)
        .map(|i| format!("{name}{}", chart.dof_suffix(i)))
        .collect()
}

/// Object-safe view of a joint with any number of coordinates.
///
/// Vectors are checked against [`Joint::num_dofs`].
pub trait Joint: fmt::Debug {
    /// Joint name.
    fn name(&self) -> &str;

    /// Kind of joint.
    fn joint_type(&self) -> JointType;

    /// Number of generalized coordinates.
    fn num_dofs(&self) -> usize;

    /// Name of coordinate `index`.
    fn dof_name(&self, index: usize) -> Option<&str>;

    /// Generalized positions.
    fn positions(&self) -> DVector<f64>;

    /// Set the generalized positions.
    fn set_positions(&mut self, positions: &DVector<f64>) -> Result<()>;

    /// Generalized velocities.
    fn velocities(&self) -> DVector<f64>;

    /// Set the generalized velocities.
    fn set_velocities(&mut self, velocities: &DVector<f64>) -> Result<()>;

    /// Generalized accelerations.
    fn accelerations(&self) -> DVector<f64>;

    /// Set the generalized accelerations.
    fn set_accelerations(&mut self, accelerations: &DVector<f64>) -> Result<()>;

    /// Transform from the parent body to the child body.
    fn local_transform(&self) -> Isometry3<f64>;

    /// Local Jacobian, `6 × num_dofs`.
    fn local_jacobian(&self) -> DMatrix<f64>;

    /// Time derivative of the local Jacobian, `6 × num_dofs`.
    fn local_jacobian_time_deriv(&self) -> DMatrix<f64>;

    /// Coordinate displacement that takes `q0` to `q1`.
    fn position_differences(&self, q0: &DVector<f64>, q1: &DVector<f64>) -> Result<DVector<f64>>;

    /// Advance the positions by the current velocities over `dt`.
    fn integrate_positions(&mut self, dt: f64) -> Result<()>;

    /// Advance the velocities by the current accelerations over `dt`.
    fn integrate_velocities(&mut self, dt: f64) -> Result<()>;
}

fn to_static<const DOF: usize>(v: &DVector<f64>) -> Result<SVector<f64, DOF>> {
    KinematicsError::check_dimension(DOF, v.len())?;
    Ok(SVector::from_column_slice(v.as_slice()))
}

fn to_dynamic<const DOF: usize>(v: &SVector<f64, DOF>) -> DVector<f64> {
    DVector::from_column_slice(v.as_slice())
}

impl<C: JointChart<DOF>, const DOF: usize> Joint for MultiDofJoint<C, DOF> {
    fn name(&self) -> &str {
        &self.properties.name
    }

    fn joint_type(&self) -> JointType {
        self.chart.joint_type()
    }

    fn num_dofs(&self) -> usize {
        DOF
    }

    fn dof_name(&self, index: usize) -> Option<&str> {
        self.dof_names.get(index).map(String::as_str)
    }

    fn positions(&self) -> DVector<f64> {
        to_dynamic(&self.positions)
    }

    fn set_positions(&mut self, positions: &DVector<f64>) -> Result<()> {
        let q = to_static(positions)?;
        MultiDofJoint::set_positions(self, q);
        Ok(())
    }

    fn velocities(&self) -> DVector<f64> {
        to_dynamic(&self.velocities)
    }

    fn set_velocities(&mut self, velocities: &DVector<f64>) -> Result<()> {
        let dq = to_static(velocities)?;
        MultiDofJoint::set_velocities(self, dq);
        Ok(())
    }

    fn accelerations(&self) -> DVector<f64> {
        to_dynamic(&self.accelerations)
    }

    fn set_accelerations(&mut self, accelerations: &DVector<f64>) -> Result<()> {
        let ddq = to_static(accelerations)?;
        MultiDofJoint::set_accelerations(self, ddq);
        Ok(())
    }

    fn local_transform(&self) -> Isometry3<f64> {
        MultiDofJoint::local_transform(self)
    }

    fn local_jacobian(&self) -> DMatrix<f64> {
        let jac = MultiDofJoint::local_jacobian(self);
        DMatrix::from_column_slice(6, DOF, jac.as_slice())
    }

    fn local_jacobian_time_deriv(&self) -> DMatrix<f64> {
        let d_jac = MultiDofJoint::local_jacobian_time_deriv(self);
        DMatrix::from_column_slice(6, DOF, d_jac.as_slice())
    }

    fn position_differences(&self, q0: &DVector<f64>, q1: &DVector<f64>) -> Result<DVector<f64>> {
        let q0 = to_static(q0)?;
        let q1 = to_static(q1)?;
        Ok(to_dynamic(&MultiDofJoint::position_differences(self, &q0, &q1)))
    }

    fn integrate_positions(&mut self, dt: f64) -> Result<()> {
        MultiDofJoint::integrate_positions(self, dt)
    }

    fn integrate_velocities(&mut self, dt: f64) -> Result<()> {
        MultiDofJoint::integrate_velocities(self, dt)
    }
}
