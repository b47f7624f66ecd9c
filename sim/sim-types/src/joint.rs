//! Joint descriptions for articulated trees.
//!
//! A joint connects a parent body to a child body. Its configuration is a
//! small vector of generalized coordinates; how those coordinates map to a
//! rigid transform depends on the [`JointType`]. This module only carries the
//! descriptive data. The kinematics live in `sim-kinematics`.

use nalgebra::{Isometry3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Type of joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointType {
    /// Ball joint - rotation around all axes, exponential-map coordinates.
    Ball,
    /// Planar joint - two translations in a plane plus rotation about its normal.
    Planar,
    /// Free joint - 6 DOF (floating base).
    Free,
}

impl JointType {
    /// Get the number of degrees of freedom for this joint type.
    #[must_use]
    pub const fn dof(self) -> usize {
        match self {
            Self::Ball | Self::Planar => 3,
            Self::Free => 6,
        }
    }

    /// Check if this joint type has rotational degrees of freedom.
    #[must_use]
    pub const fn has_rotation(self) -> bool {
        true
    }

    /// Check if this joint type has translational degrees of freedom.
    #[must_use]
    pub const fn has_translation(self) -> bool {
        matches!(self, Self::Planar | Self::Free)
    }
}

impl std::fmt::Display for JointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ball => write!(f, "ball"),
            Self::Planar => write!(f, "planar"),
            Self::Free => write!(f, "free"),
        }
    }
}

/// Which plane a planar joint moves in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PlaneType {
    /// Translate along X and Y, rotate about Z.
    #[default]
    XY,
    /// Translate along Y and Z, rotate about X.
    YZ,
    /// Translate along Z and X, rotate about Y.
    ZX,
    /// User-supplied translational axes.
    Arbitrary,
}

impl PlaneType {
    /// Suffixes appended to the joint name for the two translational DOFs.
    #[must_use]
    pub const fn dof_suffixes(self) -> [&'static str; 2] {
        match self {
            Self::XY => ["_x", "_y"],
            Self::YZ => ["_y", "_z"],
            Self::ZX => ["_z", "_x"],
            Self::Arbitrary => ["_1", "_2"],
        }
    }

    /// Translational axes and rotational axis of a canonical plane.
    ///
    /// Returns `None` for [`PlaneType::Arbitrary`], whose axes are supplied
    /// by the caller.
    #[must_use]
    pub fn axes(self) -> Option<(Vector3<f64>, Vector3<f64>, Vector3<f64>)> {
        match self {
            Self::XY => Some((Vector3::x(), Vector3::y(), Vector3::z())),
            Self::YZ => Some((Vector3::y(), Vector3::z(), Vector3::x())),
            Self::ZX => Some((Vector3::z(), Vector3::x(), Vector3::y())),
            Self::Arbitrary => None,
        }
    }
}

/// Construction-time description of a joint: its name and where it is
/// mounted on the parent and child bodies.
///
/// # Example
///
/// ```
/// use sim_types::JointProperties;
/// use nalgebra::Isometry3;
///
/// let props = JointProperties::new("shoulder")
///     .with_parent_to_joint(Isometry3::translation(0.0, 0.0, 1.0));
/// assert_eq!(props.name, "shoulder");
/// assert_eq!(props.child_to_joint, Isometry3::identity());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointProperties {
    /// Joint name, also the prefix of its degree-of-freedom names.
    pub name: String,
    /// Transform from the parent body frame to the joint frame.
    pub parent_to_joint: Isometry3<f64>,
    /// Transform from the child body frame to the joint frame.
    pub child_to_joint: Isometry3<f64>,
}

impl Default for JointProperties {
    fn default() -> Self {
        Self::new("joint")
    }
}

impl JointProperties {
    /// Properties with identity mountings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent_to_joint: Isometry3::identity(),
            child_to_joint: Isometry3::identity(),
        }
    }

    /// Set the parent-body-to-joint mounting.
    #[must_use]
    pub fn with_parent_to_joint(mut self, tf: Isometry3<f64>) -> Self {
        self.parent_to_joint = tf;
        self
    }

    /// Set the child-body-to-joint mounting.
    #[must_use]
    pub fn with_child_to_joint(mut self, tf: Isometry3<f64>) -> Self {
        self.child_to_joint = tf;
        self
    }
}
