//! Error types for kinematic tree operations.
//!
//! Only API misuse is reported here (unknown ids, illegal reparenting, wrong
//! vector sizes). Broken numerical contracts such as a non-finite Jacobian are
//! upstream defects and panic instead.

use thiserror::Error;

use crate::entity::EntityId;

/// Errors that can occur when editing a kinematic tree or a joint.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KinematicsError {
    /// The id does not name a live entity.
    #[error("unknown entity: {0}")]
    UnknownEntity(EntityId),

    /// The entity exists but is not a frame.
    #[error("{0} is not a frame")]
    NotAFrame(EntityId),

    /// The World frame cannot be edited.
    #[error("the world frame is immutable")]
    WorldFrameImmutable,

    /// The frame's relative motion comes from its joint and cannot be set
    /// directly.
    #[error("{0} is driven by a joint")]
    JointDriven(EntityId),

    /// The frame has no joint to drive.
    #[error("{0} is not driven by a joint")]
    NotJointDriven(EntityId),

    /// The entity was constructed with a fixed parent.
    #[error("entity '{name}' is not detachable")]
    NotDetachable {
        /// Name of the entity.
        name: String,
    },

    /// Reparenting would make a frame its own ancestor.
    #[error("attaching {entity} under {frame} would create a cycle")]
    CycleDetected {
        /// The entity being moved.
        entity: EntityId,
        /// The requested parent.
        frame: EntityId,
    },

    /// A generalized-coordinate vector has the wrong length.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Degrees of freedom of the joint.
        expected: usize,
        /// Length of the supplied vector.
        actual: usize,
    },

    /// Invalid integration timestep.
    #[error("invalid timestep: {0} (must be finite)")]
    InvalidTimestep(f64),

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

impl KinematicsError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a not-detachable error.
    #[must_use]
    pub fn not_detachable(name: impl Into<String>) -> Self {
        Self::NotDetachable { name: name.into() }
    }

    /// Check a vector length against the expected degrees of freedom.
    pub fn check_dimension(expected: usize, actual: usize) -> crate::Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch { expected, actual })
        }
    }

    /// Reject non-finite integration timesteps.
    pub fn check_timestep(dt: f64) -> crate::Result<()> {
        if dt.is_finite() {
            Ok(())
        } else {
            Err(Self::InvalidTimestep(dt))
        }
    }

    /// Check if this error is about a missing or mistyped entity.
    #[must_use]
    pub fn is_lookup_error(&self) -> bool {
        matches!(self, Self::UnknownEntity(_) | Self::NotAFrame(_))
    }

    /// Check if this error is about how a frame's motion is driven.
    #[must_use]
    pub fn is_drive_error(&self) -> bool {
        matches!(self, Self::JointDriven(_) | Self::NotJointDriven(_))
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }
}
