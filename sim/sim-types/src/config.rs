//! Configuration for kinematic trees and joints.
//!
//! Controls the runtime contract checks performed after a cached transform is
//! recomputed.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration shared by a tree and its joints.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KinematicsConfig {
    /// Assert that every recomputed transform is a valid rigid transform.
    ///
    /// A failed check panics: it means an upstream computation is broken.
    pub check_transforms: bool,
    /// Tolerance on orthonormality of the rotation block used by the check.
    pub transform_tolerance: f64,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            check_transforms: cfg!(debug_assertions),
            transform_tolerance: 1e-6,
        }
    }
}

impl KinematicsConfig {
    /// Configuration with every contract check enabled.
    #[must_use]
    pub fn checked() -> Self {
        Self {
            check_transforms: true,
            ..Default::default()
        }
    }

    /// Configuration with contract checks disabled.
    #[must_use]
    pub fn unchecked() -> Self {
        Self {
            check_transforms: false,
            ..Default::default()
        }
    }

    /// Set the transform validity tolerance.
    #[must_use]
    pub fn transform_tolerance(mut self, tolerance: f64) -> Self {
        self.transform_tolerance = tolerance;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.transform_tolerance.is_finite() || self.transform_tolerance <= 0.0 {
            return Err(crate::KinematicsError::invalid_config(format!(
                "transform_tolerance must be positive and finite, got {}",
                self.transform_tolerance
            )));
        }

        if self.transform_tolerance > 0.1 {
            return Err(crate::KinematicsError::invalid_config(
                "transform_tolerance > 0.1 accepts non-rigid transforms",
            ));
        }

        Ok(())
    }
}
