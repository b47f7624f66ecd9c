//! Core types for articulated kinematic trees.
//!
//! This crate provides the foundational data shared by the kinematics crates:
//!
//! - [`EntityId`] / [`FrameId`] - Stable arena keys for entities and frames
//! - [`EntityOptions`] / [`ReparentPolicy`] - How an entity joins the tree
//! - [`JointType`] / [`PlaneType`] / [`JointProperties`] - Joint descriptions
//! - [`KinematicsConfig`] - Runtime contract checks
//! - [`KinematicsError`] - Recoverable API errors
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They have no kinematics and no caching.
//! The tree, its invalidation protocol and the joint math live in
//! `sim-kinematics`.
//!
//! # Coordinate System
//!
//! - X: right
//! - Y: forward
//! - Z: up
//! - Right-handed
//!
//! Spatial vectors are ordered `[angular; linear]`.
//!
//! # Example
//!
//! ```
//! use sim_types::{EntityOptions, FrameId, JointType};
//!
//! assert!(FrameId::WORLD.is_world());
//! assert_eq!(JointType::Ball.dof(), 3);
//! assert!(EntityOptions::quiet().quiet);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-types/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod config;
mod entity;
mod error;
mod joint;

pub use config::KinematicsConfig;
pub use entity::{EntityId, EntityOptions, FrameId, ReparentPolicy};
pub use error::KinematicsError;
pub use joint::{JointProperties, JointType, PlaneType};

// Re-export math types for convenience
pub use nalgebra::{Isometry3, Vector3, Vector6};

/// Result type for kinematics operations.
pub type Result<T> = std::result::Result<T, KinematicsError>;
