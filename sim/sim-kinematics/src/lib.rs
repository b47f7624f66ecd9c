//! Kinematic trees of frames and joints with lazily cached spatial quantities.
//!
//! This crate keeps derived kinematic quantities consistent with the
//! generalized coordinates that produce them:
//!
//! - [`FrameTree`] - Entities and frames rooted at the World frame, with
//!   cached world transform, spatial velocity and spatial acceleration
//! - [`MultiDofJoint`] - A joint's coordinates plus cached local transform,
//!   Jacobian and Jacobian time derivative; boxed as a [`Joint`] it can
//!   drive a frame of the tree
//! - [`Signal`] - Change notifications with cancellable connections
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │   spatial    │   │ signal/cache │
//! │ exp/log, Ad  │   │ slots, dirty │
//! └──────┬───────┘   └──────┬───────┘
//!        │                  │
//!        ▼                  ▼
//! ┌─────────────────────────────────┐
//! │  tree: Entity/Frame arena       │
//! │  push invalidation, pull reads  │
//! └─────────────────────────────────┘
//! ┌─────────────────────────────────┐
//! │  joint: charts, cached Jacobian │
//! └─────────────────────────────────┘
//! ```
//!
//! Writes push dirty flags down the tree; reads pull fresh values up the
//! parent chain and recompute each stale quantity once.
//!
//! # Threading
//!
//! Everything here is single-threaded. Caches use `Cell` and signals use
//! `Rc`, so trees and joints are neither `Send` nor `Sync`.
//!
//! # Quick Start
//!
//! ```
//! use nalgebra::{DVector, Isometry3};
//! use sim_kinematics::{BallJoint, FrameTree};
//! use sim_types::{EntityOptions, FrameId, JointProperties};
//!
//! let mut tree = FrameTree::new();
//! let shoulder = BallJoint::new(JointProperties::new("shoulder"));
//!
//! let upper_arm = tree
//!     .add_joint_frame(FrameId::WORLD, "upper_arm", Box::new(shoulder))
//!     .unwrap();
//! let hand = tree.add_entity(upper_arm, "hand", EntityOptions::default()).unwrap();
//! assert_eq!(tree.world_transform(hand), Some(Isometry3::identity()));
//!
//! // Bend the shoulder; the tree dirties everything below it.
//! let bend = DVector::from_vec(vec![0.0, 0.0, std::f64::consts::FRAC_PI_2]);
//! tree.set_joint_positions(upper_arm, &bend).unwrap();
//!
//! assert!(tree.needs_transform_update(hand));
//! let tf = tree.world_transform(hand).unwrap();
//! assert!((tf * nalgebra::Point3::new(1.0, 0.0, 0.0)).y > 0.999);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-kinematics/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,   // Many methods can't be const due to nalgebra
    clippy::missing_errors_doc,     // Error docs added where non-obvious
    clippy::many_single_char_names, // Math notation (q, v, a, t)
    clippy::doc_markdown,           // Not all technical terms need backticks
)]

pub mod cache;
pub mod joint;
pub mod render;
pub mod signal;
pub mod spatial;
pub mod tree;

pub use cache::{CacheState, LazyCache};
pub use joint::{
    BallChart, BallJoint, FreeChart, FreeJoint, Joint, JointChart, MultiDofJoint, PlanarChart,
    PlanarJoint,
};
pub use render::{Color, RenderInterface, Shape};
pub use signal::{Combiner, Connection, LastValue, Maximum, Signal, SlotRegister};
pub use spatial::{SpatialJacobian, SpatialVector};
pub use tree::{
    ChildChanged, EntitySignals, FrameChanged, FrameSignals, FrameTree, NameChanged,
    VisualizationChanged,
};
