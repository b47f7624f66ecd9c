//! The Entity/Frame tree.
//!
//! A [`FrameTree`] is an arena of entities keyed by [`EntityId`]. Every
//! entity has at most one parent frame; frames additionally keep a child set
//! and a motion relative to their parent. The [`FrameId::WORLD`] frame always
//! exists and roots the tree.
//!
//! # Caching
//!
//! World transform, spatial velocity and spatial acceleration are cached per
//! entity. The cache dirty bit is the entity's dirty flag:
//!
//! - `notify_*_update` marks the flag and raises the matching signal.
//! - On a frame, a transform change also dirties velocity and acceleration,
//!   and the notification is pushed to every member of the child set,
//!   recursively.
//! - A read of a dirty quantity recomputes it from the parent chain and
//!   clears the flag.
//!
//! Quiet entities are never members of a child set, so they are never
//! reached by a cascade. Their reads always recompute and never fill the
//! cache. A notification on the World frame also reaches every detached
//! entity, since a missing parent counts as World.
//!
//! Reads walk up to the nearest clean ancestor and recompute on the way
//! back down, so chain depth costs no stack.
//!
//! # Joint-driven frames
//!
//! A frame added with [`FrameTree::add_joint_frame`] takes its relative
//! motion from a [`Joint`]: the transform is the joint's local transform,
//! the velocity `J·q̇` and the acceleration `J·q̈ + J̇·q̇`. Coordinate writes
//! go through the tree (`set_joint_positions`, ...) so that they dirty the
//! frame and everything below it.
//!
//! # Example
//!
//! ```
//! use nalgebra::{Isometry3, Vector3};
//! use sim_kinematics::tree::FrameTree;
//! use sim_types::{EntityOptions, FrameId};
//!
//! let mut tree = FrameTree::new();
//! let arm = tree
//!     .add_frame(FrameId::WORLD, "arm", Isometry3::translation(0.0, 0.0, 1.0))
//!     .unwrap();
//! let marker = tree.add_entity(arm, "marker", EntityOptions::default()).unwrap();
//!
//! let tf = tree.world_transform(marker).unwrap();
//! assert_eq!(tf.translation.vector, Vector3::new(0.0, 0.0, 1.0));
//! assert!(tree.descends_from(marker, arm));
//! ```

mod events;

pub use events::{
    ChildChanged, EntitySignals, FrameChanged, FrameSignals, NameChanged, VisualizationChanged,
};

use std::collections::BTreeSet;
use std::rc::Rc;

use hashbrown::HashMap;
use nalgebra::{DVector, Isometry3};
use sim_types::{
    EntityId, EntityOptions, FrameId, KinematicsConfig, KinematicsError, ReparentPolicy, Result,
};
use tracing::{debug, trace, warn};

use crate::cache::LazyCache;
use crate::joint::Joint;
use crate::render::{self, Color, RenderInterface, Shape};
use crate::spatial::{ad, ad_inv_t, verify_transform, SpatialVector};

/// Cached world quantities, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantity {
    Transform,
    Velocity,
    Acceleration,
}

impl Quantity {
    /// This quantity and everything computed from it.
    fn with_dependents(self) -> &'static [Self] {
        match self {
            Self::Transform => &[Self::Transform, Self::Velocity, Self::Acceleration],
            Self::Velocity => &[Self::Velocity, Self::Acceleration],
            Self::Acceleration => &[Self::Acceleration],
        }
    }
}

/// Motion set directly through the relative setters.
#[derive(Debug, Clone, Copy)]
struct FixedMotion {
    transform: Isometry3<f64>,
    velocity: SpatialVector,
    acceleration: SpatialVector,
}

/// Where a frame's motion relative to its parent comes from.
#[derive(Debug)]
enum RelativeMotion {
    Fixed(FixedMotion),
    Joint(Box<dyn Joint>),
}

impl RelativeMotion {
    fn transform(&self) -> Isometry3<f64> {
        match self {
            Self::Fixed(m) => m.transform,
            Self::Joint(joint) => joint.local_transform(),
        }
    }

    fn velocity(&self) -> SpatialVector {
        match self {
            Self::Fixed(m) => m.velocity,
            Self::Joint(joint) => to_spatial(&(joint.local_jacobian() * joint.velocities())),
        }
    }

    fn acceleration(&self) -> SpatialVector {
        match self {
            Self::Fixed(m) => m.acceleration,
            Self::Joint(joint) => to_spatial(
                &(joint.local_jacobian() * joint.accelerations()
                    + joint.local_jacobian_time_deriv() * joint.velocities()),
            ),
        }
    }
}

/// A `6 × n` Jacobian times an `n`-vector always has six rows.
fn to_spatial(v: &DVector<f64>) -> SpatialVector {
    SpatialVector::from_iterator(v.iter().copied())
}

/// Frame-only state.
#[derive(Debug)]
struct FrameData {
    children: BTreeSet<EntityId>,
    motion: RelativeMotion,
    signals: FrameSignals,
}

impl FrameData {
    fn new(motion: RelativeMotion) -> Self {
        Self {
            children: BTreeSet::new(),
            motion,
            signals: FrameSignals::default(),
        }
    }

    fn fixed(relative_transform: Isometry3<f64>) -> Self {
        Self::new(RelativeMotion::Fixed(FixedMotion {
            transform: relative_transform,
            velocity: SpatialVector::zeros(),
            acceleration: SpatialVector::zeros(),
        }))
    }
}

#[derive(Debug)]
struct Node {
    name: String,
    parent: Option<FrameId>,
    shapes: Vec<Rc<dyn Shape>>,
    quiet: bool,
    reparent: ReparentPolicy,
    transform: LazyCache<Isometry3<f64>>,
    velocity: LazyCache<SpatialVector>,
    acceleration: LazyCache<SpatialVector>,
    signals: EntitySignals,
    frame: Option<FrameData>,
}

impl Node {
    fn new(name: String, options: EntityOptions, frame: Option<FrameData>) -> Self {
        Self {
            name,
            parent: None,
            shapes: Vec::new(),
            quiet: options.quiet,
            reparent: options.reparent,
            transform: LazyCache::new(Isometry3::identity()),
            velocity: LazyCache::new(SpatialVector::zeros()),
            acceleration: LazyCache::new(SpatialVector::zeros()),
            signals: EntitySignals::default(),
            frame,
        }
    }

    fn mark_dirty(&self, quantity: Quantity, id: EntityId) {
        match quantity {
            Quantity::Transform => {
                self.transform.invalidate();
                self.signals.transform_updated.raise(&id);
            }
            Quantity::Velocity => {
                self.velocity.invalidate();
                self.signals.velocity_updated.raise(&id);
            }
            Quantity::Acceleration => {
                self.acceleration.invalidate();
                self.signals.acceleration_updated.raise(&id);
            }
        }
    }
}

/// Arena of entities and frames rooted at the World frame.
#[derive(Debug)]
pub struct FrameTree {
    nodes: HashMap<EntityId, Node>,
    next_id: u64,
    config: KinematicsConfig,
}

impl Default for FrameTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTree {
    /// Create a tree holding only the World frame.
    #[must_use]
    pub fn new() -> Self {
        Self::build(KinematicsConfig::default())
    }

    /// Create a tree with a custom configuration.
    pub fn with_config(config: KinematicsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: KinematicsConfig) -> Self {
        let mut world = Node::new(
            "World".to_string(),
            EntityOptions::default().fixed(),
            Some(FrameData::fixed(Isometry3::identity())),
        );
        world.transform = LazyCache::clean(Isometry3::identity());
        world.velocity = LazyCache::clean(SpatialVector::zeros());
        world.acceleration = LazyCache::clean(SpatialVector::zeros());

        let mut nodes = HashMap::new();
        nodes.insert(FrameId::WORLD.entity(), world);

        Self {
            nodes,
            next_id: FrameId::WORLD.entity().raw() + 1,
            config,
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &KinematicsConfig {
        &self.config
    }

    /// Number of live entities, including the World frame.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the tree holds nothing but the World frame.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Whether `id` names a live entity.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Iterate over all live entity ids, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.nodes.keys().copied()
    }

    // =========================================================================
    // Construction and removal
    // =========================================================================

    /// Add a plain entity under `parent` (or unattached with `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` is unknown or not a frame.
    pub fn add_entity(
        &mut self,
        parent: impl Into<Option<FrameId>>,
        name: impl Into<String>,
        options: EntityOptions,
    ) -> Result<EntityId> {
        let parent = parent.into();
        self.insert_node(parent, name.into(), options, None)
    }

    /// Add a frame under `parent` with the given relative transform.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` is unknown or not a frame.
    pub fn add_frame(
        &mut self,
        parent: impl Into<Option<FrameId>>,
        name: impl Into<String>,
        relative_transform: Isometry3<f64>,
    ) -> Result<FrameId> {
        let parent = parent.into();
        let id = self.insert_node(
            parent,
            name.into(),
            EntityOptions::default(),
            Some(FrameData::fixed(relative_transform)),
        )?;
        Ok(FrameId::from_entity(id))
    }

    /// Add a frame whose motion relative to `parent` is driven by `joint`.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` is unknown or not a frame.
    pub fn add_joint_frame(
        &mut self,
        parent: impl Into<Option<FrameId>>,
        name: impl Into<String>,
        joint: Box<dyn Joint>,
    ) -> Result<FrameId> {
        let parent = parent.into();
        debug!(joint = %joint.name(), joint_type = %joint.joint_type(), "adding joint-driven frame");
        let id = self.insert_node(
            parent,
            name.into(),
            EntityOptions::default(),
            Some(FrameData::new(RelativeMotion::Joint(joint))),
        )?;
        Ok(FrameId::from_entity(id))
    }

    fn insert_node(
        &mut self,
        parent: Option<FrameId>,
        name: String,
        options: EntityOptions,
        frame: Option<FrameData>,
    ) -> Result<EntityId> {
        if let Some(parent) = parent {
            self.frame_node(parent)?;
        }

        let id = EntityId::new(self.next_id);
        self.next_id += 1;

        debug!(entity = %id, name = %name, quiet = options.quiet, is_frame = frame.is_some(), "adding entity");
        self.nodes.insert(id, Node::new(name, options, frame));
        self.change_parent_frame(id, parent);
        Ok(id)
    }

    /// Remove an entity.
    ///
    /// The entity is detached first. Children of a removed frame, quiet ones
    /// included, are reattached to the World frame.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown id or the World frame.
    pub fn remove(&mut self, id: EntityId) -> Result<()> {
        if id == FrameId::WORLD.entity() {
            return Err(KinematicsError::WorldFrameImmutable);
        }
        let node = self.node(id)?;

        let orphans: Vec<EntityId> = if node.frame.is_some() {
            let frame = FrameId::from_entity(id);
            let mut orphans: Vec<EntityId> = self
                .nodes
                .iter()
                .filter(|(_, n)| n.parent == Some(frame))
                .map(|(&child, _)| child)
                .collect();
            orphans.sort_unstable();
            orphans
        } else {
            Vec::new()
        };

        if !orphans.is_empty() {
            warn!(
                frame = %id,
                orphans = orphans.len(),
                "removing frame that still has children, reattaching them to the world frame"
            );
            for child in orphans {
                self.change_parent_frame(child, Some(FrameId::WORLD));
            }
        }

        self.change_parent_frame(id, None);
        self.nodes.remove(&id);
        debug!(entity = %id, "removed entity");
        Ok(())
    }

    // =========================================================================
    // Parentage
    // =========================================================================

    /// Move a detachable entity to a new parent frame, or detach it with
    /// `None`.
    ///
    /// # Errors
    ///
    /// - [`KinematicsError::WorldFrameImmutable`] for the World frame
    /// - [`KinematicsError::NotDetachable`] for entities built with a fixed
    ///   parent
    /// - [`KinematicsError::CycleDetected`] if a frame would become its own
    ///   ancestor
    /// - lookup errors for unknown ids or a non-frame parent
    pub fn set_parent_frame(
        &mut self,
        id: EntityId,
        new_parent: impl Into<Option<FrameId>>,
    ) -> Result<()> {
        let new_parent = new_parent.into();
        if id == FrameId::WORLD.entity() {
            return Err(KinematicsError::WorldFrameImmutable);
        }

        let node = self.node(id)?;
        if !node.reparent.is_detachable() {
            return Err(KinematicsError::not_detachable(node.name.clone()));
        }

        if let Some(parent) = new_parent {
            self.frame_node(parent)?;
            if self.is_ancestor_or_self(id, parent.entity()) {
                return Err(KinematicsError::CycleDetected {
                    entity: id,
                    frame: parent.entity(),
                });
            }
        }

        self.change_parent_frame(id, new_parent);
        Ok(())
    }

    /// Rewire parent and child sets. Callers have validated both ids.
    fn change_parent_frame(&mut self, id: EntityId, new_parent: Option<FrameId>) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let quiet = node.quiet;
        let old_parent = std::mem::replace(&mut node.parent, new_parent);

        if !quiet {
            if let Some(old) = old_parent {
                if let Some(frame) = self.frame_data_mut(old) {
                    frame.children.remove(&id);
                }
                if let Some(frame) = self.frame_data(old) {
                    frame
                        .signals
                        .child_removed
                        .raise(&ChildChanged { frame: old, child: id });
                }
            }
        }

        let Some(parent) = new_parent else {
            if !quiet {
                self.invalidate(id, Quantity::Transform, true);
            }
            debug!(entity = %id, old_parent = ?old_parent, "detached entity");
            return;
        };

        if !quiet {
            if let Some(frame) = self.frame_data_mut(parent) {
                frame.children.insert(id);
            }
            if let Some(frame) = self.frame_data(parent) {
                frame
                    .signals
                    .child_added
                    .raise(&ChildChanged { frame: parent, child: id });
            }
            self.invalidate(id, Quantity::Transform, true);
        }

        debug!(entity = %id, old_parent = ?old_parent, new_parent = %parent, "changed parent frame");
        if let Some(node) = self.nodes.get(&id) {
            node.signals.frame_changed.raise(&FrameChanged {
                entity: id,
                old_parent,
                new_parent,
            });
        }
    }

    /// Whether `id` lies below `candidate`.
    ///
    /// An entity descends from itself, and everything descends from the
    /// World frame. A `None` candidate or an unknown id answers `false`.
    #[must_use]
    pub fn descends_from(&self, id: EntityId, candidate: impl Into<Option<FrameId>>) -> bool {
        let Some(candidate) = candidate.into() else {
            return false;
        };
        if !self.nodes.contains_key(&id) {
            return false;
        }
        if id == candidate.entity() || candidate.is_world() {
            return true;
        }
        self.is_ancestor_or_self(candidate.entity(), id)
    }

    /// Strict walk up the parent chain from `start`.
    fn is_ancestor_or_self(&self, ancestor: EntityId, start: EntityId) -> bool {
        let mut current = Some(start);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self
                .nodes
                .get(&id)
                .and_then(|n| n.parent)
                .map(FrameId::entity);
        }
        false
    }

    /// Parent frame of an entity.
    #[must_use]
    pub fn parent_frame(&self, id: EntityId) -> Option<FrameId> {
        self.nodes.get(&id)?.parent
    }

    /// Members of a frame's child set, in id order.
    pub fn child_entities(&self, frame: FrameId) -> Option<impl Iterator<Item = EntityId> + '_> {
        self.frame_data(frame).map(|f| f.children.iter().copied())
    }

    /// Size of a frame's child set. Quiet entities are never counted.
    #[must_use]
    pub fn num_child_entities(&self, frame: FrameId) -> usize {
        self.frame_data(frame).map_or(0, |f| f.children.len())
    }

    // =========================================================================
    // Entity attributes
    // =========================================================================

    /// Name of an entity.
    #[must_use]
    pub fn name(&self, id: EntityId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.name.as_str())
    }

    /// Rename an entity. Every call raises `name_changed`, even when the
    /// name is unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown id or the World frame.
    pub fn set_name(&mut self, id: EntityId, name: impl Into<String>) -> Result<()> {
        if id == FrameId::WORLD.entity() {
            return Err(KinematicsError::WorldFrameImmutable);
        }
        let name = name.into();
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(KinematicsError::UnknownEntity(id))?;
        let old_name = std::mem::replace(&mut node.name, name.clone());
        debug!(entity = %id, old_name = %old_name, new_name = %name, "renamed entity");
        node.signals.name_changed.raise(&NameChanged {
            entity: id,
            old_name,
            new_name: name,
        });
        Ok(())
    }

    /// First entity with the given name, by id order.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.name == name)
            .map(|(&id, _)| id)
            .min()
    }

    /// Whether the entity was built quiet.
    #[must_use]
    pub fn is_quiet(&self, id: EntityId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.quiet)
    }

    /// Whether the entity is a frame.
    #[must_use]
    pub fn is_frame(&self, id: EntityId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.frame.is_some())
    }

    /// View an entity id as a frame id, if it names a frame.
    #[must_use]
    pub fn as_frame(&self, id: EntityId) -> Option<FrameId> {
        self.is_frame(id).then(|| FrameId::from_entity(id))
    }

    /// How the entity accepts reparenting.
    #[must_use]
    pub fn reparent_policy(&self, id: EntityId) -> Option<ReparentPolicy> {
        self.nodes.get(&id).map(|n| n.reparent)
    }

    /// Notification points of an entity.
    #[must_use]
    pub fn signals(&self, id: EntityId) -> Option<&EntitySignals> {
        self.nodes.get(&id).map(|n| &n.signals)
    }

    /// Child-membership notification points of a frame.
    #[must_use]
    pub fn frame_signals(&self, frame: FrameId) -> Option<&FrameSignals> {
        self.frame_data(frame).map(|f| &f.signals)
    }

    // =========================================================================
    // Visualization
    // =========================================================================

    /// Attach a shared visualization shape.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown id.
    pub fn add_visualization_shape(&mut self, id: EntityId, shape: Rc<dyn Shape>) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(KinematicsError::UnknownEntity(id))?;
        node.shapes.push(Rc::clone(&shape));
        node.signals
            .visualization_changed
            .raise(&VisualizationChanged { entity: id, shape });
        Ok(())
    }

    /// Visualization shapes of an entity, in insertion order.
    #[must_use]
    pub fn visualization_shapes(&self, id: EntityId) -> Option<&[Rc<dyn Shape>]> {
        self.nodes.get(&id).map(|n| n.shapes.as_slice())
    }

    /// Draw the entity's shapes into `ri`. A missing target is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown id.
    pub fn draw(
        &self,
        id: EntityId,
        ri: Option<&mut dyn RenderInterface>,
        color: &Color,
        use_default_color: bool,
    ) -> Result<()> {
        let node = self.node(id)?;
        render::draw_shapes(&node.shapes, ri, color, use_default_color);
        Ok(())
    }

    // =========================================================================
    // Relative motion
    // =========================================================================

    /// Set a frame's transform relative to its parent.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown id, a non-frame, the World frame, or
    /// a joint-driven frame.
    pub fn set_relative_transform(&mut self, frame: FrameId, tf: Isometry3<f64>) -> Result<()> {
        self.fixed_motion_mut(frame)?.transform = tf;
        self.invalidate(frame.entity(), Quantity::Transform, false);
        Ok(())
    }

    /// Set a frame's spatial velocity relative to its parent, in its own
    /// coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown id, a non-frame, the World frame, or
    /// a joint-driven frame.
    pub fn set_relative_spatial_velocity(
        &mut self,
        frame: FrameId,
        velocity: SpatialVector,
    ) -> Result<()> {
        self.fixed_motion_mut(frame)?.velocity = velocity;
        self.invalidate(frame.entity(), Quantity::Velocity, false);
        Ok(())
    }

    /// Set a frame's spatial acceleration relative to its parent, in its own
    /// coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown id, a non-frame, the World frame, or
    /// a joint-driven frame.
    pub fn set_relative_spatial_acceleration(
        &mut self,
        frame: FrameId,
        acceleration: SpatialVector,
    ) -> Result<()> {
        self.fixed_motion_mut(frame)?.acceleration = acceleration;
        self.invalidate(frame.entity(), Quantity::Acceleration, false);
        Ok(())
    }

    /// Transform of a frame relative to its parent.
    #[must_use]
    pub fn relative_transform(&self, frame: FrameId) -> Option<Isometry3<f64>> {
        self.frame_data(frame).map(|f| f.motion.transform())
    }

    /// Spatial velocity of a frame relative to its parent.
    #[must_use]
    pub fn relative_spatial_velocity(&self, frame: FrameId) -> Option<SpatialVector> {
        self.frame_data(frame).map(|f| f.motion.velocity())
    }

    /// Spatial acceleration of a frame relative to its parent.
    #[must_use]
    pub fn relative_spatial_acceleration(&self, frame: FrameId) -> Option<SpatialVector> {
        self.frame_data(frame).map(|f| f.motion.acceleration())
    }

    // =========================================================================
    // Joint-driven frames
    // =========================================================================

    /// The joint driving `frame`, if it is joint-driven.
    #[must_use]
    pub fn joint(&self, frame: FrameId) -> Option<&dyn Joint> {
        match &self.frame_data(frame)?.motion {
            RelativeMotion::Joint(joint) => Some(joint.as_ref()),
            RelativeMotion::Fixed(_) => None,
        }
    }

    /// Set the driving joint's positions and dirty the frame's transform.
    ///
    /// # Errors
    ///
    /// Returns an error if `frame` is not joint-driven or the vector has the
    /// wrong length.
    pub fn set_joint_positions(&mut self, frame: FrameId, positions: &DVector<f64>) -> Result<()> {
        self.joint_mut(frame)?.set_positions(positions)?;
        self.invalidate(frame.entity(), Quantity::Transform, false);
        Ok(())
    }

    /// Set the driving joint's velocities and dirty the frame's velocity.
    ///
    /// # Errors
    ///
    /// Returns an error if `frame` is not joint-driven or the vector has the
    /// wrong length.
    pub fn set_joint_velocities(&mut self, frame: FrameId, velocities: &DVector<f64>) -> Result<()> {
        self.joint_mut(frame)?.set_velocities(velocities)?;
        self.invalidate(frame.entity(), Quantity::Velocity, false);
        Ok(())
    }

    /// Set the driving joint's accelerations and dirty the frame's
    /// acceleration.
    ///
    /// # Errors
    ///
    /// Returns an error if `frame` is not joint-driven or the vector has the
    /// wrong length.
    pub fn set_joint_accelerations(
        &mut self,
        frame: FrameId,
        accelerations: &DVector<f64>,
    ) -> Result<()> {
        self.joint_mut(frame)?.set_accelerations(accelerations)?;
        self.invalidate(frame.entity(), Quantity::Acceleration, false);
        Ok(())
    }

    /// Step the driving joint's positions by `dt`.
    ///
    /// # Errors
    ///
    /// Returns an error if `frame` is not joint-driven or `dt` is not finite.
    pub fn integrate_joint_positions(&mut self, frame: FrameId, dt: f64) -> Result<()> {
        self.joint_mut(frame)?.integrate_positions(dt)?;
        self.invalidate(frame.entity(), Quantity::Transform, false);
        Ok(())
    }

    /// Step the driving joint's velocities by `dt`.
    ///
    /// # Errors
    ///
    /// Returns an error if `frame` is not joint-driven or `dt` is not finite.
    pub fn integrate_joint_velocities(&mut self, frame: FrameId, dt: f64) -> Result<()> {
        self.joint_mut(frame)?.integrate_velocities(dt)?;
        self.invalidate(frame.entity(), Quantity::Velocity, false);
        Ok(())
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Mark the world transform stale and raise the transform signal.
    ///
    /// On a frame this also invalidates velocity and acceleration and
    /// cascades through the child sets.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown id.
    pub fn notify_transform_update(&mut self, id: EntityId) -> Result<()> {
        self.node(id)?;
        self.invalidate(id, Quantity::Transform, false);
        Ok(())
    }

    /// Mark the spatial velocity stale and raise the velocity signal.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown id.
    pub fn notify_velocity_update(&mut self, id: EntityId) -> Result<()> {
        self.node(id)?;
        self.invalidate(id, Quantity::Velocity, false);
        Ok(())
    }

    /// Mark the spatial acceleration stale and raise the acceleration signal.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown id.
    pub fn notify_acceleration_update(&mut self, id: EntityId) -> Result<()> {
        self.node(id)?;
        self.invalidate(id, Quantity::Acceleration, false);
        Ok(())
    }

    /// Whether the next world transform read recomputes.
    #[must_use]
    pub fn needs_transform_update(&self, id: EntityId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.transform.is_dirty())
    }

    /// Whether the next spatial velocity read recomputes.
    #[must_use]
    pub fn needs_velocity_update(&self, id: EntityId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.velocity.is_dirty())
    }

    /// Whether the next spatial acceleration read recomputes.
    #[must_use]
    pub fn needs_acceleration_update(&self, id: EntityId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.acceleration.is_dirty())
    }

    /// Depth-first push of an invalidation.
    ///
    /// `root` gets `quantity` alone when it is a plain entity and
    /// `include_dependents` is false. Frames and every cascaded node get
    /// `quantity` and all of its dependents.
    fn invalidate(&self, root: EntityId, quantity: Quantity, include_dependents: bool) {
        let single = [quantity];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };

            let quantities: &[Quantity] =
                if id != root || include_dependents || node.frame.is_some() {
                    quantity.with_dependents()
                } else {
                    &single
                };
            for &q in quantities {
                node.mark_dirty(q, id);
            }

            if let Some(frame) = &node.frame {
                stack.extend(frame.children.iter().rev().copied());
            }
            if id == FrameId::WORLD.entity() {
                stack.extend(self.detached_ids().into_iter().rev());
            }
        }
    }

    /// Non-quiet entities with no parent, World excluded, by id.
    fn detached_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .nodes
            .iter()
            .filter(|(&id, n)| n.parent.is_none() && !n.quiet && id != FrameId::WORLD.entity())
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    // =========================================================================
    // World quantities
    // =========================================================================

    /// Transform from the entity to the World frame.
    #[must_use]
    pub fn world_transform(&self, id: EntityId) -> Option<Isometry3<f64>> {
        self.pull(
            id,
            Isometry3::identity(),
            |n| &n.transform,
            |id, node, parent_tf| {
                trace!(entity = %id, "recomputing world transform");
                let tf = match &node.frame {
                    Some(frame) => parent_tf * frame.motion.transform(),
                    None => *parent_tf,
                };
                if self.config.check_transforms {
                    assert!(
                        verify_transform(&tf, self.config.transform_tolerance),
                        "world transform of {id} is not a rigid transform: {tf:?}"
                    );
                }
                tf
            },
        )
    }

    /// Spatial velocity of the entity in its own coordinates.
    #[must_use]
    pub fn spatial_velocity(&self, id: EntityId) -> Option<SpatialVector> {
        self.pull(
            id,
            SpatialVector::zeros(),
            |n| &n.velocity,
            |id, node, parent_v| {
                trace!(entity = %id, "recomputing spatial velocity");
                match &node.frame {
                    Some(frame) => {
                        ad_inv_t(&frame.motion.transform(), parent_v) + frame.motion.velocity()
                    }
                    None => *parent_v,
                }
            },
        )
    }

    /// Spatial acceleration of the entity in its own coordinates.
    #[must_use]
    pub fn spatial_acceleration(&self, id: EntityId) -> Option<SpatialVector> {
        self.pull(
            id,
            SpatialVector::zeros(),
            |n| &n.acceleration,
            |id, node, parent_a| {
                trace!(entity = %id, "recomputing spatial acceleration");
                match &node.frame {
                    Some(frame) => {
                        let relative_v = frame.motion.velocity();
                        let v = self
                            .spatial_velocity(id)
                            .unwrap_or_else(SpatialVector::zeros);
                        ad_inv_t(&frame.motion.transform(), parent_a)
                            + frame.motion.acceleration()
                            + ad(&v, &relative_v)
                    }
                    None => *parent_a,
                }
            },
        )
    }

    /// Transform of `id` expressed in the coordinates of `other`.
    #[must_use]
    pub fn transform_relative_to(&self, id: EntityId, other: EntityId) -> Option<Isometry3<f64>> {
        let tf = self.world_transform(id)?;
        let other_tf = self.world_transform(other)?;
        Some(other_tf.inverse() * tf)
    }

    /// Read one world quantity of `id`.
    ///
    /// Walks up from `id` to the nearest ancestor with a clean cache,
    /// collecting the stale chain, then applies `step` on the way back down.
    /// Non-quiet nodes on the chain have their caches refilled. A chain that
    /// runs out of parents starts from `root`, the World value.
    fn pull<T: Copy>(
        &self,
        id: EntityId,
        root: T,
        cache: impl Fn(&Node) -> &LazyCache<T>,
        step: impl Fn(EntityId, &Node, &T) -> T,
    ) -> Option<T> {
        let mut stale = Vec::new();
        let mut value = root;
        let mut current = Some(id);
        while let Some(cur) = current {
            let node = self.nodes.get(&cur)?;
            if !node.quiet && !cache(node).is_dirty() {
                value = cache(node).peek();
                break;
            }
            stale.push((cur, node));
            current = node.parent.map(FrameId::entity);
        }

        for (cur, node) in stale.into_iter().rev() {
            value = step(cur, node, &value);
            if !node.quiet {
                let fresh = value;
                cache(node).recompute(|| fresh);
            }
        }
        Some(value)
    }

    // =========================================================================
    // Lookup helpers
    // =========================================================================

    fn node(&self, id: EntityId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(KinematicsError::UnknownEntity(id))
    }

    fn frame_node(&self, frame: FrameId) -> Result<&Node> {
        let node = self.node(frame.entity())?;
        if node.frame.is_none() {
            return Err(KinematicsError::NotAFrame(frame.entity()));
        }
        Ok(node)
    }

    fn frame_data(&self, frame: FrameId) -> Option<&FrameData> {
        self.nodes.get(&frame.entity())?.frame.as_ref()
    }

    fn frame_data_mut(&mut self, frame: FrameId) -> Option<&mut FrameData> {
        self.nodes.get_mut(&frame.entity())?.frame.as_mut()
    }

    fn editable_frame(&mut self, frame: FrameId) -> Result<&mut FrameData> {
        if frame.is_world() {
            return Err(KinematicsError::WorldFrameImmutable);
        }
        let node = self
            .nodes
            .get_mut(&frame.entity())
            .ok_or(KinematicsError::UnknownEntity(frame.entity()))?;
        node.frame
            .as_mut()
            .ok_or(KinematicsError::NotAFrame(frame.entity()))
    }

    fn fixed_motion_mut(&mut self, frame: FrameId) -> Result<&mut FixedMotion> {
        match &mut self.editable_frame(frame)?.motion {
            RelativeMotion::Fixed(motion) => Ok(motion),
            RelativeMotion::Joint(_) => Err(KinematicsError::JointDriven(frame.entity())),
        }
    }

    fn joint_mut(&mut self, frame: FrameId) -> Result<&mut Box<dyn Joint>> {
        match &mut self.editable_frame(frame)?.motion {
            RelativeMotion::Joint(joint) => Ok(joint),
            RelativeMotion::Fixed(_) => Err(KinematicsError::NotJointDriven(frame.entity())),
        }
    }
}
