//! Change notifications raised by a [`FrameTree`](super::FrameTree).
//!
//! Slots receive event values, never the tree itself. Every entity owns one
//! [`EntitySignals`] bundle; frames additionally own a [`FrameSignals`]
//! bundle for child membership.

use std::rc::Rc;

use sim_types::{EntityId, FrameId};

use crate::render::Shape;
use crate::signal::{Signal, SlotRegister};

/// An entity moved to a different parent frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameChanged {
    /// The entity that moved.
    pub entity: EntityId,
    /// Previous parent, if it had one.
    pub old_parent: Option<FrameId>,
    /// New parent.
    pub new_parent: Option<FrameId>,
}

/// An entity was renamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameChanged {
    /// The renamed entity.
    pub entity: EntityId,
    /// Name before the change.
    pub old_name: String,
    /// Name after the change.
    pub new_name: String,
}

/// A visualization shape was attached to an entity.
#[derive(Debug, Clone)]
pub struct VisualizationChanged {
    /// The entity that gained the shape.
    pub entity: EntityId,
    /// The shape that was added.
    pub shape: Rc<dyn Shape>,
}

/// An entity joined or left a frame's child set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildChanged {
    /// The frame whose child set changed.
    pub frame: FrameId,
    /// The child that was added or removed.
    pub child: EntityId,
}

/// Per-entity notification points.
#[derive(Debug, Default)]
pub struct EntitySignals {
    pub(crate) frame_changed: Signal<FrameChanged>,
    pub(crate) name_changed: Signal<NameChanged>,
    pub(crate) visualization_changed: Signal<VisualizationChanged>,
    pub(crate) transform_updated: Signal<EntityId>,
    pub(crate) velocity_updated: Signal<EntityId>,
    pub(crate) acceleration_updated: Signal<EntityId>,
}

impl EntitySignals {
    /// Raised after the entity is attached to a new parent frame.
    #[must_use]
    pub fn on_frame_changed(&self) -> SlotRegister<'_, FrameChanged> {
        SlotRegister::new(&self.frame_changed)
    }

    /// Raised after the entity is renamed.
    #[must_use]
    pub fn on_name_changed(&self) -> SlotRegister<'_, NameChanged> {
        SlotRegister::new(&self.name_changed)
    }

    /// Raised after a visualization shape is added.
    #[must_use]
    pub fn on_visualization_changed(&self) -> SlotRegister<'_, VisualizationChanged> {
        SlotRegister::new(&self.visualization_changed)
    }

    /// Raised every time the world transform is invalidated.
    #[must_use]
    pub fn on_transform_updated(&self) -> SlotRegister<'_, EntityId> {
        SlotRegister::new(&self.transform_updated)
    }

    /// Raised every time the spatial velocity is invalidated.
    #[must_use]
    pub fn on_velocity_updated(&self) -> SlotRegister<'_, EntityId> {
        SlotRegister::new(&self.velocity_updated)
    }

    /// Raised every time the spatial acceleration is invalidated.
    #[must_use]
    pub fn on_acceleration_updated(&self) -> SlotRegister<'_, EntityId> {
        SlotRegister::new(&self.acceleration_updated)
    }
}

/// Per-frame child membership notifications.
#[derive(Debug, Default)]
pub struct FrameSignals {
    pub(crate) child_added: Signal<ChildChanged>,
    pub(crate) child_removed: Signal<ChildChanged>,
}

impl FrameSignals {
    /// Raised after an entity joins the child set.
    #[must_use]
    pub fn on_child_added(&self) -> SlotRegister<'_, ChildChanged> {
        SlotRegister::new(&self.child_added)
    }

    /// Raised after an entity leaves the child set.
    #[must_use]
    pub fn on_child_removed(&self) -> SlotRegister<'_, ChildChanged> {
        SlotRegister::new(&self.child_removed)
    }
}
