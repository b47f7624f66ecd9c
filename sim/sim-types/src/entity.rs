//! Identifiers and construction options for entities in a kinematic tree.
//!
//! Entities and frames live in an arena and refer to each other by id, never
//! by reference. An id is stable for the lifetime of the tree and is never
//! reused, so a stale id simply resolves to "absent".

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier for an entity (or frame) in a kinematic tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityId(pub u64);

impl EntityId {
    /// Create a new entity ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Identifier of an entity that is known to be a frame.
///
/// Every frame is also an entity; [`FrameId::entity`] gives the entity view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameId(EntityId);

impl FrameId {
    /// The World frame, root of every kinematic tree.
    pub const WORLD: Self = Self(EntityId(0));

    /// Wrap an entity id that names a frame.
    ///
    /// The tree hands these out; constructing one by hand for a non-frame
    /// entity makes every frame operation on it fail with `NotAFrame`.
    #[must_use]
    pub const fn from_entity(id: EntityId) -> Self {
        Self(id)
    }

    /// The entity view of this frame.
    #[must_use]
    pub const fn entity(self) -> EntityId {
        self.0
    }

    /// Whether this is the World frame.
    #[must_use]
    pub const fn is_world(self) -> bool {
        self.0 .0 == 0
    }
}

impl From<FrameId> for EntityId {
    fn from(frame: FrameId) -> Self {
        frame.0
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_world() {
            write!(f, "Frame(world)")
        } else {
            write!(f, "Frame({})", self.0 .0)
        }
    }
}

/// Whether an entity may be moved to a different parent after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ReparentPolicy {
    /// The entity can be re-attached with `set_parent_frame`.
    #[default]
    Detachable,
    /// The parent is fixed at construction.
    Fixed,
}

impl ReparentPolicy {
    /// Whether the public reparenting operation is allowed.
    #[must_use]
    pub const fn is_detachable(self) -> bool {
        matches!(self, Self::Detachable)
    }
}

/// Construction-time options for a plain entity.
///
/// # Example
///
/// ```
/// use sim_types::{EntityOptions, ReparentPolicy};
///
/// let opts = EntityOptions::quiet();
/// assert!(opts.quiet);
/// assert_eq!(opts.reparent, ReparentPolicy::Detachable);
///
/// let pinned = EntityOptions::default().fixed();
/// assert!(!pinned.quiet);
/// assert_eq!(pinned.reparent, ReparentPolicy::Fixed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityOptions {
    /// Quiet entities never join a child set and are never notified.
    ///
    /// Immutable once the entity exists. Meant for short-lived helpers where
    /// the bookkeeping would cost more than it saves.
    pub quiet: bool,
    /// Whether the entity may be reparented later.
    pub reparent: ReparentPolicy,
}

impl EntityOptions {
    /// Options for a quiet, detachable entity.
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            quiet: true,
            ..Default::default()
        }
    }

    /// Pin the entity to its construction-time parent.
    #[must_use]
    pub fn fixed(mut self) -> Self {
        self.reparent = ReparentPolicy::Fixed;
        self
    }
}
