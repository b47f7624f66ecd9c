//! Lazily recomputed cache cells.
//!
//! Every derived quantity in the tree and in the joints (world transform,
//! spatial velocity, local Jacobian, ...) lives in a [`LazyCache`]. The cell
//! is either CLEAN or DIRTY; it starts DIRTY, writers call
//! [`LazyCache::invalidate`], and readers go through
//! [`LazyCache::get_or_recompute`], which recomputes at most once per
//! invalidation.
//!
//! The cells use [`Cell`], so a logically read-only accessor can refresh a
//! cache through `&self`. That also makes every owner `!Sync`.

use std::cell::Cell;

/// Freshness of a cached quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// The stored value equals a fresh recomputation.
    Clean,
    /// The stored value is stale and must be recomputed before use.
    Dirty,
}

/// Interior-mutable cache with an explicit dirty flag.
///
/// # Example
///
/// ```
/// use sim_kinematics::cache::{CacheState, LazyCache};
///
/// let cache = LazyCache::new(0.0_f64);
/// assert_eq!(cache.state(), CacheState::Dirty);
///
/// assert_eq!(cache.get_or_recompute(|| 4.0), 4.0);
/// assert_eq!(cache.get_or_recompute(|| unreachable!()), 4.0);
///
/// cache.invalidate();
/// assert_eq!(cache.get_or_recompute(|| 5.0), 5.0);
/// assert_eq!(cache.recompute_count(), 2);
/// ```
#[derive(Debug)]
pub struct LazyCache<T: Copy> {
    value: Cell<T>,
    dirty: Cell<bool>,
    recomputes: Cell<u64>,
}

impl<T: Copy + Default> Default for LazyCache<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Copy> LazyCache<T> {
    /// Create a DIRTY cache holding a placeholder value.
    #[must_use]
    pub fn new(placeholder: T) -> Self {
        Self {
            value: Cell::new(placeholder),
            dirty: Cell::new(true),
            recomputes: Cell::new(0),
        }
    }

    /// Create a CLEAN cache holding `value`.
    #[must_use]
    pub fn clean(value: T) -> Self {
        Self {
            value: Cell::new(value),
            dirty: Cell::new(false),
            recomputes: Cell::new(0),
        }
    }

    /// Mark the value stale.
    pub fn invalidate(&self) {
        self.dirty.set(true);
    }

    /// Whether the next read will recompute.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CacheState {
        if self.dirty.get() {
            CacheState::Dirty
        } else {
            CacheState::Clean
        }
    }

    /// Return the cached value, recomputing it first if DIRTY.
    pub fn get_or_recompute(&self, f: impl FnOnce() -> T) -> T {
        if self.dirty.get() {
            self.recompute(f)
        } else {
            self.value.get()
        }
    }

    /// Unconditionally recompute, store, and mark CLEAN.
    pub fn recompute(&self, f: impl FnOnce() -> T) -> T {
        let value = f();
        self.value.set(value);
        self.dirty.set(false);
        self.recomputes.set(self.recomputes.get() + 1);
        value
    }

    /// The stored value, which may be stale.
    #[must_use]
    pub fn peek(&self) -> T {
        self.value.get()
    }

    /// How many times the value has been recomputed.
    #[must_use]
    pub fn recompute_count(&self) -> u64 {
        self.recomputes.get()
    }
}
