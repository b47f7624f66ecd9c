//! Typed multi-subscriber signals.
//!
//! A [`Signal`] holds an ordered list of slots. [`Signal::raise`] calls every
//! slot in registration order and folds their return values with a
//! [`Combiner`]. [`Signal::connect`] hands back a [`Connection`] that can
//! cancel the subscription later, including from inside the slot while it is
//! being delivered.
//!
//! Delivery works on a snapshot of the slot list taken when the round starts:
//!
//! - a slot disconnected during the round (by itself or by an earlier slot)
//!   is not called afterwards,
//! - a slot connected during the round is first called in the next round.
//!
//! No borrow is held while a slot runs, so slots may freely connect or
//! disconnect on this or any other signal.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use sim_kinematics::signal::Signal;
//!
//! let signal: Signal<i32> = Signal::new();
//! let total = Rc::new(Cell::new(0));
//!
//! let sink = Rc::clone(&total);
//! let conn = signal.connect(move |v| sink.set(sink.get() + *v));
//!
//! signal.raise(&3);
//! signal.raise(&4);
//! assert_eq!(total.get(), 7);
//!
//! conn.disconnect();
//! signal.raise(&100);
//! assert_eq!(total.get(), 7);
//! assert!(!conn.connected());
//! ```

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

type Slot<A, R> = Rc<dyn Fn(&A) -> R>;

/// Folds the results of one delivery round into the value `raise` returns.
pub trait Combiner<R> {
    /// Combine slot results, given in registration order.
    fn combine(results: Vec<R>) -> R;
}

/// Returns the last slot's result, or `R::default()` with no slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastValue;

impl<R: Default> Combiner<R> for LastValue {
    fn combine(results: Vec<R>) -> R {
        results.into_iter().last().unwrap_or_default()
    }
}

/// Returns the largest slot result, or `R::default()` with no slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct Maximum;

impl<R: Default + PartialOrd> Combiner<R> for Maximum {
    fn combine(results: Vec<R>) -> R {
        results
            .into_iter()
            .reduce(|best, r| if r > best { r } else { best })
            .unwrap_or_default()
    }
}

/// Slot storage shared between a signal and its connections.
struct SlotList<A, R> {
    next_id: u64,
    slots: Vec<(u64, Slot<A, R>)>,
}

impl<A, R> SlotList<A, R> {
    fn contains(&self, id: u64) -> bool {
        self.slots.iter().any(|(slot_id, _)| *slot_id == id)
    }
}

/// Type-erased view a [`Connection`] keeps of its signal.
trait Disconnect {
    fn remove(&mut self, id: u64);
    fn has(&self, id: u64) -> bool;
}

impl<A, R> Disconnect for SlotList<A, R> {
    fn remove(&mut self, id: u64) {
        self.slots.retain(|(slot_id, _)| *slot_id != id);
    }

    fn has(&self, id: u64) -> bool {
        self.contains(id)
    }
}

/// A multi-subscriber signal carrying `&A` and producing `R`.
pub struct Signal<A: 'static, R: 'static = (), C = LastValue> {
    inner: Rc<RefCell<SlotList<A, R>>>,
    _combiner: PhantomData<C>,
}

impl<A: 'static, R: 'static, C> Default for Signal<A, R, C> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SlotList {
                next_id: 0,
                slots: Vec::new(),
            })),
            _combiner: PhantomData,
        }
    }
}

impl<A: 'static, R: 'static, C> Signal<A, R, C> {
    /// Remove every slot.
    pub fn disconnect_all(&self) {
        self.inner.borrow_mut().slots.clear();
    }

    /// Number of connected slots.
    #[must_use]
    pub fn num_slots(&self) -> usize {
        self.inner.borrow().slots.len()
    }
}

impl<A: 'static, R: 'static, C> fmt::Debug for Signal<A, R, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("num_slots", &self.num_slots())
            .finish()
    }
}

impl<A: 'static, R: 'static, C: Combiner<R>> Signal<A, R, C> {
    /// Create a signal with no slots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot. Slots run in registration order.
    pub fn connect(&self, slot: impl Fn(&A) -> R + 'static) -> Connection {
        let mut list = self.inner.borrow_mut();
        let id = list.next_id;
        list.next_id += 1;
        list.slots.push((id, Rc::new(slot)));
        drop(list);

        let erased: Rc<RefCell<dyn Disconnect>> = self.inner.clone();
        Connection {
            target: Some((Rc::downgrade(&erased), id)),
        }
    }

    /// Forward every raise of this signal to `other`.
    ///
    /// Connecting a signal to itself is refused and returns a disconnected
    /// [`Connection`]. The forwarding slot does not keep `other` alive; once
    /// `other` is dropped it yields `R::default()`.
    pub fn connect_signal<D>(&self, other: &Signal<A, R, D>) -> Connection
    where
        R: Default,
        D: Combiner<R> + 'static,
    {
        if Rc::ptr_eq(&self.inner, &other.inner) {
            return Connection::default();
        }

        let target = Rc::downgrade(&other.inner);
        self.connect(move |args| match target.upgrade() {
            Some(inner) => raise_with::<A, R, D>(&inner, args),
            None => R::default(),
        })
    }

    /// Call every slot with `args` and combine the results.
    pub fn raise(&self, args: &A) -> R {
        raise_with::<A, R, C>(&self.inner, args)
    }
}

fn raise_with<A, R, C: Combiner<R>>(inner: &Rc<RefCell<SlotList<A, R>>>, args: &A) -> R {
    let snapshot: Vec<(u64, Slot<A, R>)> = inner.borrow().slots.clone();
    let mut results = Vec::with_capacity(snapshot.len());
    for (id, slot) in snapshot {
        if !inner.borrow().contains(id) {
            continue;
        }
        results.push(slot(args));
    }
    C::combine(results)
}

/// Subscription-only view of a [`Signal`].
///
/// Owners expose this so outside code can subscribe without being able to
/// raise or clear the signal.
pub struct SlotRegister<'a, A: 'static, R: 'static = (), C = LastValue> {
    signal: &'a Signal<A, R, C>,
}

impl<'a, A: 'static, R: 'static, C: Combiner<R>> SlotRegister<'a, A, R, C> {
    /// Wrap a signal.
    #[must_use]
    pub fn new(signal: &'a Signal<A, R, C>) -> Self {
        Self { signal }
    }

    /// Register a slot on the underlying signal.
    pub fn connect(&self, slot: impl Fn(&A) -> R + 'static) -> Connection {
        self.signal.connect(slot)
    }

    /// Number of slots on the underlying signal.
    #[must_use]
    pub fn num_slots(&self) -> usize {
        self.signal.num_slots()
    }
}

/// Handle to one slot registration.
///
/// Dropping a connection does not disconnect the slot.
#[derive(Clone, Default)]
pub struct Connection {
    target: Option<(Weak<RefCell<dyn Disconnect>>, u64)>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.connected())
            .finish()
    }
}

impl Connection {
    /// Whether the slot is still registered on a live signal.
    #[must_use]
    pub fn connected(&self) -> bool {
        match &self.target {
            Some((signal, id)) => signal
                .upgrade()
                .is_some_and(|list| list.borrow().has(*id)),
            None => false,
        }
    }

    /// Remove the slot from its signal. Idempotent.
    pub fn disconnect(&self) {
        if let Some((signal, id)) = &self.target {
            if let Some(list) = signal.upgrade() {
                list.borrow_mut().remove(*id);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn test_connect_and_disconnect() {
        let event0: Signal<()> = Signal::new();
        let event1: Signal<i32> = Signal::new();
        let event2: Signal<(i32, f32)> = Signal::new();

        let c0 = event0.connect(|()| {});
        let c1 = event1.connect(|_| {});
        let c2 = event2.connect(|_| {});

        assert_eq!(event0.num_slots(), 1);
        assert_eq!(event1.num_slots(), 1);
        assert_eq!(event2.num_slots(), 1);
        assert!(c0.connected() && c1.connected() && c2.connected());

        c0.disconnect();
        c1.disconnect();
        c2.disconnect();

        assert_eq!(event0.num_slots(), 0);
        assert_eq!(event1.num_slots(), 0);
        assert_eq!(event2.num_slots(), 0);
        assert!(!c0.connected() && !c1.connected() && !c2.connected());
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let signal: Signal<u8> = Signal::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let log = Rc::clone(&log);
            signal.connect(move |v| log.borrow_mut().push(format!("{tag}{v}")));
        }

        signal.raise(&1);
        assert_eq!(*log.borrow(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn test_slot_disconnects_itself_mid_delivery() {
        let signal: Signal<()> = Signal::new();
        let calls = Rc::new(Cell::new(0));
        let own: Rc<RefCell<Connection>> = Rc::new(RefCell::new(Connection::default()));

        let counter = Rc::clone(&calls);
        let handle = Rc::clone(&own);
        *own.borrow_mut() = signal.connect(move |()| {
            counter.set(counter.get() + 1);
            handle.borrow().disconnect();
        });

        let after = Rc::new(Cell::new(0));
        let sink = Rc::clone(&after);
        signal.connect(move |()| sink.set(sink.get() + 1));

        signal.raise(&());
        signal.raise(&());

        assert_eq!(calls.get(), 1);
        assert_eq!(after.get(), 2);
        assert_eq!(signal.num_slots(), 1);
    }

    #[test]
    fn test_slot_connected_mid_round_waits_for_next_round() {
        let signal: Rc<Signal<()>> = Rc::new(Signal::new());
        let late_calls = Rc::new(Cell::new(0));

        let sig = Rc::downgrade(&signal);
        let late = Rc::clone(&late_calls);
        signal.connect(move |()| {
            if let Some(sig) = sig.upgrade() {
                let late = Rc::clone(&late);
                sig.connect(move |()| late.set(late.get() + 1));
            }
        });

        signal.raise(&());
        assert_eq!(late_calls.get(), 0);
        assert_eq!(signal.num_slots(), 2);
    }

    #[test]
    fn test_combiners() {
        let last: Signal<(f32, f32), f32> = Signal::new();
        let max: Signal<(f32, f32), f32, Maximum> = Signal::new();

        let ops: [fn(&(f32, f32)) -> f32; 4] = [
            |(x, y)| x * y,
            |(x, y)| x / y,
            |(x, y)| x + y,
            |(x, y)| x - y,
        ];
        for op in ops {
            last.connect(op);
            max.connect(op);
        }

        assert_eq!(last.raise(&(5.0, 3.0)), 2.0);
        assert_eq!(max.raise(&(5.0, 3.0)), 15.0);

        let empty: Signal<(), f32> = Signal::new();
        assert_eq!(empty.raise(&()), 0.0);
    }

    #[test]
    fn test_signal_to_signal() {
        let event1: Signal<i32> = Signal::new();
        let event2: Signal<i32> = Signal::new();
        let calls = Rc::new(Cell::new(0));

        let chain = event1.connect_signal(&event2);
        for _ in 0..4 {
            let calls = Rc::clone(&calls);
            event2.connect(move |_| calls.set(calls.get() + 1));
        }

        event1.raise(&0);
        assert_eq!(calls.get(), 4);

        chain.disconnect();
        calls.set(0);
        event1.raise(&0);
        assert_eq!(calls.get(), 0);

        event1.disconnect_all();
        assert_eq!(event1.num_slots(), 0);

        let self_chain = event1.connect_signal(&event1);
        assert_eq!(event1.num_slots(), 0);
        assert!(!self_chain.connected());
    }

    #[test]
    fn test_connection_outlives_signal() {
        let conn = {
            let signal: Signal<()> = Signal::new();
            signal.connect(|()| {})
        };
        assert!(!conn.connected());
        conn.disconnect();
    }

    #[test]
    fn test_slot_register_only_connects() {
        let signal: Signal<u32> = Signal::new();
        let register = SlotRegister::new(&signal);
        let seen = Rc::new(Cell::new(0));
        let sink = Rc::clone(&seen);
        register.connect(move |v| sink.set(*v));

        assert_eq!(register.num_slots(), 1);
        signal.raise(&11);
        assert_eq!(seen.get(), 11);
    }

    #[test]
    fn test_debug_reports_slot_count() {
        let signal: Signal<u32, u32, Maximum> = Signal::new();
        signal.connect(|v| *v);
        assert_eq!(format!("{signal:?}"), "Signal { num_slots: 1 }");

        signal.disconnect_all();
        assert_eq!(signal.num_slots(), 0);
    }
}
