//! Subscriber slots.
//!
//! A slot is one intrusively counted allocation holding a callable and its
//! connection state. The registry only observes slots weakly; a connected
//! slot keeps itself alive through a strong reference stored in its own
//! state, and disconnecting drops that reference.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use parking_lot::Mutex;
use std::sync::Arc;
use tether::{ControlBlock, Intrusive, Strong, make_intrusive};
use tracing::trace;

/// Lifecycle of a slot. Transitions only move forward.
pub(crate) enum Phase {
    Unconnected,
    Connected {
        /// Self-reference that keeps the slot alive while connected.
        retain: Strong<SlotState>,
        /// Live-subscriber count of the owning registry.
        live: Arc<AtomicUsize>,
    },
    Disconnected,
}

/// Connection state shared by every slot regardless of its callable.
pub struct SlotState {
    phase: Mutex<Phase>,
    connected: AtomicBool,
}

impl SlotState {
    fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Unconnected),
            connected: AtomicBool::new(false),
        }
    }

    /// Whether the slot is currently connected.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Moves an unconnected slot to the connected phase.
    ///
    /// `this` must point at the state embedded in the slot; the stored clone
    /// keeps the whole slot alive until [`release`](Self::release).
    pub(crate) fn connect(this: &Strong<SlotState>, live: Arc<AtomicUsize>) {
        let mut phase = this.phase.lock();
        debug_assert!(matches!(*phase, Phase::Unconnected), "slot connected twice");
        *phase = Phase::Connected {
            retain: this.clone(),
            live,
        };
        this.connected.store(true, Ordering::Release);
        trace!("slot connected");
    }

    /// Disconnects the slot. Returns `true` if this call did the
    /// disconnecting, `false` if the slot was not connected.
    ///
    /// The self-reference is dropped after the phase lock is released. The
    /// caller must hold its own strong reference to the slot.
    pub(crate) fn release(&self) -> bool {
        let previous = {
            let mut phase = self.phase.lock();
            self.connected.store(false, Ordering::Release);
            core::mem::replace(&mut *phase, Phase::Disconnected)
        };
        match previous {
            Phase::Connected { retain, live } => {
                live.fetch_sub(1, Ordering::AcqRel);
                trace!("slot disconnected");
                drop(retain);
                true
            }
            Phase::Unconnected | Phase::Disconnected => false,
        }
    }
}

/// A subscriber: a callable plus its connection state, in one allocation.
///
/// `C` is the concrete callable while the slot is built and an erased form
/// such as `dyn Fn(&A) -> R + Send + Sync` once it is stored in a
/// [`Registry`](crate::Registry).
pub struct Slot<C: ?Sized> {
    control: ControlBlock,
    state: SlotState,
    callable: C,
}

unsafe impl<F> Intrusive for Slot<F> {
    fn control(&self) -> &ControlBlock {
        &self.control
    }
}

impl<F> Slot<F> {
    pub(crate) fn new(callable: F) -> Strong<Self> {
        make_intrusive(Self {
            control: ControlBlock::new(),
            state: SlotState::new(),
            callable,
        })
    }
}

impl<C: ?Sized> Slot<C> {
    /// The stored callable.
    #[inline]
    pub fn callable(&self) -> &C {
        &self.callable
    }

    /// The slot's connection state.
    #[inline]
    pub fn state(&self) -> &SlotState {
        &self.state
    }

    /// Whether the slot is currently connected.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_slot_survives_without_outside_owners() {
        let live = Arc::new(AtomicUsize::new(1));
        let slot = Slot::new(|x: &u32| x + 1);
        let weak = Strong::downgrade(&slot);
        let state = Strong::project(slot, |s| &s.state);
        SlotState::connect(&state, live.clone());
        drop(state);

        let held = weak.lock().expect("connected slot must stay alive");
        assert!(held.is_connected());
        assert_eq!((held.callable())(&1), 2);

        assert!(held.state().release());
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert!(!held.is_connected());
        drop(held);
        assert!(weak.lock().is_none());
    }

    #[test]
    fn release_happens_once() {
        let live = Arc::new(AtomicUsize::new(1));
        let slot = Slot::new(());
        let state = Strong::project(slot.clone(), |s| &s.state);
        SlotState::connect(&state, live.clone());

        assert!(slot.state().release());
        assert!(!slot.state().release());
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unconnected_release_is_noop() {
        let slot = Slot::new(());
        assert!(!slot.state().release());
        assert!(!slot.is_connected());
    }
}
