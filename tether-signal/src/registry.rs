//! Weakly-held subscriber list with lazy compaction.
//!
//! The registry stores weak handles to slots, so a subscriber that has
//! disconnected (and is no longer referenced by an in-flight invocation)
//! simply expires in place. Expired entries are swept out during a snapshot
//! once the live subscribers drop below three quarters of the stored entries;
//! until then, snapshots only read.

use crate::connection::Connection;
use crate::lock::{Locked, RawLock};
use crate::slot::{Slot, SlotState};
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tether::{Strong, Weak};
use tracing::trace;

/// Whether a list of `entries` stored handles with `live` connected
/// subscribers should be compacted.
#[inline]
fn should_compact(live: usize, entries: usize) -> bool {
    live.saturating_mul(4) < entries.saturating_mul(3)
}

/// Thread-safe list of weakly observed subscribers.
///
/// `E` is the erased callable type stored in each [`Slot`], `L` the lock
/// guarding the entry list.
pub struct Registry<E: ?Sized, L: RawLock = parking_lot::RawMutex> {
    entries: Locked<L, Vec<Weak<Slot<E>>>>,
    live: Arc<AtomicUsize>,
}

impl<E: ?Sized, L: RawLock> Registry<E, L> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Locked::new(Vec::new()),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of connected subscribers.
    #[inline]
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Whether no subscriber is connected.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Connects `callable`.
    ///
    /// `erase` converts the concrete slot into the registry's stored form,
    /// typically an unsizing cast such as
    /// `|slot| slot as &Slot<dyn Fn(&A) -> R + Send + Sync>`.
    pub fn add<F, P>(&self, callable: F, erase: P) -> Connection
    where
        F: Send + Sync,
        P: FnOnce(&Slot<F>) -> &Slot<E>,
    {
        let slot = Slot::new(callable);
        let state: Strong<SlotState> = Strong::project(slot.clone(), |s| s.state());
        let erased: Strong<Slot<E>> = Strong::project(slot, erase);

        // A concurrent snapshot drops unconnected entries, so the slot must be
        // connected before it becomes visible in the list.
        SlotState::connect(&state, self.live.clone());
        {
            let mut entries = self.entries.lock();
            entries.push(Strong::downgrade(&erased));
            self.live.fetch_add(1, Ordering::AcqRel);
        }

        Connection::new(Strong::downgrade(&state))
    }

    /// Returns strong handles to every connected subscriber, in connection
    /// order, compacting the entry list first if enough of it has expired.
    ///
    /// The lock is held only while the list is scanned. Callers invoke the
    /// returned slots after it is released, so subscribers connected or
    /// disconnected during that call do not affect the snapshot.
    pub fn snapshot(&self) -> Vec<Strong<Slot<E>>> {
        // Disconnected slots promoted during the scan are dropped only after
        // the lock is released, since dropping one may run its destructor.
        let mut stale = Vec::new();
        let valid = {
            let mut entries = self.entries.lock();
            let live = self.live.load(Ordering::Acquire);
            let mut valid = Vec::with_capacity(live);

            if should_compact(live, entries.len()) {
                let before = entries.len();
                entries.retain(|weak| match weak.lock() {
                    Some(slot) if slot.is_connected() => {
                        valid.push(slot);
                        true
                    }
                    Some(slot) => {
                        stale.push(slot);
                        false
                    }
                    None => false,
                });
                trace!(
                    removed = before - entries.len(),
                    remaining = entries.len(),
                    live,
                    "compacted subscriber list"
                );
            } else {
                for slot in entries.iter().filter_map(Weak::lock) {
                    if slot.is_connected() {
                        valid.push(slot);
                    } else {
                        stale.push(slot);
                    }
                }
            }
            valid
        };
        drop(stale);
        valid
    }

    /// Number of stored entries, including expired ones not yet compacted.
    pub fn capacity_hint(&self) -> usize {
        self.entries.lock().len()
    }
}

impl<E: ?Sized, L: RawLock> Default for Registry<E, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ?Sized, L: RawLock> Drop for Registry<E, L> {
    fn drop(&mut self) {
        let entries = core::mem::take(self.entries.get_mut());
        let mut released = 0usize;
        for weak in entries {
            if let Some(slot) = weak.lock() {
                if slot.state().release() {
                    released += 1;
                }
            }
        }
        if released > 0 {
            trace!(released, "registry dropped with connected subscribers");
        }
    }
}

impl<E: ?Sized, L: RawLock> fmt::Debug for Registry<E, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("live", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::Spin;

    type Callback = dyn Fn(&u32) -> u32 + Send + Sync;

    fn add<L: RawLock + 'static>(registry: &Registry<Callback, L>, k: u32) -> Connection {
        registry.add(move |x: &u32| x * k, |slot| slot as &Slot<Callback>)
    }

    #[test]
    fn compaction_threshold() {
        assert!(!should_compact(0, 0));
        assert!(!should_compact(3, 4));
        assert!(should_compact(2, 4));
        assert!(should_compact(0, 1));
        assert!(!should_compact(1, 1));
    }

    #[test]
    fn snapshot_preserves_connection_order() {
        let registry = Registry::<Callback>::new();
        let _conns: Vec<_> = (1..=4).map(|k| add(&registry, k)).collect();

        let results: Vec<u32> = registry
            .snapshot()
            .iter()
            .map(|slot| (slot.callable())(&10))
            .collect();
        assert_eq!(results, [10, 20, 30, 40]);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn expired_entries_compact_lazily() {
        let registry = Registry::<Callback, Spin>::new();
        let conns: Vec<_> = (0..8).map(|k| add(&registry, k)).collect();

        // 6 of 8 live: 24 < 24 is false, no sweep.
        conns[0].disconnect();
        conns[1].disconnect();
        assert_eq!(registry.snapshot().len(), 6);
        assert_eq!(registry.capacity_hint(), 8);

        // 5 of 8 live: 20 < 24, sweep.
        conns[2].disconnect();
        assert_eq!(registry.snapshot().len(), 5);
        assert_eq!(registry.capacity_hint(), 5);
    }

    #[test]
    fn snapshot_skips_disconnected_but_alive_slots() {
        let registry = Registry::<Callback>::new();
        let conn = add(&registry, 2);
        let held = registry.snapshot();
        conn.disconnect();

        // Still alive through `held`, but no longer connected.
        assert!(registry.snapshot().is_empty());
        assert_eq!((held[0].callable())(&4), 8);
    }

    #[test]
    fn drop_disconnects_remaining() {
        let registry = Registry::<Callback>::new();
        let conn = add(&registry, 1);
        assert!(conn.connected());
        drop(registry);
        assert!(!conn.connected());
        conn.disconnect();
    }
}
