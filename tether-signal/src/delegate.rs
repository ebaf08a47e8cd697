//! Multicast delegates.

use crate::connection::Connection;
use crate::lock::RawLock;
use crate::reduce::{Ignore, LastValue, Reduce};
use crate::registry::Registry;
use crate::slot::Slot;
use core::fmt;
use core::marker::PhantomData;

/// A multicast delegate: any number of subscribers taking `&A` and
/// returning `R`.
///
/// [`invoke`](Self::invoke) calls every subscriber connected at the start of
/// the call, in connection order, and folds their return values with the
/// policy `P` (by default the last value, as an `Option`).
///
/// The delegate never holds its lock while a subscriber runs, so a
/// subscriber may connect, disconnect or invoke on the same delegate.
///
/// # Examples
///
/// ```rust
/// use tether_signal::{Collect, Delegate};
///
/// let on_resize: Delegate<(u32, u32), u32, Collect<u32>> = Delegate::new();
/// let area = on_resize.connect(|&(w, h)| w * h);
/// let _perimeter = on_resize.connect(|&(w, h)| 2 * (w + h));
///
/// assert_eq!(on_resize.invoke(&(3, 4)), vec![12, 14]);
///
/// area.disconnect();
/// assert_eq!(on_resize.invoke(&(3, 4)), vec![14]);
/// ```
pub struct Delegate<A: ?Sized, R = (), P = LastValue<R>, L: RawLock = parking_lot::RawMutex> {
    registry: Registry<dyn Fn(&A) -> R + Send + Sync, L>,
    policy: PhantomData<fn() -> P>,
}

/// A delegate whose subscribers return nothing.
pub type Event<A, L = parking_lot::RawMutex> = Delegate<A, (), Ignore, L>;

impl<A: ?Sized, R, P, L: RawLock> Delegate<A, R, P, L> {
    /// Creates a delegate with no subscribers.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            policy: PhantomData,
        }
    }

    /// Connects `callback`. It will be called by every invocation that
    /// starts after this returns, until disconnected.
    pub fn connect<F>(&self, callback: F) -> Connection
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        self.registry
            .add(callback, |slot| slot as &Slot<dyn Fn(&A) -> R + Send + Sync>)
    }

    /// Number of connected subscribers.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Whether no subscriber is connected.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

impl<A: ?Sized, R, P: Reduce<R>, L: RawLock> Delegate<A, R, P, L> {
    /// Calls every connected subscriber with `args` and reduces the results.
    pub fn invoke(&self, args: &A) -> P::Output {
        let mut policy = P::default();
        for slot in self.registry.snapshot() {
            policy.accept((slot.callable())(args));
        }
        policy.finish()
    }
}

impl<A: ?Sized, R, P, L: RawLock> Default for Delegate<A, R, P, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized, R, P, L: RawLock> fmt::Debug for Delegate<A, R, P, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegate")
            .field("subscribers", &self.len())
            .finish()
    }
}
