//! Sender-and-message signals.
//!
//! A [`GenericSignal`] carries messages of any type from a sender `S`.
//! Each subscriber names the message type it handles and is skipped for
//! casts of any other type. [`Signal`] fixes the message type up front.

use crate::connection::Connection;
use crate::lock::RawLock;
use crate::registry::Registry;
use crate::slot::Slot;
use core::any::{Any, TypeId};
use core::fmt;
use core::marker::PhantomData;

/// A subscriber bound to one message type.
trait Handler<S: ?Sized>: Send + Sync {
    fn message_type(&self) -> TypeId;
    fn handle(&self, sender: &mut S, message: &dyn Any);
}

struct Typed<M, F> {
    callback: F,
    message: PhantomData<fn(&M)>,
}

impl<S, M, F> Handler<S> for Typed<M, F>
where
    S: ?Sized,
    M: Any,
    F: Fn(&mut S, &M) + Send + Sync,
{
    #[inline]
    fn message_type(&self) -> TypeId {
        TypeId::of::<M>()
    }

    #[inline]
    fn handle(&self, sender: &mut S, message: &dyn Any) {
        if let Some(message) = message.downcast_ref::<M>() {
            (self.callback)(sender, message);
        }
    }
}

/// A signal carrying messages of any type from a sender `S`.
///
/// Subscribers run in connection order with exclusive access to the sender.
/// As with [`Delegate`](crate::Delegate), casting snapshots the subscriber
/// list first, so a subscriber may connect or disconnect freely.
///
/// # Examples
///
/// ```rust
/// use tether_signal::GenericSignal;
///
/// struct Window { title: String }
/// struct Renamed(&'static str);
/// struct Closed;
///
/// let signal: GenericSignal<Window> = GenericSignal::new();
/// let _rename = signal.connect(|w: &mut Window, m: &Renamed| w.title = m.0.to_string());
/// let _close = signal.connect(|w: &mut Window, _: &Closed| w.title.clear());
///
/// let mut window = Window { title: "untitled".into() };
/// signal.cast(&mut window, &Renamed("tether"));
/// assert_eq!(window.title, "tether");
/// ```
pub struct GenericSignal<S: ?Sized, L: RawLock = parking_lot::RawMutex> {
    registry: Registry<dyn Handler<S>, L>,
}

impl<S: ?Sized, L: RawLock> GenericSignal<S, L> {
    /// Creates a signal with no subscribers.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    /// Connects `callback` for messages of type `M`.
    pub fn connect<M, F>(&self, callback: F) -> Connection
    where
        M: Any,
        F: Fn(&mut S, &M) + Send + Sync + 'static,
    {
        let typed = Typed {
            callback,
            message: PhantomData,
        };
        self.registry.add(typed, |slot| slot as &Slot<dyn Handler<S>>)
    }

    /// Delivers `message` to every connected subscriber of type `M`.
    pub fn cast<M: Any>(&self, sender: &mut S, message: &M) {
        let wanted = TypeId::of::<M>();
        for slot in self.registry.snapshot() {
            let handler = slot.callable();
            if handler.message_type() == wanted {
                handler.handle(sender, message);
            }
        }
    }

    /// Number of connected subscribers, across all message types.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Whether no subscriber is connected.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

impl<S: ?Sized, L: RawLock> Default for GenericSignal<S, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized, L: RawLock> fmt::Debug for GenericSignal<S, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericSignal")
            .field("subscribers", &self.len())
            .finish()
    }
}

/// A signal with a single message type `M`.
///
/// ```rust
/// use tether_signal::Signal;
///
/// let clicked: Signal<Vec<u32>, u32> = Signal::new();
/// let _log = clicked.connect(|log, &button| log.push(button));
///
/// let mut log = Vec::new();
/// clicked.emit(&mut log, &1);
/// clicked.emit(&mut log, &3);
/// assert_eq!(log, [1, 3]);
/// ```
pub struct Signal<S: ?Sized, M, L: RawLock = parking_lot::RawMutex> {
    inner: GenericSignal<S, L>,
    message: PhantomData<fn(&M)>,
}

impl<S: ?Sized, M: Any, L: RawLock> Signal<S, M, L> {
    /// Creates a signal with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: GenericSignal::new(),
            message: PhantomData,
        }
    }

    /// Connects `callback`.
    pub fn connect<F>(&self, callback: F) -> Connection
    where
        F: Fn(&mut S, &M) + Send + Sync + 'static,
    {
        self.inner.connect::<M, F>(callback)
    }

    /// Delivers `message` to every connected subscriber.
    pub fn emit(&self, sender: &mut S, message: &M) {
        self.inner.cast(sender, message);
    }

    /// Number of connected subscribers.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no subscriber is connected.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<S: ?Sized, M: Any, L: RawLock> Default for Signal<S, M, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized, M, L: RawLock> fmt::Debug for Signal<S, M, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.inner.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Ping;
    struct Pong(u32);

    #[test]
    fn handlers_only_see_their_message_type() {
        let signal: GenericSignal<u32> = GenericSignal::new();
        let pings = Arc::new(AtomicUsize::new(0));
        let _ping = {
            let pings = pings.clone();
            signal.connect(move |_: &mut u32, _: &Ping| {
                pings.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _pong = signal.connect(|total: &mut u32, p: &Pong| *total += p.0);

        let mut total = 0;
        signal.cast(&mut total, &Pong(5));
        signal.cast(&mut total, &Ping);
        signal.cast(&mut total, &Pong(2));
        assert_eq!(total, 7);
        assert_eq!(pings.load(Ordering::SeqCst), 1);
        assert_eq!(signal.len(), 2);
    }

    #[test]
    fn sender_is_mutated_in_order() {
        let signal: Signal<Vec<&'static str>, ()> = Signal::new();
        let _a = signal.connect(|log, _| log.push("a"));
        let _b = signal.connect(|log, _| log.push("b"));

        let mut log = Vec::new();
        signal.emit(&mut log, &());
        assert_eq!(log, ["a", "b"]);
    }
}
