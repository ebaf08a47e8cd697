//! Tether Signal: thread-safe weak multicast delegates.
//!
//! Subscribers are stored in one [`tether`] allocation each and observed
//! weakly by their registry. A connected subscriber keeps itself alive;
//! disconnecting it, through its [`Connection`] or by dropping a
//! [`ScopedConnection`], lets it expire, and the registry sweeps expired
//! entries lazily.
//!
//! # Key Properties
//!
//! - **Snapshot isolation**: an invocation calls exactly the subscribers
//!   connected when it started. The registry lock is held only while taking
//!   that snapshot, never while a subscriber runs.
//! - **Re-entrancy**: a subscriber may connect, disconnect (itself or any
//!   other) or invoke again on the same delegate.
//! - **Lazy compaction**: expired entries are removed during a snapshot once
//!   fewer than three quarters of the stored entries are live.
//! - **Pluggable locking**: the registry lock is a type parameter, either a
//!   parking mutex (the default) or the [`Spin`] lock.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use tether_signal::{Event, ScopedConnection};
//!
//! let on_tick: Event<u32> = Event::new();
//! let seen = Arc::new(AtomicU32::new(0));
//!
//! {
//!     let seen = seen.clone();
//!     let _guard = ScopedConnection::from(on_tick.connect(move |t| {
//!         seen.fetch_add(*t, Ordering::SeqCst);
//!     }));
//!     on_tick.invoke(&5);
//! }
//!
//! // The guard went out of scope, so this tick reaches nobody.
//! on_tick.invoke(&7);
//! assert_eq!(seen.load(Ordering::SeqCst), 5);
//! ```

#![warn(missing_docs)]

mod bus;
mod connection;
mod delegate;
mod error;
mod lock;
mod reduce;
mod registry;
mod signal;
mod slot;

pub use bus::FunctionBus;
pub use connection::{Connection, ScopedConnection};
pub use delegate::{Delegate, Event};
pub use error::BusError;
pub use lock::{RawLock, Spin};
pub use parking_lot::RawMutex;
pub use reduce::{Collect, Ignore, LastValue, Reduce};
pub use registry::Registry;
pub use signal::{GenericSignal, Signal};
pub use slot::{Slot, SlotState};
