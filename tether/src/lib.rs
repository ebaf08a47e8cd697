//! Tether: intrusive atomic reference counting with lock-free weak promotion.
//!
//! Managed objects embed a [`ControlBlock`], a single 64-bit word holding
//! both the strong and the weak count. Handles ([`Strong`] and [`Weak`])
//! are a pair of pointers into that object, so the object, its counters and
//! its teardown bookkeeping share one allocation.
//!
//! # Key Properties
//!
//! - **One word, one arbiter**: acquire, release and weak promotion are each a
//!   single atomic operation on the packed counter. No locks, no ABA.
//! - **Exactly once**: the destructor runs when the strong count reaches zero,
//!   the memory is freed when both counts do, each exactly once.
//! - **Offset-aware teardown**: the control block may sit anywhere inside the
//!   managed type; the factory records its distance from the allocation start
//!   and the layout to free with.
//! - **Projection**: a handle can be narrowed to a field or a trait object
//!   while still owning the whole object.
//! - **`no_std` compatible**: only needs `alloc`.
//!
//! # Limits
//!
//! Each count is 32 bits wide. Holding more than `u32::MAX` simultaneous
//! strong or weak references to one object is undefined; the counters are
//! not checked on the fast path.
//!
//! # Example
//!
//! ```rust
//! use tether::{ControlBlock, Intrusive, Strong, make_intrusive};
//!
//! struct Chunk {
//!     control: ControlBlock,
//!     blocks: Vec<u16>,
//! }
//!
//! unsafe impl Intrusive for Chunk {
//!     fn control(&self) -> &ControlBlock {
//!         &self.control
//!     }
//! }
//!
//! let chunk = make_intrusive(Chunk { control: ControlBlock::new(), blocks: vec![0; 16] });
//! let observer = Strong::downgrade(&chunk);
//!
//! let remote = observer.clone();
//! let worker = std::thread::spawn(move || remote.lock().map(|c| c.blocks.len()));
//! assert_eq!(worker.join().unwrap(), Some(16));
//!
//! drop(chunk);
//! assert!(observer.lock().is_none());
//! ```

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod control;
mod factory;
mod strong;
mod weak;

pub use control::{ControlBlock, Intrusive};
pub use factory::{make_intrusive, make_intrusive_with, try_make_intrusive_with};
pub use strong::Strong;
pub use weak::Weak;
