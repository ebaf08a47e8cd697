//! Pluggable mutual exclusion for subscriber registries.
//!
//! A registry only holds its lock for short, bounded scans of its entry
//! list, so either a spin lock or a parking mutex is a reasonable choice.
//! Any [`lock_api::RawMutex`] works; [`Spin`] and `parking_lot::RawMutex`
//! are provided.

use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};
use parking_lot::lock_api;

/// Raw lock guarding a registry's entry list.
pub use parking_lot::lock_api::RawMutex as RawLock;

/// Entry list guarded by the registry's chosen lock.
pub(crate) type Locked<L, T> = lock_api::Mutex<L, T>;

/// Test-test-and-set spin lock.
///
/// Spins on a relaxed load so waiting threads stay in their own cache and
/// only attempt the swap once the lock looks free.
pub struct Spin {
    acquired: AtomicBool,
}

unsafe impl lock_api::RawMutex for Spin {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        acquired: AtomicBool::new(false),
    };

    type GuardMarker = lock_api::GuardSend;

    #[inline]
    fn lock(&self) {
        loop {
            // Test phase: spin on relaxed load (stays in cache)
            while self.acquired.load(Ordering::Relaxed) {
                spin_loop();
            }
            // Test-and-set phase: attempt to acquire
            if self.try_lock() {
                return;
            }
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        !self.acquired.swap(true, Ordering::Acquire)
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.acquired.store(false, Ordering::Release);
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.acquired.load(Ordering::Relaxed)
    }
}
