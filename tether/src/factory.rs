//! Allocation and construction of managed objects.
//!
//! Construction is two-phase: raw storage for the concrete type is obtained
//! first and held by a [`RawBlock`] guard, then the value is produced and
//! written into it. Only after the control block has been told where the
//! allocation starts does the guard hand the storage over to a [`Strong`]
//! handle. If producing the value fails or panics, the guard gives the
//! storage back without running any destructor.

use crate::control::{ControlBlock, Intrusive};
use crate::strong::Strong;
use alloc::alloc::{alloc, dealloc, handle_alloc_error};
use core::alloc::Layout;
use core::convert::Infallible;
use core::marker::PhantomData as marker;
use core::mem;
use core::ptr::{self, NonNull};

/// Raw storage for one `T`, released on drop unless ownership was taken.
struct RawBlock<T> {
    base: NonNull<T>,
    marker: marker<T>,
}

impl<T> RawBlock<T> {
    const LAYOUT: Layout = Layout::new::<T>();

    fn allocate() -> Self {
        // Also keeps zero-sized layouts away from the allocator.
        assert!(
            Self::LAYOUT.size() >= mem::size_of::<ControlBlock>(),
            "Intrusive::control must return a field of the object itself"
        );
        // SAFETY: the layout has non-zero size.
        let raw = unsafe { alloc(Self::LAYOUT) };
        let Some(base) = NonNull::new(raw.cast::<T>()) else {
            handle_alloc_error(Self::LAYOUT)
        };
        Self { base, marker }
    }

    /// Moves `value` into the storage and disarms the guard.
    fn write(self, value: T) -> NonNull<T> {
        let base = self.base;
        mem::forget(self);
        // SAFETY: freshly allocated, correctly sized and aligned for `T`.
        unsafe { base.as_ptr().write(value) };
        base
    }
}

impl<T> Drop for RawBlock<T> {
    fn drop(&mut self) {
        // SAFETY: allocated in `allocate` with the same layout; no value was
        // ever written, so nothing needs dropping.
        unsafe { dealloc(self.base.as_ptr().cast::<u8>(), Self::LAYOUT) };
    }
}

unsafe fn drop_erased<T>(base: *mut u8) {
    unsafe { ptr::drop_in_place(base.cast::<T>()) };
}

/// Allocates a managed object holding `value` and returns its first strong
/// handle.
///
/// # Panics
///
/// Panics if the [`ControlBlock`] returned by [`Intrusive::control`] does not
/// lie inside `value` itself, or if it is already managed.
///
/// # Examples
///
/// ```rust
/// use tether::{ControlBlock, Intrusive, Strong, make_intrusive};
///
/// struct Texture {
///     control: ControlBlock,
///     width: u32,
/// }
///
/// unsafe impl Intrusive for Texture {
///     fn control(&self) -> &ControlBlock {
///         &self.control
///     }
/// }
///
/// let tex = make_intrusive(Texture { control: ControlBlock::new(), width: 64 });
/// assert_eq!(tex.width, 64);
/// assert_eq!(Strong::strong_count(&tex), 1);
/// ```
#[inline]
pub fn make_intrusive<T: Intrusive>(value: T) -> Strong<T> {
    make_intrusive_with(|| value)
}

/// Like [`make_intrusive`], but produces the value only after the storage
/// for it has been obtained.
///
/// If `init` panics, the storage is released during unwinding and no
/// destructor runs.
pub fn make_intrusive_with<T, F>(init: F) -> Strong<T>
where
    T: Intrusive,
    F: FnOnce() -> T,
{
    match try_make_intrusive_with(|| Ok::<T, Infallible>(init())) {
        Ok(strong) => strong,
        Err(never) => match never {},
    }
}

/// Fallible form of [`make_intrusive_with`].
///
/// If `init` returns an error, the storage is released and the error is
/// handed back unchanged.
///
/// # Examples
///
/// ```rust
/// use tether::{ControlBlock, Intrusive, try_make_intrusive_with};
///
/// struct Port {
///     control: ControlBlock,
///     number: u16,
/// }
///
/// unsafe impl Intrusive for Port {
///     fn control(&self) -> &ControlBlock {
///         &self.control
///     }
/// }
///
/// let parsed = try_make_intrusive_with(|| {
///     let number = "8080".parse::<u16>()?;
///     Ok::<_, std::num::ParseIntError>(Port { control: ControlBlock::new(), number })
/// });
/// assert_eq!(parsed.unwrap().number, 8080);
///
/// let rejected = try_make_intrusive_with(|| {
///     let number = "eighty".parse::<u16>()?;
///     Ok::<_, std::num::ParseIntError>(Port { control: ControlBlock::new(), number })
/// });
/// assert!(rejected.is_err());
/// ```
pub fn try_make_intrusive_with<T, E, F>(init: F) -> Result<Strong<T>, E>
where
    T: Intrusive,
    F: FnOnce() -> Result<T, E>,
{
    let block = RawBlock::<T>::allocate();
    let value = init()?;

    // The control block is a field, so its distance from the start of the
    // value survives the move into the allocation.
    let distance =
        (ptr::from_ref(value.control()) as usize).wrapping_sub(ptr::from_ref(&value) as usize);
    assert!(
        distance
            .checked_add(mem::size_of::<ControlBlock>())
            .is_some_and(|end| end <= RawBlock::<T>::LAYOUT.size()),
        "Intrusive::control must return a field of the object itself"
    );
    assert!(
        value.control().is_unmanaged(),
        "control block is already managed"
    );
    let base = block.write(value);

    // Derive the control pointer from the allocation so it carries the
    // provenance needed to free it later.
    // SAFETY: `distance` is in bounds of the allocation, checked above.
    let control = unsafe { base.cast::<u8>().add(distance).cast::<ControlBlock>() };
    unsafe {
        ControlBlock::install(
            control,
            -(distance as isize),
            RawBlock::<T>::LAYOUT,
            drop_erased::<T>,
        );
        Ok(Strong::from_parts(control, base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[repr(C)]
    struct Offset {
        padding: [u64; 3],
        control: ControlBlock,
        drops: Arc<AtomicUsize>,
        tag: String,
    }

    impl Offset {
        fn new(tag: &str, drops: &Arc<AtomicUsize>) -> Self {
            Self {
                padding: [1, 2, 3],
                control: ControlBlock::new(),
                drops: drops.clone(),
                tag: String::from(tag),
            }
        }
    }

    impl Drop for Offset {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    unsafe impl Intrusive for Offset {
        fn control(&self) -> &ControlBlock {
            &self.control
        }
    }

    struct Borrowed<'a> {
        control: &'a ControlBlock,
    }

    unsafe impl Intrusive for Borrowed<'_> {
        fn control(&self) -> &ControlBlock {
            self.control
        }
    }

    #[test]
    fn offset_control_block_round_trips() {
        let drops = Arc::new(AtomicUsize::new(0));
        let strong = make_intrusive(Offset::new("offset", &drops));
        assert_eq!(strong.padding, [1, 2, 3]);
        assert_eq!(strong.tag, "offset");

        let weak = Strong::downgrade(&strong);
        drop(strong);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(weak.lock().is_none());
        drop(weak);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn init_runs_after_allocation() {
        let drops = Arc::new(AtomicUsize::new(0));
        let strong = make_intrusive_with(|| Offset::new("lazy", &drops));
        assert_eq!(strong.tag, "lazy");
    }

    #[test]
    fn failed_init_returns_error() {
        let result: Result<Strong<Offset>, &str> = try_make_intrusive_with(|| Err("nope"));
        assert_eq!(result.err(), Some("nope"));
    }

    #[test]
    #[should_panic(expected = "must return a field of the object itself")]
    fn foreign_control_block_is_rejected() {
        static FOREIGN: ControlBlock = ControlBlock::new();
        let _ = make_intrusive(Borrowed { control: &FOREIGN });
    }

    #[test]
    fn managed_block_cannot_be_reused() {
        let drops = Arc::new(AtomicUsize::new(0));
        let first = make_intrusive(Offset::new("first", &drops));
        // A control block copied out of a live object still carries counts.
        let copied = unsafe { ptr::read(&first.control) };
        let mut second = Offset::new("second", &drops);
        second.control = copied;

        let outcome = std::panic::catch_unwind(core::panic::AssertUnwindSafe(|| {
            make_intrusive(second)
        }));
        assert!(outcome.is_err());
        // The rejected value was dropped normally, the live one is untouched.
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(Strong::strong_count(&first), 1);
    }
}
