//! Packed strong/weak reference counter embedded in every managed object.
//!
//! One 64-bit word carries both counts: the upper 32 bits count strong
//! owners, the lower 32 bits count weak observers. Every transition that
//! matters for lifetime (acquire, release, promotion) is a single
//! fetch-add, fetch-sub or compare-exchange on that word, so strong and weak
//! counts can never be observed out of step with each other.
//!
//! Strong owners collectively hold one extra weak reference. The last strong
//! release runs the destructor first and only then gives that reference up,
//! so a concurrent weak release can never free the memory while the
//! destructor is still running.
//!
//! Neither field is guarded against overflow. More than `u32::MAX`
//! simultaneous strong or weak references to one object is undefined.

use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::Ordering;
use portable_atomic::AtomicU64;

/// One strong reference, as it appears in the packed word.
pub(crate) const STRONG_ONE: u64 = 1 << 32;

/// Mask selecting the weak field.
const WEAK_MASK: u64 = u32::MAX as u64;

/// Destruction and deallocation descriptor, recorded once by the factory
/// before the object is published.
#[derive(Clone, Copy)]
struct Teardown {
    /// Byte distance from the control block to the start of the allocation.
    /// Zero or negative: the control block lives inside the allocation.
    base_offset: isize,
    /// Layout the allocation was obtained with.
    layout: Layout,
    /// Type-erased `drop_in_place` for the concrete object type.
    drop_value: unsafe fn(*mut u8),
}

unsafe fn drop_nothing(_: *mut u8) {}

impl Teardown {
    const UNSET: Self = Self {
        base_offset: 0,
        layout: Layout::new::<()>(),
        drop_value: drop_nothing,
    };
}

/// Reference-count header that a managed type embeds as one of its fields.
///
/// A `ControlBlock` does nothing on its own. It becomes live when the object
/// that contains it is handed to [`make_intrusive`](crate::make_intrusive),
/// which records where the allocation starts relative to the block and how
/// the object is destroyed.
///
/// The block may sit at any offset inside the containing type; it does not
/// have to be the first field.
///
/// # Examples
///
/// ```rust
/// use tether::{ControlBlock, Intrusive, make_intrusive};
///
/// struct Node {
///     name: String,
///     control: ControlBlock,
/// }
///
/// unsafe impl Intrusive for Node {
///     fn control(&self) -> &ControlBlock {
///         &self.control
///     }
/// }
///
/// let node = make_intrusive(Node { name: "root".into(), control: ControlBlock::new() });
/// assert_eq!(node.name, "root");
/// ```
pub struct ControlBlock {
    count: AtomicU64,
    teardown: UnsafeCell<Teardown>,
}

// SAFETY: `count` is atomic. `teardown` is written exactly once by the
// factory while it still owns the allocation exclusively, and only read after
// the object has been published through a handle.
unsafe impl Send for ControlBlock {}
unsafe impl Sync for ControlBlock {}

impl ControlBlock {
    /// Creates an unmanaged control block with both counts at zero.
    #[inline]
    pub const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            teardown: UnsafeCell::new(Teardown::UNSET),
        }
    }

    /// Number of strong owners at the time of the call.
    #[inline]
    pub fn strong_count(&self) -> u32 {
        (self.count.load(Ordering::Acquire) >> 32) as u32
    }

    /// Number of weak observers at the time of the call, excluding the
    /// reference held on behalf of the strong owners.
    ///
    /// While the destructor runs the strong count is already zero but the
    /// owners' reference is not yet released, so a call made during
    /// destruction (from the destructor itself or through a racing weak
    /// handle) reports one more than the number of weak handles.
    #[inline]
    pub fn weak_count(&self) -> u32 {
        let word = self.count.load(Ordering::Acquire);
        let weak = (word & WEAK_MASK) as u32;
        if word >> 32 != 0 { weak.saturating_sub(1) } else { weak }
    }

    /// Returns `true` if no handle has ever been created for this block.
    #[inline]
    pub(crate) fn is_unmanaged(&self) -> bool {
        self.count.load(Ordering::Relaxed) == 0
    }

    /// Records the teardown descriptor and takes the first strong reference
    /// together with the implicit weak one.
    ///
    /// # Safety
    ///
    /// `this` must point into a fresh allocation described by `layout` and
    /// starting `-base_offset` bytes before `this`, and no handle to it may
    /// exist yet.
    pub(crate) unsafe fn install(
        this: NonNull<Self>,
        base_offset: isize,
        layout: Layout,
        drop_value: unsafe fn(*mut u8),
    ) {
        let block = unsafe { this.as_ref() };
        debug_assert!(block.is_unmanaged());
        // SAFETY: nothing else can observe the block before the first handle
        // is created.
        unsafe {
            *block.teardown.get() = Teardown {
                base_offset,
                layout,
                drop_value,
            };
        }
        block.count.store(STRONG_ONE | 1, Ordering::Release);
    }

    /// Adds one strong reference.
    #[inline]
    pub(crate) fn acquire(&self) {
        // Relaxed: a new reference can only be made from an existing one,
        // which already orders this with respect to the object's creation.
        self.count.fetch_add(STRONG_ONE, Ordering::Relaxed);
    }

    /// Adds one weak reference.
    #[inline]
    pub(crate) fn reference(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Attempts to add one strong reference without blocking.
    ///
    /// Fails as soon as the strong field reads zero: once the last strong
    /// owner is gone, the destructor has run or is about to, and the object
    /// can never be resurrected.
    #[inline]
    pub(crate) fn try_lock(&self) -> bool {
        let mut word = self.count.load(Ordering::Relaxed);
        loop {
            if word >> 32 == 0 {
                return false;
            }
            match self.count.compare_exchange_weak(
                word,
                word + STRONG_ONE,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => word = actual,
            }
        }
    }

    /// Drops one strong reference. The last one destroys the object and then
    /// releases the implicit weak reference, which frees the memory in the
    /// same step when no weak observer is left.
    ///
    /// # Safety
    ///
    /// The caller must own one strong reference and give it up with this call.
    #[inline]
    pub(crate) unsafe fn try_release(this: NonNull<Self>) {
        let last = unsafe { this.as_ref() }
            .count
            .fetch_sub(STRONG_ONE, Ordering::AcqRel);
        debug_assert!(last >= STRONG_ONE, "strong count underflow");
        if last >> 32 == 1 {
            unsafe {
                Self::destroy(this);
                Self::try_dereference(this);
            }
        }
    }

    /// Drops one weak reference; frees the memory when the whole word reaches
    /// zero.
    ///
    /// # Safety
    ///
    /// The caller must own one weak reference and give it up with this call.
    #[inline]
    pub(crate) unsafe fn try_dereference(this: NonNull<Self>) {
        let last = unsafe { this.as_ref() }
            .count
            .fetch_sub(1, Ordering::AcqRel);
        debug_assert!(last & WEAK_MASK != 0, "weak count underflow");
        if last == 1 {
            unsafe { Self::dealloc(this) };
        }
    }

    #[cold]
    unsafe fn destroy(this: NonNull<Self>) {
        let teardown = unsafe { *this.as_ref().teardown.get() };
        let base = unsafe { this.as_ptr().cast::<u8>().offset(teardown.base_offset) };
        // SAFETY: the strong count just reached zero, so this runs exactly once
        // and nothing can reach the value any more.
        unsafe { (teardown.drop_value)(base) };
    }

    #[cold]
    unsafe fn dealloc(this: NonNull<Self>) {
        // The block itself has no destructor, so its fields stay readable
        // after the containing value was dropped.
        let teardown = unsafe { *this.as_ref().teardown.get() };
        let base = unsafe { this.as_ptr().cast::<u8>().offset(teardown.base_offset) };
        // SAFETY: both counts are zero; `base` and `layout` are exactly what
        // the factory allocated with.
        unsafe { alloc::alloc::dealloc(base, teardown.layout) };
    }
}

impl Default for ControlBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlBlock")
            .field("strong", &self.strong_count())
            .field("weak", &self.weak_count())
            .finish()
    }
}

/// Types that embed a [`ControlBlock`] and can therefore be managed by
/// [`Strong`](crate::Strong) and [`Weak`](crate::Weak) handles.
///
/// # Safety
///
/// `control` must always return a reference to the same `ControlBlock` field
/// stored inline in `self`, never one held behind a pointer or shared with
/// another object.
pub unsafe trait Intrusive {
    /// The embedded control block.
    fn control(&self) -> &ControlBlock;
}
