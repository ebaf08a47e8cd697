//! `Weak<T>`: the non-owning observer.

use crate::control::ControlBlock;
use crate::strong::Strong;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

/// A non-owning reference to an intrusively counted object.
///
/// A `Weak<T>` does not keep the object alive, only its memory. It can be
/// promoted back to a [`Strong<T>`] with [`lock`](Weak::lock) as long as at
/// least one strong owner still exists.
///
/// # Examples
///
/// ```rust
/// use tether::{ControlBlock, Intrusive, Strong, make_intrusive};
///
/// struct Session {
///     control: ControlBlock,
///     id: u64,
/// }
///
/// unsafe impl Intrusive for Session {
///     fn control(&self) -> &ControlBlock {
///         &self.control
///     }
/// }
///
/// let session = make_intrusive(Session { control: ControlBlock::new(), id: 7 });
/// let observer = Strong::downgrade(&session);
/// assert_eq!(observer.lock().map(|s| s.id), Some(7));
///
/// drop(session);
/// assert!(observer.expired());
/// assert!(observer.lock().is_none());
/// ```
pub struct Weak<T: ?Sized> {
    control: NonNull<ControlBlock>,
    ptr: NonNull<T>,
    marker: PhantomData<T>,
}

// SAFETY: same rules as `Strong`: promotion can produce an owning handle on
// any thread.
unsafe impl<T: ?Sized + Send + Sync> Send for Weak<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for Weak<T> {}

impl<T: ?Sized> Weak<T> {
    /// # Safety
    ///
    /// The caller transfers one weak reference on `control` to the new handle.
    #[inline]
    pub(crate) unsafe fn from_parts(control: NonNull<ControlBlock>, ptr: NonNull<T>) -> Self {
        Self {
            control,
            ptr,
            marker: PhantomData,
        }
    }

    #[inline]
    fn control(&self) -> &ControlBlock {
        // SAFETY: a weak handle keeps the allocation, and with it the control
        // block, alive.
        unsafe { self.control.as_ref() }
    }

    /// Attempts to promote this observer to a strong owner.
    ///
    /// Never blocks. Returns `None` once the object has lost its last strong
    /// owner, even if its memory has not been freed yet.
    #[inline]
    pub fn lock(&self) -> Option<Strong<T>> {
        if self.control().try_lock() {
            // SAFETY: `try_lock` added a strong reference on our behalf.
            Some(unsafe { Strong::from_parts(self.control, self.ptr) })
        } else {
            None
        }
    }

    /// Number of strong owners of the object.
    #[inline]
    pub fn strong_count(&self) -> u32 {
        self.control().strong_count()
    }

    /// Number of weak observers of the object, this one included.
    ///
    /// Overcounts by one while the destructor is running; see
    /// [`ControlBlock::weak_count`].
    #[inline]
    pub fn weak_count(&self) -> u32 {
        self.control().weak_count()
    }

    /// Returns `true` if the object has no strong owner left.
    #[inline]
    pub fn expired(&self) -> bool {
        self.strong_count() == 0
    }

    /// Returns `true` if both handles observe the same object.
    #[inline]
    pub fn ptr_eq<U: ?Sized>(&self, other: &Weak<U>) -> bool {
        self.control == other.control
    }

    /// Raw pointer to the observed value. Only valid to dereference while a
    /// strong owner exists.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    #[inline]
    fn clone(&self) -> Self {
        self.control().reference();
        // SAFETY: one weak reference was just added for the clone.
        unsafe { Self::from_parts(self.control, self.ptr) }
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: this handle owns one weak reference.
        unsafe { ControlBlock::try_dereference(self.control) };
    }
}

impl<T: ?Sized> From<&Strong<T>> for Weak<T> {
    fn from(strong: &Strong<T>) -> Self {
        Strong::downgrade(strong)
    }
}

impl<T: ?Sized> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(Weak)")
    }
}
