//! `Strong<T>`: the owning handle.

use crate::control::ControlBlock;
use crate::weak::Weak;
use core::borrow::Borrow;
use core::cmp::Ordering as CmpOrdering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ops::Deref;
use core::ptr::{self, NonNull};

/// A thread-safe owning reference to an intrusively counted object.
///
/// A `Strong<T>` is a pair of pointers: one to the object's
/// [`ControlBlock`] and one to the value it dereferences to. Every handle to
/// the same object shares the control block; the value pointer may point to
/// the whole object or, after [`project`](Strong::project), to a part of it
/// or a trait object view of it.
///
/// Cloning adds a strong reference, dropping removes one. When the last
/// strong reference goes away the object is destroyed; its memory is freed
/// once no [`Weak`] observer remains either.
///
/// Handles compare, order and hash by the address they point to, not by
/// value.
///
/// # Examples
///
/// ```rust
/// use tether::{ControlBlock, Intrusive, Strong, make_intrusive};
///
/// struct Counter {
///     control: ControlBlock,
///     hits: u32,
/// }
///
/// unsafe impl Intrusive for Counter {
///     fn control(&self) -> &ControlBlock {
///         &self.control
///     }
/// }
///
/// let a = make_intrusive(Counter { control: ControlBlock::new(), hits: 3 });
/// let b = a.clone();
/// assert_eq!(Strong::strong_count(&a), 2);
/// assert!(Strong::ptr_eq(&a, &b));
/// assert_eq!(b.hits, 3);
/// ```
pub struct Strong<T: ?Sized> {
    control: NonNull<ControlBlock>,
    ptr: NonNull<T>,
    marker: PhantomData<T>,
}

// SAFETY: like `Arc`, a handle can be sent or shared across threads only when
// the pointee can be both sent and shared: any clone may drop it elsewhere.
unsafe impl<T: ?Sized + Send + Sync> Send for Strong<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for Strong<T> {}

impl<T: ?Sized> Strong<T> {
    /// Wraps a control block whose strong count already includes this handle.
    ///
    /// # Safety
    ///
    /// The caller transfers one strong reference on `control` to the new
    /// handle, and `ptr` must stay valid for as long as that object lives.
    #[inline]
    pub(crate) unsafe fn from_parts(control: NonNull<ControlBlock>, ptr: NonNull<T>) -> Self {
        Self {
            control,
            ptr,
            marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn control(this: &Self) -> &ControlBlock {
        // SAFETY: a live strong handle keeps the control block allocated.
        unsafe { this.control.as_ref() }
    }

    /// Creates a [`Weak`] observer of the same object.
    #[inline]
    pub fn downgrade(this: &Self) -> Weak<T> {
        Self::control(this).reference();
        // SAFETY: one weak reference was just added for the new handle.
        unsafe { Weak::from_parts(this.control, this.ptr) }
    }

    /// Number of strong owners of the object.
    #[inline]
    pub fn strong_count(this: &Self) -> u32 {
        Self::control(this).strong_count()
    }

    /// Number of weak observers of the object.
    #[inline]
    pub fn weak_count(this: &Self) -> u32 {
        Self::control(this).weak_count()
    }

    /// Returns `true` if both handles manage the same object.
    ///
    /// Two projections of one object into different fields still compare
    /// equal here, unlike with `==`.
    #[inline]
    pub fn ptr_eq<U: ?Sized>(this: &Self, other: &Strong<U>) -> bool {
        this.control == other.control
    }

    /// Raw pointer to the value this handle dereferences to.
    #[inline]
    pub fn as_ptr(this: &Self) -> *const T {
        this.ptr.as_ptr()
    }

    /// Narrows the handle to a part of the object, keeping the whole object
    /// alive.
    ///
    /// The resulting handle shares the original control block, so it counts
    /// as a strong owner of the entire object. This is how a handle to a
    /// concrete type becomes a handle to one of its fields or to a trait
    /// object.
    ///
    /// Dropping the last projected handle runs the destructor of the whole
    /// object on whichever thread drops it, so the object itself must be
    /// `Send + Sync` even when the projected part is. A handle to an object
    /// holding an `Rc` cannot be narrowed to a sendable field:
    ///
    /// ```compile_fail
    /// use std::rc::Rc;
    /// use tether::{ControlBlock, Intrusive, Strong, make_intrusive};
    ///
    /// struct Local {
    ///     control: ControlBlock,
    ///     shared: Rc<u32>,
    ///     id: u32,
    /// }
    ///
    /// unsafe impl Intrusive for Local {
    ///     fn control(&self) -> &ControlBlock {
    ///         &self.control
    ///     }
    /// }
    ///
    /// let local = make_intrusive(Local { control: ControlBlock::new(), shared: Rc::new(1), id: 7 });
    /// let id: Strong<u32> = Strong::project(local, |l| &l.id);
    /// std::thread::spawn(move || drop(id));
    /// ```
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::fmt::Display;
    /// use tether::{ControlBlock, Intrusive, Strong, make_intrusive};
    ///
    /// struct Labelled {
    ///     control: ControlBlock,
    ///     label: String,
    /// }
    ///
    /// unsafe impl Intrusive for Labelled {
    ///     fn control(&self) -> &ControlBlock {
    ///         &self.control
    ///     }
    /// }
    ///
    /// let whole = make_intrusive(Labelled { control: ControlBlock::new(), label: "x".into() });
    /// let label: Strong<dyn Display> = Strong::project(whole, |l| &l.label as &dyn Display);
    /// assert_eq!(label.to_string(), "x");
    /// ```
    #[inline]
    pub fn project<U: ?Sized, F>(this: Self, f: F) -> Strong<U>
    where
        T: Send + Sync,
        F: FnOnce(&T) -> &U,
    {
        let ptr = NonNull::from(f(&*this));
        let this = ManuallyDrop::new(this);
        // SAFETY: the strong reference moves from `this` to the new handle,
        // and `ptr` borrows from the object that reference keeps alive.
        unsafe { Strong::from_parts(this.control, ptr) }
    }
}

impl<T: ?Sized> Clone for Strong<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self::control(self).acquire();
        // SAFETY: one strong reference was just added for the clone.
        unsafe { Self::from_parts(self.control, self.ptr) }
    }
}

impl<T: ?Sized> Drop for Strong<T> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: this handle owns one strong reference.
        unsafe { ControlBlock::try_release(self.control) };
    }
}

impl<T: ?Sized> Deref for Strong<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: the object cannot be destroyed while this handle exists.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ?Sized> AsRef<T> for Strong<T> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T: ?Sized> Borrow<T> for Strong<T> {
    fn borrow(&self) -> &T {
        self
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Strong<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for Strong<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl<T: ?Sized> fmt::Pointer for Strong<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&Self::as_ptr(self), f)
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<Strong<U>> for Strong<T> {
    #[inline]
    fn eq(&self, other: &Strong<U>) -> bool {
        ptr::addr_eq(self.ptr.as_ptr(), other.ptr.as_ptr())
    }
}

impl<T: ?Sized> Eq for Strong<T> {}

impl<T: ?Sized, U: ?Sized> PartialOrd<Strong<U>> for Strong<T> {
    #[inline]
    fn partial_cmp(&self, other: &Strong<U>) -> Option<CmpOrdering> {
        Some(address(self.ptr).cmp(&address(other.ptr)))
    }
}

impl<T: ?Sized> Ord for Strong<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> CmpOrdering {
        address(self.ptr).cmp(&address(other.ptr))
    }
}

impl<T: ?Sized> Hash for Strong<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        address(self.ptr).hash(state);
    }
}

#[inline]
fn address<T: ?Sized>(ptr: NonNull<T>) -> usize {
    ptr.cast::<u8>().as_ptr() as usize
}
