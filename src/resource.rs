use core::{
    borrow::Borrow,
    cell::UnsafeCell,
    fmt::{Debug, Display, Pointer},
    hash::{Hash, Hasher},
    marker::PhantomPinned,
    ops::{Deref, DerefMut},
    pin::Pin,
    ptr::{self, NonNull},
};

use alloc::boxed::Box;

use crate::liveness::{Liveness, Slot};

/// `Resource<T>` stores a value with a single, deterministic owner and hands out [`Handle<T>`]s to it.
///
/// A handle never keeps the value alive. It only keeps a small liveness block alive, which lets it
/// ask at any time whether the `Resource<T>` it came from has been dropped. The block is allocated
/// the first time a handle is requested, so a resource that is never referenced costs nothing extra.
///
/// ## Pinning
/// Handles point straight at the value inside the resource, so a referenced resource must never
/// move. [`Resource::create_reference`] therefore takes a `Pin<&Resource<T>>`. Use [`Resource::pin`]
/// to place it on the heap or [`core::pin::pin!`] to keep it on the stack. A resource that was never
/// pinned has no handles and can be moved freely. `Resource<T>` is neither [`Clone`] nor [`Copy`].
///
/// ## [`Deref`] and [`DerefMut`] behavior
/// `Resource<T>` dereferences to `&T`. [`DerefMut`] only applies while the resource is unpinned;
/// once pinned, use [`Resource::get_mut`] or [`Resource::set`]. To prevent name clashes with `T`,
/// `Resource<T>`'s functions are associated.
///
/// ## Drop behavior
/// Dropping the resource marks its liveness block as gone, then drops the value. If no handle is
/// left, the block is freed immediately; otherwise the last handle to go frees it.
///
/// ## Examples
/// ```
/// use resource_handle::Resource;
///
/// let resource = Resource::pin(5);
/// let handle = Resource::create_reference(resource.as_ref());
/// assert!(handle.exists());
/// assert_eq!(handle.reference_count(), 1);
/// assert_eq!(unsafe { handle.get() }, Some(&5));
///
/// drop(resource);
/// assert!(!handle.exists());
/// assert_eq!(unsafe { handle.get() }, None);
/// ```
pub struct Resource<T> {
    value: UnsafeCell<T>,
    liveness: Slot,
    _pinned: PhantomPinned,
}

#[cfg(not(feature = "no-atomic"))]
unsafe impl<T: Send + Sync> Sync for Resource<T> {}

impl<T> Resource<T> {
    /// Creates a new `Resource<T>` holding `value`. No liveness block is allocated yet.
    /// ```
    /// use resource_handle::Resource;
    ///
    /// let resource = Resource::new(100);
    /// assert_eq!(*resource, 100);
    /// assert_eq!(Resource::reference_count(&resource), 0);
    /// ```
    #[inline]
    pub const fn new(value: T) -> Self {
        Resource {
            value: UnsafeCell::new(value),
            liveness: Slot::empty(),
            _pinned: PhantomPinned,
        }
    }

    /// Creates a new `Resource<T>` from the value built by `init`.
    /// ```
    /// use resource_handle::Resource;
    ///
    /// let resource = Resource::new_with(|| String::from("built in place"));
    /// assert_eq!(resource.len(), 14);
    /// ```
    #[inline]
    pub fn new_with<F>(init: F) -> Self
    where
        F: FnOnce() -> T,
    {
        Resource::new(init())
    }

    /// Creates a new heap-allocated `Pin<Box<Resource<T>>>`, ready to hand out handles.
    #[inline]
    pub fn pin(value: T) -> Pin<Box<Resource<T>>> {
        Box::pin(Resource::new(value))
    }

    /// Mints a new handle to the value. The first call allocates the liveness block.
    /// This is the only way to obtain a handle that is bound to a value.
    /// ```
    /// use core::pin::pin;
    /// use resource_handle::Resource;
    ///
    /// let resource = pin!(Resource::new(5));
    /// let h1 = Resource::create_reference(resource.as_ref());
    /// let h2 = Resource::create_reference(resource.as_ref());
    /// assert!(h1 == h2);
    /// assert_eq!(Resource::reference_count(&resource), 2);
    /// ```
    pub fn create_reference(this: Pin<&Self>) -> Handle<T> {
        let this = this.get_ref();
        let block = this.liveness.get_or_allocate();
        unsafe { block.as_ref() }.retain();
        Handle {
            value: this.value.get(),
            liveness: Some(block),
        }
    }

    /// Return the number of live handles to this resource, or zero if it never handed one out.
    #[inline]
    pub fn reference_count(this: &Self) -> usize {
        this.liveness
            .get()
            .map_or(0, |block| unsafe { block.as_ref() }.reference_count())
    }

    /// Get a `&mut` reference to the value of a pinned resource. Existing handles keep observing the
    /// same location.
    /// ```
    /// use resource_handle::Resource;
    ///
    /// let mut resource = Resource::pin(1);
    /// let handle = Resource::create_reference(resource.as_ref());
    /// *Resource::get_mut(resource.as_mut()) += 1;
    /// assert_eq!(unsafe { handle.get() }, Some(&2));
    /// ```
    #[inline]
    pub fn get_mut(this: Pin<&mut Self>) -> &mut T {
        // The value is not structurally pinned; only the resource's address matters to handles.
        unsafe { this.get_unchecked_mut() }.value.get_mut()
    }

    /// Replace the value in place. Handles stay valid and observe the new value.
    #[inline]
    pub fn set(this: Pin<&mut Self>, value: T) {
        *Resource::get_mut(this) = value;
    }

    /// Replace the value in place and return the old one.
    /// ```
    /// use resource_handle::Resource;
    ///
    /// let mut resource = Resource::pin(String::from("old"));
    /// let handle = Resource::create_reference(resource.as_ref());
    /// let old = Resource::replace(resource.as_mut(), String::from("new"));
    /// assert_eq!(old, "old");
    /// assert_eq!(unsafe { handle.get() }.map(String::as_str), Some("new"));
    /// ```
    #[inline]
    pub fn replace(this: Pin<&mut Self>, value: T) -> T {
        core::mem::replace(Resource::get_mut(this), value)
    }

    /// Gets the raw pointer to the value. Handles created from this resource point to the same address.
    #[inline]
    pub fn as_ptr(this: &Self) -> *const T {
        this.value.get()
    }
}

impl<T> Drop for Resource<T> {
    fn drop(&mut self) {
        if let Some(block) = self.liveness.take() {
            unsafe { Liveness::drop_owner(block) };
        }
    }
}

impl<T> Deref for Resource<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.value.get() }
    }
}

impl<T> DerefMut for Resource<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }
}

impl<T> AsRef<T> for Resource<T> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T> Borrow<T> for Resource<T> {
    fn borrow(&self) -> &T {
        self
    }
}

impl<T: Default> Default for Resource<T> {
    fn default() -> Self {
        Resource::new(T::default())
    }
}

impl<T> From<T> for Resource<T> {
    /// Equivalent to [`Resource::new`].
    fn from(value: T) -> Self {
        Resource::new(value)
    }
}

impl<T: Display> Display for Resource<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Display::fmt(&**self, f)
    }
}

impl<T: Debug> Debug for Resource<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Debug::fmt(&**self, f)
    }
}

impl<T> Pointer for Resource<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Pointer::fmt(&Resource::as_ptr(self), f)
    }
}

impl<T: Hash> Hash for Resource<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        (**self).hash(state);
    }
}

impl<T: PartialEq> PartialEq for Resource<T> {
    /// Compares the values, not the resources' identities.
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl<T: Eq> Eq for Resource<T> {}

impl<T: PartialOrd> PartialOrd for Resource<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        (**self).partial_cmp(&**other)
    }
}

impl<T: Ord> Ord for Resource<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        (**self).cmp(&**other)
    }
}

/// `Handle<T>` is a non-owning reference to the value held by a [`Resource<T>`].
///
/// A handle can always tell whether its resource still exists with [`Handle::exists`], but it never
/// extends the resource's lifetime. Handles are counted: [`Handle::reference_count`] reports how many
/// handles share the same liveness block. Cloning a handle increments that count, dropping or
/// resetting one decrements it, and moving one leaves it unchanged.
///
/// A default handle is empty: it points at nothing, is never equal to any handle, and is not counted.
/// `core::mem::take(&mut handle)` moves a handle out and leaves an empty one behind.
///
/// ## Access
/// Reading through a handle is `unsafe`. The liveness check says the resource existed when it was
/// made, not that it will outlive the borrow, and the owner may hand out `&mut T` at any time.
/// `Handle<T>` therefore does not implement [`Deref`].
///
/// ## Examples
/// ```
/// use resource_handle::{Handle, Resource};
///
/// let resource = Resource::pin(5);
/// let h1 = Resource::create_reference(resource.as_ref());
/// let h2 = h1.clone();
/// assert_eq!(h1.reference_count(), 2);
/// drop(h2);
/// assert_eq!(h1.reference_count(), 1);
///
/// let empty: Handle<i32> = Handle::new();
/// assert!(!empty.exists());
/// assert_eq!(empty.reference_count(), 0);
/// ```
pub struct Handle<T> {
    value: *mut T,
    liveness: Option<NonNull<Liveness>>,
}

#[cfg(not(feature = "no-atomic"))]
unsafe impl<T: Sync + Send> Send for Handle<T> {}
#[cfg(not(feature = "no-atomic"))]
unsafe impl<T: Sync + Send> Sync for Handle<T> {}

impl<T> Handle<T> {
    /// Creates an empty handle, bound to no resource.
    #[inline]
    pub const fn new() -> Self {
        Handle {
            value: ptr::null_mut(),
            liveness: None,
        }
    }

    /// Returns `true` while the resource this handle was created from is alive.
    /// Always `false` for an empty handle.
    #[inline]
    pub fn exists(&self) -> bool {
        self.liveness
            .is_some_and(|block| unsafe { block.as_ref() }.exists())
    }

    /// Returns `true` if this handle is bound to no liveness block at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.liveness.is_none()
    }

    /// Return how many handles share this handle's liveness block, or zero if it is empty.
    /// The count survives the resource: it drops only as handles go away.
    /// ```
    /// use resource_handle::Resource;
    ///
    /// let resource = Resource::pin(5);
    /// let handle = Resource::create_reference(resource.as_ref());
    /// drop(resource);
    /// assert!(!handle.exists());
    /// assert_eq!(handle.reference_count(), 1);
    /// ```
    #[inline]
    pub fn reference_count(&self) -> usize {
        self.liveness
            .map_or(0, |block| unsafe { block.as_ref() }.reference_count())
    }

    /// Gets the raw pointer to the referenced value, or null for an empty handle.
    /// The pointer is not cleared when the resource is dropped.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.value
    }

    /// Mutable raw pointer to the referenced value, or null for an empty handle.
    /// Like [`Handle::as_ptr`], it is not cleared when the resource is dropped.
    #[inline]
    pub fn as_mut_ptr(&self) -> *mut T {
        self.value
    }

    /// Borrow the value if the resource still exists.
    ///
    /// # Safety
    /// For as long as the returned reference is used, the resource must not be dropped (on any
    /// thread) and the value must not be mutated through the resource or another handle.
    #[inline]
    pub unsafe fn get(&self) -> Option<&T> {
        if self.exists() {
            Some(unsafe { &*self.value })
        } else {
            None
        }
    }

    /// Mutably borrow the value if the resource still exists.
    ///
    /// # Safety
    /// For as long as the returned reference is used, the resource must not be dropped and the value
    /// must not be accessed through the resource or another handle.
    #[inline]
    pub unsafe fn get_mut(&mut self) -> Option<&mut T> {
        if self.exists() {
            Some(unsafe { &mut *self.value })
        } else {
            None
        }
    }

    /// Borrow the value without checking that the resource exists.
    ///
    /// # Safety
    /// The handle must not be empty, and the same requirements as [`Handle::get`] apply.
    #[inline]
    pub unsafe fn get_unchecked(&self) -> &T {
        debug_assert!(!self.value.is_null(), "dereferenced an empty handle");
        unsafe { &*self.value }
    }

    /// Release this handle's binding and leave it empty.
    #[inline]
    pub fn reset(&mut self) {
        drop(self.take());
    }

    /// Move the binding out, leaving an empty handle behind. The count is unchanged.
    /// ```
    /// use resource_handle::Resource;
    ///
    /// let resource = Resource::pin(5);
    /// let mut h1 = Resource::create_reference(resource.as_ref());
    /// let h2 = h1.take();
    /// assert_eq!(h2.reference_count(), 1);
    /// assert!(!h1.exists());
    /// assert_eq!(h1.reference_count(), 0);
    /// ```
    #[inline]
    pub fn take(&mut self) -> Handle<T> {
        core::mem::take(self)
    }

    /// Exchange bindings with `other`. No counts change.
    #[inline]
    pub fn swap(&mut self, other: &mut Handle<T>) {
        core::mem::swap(&mut self.value, &mut other.value);
        core::mem::swap(&mut self.liveness, &mut other.liveness);
    }
}

impl<T> Drop for Handle<T> {
    #[inline]
    fn drop(&mut self) {
        if let Some(block) = self.liveness.take() {
            unsafe { Liveness::drop_handle(block) };
        }
    }
}

impl<T> Clone for Handle<T> {
    /// Clone a `Handle<T>`, incrementing the count of a bound handle.
    /// It will panic if the count overflows.
    #[inline]
    fn clone(&self) -> Self {
        if let Some(block) = self.liveness {
            unsafe { block.as_ref() }.retain();
        }
        Handle {
            value: self.value,
            liveness: self.liveness,
        }
    }

    #[inline]
    fn clone_from(&mut self, source: &Self) {
        let mut copy = source.clone();
        self.swap(&mut copy);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Handle::new()
    }
}

impl<T> PartialEq for Handle<T> {
    /// Two handles are equal when they share a liveness block, whatever the values hold.
    /// Empty handles are equal to nothing.
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.liveness.is_some() && self.liveness == other.liveness
    }
}

impl<T> Pointer for Handle<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Pointer::fmt(&self.as_ptr(), f)
    }
}

impl<T> Debug for Handle<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Handle")
            .field("value", &self.value)
            .field("exists", &self.exists())
            .field("reference_count", &self.reference_count())
            .finish()
    }
}
