//! The liveness block shared by a `Resource<T>` and its `Handle<T>`s.
//!
//! The block is one word. Bit 0 records whether the owner still exists, the
//! remaining bits count the live handles. Both halves change through a single
//! read-modify-write, so the owner going away and the last handle going away
//! can never both believe they are the one that frees the block.

use alloc::boxed::Box;
use core::ptr::NonNull;
use core::sync::atomic::Ordering;

#[cfg(all(not(feature = "no-atomic"), not(target_has_atomic = "ptr")))]
compile_error!("Cannot use `Resource` on a system without atomics. Enable the `no-atomic` feature.");

const OWNER_ALIVE: usize = 1;
const ONE_HANDLE: usize = 2;
const MAX_HANDLES: usize = (isize::MAX as usize) >> 1;

#[cfg(not(feature = "no-atomic"))]
use core::sync::atomic::{AtomicPtr, AtomicUsize as State};

#[cfg(feature = "no-atomic")]
use self::local::State;

#[cfg(feature = "no-atomic")]
mod local {
    use core::cell::Cell;
    use core::sync::atomic::Ordering;

    /// Single-threaded stand-in for `AtomicUsize` with the same call shape.
    pub(crate) struct State(Cell<usize>);

    impl State {
        #[inline]
        pub(crate) const fn new(value: usize) -> Self {
            State(Cell::new(value))
        }

        #[inline]
        pub(crate) fn load(&self, _: Ordering) -> usize {
            self.0.get()
        }

        #[inline]
        pub(crate) fn fetch_add(&self, offset: usize, _: Ordering) -> usize {
            let prev = self.0.get();
            self.0.set(prev + offset);
            prev
        }

        #[inline]
        pub(crate) fn fetch_sub(&self, offset: usize, _: Ordering) -> usize {
            let prev = self.0.get();
            self.0.set(prev - offset);
            prev
        }

        #[inline]
        pub(crate) fn fetch_and(&self, mask: usize, _: Ordering) -> usize {
            let prev = self.0.get();
            self.0.set(prev & mask);
            prev
        }
    }
}

#[inline]
fn acquire_fence() {
    #[cfg(not(feature = "no-atomic"))]
    core::sync::atomic::fence(Ordering::Acquire);
}

pub(crate) struct Liveness {
    state: State,
}

impl Liveness {
    const fn live() -> Self {
        Liveness {
            state: State::new(OWNER_ALIVE),
        }
    }

    /// Heap-allocates a block for a live owner with no handles yet.
    pub(crate) fn allocate() -> NonNull<Liveness> {
        let block = NonNull::from(Box::leak(Box::new(Liveness::live())));
        log::trace!("allocated liveness block {:p}", block);
        block
    }

    /// # Safety
    /// `block` must come from [`Liveness::allocate`] and must not be used afterwards.
    pub(crate) unsafe fn free(block: NonNull<Liveness>) {
        log::trace!("freeing liveness block {:p}", block);
        drop(unsafe { Box::from_raw(block.as_ptr()) });
    }

    #[inline]
    pub(crate) fn exists(&self) -> bool {
        self.state.load(Ordering::Acquire) & OWNER_ALIVE != 0
    }

    #[inline]
    pub(crate) fn reference_count(&self) -> usize {
        self.state.load(Ordering::Relaxed) >> 1
    }

    /// Register one more handle. Panics if the count would overflow.
    #[inline]
    pub(crate) fn retain(&self) {
        let prev = self.state.fetch_add(ONE_HANDLE, Ordering::Relaxed);
        if prev >> 1 >= MAX_HANDLES {
            panic!("Overflow of maximum handle count.");
        }
    }

    /// Unregister one handle. Returns `true` when the caller now has to free the block,
    /// which happens only once the owner is gone and this was the last handle.
    #[inline]
    #[must_use]
    pub(crate) fn release(&self) -> bool {
        let prev = self.state.fetch_sub(ONE_HANDLE, Ordering::Release);
        debug_assert!(prev >= ONE_HANDLE, "released a handle that was never retained");
        if prev != ONE_HANDLE {
            return false;
        }
        acquire_fence();
        true
    }

    /// Mark the owner as gone. Returns `true` when no handle is left and the caller
    /// has to free the block.
    #[must_use]
    pub(crate) fn orphan(&self) -> bool {
        let prev = self.state.fetch_and(!OWNER_ALIVE, Ordering::Release);
        debug_assert!(prev & OWNER_ALIVE != 0, "owner orphaned its block twice");
        if prev != OWNER_ALIVE {
            log::trace!(
                "owner dropped with {} outstanding handle(s), block {:p} stays alive",
                prev >> 1,
                self
            );
            return false;
        }
        acquire_fence();
        true
    }

    /// Handle side of the release protocol.
    ///
    /// # Safety
    /// `block` must be live and the caller must own one retained handle count on it.
    #[inline]
    pub(crate) unsafe fn drop_handle(block: NonNull<Liveness>) {
        if unsafe { block.as_ref() }.release() {
            unsafe { Liveness::free(block) };
        }
    }

    /// Owner side of the release protocol.
    ///
    /// # Safety
    /// `block` must be live and the caller must be the owner that allocated it.
    pub(crate) unsafe fn drop_owner(block: NonNull<Liveness>) {
        if unsafe { block.as_ref() }.orphan() {
            unsafe { Liveness::free(block) };
        }
    }
}

/// The owner's lazily filled pointer to its block.
pub(crate) struct Slot {
    #[cfg(not(feature = "no-atomic"))]
    ptr: AtomicPtr<Liveness>,
    #[cfg(feature = "no-atomic")]
    ptr: core::cell::Cell<*mut Liveness>,
}

impl Slot {
    pub(crate) const fn empty() -> Self {
        Slot {
            #[cfg(not(feature = "no-atomic"))]
            ptr: AtomicPtr::new(core::ptr::null_mut()),
            #[cfg(feature = "no-atomic")]
            ptr: core::cell::Cell::new(core::ptr::null_mut()),
        }
    }

    #[cfg(not(feature = "no-atomic"))]
    #[inline]
    pub(crate) fn get(&self) -> Option<NonNull<Liveness>> {
        NonNull::new(self.ptr.load(Ordering::Acquire))
    }

    #[cfg(feature = "no-atomic")]
    #[inline]
    pub(crate) fn get(&self) -> Option<NonNull<Liveness>> {
        NonNull::new(self.ptr.get())
    }

    /// Returns the block, allocating it on first use.
    #[cfg(not(feature = "no-atomic"))]
    pub(crate) fn get_or_allocate(&self) -> NonNull<Liveness> {
        if let Some(block) = self.get() {
            return block;
        }
        let fresh = Liveness::allocate();
        match self.ptr.compare_exchange(
            core::ptr::null_mut(),
            fresh.as_ptr(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => fresh,
            Err(winner) => {
                // Lost the race to another `create_reference`; nobody has seen `fresh`.
                unsafe { Liveness::free(fresh) };
                unsafe { NonNull::new_unchecked(winner) }
            }
        }
    }

    #[cfg(feature = "no-atomic")]
    pub(crate) fn get_or_allocate(&self) -> NonNull<Liveness> {
        if let Some(block) = self.get() {
            return block;
        }
        let fresh = Liveness::allocate();
        self.ptr.set(fresh.as_ptr());
        fresh
    }

    #[inline]
    pub(crate) fn take(&mut self) -> Option<NonNull<Liveness>> {
        NonNull::new(core::mem::replace(self.ptr.get_mut(), core::ptr::null_mut()))
    }
}
