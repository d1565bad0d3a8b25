//! Import side: proxies for foreign objects.
//!
//! A [`ComPtr`] is the local stand-in for an object owned by the foreign
//! side. It reads the dispatch-table base from the first machine word of the
//! raw pointer, resolves function-pointer slots lazily, and owns exactly one
//! reference to the foreign object which it gives back exactly once when it
//! is released or dropped.

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::com::{
    ComInterface, HRESULT, QueryInterfaceFn, RawComPtr, RawSlot, ReleaseFn, S_OK,
    SLOT_ADD_REF, SLOT_QUERY_INTERFACE, SLOT_RELEASE,
};

/// Proxy for a foreign object.
///
/// Ownership discipline: every live `ComPtr` owns exactly one reference.
/// Pointers returned through the ABI (query-interface results, factory
/// results) arrive with one reference already charged to the caller, so they
/// are adopted with [`ComPtr::from_raw`]; borrowed pointers are wrapped with
/// [`ComPtr::from_borrowed`], which charges its own. Either way the
/// destructor gives back exactly one.
pub struct ComPtr {
    this: NonNull<c_void>,
    vtable: NonNull<RawSlot>,
    // Lazily resolved slot -> function pointer cache. Writes are idempotent
    // (every thread resolves the same table entry), so a relaxed benign race
    // is fine.
    slots: Box<[AtomicPtr<c_void>]>,
}

// The foreign contract requires objects to be callable from any thread that
// holds a reference; the proxy itself is only raw pointers plus an atomic
// cache.
unsafe impl Send for ComPtr {}
unsafe impl Sync for ComPtr {}

impl ComPtr {
    /// Adopt a foreign pointer whose reference has already been charged to
    /// us (the convention for every pointer returned through the ABI).
    ///
    /// `vtable_size` is the full dispatch-table size of the pointer's
    /// concrete interface, as computed by the idl compiler.
    ///
    /// # Safety
    /// `ptr` must be a live foreign object following the ABI contract: its
    /// first machine word is the dispatch-table base, and the table holds at
    /// least `vtable_size` populated slots.
    ///
    /// # Panics
    /// Panics if `ptr` is null or `vtable_size < 3`; both indicate a caller
    /// bug, not a recoverable condition.
    #[must_use]
    pub unsafe fn from_raw(ptr: RawComPtr, vtable_size: usize) -> Self {
        let Some(this) = NonNull::new(ptr as *mut c_void) else {
            panic!("cannot build a proxy over a null foreign pointer");
        };
        assert!(
            vtable_size >= 3,
            "every dispatch table carries at least the IUnknown triad"
        );
        // ABI: the object's first machine word is the dispatch-table base.
        let vtable = unsafe { *(ptr as *const *mut RawSlot) };
        let Some(vtable) = NonNull::new(vtable) else {
            panic!("foreign object has a null dispatch-table pointer");
        };
        let slots = (0..vtable_size)
            .map(|_| AtomicPtr::new(std::ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            this,
            vtable,
            slots,
        }
    }

    /// Wrap a borrowed foreign pointer, charging a reference of our own
    /// through slot 1.
    ///
    /// # Safety
    /// Same contract as [`ComPtr::from_raw`].
    #[must_use]
    pub unsafe fn from_borrowed(ptr: RawComPtr, vtable_size: usize) -> Self {
        let this = unsafe { Self::from_raw(ptr, vtable_size) };
        this.add_ref();
        this
    }

    /// The raw foreign pointer, for passing back across the boundary.
    /// No ownership is transferred.
    #[must_use]
    pub fn as_raw(&self) -> RawComPtr {
        self.this.as_ptr()
    }

    /// Resolve the function pointer at `slot`, caching it on first use.
    ///
    /// `F` must be the method's raw `unsafe extern "system" fn` type; the
    /// caller is responsible for matching the foreign signature.
    ///
    /// # Safety
    /// The slot must hold a function of type `F` per the compiled layout.
    #[must_use]
    pub unsafe fn method<F: Copy>(&self, slot: usize) -> F {
        const {
            assert!(
                std::mem::size_of::<F>() == std::mem::size_of::<RawSlot>(),
                "slot type must be a bare function pointer"
            );
        }
        assert!(
            slot < self.slots.len(),
            "slot index outside this interface's dispatch table"
        );

        let mut entry = self.slots[slot].load(Ordering::Relaxed);
        if entry.is_null() {
            // Benign race: every thread reads the same table entry.
            entry = unsafe { *self.vtable.as_ptr().add(slot) } as *mut c_void;
            assert!(!entry.is_null(), "dispatch through an unpopulated slot");
            self.slots[slot].store(entry, Ordering::Relaxed);
        }
        // SAFETY: entry is the function pointer the foreign side published
        // for this slot; the caller vouches for its type.
        unsafe { std::mem::transmute_copy::<*mut c_void, F>(&entry) }
    }

    /// Query the foreign object for another interface.
    ///
    /// Absence of an interface is a normal outcome, not a fault: a nonzero
    /// status simply yields `None`. On success the returned pointer arrives
    /// with its reference already charged and is adopted into a new typed
    /// proxy.
    #[must_use]
    pub fn query_interface<T: ComInterface>(&self) -> Option<T> {
        let qi: QueryInterfaceFn = unsafe { self.method(SLOT_QUERY_INTERFACE) };
        let mut out: RawComPtr = std::ptr::null();
        let hr = unsafe { qi(self.as_raw(), &T::IID, &mut out) };
        if hr == S_OK && !out.is_null() {
            Some(T::from_com(unsafe { ComPtr::from_raw(out, T::VTABLE_SIZE) }))
        } else {
            None
        }
    }

    /// Charge one more reference through slot 1. Returns the foreign
    /// object's reported count.
    pub fn add_ref(&self) -> HRESULT {
        let add_ref: crate::com::AddRefFn = unsafe { self.method(SLOT_ADD_REF) };
        unsafe { add_ref(self.as_raw()) }
    }

    /// Give back this proxy's reference.
    ///
    /// Consuming `self` makes a second release or a use-after-release
    /// unrepresentable; dropping the proxy takes the same single-decrement
    /// path.
    pub fn release(self) {
        drop(self);
    }
}

impl Clone for ComPtr {
    fn clone(&self) -> Self {
        let cloned = unsafe { Self::from_raw(self.as_raw(), self.slots.len()) };
        cloned.add_ref();
        cloned
    }
}

impl Drop for ComPtr {
    fn drop(&mut self) {
        let release: ReleaseFn = unsafe { self.method(SLOT_RELEASE) };
        unsafe {
            release(self.as_raw());
        }
    }
}

impl std::fmt::Debug for ComPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComPtr")
            .field("this", &self.this.as_ptr())
            .field("vtable_size", &self.slots.len())
            .finish()
    }
}
