//! Export side: foreign-callable wrappers for local objects.
//!
//! A local object is exported by placing it inside a [`ComObject`], which
//! carries the single shared reference count and a cache of per-interface
//! [`Wrapper`] blocks. Each wrapper is a pinned, one-word block whose first
//! machine word points at a synthesized dispatch table, so the published
//! address satisfies the same ABI contract as a native object.
//!
//! The process-wide [`registry`](self) maps published wrapper addresses back
//! to their owning object. Trampoline entry points recover the object
//! through it, dispatch to the local method, and translate the result into
//! the status-code-plus-out-parameter convention.
//!
//! Table entries after the IUnknown triad are supplied by the class through
//! [`ComClass::dispatch_table`] - the registration-table counterpart of the
//! generated bindings, populated at compile time rather than discovered at
//! run time.

use std::any::Any;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::com::{ComRefCount, E_NOINTERFACE, GUID, HRESULT, RawComPtr, S_OK};

// =============================================================================
// Dispatch tables
// =============================================================================

/// Pointer to slot 0 of a synthesized dispatch table with static lifetime.
///
/// Wrapped so table pointers can live in statics and cross threads; the
/// pointee is an immutable, `'static` vtable struct.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct TablePtr(pub *const c_void);

unsafe impl Send for TablePtr {}
unsafe impl Sync for TablePtr {}

/// A class that can be exported to the foreign side.
///
/// Implementations come from generated bindings (or are hand-written in the
/// same shape): one `#[repr(C)]` vtable struct per exposed interface, filled
/// with the runtime's IUnknown triad at slots 0-2 and the class's trampoline
/// functions after, plus a `dispatch_table` that maps each implemented
/// interface id to its table.
pub trait ComClass: Send + Sync + Sized + 'static {
    /// Slot-0 address of the dispatch table for `iid`, or `None` if this
    /// class does not expose that interface.
    fn dispatch_table(iid: &GUID) -> Option<TablePtr>;
}

// =============================================================================
// Wrapper - the published, pinned block
// =============================================================================

/// The block whose address is handed to foreign code. Per the ABI its first
/// (and only) word is the dispatch-table base. Heap-allocated so the address
/// is stable for the object's whole exported lifetime.
#[repr(C)]
struct Wrapper {
    vtable: *const c_void,
}

/// Owning cell for a `Wrapper` allocation, kept in the per-object cache.
struct WrapperCell(NonNull<Wrapper>);

unsafe impl Send for WrapperCell {}
unsafe impl Sync for WrapperCell {}

impl WrapperCell {
    fn new(table: TablePtr) -> Self {
        let boxed = Box::new(Wrapper { vtable: table.0 });
        // NonNull::from(Box::leak) keeps the allocation; freed in `free`.
        Self(NonNull::from(Box::leak(boxed)))
    }

    fn addr(&self) -> RawComPtr {
        self.0.as_ptr() as RawComPtr
    }

    /// # Safety
    /// No foreign caller may use the published address afterwards.
    unsafe fn free(&self) {
        drop(unsafe { Box::from_raw(self.0.as_ptr()) });
    }
}

// =============================================================================
// Process-wide address -> object registry
// =============================================================================

/// Published wrapper address -> owning exported object.
///
/// Entries hold a strong reference, which is what pins an object in place
/// while its count is nonzero; teardown removes them and lets the object be
/// reclaimed.
static REGISTRY: Lazy<DashMap<usize, Arc<dyn ExportedObject>>> = Lazy::new(DashMap::new);

/// Type-erased view of a [`ComObject`], as stored in the registry.
pub trait ExportedObject: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn export_add_ref(&self) -> u32;
    fn export_release(&self) -> u32;
    fn handle_for(&self, iid: &GUID) -> Option<RawComPtr>;
}

fn lookup(this: RawComPtr) -> Arc<dyn ExportedObject> {
    // Clone out of the map so no shard lock is held while dispatching;
    // release may mutate the registry re-entrantly otherwise.
    let Some(entry) = REGISTRY.get(&(this as usize)) else {
        panic!("incoming call on an address that is not an exported object");
    };
    Arc::clone(entry.value())
}

/// Recover the concrete exported object behind a published address and run
/// `f` against it. Meant for trampoline bodies; the object is kept alive for
/// the duration of the call.
///
/// # Panics
/// Panics if the address is unknown or owned by a different class - both are
/// dispatch-table corruption, which cannot be recovered from.
pub fn with_exported<T: ComClass, R>(this: RawComPtr, f: impl FnOnce(&ComObject<T>) -> R) -> R {
    let object = lookup(this);
    let Some(concrete) = object.as_any().downcast_ref::<ComObject<T>>() else {
        panic!("exported object does not have the expected class");
    };
    f(concrete)
}

// =============================================================================
// ComObject - the exported shell around a local object
// =============================================================================

/// Export-side shell carrying a local `T`, its shared reference count and
/// its per-interface wrapper cache.
///
/// Always lives in an `Arc` (see [`ComObject::new`]) so the allocation never
/// moves while foreign code can reach it.
pub struct ComObject<T: ComClass> {
    ref_count: ComRefCount,
    wrappers: DashMap<GUID, WrapperCell>,
    weak: Weak<ComObject<T>>,
    value: T,
}

impl<T: ComClass> ComObject<T> {
    /// Export `value`. The reference count starts at 0; nothing is published
    /// until the first [`handle`](Self::handle) call.
    pub fn new(value: T) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            ref_count: ComRefCount::new(),
            wrappers: DashMap::new(),
            weak: weak.clone(),
            value,
        })
    }

    /// The wrapped local object.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Current shared reference count.
    pub fn ref_count(&self) -> u32 {
        self.ref_count.count()
    }

    /// Publish (or reuse) the wrapper for `iid` and hand out one charged
    /// reference to it, per the ABI convention for returned interface
    /// pointers. Returns `None` if the class does not expose `iid`.
    pub fn handle(&self, iid: &GUID) -> Option<RawComPtr> {
        let table = T::dispatch_table(iid)?;
        let cell = self
            .wrappers
            .entry(*iid)
            .or_insert_with(|| WrapperCell::new(table));
        let addr = cell.addr();

        // The entry guard stays held across the charge and the registry
        // insert: a concurrent teardown removing this key blocks until the
        // resurrected count is visible and then leaves the wrapper alone.
        self.ref_count.add_ref();
        let strong: Arc<dyn ExportedObject> = self
            .weak
            .upgrade()
            .unwrap_or_else(|| unreachable!("handle() called on a dropped ComObject"));
        REGISTRY.insert(addr as usize, strong);
        drop(cell);
        Some(addr)
    }

    fn teardown(&self) {
        // Count reached 0: unpublish every wrapper and free its block. The
        // registry entries drop their strong references, after which the
        // object can be reclaimed.
        let interfaces: Vec<GUID> = self.wrappers.iter().map(|entry| *entry.key()).collect();
        for iid in interfaces {
            // Re-checked under the entry lock: a racing handle() may have
            // resurrected the count after the decrement that got us here,
            // and its wrapper must stay published. The registry entry goes
            // before the block is freed, so a recycled allocation address
            // can never alias a stale entry.
            if let Some((_, cell)) = self
                .wrappers
                .remove_if(&iid, |_, _| self.ref_count.count() == 0)
            {
                REGISTRY.remove(&(cell.addr() as usize));
                unsafe { cell.free() };
            }
        }
    }
}

impl<T: ComClass> ExportedObject for ComObject<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn export_add_ref(&self) -> u32 {
        self.ref_count.add_ref()
    }

    fn export_release(&self) -> u32 {
        let count = self.ref_count.release();
        if count == 0 {
            self.teardown();
        }
        count
    }

    fn handle_for(&self, iid: &GUID) -> Option<RawComPtr> {
        self.handle(iid)
    }
}

impl<T: ComClass> Drop for ComObject<T> {
    fn drop(&mut self) {
        // Normally empty by now; non-empty only if the process drops the
        // last Arc with the count already torn down mid-panic.
        for entry in self.wrappers.iter() {
            REGISTRY.remove(&(entry.value().addr() as usize));
            unsafe { entry.value().free() };
        }
        self.wrappers.clear();
    }
}

// =============================================================================
// IUnknown trampolines - slots 0-2 of every synthesized table
// =============================================================================

/// Slot 0 trampoline: serve `query_interface` for an exported object.
///
/// A hit hands out a charged wrapper address; a miss writes null and reports
/// `E_NOINTERFACE` - absence is an answer, not a fault.
///
/// # Safety
/// `this` must be a published wrapper address; `iid` and `out` must be valid
/// for reads/writes respectively.
pub unsafe extern "system" fn unknown_query_interface(
    this: RawComPtr,
    iid: *const GUID,
    out: *mut RawComPtr,
) -> HRESULT {
    if iid.is_null() || out.is_null() {
        return crate::com::E_POINTER;
    }
    let object = lookup(this);
    match object.handle_for(unsafe { &*iid }) {
        Some(handle) => {
            unsafe { *out = handle };
            S_OK
        }
        None => {
            unsafe { *out = std::ptr::null() };
            E_NOINTERFACE
        }
    }
}

/// Slot 1 trampoline: increment the owning object's shared count.
///
/// # Safety
/// `this` must be a published wrapper address.
pub unsafe extern "system" fn unknown_add_ref(this: RawComPtr) -> HRESULT {
    lookup(this).export_add_ref() as HRESULT
}

/// Slot 2 trampoline: decrement the owning object's shared count, tearing
/// the object down on the transition to 0.
///
/// # Safety
/// `this` must be a published wrapper address.
pub unsafe extern "system" fn unknown_release(this: RawComPtr) -> HRESULT {
    lookup(this).export_release() as HRESULT
}
