//! Class factory bootstrap.
//!
//! The first foreign object is always obtained through a class factory: a
//! single bootstrap entry point resolves a class id to its factory object,
//! and the factory's `create_instance` slot produces the actual instance.
//!
//! Servers are registered explicitly at startup in a class-id ->
//! entry-point table, instead of being discovered reflectively. A pure-Rust
//! server uses [`register_class`], which wires the table to an in-process
//! [`ExportedClassFactory`]; a native server registers its own exported
//! `DllGetClassObject`-shaped entry point with [`register_server`].

use std::any::TypeId;
use std::ffi::c_void;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::com::{
    AddRefFn, ComInterface, E_NOINTERFACE, GUID, HRESULT, IID_IUNKNOWN, QueryInterfaceFn,
    RawComPtr, ReleaseFn, S_OK,
};
use crate::export::{
    ComClass, ComObject, ExportedObject, TablePtr, unknown_add_ref, unknown_query_interface,
    unknown_release, with_exported,
};
use crate::import::ComPtr;

/// Shape of the single native bootstrap entry point:
/// `(class id, interface id, out object) -> status`.
pub type GetClassObjectFn =
    unsafe extern "system" fn(clsid: *const GUID, iid: *const GUID, out: *mut RawComPtr) -> HRESULT;

/// Class id -> bootstrap entry point, populated at startup.
static SERVERS: Lazy<DashMap<GUID, GetClassObjectFn>> = Lazy::new(DashMap::new);

/// Register a bootstrap entry point for `clsid`.
pub fn register_server(clsid: GUID, entry: GetClassObjectFn) {
    SERVERS.insert(clsid, entry);
}

/// Errors from the bootstrap path. Everything past these two is an ordinary
/// status code the caller interprets.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    /// The bootstrap call itself failed: no server knows this class.
    #[error("class {clsid} is not registered with any server (status {status})")]
    ClassNotRegistered { clsid: GUID, status: HRESULT },

    /// The factory exists but rejected the requested interface.
    #[error("class {clsid} does not support interface {iid} (status {status})")]
    InterfaceNotSupported {
        clsid: GUID,
        iid: GUID,
        status: HRESULT,
    },
}

// =============================================================================
// IClassFactory binding (import side)
// =============================================================================

crate::com_interface! {
    /// Typed binding for the well-known factory interface.
    interface IClassFactory : "00000001-0000-0000-C000-000000000046", size 5 {
        /// Create an instance of the factory's class, requesting `iid`.
        [3] fn create_instance(&self, outer: RawComPtr, iid: *const GUID, out: *mut RawComPtr) -> HRESULT;
        /// Keep the serving component loaded while `lock != 0`.
        [4] fn lock_server(&self, lock: i32) -> HRESULT;
    }
}

// =============================================================================
// ClassFactory - the import-side bootstrap object
// =============================================================================

/// Import-side handle to a class's factory object.
pub struct ClassFactory {
    clsid: GUID,
    proxy: IClassFactory,
}

impl ClassFactory {
    /// Resolve the factory object for `clsid` through the registered
    /// bootstrap entry point.
    pub fn obtain(clsid: GUID) -> Result<Self, FactoryError> {
        let Some(entry) = SERVERS.get(&clsid).map(|entry| *entry.value()) else {
            return Err(FactoryError::ClassNotRegistered {
                clsid,
                status: crate::com::CLASS_E_CLASSNOTAVAILABLE,
            });
        };

        let mut out: RawComPtr = std::ptr::null();
        let status = unsafe { entry(&clsid, &IID_ICLASSFACTORY, &mut out) };
        if status != S_OK || out.is_null() {
            return Err(FactoryError::ClassNotRegistered { clsid, status });
        }

        Ok(Self {
            clsid,
            proxy: unsafe { IClassFactory::from_raw(out) },
        })
    }

    /// The underlying typed factory binding, for direct slot access.
    pub fn proxy(&self) -> &IClassFactory {
        &self.proxy
    }

    /// Create an instance of the class, typed as `T`.
    pub fn create<T: ComInterface>(&self) -> Result<T, FactoryError> {
        let mut out: RawComPtr = std::ptr::null();
        let status = unsafe {
            self.proxy
                .create_instance(std::ptr::null(), &T::IID, &mut out)
        };
        if status != S_OK || out.is_null() {
            return Err(FactoryError::InterfaceNotSupported {
                clsid: self.clsid,
                iid: T::IID,
                status,
            });
        }
        Ok(T::from_com(unsafe { ComPtr::from_raw(out, T::VTABLE_SIZE) }))
    }

    /// One-shot convenience: resolve the factory for `clsid` and create an
    /// instance typed as `T`.
    pub fn create_instance<T: ComInterface>(clsid: GUID) -> Result<T, FactoryError> {
        Self::obtain(clsid)?.create()
    }
}

// =============================================================================
// ExportedClassFactory - serving the bootstrap contract in-process
// =============================================================================

/// A local factory object serving `IClassFactory` for class `T`.
///
/// Lets a pure-Rust component satisfy the bootstrap contract: foreign (or
/// local) importers resolve it through [`ClassFactory::obtain`] and call
/// `create_instance` like against a native server.
pub struct ExportedClassFactory<T: ComClass> {
    make: fn() -> T,
}

impl<T: ComClass> ExportedClassFactory<T> {
    /// Build a factory around a constructor function.
    pub fn new(make: fn() -> T) -> Self {
        Self { make }
    }

    fn create_object(&self, iid: &GUID) -> Option<RawComPtr> {
        // A rejected iid drops the fresh object with its count still 0.
        ComObject::new((self.make)()).handle(iid)
    }
}

#[repr(C)]
struct ClassFactoryVtbl {
    query_interface: QueryInterfaceFn,
    add_ref: AddRefFn,
    release: ReleaseFn,
    create_instance: unsafe extern "system" fn(
        this: RawComPtr,
        outer: RawComPtr,
        iid: *const GUID,
        out: *mut RawComPtr,
    ) -> HRESULT,
    lock_server: unsafe extern "system" fn(this: RawComPtr, lock: i32) -> HRESULT,
}

unsafe extern "system" fn create_instance_tramp<T: ComClass>(
    this: RawComPtr,
    _outer: RawComPtr,
    iid: *const GUID,
    out: *mut RawComPtr,
) -> HRESULT {
    if iid.is_null() || out.is_null() {
        return crate::com::E_POINTER;
    }
    with_exported::<ExportedClassFactory<T>, HRESULT>(this, |factory| {
        match factory.value().create_object(unsafe { &*iid }) {
            Some(handle) => {
                unsafe { *out = handle };
                S_OK
            }
            None => {
                unsafe { *out = std::ptr::null() };
                E_NOINTERFACE
            }
        }
    })
}

unsafe extern "system" fn lock_server_tramp(_this: RawComPtr, _lock: i32) -> HRESULT {
    S_OK
}

// One leaked vtable per monomorphization; generics cannot carry their own
// statics, so the table is memoized by TypeId.
static FACTORY_TABLES: Lazy<DashMap<TypeId, TablePtr>> = Lazy::new(DashMap::new);

impl<T: ComClass> ComClass for ExportedClassFactory<T> {
    fn dispatch_table(iid: &GUID) -> Option<TablePtr> {
        if *iid != IID_ICLASSFACTORY && *iid != IID_IUNKNOWN {
            return None;
        }
        let table = *FACTORY_TABLES
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                let vtbl = Box::leak(Box::new(ClassFactoryVtbl {
                    query_interface: unknown_query_interface,
                    add_ref: unknown_add_ref,
                    release: unknown_release,
                    create_instance: create_instance_tramp::<T>,
                    lock_server: lock_server_tramp,
                }));
                TablePtr(vtbl as *const ClassFactoryVtbl as *const c_void)
            });
        Some(table)
    }
}

// One factory object per served class, created on first bootstrap call.
static FACTORY_OBJECTS: Lazy<DashMap<TypeId, Arc<dyn ExportedObject>>> = Lazy::new(DashMap::new);

unsafe extern "system" fn class_object_entry<T: ComClass + Default>(
    _clsid: *const GUID,
    iid: *const GUID,
    out: *mut RawComPtr,
) -> HRESULT {
    if iid.is_null() || out.is_null() {
        return crate::com::E_POINTER;
    }
    let factory = {
        let entry = FACTORY_OBJECTS.entry(TypeId::of::<T>()).or_insert_with(|| {
            let object: Arc<dyn ExportedObject> =
                ComObject::new(ExportedClassFactory::<T>::new(T::default));
            object
        });
        Arc::clone(entry.value())
    };
    match factory.handle_for(unsafe { &*iid }) {
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

/// Serve `clsid` in-process: registers a bootstrap entry point backed by an
/// [`ExportedClassFactory`] constructing `T::default()`.
pub fn register_class<T: ComClass + Default>(clsid: GUID) {
    register_server(clsid, class_object_entry::<T>);
}
