//! COM-style cross-language object model.
//!
//! Lets local code call into a separately-compiled component's objects, and
//! lets that component call back into local objects, through one binary
//! contract: identified interfaces, function-pointer dispatch tables, and
//! intrusive reference counting. All calls are synchronous, same-process
//! and pointer-based.
//!
//! ## Import direction
//!
//! A foreign pointer becomes a [`ComPtr`] proxy: the dispatch-table base is
//! read from the object's first machine word and slots are resolved lazily.
//! Typed bindings over `ComPtr` are declared with [`com_interface!`] (or
//! emitted by the `crossbind-idlc` renderer from compiled layouts).
//!
//! ```ignore
//! com_interface! {
//!     interface IHello : "f3a1c2d4-0000-4000-8000-0102030405ff", size 4 {
//!         [3] fn ping(&self) -> i32;
//!     }
//! }
//!
//! let hello: IHello = ClassFactory::create_instance(CLSID_HELLO)?;
//! let n = unsafe { hello.ping() };
//! ```
//!
//! ## Export direction
//!
//! A local object becomes foreign-callable through [`ComObject`]: each
//! implemented interface gets a pinned wrapper block pointing at a
//! synthesized dispatch table, and a process-wide registry routes incoming
//! calls back to the owning object. The IUnknown triad is served by the
//! runtime; per-method trampolines come from generated bindings.
//!
//! ## Lifetime discipline
//!
//! Every live `ComPtr` owns exactly one foreign reference, given back
//! exactly once on release or drop. Every exported object has one shared
//! atomic count across all of its wrappers: 0→1 pins it, →0 tears every
//! wrapper down and lets it be reclaimed. Count underflow and dispatch on a
//! dead address fail fast; they are defects, not recoverable conditions.

pub mod com;
pub mod decl;
pub mod export;
pub mod factory;
pub mod import;

pub use com::{
    ComInterface, ComRefCount, GUID, GuidParseError, HRESULT, RawComPtr, WideString, failed,
    succeeded,
};
pub use com::{
    AddRefFn, CLASS_E_CLASSNOTAVAILABLE, E_FAIL, E_INVALIDARG, E_NOINTERFACE, E_NOTIMPL,
    E_OUTOFMEMORY, E_POINTER, IID_IUNKNOWN, QueryInterfaceFn, RawSlot, ReleaseFn, S_FALSE, S_OK,
    SLOT_ADD_REF, SLOT_QUERY_INTERFACE, SLOT_RELEASE,
};
pub use export::{ComClass, ComObject, ExportedObject, TablePtr, with_exported};
pub use export::{unknown_add_ref, unknown_query_interface, unknown_release};
pub use factory::{
    ClassFactory, ExportedClassFactory, FactoryError, GetClassObjectFn, IClassFactory,
    IID_ICLASSFACTORY, register_class, register_server,
};
pub use import::ComPtr;

// Re-export paste for use by the bindings macro
#[doc(hidden)]
pub use paste::paste;
