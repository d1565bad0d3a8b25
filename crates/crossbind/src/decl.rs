//! Declarative macro for typed interface bindings.
//!
//! [`com_interface!`](crate::com_interface) declares the binding the idl
//! compiler's renderer would emit for an interface: a newtype over
//! [`ComPtr`](crate::ComPtr), its [`ComInterface`](crate::ComInterface)
//! identity, and one method per dispatch slot. Slot indices and the table
//! size come straight from the compiled layout.
//!
//! # Example
//! ```ignore
//! com_interface! {
//!     /// A trivial interface with one method past the IUnknown triad.
//!     interface IHello : "f3a1c2d4-0000-4000-8000-0102030405ff", size 4 {
//!         [3] fn ping(&self) -> i32;
//!     }
//! }
//! ```
//!
//! Methods are `unsafe`: the declared signatures must match the foreign
//! dispatch table, which the compiler cannot check.

/// Declare a typed interface binding over [`ComPtr`](crate::ComPtr).
///
/// Also emits an `IID_<NAME>` constant, matching the naming of the
/// well-known ids in [`com`](crate::com).
#[macro_export]
macro_rules! com_interface {
    (
        $(#[$meta:meta])*
        interface $name:ident : $iid:literal, size $size:literal {
            $(
                $(#[$method_meta:meta])*
                [$slot:expr] fn $method:ident (&self $(, $arg:ident : $argty:ty)* $(,)?) $(-> $ret:ty)?;
            )*
        }
    ) => {
        $crate::paste! {
            #[doc = concat!("Interface ID for [`", stringify!($name), "`].")]
            pub const [<IID_ $name:upper>]: $crate::GUID = $crate::GUID::parse($iid);
        }

        $(#[$meta])*
        #[repr(transparent)]
        pub struct $name {
            com: $crate::ComPtr,
        }

        impl $crate::ComInterface for $name {
            const IID: $crate::GUID = $crate::GUID::parse($iid);
            const VTABLE_SIZE: usize = $size;

            fn from_com(com: $crate::ComPtr) -> Self {
                Self { com }
            }

            fn com(&self) -> &$crate::ComPtr {
                &self.com
            }
        }

        impl $name {
            /// Adopt a charged foreign pointer as this interface.
            ///
            /// # Safety
            /// `ptr` must follow the ABI contract and actually implement
            /// this interface.
            #[must_use]
            pub unsafe fn from_raw(ptr: $crate::RawComPtr) -> Self {
                <Self as $crate::ComInterface>::from_com(unsafe {
                    $crate::ComPtr::from_raw(ptr, <Self as $crate::ComInterface>::VTABLE_SIZE)
                })
            }

            /// The raw foreign pointer; no ownership is transferred.
            #[must_use]
            pub fn as_raw(&self) -> $crate::RawComPtr {
                self.com.as_raw()
            }

            /// Query the underlying object for another interface.
            /// `None` means the interface is absent, a normal outcome.
            #[must_use]
            pub fn query_interface<T: $crate::ComInterface>(&self) -> Option<T> {
                self.com.query_interface::<T>()
            }

            /// Give back this binding's reference. Dropping does the same.
            pub fn release(self) {}

            $(
                $(#[$method_meta])*
                pub unsafe fn $method(&self $(, $arg: $argty)*) $(-> $ret)? {
                    let method: unsafe extern "system" fn($crate::RawComPtr $(, $argty)*) $(-> $ret)? =
                        unsafe { self.com.method($slot) };
                    unsafe { method(self.com.as_raw() $(, $arg)*) }
                }
            )*
        }

        impl ::std::clone::Clone for $name {
            fn clone(&self) -> Self {
                Self {
                    com: self.com.clone(),
                }
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.com).finish()
            }
        }
    };
}
