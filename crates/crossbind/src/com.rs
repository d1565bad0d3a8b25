//! Core COM ABI types shared by the import and export sides.
//!
//! ## Key Types
//! - [`GUID`] - 128-bit globally unique identifier for interfaces and classes
//! - [`HRESULT`] - cross-boundary status code (0 = success)
//! - [`ComInterface`] - trait implemented by typed interface bindings
//! - [`ComRefCount`] - atomic reference counter for exported objects
//!
//! ## The ABI contract
//!
//! Every foreign-visible object's first machine word is a pointer to its
//! dispatch table: an array of function-pointer-sized slots. Slots 0-2 are
//! always the `IUnknown` triad:
//!
//! ```text
//! slot 0: query_interface(this, *const GUID, *mut RawComPtr) -> HRESULT
//! slot 1: add_ref(this) -> HRESULT
//! slot 2: release(this) -> HRESULT
//! ```
//!
//! Interface-specific methods follow at the slot indices computed by the
//! idl compiler.

use std::ffi::c_void;
use std::sync::atomic::{AtomicU32, Ordering};

// =============================================================================
// GUID - Globally Unique Identifier
// =============================================================================

/// 128-bit globally unique identifier (GUID/UUID/IID/CLSID).
///
/// Used for interface and class identification.
/// Format: `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}`
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GUID {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl GUID {
    /// Create a new GUID from components
    #[must_use]
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// The nil/zero GUID
    pub const ZERO: GUID = GUID::new(0, 0, 0, [0; 8]);

    /// Parse a GUID from its canonical textual form,
    /// `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`, with optional surrounding
    /// braces.
    ///
    /// Panics on malformed input. Usable in const context, so interface
    /// bindings can declare `const IID: GUID = GUID::parse("...")` and a
    /// bad identifier becomes a compile error.
    #[must_use]
    pub const fn parse(s: &str) -> Self {
        const fn hex(b: u8) -> u64 {
            match b {
                b'0'..=b'9' => (b - b'0') as u64,
                b'a'..=b'f' => (b - b'a' + 10) as u64,
                b'A'..=b'F' => (b - b'A' + 10) as u64,
                _ => panic!("invalid hex digit in GUID"),
            }
        }

        let bytes = s.as_bytes();
        let (start, len) = if !bytes.is_empty() && bytes[0] == b'{' {
            (1, bytes.len().saturating_sub(2))
        } else {
            (0, bytes.len())
        };
        if len != 36 {
            panic!("GUID must be 36 characters: xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx");
        }

        // Hyphens at fixed positions 8, 13, 18, 23 (relative to start).
        let mut groups = [0u64; 5];
        let spans: [(usize, usize); 5] = [(0, 8), (9, 13), (14, 18), (19, 23), (24, 36)];
        let mut g = 0;
        while g < 5 {
            let (mut i, end) = spans[g];
            if g > 0 && bytes[start + i - 1] != b'-' {
                panic!("GUID groups must be separated by '-'");
            }
            let mut acc = 0u64;
            while i < end {
                acc = (acc << 4) | hex(bytes[start + i]);
                i += 1;
            }
            groups[g] = acc;
            g += 1;
        }

        let tail = ((groups[3] as u128) << 48) | groups[4] as u128;
        let mut data4 = [0u8; 8];
        let mut i = 0;
        while i < 8 {
            data4[i] = (tail >> ((7 - i) * 8)) as u8;
            i += 1;
        }

        GUID::new(groups[0] as u32, groups[1] as u16, groups[2] as u16, data4)
    }
}

impl std::str::FromStr for GUID {
    type Err = GuidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('{').trim_end_matches('}');
        if trimmed.len() != 36 {
            return Err(GuidParseError(s.to_string()));
        }
        for (i, c) in trimmed.char_indices() {
            let ok = match i {
                8 | 13 | 18 | 23 => c == '-',
                _ => c.is_ascii_hexdigit(),
            };
            if !ok {
                return Err(GuidParseError(s.to_string()));
            }
        }
        Ok(GUID::parse(trimmed))
    }
}

/// Error returned when a textual GUID is malformed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("malformed GUID: {0:?}")]
pub struct GuidParseError(pub String);

impl std::fmt::Debug for GUID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
    }
}

impl std::fmt::Display for GUID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
    }
}

// =============================================================================
// HRESULT - cross-boundary status codes
// =============================================================================

/// Cross-boundary status code. 0 (S_OK) indicates success, negative values
/// indicate errors.
pub type HRESULT = i32;

/// Success
pub const S_OK: HRESULT = 0;
/// Success, but returned false
pub const S_FALSE: HRESULT = 1;
/// No such interface supported
pub const E_NOINTERFACE: HRESULT = 0x8000_4002_u32 as i32;
/// Invalid pointer
pub const E_POINTER: HRESULT = 0x8000_4003_u32 as i32;
/// Unspecified failure
pub const E_FAIL: HRESULT = 0x8000_4005_u32 as i32;
/// Out of memory
pub const E_OUTOFMEMORY: HRESULT = 0x8007_000E_u32 as i32;
/// Invalid argument
pub const E_INVALIDARG: HRESULT = 0x8007_0057_u32 as i32;
/// Not implemented
pub const E_NOTIMPL: HRESULT = 0x8000_4001_u32 as i32;
/// Requested class is not registered with any server
pub const CLASS_E_CLASSNOTAVAILABLE: HRESULT = 0x8004_0111_u32 as i32;

/// Check if an HRESULT indicates success (non-negative)
#[inline]
#[must_use]
pub const fn succeeded(hr: HRESULT) -> bool {
    hr >= 0
}

/// Check if an HRESULT indicates failure (negative)
#[inline]
#[must_use]
pub const fn failed(hr: HRESULT) -> bool {
    hr < 0
}

// =============================================================================
// Raw pointers and the IUnknown slot triad
// =============================================================================

/// An opaque pointer to a foreign-visible object. The first machine word at
/// this address is the dispatch-table base.
pub type RawComPtr = *const c_void;

/// A single dispatch-table entry, type-erased.
pub type RawSlot = *const c_void;

/// Slot 0: query for another interface by identifier.
pub type QueryInterfaceFn =
    unsafe extern "system" fn(this: RawComPtr, iid: *const GUID, out: *mut RawComPtr) -> HRESULT;

/// Slot 1: increment the reference count. Returns the new count.
pub type AddRefFn = unsafe extern "system" fn(this: RawComPtr) -> HRESULT;

/// Slot 2: decrement the reference count. Returns the new count.
pub type ReleaseFn = unsafe extern "system" fn(this: RawComPtr) -> HRESULT;

/// Slot index of `query_interface` in every dispatch table.
pub const SLOT_QUERY_INTERFACE: usize = 0;
/// Slot index of `add_ref` in every dispatch table.
pub const SLOT_ADD_REF: usize = 1;
/// Slot index of `release` in every dispatch table.
pub const SLOT_RELEASE: usize = 2;

/// IUnknown interface ID
pub const IID_IUNKNOWN: GUID = GUID::new(
    0x00000000,
    0x0000,
    0x0000,
    [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
);

// =============================================================================
// ComInterface - typed interface bindings
// =============================================================================

/// Trait implemented by typed interface bindings (generated by the idl
/// compiler's renderer, or declared with [`com_interface!`](crate::com_interface)).
///
/// A binding is a thin newtype over [`ComPtr`](crate::ComPtr) carrying the
/// interface identity and its full dispatch-table size.
pub trait ComInterface: Sized {
    /// The interface ID (IID) for this interface.
    const IID: GUID;

    /// Total dispatch-table size, inherited slots included.
    const VTABLE_SIZE: usize;

    /// Wrap an owned proxy as this interface.
    fn from_com(com: crate::ComPtr) -> Self;

    /// Borrow the underlying proxy.
    fn com(&self) -> &crate::ComPtr;
}

// =============================================================================
// ComRefCount - shared counter for exported objects
// =============================================================================

/// Atomic reference counter for an exported local object.
///
/// One counter per object, shared across all of that object's per-interface
/// wrappers. Starts at 0; the 0->1 transition pins the object and the
/// transition back to 0 tears it down. Underflow is a fatal usage error.
#[repr(transparent)]
pub struct ComRefCount(AtomicU32);

impl ComRefCount {
    /// Create a new reference counter with count = 0
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Increment the reference count. Returns the new count.
    #[inline]
    pub fn add_ref(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrement the reference count. Returns the new count.
    ///
    /// The thread that observes the transition to 0 owns teardown.
    ///
    /// # Panics
    /// Panics if the count is already 0; a corrupted count cannot be
    /// recovered from, so underflow fails fast.
    #[inline]
    pub fn release(&self) -> u32 {
        let previous = self.0.fetch_sub(1, Ordering::Release);
        if previous == 0 {
            panic!("reference count underflow: release called on a dead object");
        }
        if previous == 1 {
            // Synchronize with every prior release before teardown runs.
            std::sync::atomic::fence(Ordering::Acquire);
        }
        previous - 1
    }

    /// Get the current reference count.
    #[inline]
    #[must_use]
    pub fn count(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ComRefCount {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// WideString - the runtime side of the "wide string" marshal hint
// =============================================================================

/// Owned, nul-terminated UTF-16 buffer for string arguments crossing the
/// boundary (`InBSTR` / `OutBSTR` in the idl).
pub struct WideString {
    buf: Vec<u16>,
}

impl WideString {
    /// Encode a Rust string as nul-terminated UTF-16.
    #[must_use]
    pub fn new(s: &str) -> Self {
        let mut buf: Vec<u16> = s.encode_utf16().collect();
        buf.push(0);
        Self { buf }
    }

    /// Pointer to the first code unit, valid while `self` is alive.
    #[must_use]
    pub fn as_ptr(&self) -> *const u16 {
        self.buf.as_ptr()
    }

    /// Number of code units, excluding the terminator.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len() - 1
    }

    /// Whether the string is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode a nul-terminated UTF-16 buffer received from the foreign side.
    ///
    /// # Safety
    /// `ptr` must point to a valid, nul-terminated UTF-16 buffer.
    #[must_use]
    pub unsafe fn decode_raw(ptr: *const u16) -> String {
        if ptr.is_null() {
            return String::new();
        }
        let mut len = 0;
        // SAFETY: caller guarantees the buffer is nul-terminated.
        unsafe {
            while *ptr.add(len) != 0 {
                len += 1;
            }
            let units = std::slice::from_raw_parts(ptr, len);
            String::from_utf16_lossy(units)
        }
    }
}

impl From<&str> for WideString {
    fn from(s: &str) -> Self {
        WideString::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_parse_round_trips_display() {
        let iid = GUID::parse("12345678-1234-5678-9abc-def012345678");
        assert_eq!(iid.data1, 0x12345678);
        assert_eq!(iid.data2, 0x1234);
        assert_eq!(iid.data3, 0x5678);
        assert_eq!(iid.data4, [0x9a, 0xbc, 0xde, 0xf0, 0x12, 0x34, 0x56, 0x78]);
        assert_eq!(iid.to_string(), "12345678-1234-5678-9abc-def012345678");
    }

    #[test]
    fn guid_parse_accepts_braces() {
        let iid: GUID = "{00000000-0000-0000-C000-000000000046}".parse().unwrap();
        assert_eq!(iid, IID_IUNKNOWN);
    }

    #[test]
    fn guid_from_str_rejects_garbage() {
        assert!("not-a-guid".parse::<GUID>().is_err());
        assert!("12345678-1234-5678-9abc-def01234567".parse::<GUID>().is_err());
        assert!("12345678x1234-5678-9abc-def012345678".parse::<GUID>().is_err());
    }

    #[test]
    fn refcount_starts_at_zero() {
        let rc = ComRefCount::new();
        assert_eq!(rc.count(), 0);
        assert_eq!(rc.add_ref(), 1);
        assert_eq!(rc.add_ref(), 2);
        assert_eq!(rc.release(), 1);
        assert_eq!(rc.release(), 0);
    }

    #[test]
    #[should_panic(expected = "reference count underflow")]
    fn refcount_underflow_panics() {
        let rc = ComRefCount::new();
        rc.release();
    }

    #[test]
    fn wide_string_round_trip() {
        let ws = WideString::new("hello, 世界");
        assert_eq!(unsafe { WideString::decode_raw(ws.as_ptr()) }, "hello, 世界");
        assert!(!ws.is_empty());
    }
}
