//! Type mapper: from idl type tokens to native representations and
//! marshaling decisions.
//!
//! `resolve` is a pure function over the token and its direction
//! attributes; the compiler calls it once per argument and once per return
//! type, and generated call sites rely on its output alone.

use crate::error::IdlError;
use crate::idl::{AUTOMATION_SUFFIX, Directions};

/// Native representation of a resolved type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// Pointer-sized unsigned integer
    USize,
    /// Cross-boundary status code
    Status,
    Void,
    /// `void*`: an opaque handle
    Handle,
    /// Nul-terminated UTF-16 buffer
    WideString,
    /// Opaque pointer to a foreign-visible object
    InterfacePtr,
}

impl NativeType {
    /// Bit width of the native representation. Pointer-shaped types report
    /// the target pointer width; `Void` reports 0.
    #[must_use]
    pub fn bit_width(self) -> u32 {
        match self {
            NativeType::I8 | NativeType::U8 => 8,
            NativeType::I16 | NativeType::U16 => 16,
            NativeType::I32 | NativeType::U32 | NativeType::F32 | NativeType::Status => 32,
            NativeType::I64 | NativeType::U64 | NativeType::F64 => 64,
            NativeType::USize
            | NativeType::Handle
            | NativeType::WideString
            | NativeType::InterfacePtr => usize::BITS,
            NativeType::Void => 0,
        }
    }
}

/// Marshaling strategy beyond plain bit copying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarshalHint {
    #[default]
    None,
    /// Carried as a nul-terminated UTF-16 string
    WideString,
}

/// A fully resolved parameter or return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType {
    /// The raw token as written in the idl
    pub token: String,
    /// Native (ABI-level) representation
    pub native: NativeType,
    /// User-facing type name: the primitive token itself, or the interface
    /// display name with its automation suffix stripped
    pub user_facing: String,
    /// Whether the value is an interface pointer, wrapped as a typed proxy
    /// at the user-facing level
    pub is_interface_pointer: bool,
    pub marshal: MarshalHint,
    pub is_out: bool,
    pub is_by_ref: bool,
    pub is_array: bool,
}

/// Map a base type name, consuming indirection where the base itself
/// requires it.
fn map_base(base: &str, token: &str, indirection: &mut usize) -> Result<ResolvedType, IdlError> {
    let plain = |native: NativeType| ResolvedType {
        token: token.to_string(),
        native,
        user_facing: base.to_string(),
        is_interface_pointer: false,
        marshal: MarshalHint::None,
        is_out: false,
        is_by_ref: false,
        is_array: false,
    };

    let resolved = match base {
        "i8" => plain(NativeType::I8),
        "u8" => plain(NativeType::U8),
        "i16" => plain(NativeType::I16),
        "u16" => plain(NativeType::U16),
        "i32" => plain(NativeType::I32),
        "u32" => plain(NativeType::U32),
        "i64" => plain(NativeType::I64),
        "u64" => plain(NativeType::U64),
        "f32" => plain(NativeType::F32),
        "f64" => plain(NativeType::F64),
        "usize" => plain(NativeType::USize),
        "HRESULT" => plain(NativeType::Status),
        "void" => {
            if *indirection > 0 {
                *indirection -= 1;
                plain(NativeType::Handle)
            } else {
                plain(NativeType::Void)
            }
        }
        "InBSTR" | "OutBSTR" => ResolvedType {
            user_facing: "String".to_string(),
            marshal: MarshalHint::WideString,
            ..plain(NativeType::WideString)
        },
        _ => {
            // Anything else is an interface name; it must be a plausible
            // identifier and must carry at least one pointer marker.
            if base.is_empty()
                || !base
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(IdlError::UnsupportedType(token.to_string()));
            }
            if *indirection == 0 {
                return Err(IdlError::InsufficientIndirection(token.to_string()));
            }
            *indirection -= 1;

            let mut user_facing = if base.starts_with('I') {
                base.to_string()
            } else {
                format!("I{base}")
            };
            if let Some(stripped) = user_facing.strip_suffix(AUTOMATION_SUFFIX) {
                user_facing = stripped.to_string();
            }

            ResolvedType {
                user_facing,
                is_interface_pointer: true,
                ..plain(NativeType::InterfacePtr)
            }
        }
    };

    Ok(resolved)
}

/// Resolve a raw type token plus direction attributes.
///
/// Direction rules run after base mapping: `out` consumes exactly one
/// remaining indirection level; a level after that is `ref` if the
/// attribute is present, an array otherwise; any leftover indirection is an
/// error. `out` and `ref` together never resolve.
pub fn resolve(token: &str, directions: Directions) -> Result<ResolvedType, IdlError> {
    if directions.out && directions.by_ref {
        return Err(IdlError::ConflictingDirection(token.to_string()));
    }

    let base = token.trim_matches('*');
    let mut indirection = token.matches('*').count();

    let mut resolved = map_base(base, token, &mut indirection)?;

    if directions.out {
        if indirection == 0 {
            return Err(IdlError::InsufficientIndirection(token.to_string()));
        }
        resolved.is_out = true;
        indirection -= 1;
    }

    if indirection > 0 {
        if directions.by_ref {
            resolved.is_by_ref = true;
        } else {
            resolved.is_array = true;
        }
        indirection -= 1;
    }

    if indirection > 0 {
        return Err(IdlError::ExcessIndirection(token.to_string()));
    }

    Ok(resolved)
}
