//! Compile-time errors.
//!
//! Every variant is fatal to the build step: compilation aborts at the
//! first error and produces no partial output.

use crossbind::GuidParseError;

/// Errors raised while compiling an idl document.
#[derive(Debug, thiserror::Error)]
pub enum IdlError {
    /// The type token is not a primitive, a string token, or a plausible
    /// interface name.
    #[error("unsupported type: {0:?}")]
    UnsupportedType(String),

    /// An interface-pointer token with no pointer marker, or an `out`
    /// argument that is not a pointer.
    #[error("not enough indirection for type: {0:?}")]
    InsufficientIndirection(String),

    /// An argument carries both `out` and `ref`.
    #[error("an argument cannot be out and ref at the same time: {0:?}")]
    ConflictingDirection(String),

    /// Pointer markers remain after every direction rule has consumed its
    /// share.
    #[error("too many indirection levels: {0:?}")]
    ExcessIndirection(String),

    /// Walking base-interface links revisited an interface.
    #[error("interface hierarchy has a cycle through {0:?}")]
    CyclicHierarchy(String),

    /// A base-interface link or a class's implements list names an
    /// interface that does not exist (or did not survive filtering).
    #[error("{referrer:?} references unknown interface {referent:?}")]
    UnresolvedInterfaceReference { referrer: String, referent: String },

    /// An interface or class identifier is not a well-formed GUID.
    #[error("malformed identifier on {item:?}")]
    InvalidIdentifier {
        item: String,
        #[source]
        source: GuidParseError,
    },

    /// The document or configuration JSON does not match the expected
    /// shape.
    #[error("malformed idl document")]
    Document(#[from] serde_json::Error),
}
