//! Interface-definition compiler for the crossbind object model.
//!
//! Runs ahead of time against a parsed idl document and produces the
//! metadata both the generated bindings and the runtime rely on:
//!
//! - **type mapper** ([`types`]): token + direction attributes -> native
//!   representation and marshaling strategy;
//! - **interface compiler** ([`layout`]): ancestor chains and absolute
//!   dispatch-table slot indices, root triad fixed at slots 0-2;
//! - **class compiler** ([`classes`]): implementation classes resolved
//!   against the filtered public surface;
//! - **model** ([`model`]): the full resolved tree handed to the source
//!   renderer (`render(metadata) -> text`, not part of this crate).
//!
//! ```no_run
//! use crossbind_idlc::{Config, IdlDocument, compile};
//!
//! # fn main() -> Result<(), crossbind_idlc::IdlError> {
//! let document = IdlDocument::from_json(&std::fs::read_to_string("lib.json").unwrap())?;
//! let config = Config::from_json(&std::fs::read_to_string("config.json").unwrap())?;
//! let model = compile(&document, &config)?;
//! for interface in &model.interfaces {
//!     println!("{} has {} slots", interface.name, interface.vtable_size);
//! }
//! # Ok(())
//! # }
//! ```

pub mod classes;
pub mod error;
pub mod idl;
pub mod layout;
pub mod model;
pub mod types;

pub use classes::ResolvedClass;
pub use error::IdlError;
pub use idl::{Config, Directions, IdlArgument, IdlClass, IdlDocument, IdlInterface, IdlMethod};
pub use layout::{InterfaceLayout, LayoutTable, ROOT_VTABLE_SIZE, compile_layouts};
pub use model::{CompiledArgument, CompiledInterface, CompiledMethod, CompiledModel, compile};
pub use types::{MarshalHint, NativeType, ResolvedType, resolve};
