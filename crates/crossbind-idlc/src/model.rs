//! The compiled metadata tree.
//!
//! [`compile`] runs the whole pipeline - layout pass, surface filtering,
//! class resolution, per-argument type mapping - and produces the tree the
//! source renderer consumes. Any error aborts compilation with no partial
//! output.

use std::str::FromStr;

use crossbind::GUID;
use rustc_hash::FxHashSet;

use crate::classes::{ResolvedClass, compile_classes};
use crate::error::IdlError;
use crate::idl::{Config, IdlDocument, IdlInterface};
use crate::layout::{LayoutTable, compile_layouts};
use crate::types::{ResolvedType, resolve};

/// One fully resolved method.
#[derive(Debug, Clone)]
pub struct CompiledMethod {
    pub name: String,
    /// Absolute dispatch-table slot index
    pub slot: usize,
    pub return_type: ResolvedType,
    pub arguments: Vec<CompiledArgument>,
}

/// One fully resolved argument.
#[derive(Debug, Clone)]
pub struct CompiledArgument {
    pub name: String,
    pub ty: ResolvedType,
}

/// One fully resolved public interface.
#[derive(Debug, Clone)]
pub struct CompiledInterface {
    /// Display name (role suffix stripped)
    pub name: String,
    /// Name as declared in the document
    pub original_name: String,
    pub base: String,
    pub id: GUID,
    /// Ancestor chain in root-to-self order, self included
    pub ancestors: Vec<String>,
    /// Total dispatch-table size, inherited slots included
    pub vtable_size: usize,
    /// Directly declared methods in slot order
    pub methods: Vec<CompiledMethod>,
}

/// The compiled library: everything the renderer needs.
#[derive(Debug, Clone)]
pub struct CompiledModel {
    pub name: String,
    pub id: GUID,
    pub namespace: String,
    pub interfaces: Vec<CompiledInterface>,
    pub classes: Vec<ResolvedClass>,
}

fn parse_id(item: &str, id: &str) -> Result<GUID, IdlError> {
    GUID::from_str(id).map_err(|source| IdlError::InvalidIdentifier {
        item: item.to_string(),
        source,
    })
}

fn compile_interface(
    decl: &IdlInterface,
    layouts: &LayoutTable,
) -> Result<CompiledInterface, IdlError> {
    let layout = layouts
        .layout(&decl.name)
        .unwrap_or_else(|| unreachable!("layout pass covers every declared interface"));

    let mut methods: Vec<_> = decl.methods.iter().collect();
    methods.sort_by_key(|method| method.order);

    let methods = methods
        .into_iter()
        .map(|method| {
            let slot = layouts
                .slot(&decl.name, &method.name)
                .unwrap_or_else(|| unreachable!("layout pass indexes every method"));
            let return_type = resolve(&method.return_type, crate::idl::Directions::NONE)?;
            let arguments = method
                .arguments
                .iter()
                .map(|argument| {
                    Ok(CompiledArgument {
                        name: argument.name.clone(),
                        ty: resolve(&argument.ty, argument.directions())?,
                    })
                })
                .collect::<Result<Vec<_>, IdlError>>()?;
            Ok(CompiledMethod {
                name: method.name.clone(),
                slot,
                return_type,
                arguments,
            })
        })
        .collect::<Result<Vec<_>, IdlError>>()?;

    Ok(CompiledInterface {
        name: decl.display_name().to_string(),
        original_name: decl.name.clone(),
        base: decl.base.clone(),
        id: parse_id(&decl.name, &decl.id)?,
        ancestors: layout.ancestors.clone(),
        vtable_size: layout.vtable_size,
        methods,
    })
}

/// Compile a parsed idl document against a build configuration.
pub fn compile(document: &IdlDocument, config: &Config) -> Result<CompiledModel, IdlError> {
    // Layouts are computed over every declaration: a filtered-out interface
    // can still be some survivor's ancestor, and its slots must count.
    let layouts = compile_layouts(&document.interfaces)?;

    let surviving: Vec<&IdlInterface> = document
        .interfaces
        .iter()
        .filter(|decl| !decl.is_raw())
        .filter(|decl| {
            !config
                .ignore_interfaces
                .iter()
                .any(|name| name == decl.display_name())
        })
        .collect();

    let surface: FxHashSet<String> = surviving
        .iter()
        .map(|decl| decl.display_name().to_string())
        .collect();

    let interfaces = surviving
        .iter()
        .map(|decl| compile_interface(decl, &layouts))
        .collect::<Result<Vec<_>, IdlError>>()?;

    let classes = compile_classes(&document.classes, &surface, config)?;

    Ok(CompiledModel {
        name: document.name.clone(),
        id: parse_id(&document.name, &document.id)?,
        namespace: config.target_namespace.clone(),
        interfaces,
        classes,
    })
}
