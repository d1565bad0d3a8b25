//! Interface compiler: ancestor chains and dispatch-table layouts.
//!
//! For every declared interface this pass computes the full ancestor chain
//! (root sentinel to self), the absolute slot index of every directly
//! declared method, and the total table size. Slot indices are stable under
//! the one rule that matters: an interface's own methods sit contiguously
//! after its ancestor's table, ordered by declaration order, and the root
//! triad never moves from slots 0-2.

use rustc_hash::FxHashMap;

use crate::error::IdlError;
use crate::idl::{IdlInterface, ROOT_INTERFACE};

/// Table size of the sentinel root interface: query-interface, add-ref,
/// release.
pub const ROOT_VTABLE_SIZE: usize = 3;

/// Compiled layout of one interface.
#[derive(Debug, Clone)]
pub struct InterfaceLayout {
    /// Declared interface name (as written, role suffix included)
    pub name: String,
    /// Ancestor chain in root-to-self order, self included
    pub ancestors: Vec<String>,
    /// Total dispatch-table size, inherited slots included
    pub vtable_size: usize,
    /// Absolute slot index of every directly declared method
    pub method_slots: FxHashMap<String, usize>,
}

/// Layouts for a whole document, plus a global method-identity index so
/// generated call sites can find a slot without re-walking the hierarchy.
#[derive(Debug, Default)]
pub struct LayoutTable {
    layouts: FxHashMap<String, InterfaceLayout>,
    slots: FxHashMap<(String, String), usize>,
}

impl LayoutTable {
    /// Layout of the named interface.
    #[must_use]
    pub fn layout(&self, interface: &str) -> Option<&InterfaceLayout> {
        self.layouts.get(interface)
    }

    /// Total dispatch-table size of the named interface. The root sentinel
    /// always reports 3.
    #[must_use]
    pub fn vtable_size(&self, interface: &str) -> Option<usize> {
        if interface == ROOT_INTERFACE && !self.layouts.contains_key(interface) {
            return Some(ROOT_VTABLE_SIZE);
        }
        self.layouts.get(interface).map(|layout| layout.vtable_size)
    }

    /// Absolute slot index of `method` as declared on `interface`.
    #[must_use]
    pub fn slot(&self, interface: &str, method: &str) -> Option<usize> {
        self.slots
            .get(&(interface.to_string(), method.to_string()))
            .copied()
    }

    /// Iterate all compiled layouts.
    pub fn iter(&self) -> impl Iterator<Item = &InterfaceLayout> {
        self.layouts.values()
    }
}

/// Compile the layout of every declared interface.
///
/// Fails with [`IdlError::CyclicHierarchy`] if base links loop, and with
/// [`IdlError::UnresolvedInterfaceReference`] if a base link names an
/// undeclared interface.
pub fn compile_layouts(interfaces: &[IdlInterface]) -> Result<LayoutTable, IdlError> {
    let declared: FxHashMap<&str, &IdlInterface> = interfaces
        .iter()
        .map(|decl| (decl.name.as_str(), decl))
        .collect();

    let mut table = LayoutTable::default();

    // The root triad is the same for every hierarchy.
    for (slot, method) in ["QueryInterface", "AddRef", "Release"].iter().enumerate() {
        table
            .slots
            .insert((ROOT_INTERFACE.to_string(), (*method).to_string()), slot);
    }

    for decl in interfaces {
        compile_one(decl, &declared, &mut table, &mut Vec::new())?;
    }

    Ok(table)
}

/// Compute (and memoize) one interface's layout; returns its table size.
fn compile_one(
    decl: &IdlInterface,
    declared: &FxHashMap<&str, &IdlInterface>,
    table: &mut LayoutTable,
    visiting: &mut Vec<String>,
) -> Result<usize, IdlError> {
    if let Some(layout) = table.layouts.get(&decl.name) {
        return Ok(layout.vtable_size);
    }
    if visiting.iter().any(|name| name == &decl.name) {
        return Err(IdlError::CyclicHierarchy(decl.name.clone()));
    }
    visiting.push(decl.name.clone());

    // Ancestor size: the root sentinel's fixed 3, or the recursively
    // computed size of the immediate base.
    let (base_size, mut ancestors) = if decl.base == ROOT_INTERFACE && !declared.contains_key(ROOT_INTERFACE) {
        (ROOT_VTABLE_SIZE, vec![ROOT_INTERFACE.to_string()])
    } else {
        let base = declared.get(decl.base.as_str()).copied().ok_or_else(|| {
            IdlError::UnresolvedInterfaceReference {
                referrer: decl.name.clone(),
                referent: decl.base.clone(),
            }
        })?;
        let size = compile_one(base, declared, table, visiting)?;
        let chain = table
            .layouts
            .get(&base.name)
            .map(|layout| layout.ancestors.clone())
            .unwrap_or_default();
        (size, chain)
    };
    ancestors.push(decl.name.clone());

    // Stable sort by declaration order keeps ties deterministic.
    let mut methods: Vec<_> = decl.methods.iter().collect();
    methods.sort_by_key(|method| method.order);

    let mut method_slots = FxHashMap::default();
    for (index, method) in methods.iter().enumerate() {
        let slot = base_size + index;
        method_slots.insert(method.name.clone(), slot);
        table
            .slots
            .insert((decl.name.clone(), method.name.clone()), slot);
    }

    let vtable_size = base_size + methods.len();
    table.layouts.insert(
        decl.name.clone(),
        InterfaceLayout {
            name: decl.name.clone(),
            ancestors,
            vtable_size,
            method_slots,
        },
    );

    visiting.pop();
    Ok(vtable_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::IdlMethod;

    fn interface(name: &str, base: &str, methods: &[&str]) -> IdlInterface {
        IdlInterface {
            name: name.to_string(),
            base: base.to_string(),
            id: "00000000-0000-0000-0000-000000000001".to_string(),
            methods: methods
                .iter()
                .enumerate()
                .map(|(order, method)| IdlMethod {
                    name: (*method).to_string(),
                    order: order as u32,
                    return_type: "void".to_string(),
                    arguments: Vec::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn root_triad_occupies_slots_zero_through_two() {
        let table = compile_layouts(&[]).unwrap();
        assert_eq!(table.slot(ROOT_INTERFACE, "QueryInterface"), Some(0));
        assert_eq!(table.slot(ROOT_INTERFACE, "AddRef"), Some(1));
        assert_eq!(table.slot(ROOT_INTERFACE, "Release"), Some(2));
        assert_eq!(table.vtable_size(ROOT_INTERFACE), Some(3));
    }

    #[test]
    fn slots_follow_the_ancestor_table() {
        let decls = [
            interface("IBase", "IUnknown", &["A", "B"]),
            interface("IDerived", "IBase", &["C"]),
        ];
        let table = compile_layouts(&decls).unwrap();
        assert_eq!(table.slot("IBase", "A"), Some(3));
        assert_eq!(table.slot("IBase", "B"), Some(4));
        assert_eq!(table.vtable_size("IBase"), Some(5));
        assert_eq!(table.slot("IDerived", "C"), Some(5));
        assert_eq!(table.vtable_size("IDerived"), Some(6));
    }

    #[test]
    fn ancestor_chain_runs_root_to_self() {
        let decls = [
            interface("IBase", "IUnknown", &[]),
            interface("IMid", "IBase", &[]),
            interface("ILeaf", "IMid", &[]),
        ];
        let table = compile_layouts(&decls).unwrap();
        let layout = table.layout("ILeaf").unwrap();
        assert_eq!(layout.ancestors, ["IUnknown", "IBase", "IMid", "ILeaf"]);
    }

    #[test]
    fn declaration_order_beats_listing_order() {
        let mut decl = interface("IBase", "IUnknown", &["First", "Second"]);
        decl.methods[0].order = 7;
        decl.methods[1].order = 2;
        let table = compile_layouts(std::slice::from_ref(&decl)).unwrap();
        assert_eq!(table.slot("IBase", "Second"), Some(3));
        assert_eq!(table.slot("IBase", "First"), Some(4));
    }

    #[test]
    fn cyclic_hierarchy_is_detected() {
        let decls = [
            interface("IPing", "IPong", &[]),
            interface("IPong", "IPing", &[]),
        ];
        assert!(matches!(
            compile_layouts(&decls),
            Err(IdlError::CyclicHierarchy(_))
        ));
    }

    #[test]
    fn missing_base_is_unresolved() {
        let decls = [interface("IOrphan", "INowhere", &[])];
        assert!(matches!(
            compile_layouts(&decls),
            Err(IdlError::UnresolvedInterfaceReference { .. })
        ));
    }
}
