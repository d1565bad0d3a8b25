//! Class compiler: resolve implementation classes against the filtered
//! interface surface.

use std::str::FromStr;

use crossbind::GUID;
use rustc_hash::FxHashSet;

use crate::error::IdlError;
use crate::idl::{Config, IdlClass};

/// A resolved implementation class.
#[derive(Debug, Clone)]
pub struct ResolvedClass {
    pub name: String,
    pub id: GUID,
    /// Display names of the implemented interfaces
    pub implements: Vec<String>,
}

/// Filter out ignored classes and check that every surviving class only
/// references interfaces that survived filtering themselves.
///
/// `surface` is the set of public interface display names.
pub fn compile_classes(
    classes: &[IdlClass],
    surface: &FxHashSet<String>,
    config: &Config,
) -> Result<Vec<ResolvedClass>, IdlError> {
    let mut resolved = Vec::new();

    for class in classes {
        if config.ignore_classes.iter().any(|name| name == &class.name) {
            continue;
        }

        for implemented in &class.implements {
            if !surface.contains(implemented) {
                return Err(IdlError::UnresolvedInterfaceReference {
                    referrer: class.name.clone(),
                    referent: implemented.clone(),
                });
            }
        }

        let id = GUID::from_str(&class.id).map_err(|source| IdlError::InvalidIdentifier {
            item: class.name.clone(),
            source,
        })?;

        resolved.push(ResolvedClass {
            name: class.name.clone(),
            id,
            implements: class.implements.clone(),
        });
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str, implements: &[&str]) -> IdlClass {
        IdlClass {
            name: name.to_string(),
            id: "99999999-8888-7777-6666-555555555555".to_string(),
            implements: implements.iter().map(|i| (*i).to_string()).collect(),
        }
    }

    fn surface(names: &[&str]) -> FxHashSet<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn ignored_classes_are_dropped() {
        let config = Config {
            ignore_classes: vec!["Hidden".to_string()],
            ..Config::default()
        };
        let classes = [class("Hidden", &["IThing"]), class("Kept", &["IThing"])];
        let resolved = compile_classes(&classes, &surface(&["IThing"]), &config).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name, "Kept");
    }

    #[test]
    fn dangling_implements_reference_fails() {
        let classes = [class("Widget", &["IMissing"])];
        let result = compile_classes(&classes, &surface(&["IThing"]), &Config::default());
        assert!(matches!(
            result,
            Err(IdlError::UnresolvedInterfaceReference { .. })
        ));
    }
}
