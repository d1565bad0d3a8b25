//! Data model of the parsed idl document and the build configuration.
//!
//! The on-disk encoding is JSON, but nothing here depends on that beyond
//! the serde derives: the compiler consumes the object graph.

use serde::Deserialize;

use crate::error::IdlError;

/// Name of the sentinel root interface. Every hierarchy bottoms out here;
/// its three slots (query-interface, add-ref, release) are fixed.
pub const ROOT_INTERFACE: &str = "IUnknown";

/// Role suffix marking the low-level counterpart of an interface,
/// intentionally excluded from the public surface.
pub const RAW_SUFFIX: &str = "_Raw";

/// Role suffix marking the automation-friendly variant of an interface;
/// stripped when computing display names.
pub const AUTOMATION_SUFFIX: &str = "_Automation";

/// Strip a role suffix, if any, from an interface name.
#[must_use]
pub fn display_name(name: &str) -> &str {
    name.strip_suffix(RAW_SUFFIX)
        .or_else(|| name.strip_suffix(AUTOMATION_SUFFIX))
        .unwrap_or(name)
}

/// A parsed idl library document.
#[derive(Debug, Clone, Deserialize)]
pub struct IdlDocument {
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub interfaces: Vec<IdlInterface>,
    #[serde(default)]
    pub classes: Vec<IdlClass>,
}

impl IdlDocument {
    /// Deserialize a document from its JSON encoding.
    pub fn from_json(json: &str) -> Result<Self, IdlError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One interface declaration: name, base link, identity and ordered
/// methods.
#[derive(Debug, Clone, Deserialize)]
pub struct IdlInterface {
    pub name: String,
    pub base: String,
    pub id: String,
    #[serde(default)]
    pub methods: Vec<IdlMethod>,
}

impl IdlInterface {
    /// The public name: the declared name with its role suffix stripped.
    #[must_use]
    pub fn display_name(&self) -> &str {
        display_name(&self.name)
    }

    /// Whether this is a `_Raw` counterpart, excluded from the public
    /// surface.
    #[must_use]
    pub fn is_raw(&self) -> bool {
        self.name.ends_with(RAW_SUFFIX)
    }
}

/// One method declaration. `order` is source order; it fixes the relative
/// slot order of an interface's own methods, not the absolute index.
#[derive(Debug, Clone, Deserialize)]
pub struct IdlMethod {
    pub name: String,
    pub order: u32,
    #[serde(rename = "returnType")]
    pub return_type: String,
    #[serde(default)]
    pub arguments: Vec<IdlArgument>,
}

/// One argument declaration. `attributes` is the raw comma-separated
/// direction list, e.g. `"out"` or `"out, ref"`.
#[derive(Debug, Clone, Deserialize)]
pub struct IdlArgument {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub attributes: String,
}

impl IdlArgument {
    /// Parse the direction attributes. Attribute names outside the known
    /// set are ignored.
    #[must_use]
    pub fn directions(&self) -> Directions {
        Directions::parse(&self.attributes)
    }
}

/// The direction attribute set of one argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Directions {
    pub out: bool,
    pub by_ref: bool,
}

impl Directions {
    /// No direction attributes: a plain input value.
    pub const NONE: Directions = Directions {
        out: false,
        by_ref: false,
    };

    /// Parse a comma-separated attribute list.
    #[must_use]
    pub fn parse(attributes: &str) -> Self {
        let mut directions = Directions::default();
        for attr in attributes.split(',') {
            match attr.trim() {
                "out" => directions.out = true,
                "ref" => directions.by_ref = true,
                _ => {}
            }
        }
        directions
    }
}

/// One implementation-class declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdlClass {
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub implements: Vec<String>,
}

/// Build configuration: target namespace plus class/interface exclusions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub target_namespace: String,
    #[serde(default)]
    pub ignore_classes: Vec<String>,
    #[serde(default)]
    pub ignore_interfaces: Vec<String>,
}

impl Config {
    /// Deserialize a configuration from its JSON encoding.
    pub fn from_json(json: &str) -> Result<Self, IdlError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_parse_ignores_unknown_attributes() {
        assert_eq!(Directions::parse(""), Directions::NONE);
        assert_eq!(
            Directions::parse("out"),
            Directions {
                out: true,
                by_ref: false
            }
        );
        assert_eq!(
            Directions::parse(" ref , frobnicate "),
            Directions {
                out: false,
                by_ref: true
            }
        );
    }

    #[test]
    fn display_name_strips_role_suffixes() {
        assert_eq!(display_name("IFoo_Raw"), "IFoo");
        assert_eq!(display_name("IFoo_Automation"), "IFoo");
        assert_eq!(display_name("IFoo"), "IFoo");
    }

    #[test]
    fn document_from_json() {
        let doc = IdlDocument::from_json(
            r#"{
                "name": "TestLib",
                "id": "11111111-2222-3333-4444-555555555555",
                "interfaces": [
                    {
                        "name": "IHello",
                        "base": "IUnknown",
                        "id": "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee",
                        "methods": [
                            {
                                "name": "Ping",
                                "order": 0,
                                "returnType": "i32",
                                "arguments": [
                                    { "name": "count", "type": "i32" }
                                ]
                            }
                        ]
                    }
                ],
                "classes": [
                    {
                        "name": "Hello",
                        "id": "99999999-8888-7777-6666-555555555555",
                        "implements": ["IHello"]
                    }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.interfaces.len(), 1);
        assert_eq!(doc.interfaces[0].methods[0].arguments[0].ty, "i32");
        assert_eq!(doc.classes[0].implements, vec!["IHello"]);
    }
}
