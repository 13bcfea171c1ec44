//! Package versions and the modifications that derive them
//!
//! A version never redeclares its items from scratch: it starts as an exact
//! carry-over of its predecessor and applies an ordered list of
//! [`Modification`]s. Later modifications may depend on the effects of
//! earlier ones, so application order is strict. The application logic
//! itself lives with the package builder.

use serde::{Deserialize, Serialize};

use crate::schema::{
    Dependency, ItemId, Mapping, Template, Validation, Variable, VersionId,
};

/// One version of a package: every item live in that version (including
/// unmodified carry-overs) plus the modifications that produced it
#[derive(Debug, Clone)]
pub struct Version {
    pub name: String,
    pub previous: Option<VersionId>,
    /// Ordered item handles into the package arena
    pub items: Vec<ItemId>,
    pub modifications: Vec<Modification>,
}

/// A scripted, ordered edit applied when deriving a version from its
/// predecessor.
///
/// The entity variants behave exactly as the item ones apart from the
/// item/entity kind recorded on addition; delete and modify operate on
/// whatever kind the named item has.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Modification {
    AddItem {
        name: String,
        #[serde(default)]
        variables: Vec<Variable>,
        #[serde(default)]
        dependencies: Vec<Dependency>,
        #[serde(default)]
        templates: Vec<Template>,
        #[serde(default)]
        validations: Vec<Validation>,
    },
    AddEntity {
        name: String,
        #[serde(default)]
        variables: Vec<Variable>,
        #[serde(default)]
        dependencies: Vec<Dependency>,
        #[serde(default)]
        templates: Vec<Template>,
        #[serde(default)]
        validations: Vec<Validation>,
    },
    DeleteItem {
        name: String,
    },
    DeleteEntity {
        name: String,
    },
    ModifyItem {
        name: String,
        #[serde(default)]
        add_variables: Vec<Variable>,
        #[serde(default)]
        remove_variables: Vec<String>,
        #[serde(default)]
        rename_variables: Vec<(String, String)>,
        #[serde(default)]
        add_dependencies: Vec<Dependency>,
        #[serde(default)]
        remove_dependencies: Vec<String>,
        #[serde(default)]
        add_templates: Vec<Template>,
        #[serde(default)]
        remove_templates: Vec<String>,
        #[serde(default)]
        add_validations: Vec<Validation>,
        #[serde(default)]
        remove_validations: Vec<String>,
        #[serde(default)]
        mappings: Vec<Mapping>,
    },
    ModifyEntity {
        name: String,
        #[serde(default)]
        add_variables: Vec<Variable>,
        #[serde(default)]
        remove_variables: Vec<String>,
        #[serde(default)]
        rename_variables: Vec<(String, String)>,
        #[serde(default)]
        add_dependencies: Vec<Dependency>,
        #[serde(default)]
        remove_dependencies: Vec<String>,
        #[serde(default)]
        add_templates: Vec<Template>,
        #[serde(default)]
        remove_templates: Vec<String>,
        #[serde(default)]
        add_validations: Vec<Validation>,
        #[serde(default)]
        remove_validations: Vec<String>,
        #[serde(default)]
        mappings: Vec<Mapping>,
    },
}

impl Modification {
    /// Name of the item this modification targets
    pub fn target(&self) -> &str {
        match self {
            Modification::AddItem { name, .. }
            | Modification::AddEntity { name, .. }
            | Modification::DeleteItem { name }
            | Modification::DeleteEntity { name }
            | Modification::ModifyItem { name, .. }
            | Modification::ModifyEntity { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ElementKind;

    #[test]
    fn test_modification_target() {
        let add = Modification::AddEntity {
            name: "Mesh".into(),
            variables: vec![Variable::new("Vertices", ElementKind::U32)],
            dependencies: vec![],
            templates: vec![],
            validations: vec![],
        };
        assert_eq!(add.target(), "Mesh");

        let delete = Modification::DeleteItem { name: "Old".into() };
        assert_eq!(delete.target(), "Old");
    }

    #[test]
    fn test_modification_json_round_trip() {
        let json = r#"{
            "op": "modify_entity",
            "name": "Node",
            "add_variables": [{ "name": "Label", "element": "string" }],
            "rename_variables": [["Pos", "Position"]]
        }"#;
        let modification: Modification = serde_json::from_str(json).unwrap();
        match &modification {
            Modification::ModifyEntity {
                name,
                add_variables,
                rename_variables,
                remove_variables,
                ..
            } => {
                assert_eq!(name, "Node");
                assert_eq!(add_variables.len(), 1);
                assert_eq!(add_variables[0].element, ElementKind::String);
                assert_eq!(rename_variables[0], ("Pos".into(), "Position".into()));
                assert!(remove_variables.is_empty());
            }
            other => panic!("expected ModifyEntity, got {other:?}"),
        }
    }
}
