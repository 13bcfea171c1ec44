//! Schema types and structures
//!
//! The data model of a versioned package: variables, dependencies,
//! templates, validations, version-to-version mappings and items. Versions
//! and items live in flat arenas owned by the package and reference each
//! other through [`VersionId`]/[`ItemId`] handles, so the previous-version
//! links never form ownership cycles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::catalog::{ContainerKind, ElementKind, TypeCombo};
use crate::error::Result;
use crate::record::DynamicRecord;

/// Handle of a version in the package arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionId(pub(crate) u32);

/// Handle of an item in the package arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub(crate) u32);

impl VersionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ItemId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A named field of an item: an element type plus a container kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub element: ElementKind,
    #[serde(default = "default_container")]
    pub container: ContainerKind,
    /// Wire key override; stays on the original name across renames so
    /// previously written data keeps reading back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_name: Option<String>,
}

fn default_container() -> ContainerKind {
    ContainerKind::None
}

impl Variable {
    /// A plain (uncontained) variable
    pub fn new(name: impl Into<String>, element: ElementKind) -> Self {
        Self {
            name: name.into(),
            element,
            container: ContainerKind::None,
            storage_name: None,
        }
    }

    pub fn with_container(
        name: impl Into<String>,
        element: ElementKind,
        container: ContainerKind,
    ) -> Self {
        Self {
            name: name.into(),
            element,
            container,
            storage_name: None,
        }
    }

    /// The key this variable is stored under on the wire
    pub fn storage(&self) -> &str {
        self.storage_name.as_deref().unwrap_or(&self.name)
    }

    pub fn combo(&self) -> TypeCombo {
        TypeCombo::new(self.element, self.container)
    }

    /// A simple base value: scalar storage, no container wrapper
    pub fn is_simple(&self) -> bool {
        self.container == ContainerKind::None
    }

    /// Wrapped in a container type
    pub fn is_complex(&self) -> bool {
        !self.is_simple()
    }
}

/// Reference to another item or built-in type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    /// Include the dependency by value; when false a forward declaration
    /// is enough
    #[serde(default)]
    pub by_value: bool,
}

impl Dependency {
    pub fn new(name: impl Into<String>, by_value: bool) -> Self {
        Self {
            name: name.into(),
            by_value,
        }
    }
}

/// A named template instantiation carried by an item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub template: String,
    pub types: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

/// Validation error categories, combinable as a u64 flag set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u64)]
pub enum ValidationFlag {
    MissingValue = 1 << 0,
    InvalidCount = 1 << 1,
    InvalidValue = 1 << 2,
}

/// One problem found while validating a record
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub flag: ValidationFlag,
    pub variable: String,
    pub message: String,
}

/// Accumulates validation issues across one record
#[derive(Debug, Default)]
pub struct Validator {
    issues: Vec<ValidationIssue>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(
        &mut self,
        flag: ValidationFlag,
        variable: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.issues.push(ValidationIssue {
            flag,
            variable: variable.into(),
            message: message.into(),
        });
    }

    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }
}

/// Declarative validation rule attached to an item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Validation {
    /// An optional variable must hold a value
    Required { variable: String },
    /// A vector variable must not be empty
    NonEmpty { variable: String },
    /// Named rule carried through the model without built-in behavior
    Custom { name: String },
}

impl Validation {
    /// Stable label used when removing validations from a modified item
    pub fn label(&self) -> String {
        match self {
            Validation::Required { variable } => format!("required({variable})"),
            Validation::NonEmpty { variable } => format!("non_empty({variable})"),
            Validation::Custom { name } => name.clone(),
        }
    }
}

/// Conversion function between two adjacent versions of a record
pub type MapFn = dyn Fn(&DynamicRecord, &mut DynamicRecord) -> Result<()> + Send + Sync;

/// Caller-supplied translation logic for a `Custom` mapping
#[derive(Clone, Default)]
pub struct CustomMapping {
    /// Fills the previous-version record from the current one
    pub to_previous: Option<Arc<MapFn>>,
    /// Fills the current-version record from the previous one
    pub from_previous: Option<Arc<MapFn>>,
}

impl fmt::Debug for CustomMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomMapping")
            .field("to_previous", &self.to_previous.is_some())
            .field("from_previous", &self.from_previous.is_some())
            .finish()
    }
}

/// How one variable's value translates between a modified item and its
/// immediate predecessor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mapping {
    /// The value carries across; differing names mean a rename
    Same { name: String, previous: String },
    /// Introduced in this version; zeroed when converting forward, omitted
    /// when converting back
    New { name: String },
    /// Removed in this version; skipped in both directions
    Deleted { previous: String },
    /// Caller-supplied translation outside the default rules
    Custom {
        name: String,
        #[serde(skip)]
        convert: CustomMapping,
    },
}

impl Mapping {
    /// The primary name of the mapping: the current variable name, or the
    /// previous one for deleted entries
    pub fn name(&self) -> &str {
        match self {
            Mapping::Same { name, .. } => name,
            Mapping::New { name } => name,
            Mapping::Deleted { previous } => previous,
            Mapping::Custom { name, .. } => name,
        }
    }

    /// The current variable name this mapping covers, if any
    pub fn current_name(&self) -> Option<&str> {
        match self {
            Mapping::Same { name, .. } => Some(name),
            Mapping::New { name } => Some(name),
            Mapping::Deleted { .. } => None,
            Mapping::Custom { name, .. } => Some(name),
        }
    }

    pub fn is_renamed(&self) -> bool {
        matches!(self, Mapping::Same { name, previous } if name != previous)
    }
}

/// Item or entity: entities carry a runtime type tag on the wire, plain
/// items are always embedded by a known static type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Item,
    Entity,
}

/// How an item relates to its predecessor in the previous version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Newly introduced in its version
    New,
    /// Unmodified carry-over placeholder
    Identical,
    /// Derived from the predecessor through a modification
    Modified,
    /// Deleted tombstone; keeps the predecessor link for traceability
    Deleted,
}

/// A record definition inside one version of a package
#[derive(Debug, Clone)]
pub struct Item {
    pub name: String,
    pub kind: ItemKind,
    pub provenance: Provenance,
    pub deprecated: bool,
    pub variables: Vec<Variable>,
    pub dependencies: Vec<Dependency>,
    pub templates: Vec<Template>,
    pub validations: Vec<Validation>,
    pub mappings: Vec<Mapping>,
    /// Owning version
    pub version: VersionId,
    /// The item this one derives from in the previous version
    pub previous: Option<ItemId>,
    /// Nearest concrete (new or modified) ancestor, resolved during
    /// package validation
    pub implementing: Option<ItemId>,
}

impl Item {
    pub fn is_entity(&self) -> bool {
        self.kind == ItemKind::Entity
    }

    pub fn is_deleted(&self) -> bool {
        self.provenance == Provenance::Deleted
    }

    pub fn is_identical(&self) -> bool {
        self.provenance == Provenance::Identical
    }

    pub fn is_modified(&self) -> bool {
        self.provenance == Provenance::Modified
    }

    /// A concrete item defines its own variables instead of aliasing a
    /// predecessor
    pub fn is_concrete(&self) -> bool {
        matches!(self.provenance, Provenance::New | Provenance::Modified)
    }

    pub fn find_variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn find_mapping(&self, name: &str) -> Option<&Mapping> {
        self.mappings.iter().find(|m| m.name() == name)
    }

    pub fn find_dependency(&self, name: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.name == name)
    }

    pub fn find_template(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name == name)
    }
}
