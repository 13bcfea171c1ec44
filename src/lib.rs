//! Verspack
//!
//! A schema-evolution and binary-serialization engine for packages of
//! versioned record definitions.
//!
//! ## Features
//!
//! - **Versioned Schemas**: each version derives from its predecessor
//!   through an ordered list of scripted modifications
//! - **Consistency Validation**: version chains must stay fully connected
//!   and every variable of a modified item must be covered by a mapping
//! - **Derived Migrations**: forward/backward record conversions computed
//!   from the mapping lists, with custom translation hooks
//! - **Section Wire Format**: nested, key-labeled binary sections with null
//!   tombstones and indexed section arrays
//! - **Runtime Dispatch**: open-addressing registries that create, clear,
//!   copy, compare and (de)serialize any registered value or entity type
//!   from a runtime tag alone
//!
//! ## Architecture
//!
//! ```text
//! PackageDef (JSON or code)
//!      │  Package::build (seed, modify, validate)
//!      ▼
//! Package ── Version ── Item ── Variable/Mapping
//!      │                            │
//!      │ EntityRegistry::from_package│ TypeCatalog
//!      ▼                            ▼
//! EntityRegistry              ValueRegistry
//!      │   DynamicRecord / Migrator  │
//!      ▼                            ▼
//! RecordWriter / RecordReader  (wire format)
//! ```

pub mod catalog;
pub mod containers;
pub mod dispatch;
pub mod element;
pub mod error;
pub mod migrate;
pub mod package;
pub mod record;
pub mod schema;
pub mod version;
pub mod wire;

pub use catalog::{ContainerKind, ElementKind, TypeCatalog, TypeCombo};
pub use containers::{IdxVec, WireValue};
pub use dispatch::{EntityOps, EntityRegistry, ValueHandle, ValueOps, ValueRegistry};
pub use element::{ContentDigest, Element, Id, Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};
pub use error::{PackError, Result};
pub use migrate::Migrator;
pub use package::{Package, PackageDef, Release, ReleaseItem, VersionDef};
pub use record::DynamicRecord;
pub use schema::{
    CustomMapping, Dependency, Item, ItemId, ItemKind, Mapping, Provenance, Template, Validation,
    ValidationFlag, ValidationIssue, Validator, Variable, VersionId,
};
pub use version::{Modification, Version};
pub use wire::{RecordReader, RecordWriter};
