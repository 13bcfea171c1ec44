//! Error types for the package engine

use thiserror::Error;

/// Result type for package operations
pub type Result<T> = std::result::Result<T, PackError>;

/// Package engine errors
///
/// Three families share this enum: construction/validation errors (fatal to
/// a package build), wire errors (`CantRead`/`CantWrite`, propagated
/// unchanged through every enclosing section), and dispatch errors
/// (`NotFound`/`InvalidParam`, ordinary recoverable outcomes of a registry
/// probe).
#[derive(Error, Debug)]
pub enum PackError {
    #[error("duplicate version name: {0}")]
    DuplicateVersion(String),

    #[error("version not found: {0}")]
    VersionNotFound(String),

    #[error("ambiguous latest version: both {0} and {1} are leaves")]
    AmbiguousLatest(String, String),

    #[error("item not found: {name} in version {version}")]
    ItemNotFound { name: String, version: String },

    #[error("item already exists: {name} in version {version}")]
    ItemExists { name: String, version: String },

    #[error("item {name} does not exist or is deleted in version {version}")]
    ItemDeleted { name: String, version: String },

    #[error("item {name} in version {version} has already been modified; an item can only be modified once per version")]
    AlreadyModified { name: String, version: String },

    #[error("item {name} is missing from version {version} without an explicit delete")]
    ItemOmitted { name: String, version: String },

    #[error("item {name} in version {version} is not the same item/entity kind as its predecessor")]
    KindMismatch { name: String, version: String },

    #[error("item {name} in version {version} has no concrete ancestor implementation")]
    UnresolvedAncestor { name: String, version: String },

    #[error("variable {variable} not found in item {item} in version {version}")]
    VariableNotFound {
        variable: String,
        item: String,
        version: String,
    },

    #[error("variable {variable} already exists in item {item} in version {version}")]
    VariableExists {
        variable: String,
        item: String,
        version: String,
    },

    #[error("variable {variable} of item {item} in version {version} is not covered by a mapping")]
    UnmappedVariable {
        variable: String,
        item: String,
        version: String,
    },

    #[error("mapping {mapping} of item {item} in version {version} names no current variable")]
    DanglingMapping {
        mapping: String,
        item: String,
        version: String,
    },

    #[error("cannot write to stream: {0}")]
    CantWrite(String),

    #[error("cannot read from stream: {0}")]
    CantRead(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
