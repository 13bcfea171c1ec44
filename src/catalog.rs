//! Canonical enumeration of value types
//!
//! A value type is an element kind (scalar, vector, matrix, id, digest or
//! string) crossed with a container kind (plain, optional, vector, indexed
//! vector and their optional variants). Each combination is identified by a
//! [`TypeCombo`], which is the key the dynamic dispatch tables are built on.
//!
//! The enumeration order of [`TypeCatalog::all_combos`] is fixed: element
//! kinds in declaration order, then container kinds in declaration order.
//! Dispatch-table insertion follows this order, so it must stay stable
//! across runs.

use serde::{Deserialize, Serialize};

use crate::error::{PackError, Result};

/// Element kinds, the serializable building blocks of record variables.
///
/// The numeric id of each kind is `(group << 4) | variant`, which keeps ids
/// stable when a group gains variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ElementKind {
    Bool = 0x11,
    I8 = 0x21,
    I16 = 0x22,
    I32 = 0x23,
    I64 = 0x24,
    U8 = 0x31,
    U16 = 0x32,
    U32 = 0x33,
    U64 = 0x34,
    F32 = 0x41,
    F64 = 0x42,
    Vec2 = 0x51,
    Vec3 = 0x61,
    Vec4 = 0x71,
    Mat2 = 0x81,
    Mat3 = 0x91,
    Mat4 = 0xA1,
    Id = 0xB1,
    Digest = 0xC1,
    String = 0xD1,
}

/// Static information about one element kind
#[derive(Debug, Clone, Copy)]
pub struct ElementInfo {
    /// Canonical type name (e.g. "i32", "vec3")
    pub name: &'static str,
    /// Name of the stored item type (e.g. "f32" for "vec3")
    pub item_name: &'static str,
    /// Number of stored items per value (e.g. 3 for "vec3", 9 for "mat3")
    pub item_count: usize,
}

/// All element kinds in declaration order
pub const ELEMENT_KINDS: [ElementKind; 20] = [
    ElementKind::Bool,
    ElementKind::I8,
    ElementKind::I16,
    ElementKind::I32,
    ElementKind::I64,
    ElementKind::U8,
    ElementKind::U16,
    ElementKind::U32,
    ElementKind::U64,
    ElementKind::F32,
    ElementKind::F64,
    ElementKind::Vec2,
    ElementKind::Vec3,
    ElementKind::Vec4,
    ElementKind::Mat2,
    ElementKind::Mat3,
    ElementKind::Mat4,
    ElementKind::Id,
    ElementKind::Digest,
    ElementKind::String,
];

impl ElementKind {
    /// Numeric id used on the wire and in dispatch hashing
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Static type information for this kind
    pub fn info(self) -> ElementInfo {
        match self {
            ElementKind::Bool => ElementInfo { name: "bool", item_name: "bool", item_count: 1 },
            ElementKind::I8 => ElementInfo { name: "i8", item_name: "i8", item_count: 1 },
            ElementKind::I16 => ElementInfo { name: "i16", item_name: "i16", item_count: 1 },
            ElementKind::I32 => ElementInfo { name: "i32", item_name: "i32", item_count: 1 },
            ElementKind::I64 => ElementInfo { name: "i64", item_name: "i64", item_count: 1 },
            ElementKind::U8 => ElementInfo { name: "u8", item_name: "u8", item_count: 1 },
            ElementKind::U16 => ElementInfo { name: "u16", item_name: "u16", item_count: 1 },
            ElementKind::U32 => ElementInfo { name: "u32", item_name: "u32", item_count: 1 },
            ElementKind::U64 => ElementInfo { name: "u64", item_name: "u64", item_count: 1 },
            ElementKind::F32 => ElementInfo { name: "f32", item_name: "f32", item_count: 1 },
            ElementKind::F64 => ElementInfo { name: "f64", item_name: "f64", item_count: 1 },
            ElementKind::Vec2 => ElementInfo { name: "vec2", item_name: "f32", item_count: 2 },
            ElementKind::Vec3 => ElementInfo { name: "vec3", item_name: "f32", item_count: 3 },
            ElementKind::Vec4 => ElementInfo { name: "vec4", item_name: "f32", item_count: 4 },
            ElementKind::Mat2 => ElementInfo { name: "mat2", item_name: "f32", item_count: 4 },
            ElementKind::Mat3 => ElementInfo { name: "mat3", item_name: "f32", item_count: 9 },
            ElementKind::Mat4 => ElementInfo { name: "mat4", item_name: "f32", item_count: 16 },
            ElementKind::Id => ElementInfo { name: "id", item_name: "id", item_count: 1 },
            ElementKind::Digest => ElementInfo { name: "digest", item_name: "digest", item_count: 1 },
            ElementKind::String => ElementInfo { name: "string", item_name: "string", item_count: 1 },
        }
    }

    /// Canonical type name
    pub fn name(self) -> &'static str {
        self.info().name
    }
}

/// Container kinds wrapping an element type.
///
/// The numeric id doubles as a flag set: bit 0 marks optional, bit 4 marks
/// vector, bit 5 marks indexed. An indexed container always has the vector
/// bit set as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ContainerKind {
    None = 0x00,
    OptionalValue = 0x01,
    Vector = 0x10,
    OptionalVector = 0x11,
    IdxVector = 0x20,
    OptionalIdxVector = 0x21,
}

/// All container kinds in declaration order
pub const CONTAINER_KINDS: [ContainerKind; 6] = [
    ContainerKind::None,
    ContainerKind::OptionalValue,
    ContainerKind::Vector,
    ContainerKind::OptionalVector,
    ContainerKind::IdxVector,
    ContainerKind::OptionalIdxVector,
];

impl ContainerKind {
    /// Numeric id used on the wire and in dispatch hashing
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn is_optional(self) -> bool {
        self.id() & 0x01 != 0
    }

    pub fn is_vector(self) -> bool {
        self.id() & 0x30 != 0
    }

    pub fn is_indexed(self) -> bool {
        self.id() & 0x20 != 0
    }

    /// Canonical container name
    pub fn name(self) -> &'static str {
        match self {
            ContainerKind::None => "none",
            ContainerKind::OptionalValue => "optional_value",
            ContainerKind::Vector => "vector",
            ContainerKind::OptionalVector => "optional_vector",
            ContainerKind::IdxVector => "idx_vector",
            ContainerKind::OptionalIdxVector => "optional_idx_vector",
        }
    }
}

/// The (element kind, container kind) pair uniquely identifying a value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeCombo {
    pub element: ElementKind,
    pub container: ContainerKind,
}

impl TypeCombo {
    pub fn new(element: ElementKind, container: ContainerKind) -> Self {
        Self { element, container }
    }
}

impl std::fmt::Display for TypeCombo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.container == ContainerKind::None {
            write!(f, "{}", self.element.name())
        } else {
            write!(f, "{}<{}>", self.container.name(), self.element.name())
        }
    }
}

/// The canonical type catalog
pub struct TypeCatalog;

impl TypeCatalog {
    /// Look up an element kind by its canonical name.
    ///
    /// Returns the kind with the default container (`None`); callers select
    /// a different container separately.
    pub fn lookup(name: &str) -> Result<(ElementKind, ContainerKind)> {
        ELEMENT_KINDS
            .iter()
            .find(|kind| kind.name() == name)
            .map(|&kind| (kind, ContainerKind::None))
            .ok_or_else(|| PackError::NotFound(format!("unknown element type: {name}")))
    }

    /// Iterate every (element, container) combination in the fixed catalog
    /// order. The sequence is finite and restartable.
    pub fn all_combos() -> impl Iterator<Item = (ElementKind, ContainerKind, TypeCombo)> {
        ELEMENT_KINDS.iter().flat_map(|&element| {
            CONTAINER_KINDS
                .iter()
                .map(move |&container| (element, container, TypeCombo::new(element, container)))
        })
    }

    /// Total number of distinct combos
    pub fn combo_count() -> usize {
        ELEMENT_KINDS.len() * CONTAINER_KINDS.len()
    }
}
