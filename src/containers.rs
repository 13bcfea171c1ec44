//! Container value types
//!
//! [`WireValue`] ties a concrete Rust value type to its [`TypeCombo`] and
//! its wire payload encoding. Each element type appears in six shapes: the
//! plain value, `Option<T>`, `Vec<T>`, `Option<Vec<T>>`, [`IdxVec<T>`] and
//! `Option<IdxVec<T>>`. The impls are stamped out by a local macro over the
//! element list, one concrete impl per combination.

use serde::{Deserialize, Serialize};

use crate::catalog::{ContainerKind, ElementKind, TypeCombo};
use crate::element::{ContentDigest, Element, Id, Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};
use crate::error::Result;
use crate::wire::{ReadStream, WriteStream};

/// A vector of values with a sparse u32 index alongside the dense storage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IdxVec<T> {
    index: Vec<u32>,
    values: Vec<T>,
}

impl<T> IdxVec<T> {
    pub fn new() -> Self {
        Self {
            index: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn from_parts(index: Vec<u32>, values: Vec<T>) -> Self {
        Self { index, values }
    }

    pub fn index(&self) -> &[u32] {
        &self.index
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Vec<T> {
        &mut self.values
    }

    pub fn index_mut(&mut self) -> &mut Vec<u32> {
        &mut self.index
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.values.clear();
    }
}

/// A value type that can travel as a wire value block payload
pub trait WireValue: Clone + Default + PartialEq + std::fmt::Debug + Send + 'static {
    /// The type combo identifying this value type
    const COMBO: TypeCombo;

    fn wire_write(&self, stream: &mut WriteStream);

    fn wire_read(stream: &mut ReadStream<'_>) -> Result<Self>;

    /// Reset to the type's zero value
    fn wire_clear(&mut self) {
        *self = Self::default();
    }
}

fn write_vec<E: Element>(values: &[E], stream: &mut WriteStream) {
    stream.write_u32(values.len() as u32);
    for value in values {
        value.write_to(stream);
    }
}

fn read_vec<E: Element>(stream: &mut ReadStream<'_>) -> Result<Vec<E>> {
    let count = stream.read_u32()? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(E::read_from(stream)?);
    }
    Ok(values)
}

fn write_idx_vec<E: Element>(value: &IdxVec<E>, stream: &mut WriteStream) {
    stream.write_u32(value.index.len() as u32);
    for entry in &value.index {
        stream.write_u32(*entry);
    }
    write_vec(&value.values, stream);
}

fn read_idx_vec<E: Element>(stream: &mut ReadStream<'_>) -> Result<IdxVec<E>> {
    let idx_count = stream.read_u32()? as usize;
    let mut index = Vec::with_capacity(idx_count);
    for _ in 0..idx_count {
        index.push(stream.read_u32()?);
    }
    let values = read_vec(stream)?;
    Ok(IdxVec { index, values })
}

fn write_opt<T>(
    value: &Option<T>,
    stream: &mut WriteStream,
    write: impl FnOnce(&T, &mut WriteStream),
) {
    match value {
        Some(inner) => {
            stream.write_u8(1);
            write(inner, stream);
        }
        None => stream.write_u8(0),
    }
}

fn read_opt<T>(
    stream: &mut ReadStream<'_>,
    read: impl FnOnce(&mut ReadStream<'_>) -> Result<T>,
) -> Result<Option<T>> {
    if stream.read_u8()? != 0 {
        Ok(Some(read(stream)?))
    } else {
        Ok(None)
    }
}

macro_rules! impl_wire_value {
    ($($ty:ty => $kind:ident;)*) => {
        $(
            impl WireValue for $ty {
                const COMBO: TypeCombo = TypeCombo {
                    element: ElementKind::$kind,
                    container: ContainerKind::None,
                };

                fn wire_write(&self, stream: &mut WriteStream) {
                    Element::write_to(self, stream);
                }

                fn wire_read(stream: &mut ReadStream<'_>) -> Result<Self> {
                    Element::read_from(stream)
                }
            }

            impl WireValue for Option<$ty> {
                const COMBO: TypeCombo = TypeCombo {
                    element: ElementKind::$kind,
                    container: ContainerKind::OptionalValue,
                };

                fn wire_write(&self, stream: &mut WriteStream) {
                    write_opt(self, stream, Element::write_to);
                }

                fn wire_read(stream: &mut ReadStream<'_>) -> Result<Self> {
                    read_opt(stream, Element::read_from)
                }
            }

            impl WireValue for Vec<$ty> {
                const COMBO: TypeCombo = TypeCombo {
                    element: ElementKind::$kind,
                    container: ContainerKind::Vector,
                };

                fn wire_write(&self, stream: &mut WriteStream) {
                    write_vec(self, stream);
                }

                fn wire_read(stream: &mut ReadStream<'_>) -> Result<Self> {
                    read_vec(stream)
                }
            }

            impl WireValue for Option<Vec<$ty>> {
                const COMBO: TypeCombo = TypeCombo {
                    element: ElementKind::$kind,
                    container: ContainerKind::OptionalVector,
                };

                fn wire_write(&self, stream: &mut WriteStream) {
                    write_opt(self, stream, |v, s| write_vec(v, s));
                }

                fn wire_read(stream: &mut ReadStream<'_>) -> Result<Self> {
                    read_opt(stream, read_vec)
                }
            }

            impl WireValue for IdxVec<$ty> {
                const COMBO: TypeCombo = TypeCombo {
                    element: ElementKind::$kind,
                    container: ContainerKind::IdxVector,
                };

                fn wire_write(&self, stream: &mut WriteStream) {
                    write_idx_vec(self, stream);
                }

                fn wire_read(stream: &mut ReadStream<'_>) -> Result<Self> {
                    read_idx_vec(stream)
                }
            }

            impl WireValue for Option<IdxVec<$ty>> {
                const COMBO: TypeCombo = TypeCombo {
                    element: ElementKind::$kind,
                    container: ContainerKind::OptionalIdxVector,
                };

                fn wire_write(&self, stream: &mut WriteStream) {
                    write_opt(self, stream, |v, s| write_idx_vec(v, s));
                }

                fn wire_read(stream: &mut ReadStream<'_>) -> Result<Self> {
                    read_opt(stream, read_idx_vec)
                }
            }
        )*
    };
}

impl_wire_value! {
    bool => Bool;
    i8 => I8;
    i16 => I16;
    i32 => I32;
    i64 => I64;
    u8 => U8;
    u16 => U16;
    u32 => U32;
    u64 => U64;
    f32 => F32;
    f64 => F64;
    Vec2 => Vec2;
    Vec3 => Vec3;
    Vec4 => Vec4;
    Mat2 => Mat2;
    Mat3 => Mat3;
    Mat4 => Mat4;
    Id => Id;
    ContentDigest => Digest;
    String => String;
}
