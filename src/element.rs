//! Element value types
//!
//! The Rust value types backing each [`ElementKind`], plus the [`Element`]
//! trait tying a value type to its kind tag, its zero/inf/sup sentinels and
//! its little-endian stream encoding. Vectors and square matrices are flat
//! arrays of their item type; `Id` is 16 raw bytes, `Digest` a 32-byte
//! SHA-256 value, strings length-prefixed UTF-8.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

use crate::catalog::ElementKind;
use crate::error::{PackError, Result};
use crate::wire::{ReadStream, WriteStream};

/// A serializable element value with a stable kind tag
pub trait Element: Clone + Default + PartialEq + fmt::Debug + 'static {
    /// The catalog kind of this value type
    const KIND: ElementKind;

    /// The zero value of the type
    fn zero() -> Self {
        Self::default()
    }

    /// Limit inferior (minimum possible value)
    fn inf() -> Self;

    /// Limit superior (maximum possible value)
    fn sup() -> Self;

    fn write_to(&self, stream: &mut WriteStream);

    fn read_from(stream: &mut ReadStream<'_>) -> Result<Self>;
}

macro_rules! impl_scalar_element {
    ($($ty:ty => $kind:ident, $write:ident, $read:ident;)*) => {
        $(
            impl Element for $ty {
                const KIND: ElementKind = ElementKind::$kind;

                fn inf() -> Self {
                    <$ty>::MIN
                }

                fn sup() -> Self {
                    <$ty>::MAX
                }

                fn write_to(&self, stream: &mut WriteStream) {
                    stream.$write(*self);
                }

                fn read_from(stream: &mut ReadStream<'_>) -> Result<Self> {
                    stream.$read()
                }
            }
        )*
    };
}

impl_scalar_element! {
    i8 => I8, write_i8, read_i8;
    i16 => I16, write_i16, read_i16;
    i32 => I32, write_i32, read_i32;
    i64 => I64, write_i64, read_i64;
    u8 => U8, write_u8, read_u8;
    u16 => U16, write_u16, read_u16;
    u32 => U32, write_u32, read_u32;
    u64 => U64, write_u64, read_u64;
}

impl Element for bool {
    const KIND: ElementKind = ElementKind::Bool;

    fn inf() -> Self {
        false
    }

    fn sup() -> Self {
        true
    }

    fn write_to(&self, stream: &mut WriteStream) {
        stream.write_u8(u8::from(*self));
    }

    fn read_from(stream: &mut ReadStream<'_>) -> Result<Self> {
        Ok(stream.read_u8()? != 0)
    }
}

impl Element for f32 {
    const KIND: ElementKind = ElementKind::F32;

    fn inf() -> Self {
        -f32::MAX
    }

    fn sup() -> Self {
        f32::MAX
    }

    fn write_to(&self, stream: &mut WriteStream) {
        stream.write_f32(*self);
    }

    fn read_from(stream: &mut ReadStream<'_>) -> Result<Self> {
        stream.read_f32()
    }
}

impl Element for f64 {
    const KIND: ElementKind = ElementKind::F64;

    fn inf() -> Self {
        -f64::MAX
    }

    fn sup() -> Self {
        f64::MAX
    }

    fn write_to(&self, stream: &mut WriteStream) {
        stream.write_f64(*self);
    }

    fn read_from(stream: &mut ReadStream<'_>) -> Result<Self> {
        stream.read_f64()
    }
}

macro_rules! impl_f32_array_element {
    ($($name:ident([f32; $n:literal]) => $kind:ident;)*) => {
        $(
            /// Flat array of f32 items
            #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
            pub struct $name(pub [f32; $n]);

            impl Element for $name {
                const KIND: ElementKind = ElementKind::$kind;

                fn inf() -> Self {
                    Self([-f32::MAX; $n])
                }

                fn sup() -> Self {
                    Self([f32::MAX; $n])
                }

                fn write_to(&self, stream: &mut WriteStream) {
                    for item in &self.0 {
                        stream.write_f32(*item);
                    }
                }

                fn read_from(stream: &mut ReadStream<'_>) -> Result<Self> {
                    let mut items = [0.0f32; $n];
                    for item in &mut items {
                        *item = stream.read_f32()?;
                    }
                    Ok(Self(items))
                }
            }

            impl From<[f32; $n]> for $name {
                fn from(items: [f32; $n]) -> Self {
                    Self(items)
                }
            }
        )*
    };
}

impl_f32_array_element! {
    Vec2([f32; 2]) => Vec2;
    Vec3([f32; 3]) => Vec3;
    Vec4([f32; 4]) => Vec4;
    Mat2([f32; 4]) => Mat2;
    Mat3([f32; 9]) => Mat3;
    Mat4([f32; 16]) => Mat4;
}

/// 16-byte opaque identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Id(pub [u8; 16]);

impl Element for Id {
    const KIND: ElementKind = ElementKind::Id;

    fn inf() -> Self {
        Self([0x00; 16])
    }

    fn sup() -> Self {
        Self([0xFF; 16])
    }

    fn write_to(&self, stream: &mut WriteStream) {
        stream.write_bytes(&self.0);
    }

    fn read_from(stream: &mut ReadStream<'_>) -> Result<Self> {
        let bytes = stream.read_bytes(16)?;
        let mut id = [0u8; 16];
        id.copy_from_slice(bytes);
        Ok(Self(id))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// 32-byte SHA-256 digest value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(pub [u8; 32]);

impl ContentDigest {
    /// Compute the digest of raw bytes
    pub fn of(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        Self(bytes)
    }
}

impl Default for ContentDigest {
    fn default() -> Self {
        Self([0u8; 32])
    }
}

impl Element for ContentDigest {
    const KIND: ElementKind = ElementKind::Digest;

    fn inf() -> Self {
        Self([0x00; 32])
    }

    fn sup() -> Self {
        Self([0xFF; 32])
    }

    fn write_to(&self, stream: &mut WriteStream) {
        stream.write_bytes(&self.0);
    }

    fn read_from(stream: &mut ReadStream<'_>) -> Result<Self> {
        let bytes = stream.read_bytes(32)?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(bytes);
        Ok(Self(digest))
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Element for String {
    const KIND: ElementKind = ElementKind::String;

    // strings have no meaningful bounds; both sentinels are the empty string
    fn inf() -> Self {
        String::new()
    }

    fn sup() -> Self {
        String::new()
    }

    fn write_to(&self, stream: &mut WriteStream) {
        stream.write_u32(self.len() as u32);
        stream.write_bytes(self.as_bytes());
    }

    fn read_from(stream: &mut ReadStream<'_>) -> Result<Self> {
        let len = stream.read_u32()? as usize;
        let bytes = stream.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| PackError::CantRead(format!("invalid UTF-8 in string value: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: Element>(value: T) -> T {
        let mut w = WriteStream::new();
        value.write_to(&mut w);
        let bytes = w.into_bytes();
        let mut r = ReadStream::new(&bytes);
        let back = T::read_from(&mut r).unwrap();
        assert_eq!(r.position(), r.size());
        back
    }

    #[test]
    fn test_scalar_round_trips() {
        assert_eq!(round_trip(true), true);
        assert_eq!(round_trip(-7i8), -7);
        assert_eq!(round_trip(i64::MIN), i64::MIN);
        assert_eq!(round_trip(u64::MAX), u64::MAX);
        assert_eq!(round_trip(3.25f32), 3.25);
        assert_eq!(round_trip(-2.5f64), -2.5);
    }

    #[test]
    fn test_compound_round_trips() {
        assert_eq!(round_trip(Vec3([1.0, -2.0, 0.5])), Vec3([1.0, -2.0, 0.5]));
        assert_eq!(round_trip(Mat2::sup()), Mat2::sup());
        assert_eq!(round_trip(Id([9u8; 16])), Id([9u8; 16]));
        assert_eq!(round_trip(ContentDigest::of(b"payload")), ContentDigest::of(b"payload"));
        assert_eq!(round_trip(String::from("åäö")), "åäö");
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(bool::zero(), false);
        assert_eq!(i16::inf(), i16::MIN);
        assert_eq!(u32::inf(), 0);
        assert_eq!(f32::inf(), -f32::MAX);
        assert_eq!(Id::sup(), Id([0xFF; 16]));
        assert_eq!(String::zero(), "");
    }

    #[test]
    fn test_digest_of_is_stable() {
        assert_eq!(ContentDigest::of(b"abc"), ContentDigest::of(b"abc"));
        assert_ne!(ContentDigest::of(b"abc"), ContentDigest::of(b"abd"));
    }

    #[test]
    fn test_invalid_string_bytes_fail() {
        let mut w = WriteStream::new();
        w.write_u32(2);
        w.write_bytes(&[0xFF, 0xFE]);
        let bytes = w.into_bytes();
        let mut r = ReadStream::new(&bytes);
        assert!(matches!(String::read_from(&mut r), Err(PackError::CantRead(_))));
    }
}
