//! Value-type dispatch registry
//!
//! One operation table per registered (element, container) combo, reachable
//! from the runtime [`TypeCombo`] alone. Slot placement is a pure function
//! of the catalog enumeration order: insertion follows
//! [`TypeCatalog::all_combos`] and linear probing claims the first empty
//! slot upward from the hash position.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use tracing::debug;

use crate::catalog::{TypeCatalog, TypeCombo};
use crate::containers::{IdxVec, WireValue};
use crate::element::{ContentDigest, Id, Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};
use crate::error::{PackError, Result};
use crate::wire::{RecordReader, RecordWriter};

/// Opaque handle to a heap-allocated value of a registered type.
///
/// Dropping the handle releases the value.
pub struct ValueHandle(Box<dyn Any + Send>);

impl ValueHandle {
    fn new<T: Any + Send>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.0.downcast_mut()
    }
}

impl fmt::Debug for ValueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueHandle(..)")
    }
}

/// Operation table for one registered value type
pub trait ValueOps: Send + Sync {
    /// The combo this table serves
    fn combo(&self) -> TypeCombo;

    /// Allocate a zero value of the concrete type
    fn new_value(&self) -> ValueHandle;

    /// Reset the value to the type's zero
    fn clear(&self, value: &mut ValueHandle) -> Result<()>;

    /// Write the value as one keyed value block
    fn write(&self, key: &str, writer: &mut RecordWriter, value: &ValueHandle) -> Result<()>;

    /// Read the value from one keyed value block
    fn read(&self, key: &str, reader: &mut RecordReader<'_>, value: &mut ValueHandle)
        -> Result<()>;

    /// Copy `src` over `dst`
    fn copy(&self, dst: &mut ValueHandle, src: &ValueHandle) -> Result<()>;

    fn equals(&self, a: &ValueHandle, b: &ValueHandle) -> Result<bool>;
}

struct ComboOps<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V> ComboOps<V> {
    fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

fn expect<V: WireValue>(value: &ValueHandle) -> Result<&V> {
    value.downcast_ref::<V>().ok_or_else(|| {
        PackError::InvalidParam(format!("handle does not hold a value of type {}", V::COMBO))
    })
}

fn expect_mut<V: WireValue>(value: &mut ValueHandle) -> Result<&mut V> {
    value.downcast_mut::<V>().ok_or_else(|| {
        PackError::InvalidParam(format!("handle does not hold a value of type {}", V::COMBO))
    })
}

impl<V: WireValue> ValueOps for ComboOps<V> {
    fn combo(&self) -> TypeCombo {
        V::COMBO
    }

    fn new_value(&self) -> ValueHandle {
        ValueHandle::new(V::default())
    }

    fn clear(&self, value: &mut ValueHandle) -> Result<()> {
        expect_mut::<V>(value)?.wire_clear();
        Ok(())
    }

    fn write(&self, key: &str, writer: &mut RecordWriter, value: &ValueHandle) -> Result<()> {
        writer.write(key, expect::<V>(value)?)
    }

    fn read(
        &self,
        key: &str,
        reader: &mut RecordReader<'_>,
        value: &mut ValueHandle,
    ) -> Result<()> {
        *expect_mut::<V>(value)? = reader.read(key)?;
        Ok(())
    }

    fn copy(&self, dst: &mut ValueHandle, src: &ValueHandle) -> Result<()> {
        let src = expect::<V>(src)?.clone();
        *expect_mut::<V>(dst)? = src;
        Ok(())
    }

    fn equals(&self, a: &ValueHandle, b: &ValueHandle) -> Result<bool> {
        Ok(expect::<V>(a)? == expect::<V>(b)?)
    }
}

fn push_element_ops<E>(out: &mut Vec<Box<dyn ValueOps>>)
where
    E: WireValue,
    Option<E>: WireValue,
    Vec<E>: WireValue,
    Option<Vec<E>>: WireValue,
    IdxVec<E>: WireValue,
    Option<IdxVec<E>>: WireValue,
{
    out.push(Box::new(ComboOps::<E>::new()));
    out.push(Box::new(ComboOps::<Option<E>>::new()));
    out.push(Box::new(ComboOps::<Vec<E>>::new()));
    out.push(Box::new(ComboOps::<Option<Vec<E>>>::new()));
    out.push(Box::new(ComboOps::<IdxVec<E>>::new()));
    out.push(Box::new(ComboOps::<Option<IdxVec<E>>>::new()));
}

const HASH_ELEMENT_MULT: usize = 109;
const HASH_CONTAINER_MULT: usize = 991;
/// Table size factor keeping the load under ~17% to bound probe length
const TABLE_SIZE_FACTOR: usize = 6;

/// The value-type dispatch table
pub struct ValueRegistry {
    table: Vec<Option<Box<dyn ValueOps>>>,
    registered: usize,
}

impl ValueRegistry {
    /// Build the table from the full catalog enumeration.
    ///
    /// Final slot assignment is a pure function of the enumeration order.
    pub fn new() -> Self {
        let mut entries: Vec<Box<dyn ValueOps>> = Vec::new();
        push_element_ops::<bool>(&mut entries);
        push_element_ops::<i8>(&mut entries);
        push_element_ops::<i16>(&mut entries);
        push_element_ops::<i32>(&mut entries);
        push_element_ops::<i64>(&mut entries);
        push_element_ops::<u8>(&mut entries);
        push_element_ops::<u16>(&mut entries);
        push_element_ops::<u32>(&mut entries);
        push_element_ops::<u64>(&mut entries);
        push_element_ops::<f32>(&mut entries);
        push_element_ops::<f64>(&mut entries);
        push_element_ops::<Vec2>(&mut entries);
        push_element_ops::<Vec3>(&mut entries);
        push_element_ops::<Vec4>(&mut entries);
        push_element_ops::<Mat2>(&mut entries);
        push_element_ops::<Mat3>(&mut entries);
        push_element_ops::<Mat4>(&mut entries);
        push_element_ops::<Id>(&mut entries);
        push_element_ops::<ContentDigest>(&mut entries);
        push_element_ops::<String>(&mut entries);

        debug_assert_eq!(entries.len(), TypeCatalog::combo_count());
        debug_assert!(entries
            .iter()
            .zip(TypeCatalog::all_combos())
            .all(|(ops, (_, _, combo))| ops.combo() == combo));

        let size = super::next_prime(entries.len() * TABLE_SIZE_FACTOR);
        let mut table: Vec<Option<Box<dyn ValueOps>>> = (0..size).map(|_| None).collect();
        let registered = entries.len();
        for ops in entries {
            let mut pos = Self::hash(ops.combo(), size);
            while table[pos].is_some() {
                pos += 1;
                if pos >= size {
                    pos = 0;
                }
            }
            table[pos] = Some(ops);
        }
        debug!(combos = registered, slots = size, "value dispatch table built");
        Self { table, registered }
    }

    fn hash(combo: TypeCombo, size: usize) -> usize {
        (combo.element.id() as usize * HASH_ELEMENT_MULT
            + combo.container.id() as usize * HASH_CONTAINER_MULT)
            % size
    }

    /// Number of registered combos
    pub fn len(&self) -> usize {
        self.registered
    }

    pub fn is_empty(&self) -> bool {
        self.registered == 0
    }

    /// Probe for the operation table of a combo.
    ///
    /// A miss returns `None`; probing for unknown combos is a legitimate
    /// compatibility check, not a fault.
    pub fn lookup(&self, combo: TypeCombo) -> Option<&dyn ValueOps> {
        let size = self.table.len();
        let mut pos = Self::hash(combo, size);
        while let Some(ops) = &self.table[pos] {
            if ops.combo() == combo {
                return Some(ops.as_ref());
            }
            pos += 1;
            if pos >= size {
                pos = 0;
            }
        }
        None
    }

    fn get(&self, combo: TypeCombo) -> Result<&dyn ValueOps> {
        self.lookup(combo)
            .ok_or_else(|| PackError::NotFound(format!("no value type registered for {combo}")))
    }

    pub fn new_value(&self, combo: TypeCombo) -> Result<ValueHandle> {
        Ok(self.get(combo)?.new_value())
    }

    pub fn clear(&self, combo: TypeCombo, value: &mut ValueHandle) -> Result<()> {
        self.get(combo)?.clear(value)
    }

    pub fn write(
        &self,
        combo: TypeCombo,
        key: &str,
        writer: &mut RecordWriter,
        value: &ValueHandle,
    ) -> Result<()> {
        self.get(combo)?.write(key, writer, value)
    }

    pub fn read(
        &self,
        combo: TypeCombo,
        key: &str,
        reader: &mut RecordReader<'_>,
        value: &mut ValueHandle,
    ) -> Result<()> {
        self.get(combo)?.read(key, reader, value)
    }

    pub fn copy(&self, combo: TypeCombo, dst: &mut ValueHandle, src: &ValueHandle) -> Result<()> {
        self.get(combo)?.copy(dst, src)
    }

    pub fn equals(&self, combo: TypeCombo, a: &ValueHandle, b: &ValueHandle) -> Result<bool> {
        self.get(combo)?.equals(a, b)
    }
}

impl Default for ValueRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ContainerKind, ElementKind};

    #[test]
    fn test_every_combo_is_found() {
        let registry = ValueRegistry::new();
        assert_eq!(registry.len(), TypeCatalog::combo_count());
        for (_, _, combo) in TypeCatalog::all_combos() {
            assert!(registry.lookup(combo).is_some(), "combo {combo} not found");
            assert_eq!(registry.lookup(combo).unwrap().combo(), combo);
        }
    }

    #[test]
    fn test_load_factor_is_bounded() {
        let registry = ValueRegistry::new();
        let load = registry.len() as f64 / registry.table.len() as f64;
        assert!(load < 0.2, "load factor {load} too high");
    }

    #[test]
    fn test_dispatch_identity() {
        let registry = ValueRegistry::new();
        for (_, _, combo) in TypeCatalog::all_combos() {
            let mut a = registry.new_value(combo).unwrap();
            let b = registry.new_value(combo).unwrap();
            // a fresh value equals a cleared one
            registry.clear(combo, &mut a).unwrap();
            assert!(registry.equals(combo, &a, &b).unwrap(), "combo {combo}");
        }
    }

    #[test]
    fn test_copy_and_clear_through_dispatch() {
        let registry = ValueRegistry::new();
        let combo = TypeCombo::new(ElementKind::String, ContainerKind::Vector);

        let mut src = registry.new_value(combo).unwrap();
        src.downcast_mut::<Vec<String>>()
            .unwrap()
            .push(String::from("alpha"));

        let mut dst = registry.new_value(combo).unwrap();
        assert!(!registry.equals(combo, &dst, &src).unwrap());
        registry.copy(combo, &mut dst, &src).unwrap();
        assert!(registry.equals(combo, &dst, &src).unwrap());

        registry.clear(combo, &mut src).unwrap();
        let zero = registry.new_value(combo).unwrap();
        assert!(registry.equals(combo, &src, &zero).unwrap());
    }

    #[test]
    fn test_wrong_handle_type_is_invalid_param() {
        let registry = ValueRegistry::new();
        let combo_u32 = TypeCombo::new(ElementKind::U32, ContainerKind::None);
        let combo_str = TypeCombo::new(ElementKind::String, ContainerKind::None);

        let mut wrong = registry.new_value(combo_str).unwrap();
        assert!(matches!(
            registry.clear(combo_u32, &mut wrong),
            Err(PackError::InvalidParam(_))
        ));
    }

    #[test]
    fn test_dispatch_write_read_round_trip() {
        let registry = ValueRegistry::new();
        let combo = TypeCombo::new(ElementKind::I64, ContainerKind::OptionalValue);

        let mut value = registry.new_value(combo).unwrap();
        *value.downcast_mut::<Option<i64>>().unwrap() = Some(-99);

        let mut writer = RecordWriter::new();
        registry.write(combo, "field", &mut writer, &value).unwrap();
        let bytes = writer.into_bytes().unwrap();

        let mut back = registry.new_value(combo).unwrap();
        let mut reader = RecordReader::new(&bytes);
        registry.read(combo, "field", &mut reader, &mut back).unwrap();
        assert!(registry.equals(combo, &value, &back).unwrap());
    }
}
