//! Dynamically typed records
//!
//! A [`DynamicRecord`] is a runtime instance of an item schema: the dotted
//! type string plus one dispatch-managed value per variable. Records are
//! materialized from a validated package and operated on through the
//! dispatch registries, so no compile-time knowledge of the concrete item
//! type is needed anywhere.

use std::any::Any;

use crate::catalog::TypeCombo;
use crate::dispatch::{ValueHandle, ValueRegistry};
use crate::error::{PackError, Result};
use crate::package::Package;
use crate::schema::ItemId;

/// Field layout of one variable, independent of any package lifetime
#[derive(Debug, Clone)]
pub(crate) struct FieldSpec {
    pub name: String,
    pub storage: String,
    pub combo: TypeCombo,
}

/// One field of a dynamic record
#[derive(Debug)]
pub struct Field {
    name: String,
    storage: String,
    combo: TypeCombo,
    value: ValueHandle,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wire key the field is stored under
    pub fn storage(&self) -> &str {
        &self.storage
    }

    pub fn combo(&self) -> TypeCombo {
        self.combo
    }

    pub fn value(&self) -> &ValueHandle {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut ValueHandle {
        &mut self.value
    }
}

/// A runtime instance of an item schema
#[derive(Debug)]
pub struct DynamicRecord {
    type_name: String,
    fields: Vec<Field>,
}

impl DynamicRecord {
    pub(crate) fn from_specs(
        type_name: String,
        specs: &[FieldSpec],
        values: &ValueRegistry,
    ) -> Result<Self> {
        let mut fields = Vec::with_capacity(specs.len());
        for spec in specs {
            fields.push(Field {
                name: spec.name.clone(),
                storage: spec.storage.clone(),
                combo: spec.combo,
                value: values.new_value(spec.combo)?,
            });
        }
        Ok(Self { type_name, fields })
    }

    /// Materialize a zeroed record for an item.
    ///
    /// Aliasing carry-overs resolve to their concrete implementing item;
    /// the record carries that item's type string and variables.
    pub fn for_item(package: &Package, item: ItemId, values: &ValueRegistry) -> Result<Self> {
        let implementing =
            package
                .item(item)
                .implementing
                .ok_or_else(|| PackError::InvalidParam(format!(
                    "item {} has no concrete implementation to instantiate",
                    package.item(item).name
                )))?;
        let concrete = package.item(implementing);
        let specs: Vec<FieldSpec> = concrete
            .variables
            .iter()
            .map(|v| FieldSpec {
                name: v.name.clone(),
                storage: v.storage().to_string(),
                combo: v.combo(),
            })
            .collect();
        Self::from_specs(package.type_name(implementing), &specs, values)
    }

    /// The dotted `"Package.Version.Item"` type string
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut [Field] {
        &mut self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub(crate) fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// Borrow a field's value as its concrete type
    pub fn get<T: Any>(&self, name: &str) -> Result<&T> {
        let field = self
            .field(name)
            .ok_or_else(|| PackError::NotFound(format!(
                "no field \"{name}\" in record {}",
                self.type_name
            )))?;
        field.value.downcast_ref::<T>().ok_or_else(|| {
            PackError::InvalidParam(format!(
                "field \"{name}\" of {} is a {}, not the requested type",
                self.type_name,
                field.combo
            ))
        })
    }

    /// Replace a field's value; the concrete type must match the field's
    /// registered value type
    pub fn set<T: Any + Send>(&mut self, name: &str, value: T) -> Result<()> {
        let type_name = self.type_name.clone();
        let field = self
            .field_mut(name)
            .ok_or_else(|| PackError::NotFound(format!(
                "no field \"{name}\" in record {type_name}"
            )))?;
        let combo = field.combo;
        let slot = field.value.downcast_mut::<T>().ok_or_else(|| {
            PackError::InvalidParam(format!(
                "field \"{name}\" of {type_name} is a {combo}, not the supplied type"
            ))
        })?;
        *slot = value;
        Ok(())
    }
}
