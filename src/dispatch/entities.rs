//! Entity-type dispatch registry
//!
//! Keyed by the dotted `"Package.Version.Item"` type string, hashed with
//! 64-bit FNV-1a. Built once from a validated package: one operation table
//! per concrete entity across every version, which lets a generic factory
//! materialize and (de)serialize any registered entity from a name read off
//! the wire.

use std::sync::Arc;

use tracing::debug;

use crate::error::{PackError, Result};
use crate::package::Package;
use crate::record::{DynamicRecord, FieldSpec};
use crate::schema::{Validation, ValidationFlag, Validator};
use crate::wire::{RecordReader, RecordWriter};

use super::values::ValueRegistry;

/// Operation table for one registered entity type
pub trait EntityOps: Send + Sync {
    /// The dotted type string this table serves
    fn type_name(&self) -> &str;

    /// Materialize a zeroed record of the entity type
    fn new_record(&self) -> Result<DynamicRecord>;

    /// Reset every field to its zero value
    fn clear(&self, record: &mut DynamicRecord) -> Result<()>;

    fn equals(&self, a: &DynamicRecord, b: &DynamicRecord) -> Result<bool>;

    /// Write the record's fields section
    fn write(&self, record: &DynamicRecord, writer: &mut RecordWriter) -> Result<()>;

    /// Read the record's fields section
    fn read(&self, record: &mut DynamicRecord, reader: &mut RecordReader<'_>) -> Result<()>;

    /// Run the entity's validation rules, reporting into `validator`
    fn validate(&self, record: &DynamicRecord, validator: &mut Validator) -> Result<()>;
}

/// Schema-driven ops shared by every registered entity type
struct RecordOps {
    type_name: String,
    fields: Vec<FieldSpec>,
    validations: Vec<Validation>,
    values: Arc<ValueRegistry>,
}

impl RecordOps {
    fn check_type(&self, record: &DynamicRecord) -> Result<()> {
        if record.type_name() != self.type_name {
            return Err(PackError::InvalidParam(format!(
                "record is a {}, expected {}",
                record.type_name(),
                self.type_name
            )));
        }
        Ok(())
    }

    /// A rule variable is "unset" when its value equals the type's zero
    fn is_zero(&self, record: &DynamicRecord, variable: &str) -> Result<bool> {
        let field = record.field(variable).ok_or_else(|| {
            PackError::NotFound(format!(
                "validation references unknown variable \"{variable}\" in {}",
                self.type_name
            ))
        })?;
        let zero = self.values.new_value(field.combo())?;
        self.values.equals(field.combo(), field.value(), &zero)
    }
}

impl EntityOps for RecordOps {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn new_record(&self) -> Result<DynamicRecord> {
        DynamicRecord::from_specs(self.type_name.clone(), &self.fields, &self.values)
    }

    fn clear(&self, record: &mut DynamicRecord) -> Result<()> {
        self.check_type(record)?;
        for field in record.fields_mut() {
            let combo = field.combo();
            self.values.clear(combo, field.value_mut())?;
        }
        Ok(())
    }

    fn equals(&self, a: &DynamicRecord, b: &DynamicRecord) -> Result<bool> {
        self.check_type(a)?;
        self.check_type(b)?;
        for (fa, fb) in a.fields().iter().zip(b.fields()) {
            if !self.values.equals(fa.combo(), fa.value(), fb.value())? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn write(&self, record: &DynamicRecord, writer: &mut RecordWriter) -> Result<()> {
        self.check_type(record)?;
        let section = writer.begin_section("fields")?;
        for field in record.fields() {
            self.values
                .write(field.combo(), field.storage(), writer, field.value())?;
        }
        writer.end_section(section)
    }

    fn read(&self, record: &mut DynamicRecord, reader: &mut RecordReader<'_>) -> Result<()> {
        self.check_type(record)?;
        let Some(section) = reader.begin_section("fields", false)? else {
            return Err(PackError::CantRead("missing fields section".into()));
        };
        for field in record.fields_mut() {
            let combo = field.combo();
            let storage = field.storage().to_string();
            self.values.read(combo, &storage, reader, field.value_mut())?;
        }
        reader.end_section(section)
    }

    fn validate(&self, record: &DynamicRecord, validator: &mut Validator) -> Result<()> {
        self.check_type(record)?;
        for validation in &self.validations {
            match validation {
                Validation::Required { variable } => {
                    if self.is_zero(record, variable)? {
                        validator.report(
                            ValidationFlag::MissingValue,
                            variable.clone(),
                            format!("variable \"{variable}\" must hold a value"),
                        );
                    }
                }
                Validation::NonEmpty { variable } => {
                    if self.is_zero(record, variable)? {
                        validator.report(
                            ValidationFlag::InvalidCount,
                            variable.clone(),
                            format!("variable \"{variable}\" must not be empty"),
                        );
                    }
                }
                Validation::Custom { .. } => {}
            }
        }
        Ok(())
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;

/// 64-bit FNV-1a over the type-string bytes
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// The entity-type dispatch table
pub struct EntityRegistry {
    table: Vec<Option<Box<dyn EntityOps>>>,
    registered: usize,
}

impl EntityRegistry {
    /// Build the table from a validated package: one slot per concrete,
    /// non-deleted entity of every version, inserted in history order.
    pub fn from_package(package: &Package, values: Arc<ValueRegistry>) -> Self {
        let mut entries: Vec<Box<dyn EntityOps>> = Vec::new();
        for (vid, _) in package.versions() {
            for &iid in package.items_of(vid) {
                let item = package.item(iid);
                if !item.is_entity() || !item.is_concrete() {
                    continue;
                }
                let fields = item
                    .variables
                    .iter()
                    .map(|v| FieldSpec {
                        name: v.name.clone(),
                        storage: v.storage().to_string(),
                        combo: v.combo(),
                    })
                    .collect();
                entries.push(Box::new(RecordOps {
                    type_name: package.type_name(iid),
                    fields,
                    validations: item.validations.clone(),
                    values: values.clone(),
                }));
            }
        }

        let size = super::next_prime((entries.len() * 2).max(20));
        let mut table: Vec<Option<Box<dyn EntityOps>>> = (0..size).map(|_| None).collect();
        let registered = entries.len();
        for ops in entries {
            let mut pos = (fnv1a(ops.type_name().as_bytes()) % size as u64) as usize;
            while table[pos].is_some() {
                pos += 1;
                if pos >= size {
                    pos = 0;
                }
            }
            table[pos] = Some(ops);
        }
        debug!(
            package = package.name(),
            entities = registered,
            slots = size,
            "entity dispatch table built"
        );
        Self { table, registered }
    }

    /// Number of registered entity types
    pub fn len(&self) -> usize {
        self.registered
    }

    pub fn is_empty(&self) -> bool {
        self.registered == 0
    }

    /// Probe for an entity type by its dotted type string.
    ///
    /// A miss returns `None`; probing unknown names is a legitimate
    /// compatibility check, not a fault.
    pub fn lookup(&self, type_name: &str) -> Option<&dyn EntityOps> {
        let size = self.table.len();
        let mut pos = (fnv1a(type_name.as_bytes()) % size as u64) as usize;
        while let Some(ops) = &self.table[pos] {
            if ops.type_name() == type_name {
                return Some(ops.as_ref());
            }
            pos += 1;
            if pos >= size {
                pos = 0;
            }
        }
        None
    }

    fn get(&self, type_name: &str) -> Result<&dyn EntityOps> {
        self.lookup(type_name)
            .ok_or_else(|| PackError::NotFound(format!("no entity type registered as {type_name}")))
    }

    /// Materialize a zeroed record from a type string alone
    pub fn new_from_name(&self, type_name: &str) -> Result<DynamicRecord> {
        self.get(type_name)?.new_record()
    }

    /// Write a record with its type tag so the reader can dispatch on it
    pub fn write_entity(&self, record: &DynamicRecord, writer: &mut RecordWriter) -> Result<()> {
        let ops = self.get(record.type_name())?;
        writer.write("type", &record.type_name().to_string())?;
        ops.write(record, writer)
    }

    /// Read the type tag, dispatch, materialize and read the record
    pub fn read_entity(&self, reader: &mut RecordReader<'_>) -> Result<DynamicRecord> {
        let type_name: String = reader.read("type")?;
        let ops = self.get(&type_name)?;
        let mut record = ops.new_record()?;
        ops.read(&mut record, reader)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ContainerKind, ElementKind};
    use crate::package::{PackageDef, VersionDef};
    use crate::schema::Variable;
    use crate::version::Modification;

    fn sample_package() -> Package {
        Package::build(PackageDef {
            name: "Scene".into(),
            path: String::new(),
            versions: vec![VersionDef {
                name: "v1".into(),
                previous: None,
                modifications: vec![
                    Modification::AddEntity {
                        name: "Node".into(),
                        variables: vec![
                            Variable::new("Label", ElementKind::String),
                            Variable::with_container(
                                "Weights",
                                ElementKind::F32,
                                ContainerKind::Vector,
                            ),
                        ],
                        dependencies: vec![],
                        templates: vec![],
                        validations: vec![Validation::Required {
                            variable: "Label".into(),
                        }],
                    },
                    // plain items never enter the entity table
                    Modification::AddItem {
                        name: "Corner".into(),
                        variables: vec![Variable::new("X", ElementKind::F32)],
                        dependencies: vec![],
                        templates: vec![],
                        validations: vec![],
                    },
                ],
            }],
        })
        .unwrap()
    }

    #[test]
    fn test_registry_holds_only_concrete_entities() {
        let package = sample_package();
        let registry = EntityRegistry::from_package(&package, Arc::new(ValueRegistry::new()));
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup("Scene.v1.Node").is_some());
        assert!(registry.lookup("Scene.v1.Corner").is_none());
        assert!(registry.lookup("Scene.v1.Missing").is_none());
    }

    #[test]
    fn test_entity_envelope_round_trip() {
        let package = sample_package();
        let registry = EntityRegistry::from_package(&package, Arc::new(ValueRegistry::new()));

        let mut record = registry.new_from_name("Scene.v1.Node").unwrap();
        record.set("Label", String::from("root")).unwrap();
        record.set("Weights", vec![0.5f32, 0.25]).unwrap();

        let mut writer = RecordWriter::new();
        registry.write_entity(&record, &mut writer).unwrap();
        let bytes = writer.into_bytes().unwrap();

        let mut reader = RecordReader::new(&bytes);
        let back = registry.read_entity(&mut reader).unwrap();
        assert_eq!(back.type_name(), "Scene.v1.Node");
        let ops = registry.lookup("Scene.v1.Node").unwrap();
        assert!(ops.equals(&record, &back).unwrap());
    }

    #[test]
    fn test_clear_and_equals() {
        let package = sample_package();
        let registry = EntityRegistry::from_package(&package, Arc::new(ValueRegistry::new()));
        let ops = registry.lookup("Scene.v1.Node").unwrap();

        let mut record = ops.new_record().unwrap();
        record.set("Label", String::from("x")).unwrap();
        let zero = ops.new_record().unwrap();
        assert!(!ops.equals(&record, &zero).unwrap());
        ops.clear(&mut record).unwrap();
        assert!(ops.equals(&record, &zero).unwrap());
    }

    #[test]
    fn test_validation_reports_missing_value() {
        let package = sample_package();
        let registry = EntityRegistry::from_package(&package, Arc::new(ValueRegistry::new()));
        let ops = registry.lookup("Scene.v1.Node").unwrap();

        let mut record = ops.new_record().unwrap();
        let mut validator = Validator::new();
        ops.validate(&record, &mut validator).unwrap();
        assert!(!validator.is_valid());
        assert_eq!(validator.issues()[0].flag, ValidationFlag::MissingValue);

        record.set("Label", String::from("named")).unwrap();
        let mut validator = Validator::new();
        ops.validate(&record, &mut validator).unwrap();
        assert!(validator.is_valid());
    }

    #[test]
    fn test_wrong_record_type_is_invalid_param() {
        let package = sample_package();
        let registry = EntityRegistry::from_package(&package, Arc::new(ValueRegistry::new()));
        let ops = registry.lookup("Scene.v1.Node").unwrap();

        let values = ValueRegistry::new();
        let mut other = DynamicRecord::from_specs("Other.v1.Thing".into(), &[], &values).unwrap();
        assert!(matches!(
            ops.clear(&mut other),
            Err(PackError::InvalidParam(_))
        ));
    }
}
