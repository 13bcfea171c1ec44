//! Record migration between adjacent versions
//!
//! Conversions are derived purely from a modified item's mapping list: a
//! carry-over (or rename) copies the value across, a new variable is zeroed
//! going forward and omitted going back, a deleted variable is skipped in
//! both directions, and a custom mapping runs its caller-supplied closure.
//! No global state is involved; the package and value registry are threaded
//! explicitly.

use crate::dispatch::ValueRegistry;
use crate::error::{PackError, Result};
use crate::package::Package;
use crate::record::DynamicRecord;
use crate::schema::{ItemId, Mapping};

/// Derives forward/backward conversions for modified items of one package
pub struct Migrator<'a> {
    package: &'a Package,
    values: &'a ValueRegistry,
}

impl<'a> Migrator<'a> {
    pub fn new(package: &'a Package, values: &'a ValueRegistry) -> Self {
        Self { package, values }
    }

    /// Convert a previous-version record into an `item` record.
    ///
    /// Carried-over variables copy across, new ones are left at zero.
    pub fn from_previous(&self, item: ItemId, previous: &DynamicRecord) -> Result<DynamicRecord> {
        let current = self.package.item(item);
        if !current.is_modified() {
            return Err(PackError::InvalidParam(format!(
                "item {} is not a modified version; there is nothing to convert",
                current.name
            )));
        }
        self.check_record_type(current.previous, previous)?;

        let mut record = DynamicRecord::for_item(self.package, item, self.values)?;
        for mapping in &current.mappings {
            match mapping {
                Mapping::Same {
                    name,
                    previous: previous_name,
                } => self.copy_field(previous, previous_name, &mut record, name)?,
                Mapping::New { .. } => {}
                Mapping::Deleted { .. } => {}
                Mapping::Custom { convert, .. } => {
                    if let Some(convert) = &convert.from_previous {
                        convert(previous, &mut record)?;
                    }
                }
            }
        }
        Ok(record)
    }

    /// Convert an `item` record back into its previous version.
    ///
    /// Variables new in `item` have no backward counterpart and are
    /// omitted.
    pub fn to_previous(&self, item: ItemId, current: &DynamicRecord) -> Result<DynamicRecord> {
        let item_ref = self.package.item(item);
        if !item_ref.is_modified() {
            return Err(PackError::InvalidParam(format!(
                "item {} is not a modified version; there is nothing to convert",
                item_ref.name
            )));
        }
        if current.type_name() != self.package.type_name(item) {
            return Err(PackError::InvalidParam(format!(
                "record is a {}, expected {}",
                current.type_name(),
                self.package.type_name(item)
            )));
        }
        let previous_id = item_ref.previous.ok_or_else(|| PackError::InvalidParam(format!(
            "item {} has no previous version",
            item_ref.name
        )))?;

        let mut record = DynamicRecord::for_item(self.package, previous_id, self.values)?;
        for mapping in &item_ref.mappings {
            match mapping {
                Mapping::Same {
                    name,
                    previous: previous_name,
                } => self.copy_field(current, name, &mut record, previous_name)?,
                Mapping::New { .. } => {}
                Mapping::Deleted { .. } => {}
                Mapping::Custom { convert, .. } => {
                    if let Some(convert) = &convert.to_previous {
                        convert(current, &mut record)?;
                    }
                }
            }
        }
        Ok(record)
    }

    fn check_record_type(
        &self,
        expected_item: Option<ItemId>,
        record: &DynamicRecord,
    ) -> Result<()> {
        let Some(expected_item) = expected_item else {
            return Err(PackError::InvalidParam(
                "modified item has no previous version".into(),
            ));
        };
        let Some(implementing) = self.package.item(expected_item).implementing else {
            return Err(PackError::InvalidParam(
                "previous item has no concrete implementation".into(),
            ));
        };
        let expected = self.package.type_name(implementing);
        if record.type_name() != expected {
            return Err(PackError::InvalidParam(format!(
                "record is a {}, expected {expected}",
                record.type_name()
            )));
        }
        Ok(())
    }

    /// Copy one variable across; the variable must keep its value type
    /// between the two versions (use a custom mapping otherwise)
    fn copy_field(
        &self,
        src: &DynamicRecord,
        src_name: &str,
        dst: &mut DynamicRecord,
        dst_name: &str,
    ) -> Result<()> {
        let src_field = src.field(src_name).ok_or_else(|| {
            PackError::NotFound(format!(
                "mapping references missing variable \"{src_name}\" in {}",
                src.type_name()
            ))
        })?;
        let dst_type = dst.type_name().to_string();
        let dst_field = dst.field_mut(dst_name).ok_or_else(|| {
            PackError::NotFound(format!(
                "mapping references missing variable \"{dst_name}\" in {dst_type}"
            ))
        })?;
        if src_field.combo() != dst_field.combo() {
            return Err(PackError::InvalidParam(format!(
                "variable \"{dst_name}\" changed type from {} to {}; a custom mapping is required",
                src_field.combo(),
                dst_field.combo()
            )));
        }
        self.values
            .copy(src_field.combo(), dst_field.value_mut(), src_field.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ElementKind;
    use crate::package::{PackageDef, VersionDef};
    use crate::schema::Variable;
    use crate::version::Modification;

    fn modify_entity(name: &str) -> Modification {
        Modification::ModifyEntity {
            name: name.into(),
            add_variables: vec![],
            remove_variables: vec![],
            rename_variables: vec![],
            add_dependencies: vec![],
            remove_dependencies: vec![],
            add_templates: vec![],
            remove_templates: vec![],
            add_validations: vec![],
            remove_validations: vec![],
            mappings: vec![],
        }
    }

    fn age_name_package() -> Package {
        let mut v2_mod = modify_entity("E");
        if let Modification::ModifyEntity { add_variables, .. } = &mut v2_mod {
            add_variables.push(Variable::new("Name", ElementKind::String));
        }
        Package::build(PackageDef {
            name: "Pack".into(),
            path: String::new(),
            versions: vec![
                VersionDef {
                    name: "v1".into(),
                    previous: None,
                    modifications: vec![Modification::AddEntity {
                        name: "E".into(),
                        variables: vec![Variable::new("Age", ElementKind::U32)],
                        dependencies: vec![],
                        templates: vec![],
                        validations: vec![],
                    }],
                },
                VersionDef {
                    name: "v2".into(),
                    previous: Some("v1".into()),
                    modifications: vec![v2_mod],
                },
            ],
        })
        .unwrap()
    }

    #[test]
    fn test_new_variable_is_zeroed_forward_and_dropped_backward() {
        let package = age_name_package();
        let values = ValueRegistry::new();
        let migrator = Migrator::new(&package, &values);

        let v2 = package.find_version("v2").unwrap();
        let item = package.find_item(v2, "E").unwrap();

        let v1_item = package.find_item(package.find_version("v1").unwrap(), "E").unwrap();
        let mut old = DynamicRecord::for_item(&package, v1_item, &values).unwrap();
        old.set("Age", 5u32).unwrap();

        let new = migrator.from_previous(item, &old).unwrap();
        assert_eq!(*new.get::<u32>("Age").unwrap(), 5);
        assert_eq!(*new.get::<String>("Name").unwrap(), "");

        let mut current = DynamicRecord::for_item(&package, item, &values).unwrap();
        current.set("Age", 9u32).unwrap();
        current.set("Name", String::from("dropped")).unwrap();
        let back = migrator.to_previous(item, &current).unwrap();
        assert_eq!(*back.get::<u32>("Age").unwrap(), 9);
        assert!(back.field("Name").is_none());
    }

    #[test]
    fn test_unmodified_item_cannot_migrate() {
        let package = age_name_package();
        let values = ValueRegistry::new();
        let migrator = Migrator::new(&package, &values);

        let v1 = package.find_version("v1").unwrap();
        let item = package.find_item(v1, "E").unwrap();
        let record = DynamicRecord::for_item(&package, item, &values).unwrap();
        assert!(matches!(
            migrator.from_previous(item, &record),
            Err(PackError::InvalidParam(_))
        ));
    }

    #[test]
    fn test_record_of_wrong_version_is_rejected() {
        let package = age_name_package();
        let values = ValueRegistry::new();
        let migrator = Migrator::new(&package, &values);

        let v2 = package.find_version("v2").unwrap();
        let item = package.find_item(v2, "E").unwrap();
        // a v2 record is not a valid previous-version input
        let wrong = DynamicRecord::for_item(&package, item, &values).unwrap();
        assert!(matches!(
            migrator.from_previous(item, &wrong),
            Err(PackError::InvalidParam(_))
        ));
    }

    #[test]
    fn test_custom_mapping_runs() {
        use crate::schema::{CustomMapping, Mapping};
        use std::sync::Arc;

        // Height changes representation from u32 centimeters to f64 meters
        let mut v2_mod = modify_entity("E");
        if let Modification::ModifyEntity {
            add_variables,
            remove_variables,
            mappings,
            ..
        } = &mut v2_mod
        {
            add_variables.push(Variable::new("Meters", ElementKind::F64));
            remove_variables.push("Centimeters".into());
            mappings.push(Mapping::Custom {
                name: "Meters".into(),
                convert: CustomMapping {
                    from_previous: Some(Arc::new(|prev, cur| {
                        let cm = *prev.get::<u32>("Centimeters")?;
                        cur.set("Meters", f64::from(cm) / 100.0)
                    })),
                    to_previous: Some(Arc::new(|cur, prev| {
                        let m = *cur.get::<f64>("Meters")?;
                        prev.set("Centimeters", (m * 100.0) as u32)
                    })),
                },
            });
        }
        let package = Package::build(PackageDef {
            name: "Pack".into(),
            path: String::new(),
            versions: vec![
                VersionDef {
                    name: "v1".into(),
                    previous: None,
                    modifications: vec![Modification::AddEntity {
                        name: "E".into(),
                        variables: vec![Variable::new("Centimeters", ElementKind::U32)],
                        dependencies: vec![],
                        templates: vec![],
                        validations: vec![],
                    }],
                },
                VersionDef {
                    name: "v2".into(),
                    previous: Some("v1".into()),
                    modifications: vec![v2_mod],
                },
            ],
        })
        .unwrap();

        let values = ValueRegistry::new();
        let migrator = Migrator::new(&package, &values);
        let v2 = package.find_version("v2").unwrap();
        let item = package.find_item(v2, "E").unwrap();

        let v1_item = package.find_item(package.find_version("v1").unwrap(), "E").unwrap();
        let mut old = DynamicRecord::for_item(&package, v1_item, &values).unwrap();
        old.set("Centimeters", 180u32).unwrap();

        let new = migrator.from_previous(item, &old).unwrap();
        assert_eq!(*new.get::<f64>("Meters").unwrap(), 1.8);

        let back = migrator.to_previous(item, &new).unwrap();
        assert_eq!(*back.get::<u32>("Centimeters").unwrap(), 180);
    }
}
