//! End-to-end tests for package evolution and record migration
//!
//! Builds a three-version package (add, extend, rename), converts records
//! forward and backward across versions, and exercises the dispatch
//! registries and the wire envelope on top of it.

use std::sync::Arc;

use verspack::{
    ContainerKind, DynamicRecord, ElementKind, EntityRegistry, Mapping, Migrator, Modification,
    PackError, Package, PackageDef, RecordReader, RecordWriter, TypeCatalog, ValueRegistry,
    Variable, VersionDef,
};

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

/// v1 adds E{Age:u32}; v2 adds Name:string; v3 renames Name to Name2
fn evolution_def() -> PackageDef {
    let mut v2_mod = modify_entity("E");
    if let Modification::ModifyEntity { add_variables, .. } = &mut v2_mod {
        add_variables.push(Variable::new("Name", ElementKind::String));
    }
    let mut v3_mod = modify_entity("E");
    if let Modification::ModifyEntity {
        rename_variables, ..
    } = &mut v3_mod
    {
        rename_variables.push(("Name".into(), "Name2".into()));
    }
    PackageDef {
        name: "People".into(),
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
            VersionDef {
                name: "v3".into(),
                previous: Some("v2".into()),
                modifications: vec![v3_mod],
            },
        ],
    }
}

// =============================================================================
// Migration round trip
// =============================================================================

#[test]
fn test_release_type_has_renamed_fields() {
    let package = Package::build(evolution_def()).unwrap();
    let release = package.resolve_release(None).unwrap();
    assert_eq!(release.version_name, "v3");

    let item = package.item(release.items[0].item);
    let names: Vec<&str> = item.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["Age", "Name2"]);
}

#[test]
fn test_from_previous_carries_values_through_rename() {
    let package = Package::build(evolution_def()).unwrap();
    let values = ValueRegistry::new();
    let migrator = Migrator::new(&package, &values);

    let v2_item = package
        .find_item(package.find_version("v2").unwrap(), "E")
        .unwrap();
    let v3_item = package
        .find_item(package.find_version("v3").unwrap(), "E")
        .unwrap();

    let mut v2_record = DynamicRecord::for_item(&package, v2_item, &values).unwrap();
    v2_record.set("Age", 5u32).unwrap();
    v2_record.set("Name", String::from("x")).unwrap();

    let v3_record = migrator.from_previous(v3_item, &v2_record).unwrap();
    assert_eq!(*v3_record.get::<u32>("Age").unwrap(), 5);
    assert_eq!(*v3_record.get::<String>("Name2").unwrap(), "x");
}

#[test]
fn test_to_previous_carries_values_through_rename() {
    let package = Package::build(evolution_def()).unwrap();
    let values = ValueRegistry::new();
    let migrator = Migrator::new(&package, &values);

    let v3_item = package
        .find_item(package.find_version("v3").unwrap(), "E")
        .unwrap();

    let mut v3_record = DynamicRecord::for_item(&package, v3_item, &values).unwrap();
    v3_record.set("Age", 5u32).unwrap();
    v3_record.set("Name2", String::from("y")).unwrap();

    let v2_record = migrator.to_previous(v3_item, &v3_record).unwrap();
    assert_eq!(v2_record.type_name(), "People.v2.E");
    assert_eq!(*v2_record.get::<u32>("Age").unwrap(), 5);
    assert_eq!(*v2_record.get::<String>("Name").unwrap(), "y");
}

#[test]
fn test_chained_migration_v1_to_v3() {
    let package = Package::build(evolution_def()).unwrap();
    let values = ValueRegistry::new();
    let migrator = Migrator::new(&package, &values);

    let v1_item = package
        .find_item(package.find_version("v1").unwrap(), "E")
        .unwrap();
    let v2_item = package
        .find_item(package.find_version("v2").unwrap(), "E")
        .unwrap();
    let v3_item = package
        .find_item(package.find_version("v3").unwrap(), "E")
        .unwrap();

    let mut v1_record = DynamicRecord::for_item(&package, v1_item, &values).unwrap();
    v1_record.set("Age", 30u32).unwrap();

    let v2_record = migrator.from_previous(v2_item, &v1_record).unwrap();
    let v3_record = migrator.from_previous(v3_item, &v2_record).unwrap();
    assert_eq!(*v3_record.get::<u32>("Age").unwrap(), 30);
    assert_eq!(*v3_record.get::<String>("Name2").unwrap(), "");
}

// =============================================================================
// Deletion and resurrection guard
// =============================================================================

#[test]
fn test_deleted_entity_cannot_be_modified_later() {
    let mut def = evolution_def();
    def.versions.push(VersionDef {
        name: "v4".into(),
        previous: Some("v3".into()),
        modifications: vec![Modification::DeleteEntity { name: "E".into() }],
    });
    def.versions.push(VersionDef {
        name: "v5".into(),
        previous: Some("v4".into()),
        modifications: vec![modify_entity("E")],
    });
    match Package::build(def) {
        Err(PackError::ItemDeleted { name, version }) => {
            assert_eq!(name, "E");
            assert_eq!(version, "v5");
        }
        other => panic!("expected an item-deleted error, got {other:?}"),
    }
}

// =============================================================================
// Dispatch registries over the package
// =============================================================================

#[test]
fn test_entity_registry_covers_every_concrete_version() {
    let package = Package::build(evolution_def()).unwrap();
    let registry = EntityRegistry::from_package(&package, Arc::new(ValueRegistry::new()));

    assert_eq!(registry.len(), 3);
    for name in ["People.v1.E", "People.v2.E", "People.v3.E"] {
        assert!(registry.lookup(name).is_some(), "{name} not registered");
    }
    assert!(registry.lookup("People.v4.E").is_none());
}

#[test]
fn test_entity_round_trip_through_wire_envelope() {
    let package = Package::build(evolution_def()).unwrap();
    let registry = EntityRegistry::from_package(&package, Arc::new(ValueRegistry::new()));

    let mut record = registry.new_from_name("People.v3.E").unwrap();
    record.set("Age", 44u32).unwrap();
    record.set("Name2", String::from("ada")).unwrap();

    let mut writer = RecordWriter::new();
    registry.write_entity(&record, &mut writer).unwrap();
    let bytes = writer.into_bytes().unwrap();

    let mut reader = RecordReader::new(&bytes);
    let back = registry.read_entity(&mut reader).unwrap();
    assert_eq!(back.type_name(), "People.v3.E");

    let ops = registry.lookup("People.v3.E").unwrap();
    assert!(ops.equals(&record, &back).unwrap());
}

#[test]
fn test_renamed_variable_keeps_wire_compatibility() {
    // a v3 record writes Name2 under the original "Name" wire key, so a
    // record written before the rename still reads back field for field
    let package = Package::build(evolution_def()).unwrap();
    let registry = EntityRegistry::from_package(&package, Arc::new(ValueRegistry::new()));

    let mut v2_record = registry.new_from_name("People.v2.E").unwrap();
    v2_record.set("Age", 7u32).unwrap();
    v2_record.set("Name", String::from("grace")).unwrap();

    let mut writer = RecordWriter::new();
    let ops_v2 = registry.lookup("People.v2.E").unwrap();
    ops_v2.write(&v2_record, &mut writer).unwrap();
    let bytes = writer.into_bytes().unwrap();

    let ops_v3 = registry.lookup("People.v3.E").unwrap();
    let mut v3_record = ops_v3.new_record().unwrap();
    let mut reader = RecordReader::new(&bytes);
    ops_v3.read(&mut v3_record, &mut reader).unwrap();
    assert_eq!(*v3_record.get::<u32>("Age").unwrap(), 7);
    assert_eq!(*v3_record.get::<String>("Name2").unwrap(), "grace");
}

// =============================================================================
// Round trips across the full catalog
// =============================================================================

#[test]
fn test_sentinel_round_trips_for_every_combo() {
    let values = ValueRegistry::new();
    for (_, _, combo) in TypeCatalog::all_combos() {
        // zero values of every registered combo survive the wire
        let value = values.new_value(combo).unwrap();
        let mut writer = RecordWriter::new();
        values.write(combo, "v", &mut writer, &value).unwrap();
        let bytes = writer.into_bytes().unwrap();

        let mut back = values.new_value(combo).unwrap();
        let mut reader = RecordReader::new(&bytes);
        values.read(combo, "v", &mut reader, &mut back).unwrap();
        assert!(
            values.equals(combo, &value, &back).unwrap(),
            "combo {combo} did not round trip"
        );
    }
}

#[test]
fn test_nonzero_round_trips_for_representative_types() {
    let registry = ValueRegistry::new();

    // a non-trivial record shape per container kind
    let mut record_writer = RecordWriter::new();
    let combo = |e, c| verspack::TypeCombo::new(e, c);

    let mut plain = registry
        .new_value(combo(ElementKind::I64, ContainerKind::None))
        .unwrap();
    *plain.downcast_mut::<i64>().unwrap() = i64::MIN;

    let mut optional = registry
        .new_value(combo(ElementKind::F64, ContainerKind::OptionalValue))
        .unwrap();
    *optional.downcast_mut::<Option<f64>>().unwrap() = Some(-f64::MAX);

    let mut vector = registry
        .new_value(combo(ElementKind::String, ContainerKind::Vector))
        .unwrap();
    *vector.downcast_mut::<Vec<String>>().unwrap() =
        vec![String::from("inf"), String::from("sup")];

    let mut indexed = registry
        .new_value(combo(ElementKind::U16, ContainerKind::IdxVector))
        .unwrap();
    *indexed.downcast_mut::<verspack::IdxVec<u16>>().unwrap() =
        verspack::IdxVec::from_parts(vec![2, 1, 0], vec![u16::MAX, 0, 7]);

    let entries = [
        (combo(ElementKind::I64, ContainerKind::None), &plain),
        (combo(ElementKind::F64, ContainerKind::OptionalValue), &optional),
        (combo(ElementKind::String, ContainerKind::Vector), &vector),
        (combo(ElementKind::U16, ContainerKind::IdxVector), &indexed),
    ];
    for (idx, (c, value)) in entries.iter().enumerate() {
        registry
            .write(*c, &format!("f{idx}"), &mut record_writer, value)
            .unwrap();
    }
    let bytes = record_writer.into_bytes().unwrap();

    let mut reader = RecordReader::new(&bytes);
    for (idx, (c, value)) in entries.iter().enumerate() {
        let mut back = registry.new_value(*c).unwrap();
        registry
            .read(*c, &format!("f{idx}"), &mut reader, &mut back)
            .unwrap();
        assert!(registry.equals(*c, value, &back).unwrap());
    }
}

// =============================================================================
// Definitions loaded from JSON
// =============================================================================

#[test]
fn test_package_definition_from_json() {
    let json = r#"{
        "name": "People",
        "versions": [
            {
                "name": "v1",
                "modifications": [
                    {
                        "op": "add_entity",
                        "name": "E",
                        "variables": [{ "name": "Age", "element": "u32" }]
                    }
                ]
            },
            {
                "name": "v2",
                "previous": "v1",
                "modifications": [
                    {
                        "op": "modify_entity",
                        "name": "E",
                        "add_variables": [{ "name": "Name", "element": "string" }]
                    }
                ]
            }
        ]
    }"#;
    let def: PackageDef = serde_json::from_str(json).unwrap();
    let package = Package::build(def).unwrap();

    let v2_item = package
        .find_item(package.find_version("v2").unwrap(), "E")
        .unwrap();
    let item = package.item(v2_item);
    assert!(item.is_modified());
    assert!(matches!(
        item.find_mapping("Name"),
        Some(Mapping::New { .. })
    ));
    assert!(matches!(
        item.find_mapping("Age"),
        Some(Mapping::Same { .. })
    ));
}
