//! Migration tests
//!
//! Multi-step migrations through a registry built with the standard
//! migrations, plus a custom failing step.

use vellum_core::{Error, TypeId, Version};
use vellum_durability::migration::register_standard_migrations;
use vellum_durability::{
    BinaryReader, DocumentWriter, FileHeader, MigrationRegistry, FILE_HEADER_SIZE,
};

const V1_0: Version = Version::new(1, 0);
const V1_1: Version = Version::new(1, 1);
const V2_0: Version = Version::new(2, 0);

fn standard_registry() -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    register_standard_migrations(&mut registry);
    registry
}

/// A 1.0 document with one Point2D and one Color.
fn v1_document() -> Vec<u8> {
    let mut doc = DocumentWriter::new();
    doc.write_pod(TypeId::POINT2D, 1, &[3.0f32, 4.0f32]).unwrap();
    doc.write_object(TypeId::COLOR, 2, &[255, 0, 51, 255]).unwrap();
    doc.finish().unwrap()
}

#[test]
fn test_path_through_intermediate_version() {
    let registry = standard_registry();
    assert_eq!(registry.find_migration_path(V1_0, V2_0), vec![V1_0, V1_1, V2_0]);
    assert!(registry.find_migration_path(V2_0, V1_0).is_empty());
}

#[test]
fn test_two_step_migration_rewrites_objects() {
    let registry = standard_registry();
    let (result, data) = registry.migrate(V1_0, V2_0, &v1_document());
    let data = data.unwrap();

    assert!(result.success);
    assert_eq!(
        result.messages,
        vec!["Migrated from 1.0 to 1.1", "Migrated from 1.1 to 2.0"]
    );
    assert!(!result.warnings.is_empty());

    let header = FileHeader::from_bytes(&data).unwrap();
    assert_eq!(header.version, V2_0);
    assert_eq!(header.total_size, data.len() as u64);

    let mut reader = BinaryReader::new(&data);
    reader.seek(FILE_HEADER_SIZE).unwrap();
    let (point, payload) = reader.read_object().unwrap();
    assert_eq!(point.type_id, TypeId::POINT2D);
    assert_eq!(payload.len(), 9);
    assert_eq!(payload[8], 0);

    let (color, payload) = reader.read_object().unwrap();
    assert_eq!(color.type_id, TypeId::COLOR);
    assert_eq!(payload.len(), 16);
    let red = f32::from_ne_bytes(payload[..4].try_into().unwrap());
    assert_eq!(red, 1.0);
    assert!(reader.is_eof());
}

#[test]
fn test_upgrade_then_downgrade_restores_payloads() {
    let registry = standard_registry();
    let original = v1_document();
    let (_, upgraded) = registry.migrate(V1_0, V1_1, &original);
    let (result, restored) = registry.migrate(V1_1, V1_0, &upgraded.unwrap());
    assert!(result.success);
    assert_eq!(restored.unwrap(), original);
}

#[test]
fn test_failing_step_stops_chain() {
    let mut registry = standard_registry();
    registry.register(V2_0, Version::new(3, 0), |_: &[u8]| {
        let mut result = vellum_durability::MigrationResult::success(V2_0, Version::new(3, 0));
        result.add_error("payload layout not supported");
        (Vec::new(), result)
    });

    let (result, data) = registry.migrate(V1_0, Version::new(3, 0), &v1_document());
    assert!(data.is_none());
    assert!(!result.success);
    assert_eq!(result.failed_step, Some((V2_0, Version::new(3, 0))));

    let err = registry
        .migrate_or_err(V1_0, Version::new(3, 0), &v1_document())
        .unwrap_err();
    match err {
        Error::MigrationStepFailed { from, to, reason } => {
            assert_eq!(from, V2_0);
            assert_eq!(to, Version::new(3, 0));
            assert!(reason.contains("payload layout"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_missing_path_is_error() {
    let registry = standard_registry();
    let err = registry.migrate_or_err(V2_0, V1_1, &v1_document()).unwrap_err();
    assert!(matches!(err, Error::NoMigrationPath { .. }));
}
