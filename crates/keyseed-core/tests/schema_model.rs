use std::fs;
use std::path::Path;

use jsonschema::JSONSchema;
use keyseed_core::{
    FieldKind, MetadataProvider, SchemaModel, build_dependency_report, validate_schema,
};
use schemars::schema_for;

fn load_fixture() -> (serde_json::Value, SchemaModel) {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/shop.schema.json");
    let contents = fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("missing fixture at {}", path.display()));
    let json: serde_json::Value = serde_json::from_str(&contents).expect("parse fixture json");
    let schema = SchemaModel::from_json_str(&contents).expect("parse schema model");
    (json, schema)
}

#[test]
fn fixture_matches_generated_json_schema() {
    let (json, _) = load_fixture();
    let generated = schema_for!(SchemaModel);
    let generated_json = serde_json::to_value(&generated).expect("serialize json schema");
    let compiled = JSONSchema::compile(&generated_json).expect("compile json schema");
    assert!(compiled.is_valid(&json), "fixture does not match SchemaModel");
}

#[test]
fn fixture_is_consistent_and_acyclic() {
    let (_, schema) = load_fixture();
    validate_schema(&schema).expect("valid schema");

    let report = build_dependency_report(&schema);
    assert!(report.cycle.is_none());
    assert_eq!(report.longest_chain, Some(2));

    let order = report.principal_order.expect("principal order");
    let position = |name: &str| order.iter().position(|item| item == name).expect("listed");
    assert!(position("Customer") < position("Order"));
    assert!(position("Order") < position("OrderLine"));
    assert!(position("Product") < position("OrderLine"));
}

#[test]
fn fixture_defaults_apply_to_fields() {
    let (_, schema) = load_fixture();
    let order = schema.entity("Order").expect("order entity");
    let note = order.field("Note").expect("note field");
    assert!(note.nullable);
    assert!(note.writable);
    assert_eq!(order.field("Id").map(|field| field.kind), Some(FieldKind::BigInteger));
    assert!(order.is_key_field("CustomerId"));
    assert!(!order.is_key_field("PlacedOn"));

    let line = schema.metadata_for("OrderLine").expect("metadata");
    assert!(line.primary_key_overlaps_foreign_keys());
}
