//! Model Registry Tests
//!
//! Coverage of registry isolation, the thread-local default registry,
//! and registry-seeded options.
//!
//! Test Categories:
//! 1. Module-level facade functions
//! 2. Registry isolation and first-registration-wins
//! 3. Registry-level option seeding

use serde_json::json;

use stucco::{FieldSpec, Registry, SchemaDescriptor, SchemaOptions, Value};

// =============================================================================
// Facade
// =============================================================================

/// Test: The module-level functions all talk to one default registry.
#[test]
fn test_facade_registers_on_the_default_registry() {
    let model = stucco::model(
        "FacadePerson",
        stucco::schema(SchemaDescriptor::new().field("name", FieldSpec::String)),
    )
    .unwrap();

    assert!(stucco::get_model("FacadePerson").is_some());
    assert!(stucco::model_names().contains(&"FacadePerson".to_owned()));

    let rec = model.create(json!({ "name": "x" }));
    assert_eq!(rec.get("name"), Value::String("x".into()));
}

/// Test: The default-registry handle reaches the same store as the
/// facade functions.
#[test]
fn test_default_registry_handle_is_shared() {
    let handle = stucco::default_registry();
    handle
        .model(
            "FacadeShared",
            handle.schema(SchemaDescriptor::new().field("tag", FieldSpec::String)),
        )
        .unwrap();

    assert!(stucco::get_model("FacadeShared").is_some());
}

/// Test: Name references registered later through the facade resolve
/// for records created earlier.
#[test]
fn test_late_binding_through_the_default_registry() {
    let holder = stucco::model(
        "FacadeHolder",
        stucco::schema(
            SchemaDescriptor::new().field("pet", FieldSpec::ModelName("FacadePet".into())),
        ),
    )
    .unwrap();
    let rec = holder.create(Value::Null);

    rec.set("pet", json!({ "kind": "dog" }));
    assert!(rec.has_errors());
    rec.clear_errors();

    stucco::model(
        "FacadePet",
        stucco::schema(SchemaDescriptor::new().field("kind", FieldSpec::String)),
    )
    .unwrap();

    rec.set("pet", json!({ "kind": "dog" }));
    assert!(!rec.has_errors());
    assert_eq!(rec.get("pet.kind"), Value::String("dog".into()));
}

// =============================================================================
// Isolation
// =============================================================================

/// Test: Registries do not see each other's models, and neither does
/// the default registry.
#[test]
fn test_separate_registries_are_isolated() {
    let a = Registry::new();
    let b = Registry::new();

    a.model(
        "Island",
        a.schema(SchemaDescriptor::new().field("name", FieldSpec::String)),
    )
    .unwrap();

    assert!(a.get_model("Island").is_some());
    assert!(b.get_model("Island").is_none());
    assert!(stucco::get_model("Island").is_none());
}

/// Test: Registering a name twice keeps the first definition and hands
/// it back.
#[test]
fn test_first_registration_wins() {
    let registry = Registry::new();
    let first = registry
        .model(
            "Claimed",
            registry.schema(SchemaDescriptor::new().field("one", FieldSpec::String)),
        )
        .unwrap();
    let second = registry
        .model(
            "Claimed",
            registry.schema(SchemaDescriptor::new().field("two", FieldSpec::String)),
        )
        .unwrap();

    assert!(first == second);
    assert!(second.field("one").is_some());
    assert!(second.field("two").is_none());
    assert_eq!(registry.model_names(), vec!["Claimed"]);
}

// =============================================================================
// Option seeding
// =============================================================================

/// Test: Registry-level options seed every schema built through it.
#[test]
fn test_registry_options_seed_schemas() {
    let registry = Registry::with_options(SchemaOptions {
        strict: false,
        ..SchemaOptions::default()
    });
    let model = registry
        .model(
            "Seeded",
            registry.schema(SchemaDescriptor::new().field("name", FieldSpec::String)),
        )
        .unwrap();

    let rec = model.create(json!({ "loose": 1 }));
    assert_eq!(rec.get("loose"), Value::Number(1.0));
}
