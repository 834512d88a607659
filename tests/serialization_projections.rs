//! Serialization and Projection Tests
//!
//! Coverage of `to_object` and `to_json`, their option namespaces, and
//! inline overrides.
//!
//! Test Categories:
//! 1. Slot-order projection and null omission
//! 2. Minimize gating of empty containers
//! 3. Invisible fields and virtuals
//! 4. Transform precedence and nesting
//! 5. Date rendering per namespace
//! 6. Round-trip reconstruction and serde integration

use std::rc::Rc;

use chrono::{SecondsFormat, TimeZone, Utc};
use indexmap::IndexMap;
use serde_json::json;

use stucco::{
    Field, FieldSpec, Model, Registry, SchemaDescriptor, SerializeOptions, Value,
};

fn post_model(registry: &Registry) -> Model {
    let descriptor = SchemaDescriptor::new()
        .field("name", FieldSpec::String)
        .field("age", FieldSpec::Number)
        .field("joined", FieldSpec::Date)
        .field("secret", Field::string().invisible())
        .field("usernames", FieldSpec::array_of(FieldSpec::String))
        .field(
            "profile",
            SchemaDescriptor::new().field("email", FieldSpec::String),
        );
    registry.model("Post", registry.schema(descriptor)).unwrap()
}

fn object(value: Value) -> IndexMap<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {:?}", other),
    }
}

fn iso(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

// =============================================================================
// Slot order and null omission
// =============================================================================

/// Test: Projections walk slots in declared order and leave unset
/// fields out, regardless of write order.
#[test]
fn test_to_object_keeps_declared_order_and_drops_nulls() {
    let registry = Registry::new();
    let rec = post_model(&registry).create(json!({ "age": 25, "name": "swen" }));

    let out = object(rec.to_object(None));

    let keys: Vec<&str> = out.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["name", "age"]);
    assert_eq!(out["age"], Value::Number(25.0));
}

/// Test: Dates stay date values in `to_object` by default.
#[test]
fn test_to_object_keeps_dates_as_dates() {
    let registry = Registry::new();
    let rec = post_model(&registry).create(Value::Null);
    rec.set("joined", json!(1_497_999_600_000_i64));

    let out = object(rec.to_object(None));
    assert!(matches!(out["joined"], Value::Date(_)));
}

// =============================================================================
// Minimize
// =============================================================================

/// Test: Minimize (the default) hides empty containers; turning it off
/// inline brings them back as empty arrays and objects.
#[test]
fn test_minimize_gates_empty_containers() {
    let registry = Registry::new();
    let rec = post_model(&registry).create(json!({ "name": "x" }));

    let trimmed = object(rec.to_object(None));
    assert_eq!(
        trimmed.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["name"]
    );

    let full = object(rec.to_object(Some(&SerializeOptions {
        minimize: Some(false),
        ..Default::default()
    })));
    assert_eq!(full["usernames"], Value::Array(Vec::new()));
    assert_eq!(full["profile"], Value::Object(IndexMap::new()));
}

/// Test: A schema can turn minimize off for every projection.
#[test]
fn test_schema_level_minimize_default() {
    let registry = Registry::new();
    let descriptor = SchemaDescriptor::new()
        .field("name", FieldSpec::String)
        .field("tags", FieldSpec::array_of(FieldSpec::String));
    let model = registry
        .model("Sparse", registry.schema(descriptor).minimize(false))
        .unwrap();
    let rec = model.create(json!({ "name": "x" }));

    let out = object(rec.to_object(None));
    assert_eq!(out["tags"], Value::Array(Vec::new()));
}

// =============================================================================
// Invisible fields and virtuals
// =============================================================================

/// Test: Invisible fields read back normally but never serialize.
#[test]
fn test_invisible_fields_never_serialize() {
    let registry = Registry::new();
    let rec = post_model(&registry).create(json!({ "name": "x", "secret": "hush" }));

    assert_eq!(rec.get("secret"), Value::String("hush".into()));
    assert!(!object(rec.to_object(None)).contains_key("secret"));
    assert!(rec.to_json(None).get("secret").is_none());
}

/// Test: Virtuals are left out by default and appended after stored
/// fields when asked for.
#[test]
fn test_virtuals_append_when_asked() {
    let registry = Registry::new();
    let builder = registry
        .schema(SchemaDescriptor::new().field("name", FieldSpec::String))
        .virtual_field("loud", |record| {
            Value::String(record.get("name").as_str().unwrap_or("").to_uppercase())
        });
    let model = registry.model("Shouter", builder).unwrap();
    let rec = model.create(json!({ "name": "ada" }));

    assert!(!object(rec.to_object(None)).contains_key("loud"));

    let out = object(rec.to_object(Some(&SerializeOptions {
        virtuals: Some(true),
        ..Default::default()
    })));
    let keys: Vec<&str> = out.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["name", "loud"]);
    assert_eq!(out["loud"], Value::String("ADA".into()));
}

/// Test: The virtuals option rides inline options into nested records.
#[test]
fn test_virtuals_option_reaches_nested_records() {
    let registry = Registry::new();
    let inner_builder = registry
        .schema(SchemaDescriptor::new().field("text", FieldSpec::String))
        .virtual_field("loud", |record| {
            Value::String(record.get("text").as_str().unwrap_or("").to_uppercase())
        });
    let inner = registry.model("Note", inner_builder).unwrap();
    let outer = registry
        .model(
            "Page",
            registry.schema(SchemaDescriptor::new().field("note", FieldSpec::Model(inner))),
        )
        .unwrap();
    let rec = outer.create(json!({ "note": { "text": "hi" } }));

    let out = object(rec.to_object(Some(&SerializeOptions {
        virtuals: Some(true),
        ..Default::default()
    })));
    let note = match &out["note"] {
        Value::Object(map) => map,
        other => panic!("expected an object, got {:?}", other),
    };
    assert_eq!(note["loud"], Value::String("HI".into()));
}

// =============================================================================
// Transforms
// =============================================================================

/// Test: Transforms run last, an inline transform beats the schema's,
/// and neither reaches nested records, which apply their own.
#[test]
fn test_transform_runs_last_and_stays_on_its_record() {
    let registry = Registry::new();
    let inner_builder = registry
        .schema(SchemaDescriptor::new().field("text", FieldSpec::String))
        .to_object_options(SerializeOptions {
            transform: Some(Rc::new(|_, mut value, _| {
                if let Value::Object(map) = &mut value {
                    map.insert("via".to_owned(), Value::String("inner-schema".into()));
                }
                value
            })),
            ..Default::default()
        });
    let inner = registry.model("Body", inner_builder).unwrap();
    let outer_builder = registry
        .schema(
            SchemaDescriptor::new()
                .field("title", FieldSpec::String)
                .field("body", FieldSpec::Model(inner)),
        )
        .to_object_options(SerializeOptions {
            transform: Some(Rc::new(|_, mut value, _| {
                if let Value::Object(map) = &mut value {
                    map.insert("via".to_owned(), Value::String("outer-schema".into()));
                }
                value
            })),
            ..Default::default()
        });
    let outer = registry.model("Article", outer_builder).unwrap();
    let rec = outer.create(json!({ "title": "t", "body": { "text": "b" } }));

    let schema_out = object(rec.to_object(None));
    assert_eq!(schema_out["via"], Value::String("outer-schema".into()));
    let body = object(schema_out["body"].clone());
    assert_eq!(body["via"], Value::String("inner-schema".into()));

    let inline_out = object(rec.to_object(Some(&SerializeOptions {
        transform: Some(Rc::new(|_, mut value, _| {
            if let Value::Object(map) = &mut value {
                map.insert("via".to_owned(), Value::String("inline".into()));
            }
            value
        })),
        ..Default::default()
    })));
    assert_eq!(inline_out["via"], Value::String("inline".into()));
    let inline_body = object(inline_out["body"].clone());
    assert_eq!(inline_body["via"], Value::String("inner-schema".into()));
}

/// Test: The two projection namespaces hold independent options.
#[test]
fn test_object_and_json_namespaces_are_independent() {
    let registry = Registry::new();
    let builder = registry
        .schema(SchemaDescriptor::new().field("name", FieldSpec::String))
        .to_object_options(SerializeOptions {
            transform: Some(Rc::new(|_, mut value, _| {
                if let Value::Object(map) = &mut value {
                    map.insert("via".to_owned(), Value::String("object".into()));
                }
                value
            })),
            ..Default::default()
        })
        .to_json_options(SerializeOptions {
            transform: Some(Rc::new(|_, mut value, _| {
                if let Value::Object(map) = &mut value {
                    map.insert("via".to_owned(), Value::String("json".into()));
                }
                value
            })),
            ..Default::default()
        });
    let model = registry.model("Dual", builder).unwrap();
    let rec = model.create(json!({ "name": "x" }));

    assert_eq!(
        object(rec.to_object(None))["via"],
        Value::String("object".into())
    );
    assert_eq!(rec.to_json(None)["via"], json!("json"));
}

// =============================================================================
// Dates
// =============================================================================

/// Test: `to_json` renders dates as ISO strings by default and as epoch
/// milliseconds when the option is turned off; `to_object` can opt into
/// ISO strings inline.
#[test]
fn test_date_rendering_per_namespace() {
    let registry = Registry::new();
    let rec = post_model(&registry).create(Value::Null);
    rec.set("joined", json!(1_497_999_600_000_i64));

    let json_out = rec.to_json(None);
    assert_eq!(json_out["joined"], json!(iso(1_497_999_600_000)));

    let raw = rec.to_json(Some(&SerializeOptions {
        date_to_iso: Some(false),
        ..Default::default()
    }));
    assert_eq!(raw["joined"], json!(1_497_999_600_000_i64));

    let converted = object(rec.to_object(Some(&SerializeOptions {
        date_to_iso: Some(true),
        ..Default::default()
    })));
    assert_eq!(converted["joined"], Value::String(iso(1_497_999_600_000)));
}

// =============================================================================
// Round trips and serde
// =============================================================================

/// Test: Collection elements serialize through their own schemas.
#[test]
fn test_collections_serialize_as_plain_arrays() {
    let registry = Registry::new();
    let rec = post_model(&registry).create(json!({ "usernames": ["a", "b"] }));

    let out = object(rec.to_object(None));
    assert_eq!(
        out["usernames"],
        Value::Array(vec![Value::String("a".into()), Value::String("b".into())])
    );
    assert_eq!(rec.to_json(None)["usernames"], json!(["a", "b"]));
}

/// Test: Feeding a projection back into `create` reconstructs an equal
/// record.
#[test]
fn test_round_trip_reconstructs_an_equal_record() {
    let registry = Registry::new();
    let model = post_model(&registry);
    let rec = model.create(json!({
        "name": "swen",
        "age": 25,
        "usernames": ["a"],
        "profile": { "email": "a@b.se" }
    }));
    rec.set("joined", json!(1_497_999_600_000_i64));

    let projected = rec.to_object(None);
    let rebuilt = model.create(projected);

    assert!(rebuilt == rec);
    assert!(!rebuilt.same_record(&rec));
}

/// Test: Serde serialization of a record value uses the object
/// projection, with dates as ISO strings.
#[test]
fn test_serde_serialization_uses_the_object_projection() {
    let registry = Registry::new();
    let rec = post_model(&registry).create(json!({ "name": "swen", "age": 25 }));
    rec.set("joined", json!(1_497_999_600_000_i64));

    let tree = serde_json::to_value(Value::Record(rec)).unwrap();

    assert_eq!(
        tree,
        json!({
            "name": "swen",
            "age": 25,
            "joined": iso(1_497_999_600_000)
        })
    );
}
