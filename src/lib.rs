//! stucco - declarative object schemas enforced at runtime
//!
//! Declare the shape of a document once; every record created from the
//! compiled model coerces, validates, and organizes its data on every
//! write. Bad values never land and never panic: they are dropped and
//! recorded on the instance's error list.
//!
//! ```
//! use stucco::{FieldSpec, Registry, SchemaDescriptor, Value};
//!
//! let registry = Registry::new();
//! let descriptor = SchemaDescriptor::new()
//!     .field("name", FieldSpec::String)
//!     .field("age", FieldSpec::Number)
//!     .field("usernames", FieldSpec::array_of(FieldSpec::String));
//! let person = registry
//!     .model("Person", registry.schema(descriptor))
//!     .unwrap();
//!
//! let record = person.create(serde_json::json!({ "name": "swen", "age": "25" }));
//! assert_eq!(record.get("age"), Value::Number(25.0));
//! ```

pub mod collection;
pub mod descriptor;
pub mod record;
pub mod registry;
pub mod schema;
pub mod typecast;
pub mod value;

pub use collection::TypedCollection;
pub use descriptor::{
    Field, FieldDescriptor, FieldKind, FieldSpec, SchemaDescriptor, SchemaError, SchemaResult,
};
pub use record::{CreateOptions, Record};
pub use registry::{default_registry, get_model, model, model_names, schema, Registry};
pub use schema::{
    BeforeSetFn, InvokeError, InvokeResult, Method, Model, OnSetFn, PostHook, PreHook,
    SchemaBuilder, SchemaOptions, SerializeOptions, StaticFn, TransformDocFn,
};
pub use typecast::{typecast, CastResult, SetterRejection};
pub use value::Value;
