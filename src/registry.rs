//! Model registry.
//!
//! Registering a schema under a name compiles it and makes the model
//! reachable by that name, which is how schemas reference models that do
//! not exist yet: a field declared against a model name looks the name up
//! here on every coercion. A process-wide default registry backs the
//! crate-level facade; independent registries can be created for
//! isolation.
//!
//! # Design Principles
//!
//! - Registration is first-write-wins: a name already bound keeps its
//!   model
//! - Named references resolve lazily, so declaration order between
//!   mutually referential schemas does not matter
//! - Registries are single-threaded handles, like the records they
//!   produce

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::descriptor::{SchemaDescriptor, SchemaResult};
use crate::schema::{Model, SchemaBuilder, SchemaOptions};

pub(crate) struct RegistryInner {
    options: SchemaOptions,
    models: RefCell<IndexMap<String, Model>>,
}

impl RegistryInner {
    pub(crate) fn lookup(&self, name: &str) -> Option<Model> {
        self.models.borrow().get(name).cloned()
    }
}

/// Handle to one model namespace. Cloning shares the namespace.
#[derive(Clone)]
pub struct Registry {
    inner: Rc<RegistryInner>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::with_options(SchemaOptions::default())
    }

    /// Registry whose schemas start from the given options instead of
    /// the defaults.
    pub fn with_options(options: SchemaOptions) -> Registry {
        Registry {
            inner: Rc::new(RegistryInner {
                options,
                models: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// A builder seeded with this registry's default options.
    pub fn schema(&self, descriptor: SchemaDescriptor) -> SchemaBuilder {
        SchemaBuilder::from_descriptor(descriptor, self.inner.options.clone())
    }

    /// Compiles the builder and binds the model under `name`. A name
    /// already bound keeps its model; the new definition is discarded
    /// and the existing model is returned.
    pub fn model(&self, name: &str, builder: SchemaBuilder) -> SchemaResult<Model> {
        if let Some(existing) = self.inner.lookup(name) {
            return Ok(existing);
        }
        let model = builder.compile_internal(name, Rc::downgrade(&self.inner))?;
        self.inner
            .models
            .borrow_mut()
            .insert(name.to_owned(), model.clone());
        debug!(model = name, "registered model");
        Ok(model)
    }

    pub fn get_model(&self, name: &str) -> Option<Model> {
        self.inner.lookup(name)
    }

    /// Registered names, oldest first.
    pub fn model_names(&self) -> Vec<String> {
        self.inner.models.borrow().keys().cloned().collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

thread_local! {
    static DEFAULT_REGISTRY: Registry = Registry::new();
}

/// This thread's default registry, the one behind the crate-level
/// [`schema`], [`model`], [`get_model`], and [`model_names`] functions.
pub fn default_registry() -> Registry {
    DEFAULT_REGISTRY.with(|registry| registry.clone())
}

/// [`Registry::schema`] on the default registry.
pub fn schema(descriptor: SchemaDescriptor) -> SchemaBuilder {
    default_registry().schema(descriptor)
}

/// [`Registry::model`] on the default registry.
pub fn model(name: &str, builder: SchemaBuilder) -> SchemaResult<Model> {
    default_registry().model(name, builder)
}

/// [`Registry::get_model`] on the default registry.
pub fn get_model(name: &str) -> Option<Model> {
    default_registry().get_model(name)
}

/// [`Registry::model_names`] on the default registry.
pub fn model_names() -> Vec<String> {
    default_registry().model_names()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldSpec;
    use crate::value::Value;

    fn person_descriptor() -> SchemaDescriptor {
        SchemaDescriptor::new().field("name", FieldSpec::String)
    }

    #[test]
    fn test_registration_binds_and_lists_names() {
        let registry = Registry::new();
        let builder = registry.schema(person_descriptor());
        let model = registry.model("Person", builder).unwrap();

        assert_eq!(model.name(), "Person");
        assert_eq!(registry.model_names(), vec!["Person".to_owned()]);
        assert!(registry.get_model("Person").is_some());
        assert!(registry.get_model("Absent").is_none());
    }

    #[test]
    fn test_registering_a_bound_name_returns_the_existing_model() {
        let registry = Registry::new();
        let first = registry
            .model("Person", registry.schema(person_descriptor()))
            .unwrap();
        let second = registry
            .model(
                "Person",
                registry.schema(SchemaDescriptor::new().field("age", FieldSpec::Number)),
            )
            .unwrap();

        assert!(first == second);
        assert!(second.field("age").is_none());
    }

    #[test]
    fn test_named_references_resolve_lazily() {
        let registry = Registry::new();
        let holder = registry
            .model(
                "Holder",
                registry.schema(
                    SchemaDescriptor::new().field("pet", FieldSpec::ModelName("Pet".into())),
                ),
            )
            .unwrap();

        // Target not registered yet: the write is rejected.
        let orphan = holder.create(Value::Null);
        orphan.set("pet", serde_json::json!({ "kind": "cat" }));
        assert!(orphan.has_errors());

        registry
            .model(
                "Pet",
                registry.schema(SchemaDescriptor::new().field("kind", FieldSpec::String)),
            )
            .unwrap();

        let owner = holder.create(Value::Null);
        owner.set("pet", serde_json::json!({ "kind": "cat" }));
        assert!(!owner.has_errors());
        assert_eq!(owner.get("pet.kind"), Value::String("cat".into()));
    }

    #[test]
    fn test_registry_options_seed_every_schema() {
        let options = SchemaOptions {
            strict: false,
            ..SchemaOptions::default()
        };
        let registry = Registry::with_options(options);
        let model = registry
            .model("Loose", registry.schema(person_descriptor()))
            .unwrap();

        let record = model.create(Value::Null);
        record.set("anything", 12);
        assert_eq!(record.get("anything"), Value::Number(12.0));
    }
}
