//! Schema compilation and the compiled model handle.
//!
//! Compilation happens once per schema: fields normalize into canonical
//! descriptors, virtuals join the field table, methods and queued hooks
//! materialize into pipelines, and custom names are screened against the
//! record and model APIs. The result is an immutable [`Model`] shared by
//! every record created from it.

use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::debug;

use super::hooks::{MethodPipeline, QueuedHook};
use super::{InvokeError, InvokeResult, SchemaBuilder, SchemaOptions, StaticFn};
use crate::descriptor::{
    normalize, FieldDescriptor, NormalizeCx, SchemaError, SchemaResult,
};
use crate::record::{CreateOptions, Record};
use crate::registry::RegistryInner;
use crate::value::Value;

/// Names the record runtime claims on every instance. A schema may not
/// define a method or virtual under any of them.
const RESERVED_MEMBERS: &[&str] = &[
    "get",
    "set",
    "set_all",
    "unset",
    "clear",
    "keys",
    "get_errors",
    "has_errors",
    "clear_errors",
    "to_object",
    "to_json",
    "invoke",
    "model_name",
    "duplicate",
];

/// Names the model handle claims; statics may not shadow them.
const RESERVED_STATICS: &[&str] = &["create", "create_with", "name", "call_static", "field_names"];

struct ModelDescriptor {
    name: String,
    fields: IndexMap<String, Rc<FieldDescriptor>>,
    statics: IndexMap<String, StaticFn>,
    pipelines: IndexMap<String, MethodPipeline>,
    options: SchemaOptions,
}

/// Handle to one compiled model. Cloning shares the compiled state; two
/// handles compare equal only when they share it.
#[derive(Clone)]
pub struct Model {
    inner: Rc<ModelDescriptor>,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn options(&self) -> &SchemaOptions {
        &self.inner.options
    }

    /// The canonical descriptor of one field, virtuals included.
    pub fn field(&self, name: &str) -> Option<Rc<FieldDescriptor>> {
        self.inner.fields.get(name).cloned()
    }

    /// Declared field names in declaration order, virtuals last.
    pub fn field_names(&self) -> Vec<String> {
        self.inner.fields.keys().cloned().collect()
    }

    pub(crate) fn field_table(&self) -> &IndexMap<String, Rc<FieldDescriptor>> {
        &self.inner.fields
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.inner.pipelines.contains_key(name)
    }

    pub fn has_static(&self, name: &str) -> bool {
        self.inner.statics.contains_key(name)
    }

    /// Creates a record from this model; `initial` may be a plain
    /// object, another record, or null for an empty instance.
    pub fn create(&self, initial: impl Into<Value>) -> Record {
        self.create_with(initial, CreateOptions::default())
    }

    pub fn create_with(&self, initial: impl Into<Value>, options: CreateOptions) -> Record {
        Record::materialize(self.clone(), initial.into(), options)
    }

    /// Invokes a static function by name.
    pub fn call_static(&self, name: &str, args: &[Value]) -> InvokeResult<Value> {
        match self.inner.statics.get(name) {
            Some(body) => body(self, args),
            None => Err(InvokeError::UnknownStatic(name.to_owned())),
        }
    }

    pub(crate) fn run_method(
        &self,
        record: &Record,
        name: &str,
        args: &[Value],
    ) -> InvokeResult<Value> {
        match self.inner.pipelines.get(name) {
            Some(pipeline) => pipeline.run(record, args),
            None => Err(InvokeError::UnknownMethod(name.to_owned())),
        }
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.inner.name)
            .field("fields", &self.inner.fields.len())
            .field("methods", &self.inner.pipelines.len())
            .finish()
    }
}

impl SchemaBuilder {
    /// Compiles into a standalone model. Fields referencing other models
    /// by name stay unresolved until the model is registered through a
    /// [`Registry`](crate::registry::Registry) instead.
    pub fn compile(self, name: &str) -> SchemaResult<Model> {
        self.compile_internal(name, Weak::new())
    }

    pub(crate) fn compile_internal(
        self,
        name: &str,
        registry: Weak<RegistryInner>,
    ) -> SchemaResult<Model> {
        for (method_name, _) in &self.methods {
            if RESERVED_MEMBERS.contains(&method_name.as_str()) {
                return Err(SchemaError::ReservedMethod(method_name.clone()));
            }
        }
        for (virtual_name, _) in &self.virtuals {
            if RESERVED_MEMBERS.contains(&virtual_name.as_str()) {
                return Err(SchemaError::ReservedMethod(virtual_name.clone()));
            }
        }
        for (static_name, _) in &self.statics {
            if RESERVED_STATICS.contains(&static_name.as_str()) {
                return Err(SchemaError::ReservedStatic(static_name.clone()));
            }
        }

        let cx = NormalizeCx {
            parent: name,
            options: &self.options,
            registry,
        };
        let mut fields: IndexMap<String, Rc<FieldDescriptor>> = IndexMap::new();
        for (field_name, spec) in &self.descriptor.fields {
            let descriptor = normalize(spec, field_name, &cx)?;
            fields.insert(field_name.clone(), Rc::new(descriptor));
        }
        // A virtual under a declared field's name wins, the same way a
        // computed property would shadow a stored one.
        for (virtual_name, def) in &self.virtuals {
            fields.insert(
                virtual_name.clone(),
                Rc::new(FieldDescriptor::virtual_descriptor(virtual_name, def.clone())),
            );
        }

        let mut pipelines: IndexMap<String, MethodPipeline> = IndexMap::new();
        pipelines.insert("save".to_owned(), MethodPipeline::lifecycle());
        pipelines.insert("remove".to_owned(), MethodPipeline::lifecycle());
        for (method_name, body) in &self.methods {
            match pipelines.get_mut(method_name.as_str()) {
                Some(pipeline) => pipeline.body = Some(body.clone()),
                None => {
                    pipelines.insert(method_name.clone(), MethodPipeline::with_body(body.clone()));
                }
            }
        }
        for queued in &self.queue {
            let pipeline = pipelines
                .get_mut(queued.target())
                .ok_or_else(|| SchemaError::UnknownHookTarget(queued.target().to_owned()))?;
            match queued {
                QueuedHook::Pre { hook, .. } => pipeline.pres.push(hook.clone()),
                QueuedHook::Post { hook, .. } => pipeline.posts.push(hook.clone()),
            }
        }

        let mut statics: IndexMap<String, StaticFn> = IndexMap::new();
        for (static_name, body) in &self.statics {
            statics.insert(static_name.clone(), body.clone());
        }

        debug!(model = name, fields = fields.len(), "compiled model");
        Ok(Model {
            inner: Rc::new(ModelDescriptor {
                name: name.to_owned(),
                fields,
                statics,
                pipelines,
                options: self.options,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::descriptor::FieldSpec;

    #[test]
    fn test_reserved_method_names_fail_compilation() {
        let err = SchemaBuilder::new()
            .field("name", FieldSpec::String)
            .method("set", |record, _| Ok(Value::Record(record.clone())))
            .compile("Thing")
            .unwrap_err();
        assert!(matches!(err, SchemaError::ReservedMethod(name) if name == "set"));
    }

    #[test]
    fn test_reserved_static_names_fail_compilation() {
        let err = SchemaBuilder::new()
            .static_fn("create", |_, _| Ok(Value::Null))
            .compile("Thing")
            .unwrap_err();
        assert!(matches!(err, SchemaError::ReservedStatic(name) if name == "create"));
    }

    #[test]
    fn test_hooks_need_a_target_method() {
        let err = SchemaBuilder::new()
            .pre("fly", |_, _| Ok(()))
            .compile("Thing")
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownHookTarget(name) if name == "fly"));
    }

    #[test]
    fn test_save_is_hookable_without_a_body() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let seen = log.clone();
        let model = SchemaBuilder::new()
            .field("name", FieldSpec::String)
            .pre("save", move |_, _| {
                seen.borrow_mut().push("pre");
                Ok(())
            })
            .compile("Thing")
            .unwrap();

        let record = model.create(Value::Null);
        let result = record.save().unwrap();

        assert_eq!(*log.borrow(), vec!["pre"]);
        match result {
            Value::Record(returned) => assert!(returned.same_record(&record)),
            other => panic!("save returned {:?}", other),
        }
    }

    #[test]
    fn test_pre_hook_error_short_circuits_the_body() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let pre_log = log.clone();
        let body_log = log.clone();
        let model = SchemaBuilder::new()
            .method("promote", move |_, _| {
                body_log.borrow_mut().push("body");
                Ok(Value::Bool(true))
            })
            .pre("promote", move |_, _| {
                pre_log.borrow_mut().push("pre");
                Err(InvokeError::failed("denied"))
            })
            .compile("Thing")
            .unwrap();

        let record = model.create(Value::Null);
        let err = record.invoke("promote", &[]).unwrap_err();

        assert_eq!(err.to_string(), "denied");
        assert_eq!(*log.borrow(), vec!["pre"]);
    }

    #[test]
    fn test_post_hooks_see_the_body_result() {
        let seen = Rc::new(RefCell::new(Value::Null));
        let sink = seen.clone();
        let model = SchemaBuilder::new()
            .method("tally", |_, _| Ok(Value::Number(3.0)))
            .post("tally", move |_, result| {
                *sink.borrow_mut() = result.clone();
                Ok(())
            })
            .compile("Thing")
            .unwrap();

        model.create(Value::Null).invoke("tally", &[]).unwrap();
        assert_eq!(*seen.borrow(), Value::Number(3.0));
    }

    #[test]
    fn test_unknown_method_is_an_error() {
        let model = SchemaBuilder::new().compile("Thing").unwrap();
        let err = model.create(Value::Null).invoke("fly", &[]).unwrap_err();
        assert!(matches!(err, InvokeError::UnknownMethod(name) if name == "fly"));
    }

    #[test]
    fn test_statics_dispatch_on_the_model() {
        let model = SchemaBuilder::new()
            .static_fn("flavor", |model, _| {
                Ok(Value::String(model.name().to_owned()))
            })
            .compile("Thing")
            .unwrap();

        assert_eq!(
            model.call_static("flavor", &[]).unwrap(),
            Value::String("Thing".into())
        );
        assert!(matches!(
            model.call_static("absent", &[]),
            Err(InvokeError::UnknownStatic(_))
        ));
    }
}
