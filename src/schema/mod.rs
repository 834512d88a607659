//! Schema subsystem.
//!
//! A [`SchemaBuilder`] gathers field declarations, methods, statics,
//! virtuals, hooks, and options, then compiles them into one immutable
//! [`Model`]. Everything a record does at runtime was decided here; after
//! compilation nothing about a model changes.
//!
//! # Design Principles
//!
//! - Two phases: a mutable builder, then an immutable compiled model
//! - Malformed schemas fail at compile time, never on first use
//! - `save` and `remove` are hookable with or without a body
//! - Extending copies what the base declares and the child does not;
//!   the base's hooks run first

mod compile;
mod errors;
mod hooks;

use std::fmt;
use std::rc::Rc;

pub use compile::Model;
pub use errors::{InvokeError, InvokeResult};
pub use hooks::{Method, PostHook, PreHook, StaticFn};

pub(crate) use hooks::QueuedHook;

use crate::descriptor::{FieldSpec, SchemaDescriptor, VirtualDef, VirtualGetter, VirtualSetter};
use crate::record::Record;
use crate::value::Value;

// ============================================================================
// Options
// ============================================================================

/// Write-interception callback, consulted before every field write with
/// the raw value and the key. `Ok(true)` lets the write proceed,
/// `Ok(false)` drops it silently, and an error drops it and lands on the
/// record's error list.
pub type BeforeSetFn = Rc<dyn Fn(&Value, &str) -> Result<bool, String>>;

/// Post-write notification, invoked with the value as stored and the
/// key, only for writes that landed.
pub type OnSetFn = Rc<dyn Fn(&Value, &str)>;

/// Projection rewrite hook: receives the record, the projected result,
/// and the options the projection resolved to; whatever it returns is
/// the projection.
pub type TransformDocFn = Rc<dyn Fn(&Record, Value, &SerializeOptions) -> Value>;

/// Options for one serializer namespace (`to_object` or `to_json`).
/// Every field is optional so inline options can override the schema's
/// per key rather than wholesale.
#[derive(Clone, Default)]
pub struct SerializeOptions {
    pub transform: Option<TransformDocFn>,
    pub virtuals: Option<bool>,
    pub minimize: Option<bool>,
    pub date_to_iso: Option<bool>,
}

impl fmt::Debug for SerializeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializeOptions")
            .field("transform", &self.transform.is_some())
            .field("virtuals", &self.virtuals)
            .field("minimize", &self.minimize)
            .field("date_to_iso", &self.date_to_iso)
            .finish()
    }
}

/// Behavior switches for a schema and every record compiled from it.
#[derive(Clone)]
pub struct SchemaOptions {
    /// Drop writes to undeclared fields. Off, they are admitted as
    /// untyped dynamic slots.
    pub strict: bool,
    /// Let dotted keys traverse nested records and plain objects.
    pub dot_notation: bool,
    /// Omit empty containers from projections.
    pub minimize: bool,
    /// Defaults for [`Record::to_object`](crate::record::Record::to_object).
    pub to_object: SerializeOptions,
    /// Defaults for [`Record::to_json`](crate::record::Record::to_json).
    pub to_json: SerializeOptions,
    pub before_set: Option<BeforeSetFn>,
    pub on_set: Option<OnSetFn>,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        SchemaOptions {
            strict: true,
            dot_notation: true,
            minimize: true,
            to_object: SerializeOptions::default(),
            to_json: SerializeOptions::default(),
            before_set: None,
            on_set: None,
        }
    }
}

impl fmt::Debug for SchemaOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaOptions")
            .field("strict", &self.strict)
            .field("dot_notation", &self.dot_notation)
            .field("minimize", &self.minimize)
            .field("to_object", &self.to_object)
            .field("to_json", &self.to_json)
            .field("before_set", &self.before_set.is_some())
            .field("on_set", &self.on_set.is_some())
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Mutable accumulation phase of a schema. Compile it with
/// [`compile`](Self::compile), or register it through a
/// [`Registry`](crate::registry::Registry) so other schemas can reference
/// the model by name.
pub struct SchemaBuilder {
    descriptor: SchemaDescriptor,
    options: SchemaOptions,
    methods: Vec<(String, Method)>,
    statics: Vec<(String, StaticFn)>,
    virtuals: Vec<(String, VirtualDef)>,
    queue: Vec<QueuedHook>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        SchemaBuilder::from_descriptor(SchemaDescriptor::new(), SchemaOptions::default())
    }

    pub(crate) fn from_descriptor(descriptor: SchemaDescriptor, options: SchemaOptions) -> Self {
        SchemaBuilder {
            descriptor,
            options,
            methods: Vec::new(),
            statics: Vec::new(),
            virtuals: Vec::new(),
            queue: Vec::new(),
        }
    }

    /// Declares a field. Declaring a name again replaces the earlier
    /// declaration in place.
    pub fn field(mut self, name: impl Into<String>, spec: impl Into<FieldSpec>) -> Self {
        self.descriptor = self.descriptor.field(name, spec);
        self
    }

    /// Defines an instance method. The body runs inside the method's
    /// hook pipeline.
    pub fn method(
        mut self,
        name: impl Into<String>,
        body: impl Fn(&Record, &[Value]) -> InvokeResult<Value> + 'static,
    ) -> Self {
        put(&mut self.methods, name.into(), Rc::new(body));
        self
    }

    /// Defines a static function on the compiled model.
    pub fn static_fn(
        mut self,
        name: impl Into<String>,
        body: impl Fn(&Model, &[Value]) -> InvokeResult<Value> + 'static,
    ) -> Self {
        put(&mut self.statics, name.into(), Rc::new(body));
        self
    }

    /// Declares a read-only computed field. Virtuals are never stored
    /// and only appear in projections that ask for them.
    pub fn virtual_field(
        mut self,
        name: impl Into<String>,
        get: impl Fn(&Record) -> Value + 'static,
    ) -> Self {
        put(
            &mut self.virtuals,
            name.into(),
            VirtualDef::new(Rc::new(get) as VirtualGetter, None),
        );
        self
    }

    /// Declares a computed field with a setter. Writes to it run the
    /// setter instead of storing anything.
    pub fn virtual_field_with_setter(
        mut self,
        name: impl Into<String>,
        get: impl Fn(&Record) -> Value + 'static,
        set: impl Fn(&Record, Value) + 'static,
    ) -> Self {
        put(
            &mut self.virtuals,
            name.into(),
            VirtualDef::new(
                Rc::new(get) as VirtualGetter,
                Some(Rc::new(set) as VirtualSetter),
            ),
        );
        self
    }

    /// Queues a hook to run before `target`'s body.
    pub fn pre(
        mut self,
        target: impl Into<String>,
        hook: impl Fn(&Record, &[Value]) -> InvokeResult<()> + 'static,
    ) -> Self {
        self.queue.push(QueuedHook::Pre {
            target: target.into(),
            hook: Rc::new(hook),
        });
        self
    }

    /// Queues a hook to run after `target`'s body, with its result.
    pub fn post(
        mut self,
        target: impl Into<String>,
        hook: impl Fn(&Record, &Value) -> InvokeResult<()> + 'static,
    ) -> Self {
        self.queue.push(QueuedHook::Post {
            target: target.into(),
            hook: Rc::new(hook),
        });
        self
    }

    /// Replaces the schema's options wholesale.
    pub fn options(mut self, options: SchemaOptions) -> Self {
        self.options = options;
        self
    }

    pub fn strict(mut self, on: bool) -> Self {
        self.options.strict = on;
        self
    }

    pub fn dot_notation(mut self, on: bool) -> Self {
        self.options.dot_notation = on;
        self
    }

    pub fn minimize(mut self, on: bool) -> Self {
        self.options.minimize = on;
        self
    }

    pub fn before_set(
        mut self,
        callback: impl Fn(&Value, &str) -> Result<bool, String> + 'static,
    ) -> Self {
        self.options.before_set = Some(Rc::new(callback));
        self
    }

    pub fn on_set(mut self, callback: impl Fn(&Value, &str) + 'static) -> Self {
        self.options.on_set = Some(Rc::new(callback));
        self
    }

    pub fn to_object_options(mut self, options: SerializeOptions) -> Self {
        self.options.to_object = options;
        self
    }

    pub fn to_json_options(mut self, options: SerializeOptions) -> Self {
        self.options.to_json = options;
        self
    }

    /// Folds another schema into this one: fields, methods, statics, and
    /// virtuals this schema does not declare are copied over, and the
    /// other schema's hooks are queued ahead of this schema's own, so a
    /// base schema's hooks run before an extending schema's. Options are
    /// not copied.
    pub fn extend(mut self, other: &SchemaBuilder) -> Self {
        for (name, spec) in &other.descriptor.fields {
            let declared = self
                .descriptor
                .fields
                .iter()
                .any(|(existing, _)| existing == name);
            if !declared {
                self.descriptor.fields.push((name.clone(), spec.clone()));
            }
        }
        copy_absent(&mut self.methods, &other.methods);
        copy_absent(&mut self.statics, &other.statics);
        copy_absent(&mut self.virtuals, &other.virtuals);

        let mut queue = other.queue.clone();
        queue.extend(self.queue.drain(..));
        self.queue = queue;
        self
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        SchemaBuilder::new()
    }
}

impl fmt::Debug for SchemaBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaBuilder")
            .field("fields", &self.descriptor.len())
            .field("methods", &self.methods.len())
            .field("statics", &self.statics.len())
            .field("virtuals", &self.virtuals.len())
            .field("queued_hooks", &self.queue.len())
            .finish()
    }
}

fn put<T>(list: &mut Vec<(String, T)>, name: String, item: T) {
    match list.iter_mut().find(|(existing, _)| *existing == name) {
        Some(slot) => slot.1 = item,
        None => list.push((name, item)),
    }
}

fn copy_absent<T: Clone>(mine: &mut Vec<(String, T)>, theirs: &[(String, T)]) {
    for (name, item) in theirs {
        let declared = mine.iter().any(|(existing, _)| existing == name);
        if !declared {
            mine.push((name.clone(), item.clone()));
        }
    }
}
