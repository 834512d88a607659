//! Record runtime.
//!
//! A [`Record`] is one live instance of a compiled model: a slot per
//! declared field, an error sink, and interception on every read and
//! write. Writes are coerced and validated against the field's
//! descriptor; values that do not survive are dropped and the rejection
//! is appended to the record's error list, never raised at the caller.
//!
//! # Design Principles
//!
//! - Writes never panic and never throw; bad values land on the error
//!   list
//! - Container identity is stable for the life of the record: array
//!   fields keep their collection, nested object fields keep their
//!   record
//! - A slot is either declared (coerced, validated) or dynamic (admitted
//!   as-is when the schema is not strict)
//! - Handles are cheap clones of the same instance

mod serialize;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::collection::TypedCollection;
use crate::descriptor::{FieldDescriptor, FieldKind, ModelRef, VirtualGetter, VirtualSetter};
use crate::schema::{InvokeResult, Model};
use crate::typecast::{typecast, ErrorSink, SetterRejection};
use crate::value::Value;

/// Construction-time switches for [`Model::create_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOptions {
    /// Deep-copy the initial data before assigning it, so records and
    /// collections inside it stay detached from the new instance.
    pub clone: bool,
}

/// Handle to one model instance.
#[derive(Clone)]
pub struct Record {
    inner: Rc<RefCell<RecordInner>>,
}

struct RecordInner {
    model: Model,
    slots: IndexMap<String, Slot>,
    sink: ErrorSink,
}

enum Slot {
    Declared {
        descriptor: Rc<FieldDescriptor>,
        value: Value,
    },
    Dynamic {
        value: Value,
    },
}

impl Slot {
    fn value(&self) -> &Value {
        match self {
            Slot::Declared { value, .. } => value,
            Slot::Dynamic { value } => value,
        }
    }

    fn value_mut(&mut self) -> &mut Value {
        match self {
            Slot::Declared { value, .. } => value,
            Slot::Dynamic { value } => value,
        }
    }
}

// ============================================================================
// Construction
// ============================================================================

impl Record {
    /// Builds an instance: slots and containers first, then declared
    /// defaults, then the initial data through the regular write path,
    /// then the model's `init` method if one is defined.
    pub(crate) fn materialize(model: Model, initial: Value, options: CreateOptions) -> Record {
        let record = Record::instantiate(model);
        record.apply_defaults();
        let data = if options.clone {
            initial.deep_clone()
        } else {
            initial
        };
        record.set_all(data);
        record.run_init();
        record
    }

    fn instantiate(model: Model) -> Record {
        let sink = ErrorSink::default();
        let mut slots = IndexMap::new();
        for (name, descriptor) in model.field_table() {
            if descriptor.is_virtual() {
                continue;
            }
            let value = initial_container(descriptor, &sink);
            slots.insert(
                name.clone(),
                Slot::Declared {
                    descriptor: descriptor.clone(),
                    value,
                },
            );
        }
        Record {
            inner: Rc::new(RefCell::new(RecordInner { model, slots, sink })),
        }
    }

    fn apply_defaults(&self) {
        let defaults: Vec<(String, Value)> = {
            let inner = self.inner.borrow();
            inner
                .slots
                .iter()
                .filter_map(|(name, slot)| match slot {
                    Slot::Declared { descriptor, .. } => descriptor
                        .default
                        .as_ref()
                        .map(|source| (name.clone(), source.produce())),
                    Slot::Dynamic { .. } => None,
                })
                .collect()
        };
        // Defaults are schema-supplied, so they skip the read-only gate
        // and the write callbacks; coercion still applies.
        for (name, value) in defaults {
            let target = {
                let inner = self.inner.borrow();
                match inner.slots.get(&name) {
                    Some(Slot::Declared { descriptor, value }) => {
                        Some((descriptor.clone(), value.clone()))
                    }
                    _ => None,
                }
            };
            let Some((descriptor, previous)) = target else {
                continue;
            };
            match typecast(value, &previous, &descriptor) {
                Ok(coerced) => {
                    let mut inner = self.inner.borrow_mut();
                    if let Some(slot) = inner.slots.get_mut(&name) {
                        *slot.value_mut() = coerced;
                    }
                }
                Err(rejection) => self.inner.borrow().sink.push(rejection),
            }
        }
    }

    fn run_init(&self) {
        let has_init = self.inner.borrow().model.has_method("init");
        if has_init {
            if let Err(error) = self.invoke("init", &[]) {
                trace!(model = %self.model_name(), "init hook failed: {}", error);
            }
        }
    }
}

/// Array fields get their collection up front; typed object fields get a
/// nested instance when the model is already bound. Named references that
/// cannot be resolved yet stay null until the first write, which also
/// keeps mutually referential schemas from recursing forever here.
fn initial_container(descriptor: &Rc<FieldDescriptor>, sink: &ErrorSink) -> Value {
    match descriptor.kind() {
        FieldKind::Array => {
            let element = descriptor
                .array_type()
                .cloned()
                .unwrap_or_else(|| FieldDescriptor::bare(descriptor.name(), FieldKind::Any));
            Value::Collection(TypedCollection::new(
                Rc::new(element),
                descriptor.is_unique(),
                sink.clone(),
            ))
        }
        FieldKind::Object => match descriptor.object_type() {
            Some(ModelRef::Compiled(model)) => Value::Record(model.create(Value::Null)),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

// ============================================================================
// Reads
// ============================================================================

impl Record {
    /// Reads a field. Unset fields and unknown names read as null; with
    /// dot notation enabled, a dotted key digs through nested records,
    /// plain objects, and numeric collection indexes.
    pub fn get(&self, key: &str) -> Value {
        if self.options_dot_notation() && key.contains('.') {
            let segments: Vec<&str> = key.split('.').collect();
            return self.read_path(&segments);
        }
        self.read_direct(key)
    }

    fn read_direct(&self, key: &str) -> Value {
        enum Read {
            Stored(Value),
            Virtual(VirtualGetter),
            Missing,
        }
        let read = {
            let inner = self.inner.borrow();
            if let Some(slot) = inner.slots.get(key) {
                Read::Stored(slot.value().clone())
            } else {
                match inner.model.field(key) {
                    Some(descriptor) if descriptor.is_virtual() => descriptor
                        .virtual_def
                        .as_ref()
                        .map(|def| Read::Virtual(def.get.clone()))
                        .unwrap_or(Read::Missing),
                    _ => Read::Missing,
                }
            }
        };
        match read {
            Read::Stored(value) => value,
            Read::Virtual(getter) => getter(self),
            Read::Missing => Value::Null,
        }
    }

    fn read_path(&self, segments: &[&str]) -> Value {
        let mut current = self.read_direct(segments[0]);
        for segment in &segments[1..] {
            current = match current {
                Value::Record(record) => record.read_direct(segment),
                Value::Object(map) => map.get(*segment).cloned().unwrap_or(Value::Null),
                Value::Collection(collection) => match segment.parse::<usize>() {
                    Ok(index) => collection.get(index).unwrap_or(Value::Null),
                    Err(_) => Value::Null,
                },
                Value::Array(items) => match segment.parse::<usize>() {
                    Ok(index) => items.get(index).cloned().unwrap_or(Value::Null),
                    Err(_) => Value::Null,
                },
                _ => Value::Null,
            };
        }
        current
    }

    /// Names of the populated fields, in slot order: a scalar that holds
    /// a value, a collection with elements, a nested record that is
    /// itself populated, or any dynamic slot holding a non-null value.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.borrow();
        inner
            .slots
            .iter()
            .filter(|(_, slot)| is_populated(slot.value()))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Collection(collection) => !collection.is_empty(),
        Value::Record(record) => !record.keys().is_empty(),
        _ => true,
    }
}

// ============================================================================
// Writes
// ============================================================================

impl Record {
    /// Writes a field. The value is coerced and validated against the
    /// field's descriptor; a value that does not survive is dropped and
    /// the rejection is appended to [`get_errors`](Self::get_errors).
    /// Unknown names are dropped under a strict schema and admitted as
    /// dynamic slots otherwise.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.write(key, value.into());
    }

    /// Writes every entry of an object (or the populated fields of
    /// another record) through [`set`](Self::set). Anything else is
    /// ignored.
    pub fn set_all(&self, data: impl Into<Value>) {
        match data.into() {
            Value::Object(map) => {
                for (key, item) in map {
                    self.set(key.as_str(), item);
                }
            }
            Value::Record(record) => {
                for (key, item) in record.populated_pairs() {
                    self.set(key.as_str(), item);
                }
            }
            _ => {}
        }
    }

    fn write(&self, key: &str, value: Value) {
        let (before, after, dot_notation) = {
            let inner = self.inner.borrow();
            let options = inner.model.options();
            (
                options.before_set.clone(),
                options.on_set.clone(),
                options.dot_notation,
            )
        };

        if let Some(before) = before {
            match before(&value, key) {
                Ok(true) => {}
                Ok(false) => return,
                Err(message) => {
                    let rejection = SetterRejection::for_field(
                        key,
                        self.declared_kind(key),
                        message,
                        value,
                        self.peek(key),
                    );
                    self.inner.borrow().sink.push(rejection);
                    return;
                }
            }
        }

        let stored = if dot_notation && key.contains('.') {
            let segments: Vec<&str> = key.split('.').collect();
            self.write_path(&segments, value)
        } else {
            self.write_direct(key, value)
        };

        if let (Some(after), Some(stored)) = (after, stored) {
            after(&stored, key);
        }
    }

    fn write_direct(&self, key: &str, value: Value) -> Option<Value> {
        enum Route {
            Declared {
                descriptor: Rc<FieldDescriptor>,
                previous: Value,
            },
            Virtual(Option<VirtualSetter>),
            Admit,
            Drop,
        }

        let route = {
            let inner = self.inner.borrow();
            match inner.slots.get(key) {
                Some(Slot::Declared { descriptor, value }) => {
                    if descriptor.is_read_only() {
                        Route::Drop
                    } else {
                        Route::Declared {
                            descriptor: descriptor.clone(),
                            previous: value.clone(),
                        }
                    }
                }
                Some(Slot::Dynamic { .. }) => Route::Admit,
                None => match inner.model.field(key) {
                    Some(descriptor) if descriptor.is_virtual() => Route::Virtual(
                        descriptor
                            .virtual_def
                            .as_ref()
                            .and_then(|def| def.set.clone()),
                    ),
                    _ => {
                        if inner.model.options().strict || key == "model_name" {
                            Route::Drop
                        } else {
                            Route::Admit
                        }
                    }
                },
            }
        };

        match route {
            Route::Declared {
                descriptor,
                previous,
            } => match typecast(value, &previous, &descriptor) {
                Ok(coerced) => {
                    let mut inner = self.inner.borrow_mut();
                    if let Some(slot) = inner.slots.get_mut(key) {
                        *slot.value_mut() = coerced.clone();
                    }
                    Some(coerced)
                }
                Err(rejection) => {
                    self.inner.borrow().sink.push(rejection);
                    None
                }
            },
            Route::Virtual(Some(setter)) => {
                setter(self, value);
                None
            }
            Route::Virtual(None) => None,
            Route::Admit => {
                let mut inner = self.inner.borrow_mut();
                inner.slots.insert(
                    key.to_owned(),
                    Slot::Dynamic {
                        value: value.clone(),
                    },
                );
                Some(value)
            }
            Route::Drop => {
                trace!(field = key, "write dropped: undeclared or read-only");
                None
            }
        }
    }

    fn write_path(&self, segments: &[&str], value: Value) -> Option<Value> {
        let head = segments[0];
        if segments.len() == 1 {
            return self.write_direct(head, value);
        }

        enum Descend {
            IntoRecord(Record),
            PlainSlot,
            Instantiate(Model),
            AdmitPlain,
            Stop,
        }

        let descend = {
            let inner = self.inner.borrow();
            match inner.slots.get(head) {
                Some(Slot::Declared { descriptor, value }) => match value {
                    Value::Record(record) => Descend::IntoRecord(record.clone()),
                    Value::Object(_) => Descend::PlainSlot,
                    Value::Null if descriptor.kind() == FieldKind::Object => {
                        match descriptor.object_type() {
                            Some(model_ref) => match model_ref.resolve() {
                                Some(model) => Descend::Instantiate(model),
                                None => {
                                    inner.sink.push(SetterRejection::for_field(
                                        head,
                                        FieldKind::Object,
                                        format!(
                                            "model `{}` is not registered",
                                            model_ref.target_name()
                                        ),
                                        value.clone(),
                                        Value::Null,
                                    ));
                                    Descend::Stop
                                }
                            },
                            None => Descend::PlainSlot,
                        }
                    }
                    _ => Descend::Stop,
                },
                Some(Slot::Dynamic { value }) => match value {
                    Value::Record(record) => Descend::IntoRecord(record.clone()),
                    Value::Object(_) | Value::Null => Descend::PlainSlot,
                    _ => Descend::Stop,
                },
                None => {
                    if inner.model.options().strict {
                        Descend::Stop
                    } else {
                        Descend::AdmitPlain
                    }
                }
            }
        };

        match descend {
            Descend::IntoRecord(record) => record.write_path(&segments[1..], value),
            Descend::Instantiate(model) => {
                let fresh = model.create(Value::Null);
                {
                    let mut inner = self.inner.borrow_mut();
                    if let Some(slot) = inner.slots.get_mut(head) {
                        *slot.value_mut() = Value::Record(fresh.clone());
                    }
                }
                fresh.write_path(&segments[1..], value)
            }
            Descend::PlainSlot | Descend::AdmitPlain => {
                let mut inner = self.inner.borrow_mut();
                let slot = inner
                    .slots
                    .entry(head.to_owned())
                    .or_insert(Slot::Dynamic { value: Value::Null });
                let target = slot.value_mut();
                if target.is_null() {
                    *target = Value::Object(IndexMap::new());
                }
                match target {
                    Value::Object(map) => write_into_map(map, &segments[1..], value),
                    _ => None,
                }
            }
            Descend::Stop => None,
        }
    }

    /// Clears a single field: collections and nested records are cleared
    /// in place, declared scalars go back to null, dynamic slots are
    /// removed.
    pub fn unset(&self, key: &str) {
        enum Reset {
            Collection(TypedCollection),
            Nested(Record),
            Scalar,
            Remove,
            Nothing,
        }
        let reset = {
            let inner = self.inner.borrow();
            match inner.slots.get(key) {
                Some(Slot::Declared { value, .. }) => match value {
                    Value::Collection(collection) => Reset::Collection(collection.clone()),
                    Value::Record(record) => Reset::Nested(record.clone()),
                    _ => Reset::Scalar,
                },
                Some(Slot::Dynamic { .. }) => Reset::Remove,
                None => Reset::Nothing,
            }
        };
        match reset {
            Reset::Collection(collection) => collection.clear(),
            Reset::Nested(record) => record.clear(),
            Reset::Scalar => {
                let mut inner = self.inner.borrow_mut();
                if let Some(slot) = inner.slots.get_mut(key) {
                    *slot.value_mut() = Value::Null;
                }
            }
            Reset::Remove => {
                let mut inner = self.inner.borrow_mut();
                inner.slots.shift_remove(key);
            }
            Reset::Nothing => {}
        }
    }

    /// Clears every field in place: collections keep their store, nested
    /// records keep their instance, declared scalars go back to null,
    /// dynamic slots are removed. The error list is left alone.
    pub fn clear(&self) {
        enum Wipe {
            Collection(TypedCollection),
            Nested(Record),
            Scalar(String),
            Remove(String),
        }
        let wipes: Vec<Wipe> = {
            let inner = self.inner.borrow();
            inner
                .slots
                .iter()
                .map(|(name, slot)| match slot {
                    Slot::Declared { value, .. } => match value {
                        Value::Collection(collection) => Wipe::Collection(collection.clone()),
                        Value::Record(record) => Wipe::Nested(record.clone()),
                        _ => Wipe::Scalar(name.clone()),
                    },
                    Slot::Dynamic { .. } => Wipe::Remove(name.clone()),
                })
                .collect()
        };
        for wipe in wipes {
            match wipe {
                Wipe::Collection(collection) => collection.clear(),
                Wipe::Nested(record) => record.clear(),
                Wipe::Scalar(name) => {
                    let mut inner = self.inner.borrow_mut();
                    if let Some(slot) = inner.slots.get_mut(&name) {
                        *slot.value_mut() = Value::Null;
                    }
                }
                Wipe::Remove(name) => {
                    let mut inner = self.inner.borrow_mut();
                    inner.slots.shift_remove(&name);
                }
            }
        }
    }

    fn peek(&self, key: &str) -> Value {
        let inner = self.inner.borrow();
        inner
            .slots
            .get(key)
            .map(|slot| slot.value().clone())
            .unwrap_or(Value::Null)
    }

    fn declared_kind(&self, key: &str) -> FieldKind {
        let inner = self.inner.borrow();
        match inner.slots.get(key) {
            Some(Slot::Declared { descriptor, .. }) => descriptor.kind(),
            _ => FieldKind::Any,
        }
    }

    fn options_dot_notation(&self) -> bool {
        self.inner.borrow().model.options().dot_notation
    }
}

/// Walks `segments` through nested plain maps, creating object
/// intermediates as needed. A non-object intermediate aborts the write.
fn write_into_map(
    map: &mut IndexMap<String, Value>,
    segments: &[&str],
    value: Value,
) -> Option<Value> {
    let head = segments[0];
    if segments.len() == 1 {
        map.insert(head.to_owned(), value.clone());
        return Some(value);
    }
    let entry = map
        .entry(head.to_owned())
        .or_insert_with(|| Value::Object(IndexMap::new()));
    match entry {
        Value::Object(nested) => write_into_map(nested, &segments[1..], value),
        _ => None,
    }
}

// ============================================================================
// Errors, identity, methods
// ============================================================================

impl Record {
    /// Every rejection accumulated by writes to this record and its
    /// collections, oldest first.
    pub fn get_errors(&self) -> Vec<SetterRejection> {
        self.inner.borrow().sink.list()
    }

    pub fn has_errors(&self) -> bool {
        self.inner.borrow().sink.has_any()
    }

    pub fn clear_errors(&self) {
        self.inner.borrow().sink.clear();
    }

    /// The compiled model this record was created from.
    pub fn model(&self) -> Model {
        self.inner.borrow().model.clone()
    }

    pub fn model_name(&self) -> String {
        self.inner.borrow().model.name().to_owned()
    }

    /// Whether two handles point at the same instance.
    pub fn same_record(&self, other: &Record) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Runs a model method through its hook pipeline: every `pre` hook,
    /// then the body, then every `post` hook. The first hook or body
    /// error short-circuits the rest.
    pub fn invoke(&self, name: &str, args: &[Value]) -> InvokeResult<Value> {
        let model = self.model();
        model.run_method(self, name, args)
    }

    /// The `save` lifecycle method. Hookable even when the schema never
    /// defines a body; the default body hands back the record.
    pub fn save(&self) -> InvokeResult<Value> {
        self.invoke("save", &[])
    }

    /// The `remove` lifecycle method, hookable like `save`.
    pub fn remove(&self) -> InvokeResult<Value> {
        self.invoke("remove", &[])
    }

    /// A deep copy: a fresh instance of the same model carrying deep
    /// clones of every populated field, including invisible ones.
    pub fn duplicate(&self) -> Record {
        let mut data = IndexMap::new();
        for (key, value) in self.populated_pairs() {
            data.insert(key, value.deep_clone());
        }
        self.model().create(Value::Object(data))
    }

    /// Populated fields with their raw stored values, handles included.
    pub(crate) fn populated_pairs(&self) -> Vec<(String, Value)> {
        let inner = self.inner.borrow();
        inner
            .slots
            .iter()
            .filter(|(_, slot)| is_populated(slot.value()))
            .map(|(name, slot)| (name.clone(), slot.value().clone()))
            .collect()
    }

    /// Field-by-field structural equality over populated fields.
    pub(crate) fn content_eq(&self, other: &Record) -> bool {
        if Rc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        let mine = self.populated_pairs();
        let theirs: IndexMap<String, Value> = other.populated_pairs().into_iter().collect();
        mine.len() == theirs.len()
            && mine
                .iter()
                .all(|(key, value)| theirs.get(key.as_str()) == Some(value))
    }

    /// Slot order, descriptors, and raw values in one pass, for the
    /// projection walk.
    pub(crate) fn slot_snapshot(&self) -> Vec<(String, Option<Rc<FieldDescriptor>>, Value)> {
        let inner = self.inner.borrow();
        inner
            .slots
            .iter()
            .map(|(name, slot)| match slot {
                Slot::Declared { descriptor, value } => {
                    (name.clone(), Some(descriptor.clone()), value.clone())
                }
                Slot::Dynamic { value } => (name.clone(), None, value.clone()),
            })
            .collect()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Record) -> bool {
        self.content_eq(other)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Record")
            .field("model", &inner.model.name())
            .field("slots", &inner.slots.len())
            .field("errors", &inner.sink.len())
            .finish()
    }
}
