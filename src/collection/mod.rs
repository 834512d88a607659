//! Typed collection subsystem.
//!
//! Every array field owns exactly one [`TypedCollection`] for the life of
//! the record. Elements pass through the coercion engine on the way in,
//! and rejections are routed to the owning record's error sink rather
//! than surfaced to the caller.
//!
//! # Design Principles
//!
//! - One collection per array field; writes fill it, never replace it
//! - `push` is forgiving: bad elements are dropped and logged, good ones
//!   land
//! - `set` is all-or-nothing: one bad element leaves the contents
//!   untouched
//! - Handles are cheap clones of the same backing store

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::descriptor::FieldDescriptor;
use crate::typecast::{typecast, ErrorSink};
use crate::value::Value;

/// Handle to the element store behind one array field.
///
/// Cloning yields another handle to the same store, which is what keeps
/// collection identity stable across record writes: assigning a new array
/// to the field re-fills this store instead of swapping it out.
#[derive(Clone)]
pub struct TypedCollection {
    inner: Rc<RefCell<CollectionInner>>,
}

struct CollectionInner {
    element: Rc<FieldDescriptor>,
    unique: bool,
    sink: ErrorSink,
    items: Vec<Value>,
}

impl TypedCollection {
    pub(crate) fn new(element: Rc<FieldDescriptor>, unique: bool, sink: ErrorSink) -> Self {
        TypedCollection {
            inner: Rc::new(RefCell::new(CollectionInner {
                element,
                unique,
                sink,
                items: Vec::new(),
            })),
        }
    }

    /// Appends one value, coercing it to the element type first. A value
    /// the element type rejects is dropped and the rejection lands on the
    /// owning record's error list; a value that coerces to null is dropped
    /// silently. With `unique` declared, values the collection already
    /// held when the call began are skipped.
    pub fn push(&self, value: impl Into<Value>) {
        self.push_all([value.into()]);
    }

    /// [`push`](Self::push) for a batch: each element is admitted or
    /// dropped independently. Uniqueness is judged against the contents
    /// as of the call, so duplicates within one batch all land.
    pub fn push_all(&self, values: impl IntoIterator<Item = Value>) {
        let (element, unique, sink) = self.context();
        let existing = if unique { self.values() } else { Vec::new() };
        for value in values {
            match typecast(value, &Value::Null, &element) {
                Ok(coerced) => {
                    if coerced.is_null() {
                        continue;
                    }
                    if unique && existing.contains(&coerced) {
                        continue;
                    }
                    self.inner.borrow_mut().items.push(coerced);
                }
                Err(rejection) => sink.push(rejection),
            }
        }
    }

    /// Replaces the contents wholesale. Every incoming element is
    /// validated first; if any of them is rejected, every rejection is
    /// recorded and the existing contents stay exactly as they were.
    /// `unique` never filters here: the old contents are gone by the
    /// time the new ones land.
    pub fn set(&self, values: impl IntoIterator<Item = Value>) {
        let (element, _, sink) = self.context();
        let mut incoming = Vec::new();
        let mut clean = true;
        for value in values {
            match typecast(value, &Value::Null, &element) {
                Ok(coerced) => incoming.push(coerced),
                Err(rejection) => {
                    clean = false;
                    sink.push(rejection);
                }
            }
        }
        if !clean {
            return;
        }

        let mut inner = self.inner.borrow_mut();
        inner.items.clear();
        for coerced in incoming {
            if coerced.is_null() {
                continue;
            }
            inner.items.push(coerced);
        }
    }

    /// Builds a new collection holding this one's contents followed by
    /// the given arguments. Array and collection arguments contribute
    /// their elements; anything else is appended as a single element.
    /// Elements go in one push at a time, so on a `unique` collection
    /// later duplicates collapse. The receiver is left untouched; the
    /// new collection shares the receiver's element type and error sink.
    pub fn concat(&self, args: impl IntoIterator<Item = Value>) -> TypedCollection {
        let (element, unique, sink) = self.context();
        let combined = TypedCollection::new(element, unique, sink);
        for value in self.to_array() {
            combined.push(value);
        }
        for arg in args {
            match arg {
                Value::Collection(collection) => {
                    for value in collection.to_array() {
                        combined.push(value);
                    }
                }
                Value::Array(items) => {
                    for value in items {
                        combined.push(value);
                    }
                }
                other => combined.push(other),
            }
        }
        combined
    }

    /// Snapshots the contents as a plain vector: record elements are
    /// projected to plain objects, nested collections to plain arrays,
    /// everything else is cloned as-is.
    pub fn to_array(&self) -> Vec<Value> {
        self.values().iter().map(snapshot).collect()
    }

    /// The contents as a JSON array, dates rendered as ISO 8601 strings.
    pub fn to_json(&self) -> serde_json::Value {
        Value::Array(self.to_array()).to_json_value(true)
    }

    /// Raw clones of the stored elements, record and collection handles
    /// included.
    pub fn values(&self) -> Vec<Value> {
        self.inner.borrow().items.clone()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.borrow().items.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().items.is_empty()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.inner.borrow().items.contains(value)
    }

    /// Drops every element. The backing store survives, so other handles
    /// to this collection observe the wipe.
    pub fn clear(&self) {
        self.inner.borrow_mut().items.clear();
    }

    /// Whether two handles share one backing store.
    pub fn same_store(&self, other: &TypedCollection) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn context(&self) -> (Rc<FieldDescriptor>, bool, ErrorSink) {
        let inner = self.inner.borrow();
        (inner.element.clone(), inner.unique, inner.sink.clone())
    }
}

fn snapshot(value: &Value) -> Value {
    match value {
        Value::Record(record) => record.to_object(None),
        Value::Collection(collection) => Value::Array(collection.to_array()),
        other => other.clone(),
    }
}

impl fmt::Debug for TypedCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("TypedCollection")
            .field("element", &inner.element.kind())
            .field("len", &inner.items.len())
            .finish()
    }
}
