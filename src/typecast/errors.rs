//! # Coercion Rejections
//!
//! The failure signal produced when a value cannot be coerced into a
//! field, or violates one of the field's declared constraints. Rejections
//! are diagnostics, not faults: the write boundary catches them, appends
//! them to the owning record's error sink, and drops the write. They are
//! never propagated to the caller of a property write.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::descriptor::{FieldDescriptor, FieldKind};
use crate::value::Value;

/// Result type for one coercion pass.
pub type CastResult = Result<Value, SetterRejection>;

/// Record of one rejected write: what was attempted, what the field held
/// before, and which field turned it away.
#[derive(Debug, Clone, Serialize)]
pub struct SetterRejection {
    field: String,
    kind: FieldKind,
    message: String,
    set_value: Value,
    original_value: Value,
}

impl SetterRejection {
    pub(crate) fn new(
        message: impl Into<String>,
        set_value: Value,
        original_value: Value,
        descriptor: &FieldDescriptor,
    ) -> Self {
        SetterRejection {
            field: descriptor.name().to_owned(),
            kind: descriptor.kind(),
            message: message.into(),
            set_value,
            original_value,
        }
    }

    /// Rejection that did not come out of a descriptor rule, e.g. a write
    /// aborted by the schema's `before_set` callback.
    pub(crate) fn for_field(
        field: impl Into<String>,
        kind: FieldKind,
        message: impl Into<String>,
        set_value: Value,
        original_value: Value,
    ) -> Self {
        SetterRejection {
            field: field.into(),
            kind,
            message: message.into(),
            set_value,
            original_value,
        }
    }

    /// Name of the field the write targeted.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Declared kind of the target field.
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Why the value was turned away.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The value the caller attempted to store.
    pub fn set_value(&self) -> &Value {
        &self.set_value
    }

    /// What the field held when the write arrived.
    pub fn original_value(&self) -> &Value {
        &self.original_value
    }
}

impl fmt::Display for SetterRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field `{}` ({}): {} (got {})",
            self.field,
            self.kind.type_name(),
            self.message,
            self.set_value.type_name()
        )
    }
}

// ============================================================================
// Error Sink
// ============================================================================

/// Shared accumulator behind a record's error list.
///
/// The record and every typed collection bound to one of its array fields
/// hold clones of the same sink, so rejections raised inside a collection
/// land on the owning record's list. Handles are reference-counted; a
/// collection detached from its record keeps the sink alive and keeps
/// reporting into it.
#[derive(Clone, Default)]
pub(crate) struct ErrorSink {
    entries: Rc<RefCell<Vec<SetterRejection>>>,
}

impl ErrorSink {
    pub(crate) fn push(&self, rejection: SetterRejection) {
        self.entries.borrow_mut().push(rejection);
    }

    pub(crate) fn list(&self) -> Vec<SetterRejection> {
        self.entries.borrow().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub(crate) fn has_any(&self) -> bool {
        !self.entries.borrow().is_empty()
    }

    pub(crate) fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorSink")
            .field("entries", &self.len())
            .finish()
    }
}
