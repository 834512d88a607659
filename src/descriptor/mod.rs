//! Field descriptor subsystem.
//!
//! Schemas are declared in shorthand and compiled into canonical
//! descriptors exactly once.
//!
//! # Design Principles
//!
//! - Four input shapes: bare kind, model reference, one-element array,
//!   nested shape
//! - Canonical tag is always the lower-case [`FieldKind`], never a
//!   shorthand
//! - Modifiers are carried verbatim; only coercion gives them meaning
//! - Malformed declarations fail at compile time, not on first write

mod errors;
mod normalize;
mod types;

pub use errors::{SchemaError, SchemaResult};
pub use normalize::{FieldDescriptor, VirtualDef};
pub use types::{
    ComputeFn, DefaultSource, Field, FieldKind, FieldSpec, SchemaDescriptor, TransformFn,
    ValidateFn, VirtualGetter, VirtualSetter,
};

pub(crate) use normalize::{normalize, ModelRef, NormalizeCx};
