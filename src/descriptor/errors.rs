//! # Descriptor Errors
//!
//! Definition-time failures raised while building or compiling a schema.
//! These are fatal to the caller of the schema-building call; malformed
//! data at write time is a different animal (see the typecast errors).

use thiserror::Error;

/// Result type for schema definition and compilation.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while a schema is being defined or compiled.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// A field was declared with an empty name
    #[error("field name must not be empty")]
    EmptyFieldName,

    /// A `pattern` modifier failed to compile
    #[error("invalid pattern on field `{field}`: {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },

    /// A custom method would shadow part of the record API
    #[error("method name `{0}` is reserved by the record API")]
    ReservedMethod(String),

    /// A custom static would shadow part of the model API
    #[error("static name `{0}` is reserved by the model API")]
    ReservedStatic(String),

    /// A hook targets a method the schema never defines. `save` and
    /// `remove` are always hookable; everything else needs a body.
    #[error("hook targets `{0}`, which is not a method of this schema")]
    UnknownHookTarget(String),
}
