//! # Invocation Errors
//!
//! Failures surfaced by method calls. Unlike write rejections, these are
//! returned to the caller: a pre hook that refuses, a body that fails, or
//! a name the model simply does not define.

use thiserror::Error;

/// Result type for method and static invocation.
pub type InvokeResult<T> = Result<T, InvokeError>;

/// Errors raised by [`Record::invoke`](crate::record::Record::invoke) and
/// [`Model::call_static`](crate::schema::Model::call_static).
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// The model defines no method under this name
    #[error("no method named `{0}` on this model")]
    UnknownMethod(String),

    /// The model defines no static under this name
    #[error("no static named `{0}` on this model")]
    UnknownStatic(String),

    /// A hook or body reported failure
    #[error("{0}")]
    Failed(String),
}

impl InvokeError {
    /// Failure with a caller-supplied message, the usual way for hook
    /// and method bodies to bail out.
    pub fn failed(message: impl Into<String>) -> Self {
        InvokeError::Failed(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_carries_the_message_verbatim() {
        let err = InvokeError::failed("not old enough");
        assert_eq!(err.to_string(), "not old enough");
    }

    #[test]
    fn test_unknown_method_names_the_method() {
        let err = InvokeError::UnknownMethod("fly".into());
        assert!(err.to_string().contains("`fly`"));
    }
}
