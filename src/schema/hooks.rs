//! Method hook pipelines.
//!
//! Every model method compiles into one [`MethodPipeline`]: the `pre`
//! hooks in registration order, the body, the `post` hooks in
//! registration order. Invocation runs the stages in that order and the
//! first error stops the call; a post hook never sees a result the body
//! did not produce.

use std::rc::Rc;

use tracing::trace;

use super::compile::Model;
use super::errors::InvokeResult;
use crate::record::Record;
use crate::value::Value;

/// A model method body, invoked with the record and the call arguments.
pub type Method = Rc<dyn Fn(&Record, &[Value]) -> InvokeResult<Value>>;

/// A static function, invoked with the model handle and the call
/// arguments.
pub type StaticFn = Rc<dyn Fn(&Model, &[Value]) -> InvokeResult<Value>>;

/// Runs before a method body with the call arguments. An error stops
/// the call before the body runs.
pub type PreHook = Rc<dyn Fn(&Record, &[Value]) -> InvokeResult<()>>;

/// Runs after a method body with the body's result. An error fails the
/// call even though the body already ran.
pub type PostHook = Rc<dyn Fn(&Record, &Value) -> InvokeResult<()>>;

/// A hook waiting in a schema builder for compilation to attach it.
#[derive(Clone)]
pub(crate) enum QueuedHook {
    Pre { target: String, hook: PreHook },
    Post { target: String, hook: PostHook },
}

impl QueuedHook {
    pub(crate) fn target(&self) -> &str {
        match self {
            QueuedHook::Pre { target, .. } => target,
            QueuedHook::Post { target, .. } => target,
        }
    }
}

/// One compiled method: hooks on both sides of an optional body.
pub(crate) struct MethodPipeline {
    pub(crate) pres: Vec<PreHook>,
    pub(crate) body: Option<Method>,
    pub(crate) posts: Vec<PostHook>,
}

impl MethodPipeline {
    /// Pipeline for `save` and `remove`, which are hookable whether or
    /// not the schema declares a body.
    pub(crate) fn lifecycle() -> Self {
        MethodPipeline {
            pres: Vec::new(),
            body: None,
            posts: Vec::new(),
        }
    }

    pub(crate) fn with_body(body: Method) -> Self {
        MethodPipeline {
            pres: Vec::new(),
            body: Some(body),
            posts: Vec::new(),
        }
    }

    pub(crate) fn run(&self, record: &Record, args: &[Value]) -> InvokeResult<Value> {
        for pre in &self.pres {
            if let Err(error) = pre(record, args) {
                trace!("pre hook stopped the call: {}", error);
                return Err(error);
            }
        }
        let result = match &self.body {
            Some(body) => body(record, args)?,
            // A bodiless lifecycle method hands back the record.
            None => Value::Record(record.clone()),
        };
        for post in &self.posts {
            post(record, &result)?;
        }
        Ok(result)
    }
}
