//! Type coercion subsystem.
//!
//! The pure engine every write routes through.
//!
//! # Design Principles
//!
//! - Stateless: value in, value or rejection out
//! - Fixed rule order: transform, kind rules, validate
//! - Rejections are diagnostics routed to the owning record, never faults
//! - Container fields mutate in place; identity is never swapped

mod cast;
mod errors;

pub use cast::typecast;
pub use errors::{CastResult, SetterRejection};

pub(crate) use errors::ErrorSink;
