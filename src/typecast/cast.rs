//! Pure coercion engine.
//!
//! One entry point, [`typecast`]: given an incoming value, the value the
//! field currently holds, and the field's descriptor, produce the value to
//! store or a [`SetterRejection`]. The engine holds no state; callers own
//! error routing. Rule order is fixed for every kind: the generic
//! `transform` runs first, then the kind's coercion and constraints, then
//! the `validate` predicate.
//!
//! Two kinds mutate in place instead of producing fresh values: array
//! coercion fills the field's existing collection (identity is never
//! swapped), and object coercion re-assigns the existing nested record
//! when one is live. Callers holding references to either observe the
//! mutation.

use chrono::{DateTime, TimeZone, Utc};
use tracing::trace;

use super::errors::{CastResult, SetterRejection};
use crate::descriptor::{FieldDescriptor, FieldKind};
use crate::value::Value;

/// Coerces `value` for storage in the field described by `descriptor`.
/// `previous` is what the field holds right now; it is consulted for
/// in-place container updates and carried into rejections.
pub fn typecast(value: Value, previous: &Value, descriptor: &FieldDescriptor) -> CastResult {
    let value = match &descriptor.transform {
        Some(transform) => transform(value),
        None => value,
    };

    match descriptor.kind {
        FieldKind::String => cast_string(value, previous, descriptor),
        FieldKind::Number => cast_number(value, previous, descriptor),
        FieldKind::Boolean => cast_boolean(value, previous, descriptor),
        FieldKind::Date => cast_date(value, previous, descriptor),
        FieldKind::Array => cast_array(value, previous, descriptor),
        FieldKind::Object => cast_object(value, previous, descriptor),
        FieldKind::Any => finish(value, previous, descriptor),
    }
}

/// Final gate shared by every kind: the custom `validate` predicate.
/// Cleared values skip it, so a predicate can never block unsetting.
fn finish(value: Value, previous: &Value, descriptor: &FieldDescriptor) -> CastResult {
    if let Some(validate) = &descriptor.validate {
        if !value.is_null() && !validate(&value) {
            return Err(reject(
                "failed the declared validate check",
                value,
                previous,
                descriptor,
            ));
        }
    }
    Ok(value)
}

fn cast_string(value: Value, previous: &Value, descriptor: &FieldDescriptor) -> CastResult {
    match &value {
        Value::Null => return Ok(Value::Null),
        Value::Object(_) | Value::Array(_) | Value::Date(_) | Value::Record(_)
        | Value::Collection(_) => {
            return Err(reject(
                format!("cannot coerce {} to string", value.type_name()),
                value,
                previous,
                descriptor,
            ));
        }
        _ => {}
    }

    let mut text = value.to_string();

    if let Some(transform) = &descriptor.string_transform {
        text = match transform(Value::String(text)) {
            Value::String(s) => s,
            other => other.to_string(),
        };
    }

    if descriptor.clip {
        if let Some(max) = descriptor.max_length {
            text = text.chars().take(max).collect();
        }
    }

    if let Some(permitted) = &descriptor.one_of {
        if !permitted.iter().any(|candidate| candidate == &text) {
            return Err(reject(
                "does not appear in the permitted set",
                Value::String(text),
                previous,
                descriptor,
            ));
        }
    }

    if let Some(min) = descriptor.min_length {
        if text.chars().count() < min {
            return Err(reject(
                "shorter than the declared minimum length",
                Value::String(text),
                previous,
                descriptor,
            ));
        }
    }

    if let Some(max) = descriptor.max_length {
        if text.chars().count() > max {
            return Err(reject(
                "longer than the declared maximum length",
                Value::String(text),
                previous,
                descriptor,
            ));
        }
    }

    if let Some(regex) = &descriptor.regex {
        if !regex.is_match(&text) {
            return Err(reject(
                "does not match the declared pattern",
                Value::String(text),
                previous,
                descriptor,
            ));
        }
    }

    finish(Value::String(text), previous, descriptor)
}

fn cast_number(value: Value, previous: &Value, descriptor: &FieldDescriptor) -> CastResult {
    let mut number = match &value {
        Value::Null => return Ok(Value::Null),
        Value::String(s) if s.is_empty() => return Ok(Value::Null),
        Value::Bool(_) => {
            return Err(reject(
                "cannot coerce boolean to number",
                value,
                previous,
                descriptor,
            ));
        }
        Value::Number(n) => *n,
        Value::String(s) => match parse_numeric(s) {
            Some(n) => n,
            None => {
                return Err(reject(
                    "not a numeric value",
                    value,
                    previous,
                    descriptor,
                ));
            }
        },
        other => {
            return Err(reject(
                format!("cannot coerce {} to number", other.type_name()),
                value,
                previous,
                descriptor,
            ));
        }
    };

    if let Some(transform) = &descriptor.number_transform {
        number = transform(Value::Number(number)).as_number().unwrap_or(number);
    }

    if let Some(min) = descriptor.min {
        if number < min {
            return Err(reject(
                "below the declared minimum",
                Value::Number(number),
                previous,
                descriptor,
            ));
        }
    }

    if let Some(max) = descriptor.max {
        if number > max {
            return Err(reject(
                "above the declared maximum",
                Value::Number(number),
                previous,
                descriptor,
            ));
        }
    }

    finish(Value::Number(number), previous, descriptor)
}

fn cast_boolean(value: Value, previous: &Value, descriptor: &FieldDescriptor) -> CastResult {
    let mut flag = match &value {
        Value::Null => return Ok(Value::Null),
        Value::String(s) if s.is_empty() => return Ok(Value::Null),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => {
                return Err(reject(
                    "not a boolean word",
                    value,
                    previous,
                    descriptor,
                ));
            }
        },
        Value::Bool(b) => *b,
        other => {
            return Err(reject(
                format!("cannot coerce {} to boolean", other.type_name()),
                value,
                previous,
                descriptor,
            ));
        }
    };

    if let Some(transform) = &descriptor.boolean_transform {
        flag = transform(Value::Bool(flag)).as_bool().unwrap_or(flag);
    }

    finish(Value::Bool(flag), previous, descriptor)
}

fn cast_date(value: Value, previous: &Value, descriptor: &FieldDescriptor) -> CastResult {
    let mut date = match &value {
        Value::Null => return Ok(Value::Null),
        Value::String(s) if s.is_empty() => return Ok(Value::Null),
        Value::Date(d) => *d,
        Value::String(s) => match parse_date_string(s) {
            Some(d) => d,
            None => {
                return Err(reject("not a parseable date", value, previous, descriptor));
            }
        },
        Value::Number(n) => match date_from_epoch(*n) {
            Some(d) => d,
            None => {
                return Err(reject("not a parseable date", value, previous, descriptor));
            }
        },
        other => {
            return Err(reject(
                format!("cannot coerce {} to date", other.type_name()),
                value,
                previous,
                descriptor,
            ));
        }
    };

    if let Some(transform) = &descriptor.date_transform {
        date = transform(Value::Date(date)).as_date().unwrap_or(date);
    }

    finish(Value::Date(date), previous, descriptor)
}

fn cast_array(value: Value, previous: &Value, descriptor: &FieldDescriptor) -> CastResult {
    let items: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Collection(collection) => collection.values(),
        Value::Object(map) => map.into_iter().map(|(_, item)| item).collect(),
        Value::Record(record) => record
            .populated_pairs()
            .into_iter()
            .map(|(_, item)| item)
            .collect(),
        other => {
            return Err(reject(
                format!("cannot coerce {} to array", other.type_name()),
                other,
                previous,
                descriptor,
            ));
        }
    };

    match previous {
        // The field's collection always exists and is never replaced; new
        // contents land in it all-or-nothing.
        Value::Collection(collection) => {
            collection.set(items);
            finish(Value::Collection(collection.clone()), previous, descriptor)
        }
        // Detached cast (array-of-array elements): no collection and no
        // error sink to route to, so coerce forgivingly into a plain array.
        _ => {
            let fallback = FieldDescriptor::bare(descriptor.name(), FieldKind::Any);
            let element = descriptor.array_type().unwrap_or(&fallback);
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                if let Ok(coerced) = typecast(item, &Value::Null, element) {
                    out.push(coerced);
                }
            }
            finish(Value::Array(out), previous, descriptor)
        }
    }
}

fn cast_object(value: Value, previous: &Value, descriptor: &FieldDescriptor) -> CastResult {
    let target = match descriptor.object_type() {
        // Untyped object field: plain objects (and records) store as given.
        None => {
            return match value {
                Value::Object(_) | Value::Record(_) => finish(value, previous, descriptor),
                other => Err(reject(
                    format!("cannot coerce {} to object", other.type_name()),
                    other,
                    previous,
                    descriptor,
                )),
            };
        }
        Some(model_ref) => match model_ref.resolve() {
            Some(model) => model,
            None => {
                return Err(reject(
                    format!("model `{}` is not registered", model_ref.target_name()),
                    value,
                    previous,
                    descriptor,
                ));
            }
        },
    };

    let pairs: Vec<(String, Value)> = match &value {
        Value::Object(map) => map
            .iter()
            .map(|(key, item)| (key.clone(), item.clone()))
            .collect(),
        // An assigned record contributes its populated fields; the
        // incoming handle itself is never stored.
        Value::Record(record) => record.populated_pairs(),
        other => {
            return Err(reject(
                format!("cannot coerce {} to object", other.type_name()),
                other.clone(),
                previous,
                descriptor,
            ));
        }
    };

    let assigned = match previous {
        Value::Record(existing) => {
            existing.clear();
            existing.clone()
        }
        _ => target.create(Value::Null),
    };
    for (key, item) in pairs {
        assigned.set(key.as_str(), item);
    }

    finish(Value::Record(assigned), previous, descriptor)
}

fn reject(
    message: impl Into<String>,
    value: Value,
    previous: &Value,
    descriptor: &FieldDescriptor,
) -> SetterRejection {
    let rejection = SetterRejection::new(message, value, previous.clone(), descriptor);
    trace!(
        field = rejection.field(),
        "coercion rejected: {}",
        rejection.message()
    );
    rejection
}

// ==================
// Parsing helpers
// ==================

/// Full-string numeric parse; non-finite results count as non-numeric.
fn parse_numeric(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_date_string(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&parsed));
    }
    if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&parsed));
    }
    if let Ok(parsed) = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return parsed
            .and_hms_opt(0, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive));
    }
    None
}

/// A numeric timestamp is epoch seconds when its decimal rendering fits in
/// ten characters, epoch milliseconds otherwise.
fn date_from_epoch(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() {
        return None;
    }
    let millis = if n.to_string().len() > 10 {
        n
    } else {
        n * 1000.0
    };
    Utc.timestamp_millis_opt(millis as i64).single()
}
