//! Record projections.
//!
//! `to_object` and `to_json` flatten a record into plain values. The two
//! read independent option namespaces from the schema, and a caller can
//! override any option inline for one call. The walk keeps slot order,
//! drops invisible fields, appends virtuals when asked to, and hands the
//! finished result to the namespace's `transform` last. Inline options
//! propagate into nested records, except `transform`, which only ever
//! applies to the record it was declared or passed on.

use indexmap::IndexMap;

use super::Record;
use crate::schema::{SerializeOptions, TransformDocFn};
use crate::value::{format_iso, Value};

/// Which schema namespace a projection reads its defaults from.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProjectionKind {
    Object,
    Json,
}

/// Options after overlaying inline values on the schema namespace.
pub(crate) struct ResolvedProjection {
    transform: Option<TransformDocFn>,
    virtuals: bool,
    minimize: bool,
    date_to_iso: bool,
}

impl Record {
    /// Plain-value snapshot of the record. Dates stay dates unless
    /// `date_to_iso` asks for ISO 8601 strings.
    pub fn to_object(&self, inline: Option<&SerializeOptions>) -> Value {
        let resolved = self.resolve_projection(ProjectionKind::Object, inline);
        self.project(false, inline, &resolved)
    }

    /// JSON snapshot of the record. Dates render as ISO 8601 strings by
    /// default, and as epoch milliseconds when `date_to_iso` is turned
    /// off.
    pub fn to_json(&self, inline: Option<&SerializeOptions>) -> serde_json::Value {
        let resolved = self.resolve_projection(ProjectionKind::Json, inline);
        self.project(true, inline, &resolved)
            .to_json_value(resolved.date_to_iso)
    }

    /// Schema-default projection, used when a record embedded in a plain
    /// value tree is serialized.
    pub(crate) fn projection(&self, inline: Option<&SerializeOptions>, json: bool) -> Value {
        let kind = if json {
            ProjectionKind::Json
        } else {
            ProjectionKind::Object
        };
        let resolved = self.resolve_projection(kind, inline);
        self.project(json, inline, &resolved)
    }

    fn resolve_projection(
        &self,
        kind: ProjectionKind,
        inline: Option<&SerializeOptions>,
    ) -> ResolvedProjection {
        let options = self.inner.borrow().model.options().clone();
        let namespace = match kind {
            ProjectionKind::Object => &options.to_object,
            ProjectionKind::Json => &options.to_json,
        };
        let pick = |select: fn(&SerializeOptions) -> Option<bool>, fallback: bool| {
            inline
                .and_then(select)
                .or_else(|| select(namespace))
                .unwrap_or(fallback)
        };
        ResolvedProjection {
            transform: inline
                .and_then(|options| options.transform.clone())
                .or_else(|| namespace.transform.clone()),
            virtuals: pick(|options| options.virtuals, false),
            minimize: pick(|options| options.minimize, options.minimize),
            date_to_iso: pick(
                |options| options.date_to_iso,
                kind == ProjectionKind::Json,
            ),
        }
    }

    fn project(
        &self,
        json: bool,
        inline: Option<&SerializeOptions>,
        resolved: &ResolvedProjection,
    ) -> Value {
        // Nested records inherit the caller's inline options, minus the
        // transform.
        let passed_down = inline.map(|options| SerializeOptions {
            transform: None,
            ..options.clone()
        });
        let child_inline = passed_down.as_ref();

        let mut out = IndexMap::new();
        for (name, descriptor, raw) in self.slot_snapshot() {
            if let Some(descriptor) = &descriptor {
                if descriptor.is_invisible() {
                    continue;
                }
            }
            match raw {
                Value::Null => {}
                Value::Collection(collection) => {
                    if collection.is_empty() {
                        if !resolved.minimize {
                            out.insert(name, Value::Array(Vec::new()));
                        }
                    } else {
                        out.insert(name, Value::Array(collection.to_array()));
                    }
                }
                Value::Record(record) => {
                    let kind = if json {
                        ProjectionKind::Json
                    } else {
                        ProjectionKind::Object
                    };
                    let child_resolved = record.resolve_projection(kind, child_inline);
                    match record.project(json, child_inline, &child_resolved) {
                        Value::Object(map) if map.is_empty() => {
                            if !resolved.minimize {
                                out.insert(name, Value::Object(map));
                            }
                        }
                        child => {
                            out.insert(name, child);
                        }
                    }
                }
                Value::Object(map) => {
                    if map.is_empty() {
                        if !resolved.minimize {
                            out.insert(name, Value::Object(map));
                        }
                    } else {
                        out.insert(name, Value::Object(map));
                    }
                }
                scalar => {
                    out.insert(name, scalar);
                }
            }
        }

        if resolved.virtuals {
            let model = self.model();
            for (name, descriptor) in model.field_table() {
                if let Some(def) = &descriptor.virtual_def {
                    out.insert(name.clone(), (def.get)(self));
                }
            }
        }

        let mut result = Value::Object(out);
        if resolved.date_to_iso {
            convert_dates(&mut result);
        }
        if let Some(transform) = &resolved.transform {
            let merged = SerializeOptions {
                transform: Some(transform.clone()),
                virtuals: Some(resolved.virtuals),
                minimize: Some(resolved.minimize),
                date_to_iso: Some(resolved.date_to_iso),
            };
            result = transform(self, result, &merged);
        }
        result
    }
}

/// Rewrites every date in the tree as an ISO 8601 string.
fn convert_dates(value: &mut Value) {
    let replacement = match value {
        Value::Date(date) => Some(format_iso(date)),
        _ => None,
    };
    if let Some(iso) = replacement {
        *value = Value::String(iso);
        return;
    }
    match value {
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                convert_dates(item);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                convert_dates(item);
            }
        }
        _ => {}
    }
}
