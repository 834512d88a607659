//! Schema input shapes.
//!
//! A schema is declared as an ordered list of `(name, FieldSpec)` pairs.
//! [`FieldSpec`] covers the four accepted shorthands: a bare kind, a
//! compiled (or late-bound) model, a one-element array, and a nested
//! shape. Everything with modifiers goes through the fluent [`Field`]
//! builder. None of these interpret constraint semantics; they are raw
//! input for the normalizer.

use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::record::Record;
use crate::schema::Model;
use crate::value::Value;

/// Canonical lower-case type tag carried by every normalized field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
    Any,
}

impl FieldKind {
    /// Human-readable tag used in rejection messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
            FieldKind::Any => "any",
        }
    }
}

/// Value-level transform applied during coercion.
pub type TransformFn = Rc<dyn Fn(Value) -> Value>;

/// Custom acceptance predicate, run after every built-in rule.
pub type ValidateFn = Rc<dyn Fn(&Value) -> bool>;

/// Produces a default value at record construction.
pub type ComputeFn = Rc<dyn Fn() -> Value>;

/// Getter backing a virtual field.
pub type VirtualGetter = Rc<dyn Fn(&Record) -> Value>;

/// Optional setter backing a virtual field.
pub type VirtualSetter = Rc<dyn Fn(&Record, Value)>;

/// Default for a declared field: a fixed value or a closure evaluated per
/// record.
#[derive(Clone)]
pub enum DefaultSource {
    Fixed(Value),
    Computed(ComputeFn),
}

impl DefaultSource {
    pub(crate) fn produce(&self) -> Value {
        match self {
            DefaultSource::Fixed(value) => value.deep_clone(),
            DefaultSource::Computed(compute) => compute(),
        }
    }
}

impl fmt::Debug for DefaultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultSource::Fixed(value) => write!(f, "Fixed({})", value),
            DefaultSource::Computed(_) => write!(f, "Computed(..)"),
        }
    }
}

/// One declared field, in any of the accepted shorthand shapes.
#[derive(Clone)]
pub enum FieldSpec {
    /// Bare string kind.
    String,
    /// Bare number kind.
    Number,
    /// Bare boolean kind.
    Boolean,
    /// Bare date kind.
    Date,
    /// Untyped; values pass through coercion unchanged.
    Any,
    /// Embedded record of an already-compiled model.
    Model(Model),
    /// Embedded record of a model resolved by name at write time.
    ModelName(String),
    /// Typed array; the element shape is normalized recursively.
    Array(Box<FieldSpec>),
    /// Anonymous nested shape compiled into a synthetic model.
    Nested(SchemaDescriptor),
    /// Explicit descriptor with modifiers.
    Explicit(Field),
}

impl FieldSpec {
    /// Shorthand for a typed array field.
    pub fn array_of(element: impl Into<FieldSpec>) -> FieldSpec {
        FieldSpec::Array(Box::new(element.into()))
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSpec::String => write!(f, "String"),
            FieldSpec::Number => write!(f, "Number"),
            FieldSpec::Boolean => write!(f, "Boolean"),
            FieldSpec::Date => write!(f, "Date"),
            FieldSpec::Any => write!(f, "Any"),
            FieldSpec::Model(model) => write!(f, "Model({})", model.name()),
            FieldSpec::ModelName(name) => write!(f, "ModelName({})", name),
            FieldSpec::Array(element) => write!(f, "Array({:?})", element),
            FieldSpec::Nested(nested) => write!(f, "Nested({} fields)", nested.len()),
            FieldSpec::Explicit(field) => field.fmt(f),
        }
    }
}

impl From<Field> for FieldSpec {
    fn from(field: Field) -> FieldSpec {
        FieldSpec::Explicit(field)
    }
}

impl From<Model> for FieldSpec {
    fn from(model: Model) -> FieldSpec {
        FieldSpec::Model(model)
    }
}

impl From<SchemaDescriptor> for FieldSpec {
    fn from(nested: SchemaDescriptor) -> FieldSpec {
        FieldSpec::Nested(nested)
    }
}

/// Ordered field declaration list; insertion order is preserved all the
/// way through to serialization.
#[derive(Debug, Clone, Default)]
pub struct SchemaDescriptor {
    pub(crate) fields: Vec<(String, FieldSpec)>,
}

impl SchemaDescriptor {
    pub fn new() -> Self {
        SchemaDescriptor { fields: Vec::new() }
    }

    /// Appends a field declaration. Re-declaring a name replaces the
    /// earlier entry in place.
    pub fn field(mut self, name: impl Into<String>, spec: impl Into<FieldSpec>) -> Self {
        let name = name.into();
        let spec = spec.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = spec,
            None => self.fields.push((name, spec)),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Explicit field declaration with modifiers. Modifier keys are carried
/// verbatim; only the normalizer gives them meaning.
#[derive(Clone)]
pub struct Field {
    pub(crate) kind: FieldKind,
    pub(crate) model: Option<Model>,
    pub(crate) model_name: Option<String>,
    pub(crate) nested: Option<SchemaDescriptor>,
    pub(crate) element: Option<Box<FieldSpec>>,
    pub(crate) min_length: Option<usize>,
    pub(crate) max_length: Option<usize>,
    pub(crate) clip: bool,
    pub(crate) min: Option<f64>,
    pub(crate) max: Option<f64>,
    pub(crate) pattern: Option<String>,
    pub(crate) one_of: Option<Vec<String>>,
    pub(crate) default: Option<DefaultSource>,
    pub(crate) transform: Option<TransformFn>,
    pub(crate) string_transform: Option<TransformFn>,
    pub(crate) number_transform: Option<TransformFn>,
    pub(crate) boolean_transform: Option<TransformFn>,
    pub(crate) date_transform: Option<TransformFn>,
    pub(crate) validate: Option<ValidateFn>,
    pub(crate) unique: bool,
    pub(crate) invisible: bool,
    pub(crate) read_only: bool,
    pub(crate) key: bool,
    pub(crate) prefix: Option<String>,
}

impl Field {
    fn with_kind(kind: FieldKind) -> Field {
        Field {
            kind,
            model: None,
            model_name: None,
            nested: None,
            element: None,
            min_length: None,
            max_length: None,
            clip: false,
            min: None,
            max: None,
            pattern: None,
            one_of: None,
            default: None,
            transform: None,
            string_transform: None,
            number_transform: None,
            boolean_transform: None,
            date_transform: None,
            validate: None,
            unique: false,
            invisible: false,
            read_only: false,
            key: false,
            prefix: None,
        }
    }

    pub fn string() -> Field {
        Field::with_kind(FieldKind::String)
    }

    pub fn number() -> Field {
        Field::with_kind(FieldKind::Number)
    }

    pub fn boolean() -> Field {
        Field::with_kind(FieldKind::Boolean)
    }

    pub fn date() -> Field {
        Field::with_kind(FieldKind::Date)
    }

    pub fn any() -> Field {
        Field::with_kind(FieldKind::Any)
    }

    /// Embedded record of a compiled model.
    pub fn model(model: Model) -> Field {
        let mut field = Field::with_kind(FieldKind::Object);
        field.model = Some(model);
        field
    }

    /// Embedded record of a model resolved through the registry by name
    /// at write time.
    pub fn model_named(name: impl Into<String>) -> Field {
        let mut field = Field::with_kind(FieldKind::Object);
        field.model_name = Some(name.into());
        field
    }

    /// Embedded anonymous shape.
    pub fn nested(descriptor: SchemaDescriptor) -> Field {
        let mut field = Field::with_kind(FieldKind::Object);
        field.nested = Some(descriptor);
        field
    }

    /// Typed array of the given element shape.
    pub fn array_of(element: impl Into<FieldSpec>) -> Field {
        let mut field = Field::with_kind(FieldKind::Array);
        field.element = Some(Box::new(element.into()));
        field
    }

    // ==================
    // String constraints
    // ==================

    pub fn min_length(mut self, len: usize) -> Field {
        self.min_length = Some(len);
        self
    }

    pub fn max_length(mut self, len: usize) -> Field {
        self.max_length = Some(len);
        self
    }

    /// Clip over-long strings to `max_length` instead of rejecting them.
    pub fn clip(mut self) -> Field {
        self.clip = true;
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Field {
        self.pattern = Some(pattern.into());
        self
    }

    /// Restricts accepted strings to a fixed set.
    pub fn one_of<I, S>(mut self, values: I) -> Field
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.one_of = Some(values.into_iter().map(Into::into).collect());
        self
    }

    // ==================
    // Numeric bounds
    // ==================

    pub fn min(mut self, min: f64) -> Field {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Field {
        self.max = Some(max);
        self
    }

    // ==================
    // Defaults and hooks
    // ==================

    pub fn default_value(mut self, value: impl Into<Value>) -> Field {
        self.default = Some(DefaultSource::Fixed(value.into()));
        self
    }

    pub fn default_with(mut self, compute: impl Fn() -> Value + 'static) -> Field {
        self.default = Some(DefaultSource::Computed(Rc::new(compute)));
        self
    }

    /// Applied to every incoming value before any type rule runs.
    pub fn transform(mut self, transform: impl Fn(Value) -> Value + 'static) -> Field {
        self.transform = Some(Rc::new(transform));
        self
    }

    /// Applied after string coercion, before length/pattern checks.
    pub fn string_transform(mut self, transform: impl Fn(Value) -> Value + 'static) -> Field {
        self.string_transform = Some(Rc::new(transform));
        self
    }

    /// Applied after numeric coercion, before bound checks.
    pub fn number_transform(mut self, transform: impl Fn(Value) -> Value + 'static) -> Field {
        self.number_transform = Some(Rc::new(transform));
        self
    }

    /// Applied after boolean coercion.
    pub fn boolean_transform(mut self, transform: impl Fn(Value) -> Value + 'static) -> Field {
        self.boolean_transform = Some(Rc::new(transform));
        self
    }

    /// Applied after date parsing.
    pub fn date_transform(mut self, transform: impl Fn(Value) -> Value + 'static) -> Field {
        self.date_transform = Some(Rc::new(transform));
        self
    }

    /// Custom acceptance predicate; a `false` result rejects the write.
    pub fn validate(mut self, validate: impl Fn(&Value) -> bool + 'static) -> Field {
        self.validate = Some(Rc::new(validate));
        self
    }

    // ==================
    // Flags and metadata
    // ==================

    /// Array elements must be distinct by structural equality.
    pub fn unique(mut self) -> Field {
        self.unique = true;
        self
    }

    /// Excluded from projections.
    pub fn invisible(mut self) -> Field {
        self.invisible = true;
        self
    }

    /// Writes are silently ignored.
    pub fn read_only(mut self) -> Field {
        self.read_only = true;
        self
    }

    /// Marks the model's identity field. Informational only.
    pub fn key(mut self) -> Field {
        self.key = true;
        self
    }

    /// Identity prefix metadata, carried verbatim.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Field {
        self.prefix = Some(prefix.into());
        self
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("kind", &self.kind)
            .field("min_length", &self.min_length)
            .field("max_length", &self.max_length)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("pattern", &self.pattern)
            .field("one_of", &self.one_of)
            .field("unique", &self.unique)
            .field("invisible", &self.invisible)
            .field("read_only", &self.read_only)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_preserves_insertion_order() {
        let descriptor = SchemaDescriptor::new()
            .field("first", FieldSpec::String)
            .field("second", FieldSpec::Number)
            .field("third", FieldSpec::Date);
        let names: Vec<&str> = descriptor.fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_redeclaring_a_field_replaces_in_place() {
        let descriptor = SchemaDescriptor::new()
            .field("name", FieldSpec::String)
            .field("age", FieldSpec::Number)
            .field("name", FieldSpec::Date);
        assert_eq!(descriptor.len(), 2);
        assert!(matches!(descriptor.fields[0].1, FieldSpec::Date));
    }

    #[test]
    fn test_builder_collects_modifiers() {
        let field = Field::string()
            .min_length(2)
            .max_length(10)
            .pattern("^[a-z]+$")
            .one_of(["red", "green"])
            .invisible();
        assert_eq!(field.kind, FieldKind::String);
        assert_eq!(field.min_length, Some(2));
        assert_eq!(field.max_length, Some(10));
        assert_eq!(field.one_of.as_deref(), Some(&["red".to_string(), "green".to_string()][..]));
        assert!(field.invisible);
        assert!(!field.read_only);
    }

    #[test]
    fn test_array_shorthand_boxes_the_element_shape() {
        let spec = FieldSpec::array_of(FieldSpec::String);
        match spec {
            FieldSpec::Array(element) => assert!(matches!(*element, FieldSpec::String)),
            other => panic!("expected array spec, got {:?}", other),
        }
    }
}
