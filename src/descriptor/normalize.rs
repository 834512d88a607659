//! Canonical field descriptors and the shorthand normalizer.
//!
//! Every declared field, whatever shorthand it was written in, becomes one
//! immutable [`FieldDescriptor`] at compile time. The normalizer resolves
//! the type tag and recurses into array element shapes and nested object
//! shapes; it copies every other modifier through verbatim. The single
//! modifier it interprets is `pattern`, compiled here so a bad expression
//! fails at definition time instead of on the first write.

use std::fmt;
use std::rc::Weak;

use regex::Regex;

use super::errors::{SchemaError, SchemaResult};
use super::types::{
    DefaultSource, Field, FieldKind, FieldSpec, TransformFn, ValidateFn, VirtualGetter,
    VirtualSetter,
};
use crate::registry::RegistryInner;
use crate::schema::{Model, SchemaBuilder, SchemaOptions};

/// The model backing an object-kind field.
#[derive(Clone)]
pub(crate) enum ModelRef {
    /// Bound when the schema compiled.
    Compiled(Model),
    /// Looked up in the registry on every coercion, so models may be
    /// declared before the models they reference.
    Named {
        name: String,
        registry: Weak<RegistryInner>,
    },
}

impl ModelRef {
    /// The referenced model, if it can be reached right now.
    pub(crate) fn resolve(&self) -> Option<Model> {
        match self {
            ModelRef::Compiled(model) => Some(model.clone()),
            ModelRef::Named { name, registry } => {
                registry.upgrade().and_then(|inner| inner.lookup(name))
            }
        }
    }

    /// The model name this reference points at.
    pub(crate) fn target_name(&self) -> String {
        match self {
            ModelRef::Compiled(model) => model.name().to_owned(),
            ModelRef::Named { name, .. } => name.clone(),
        }
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelRef::Compiled(model) => write!(f, "Compiled({})", model.name()),
            ModelRef::Named { name, .. } => write!(f, "Named({})", name),
        }
    }
}

/// Getter/setter pair backing a virtual field.
#[derive(Clone)]
pub struct VirtualDef {
    pub(crate) get: VirtualGetter,
    pub(crate) set: Option<VirtualSetter>,
}

impl VirtualDef {
    pub(crate) fn new(get: VirtualGetter, set: Option<VirtualSetter>) -> Self {
        VirtualDef { get, set }
    }
}

/// Canonical, immutable representation of one schema field.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
    pub(crate) min_length: Option<usize>,
    pub(crate) max_length: Option<usize>,
    pub(crate) clip: bool,
    pub(crate) min: Option<f64>,
    pub(crate) max: Option<f64>,
    pub(crate) regex: Option<Regex>,
    pub(crate) one_of: Option<Vec<String>>,
    pub(crate) default: Option<DefaultSource>,
    pub(crate) transform: Option<TransformFn>,
    pub(crate) string_transform: Option<TransformFn>,
    pub(crate) number_transform: Option<TransformFn>,
    pub(crate) boolean_transform: Option<TransformFn>,
    pub(crate) date_transform: Option<TransformFn>,
    pub(crate) validate: Option<ValidateFn>,
    pub(crate) object_type: Option<ModelRef>,
    pub(crate) array_type: Option<Box<FieldDescriptor>>,
    pub(crate) unique: bool,
    pub(crate) invisible: bool,
    pub(crate) read_only: bool,
    pub(crate) virtual_def: Option<VirtualDef>,
    pub(crate) key: bool,
    pub(crate) prefix: Option<String>,
}

impl FieldDescriptor {
    pub(crate) fn bare(name: &str, kind: FieldKind) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_owned(),
            kind,
            min_length: None,
            max_length: None,
            clip: false,
            min: None,
            max: None,
            regex: None,
            one_of: None,
            default: None,
            transform: None,
            string_transform: None,
            number_transform: None,
            boolean_transform: None,
            date_transform: None,
            validate: None,
            object_type: None,
            array_type: None,
            unique: false,
            invisible: false,
            read_only: false,
            virtual_def: None,
            key: false,
            prefix: None,
        }
    }

    /// Descriptor for a computed field. Virtuals are never stored; they
    /// only exist on the read path and in projections that ask for them.
    pub(crate) fn virtual_descriptor(name: &str, def: VirtualDef) -> FieldDescriptor {
        let mut descriptor = FieldDescriptor::bare(name, FieldKind::Any);
        descriptor.invisible = true;
        descriptor.virtual_def = Some(def);
        descriptor
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn is_virtual(&self) -> bool {
        self.virtual_def.is_some()
    }

    pub fn is_invisible(&self) -> bool {
        self.invisible
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Identity-field marker, carried verbatim from the declaration.
    pub fn is_key(&self) -> bool {
        self.key
    }

    /// Identity prefix metadata, carried verbatim from the declaration.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub(crate) fn object_type(&self) -> Option<&ModelRef> {
        self.object_type.as_ref()
    }

    pub fn array_type(&self) -> Option<&FieldDescriptor> {
        self.array_type.as_deref()
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("object_type", &self.object_type)
            .field("array_type", &self.array_type)
            .field("unique", &self.unique)
            .field("invisible", &self.invisible)
            .field("read_only", &self.read_only)
            .field("virtual", &self.is_virtual())
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Everything the normalizer needs from the schema being compiled.
pub(crate) struct NormalizeCx<'a> {
    /// Name of the model under compilation; anonymous nested models are
    /// named `parent.field`.
    pub(crate) parent: &'a str,
    /// Options of the schema under compilation; anonymous nested shapes
    /// inherit them wholesale.
    pub(crate) options: &'a SchemaOptions,
    pub(crate) registry: Weak<RegistryInner>,
}

/// Translates one declared field into its canonical descriptor.
pub(crate) fn normalize(
    spec: &FieldSpec,
    name: &str,
    cx: &NormalizeCx<'_>,
) -> SchemaResult<FieldDescriptor> {
    if name.is_empty() {
        return Err(SchemaError::EmptyFieldName);
    }
    match spec {
        FieldSpec::String => Ok(FieldDescriptor::bare(name, FieldKind::String)),
        FieldSpec::Number => Ok(FieldDescriptor::bare(name, FieldKind::Number)),
        FieldSpec::Boolean => Ok(FieldDescriptor::bare(name, FieldKind::Boolean)),
        FieldSpec::Date => Ok(FieldDescriptor::bare(name, FieldKind::Date)),
        FieldSpec::Any => Ok(FieldDescriptor::bare(name, FieldKind::Any)),
        FieldSpec::Model(model) => {
            let mut descriptor = FieldDescriptor::bare(name, FieldKind::Object);
            descriptor.object_type = Some(ModelRef::Compiled(model.clone()));
            Ok(descriptor)
        }
        FieldSpec::ModelName(target) => {
            let mut descriptor = FieldDescriptor::bare(name, FieldKind::Object);
            descriptor.object_type = Some(ModelRef::Named {
                name: target.clone(),
                registry: cx.registry.clone(),
            });
            Ok(descriptor)
        }
        FieldSpec::Array(element) => {
            let mut descriptor = FieldDescriptor::bare(name, FieldKind::Array);
            descriptor.array_type = Some(Box::new(normalize(element, name, cx)?));
            Ok(descriptor)
        }
        FieldSpec::Nested(nested) => {
            let mut descriptor = FieldDescriptor::bare(name, FieldKind::Object);
            descriptor.object_type = Some(ModelRef::Compiled(compile_anonymous(
                nested, name, cx,
            )?));
            Ok(descriptor)
        }
        FieldSpec::Explicit(field) => normalize_explicit(field, name, cx),
    }
}

fn normalize_explicit(
    field: &Field,
    name: &str,
    cx: &NormalizeCx<'_>,
) -> SchemaResult<FieldDescriptor> {
    let mut descriptor = FieldDescriptor::bare(name, field.kind);

    match field.kind {
        FieldKind::Object => {
            if let Some(model) = &field.model {
                descriptor.object_type = Some(ModelRef::Compiled(model.clone()));
            } else if let Some(target) = &field.model_name {
                descriptor.object_type = Some(ModelRef::Named {
                    name: target.clone(),
                    registry: cx.registry.clone(),
                });
            } else if let Some(nested) = &field.nested {
                descriptor.object_type =
                    Some(ModelRef::Compiled(compile_anonymous(nested, name, cx)?));
            }
            // No object type at all means the field stores plain objects.
        }
        FieldKind::Array => {
            let element = match &field.element {
                Some(element) => normalize(element, name, cx)?,
                None => FieldDescriptor::bare(name, FieldKind::Any),
            };
            descriptor.array_type = Some(Box::new(element));
        }
        _ => {}
    }

    descriptor.min_length = field.min_length;
    descriptor.max_length = field.max_length;
    descriptor.clip = field.clip;
    descriptor.min = field.min;
    descriptor.max = field.max;
    descriptor.one_of = field.one_of.clone();
    descriptor.default = field.default.clone();
    descriptor.transform = field.transform.clone();
    descriptor.string_transform = field.string_transform.clone();
    descriptor.number_transform = field.number_transform.clone();
    descriptor.boolean_transform = field.boolean_transform.clone();
    descriptor.date_transform = field.date_transform.clone();
    descriptor.validate = field.validate.clone();
    descriptor.unique = field.unique;
    descriptor.invisible = field.invisible;
    descriptor.read_only = field.read_only;
    descriptor.key = field.key;
    descriptor.prefix = field.prefix.clone();

    if let Some(pattern) = &field.pattern {
        descriptor.regex = Some(Regex::new(pattern).map_err(|source| {
            SchemaError::InvalidPattern {
                field: name.to_owned(),
                source,
            }
        })?);
    }

    Ok(descriptor)
}

/// Compiles an anonymous nested shape into a synthetic model that inherits
/// the parent schema's options.
fn compile_anonymous(
    nested: &super::types::SchemaDescriptor,
    name: &str,
    cx: &NormalizeCx<'_>,
) -> SchemaResult<Model> {
    let model_name = if cx.parent.is_empty() {
        name.to_owned()
    } else {
        format!("{}.{}", cx.parent, name)
    };
    SchemaBuilder::from_descriptor(nested.clone(), cx.options.clone())
        .compile_internal(&model_name, cx.registry.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaOptions;

    fn cx(options: &SchemaOptions) -> NormalizeCx<'_> {
        NormalizeCx {
            parent: "Test",
            options,
            registry: Weak::new(),
        }
    }

    #[test]
    fn test_bare_kinds_resolve_to_their_tag() {
        let options = SchemaOptions::default();
        let cx = cx(&options);
        for (spec, kind) in [
            (FieldSpec::String, FieldKind::String),
            (FieldSpec::Number, FieldKind::Number),
            (FieldSpec::Boolean, FieldKind::Boolean),
            (FieldSpec::Date, FieldKind::Date),
            (FieldSpec::Any, FieldKind::Any),
        ] {
            let descriptor = normalize(&spec, "field", &cx).unwrap();
            assert_eq!(descriptor.kind(), kind);
            assert_eq!(descriptor.name(), "field");
        }
    }

    #[test]
    fn test_array_shorthand_normalizes_the_element() {
        let options = SchemaOptions::default();
        let cx = cx(&options);
        let descriptor = normalize(&FieldSpec::array_of(FieldSpec::Number), "scores", &cx).unwrap();
        assert_eq!(descriptor.kind(), FieldKind::Array);
        assert_eq!(descriptor.array_type().unwrap().kind(), FieldKind::Number);
    }

    #[test]
    fn test_modifiers_are_copied_through_verbatim() {
        let options = SchemaOptions::default();
        let cx = cx(&options);
        let field = Field::string()
            .min_length(1)
            .max_length(5)
            .one_of(["a", "b"])
            .key()
            .prefix("usr");
        let descriptor = normalize(&field.into(), "id", &cx).unwrap();
        assert_eq!(descriptor.min_length, Some(1));
        assert_eq!(descriptor.max_length, Some(5));
        assert_eq!(descriptor.one_of.as_ref().map(Vec::len), Some(2));
        assert!(descriptor.is_key());
        assert_eq!(descriptor.prefix(), Some("usr"));
    }

    #[test]
    fn test_bad_pattern_fails_at_definition_time() {
        let options = SchemaOptions::default();
        let cx = cx(&options);
        let field = Field::string().pattern("(unclosed");
        let err = normalize(&field.into(), "code", &cx).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPattern { .. }));
    }

    #[test]
    fn test_empty_field_name_is_rejected() {
        let options = SchemaOptions::default();
        let cx = cx(&options);
        let err = normalize(&FieldSpec::String, "", &cx).unwrap_err();
        assert!(matches!(err, SchemaError::EmptyFieldName));
    }
}
