use super::scalar;
use crate::error::DeserializeError;
use crate::schema::{ClassDef, EnumDef, FieldType, NamedType, Primitive, SchemaTable};
use crate::value::{PartialValue, Value};
use serde_json::Value as Json;

/// Dotted location inside the value being coerced, e.g. `root.items[2].name`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Field(String),
    Index(usize),
}

impl Scope {
    fn field(&self, name: &str) -> Scope {
        let mut scope = self.clone();
        scope.segments.push(Segment::Field(name.to_string()));
        scope
    }

    fn index(&self, i: usize) -> Scope {
        let mut scope = self.clone();
        scope.segments.push(Segment::Index(i));
        scope
    }

    fn render(&self) -> String {
        let mut out = String::from("root");
        for segment in &self.segments {
            match segment {
                Segment::Field(name) => {
                    out.push('.');
                    out.push_str(name);
                }
                Segment::Index(i) => out.push_str(&format!("[{}]", i)),
            }
        }
        out
    }
}

/// Coerces parsed JSON into schema types.
///
/// In exact mode only values that already have the target's JSON shape are
/// accepted: no string/number conversions, no single-element unwrapping, no
/// unknown object keys. Unions run an exact pass over their variants before
/// the lenient one, so a value printed from a valid [`Value`] reads back as
/// the same variant.
#[derive(Clone, Copy)]
pub(crate) struct Coercer<'a> {
    table: &'a SchemaTable,
    exact: bool,
}

impl<'a> Coercer<'a> {
    pub(crate) fn new(table: &'a SchemaTable) -> Self {
        Self { table, exact: false }
    }

    fn as_exact(self) -> Self {
        Self { exact: true, ..self }
    }

    /// Coerce a parsed value into `target`, failing on anything lossy.
    pub(crate) fn coerce(
        &self,
        scope: &Scope,
        target: &FieldType,
        value: &Json,
    ) -> Result<Value, DeserializeError> {
        match target {
            FieldType::Optional(inner) => match value {
                Json::Null => Ok(Value::Null),
                _ => self.coerce(scope, inner, value),
            },
            FieldType::Primitive(p) => self.primitive(scope, *p, value),
            FieldType::List(elem) => match value {
                Json::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.coerce(&scope.index(i), elem, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List),
                Json::Null => Err(mismatch(scope, target, value)),
                _ if self.exact => Err(mismatch(scope, target, value)),
                other => Ok(Value::List(vec![self.coerce(&scope.index(0), elem, other)?])),
            },
            FieldType::Union(variants) => self.union(scope, target, variants, value),
            FieldType::Ref(name) => match self.table.get(name) {
                Some(NamedType::Enum(def)) => self.enumeration(scope, def, value),
                Some(NamedType::Class(def)) => self.class(scope, def, value),
                None => Err(mismatch(scope, target, value)),
            },
        }
    }

    /// Strict left-to-right variant selection, exact pass first.
    fn union(
        &self,
        scope: &Scope,
        target: &FieldType,
        variants: &[FieldType],
        value: &Json,
    ) -> Result<Value, DeserializeError> {
        let exact = self.as_exact();
        let passes = if self.exact { vec![exact] } else { vec![exact, *self] };
        for pass in passes {
            for (i, variant) in variants.iter().enumerate() {
                if let Ok(value) = pass.coerce(scope, variant, value) {
                    tracing::trace!(
                        "{}: union variant {} ({}) selected, exact={}",
                        scope.render(),
                        i,
                        variant,
                        pass.exact
                    );
                    return Ok(value);
                }
            }
        }
        Err(DeserializeError::UnionNoVariantMatched {
            scope: scope.render(),
            union: target.to_string(),
        })
    }

    /// Best-effort coercion of a possibly repaired value. `None` leaves the
    /// slot unset.
    ///
    /// `hint` is the partial emitted for the same slot on an earlier prefix.
    /// A union keeps the variant the hint was coerced into as long as the
    /// value still fits it, so a stream does not flip between variants while
    /// fields arrive.
    pub(crate) fn coerce_partial(
        &self,
        target: &FieldType,
        value: &Json,
        hint: Option<&PartialValue>,
    ) -> Option<PartialValue> {
        let root = Scope::default();
        match target {
            FieldType::Optional(inner) => match value {
                Json::Null => Some(PartialValue::Null),
                _ => self.coerce_partial(inner, value, hint),
            },
            FieldType::List(elem) => {
                let hinted: &[PartialValue] = match hint {
                    Some(PartialValue::List(items)) => items.as_slice(),
                    _ => &[],
                };
                match value {
                    Json::Array(items) => Some(PartialValue::List(
                        items
                            .iter()
                            .enumerate()
                            .filter_map(|(i, item)| self.coerce_partial(elem, item, hinted.get(i)))
                            .collect(),
                    )),
                    Json::Null => None,
                    other => self
                        .coerce_partial(elem, other, hinted.first())
                        .map(|item| PartialValue::List(vec![item])),
                }
            }
            FieldType::Union(variants) => {
                let kept = hint
                    .filter(|hint| !hint.is_empty_shell())
                    .and_then(|hint| variants.iter().find(|v| fits_hint(v, hint)));
                if let Some(variant) = kept {
                    let same = self
                        .coerce(&root, variant, value)
                        .ok()
                        .map(PartialValue::from)
                        .or_else(|| self.coerce_partial(variant, value, hint));
                    if same.is_some() {
                        return same;
                    }
                }
                self.union(&root, target, variants, value)
                    .ok()
                    .map(PartialValue::from)
                    .or_else(|| {
                        variants
                            .iter()
                            .find_map(|variant| self.coerce_partial(variant, value, None))
                    })
            }
            FieldType::Ref(name) => match self.table.get(name) {
                Some(NamedType::Class(def)) => self.partial_class(def, value, hint),
                _ => self.coerce(&root, target, value).ok().map(PartialValue::from),
            },
            FieldType::Primitive(_) => self.coerce(&root, target, value).ok().map(PartialValue::from),
        }
    }

    fn primitive(&self, scope: &Scope, p: Primitive, value: &Json) -> Result<Value, DeserializeError> {
        let target = FieldType::Primitive(p);
        if self.exact && !exact_primitive(p, value) {
            return Err(mismatch(scope, &target, value));
        }
        let coerced = match (p, value) {
            (_, Json::Array(items)) if items.len() == 1 => {
                return self.primitive(scope, p, &items[0]);
            }
            (Primitive::String, Json::String(s)) => Some(Value::String(s.clone())),

            (Primitive::Int, Json::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(scalar::integral))
                .map(Value::Int),
            (Primitive::Int, Json::String(s)) => scalar::parse_int(s).map(Value::Int),

            (Primitive::Float, Json::Number(n)) => n.as_f64().map(Value::Float),
            (Primitive::Float, Json::String(s)) => scalar::parse_number(s).map(Value::Float),

            (Primitive::Bool, Json::Bool(b)) => Some(Value::Bool(*b)),
            (Primitive::Bool, Json::Number(n)) => number_to_bool(n.as_f64()),
            (Primitive::Bool, Json::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                other => number_to_bool(scalar::parse_number(other)),
            },
            _ => None,
        };
        coerced.ok_or_else(|| mismatch(scope, &target, value))
    }

    fn enumeration(&self, scope: &Scope, def: &EnumDef, value: &Json) -> Result<Value, DeserializeError> {
        let matched = match value {
            Json::String(s) if self.exact => def
                .variants
                .iter()
                .find(|v| v.name == *s)
                .map(|v| v.name.as_str()),
            Json::String(s) => scalar::match_enum(s, def),
            Json::Array(items) if items.len() == 1 && !self.exact => {
                return self.enumeration(scope, def, &items[0])
            }
            _ => None,
        };
        matched
            .map(|variant| Value::Enum {
                name: def.name.clone(),
                variant: variant.to_string(),
            })
            .ok_or_else(|| mismatch(scope, &FieldType::Ref(def.name.clone()), value))
    }

    fn class(&self, scope: &Scope, def: &ClassDef, value: &Json) -> Result<Value, DeserializeError> {
        let obj = match value {
            Json::Object(obj) => obj,
            Json::Array(items) if items.len() == 1 && !self.exact => {
                return self.class(scope, def, &items[0])
            }
            _ => return Err(mismatch(scope, &FieldType::Ref(def.name.clone()), value)),
        };
        if self.exact {
            if let Some(key) = obj.keys().find(|key| def.get(key).is_none()) {
                return Err(DeserializeError::TypeMismatch {
                    scope: scope.field(key).render(),
                    expected: def.name.clone(),
                    found: "unknown field".to_string(),
                });
            }
        }

        let mut fields = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let field_scope = scope.field(&field.name);
            let coerced = match obj.get(&field.name) {
                Some(raw) => self.coerce(&field_scope, &field.field_type, raw)?,
                None if field.required => {
                    return Err(DeserializeError::MissingField {
                        scope: scope.render(),
                        field: field.name.clone(),
                    })
                }
                None => Value::Null,
            };
            fields.push((field.name.clone(), coerced));
        }

        Ok(Value::Class {
            name: def.name.clone(),
            fields,
        })
    }

    fn partial_class(
        &self,
        def: &ClassDef,
        value: &Json,
        hint: Option<&PartialValue>,
    ) -> Option<PartialValue> {
        let obj = match value {
            Json::Object(obj) => obj,
            Json::Array(items) if items.len() == 1 => return self.partial_class(def, &items[0], hint),
            _ => return None,
        };
        let hint = hint.filter(|h| matches!(h, PartialValue::Class { name, .. } if *name == def.name));

        let fields = def
            .fields
            .iter()
            .map(|field| {
                let value = obj.get(&field.name).and_then(|raw| {
                    self.coerce_partial(&field.field_type, raw, hint.and_then(|h| h.get(&field.name)))
                });
                (field.name.clone(), value)
            })
            .collect();

        Some(PartialValue::Class {
            name: def.name.clone(),
            fields,
        })
    }
}

/// Whether `hint` was produced by coercing into `variant`.
fn fits_hint(variant: &FieldType, hint: &PartialValue) -> bool {
    match (variant, hint) {
        (FieldType::Optional(_), PartialValue::Null) => true,
        (FieldType::Optional(inner), _) => fits_hint(inner, hint),
        (FieldType::Union(inner), _) => inner.iter().any(|v| fits_hint(v, hint)),
        (FieldType::List(_), PartialValue::List(_)) => true,
        (FieldType::Ref(name), PartialValue::Class { name: hinted, .. })
        | (FieldType::Ref(name), PartialValue::Enum { name: hinted, .. }) => name == hinted,
        (FieldType::Primitive(p), _) => matches!(
            (p, hint),
            (Primitive::String, PartialValue::String(_))
                | (Primitive::Int, PartialValue::Int(_))
                | (Primitive::Float, PartialValue::Float(_))
                | (Primitive::Bool, PartialValue::Bool(_))
        ),
        _ => false,
    }
}

/// The JSON shape a primitive value prints as.
fn exact_primitive(p: Primitive, value: &Json) -> bool {
    match (p, value) {
        (Primitive::String, Json::String(_)) | (Primitive::Bool, Json::Bool(_)) => true,
        (Primitive::Int, Json::Number(n)) => n.as_i64().is_some(),
        (Primitive::Float, Json::Number(n)) => n.is_f64(),
        _ => false,
    }
}

fn number_to_bool(n: Option<f64>) -> Option<Value> {
    match n {
        Some(f) if f == 0.0 => Some(Value::Bool(false)),
        Some(f) if f == 1.0 => Some(Value::Bool(true)),
        _ => None,
    }
}

fn mismatch(scope: &Scope, expected: &FieldType, found: &Json) -> DeserializeError {
    DeserializeError::TypeMismatch {
        scope: scope.render(),
        expected: expected.to_string(),
        found: describe(found),
    }
}

fn describe(value: &Json) -> String {
    match value {
        Json::Null => "null".to_string(),
        Json::Bool(b) => b.to_string(),
        Json::Number(n) => n.to_string(),
        Json::String(s) if s.chars().count() > 32 => {
            format!("string \"{}...\"", s.chars().take(32).collect::<String>())
        }
        Json::String(s) => format!("string \"{}\"", s),
        Json::Array(items) => format!("array of {}", items.len()),
        Json::Object(_) => "object".to_string(),
    }
}
