//! Typed values produced by the deserializer.

use crate::error::Error;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value as Json};
use std::fmt;

/// A fully-typed instance of a schema type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Enum { name: String, variant: String },
    List(Vec<Value>),
    /// Fields in schema order
    Class {
        name: String,
        fields: Vec<(String, Value)>,
    },
}

impl Value {
    /// Look up a class field by name
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Class { fields, .. } => fields.iter().find(|(n, _)| n == field).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Enum { variant, .. } => Some(variant),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert into plain JSON. Enums become their variant label.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Enum { variant, .. } => Json::String(variant.clone()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Class { fields, .. } => Json::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    /// Convert into a caller-defined type through serde.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_value(self.to_json())?)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Best-effort value observed while output is still arriving.
///
/// Mirrors [`Value`], but every class field may be unset (`None`) whatever
/// its declared requiredness, and nested composites are partial too.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Enum { name: String, variant: String },
    List(Vec<PartialValue>),
    Class {
        name: String,
        fields: Vec<(String, Option<PartialValue>)>,
    },
}

impl PartialValue {
    /// Look up a class field; `None` when absent or unset
    pub fn get(&self, field: &str) -> Option<&PartialValue> {
        match self {
            PartialValue::Class { fields, .. } => fields
                .iter()
                .find(|(n, _)| n == field)
                .and_then(|(_, v)| v.as_ref()),
            _ => None,
        }
    }

    /// Number of populated nodes, containers included.
    pub fn populated(&self) -> usize {
        match self {
            PartialValue::List(items) => 1 + items.iter().map(PartialValue::populated).sum::<usize>(),
            PartialValue::Class { fields, .. } => {
                1 + fields
                    .iter()
                    .filter_map(|(_, v)| v.as_ref())
                    .map(PartialValue::populated)
                    .sum::<usize>()
            }
            _ => 1,
        }
    }

    /// A class with no field set, or an empty list.
    pub fn is_empty_shell(&self) -> bool {
        match self {
            PartialValue::List(items) => items.is_empty(),
            PartialValue::Class { fields, .. } => fields.iter().all(|(_, v)| v.is_none()),
            _ => false,
        }
    }

    /// Merge a newer observation into the previous one without losing data.
    ///
    /// Fields and list elements set in `prev` stay set. When both sides
    /// disagree on the shape (a scalar kind or a class name), `prev` is kept
    /// unless it holds nothing yet.
    pub fn merge(prev: &PartialValue, next: PartialValue) -> PartialValue {
        match (prev, next) {
            (
                PartialValue::Class {
                    name: prev_name,
                    fields: prev_fields,
                },
                PartialValue::Class { name, fields },
            ) if *prev_name == name => {
                let fields = fields
                    .into_iter()
                    .map(|(field, value)| {
                        let old = prev_fields
                            .iter()
                            .find(|(n, _)| *n == field)
                            .and_then(|(_, v)| v.as_ref());
                        let merged = match (old, value) {
                            (Some(old), Some(new)) => Some(PartialValue::merge(old, new)),
                            (Some(old), None) => Some(old.clone()),
                            (None, new) => new,
                        };
                        (field, merged)
                    })
                    .collect();
                PartialValue::Class { name, fields }
            }
            (PartialValue::List(prev_items), PartialValue::List(items)) => {
                let mut next_items = items.into_iter();
                let mut merged = Vec::with_capacity(prev_items.len());
                for old in prev_items {
                    merged.push(match next_items.next() {
                        Some(new) => PartialValue::merge(old, new),
                        None => old.clone(),
                    });
                }
                merged.extend(next_items);
                PartialValue::List(merged)
            }
            (prev, PartialValue::Null) if !matches!(prev, PartialValue::Null) => prev.clone(),
            (PartialValue::Null, next) => next,
            (prev, next)
                if !matches!(prev, PartialValue::Class { .. })
                    && std::mem::discriminant(prev) == std::mem::discriminant(&next) =>
            {
                next
            }
            (prev, next) if prev.is_empty_shell() => next,
            (prev, _) => prev.clone(),
        }
    }

    /// Convert into plain JSON; unset fields become `null`.
    pub fn to_json(&self) -> Json {
        match self {
            PartialValue::Null => Json::Null,
            PartialValue::Bool(b) => Json::Bool(*b),
            PartialValue::Int(i) => Json::Number((*i).into()),
            PartialValue::Float(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
            PartialValue::String(s) => Json::String(s.clone()),
            PartialValue::Enum { variant, .. } => Json::String(variant.clone()),
            PartialValue::List(items) => Json::Array(items.iter().map(PartialValue::to_json).collect()),
            PartialValue::Class { fields, .. } => Json::Object(
                fields
                    .iter()
                    .map(|(name, value)| {
                        (
                            name.clone(),
                            value.as_ref().map(PartialValue::to_json).unwrap_or(Json::Null),
                        )
                    })
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    /// Convert into a caller-defined partial type through serde.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_value(self.to_json())?)
    }
}

impl From<Value> for PartialValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => PartialValue::Null,
            Value::Bool(b) => PartialValue::Bool(b),
            Value::Int(i) => PartialValue::Int(i),
            Value::Float(f) => PartialValue::Float(f),
            Value::String(s) => PartialValue::String(s),
            Value::Enum { name, variant } => PartialValue::Enum { name, variant },
            Value::List(items) => PartialValue::List(items.into_iter().map(Into::into).collect()),
            Value::Class { name, fields } => PartialValue::Class {
                name,
                fields: fields.into_iter().map(|(n, v)| (n, Some(v.into()))).collect(),
            },
        }
    }
}

impl Serialize for PartialValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn class(fields: Vec<(&str, Option<PartialValue>)>) -> PartialValue {
        PartialValue::Class {
            name: "Foo".into(),
            fields: fields.into_iter().map(|(n, v)| (n.to_string(), v)).collect(),
        }
    }

    #[test]
    fn test_value_to_json_keeps_field_order() {
        let value = Value::Class {
            name: "Foo".into(),
            fields: vec![
                ("zeta".into(), Value::Int(1)),
                (
                    "alpha".into(),
                    Value::Enum {
                        name: "Mood".into(),
                        variant: "Happy".into(),
                    },
                ),
            ],
        };
        assert_eq!(value.to_string(), r#"{"zeta":1,"alpha":"Happy"}"#);
        assert_eq!(value.get("zeta"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_deserialize_into_struct() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Foo {
            prop1: String,
            prop2: Option<i64>,
        }

        let value = Value::Class {
            name: "Foo".into(),
            fields: vec![
                ("prop1".into(), Value::String("hello".into())),
                ("prop2".into(), Value::Null),
            ],
        };
        let foo: Foo = value.deserialize_into().unwrap();
        assert_eq!(
            foo,
            Foo {
                prop1: "hello".into(),
                prop2: None
            }
        );
    }

    #[test]
    fn test_merge_keeps_populated_fields() {
        let prev = class(vec![("a", Some(PartialValue::Int(1))), ("b", None)]);
        let next = class(vec![("a", None), ("b", Some(PartialValue::String("x".into())))]);

        let merged = PartialValue::merge(&prev, next);
        assert_eq!(
            merged,
            class(vec![
                ("a", Some(PartialValue::Int(1))),
                ("b", Some(PartialValue::String("x".into())))
            ])
        );
        assert!(merged.populated() >= prev.populated());
    }

    #[test]
    fn test_merge_lists_never_shrink() {
        let prev = PartialValue::List(vec![PartialValue::Int(1), PartialValue::Int(2)]);
        let next = PartialValue::List(vec![PartialValue::Int(1)]);
        assert_eq!(PartialValue::merge(&prev, next), prev);

        let grown = PartialValue::List(vec![
            PartialValue::Int(1),
            PartialValue::Int(2),
            PartialValue::Int(3),
        ]);
        assert_eq!(PartialValue::merge(&prev, grown.clone()), grown);
    }

    #[test]
    fn test_merge_shape_change_keeps_prev() {
        let prev = class(vec![("a", Some(PartialValue::Int(1)))]);
        assert_eq!(PartialValue::merge(&prev, PartialValue::Int(7)), prev);
        assert_eq!(PartialValue::merge(&prev, PartialValue::Null), prev);

        let other = PartialValue::Class {
            name: "Bar".into(),
            fields: vec![
                ("a".into(), Some(PartialValue::Int(1))),
                ("c".into(), Some(PartialValue::Int(3))),
                ("d".into(), Some(PartialValue::Int(4))),
            ],
        };
        assert_eq!(PartialValue::merge(&prev, other.clone()), prev);

        let shell = class(vec![("a", None)]);
        assert_eq!(PartialValue::merge(&shell, other.clone()), other);
    }

    #[test]
    fn test_partial_json_and_typed_partial() {
        #[derive(Deserialize, Debug, Default, PartialEq)]
        struct FooPartial {
            a: Option<i64>,
            b: Option<String>,
        }

        let partial = class(vec![("a", Some(PartialValue::Int(1))), ("b", None)]);
        assert_eq!(partial.to_json(), json!({"a": 1, "b": null}));

        let typed: FooPartial = partial.deserialize_into().unwrap();
        assert_eq!(
            typed,
            FooPartial {
                a: Some(1),
                b: None
            }
        );
    }
}
