//! Schema-aware deserializer for raw model output.
//!
//! [`Deserializer::parse_final`] turns complete output into a [`Value`] or a
//! [`DeserializeError`]. [`Deserializer::parse_partial`] never fails: it
//! returns whatever can be recovered from a prefix of the output.

mod coerce;
mod jsonish;
mod scalar;

use crate::error::{DeserializeError, SchemaError};
use crate::schema::{FieldType, NamedType, Primitive, SchemaTable};
use crate::value::{PartialValue, Value};
use coerce::{Coercer, Scope};
use serde_json::Value as Json;
use std::sync::Arc;

/// Deserializer bound to one target type of a schema table.
#[derive(Debug, Clone)]
pub struct Deserializer {
    table: Arc<SchemaTable>,
    target: FieldType,
}

impl Deserializer {
    /// Bind a deserializer, checking that the target resolves in the table.
    pub fn new(table: Arc<SchemaTable>, target: FieldType) -> Result<Self, SchemaError> {
        table.check_type(&target)?;
        Ok(Self { table, target })
    }

    pub fn target(&self) -> &FieldType {
        &self.target
    }

    pub fn table(&self) -> &Arc<SchemaTable> {
        &self.table
    }

    /// Parse complete model output.
    pub fn parse_final(&self, raw: &str) -> Result<Value, DeserializeError> {
        parse_final(raw, &self.table, &self.target)
    }

    /// Parse a possibly truncated prefix of model output.
    pub fn parse_partial(&self, raw: &str) -> Option<PartialValue> {
        parse_partial(raw, &self.table, &self.target)
    }

    /// Like [`parse_partial`](Self::parse_partial), continuing from the
    /// partial emitted for an earlier prefix of the same output. Unions keep
    /// the variant chosen for `prev` while the new text still fits it.
    pub fn parse_partial_from(&self, raw: &str, prev: Option<&PartialValue>) -> Option<PartialValue> {
        parse_partial_from(raw, &self.table, &self.target, prev)
    }
}

/// Scalar shapes that are read straight from the text before looking for JSON.
enum Direct<'a> {
    Primitive(Primitive),
    Enum(&'a crate::schema::EnumDef),
}

fn direct_target<'a>(table: &'a SchemaTable, target: &FieldType) -> Option<Direct<'a>> {
    match target {
        FieldType::Primitive(p) => Some(Direct::Primitive(*p)),
        FieldType::Optional(inner) => direct_target(table, inner),
        FieldType::Ref(name) => match table.get(name) {
            Some(NamedType::Enum(def)) => Some(Direct::Enum(def)),
            _ => None,
        },
        _ => None,
    }
}

fn extract_direct(raw: &str, direct: &Direct<'_>) -> Option<Value> {
    let trimmed = raw.trim();
    match direct {
        Direct::Primitive(Primitive::Bool) => scalar::find_bool(trimmed).map(Value::Bool),
        Direct::Primitive(Primitive::Int) => {
            scalar::find_number(trimmed).and_then(scalar::parse_int).map(Value::Int)
        }
        Direct::Primitive(Primitive::Float) => {
            scalar::find_number(trimmed).and_then(scalar::parse_number).map(Value::Float)
        }
        Direct::Primitive(Primitive::String) => match jsonish::parse(trimmed) {
            Some(Json::String(s)) => Some(Value::String(s)),
            _ if trimmed.is_empty() => None,
            _ => Some(Value::String(trimmed.to_string())),
        },
        Direct::Enum(def) => scalar::match_enum(trimmed, def).map(|variant| Value::Enum {
            name: def.name.clone(),
            variant: variant.to_string(),
        }),
    }
}

/// Whether the last token of a bare scalar may still be growing.
///
/// Numbers, literals and enum labels only count once something follows
/// them. A quoted string counts once its closing quote arrived.
fn direct_still_open(raw: &str, direct: &Direct<'_>) -> bool {
    let text = raw.trim_start();
    match direct {
        Direct::Primitive(Primitive::String) => {
            text.starts_with(['"', '\'']) && !matches!(jsonish::parse(text.trim_end()), Some(Json::String(_)))
        }
        _ => text
            .chars()
            .last()
            .map_or(true, |c| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_')),
    }
}

fn is_null_text(raw: &str) -> bool {
    matches!(raw.trim(), "null" | "None" | "")
}

/// Parse complete model output into `target`.
pub fn parse_final(raw: &str, table: &SchemaTable, target: &FieldType) -> Result<Value, DeserializeError> {
    if target.is_optional() && is_null_text(raw) {
        return Ok(Value::Null);
    }

    if let Some(direct) = direct_target(table, target) {
        if let Some(value) = extract_direct(raw, &direct) {
            return Ok(value);
        }
    }

    let coercer = Coercer::new(table);
    let root = Scope::default();
    let mut first_error = None;
    for candidate in jsonish::candidates(raw, false) {
        match coercer.coerce(&root, target, &candidate) {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::trace!("candidate rejected: {}", err);
                first_error.get_or_insert(err);
            }
        }
    }
    if let Some(err) = first_error {
        return Err(err);
    }

    // No JSON at all: the raw text itself is the last candidate
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        if let Ok(value) = coercer.coerce(&root, target, &Json::String(trimmed.to_string())) {
            return Ok(value);
        }
    }

    Err(DeserializeError::NoParsableValue {
        expected: target.to_string(),
    })
}

/// Parse a possibly truncated prefix of model output into `target`.
pub fn parse_partial(raw: &str, table: &SchemaTable, target: &FieldType) -> Option<PartialValue> {
    parse_partial_from(raw, table, target, None)
}

/// Parse a prefix of model output, guided by the partial of an earlier prefix.
pub fn parse_partial_from(
    raw: &str,
    table: &SchemaTable,
    target: &FieldType,
    prev: Option<&PartialValue>,
) -> Option<PartialValue> {
    let coercer = Coercer::new(table);

    if let Some(direct) = direct_target(table, target) {
        if direct_still_open(raw, &direct) {
            return None;
        }
        if let Some(value) = extract_direct(raw, &direct) {
            return Some(value.into());
        }
    }

    jsonish::candidates(raw, true)
        .iter()
        .find_map(|candidate| coercer.coerce_partial(target, candidate, prev))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ClassDef, EnumDef};

    fn table() -> Arc<SchemaTable> {
        Arc::new(
            SchemaTable::builder()
                .enum_type(
                    EnumDef::new("Category")
                        .variant("Refund")
                        .variant("CancelOrder")
                        .variant("Question"),
                )
                .class(
                    ClassDef::new("Foo")
                        .field("prop1", FieldType::string())
                        .field("prop2", FieldType::int()),
                )
                .class(
                    ClassDef::new("Pair")
                        .field("a", FieldType::int())
                        .field("b", FieldType::string()),
                )
                .class(
                    ClassDef::new("Left")
                        .field("x", FieldType::int())
                        .optional_field("y", FieldType::optional(FieldType::int())),
                )
                .class(
                    ClassDef::new("Right")
                        .field("x", FieldType::int())
                        .field("z", FieldType::int()),
                )
                .class(
                    ClassDef::new("Holder")
                        .field("id", FieldType::union(vec![FieldType::int(), FieldType::string()]))
                        .field("amount", FieldType::union(vec![FieldType::int(), FieldType::float()])),
                )
                .class(
                    ClassDef::new("Report")
                        .field("title", FieldType::string())
                        .field("tags", FieldType::list(FieldType::string()))
                        .optional_field("score", FieldType::optional(FieldType::float()))
                        .field("category", FieldType::reference("Category")),
                )
                .build()
                .unwrap(),
        )
    }

    fn deserializer(target: FieldType) -> Deserializer {
        Deserializer::new(table(), target).unwrap()
    }

    #[test]
    fn test_fenced_output_with_prose() {
        let raw = "Here is the result:\n```json\n{\"prop1\": \"hello\", \"prop2\": 5}\n```";
        let value = deserializer(FieldType::reference("Foo")).parse_final(raw).unwrap();
        assert_eq!(
            value,
            Value::Class {
                name: "Foo".into(),
                fields: vec![
                    ("prop1".into(), Value::String("hello".into())),
                    ("prop2".into(), Value::Int(5)),
                ],
            }
        );
    }

    #[test]
    fn test_truncated_output_partial() {
        let partial = deserializer(FieldType::reference("Pair"))
            .parse_partial(r#"{"a": 1, "b": "hel"#)
            .unwrap();
        assert_eq!(partial.get("a"), Some(&PartialValue::Int(1)));
        assert_eq!(partial.get("b"), None);
    }

    #[test]
    fn test_truncated_output_final_fails() {
        let err = deserializer(FieldType::reference("Pair"))
            .parse_final(r#"{"a": 1, "b": "hel"#)
            .unwrap_err();
        assert!(matches!(err, DeserializeError::NoParsableValue { .. }));
    }

    #[test]
    fn test_round_trip() {
        let d = deserializer(FieldType::reference("Report"));
        let value = Value::Class {
            name: "Report".into(),
            fields: vec![
                ("title".into(), Value::String("Q3 \"draft\"".into())),
                (
                    "tags".into(),
                    Value::List(vec![Value::String("a".into()), Value::String("b".into())]),
                ),
                ("score".into(), Value::Float(2.5)),
                (
                    "category".into(),
                    Value::Enum {
                        name: "Category".into(),
                        variant: "Question".into(),
                    },
                ),
            ],
        };
        assert_eq!(d.parse_final(&value.to_string()).unwrap(), value);

        let scalar = deserializer(FieldType::float());
        assert_eq!(scalar.parse_final(&Value::Float(2.0).to_string()).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn test_round_trip_through_unions() {
        let cases = vec![
            (vec![FieldType::string(), FieldType::int()], Value::Int(5)),
            (vec![FieldType::string(), FieldType::bool()], Value::Bool(true)),
            (vec![FieldType::int(), FieldType::float()], Value::Float(2.0)),
            (vec![FieldType::float(), FieldType::int()], Value::Int(5)),
            (vec![FieldType::int(), FieldType::string()], Value::String("5".into())),
            (
                vec![FieldType::reference("Left"), FieldType::reference("Right")],
                Value::Class {
                    name: "Right".into(),
                    fields: vec![("x".into(), Value::Int(1)), ("z".into(), Value::Int(2))],
                },
            ),
        ];
        for (variants, value) in cases {
            let d = deserializer(FieldType::union(variants));
            assert_eq!(d.parse_final(&value.to_string()).unwrap(), value);
        }

        let d = deserializer(FieldType::reference("Holder"));
        let value = Value::Class {
            name: "Holder".into(),
            fields: vec![
                ("id".into(), Value::String("7".into())),
                ("amount".into(), Value::Float(3.0)),
            ],
        };
        assert_eq!(d.parse_final(&value.to_string()).unwrap(), value);
    }

    #[test]
    fn test_direct_scalar_extraction() {
        assert_eq!(
            deserializer(FieldType::int()).parse_final("The answer is 42."),
            Ok(Value::Int(42))
        );
        assert_eq!(
            deserializer(FieldType::bool()).parse_final("Answer: True"),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            deserializer(FieldType::string()).parse_final("  \"quoted\"  "),
            Ok(Value::String("quoted".into()))
        );
        assert_eq!(
            deserializer(FieldType::string()).parse_final("  plain text\n"),
            Ok(Value::String("plain text".into()))
        );
        assert_eq!(
            deserializer(FieldType::reference("Category"))
                .parse_final("I think this is a CancelOrder request"),
            Ok(Value::Enum {
                name: "Category".into(),
                variant: "CancelOrder".into()
            })
        );
        assert_eq!(
            deserializer(FieldType::optional(FieldType::int())).parse_final("None"),
            Ok(Value::Null)
        );
    }

    #[test]
    fn test_lossy_scalar_is_mismatch() {
        let err = deserializer(FieldType::int()).parse_final("3.7").unwrap_err();
        assert!(matches!(err, DeserializeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_nothing_parsable() {
        let err = deserializer(FieldType::reference("Foo"))
            .parse_final("I cannot help with that.")
            .unwrap_err();
        assert_eq!(
            err,
            DeserializeError::NoParsableValue {
                expected: "Foo".into()
            }
        );
        assert_eq!(
            deserializer(FieldType::reference("Foo")).parse_partial("I cannot"),
            None
        );
    }

    #[test]
    fn test_union_of_scalars_falls_back_to_raw_text() {
        let d = deserializer(FieldType::union(vec![FieldType::int(), FieldType::string()]));
        assert_eq!(d.parse_final("hello"), Ok(Value::String("hello".into())));
        assert_eq!(d.parse_final("42"), Ok(Value::Int(42)));
    }

    /// Every populated path of `value`, e.g. `.tags[1]`.
    fn populated_paths(value: &PartialValue, at: String, out: &mut Vec<String>) {
        out.push(at.clone());
        match value {
            PartialValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    populated_paths(item, format!("{}[{}]", at, i), out);
                }
            }
            PartialValue::Class { fields, .. } => {
                for (name, field) in fields {
                    if let Some(field) = field {
                        populated_paths(field, format!("{}.{}", at, name), out);
                    }
                }
            }
            _ => {}
        }
    }

    /// Stream `raw` one character at a time the way the stream engine does,
    /// checking that no populated path ever disappears.
    fn assert_monotonic_prefixes(d: &Deserializer, raw: &str) -> PartialValue {
        let mut last: Option<PartialValue> = None;
        for end in (1..=raw.len()).filter(|i| raw.is_char_boundary(*i)) {
            let Some(parsed) = d.parse_partial_from(&raw[..end], last.as_ref()) else {
                continue;
            };
            let merged = match &last {
                Some(prev) => PartialValue::merge(prev, parsed),
                None => parsed,
            };
            if let Some(prev) = &last {
                let mut before = Vec::new();
                let mut after = Vec::new();
                populated_paths(prev, String::new(), &mut before);
                populated_paths(&merged, String::new(), &mut after);
                for path in before {
                    assert!(after.contains(&path), "{path:?} dropped at prefix {:?}", &raw[..end]);
                }
            }
            last = Some(merged);
        }
        last.expect("some prefix parses")
    }

    #[test]
    fn test_partial_is_monotonic_over_prefixes() {
        let d = deserializer(FieldType::reference("Report"));
        let raw = r#"Sure! {"title": "Weekly", "tags": ["x", "yz", "w"], "score": 0.5, "category": "Refund"} done"#;

        let last = assert_monotonic_prefixes(&d, raw);
        assert_eq!(last.get("category").and_then(|c| match c {
            PartialValue::Enum { variant, .. } => Some(variant.as_str()),
            _ => None,
        }), Some("Refund"));
    }

    #[test]
    fn test_union_partial_never_drops_fields() {
        let d = deserializer(FieldType::union(vec![
            FieldType::reference("Left"),
            FieldType::reference("Right"),
        ]));
        let last = assert_monotonic_prefixes(&d, r#"{"z": 2, "x": 1, "y": 3}"#);
        assert!(matches!(last, PartialValue::Class { ref name, .. } if name == "Right"));
        assert_eq!(last.get("z"), Some(&PartialValue::Int(2)));
        assert_monotonic_prefixes(&d, r#"{"x": 1, "z": 2, "y": 3}"#);

        let first = d.parse_partial(r#"{"x": 1, "z": 2,"#).unwrap();
        let next = d
            .parse_partial_from(r#"{"x": 1, "z": 2, "y": 3,"#, Some(&first))
            .unwrap();
        let merged = PartialValue::merge(&first, next);
        assert_eq!(merged.get("x"), Some(&PartialValue::Int(1)));
        assert_eq!(merged.get("z"), Some(&PartialValue::Int(2)));

        let lists = deserializer(FieldType::list(FieldType::union(vec![
            FieldType::reference("Left"),
            FieldType::reference("Right"),
        ])));
        assert_monotonic_prefixes(&lists, r#"[{"x": 1, "z": 2, "y": 3}, {"x": 4, "y": 5}]"#);
    }

    #[test]
    fn test_partial_after_bracketed_prose() {
        let d = deserializer(FieldType::reference("Pair"));
        let partial = d.parse_partial(r#"Note [see below]: {"a": 1, "b": "hel"#).unwrap();
        assert_eq!(partial.get("a"), Some(&PartialValue::Int(1)));
        assert_eq!(partial.get("b"), None);

        let partial = d.parse_partial(r#"Step [1]: {"a": 1,"#).unwrap();
        assert_eq!(partial.get("a"), Some(&PartialValue::Int(1)));

        assert_eq!(
            d.parse_final(r#"Step [1]: {"a": 1, "b": "hello"}"#),
            Ok(Value::Class {
                name: "Pair".into(),
                fields: vec![
                    ("a".into(), Value::Int(1)),
                    ("b".into(), Value::String("hello".into())),
                ],
            })
        );
    }

    #[test]
    fn test_partial_bare_scalar_waits_for_delimiter() {
        let int = deserializer(FieldType::int());
        assert_eq!(int.parse_partial("1"), None);
        assert_eq!(int.parse_partial("12 "), Some(PartialValue::Int(12)));
        assert_eq!(int.parse_partial("12\n"), Some(PartialValue::Int(12)));

        let string = deserializer(FieldType::string());
        assert_eq!(string.parse_partial("\"hel"), None);
        assert_eq!(
            string.parse_partial("\"hello\""),
            Some(PartialValue::String("hello".into()))
        );

        let flag = deserializer(FieldType::bool());
        assert_eq!(flag.parse_partial("Tru"), None);
        assert_eq!(flag.parse_partial("True "), Some(PartialValue::Bool(true)));

        let category = deserializer(FieldType::reference("Category"));
        assert_eq!(category.parse_partial("Refund"), None);
        assert_eq!(
            category.parse_partial("Refund\n"),
            Some(PartialValue::Enum {
                name: "Category".into(),
                variant: "Refund".into()
            })
        );
    }

    #[test]
    fn test_list_populates_element_by_element() {
        let d = deserializer(FieldType::list(FieldType::reference("Pair")));
        let partial = d.parse_partial(r#"[{"a": 1, "b": "x"}, {"a": 2"#).unwrap();
        match partial {
            PartialValue::List(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].get("b"), Some(&PartialValue::String("x".into())));
                assert_eq!(items[1].get("a"), None);
            }
            other => panic!("unexpected partial: {other:?}"),
        }
    }
}
