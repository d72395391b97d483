//! Import of JSON Schema documents into a [`SchemaTable`].
//!
//! Named types come from `definitions` (draft 7) or `$defs` (2019-09 and
//! later, as emitted by `schemars`). Inline objects and enums get a name
//! derived from their `title` or from the enclosing class and field.

use super::{ClassDef, EnumDef, FieldDef, FieldType, NamedType, Primitive, SchemaTable};
use crate::error::SchemaError;
use serde_json::{Map, Value as Json};

const DEFINITION_KEYS: [&str; 2] = ["definitions", "$defs"];

impl SchemaTable {
    /// Build a schema table from a JSON Schema document.
    ///
    /// Returns the table together with the type described by the document
    /// root. A root object schema becomes a class named after its `title`
    /// (or `Root`).
    pub fn from_json_schema(doc: &Json) -> Result<(SchemaTable, FieldType), SchemaError> {
        let mut importer = Importer::default();

        for key in DEFINITION_KEYS {
            if let Some(defs) = doc.get(key).and_then(Json::as_object) {
                for (name, schema) in defs {
                    importer.define(name, schema, &format!("#/{}/{}", key, name))?;
                }
            }
        }

        let root_name = doc
            .get("title")
            .and_then(Json::as_str)
            .unwrap_or("Root")
            .to_string();
        let root = importer.convert(doc, "#", &root_name)?;

        let mut builder = SchemaTable::builder();
        for def in importer.named {
            builder = builder.named(def);
        }
        let table = builder.build()?;
        table.check_type(&root)?;
        Ok((table, root))
    }
}

#[derive(Default)]
struct Importer {
    named: Vec<NamedType>,
}

impl Importer {
    fn define(&mut self, name: &str, schema: &Json, path: &str) -> Result<(), SchemaError> {
        if let Some(labels) = enum_labels(schema).or_else(|| const_variants(schema)) {
            self.named.push(NamedType::Enum(build_enum(name, labels)));
            return Ok(());
        }
        if is_object(schema) {
            let class = self.class(name, schema, path)?;
            self.named.push(NamedType::Class(class));
            return Ok(());
        }
        Err(unsupported(path, "definitions must be objects or string enums"))
    }

    fn class(&mut self, name: &str, schema: &Json, path: &str) -> Result<ClassDef, SchemaError> {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Json::as_array)
            .map(|r| r.iter().filter_map(Json::as_str).collect())
            .unwrap_or_default();

        let empty = Map::new();
        let properties = schema
            .get("properties")
            .and_then(Json::as_object)
            .unwrap_or(&empty);

        let mut fields = Vec::with_capacity(properties.len());
        for (field, prop) in properties {
            let hint = format!("{}{}", name, pascal_case(field));
            let field_type =
                self.convert(prop, &format!("{}/properties/{}", path, field), &hint)?;
            fields.push(FieldDef {
                name: field.clone(),
                field_type,
                required: required.contains(&field.as_str()),
            });
        }

        Ok(ClassDef {
            name: name.to_string(),
            fields,
        })
    }

    fn convert(&mut self, schema: &Json, path: &str, hint: &str) -> Result<FieldType, SchemaError> {
        let Some(obj) = schema.as_object() else {
            return Err(unsupported(path, "expected a schema object"));
        };

        if let Some(reference) = obj.get("$ref").and_then(Json::as_str) {
            return reference_name(reference)
                .map(FieldType::reference)
                .ok_or_else(|| unsupported(path, format!("unsupported $ref {}", reference)));
        }

        for key in ["anyOf", "oneOf"] {
            if let Some(variants) = obj.get(key).and_then(Json::as_array) {
                return self.convert_variants(schema, variants, &format!("{}/{}", path, key), hint);
            }
        }

        if let Some(all_of) = obj.get("allOf").and_then(Json::as_array) {
            if let [single] = all_of.as_slice() {
                return self.convert(single, &format!("{}/allOf/0", path), hint);
            }
            return Err(unsupported(path, "allOf with more than one schema"));
        }

        if let Some(labels) = enum_labels(schema) {
            let nullable = obj
                .get("enum")
                .and_then(Json::as_array)
                .is_some_and(|values| values.iter().any(Json::is_null));
            let enum_type = self.inline_enum(schema, hint, labels);
            return Ok(if nullable {
                FieldType::optional(enum_type)
            } else {
                enum_type
            });
        }

        match obj.get("type") {
            Some(Json::String(ty)) => self.convert_named_type(schema, ty, path, hint),
            Some(Json::Array(types)) => {
                let mut nullable = false;
                let mut variants = Vec::new();
                for ty in types {
                    match ty.as_str() {
                        Some("null") => nullable = true,
                        Some(ty) => variants.push(self.convert_named_type(schema, ty, path, hint)?),
                        None => return Err(unsupported(path, "type entries must be strings")),
                    }
                }
                wrap_variants(variants, nullable, path)
            }
            None if obj.contains_key("properties") => self.inline_class(schema, path, hint),
            _ => Err(unsupported(path, "schema has no type")),
        }
    }

    fn convert_variants(
        &mut self,
        parent: &Json,
        variants: &[Json],
        path: &str,
        hint: &str,
    ) -> Result<FieldType, SchemaError> {
        if let Some(labels) = const_variants(parent) {
            return Ok(self.inline_enum(parent, hint, labels));
        }

        let mut nullable = false;
        let mut converted = Vec::new();
        for (i, variant) in variants.iter().enumerate() {
            if variant.get("type").and_then(Json::as_str) == Some("null") {
                nullable = true;
                continue;
            }
            converted.push(self.convert(variant, &format!("{}/{}", path, i), hint)?);
        }
        wrap_variants(converted, nullable, path)
    }

    fn convert_named_type(
        &mut self,
        schema: &Json,
        ty: &str,
        path: &str,
        hint: &str,
    ) -> Result<FieldType, SchemaError> {
        match ty {
            "string" => Ok(FieldType::Primitive(Primitive::String)),
            "integer" => Ok(FieldType::Primitive(Primitive::Int)),
            "number" => Ok(FieldType::Primitive(Primitive::Float)),
            "boolean" => Ok(FieldType::Primitive(Primitive::Bool)),
            "array" => {
                let items = schema
                    .get("items")
                    .ok_or_else(|| unsupported(path, "array without items"))?;
                let item_hint = format!("{}Item", hint);
                Ok(FieldType::list(self.convert(
                    items,
                    &format!("{}/items", path),
                    &item_hint,
                )?))
            }
            "object" => self.inline_class(schema, path, hint),
            other => Err(unsupported(path, format!("unsupported type {}", other))),
        }
    }

    fn inline_class(&mut self, schema: &Json, path: &str, hint: &str) -> Result<FieldType, SchemaError> {
        let name = schema
            .get("title")
            .and_then(Json::as_str)
            .unwrap_or(hint)
            .to_string();
        let class = self.class(&name, schema, path)?;
        self.named.push(NamedType::Class(class));
        Ok(FieldType::Ref(name))
    }

    fn inline_enum(&mut self, schema: &Json, hint: &str, labels: Vec<String>) -> FieldType {
        let name = schema
            .get("title")
            .and_then(Json::as_str)
            .unwrap_or(hint)
            .to_string();
        self.named.push(NamedType::Enum(build_enum(&name, labels)));
        FieldType::Ref(name)
    }
}

fn wrap_variants(mut variants: Vec<FieldType>, nullable: bool, path: &str) -> Result<FieldType, SchemaError> {
    let inner = match variants.len() {
        0 => return Err(unsupported(path, "only null is allowed")),
        1 => variants.remove(0),
        _ => FieldType::Union(variants),
    };
    Ok(if nullable { FieldType::optional(inner) } else { inner })
}

/// String labels of an `enum` keyword, accepting plain strings and
/// `{"const": "X"}` entries. `null` entries are skipped.
fn enum_labels(schema: &Json) -> Option<Vec<String>> {
    if let Some(values) = schema.get("enum").and_then(Json::as_array) {
        return values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| match v {
                Json::String(s) => Some(s.clone()),
                other => other.get("const").and_then(Json::as_str).map(str::to_string),
            })
            .collect();
    }
    schema
        .get("const")
        .and_then(Json::as_str)
        .map(|label| vec![label.to_string()])
}

/// Labels of an `anyOf`/`oneOf` made only of string consts, which is how
/// documented enums are emitted.
fn const_variants(schema: &Json) -> Option<Vec<String>> {
    let variants = schema
        .get("oneOf")
        .or_else(|| schema.get("anyOf"))
        .and_then(Json::as_array)?;
    let labels: Option<Vec<String>> = variants
        .iter()
        .map(|v| v.get("const").and_then(Json::as_str).map(str::to_string))
        .collect();
    labels.filter(|l| !l.is_empty())
}

fn build_enum(name: &str, labels: Vec<String>) -> EnumDef {
    labels
        .into_iter()
        .fold(EnumDef::new(name), |def, label| def.variant(label))
}

fn is_object(schema: &Json) -> bool {
    schema.get("type").and_then(Json::as_str) == Some("object") || schema.get("properties").is_some()
}

fn reference_name(reference: &str) -> Option<&str> {
    DEFINITION_KEYS
        .iter()
        .find_map(|key| reference.strip_prefix(&format!("#/{}/", key)))
}

fn pascal_case(field: &str) -> String {
    field
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn unsupported(path: &str, message: impl Into<String>) -> SchemaError {
    SchemaError::UnsupportedJsonSchema {
        path: path.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_import_definitions_with_const_enums() {
        let doc = json!({
            "definitions": {
                "Category": {
                    "title": "Category",
                    "enum": [{"const": "Refund"}, {"const": "CancelOrder"}]
                },
                "Blah": {
                    "title": "Blah",
                    "type": "object",
                    "properties": {
                        "prop4": {"type": ["string", "null"], "default": null}
                    },
                    "required": []
                },
                "Ticket": {
                    "type": "object",
                    "properties": {
                        "category": {"$ref": "#/definitions/Category"},
                        "extra": {
                            "anyOf": [
                                {"$ref": "#/definitions/Blah", "title": "Blah"},
                                {"type": "null", "title": "null"}
                            ]
                        },
                        "tags": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["category", "tags"]
                }
            },
            "$ref": "#/definitions/Ticket"
        });

        let (table, root) = SchemaTable::from_json_schema(&doc).unwrap();
        assert_eq!(root, FieldType::reference("Ticket"));

        let category = table.enum_def("Category").unwrap();
        assert_eq!(category.variants.len(), 2);
        assert_eq!(category.variants[1].name, "CancelOrder");

        let ticket = table.class("Ticket").unwrap();
        let names: Vec<&str> = ticket.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["category", "extra", "tags"]);
        assert!(ticket.fields[0].required);
        assert!(!ticket.fields[1].required);
        assert_eq!(
            ticket.fields[1].field_type,
            FieldType::optional(FieldType::reference("Blah"))
        );
        assert_eq!(
            ticket.fields[2].field_type,
            FieldType::list(FieldType::string())
        );

        let blah = table.class("Blah").unwrap();
        assert_eq!(
            blah.fields[0].field_type,
            FieldType::optional(FieldType::string())
        );
    }

    #[test]
    fn test_import_root_object_with_defs() {
        let doc = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "title": "Review",
            "type": "object",
            "properties": {
                "score": {"type": "integer", "format": "uint8", "minimum": 0},
                "mood": {"$ref": "#/$defs/Mood"},
                "summary": {"type": ["string", "null"]},
                "author": {
                    "type": "object",
                    "properties": {"name": {"type": "string"}},
                    "required": ["name"]
                }
            },
            "required": ["score", "mood", "author"],
            "$defs": {
                "Mood": {
                    "oneOf": [
                        {"type": "string", "const": "happy", "description": "Good"},
                        {"type": "string", "const": "sad", "description": "Bad"}
                    ]
                }
            }
        });

        let (table, root) = SchemaTable::from_json_schema(&doc).unwrap();
        assert_eq!(root, FieldType::reference("Review"));

        let review = table.class("Review").unwrap();
        assert_eq!(review.fields[0].field_type, FieldType::int());
        assert_eq!(review.fields[3].field_type, FieldType::reference("ReviewAuthor"));
        assert!(table.class("ReviewAuthor").is_some());
        assert_eq!(table.enum_def("Mood").unwrap().variants[0].name, "happy");
    }

    #[test]
    fn test_import_rejects_unknown_shapes() {
        let err = SchemaTable::from_json_schema(&json!({"type": "null"})).unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedJsonSchema { .. }));

        let err =
            SchemaTable::from_json_schema(&json!({"$ref": "#/definitions/Nope"})).unwrap_err();
        assert_eq!(err, SchemaError::UnresolvedReference("Nope".into()));
    }
}
