//! Schema model for function outputs.
//!
//! A [`SchemaTable`] owns every named enum and class. Field types point at
//! named types through [`FieldType::Ref`], so self-referential and mutually
//! referential classes never own each other.

mod cycle;
mod json_schema;
mod output_format;

use crate::error::SchemaError;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Primitive scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    Int,
    Float,
    String,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Bool => write!(f, "bool"),
            Primitive::Int => write!(f, "int"),
            Primitive::Float => write!(f, "float"),
            Primitive::String => write!(f, "string"),
        }
    }
}

/// The type of a class field or a function output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Primitive(Primitive),
    List(Box<FieldType>),
    Optional(Box<FieldType>),
    Union(Vec<FieldType>),
    /// Non-owning reference to a named enum or class in the schema table
    Ref(String),
}

impl FieldType {
    pub fn string() -> Self {
        FieldType::Primitive(Primitive::String)
    }

    pub fn int() -> Self {
        FieldType::Primitive(Primitive::Int)
    }

    pub fn float() -> Self {
        FieldType::Primitive(Primitive::Float)
    }

    pub fn bool() -> Self {
        FieldType::Primitive(Primitive::Bool)
    }

    pub fn list(inner: FieldType) -> Self {
        FieldType::List(Box::new(inner))
    }

    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    pub fn union(variants: Vec<FieldType>) -> Self {
        FieldType::Union(variants)
    }

    pub fn reference(name: impl Into<String>) -> Self {
        FieldType::Ref(name.into())
    }

    /// Whether `null` is an acceptable value for this type
    pub fn is_optional(&self) -> bool {
        match self {
            FieldType::Optional(_) => true,
            FieldType::Union(variants) => variants.iter().any(FieldType::is_optional),
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Primitive(p) => write!(f, "{}", p),
            FieldType::List(inner) => write!(f, "{}[]", inner),
            FieldType::Optional(inner) => write!(f, "{}?", inner),
            FieldType::Union(variants) => write!(
                f,
                "({})",
                variants
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(" | ")
            ),
            FieldType::Ref(name) => write!(f, "{}", name),
        }
    }
}

/// One enum variant and the alternative spellings that also select it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumVariant {
    pub name: String,
    pub aliases: Vec<String>,
}

impl EnumVariant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// The variant name followed by its aliases
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// A named enum with ordered, unique variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub variants: Vec<EnumVariant>,
}

impl EnumDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
        }
    }

    pub fn variant(mut self, variant: impl Into<String>) -> Self {
        self.variants.push(EnumVariant::new(variant));
        self
    }

    pub fn with_variant(mut self, variant: EnumVariant) -> Self {
        self.variants.push(variant);
        self
    }
}

/// A class field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
}

/// A named class with ordered fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a required field
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            field_type,
            required: true,
        });
        self
    }

    /// Add a field that may be absent from model output
    pub fn optional_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            field_type,
            required: false,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A type owned by the schema table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamedType {
    Enum(EnumDef),
    Class(ClassDef),
}

impl NamedType {
    pub fn name(&self) -> &str {
        match self {
            NamedType::Enum(e) => &e.name,
            NamedType::Class(c) => &c.name,
        }
    }
}

/// Immutable table of all named types, built once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaTable {
    types: HashMap<String, NamedType>,
}

impl SchemaTable {
    /// Start building a schema table
    pub fn builder() -> SchemaTableBuilder {
        SchemaTableBuilder::default()
    }

    /// Look up any named type
    pub fn get(&self, name: &str) -> Option<&NamedType> {
        self.types.get(name)
    }

    /// Look up a class by name
    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        match self.types.get(name) {
            Some(NamedType::Class(c)) => Some(c),
            _ => None,
        }
    }

    /// Look up an enum by name
    pub fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        match self.types.get(name) {
            Some(NamedType::Enum(e)) => Some(e),
            _ => None,
        }
    }

    /// Names of all types in the table
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Check that a type only references names defined in this table.
    pub fn check_type(&self, field_type: &FieldType) -> Result<(), SchemaError> {
        self.check_type_in(field_type, "<root>")
    }

    fn check_type_in(&self, field_type: &FieldType, scope: &str) -> Result<(), SchemaError> {
        match field_type {
            FieldType::Primitive(_) => Ok(()),
            FieldType::List(inner) | FieldType::Optional(inner) => self.check_type_in(inner, scope),
            FieldType::Union(variants) => {
                if variants.is_empty() {
                    return Err(SchemaError::EmptyUnion {
                        scope: scope.to_string(),
                    });
                }
                variants
                    .iter()
                    .try_for_each(|v| self.check_type_in(v, scope))
            }
            FieldType::Ref(name) => {
                if self.types.contains_key(name) {
                    Ok(())
                } else {
                    Err(SchemaError::UnresolvedReference(name.clone()))
                }
            }
        }
    }

    /// Check the whole table. [`SchemaTableBuilder::build`] runs this already.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut names: Vec<&String> = self.types.keys().collect();
        names.sort();

        for name in names {
            match &self.types[name] {
                NamedType::Enum(def) => {
                    let mut seen = HashSet::new();
                    for label in def.variants.iter().flat_map(EnumVariant::labels) {
                        if !seen.insert(label) {
                            return Err(SchemaError::DuplicateVariant {
                                enum_name: def.name.clone(),
                                variant: label.to_string(),
                            });
                        }
                    }
                }
                NamedType::Class(def) => {
                    let mut seen = HashSet::new();
                    for field in &def.fields {
                        if !seen.insert(field.name.as_str()) {
                            return Err(SchemaError::DuplicateField {
                                class: def.name.clone(),
                                field: field.name.clone(),
                            });
                        }
                        self.check_type_in(
                            &field.field_type,
                            &format!("{}.{}", def.name, field.name),
                        )?;
                    }
                }
            }
        }

        cycle::check_required_cycles(self)
    }
}

/// Builder collecting named types before validation.
#[derive(Debug, Default)]
pub struct SchemaTableBuilder {
    types: Vec<NamedType>,
}

impl SchemaTableBuilder {
    /// Add an enum
    pub fn enum_type(mut self, def: EnumDef) -> Self {
        self.types.push(NamedType::Enum(def));
        self
    }

    /// Add a class
    pub fn class(mut self, def: ClassDef) -> Self {
        self.types.push(NamedType::Class(def));
        self
    }

    /// Add any named type
    pub fn named(mut self, def: NamedType) -> Self {
        self.types.push(def);
        self
    }

    /// Validate and freeze the table
    pub fn build(self) -> Result<SchemaTable, SchemaError> {
        let mut types = HashMap::with_capacity(self.types.len());
        for def in self.types {
            let name = def.name().to_string();
            if types.insert(name.clone(), def).is_some() {
                return Err(SchemaError::DuplicateType(name));
            }
        }

        let table = SchemaTable { types };
        table.validate()?;
        tracing::debug!("schema table built with {} named types", table.types.len());
        Ok(table)
    }
}
