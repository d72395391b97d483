use super::{FieldType, NamedType, SchemaTable};

const INDENT: &str = "  ";

impl SchemaTable {
    /// Render the instruction substituted into `{{ output_format }}`.
    ///
    /// Classes and composites are shown as a JSON-shaped hint, enums as a
    /// list of allowed values and primitives as a one-line instruction.
    pub fn render_output_format(&self, field_type: &FieldType) -> String {
        match field_type {
            FieldType::Primitive(p) => {
                let article = if matches!(p, super::Primitive::Int) { "an" } else { "a" };
                format!("Answer as {} {}.", article, p)
            }
            FieldType::Ref(name) => match self.get(name) {
                Some(NamedType::Enum(def)) => {
                    let mut out = String::from("Answer with one of the following values:");
                    for variant in &def.variants {
                        out.push_str("\n- ");
                        out.push_str(&variant.name);
                    }
                    out
                }
                _ => format!(
                    "Answer in JSON using this schema:\n{}",
                    self.render_type(field_type)
                ),
            },
            _ => format!(
                "Answer in JSON using this schema:\n{}",
                self.render_type(field_type)
            ),
        }
    }

    /// Render a type as a compact JSON-shaped hint.
    pub fn render_type(&self, field_type: &FieldType) -> String {
        let mut out = String::new();
        let mut expanding = Vec::new();
        self.write_type(&mut out, field_type, 0, &mut expanding);
        out
    }

    fn write_type<'a>(
        &'a self,
        out: &mut String,
        field_type: &'a FieldType,
        depth: usize,
        expanding: &mut Vec<&'a str>,
    ) {
        match field_type {
            FieldType::Primitive(p) => out.push_str(&p.to_string()),
            FieldType::Optional(inner) => {
                self.write_type(out, inner, depth, expanding);
                out.push_str(" | null");
            }
            FieldType::List(inner) => {
                let wrap = matches!(**inner, FieldType::Union(_) | FieldType::Optional(_));
                if wrap {
                    out.push('(');
                }
                self.write_type(out, inner, depth, expanding);
                if wrap {
                    out.push(')');
                }
                out.push_str("[]");
            }
            FieldType::Union(variants) => {
                for (i, variant) in variants.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" | ");
                    }
                    self.write_type(out, variant, depth, expanding);
                }
            }
            FieldType::Ref(name) => match self.get(name) {
                Some(NamedType::Enum(def)) => {
                    let labels: Vec<String> =
                        def.variants.iter().map(|v| format!("\"{}\"", v.name)).collect();
                    out.push_str(&labels.join(" | "));
                }
                // Recursive classes are shown by name on re-entry
                Some(NamedType::Class(def)) if !expanding.contains(&def.name.as_str()) => {
                    expanding.push(&def.name);
                    out.push_str("{\n");
                    for (i, field) in def.fields.iter().enumerate() {
                        out.push_str(&INDENT.repeat(depth + 1));
                        out.push('"');
                        out.push_str(&field.name);
                        out.push_str("\": ");
                        self.write_type(out, &field.field_type, depth + 1, expanding);
                        if i + 1 < def.fields.len() {
                            out.push(',');
                        }
                        out.push('\n');
                    }
                    out.push_str(&INDENT.repeat(depth));
                    out.push('}');
                    expanding.pop();
                }
                _ => out.push_str(name),
            },
        }
    }
}
