//! Prompt templates with `{{ placeholder }}` substitution.
//!
//! Rendering is pure substitution: no conditionals, loops or filters. A
//! placeholder names a named argument, a positional index, a dotted path
//! into an argument (`{{ order.id }}`) or the reserved `output_format`.

use crate::error::Error;
use crate::types::Args;
use serde_json::Value as Json;

/// Reserved placeholder replaced by the rendered output schema
pub const OUTPUT_FORMAT: &str = "output_format";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> Result<Vec<&str>, Error> {
        let mut names = Vec::new();
        let mut rest = self.source.as_str();
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| Error::prompt("unterminated placeholder"))?;
            names.push(after[..end].trim());
            rest = &after[end + 2..];
        }
        Ok(names)
    }

    /// Substitute every placeholder. Strings are inserted verbatim, other
    /// values as compact JSON.
    pub fn render(&self, args: &Args, output_format: &str) -> Result<String, Error> {
        let mut out = String::with_capacity(self.source.len());
        let mut rest = self.source.as_str();
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| Error::prompt("unterminated placeholder"))?;
            let name = after[..end].trim();
            if name == OUTPUT_FORMAT {
                out.push_str(output_format);
            } else {
                let value = lookup(args, name)
                    .ok_or_else(|| Error::prompt(format!("missing argument for {{{{ {} }}}}", name)))?;
                match value {
                    Json::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                }
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl From<&str> for PromptTemplate {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<String> for PromptTemplate {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

fn lookup<'a>(args: &'a Args, path: &str) -> Option<&'a Json> {
    let mut parts = path.split('.');
    let mut current = args.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Json::Object(map) => map.get(part)?,
            Json::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
