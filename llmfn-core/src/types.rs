//! Core types shared by calls and streams.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::collections::HashMap;
use std::sync::Arc;

/// Arguments for a function call.
///
/// Positional arguments are addressed as `{{ 0 }}`, `{{ 1 }}`... in prompt
/// templates, named arguments as `{{ name }}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Args {
    #[serde(default)]
    pub positional: Vec<Json>,
    #[serde(default)]
    pub named: Map<String, Json>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<Json>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a named argument
    pub fn named(mut self, name: impl Into<String>, value: impl Into<Json>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Build named arguments from any serializable struct or map.
    pub fn from_serialize<T: Serialize>(input: &T) -> Result<Self, Error> {
        match serde_json::to_value(input)? {
            Json::Object(named) => Ok(Self {
                positional: Vec::new(),
                named,
            }),
            other => Ok(Self::new().arg(other)),
        }
    }

    /// Look up an argument by name or positional index
    pub fn get(&self, key: &str) -> Option<&Json> {
        match key.parse::<usize>() {
            Ok(index) => self.positional.get(index),
            Err(_) => self.named.get(key),
        }
    }
}

/// Per-call context passed to observers and log lines
#[derive(Debug, Clone)]
pub struct CallContext {
    pub request_id: String,
    pub function: String,
    pub version: String,
    pub client: String,
    pub metadata: Arc<HashMap<String, String>>,
}

impl CallContext {
    pub fn new(
        function: impl Into<String>,
        version: impl Into<String>,
        client: impl Into<String>,
    ) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            function: function.into(),
            version: version.into(),
            client: client.into(),
            metadata: Arc::new(HashMap::new()),
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = Arc::new(metadata);
        self
    }
}
