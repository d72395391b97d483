//! Error types for llmfn operations.

/// Errors raised while building or validating a schema table.
///
/// These are fatal at startup: a registry is never constructed on top of a
/// schema that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A reference points at a name the table does not define
    #[error("Unresolved type reference: {0}")]
    UnresolvedReference(String),

    /// Two named types share a name
    #[error("Duplicate type name: {0}")]
    DuplicateType(String),

    /// An enum lists the same variant (or alias) twice
    #[error("Enum {enum_name} declares variant {variant} more than once")]
    DuplicateVariant { enum_name: String, variant: String },

    /// A class lists the same field twice
    #[error("Class {class} declares field {field} more than once")]
    DuplicateField { class: String, field: String },

    /// A union without variants can never be satisfied
    #[error("Union in {scope} has no variants")]
    EmptyUnion { scope: String },

    /// Classes that require each other with nothing to stop the recursion
    #[error("These classes form a dependency cycle: {}", .0.join(" -> "))]
    InfiniteCycle(Vec<String>),

    /// The JSON Schema document could not be mapped onto the schema model
    #[error("Unsupported JSON Schema at {path}: {message}")]
    UnsupportedJsonSchema { path: String, message: String },
}

/// Errors raised while coercing model output into a schema type.
///
/// Every variant carries the dotted scope (`root.items[2].name`) where the
/// failure happened. In partial mode these are swallowed and the affected
/// branch is left unset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeserializeError {
    /// A required class field is absent
    #[error("Missing required field {field} at {scope}")]
    MissingField { scope: String, field: String },

    /// The value could not be losslessly coerced into the expected type
    #[error("Expected {expected} at {scope}, found {found}")]
    TypeMismatch {
        scope: String,
        expected: String,
        found: String,
    },

    /// Nothing resembling a value was found in the raw text
    #[error("No parsable value for {expected} in model output")]
    NoParsableValue { expected: String },

    /// Every union variant rejected the value
    #[error("No variant of {union} matched at {scope}")]
    UnionNoVariantMatched { scope: String, union: String },
}

/// Errors raised when resolving functions, implementations or clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No function with this name was registered
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    /// The function exists but has no implementation with this version
    #[error("Implementation {version} not found for function {function}")]
    ImplNotFound { function: String, version: String },

    /// No client config with this name was registered
    #[error("Client not found: {0}")]
    ClientNotFound(String),

    /// A client config names a provider with no transport bound to it
    #[error("Provider {provider} for client {client} is not registered")]
    ProviderNotFound { client: String, provider: String },
}

/// The main error type for llmfn operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Schema construction or validation errors
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Final-mode deserialization errors
    #[error("Deserialize error: {0}")]
    Deserialize(#[from] DeserializeError),

    /// Function, implementation or client resolution errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Errors reported by the model-client collaborator
    #[error("Client error ({client}): {source}")]
    Client {
        client: String,
        #[source]
        source: anyhow::Error,
    },

    /// Serialization errors (typed conversion, config parsing)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Prompt rendering errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Stream lifecycle errors
    #[error("Stream error: {0}")]
    Stream(String),
}

impl Error {
    /// Create a client error from any error source
    pub fn client(client: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Client {
            client: client.into(),
            source: source.into(),
        }
    }

    /// Create a client error from a message
    pub fn client_msg(client: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Self::Client {
            client: client.into(),
            source: anyhow::anyhow!("{}", msg),
        }
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a prompt error
    pub fn prompt(msg: impl Into<String>) -> Self {
        Self::Prompt(msg.into())
    }

    /// Create an implementation-not-found error
    pub fn impl_not_found(function: impl Into<String>, version: impl Into<String>) -> Self {
        Self::Registry(RegistryError::ImplNotFound {
            function: function.into(),
            version: version.into(),
        })
    }

    /// Create a client-not-found error
    pub fn client_not_found(name: impl Into<String>) -> Self {
        Self::Registry(RegistryError::ClientNotFound(name.into()))
    }

    /// Check if this error came from the deserializer
    pub fn is_deserialize(&self) -> bool {
        matches!(self, Error::Deserialize(_))
    }

    /// Check if this error was reported by the model client
    pub fn is_client(&self) -> bool {
        matches!(self, Error::Client { .. })
    }
}
