//! # llmfn
//!
//! Schema-typed LLM functions for Rust.
//!
//! A function is a named prompt template whose model output is parsed into
//! a declared schema type. Output is parsed tolerantly (markdown fences,
//! surrounding prose, trailing commas, truncated JSON) and can be streamed
//! as partial values that only ever gain data.
//!
//! ## Quick Start
//!
//! ```ignore
//! use llmfn::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(transport: Arc<dyn ModelClient>) -> Result<()> {
//! let schema = SchemaTable::builder()
//!     .enum_type(EnumDef::new("Sentiment").variant("Positive").variant("Negative"))
//!     .build()?;
//!
//! let clients = ClientRegistry::new();
//! clients.add_client(ClientConfig::new("fast", "openai", "gpt-4o-mini"));
//! clients.add_provider("openai", transport);
//!
//! let mut registry = FunctionRegistry::new(Arc::new(schema), Arc::new(clients));
//! registry.register(
//!     "Classify",
//!     Implementation::new(
//!         "v1",
//!         "Classify the sentiment of: {{ text }}\n{{ output_format }}",
//!         "fast",
//!         FieldType::reference("Sentiment"),
//!     ),
//! )?;
//! registry.validate()?;
//!
//! let value = registry
//!     .call("Classify", &Args::new().named("text", "I love it"), None)
//!     .await?;
//! println!("{}", value);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Includes `layers`
//! - `layers`: Built-in client layers and observers (logging, tracing)
//! - `schema`: Build schema tables from `schemars::JsonSchema` types
//! - `full`: All features enabled

// Re-export core types and traits
pub use llmfn_core::*;

// Re-export layers under `layer` module
#[cfg(feature = "llmfn-layer")]
pub mod layer {
    //! Built-in client layers and observers.
    pub use llmfn_core::layer::*;
    pub use llmfn_layer::*;
}

// Re-export schemars when schema feature is enabled
#[cfg(feature = "schema")]
pub mod schemars {
    pub use ::schemars::*;
}

/// Build a schema table and target type from a `JsonSchema` type.
///
/// The root type becomes the returned [`FieldType`]; nested structs and
/// enums become named types of the table.
#[cfg(feature = "schema")]
pub fn schema_for<T: ::schemars::JsonSchema>() -> Result<(SchemaTable, FieldType)> {
    let schema = ::schemars::schema_for!(T);
    let json = serde_json::to_value(&schema)?;
    Ok(SchemaTable::from_json_schema(&json)?)
}

/// Prelude module for convenient imports
pub mod prelude {
    //! Prelude module containing the most commonly used types and traits.
    //!
    //! ```
    //! use llmfn::prelude::*;
    //! ```

    pub use crate::{
        Args, ClassDef, ClientBuilder, ClientConfig, ClientRegistry, EnumDef, Error, FieldType,
        Function, FunctionRegistry, Implementation, Layer, ModelClient, Observer, PartialValue,
        Result, RuntimeConfig, SchemaTable, StreamState, Value,
    };

    #[cfg(feature = "llmfn-layer")]
    pub use llmfn_layer::*;

    #[cfg(feature = "schema")]
    pub use crate::schema_for;
}
