//! # llmfn core
//!
//! Core types and runtime for schema-typed LLM functions.
//!
//! A function is a named prompt whose output is parsed into a declared
//! schema type. This crate provides the schema model, the tolerant
//! deserializer, the streaming engine with monotonic partial values, and the
//! function and client registries.

pub mod client;
pub mod config;
pub mod deserializer;
pub mod error;
pub mod layer;
pub mod observer;
pub mod prompt;
pub mod runtime;
pub mod schema;
pub mod stream;
pub mod testing;
pub mod types;
pub mod value;

// Re-exports
pub use client::{
    collect_chunks, ChunkStream, ClientBuilder, ClientConfig, ClientInfo, ClientRegistry,
    ModelClient, ResolvedClient,
};
pub use config::RuntimeConfig;
pub use deserializer::{parse_final, parse_partial, parse_partial_from, Deserializer};
pub use error::{DeserializeError, Error, RegistryError, SchemaError};
pub use layer::{Layer, LayeredClient};
pub use observer::{Observer, ObserverPhase, ObserverSet};
pub use prompt::PromptTemplate;
pub use runtime::{
    ClientExecutor, FnExecutor, Function, FunctionRegistry, ImplExecutor, ImplHandle,
    Implementation, RegistryConfig,
};
pub use schema::{ClassDef, EnumDef, EnumVariant, FieldDef, FieldType, NamedType, Primitive, SchemaTable};
pub use stream::{FunctionStream, StreamState, TypedStream};
pub use types::{Args, CallContext};
pub use value::{PartialValue, Value};

/// Result type alias for llmfn operations
pub type Result<T> = std::result::Result<T, Error>;
