//! Function runtime.
//!
//! A [`FunctionRegistry`] maps function names to versioned implementations.
//! Each implementation binds a prompt template, a client name, an output
//! type and an [`ImplExecutor`]. Calls resolve the implementation, render
//! the prompt, resolve the client and hand the raw output to the
//! deserializer (directly, or through a [`crate::stream::FunctionStream`]).

pub mod executor;
pub mod function;
pub mod registry;

pub use executor::{ClientExecutor, FnExecutor, ImplExecutor};
pub use function::Function;
pub use registry::{FunctionRegistry, ImplHandle, Implementation, RegistryConfig};
