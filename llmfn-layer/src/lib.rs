//! # llmfn layers
//!
//! Built-in client layers and observers for llmfn.
//!
//! - `LoggingLayer`: logs model client invocations with timing information
//! - `TracingObserver`: logs function calls and stream events
//!
//! ## Usage
//!
//! ```ignore
//! use llmfn_core::ClientBuilder;
//! use llmfn_layer::{LoggingLayer, TracingObserver};
//!
//! let client = ClientBuilder::new(my_client)
//!     .layer(LoggingLayer::new())
//!     .build();
//! let registry = FunctionRegistry::new(schema, clients)
//!     .with_observer(Arc::new(TracingObserver::new()));
//! ```

pub mod logging;
pub mod observer;

// Re-exports
pub use logging::{LoggingClient, LoggingLayer};
pub use observer::TracingObserver;
