//! Layer trait and abstractions.
//!
//! Layers wrap a model client with cross-cutting behavior such as logging.
//! Each layer takes the inner client and returns a new client.

use crate::client::{ChunkStream, ClientConfig, ClientInfo, ModelClient};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Layer trait for wrapping model clients.
pub trait Layer<C: ModelClient> {
    /// The type of the layered client
    type LayeredClient: ModelClient;

    /// Wrap the inner client with this layer
    fn layer(&self, inner: C) -> Self::LayeredClient;
}

/// Helper trait for layered clients.
///
/// Every method forwards to the inner client by default; implementers
/// override only what they intercept and use [`impl_layered_client!`] for
/// the [`ModelClient`] impl.
#[async_trait]
pub trait LayeredClient: Sized + ModelClient {
    /// The inner client type
    type Inner: ModelClient;

    /// Get a reference to the inner client
    fn inner(&self) -> &Self::Inner;

    fn layered_info(&self) -> Arc<ClientInfo> {
        self.inner().info()
    }

    async fn layered_invoke(&self, prompt: &str, config: &ClientConfig) -> Result<String> {
        self.inner().invoke(prompt, config).await
    }

    async fn layered_invoke_stream(
        &self,
        prompt: &str,
        config: &ClientConfig,
    ) -> Result<Box<ChunkStream>> {
        self.inner().invoke_stream(prompt, config).await
    }
}

/// Implement [`ModelClient`] by forwarding to [`LayeredClient`] methods.
#[macro_export]
macro_rules! impl_layered_client {
    ($type:ty) => {
        $crate::impl_layered_client!($type,);
    };
    ($type:ty, $($bounds:tt)*) => {
        #[async_trait::async_trait]
        impl<$($bounds)*> $crate::client::ModelClient for $type {
            fn info(&self) -> std::sync::Arc<$crate::client::ClientInfo> {
                $crate::layer::LayeredClient::layered_info(self)
            }

            async fn invoke(
                &self,
                prompt: &str,
                config: &$crate::client::ClientConfig,
            ) -> $crate::Result<String> {
                $crate::layer::LayeredClient::layered_invoke(self, prompt, config).await
            }

            async fn invoke_stream(
                &self,
                prompt: &str,
                config: &$crate::client::ClientConfig,
            ) -> $crate::Result<Box<$crate::client::ChunkStream>> {
                $crate::layer::LayeredClient::layered_invoke_stream(self, prompt, config).await
            }
        }
    };
}
