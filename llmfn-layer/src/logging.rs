//! Logging layer for model client operations.

use async_trait::async_trait;
use futures::StreamExt;
use llmfn_core::client::{ChunkStream, ClientConfig, ModelClient};
use llmfn_core::layer::{Layer, LayeredClient};
use llmfn_core::{impl_layered_client, Result};
use std::time::Instant;

/// Logging layer that logs client invocations with timings.
#[derive(Debug, Clone)]
pub struct LoggingLayer {
    prefix: String,
}

impl LoggingLayer {
    /// Create a new logging layer
    pub fn new() -> Self {
        Self {
            prefix: "[llmfn]".to_string(),
        }
    }

    /// Create a logging layer with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for LoggingLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ModelClient> Layer<C> for LoggingLayer {
    type LayeredClient = LoggingClient<C>;

    fn layer(&self, inner: C) -> Self::LayeredClient {
        LoggingClient {
            inner,
            prefix: self.prefix.clone(),
        }
    }
}

/// Client wrapped with logging
#[derive(Debug)]
pub struct LoggingClient<C> {
    inner: C,
    prefix: String,
}

#[async_trait]
impl<C: ModelClient> LayeredClient for LoggingClient<C> {
    type Inner = C;

    fn inner(&self) -> &Self::Inner {
        &self.inner
    }

    async fn layered_invoke(&self, prompt: &str, config: &ClientConfig) -> Result<String> {
        tracing::debug!(
            "{} invoke request: client={}, model={}, prompt_len={}",
            self.prefix,
            config.name,
            config.model,
            prompt.len()
        );

        let start = Instant::now();
        let result = self.inner.invoke(prompt, config).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(text) => {
                tracing::debug!(
                    "{} invoke success: client={}, response_len={}, elapsed={:?}",
                    self.prefix,
                    config.name,
                    text.len(),
                    elapsed
                );
            }
            Err(e) => {
                tracing::error!(
                    "{} invoke error: client={}, {}, elapsed={:?}",
                    self.prefix,
                    config.name,
                    e,
                    elapsed
                );
            }
        }

        result
    }

    async fn layered_invoke_stream(
        &self,
        prompt: &str,
        config: &ClientConfig,
    ) -> Result<Box<ChunkStream>> {
        tracing::debug!(
            "{} invoke_stream request: client={}, model={}, prompt_len={}",
            self.prefix,
            config.name,
            config.model,
            prompt.len()
        );

        let start = Instant::now();
        let mut inner = match self.inner.invoke_stream(prompt, config).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(
                    "{} invoke_stream error: client={}, {}, elapsed={:?}",
                    self.prefix,
                    config.name,
                    e,
                    start.elapsed()
                );
                return Err(e);
            }
        };
        tracing::debug!(
            "{} invoke_stream opened: client={}, elapsed={:?}",
            self.prefix,
            config.name,
            start.elapsed()
        );

        let prefix = self.prefix.clone();
        let client = config.name.clone();
        let stream = async_stream::stream! {
            let mut chunks = 0usize;
            let mut bytes = 0usize;
            while let Some(item) = inner.next().await {
                match &item {
                    Ok(chunk) => {
                        chunks += 1;
                        bytes += chunk.len();
                    }
                    Err(e) => {
                        tracing::error!(
                            "{} stream error: client={}, after {} chunks, {}, elapsed={:?}",
                            prefix, client, chunks, e, start.elapsed()
                        );
                    }
                }
                yield item;
            }
            tracing::debug!(
                "{} stream finished: client={}, chunks={}, bytes={}, elapsed={:?}",
                prefix, client, chunks, bytes, start.elapsed()
            );
        };

        Ok(Box::new(Box::pin(stream)))
    }
}

impl_layered_client!(LoggingClient<C>, C: ModelClient);
