//! Executors: how an implementation turns a rendered prompt into raw output.

use crate::client::{ChunkStream, ClientConfig, ResolvedClient};
use crate::types::CallContext;
use crate::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// The call/stream pair behind an implementation.
#[async_trait]
pub trait ImplExecutor: Send + Sync + Debug + 'static {
    /// Produce the complete raw output for a prompt
    async fn call(&self, ctx: &CallContext, client: &ResolvedClient, prompt: String) -> Result<String>;

    /// Produce the raw output as a stream of chunks
    async fn stream(
        &self,
        ctx: &CallContext,
        client: &ResolvedClient,
        prompt: String,
    ) -> Result<Box<ChunkStream>>;
}

/// Default executor: sends the prompt to the resolved model client.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientExecutor;

#[async_trait]
impl ImplExecutor for ClientExecutor {
    async fn call(&self, ctx: &CallContext, client: &ResolvedClient, prompt: String) -> Result<String> {
        tracing::trace!(
            "[{}] invoking {} ({})",
            ctx.request_id,
            client.config.name,
            client.config.model
        );
        client.client.invoke(&prompt, &client.config).await
    }

    async fn stream(
        &self,
        ctx: &CallContext,
        client: &ResolvedClient,
        prompt: String,
    ) -> Result<Box<ChunkStream>> {
        tracing::trace!(
            "[{}] opening stream on {} ({})",
            ctx.request_id,
            client.config.name,
            client.config.model
        );
        client.client.invoke_stream(&prompt, &client.config).await
    }
}

type CallFn = Arc<dyn Fn(String, ClientConfig) -> BoxFuture<'static, Result<String>> + Send + Sync>;
type StreamFn =
    Arc<dyn Fn(String, ClientConfig) -> BoxFuture<'static, Result<Box<ChunkStream>>> + Send + Sync>;

/// Executor backed by closures.
///
/// Without a stream closure, streaming runs the call closure and delivers
/// its output as a single chunk.
#[derive(Clone)]
pub struct FnExecutor {
    call_fn: CallFn,
    stream_fn: Option<StreamFn>,
}

impl FnExecutor {
    pub fn new<F, Fut>(call_fn: F) -> Self
    where
        F: Fn(String, ClientConfig) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String>> + Send + 'static,
    {
        Self {
            call_fn: Arc::new(move |prompt, config| Box::pin(call_fn(prompt, config))),
            stream_fn: None,
        }
    }

    pub fn with_stream<F, Fut>(mut self, stream_fn: F) -> Self
    where
        F: Fn(String, ClientConfig) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Box<ChunkStream>>> + Send + 'static,
    {
        self.stream_fn = Some(Arc::new(move |prompt, config| Box::pin(stream_fn(prompt, config))));
        self
    }
}

impl Debug for FnExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnExecutor")
            .field("streaming", &self.stream_fn.is_some())
            .finish()
    }
}

#[async_trait]
impl ImplExecutor for FnExecutor {
    async fn call(&self, _ctx: &CallContext, client: &ResolvedClient, prompt: String) -> Result<String> {
        (self.call_fn)(prompt, client.config.clone()).await
    }

    async fn stream(
        &self,
        _ctx: &CallContext,
        client: &ResolvedClient,
        prompt: String,
    ) -> Result<Box<ChunkStream>> {
        match &self.stream_fn {
            Some(stream_fn) => stream_fn(prompt, client.config.clone()).await,
            None => {
                let text = (self.call_fn)(prompt, client.config.clone()).await?;
                Ok(Box::new(tokio_stream::once(Ok(text))))
            }
        }
    }
}
