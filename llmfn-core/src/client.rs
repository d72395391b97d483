//! Model client trait and the client registry.

use crate::error::{Error, RegistryError};
use crate::layer::Layer;
use crate::Result;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Stream of raw output chunks produced by a model client
pub type ChunkStream = dyn Stream<Item = Result<String>> + Send + Unpin;

/// Static information about a model client transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Provider id the transport is registered under
    pub id: String,
    /// Human-readable name
    pub name: String,
}

impl ClientInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Named client configuration: which provider to use and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub name: String,
    pub provider: String,
    pub model: String,
    /// Sampling parameters passed through to the provider untouched
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

impl ClientConfig {
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            model: model.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Transport that sends a rendered prompt to a model.
///
/// Retries, timeouts and authentication belong to implementations of this
/// trait.
#[async_trait]
pub trait ModelClient: Send + Sync + Debug + 'static {
    /// Get client information
    fn info(&self) -> Arc<ClientInfo>;

    /// Complete a prompt and return the whole response text.
    ///
    /// Defaults to draining [`ModelClient::invoke_stream`].
    async fn invoke(&self, prompt: &str, config: &ClientConfig) -> Result<String> {
        let stream = self.invoke_stream(prompt, config).await?;
        collect_chunks(stream).await
    }

    /// Complete a prompt as a stream of raw text chunks
    async fn invoke_stream(&self, prompt: &str, config: &ClientConfig) -> Result<Box<ChunkStream>>;
}

/// Helper function to collect a chunk stream into one string
pub async fn collect_chunks(mut stream: Box<ChunkStream>) -> Result<String> {
    use futures::StreamExt;

    let mut content = String::new();
    while let Some(chunk) = stream.next().await {
        content.push_str(&chunk?);
    }
    Ok(content)
}

/// Builder applying layers to a client before it is registered.
pub struct ClientBuilder<C> {
    client: C,
}

impl<C: ModelClient> ClientBuilder<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Wrap the client in a layer; layers added last run first
    pub fn layer<L>(self, layer: L) -> ClientBuilder<L::LayeredClient>
    where
        L: Layer<C>,
    {
        ClientBuilder {
            client: layer.layer(self.client),
        }
    }

    pub fn build(self) -> Arc<dyn ModelClient> {
        Arc::new(self.client)
    }
}

/// A client config together with the transport serving it
#[derive(Debug, Clone)]
pub struct ResolvedClient {
    pub config: ClientConfig,
    pub client: Arc<dyn ModelClient>,
}

/// Registry of client configs and provider transports.
///
/// Populated during setup through `&self`, then shared behind an `Arc`.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    configs: DashMap<String, ClientConfig>,
    providers: DashMap<String, Arc<dyn ModelClient>>,
    primary: ArcSwapOption<String>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client config, replacing any config with the same name.
    pub fn add_client(&self, config: ClientConfig) {
        tracing::debug!(
            "registering client {} (provider: {}, model: {})",
            config.name,
            config.provider,
            config.model
        );
        self.configs.insert(config.name.clone(), config);
    }

    /// Bind a transport to a provider id
    pub fn add_provider(&self, id: impl Into<String>, client: Arc<dyn ModelClient>) {
        let id = id.into();
        tracing::debug!("registering provider {} ({})", id, client.info().name);
        self.providers.insert(id, client);
    }

    /// Make `name` the registry-wide default client.
    ///
    /// The name is not checked here; an unknown name fails on first use.
    pub fn set_primary(&self, name: impl Into<String>) {
        let name = name.into();
        tracing::debug!("primary client set to {}", name);
        self.primary.store(Some(Arc::new(name)));
    }

    /// Remove the primary override
    pub fn clear_primary(&self) {
        self.primary.store(None);
    }

    pub fn primary(&self) -> Option<String> {
        self.primary.load_full().map(|name| (*name).clone())
    }

    pub fn client(&self, name: &str) -> Option<ClientConfig> {
        self.configs.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.configs.contains_key(name)
    }

    pub fn has_provider(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Pick the client for a call: explicit override, then the primary
    /// client, then the implementation's bound client.
    pub fn resolve(&self, client_override: Option<&str>, bound: &str) -> Result<ResolvedClient> {
        let primary = self.primary.load_full();
        let name = client_override
            .filter(|name| !name.is_empty())
            .or_else(|| primary.as_deref().map(String::as_str).filter(|name| !name.is_empty()))
            .unwrap_or(bound);

        let config = self
            .client(name)
            .ok_or_else(|| Error::client_not_found(name))?;
        let client = self
            .providers
            .get(&config.provider)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::ProviderNotFound {
                client: config.name.clone(),
                provider: config.provider.clone(),
            })?;

        tracing::debug!(
            "resolved client {} (bound: {}, provider: {})",
            config.name,
            bound,
            config.provider
        );
        Ok(ResolvedClient { config, client })
    }
}
