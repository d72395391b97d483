//! Registry of functions and their versioned implementations.

use super::executor::{ClientExecutor, ImplExecutor};
use super::function::Function;
use crate::client::{ChunkStream, ClientRegistry, ResolvedClient};
use crate::deserializer::Deserializer;
use crate::error::{Error, RegistryError};
use crate::observer::{Observer, ObserverSet};
use crate::prompt::PromptTemplate;
use crate::schema::{FieldType, SchemaTable};
use crate::stream::FunctionStream;
use crate::types::{Args, CallContext};
use crate::value::Value;
use crate::Result;
use futures::StreamExt;
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Function name to the version used when a call names none
    #[serde(default)]
    pub default_versions: HashMap<String, String>,
}

impl RegistryConfig {
    pub fn with_default_version(
        mut self,
        function: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.default_versions.insert(function.into(), version.into());
        self
    }
}

/// One version of a function: prompt, bound client, output type and executor.
#[derive(Debug, Clone)]
pub struct Implementation {
    pub version: String,
    pub prompt: PromptTemplate,
    /// Client used unless a primary client or an explicit override applies
    pub client: String,
    pub output: FieldType,
    pub executor: Arc<dyn ImplExecutor>,
}

impl Implementation {
    /// Create an implementation that sends its prompt to the resolved client
    pub fn new(
        version: impl Into<String>,
        prompt: impl Into<PromptTemplate>,
        client: impl Into<String>,
        output: FieldType,
    ) -> Self {
        Self {
            version: version.into(),
            prompt: prompt.into(),
            client: client.into(),
            output,
            executor: Arc::new(ClientExecutor),
        }
    }

    pub fn with_executor(mut self, executor: impl ImplExecutor) -> Self {
        self.executor = Arc::new(executor);
        self
    }
}

#[derive(Debug)]
struct RegisteredImpl {
    implementation: Implementation,
    deserializer: Deserializer,
    output_format: String,
}

#[derive(Debug, Default)]
struct FunctionEntry {
    impls: Vec<RegisteredImpl>,
    default: OnceCell<usize>,
}

/// Maps function names to implementations and dispatches calls.
///
/// Registration takes `&mut self`; once populated the registry is shared
/// read-only (typically behind an `Arc`).
#[derive(Debug)]
pub struct FunctionRegistry {
    schema: Arc<SchemaTable>,
    clients: Arc<ClientRegistry>,
    functions: HashMap<String, FunctionEntry>,
    observers: ObserverSet,
    config: RegistryConfig,
}

impl FunctionRegistry {
    pub fn new(schema: Arc<SchemaTable>, clients: Arc<ClientRegistry>) -> Self {
        Self {
            schema,
            clients,
            functions: HashMap::new(),
            observers: ObserverSet::default(),
            config: RegistryConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        for entry in self.functions.values_mut() {
            entry.default = OnceCell::new();
        }
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn schema(&self) -> &Arc<SchemaTable> {
        &self.schema
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub fn observers(&self) -> &ObserverSet {
        &self.observers
    }

    /// Register an implementation.
    ///
    /// Registering the same `(function, version)` again replaces the earlier
    /// implementation in place.
    pub fn register(&mut self, function: impl Into<String>, implementation: Implementation) -> Result<()> {
        let function = function.into();
        let deserializer = Deserializer::new(self.schema.clone(), implementation.output.clone())?;
        let output_format = self.schema.render_output_format(&implementation.output);
        let registered = RegisteredImpl {
            implementation,
            deserializer,
            output_format,
        };

        let entry = self.functions.entry(function.clone()).or_default();
        let version = &registered.implementation.version;
        match entry
            .impls
            .iter()
            .position(|r| &r.implementation.version == version)
        {
            Some(pos) => {
                debug!("replacing {}::{}", function, version);
                entry.impls[pos] = registered;
            }
            None => {
                debug!("registering {}::{}", function, version);
                entry.impls.push(registered);
            }
        }
        entry.default = OnceCell::new();
        Ok(())
    }

    /// Registered function names, sorted
    pub fn functions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Versions of a function in registration order
    pub fn versions(&self, function: &str) -> Result<Vec<&str>> {
        let entry = self.entry(function)?;
        Ok(entry
            .impls
            .iter()
            .map(|r| r.implementation.version.as_str())
            .collect())
    }

    pub fn get_impl<'a>(&'a self, function: &'a str, version: &str) -> Result<ImplHandle<'a>> {
        let entry = self.entry(function)?;
        let registered = entry
            .impls
            .iter()
            .find(|r| r.implementation.version == version)
            .ok_or_else(|| Error::impl_not_found(function, version))?;
        Ok(ImplHandle {
            registry: self,
            function,
            registered,
        })
    }

    /// The configured default version, or the first one registered.
    pub fn default_impl<'a>(&'a self, function: &'a str) -> Result<ImplHandle<'a>> {
        let entry = self.entry(function)?;
        let index = *entry.default.get_or_try_init(|| -> Result<usize> {
            let index = match self.config.default_versions.get(function) {
                Some(version) => entry
                    .impls
                    .iter()
                    .position(|r| &r.implementation.version == version)
                    .ok_or_else(|| Error::impl_not_found(function, version.as_str()))?,
                None => 0,
            };
            debug!(
                "default implementation of {} is {}",
                function, entry.impls[index].implementation.version
            );
            Ok(index)
        })?;
        Ok(ImplHandle {
            registry: self,
            function,
            registered: &entry.impls[index],
        })
    }

    /// Call the default implementation of `function`
    pub async fn call(&self, function: &str, args: &Args, client_override: Option<&str>) -> Result<Value> {
        self.default_impl(function)?.call(args, client_override).await
    }

    /// Stream the default implementation of `function`
    pub fn stream(&self, function: &str, args: &Args, client_override: Option<&str>) -> Result<FunctionStream> {
        self.default_impl(function)?.stream(args, client_override)
    }

    /// Typed handle for one function.
    ///
    /// `T` is the final output type, `P` the partial type used while streaming.
    pub fn function<T, P>(&self, name: &str) -> Result<Function<'_, T, P>>
    where
        T: DeserializeOwned,
        P: DeserializeOwned,
    {
        self.entry(name)?;
        Ok(Function::new(self, name))
    }

    /// Check the registry before serving calls.
    ///
    /// Every output type must resolve, every bound client must exist with a
    /// registered provider, and every configured default version must exist.
    pub fn validate(&self) -> Result<()> {
        for function in self.functions() {
            let entry = self.entry(function)?;
            for registered in &entry.impls {
                let implementation = &registered.implementation;
                self.schema.check_type(&implementation.output)?;

                let config = self
                    .clients
                    .client(&implementation.client)
                    .ok_or_else(|| Error::client_not_found(implementation.client.as_str()))?;
                if !self.clients.has_provider(&config.provider) {
                    return Err(RegistryError::ProviderNotFound {
                        client: config.name,
                        provider: config.provider,
                    }
                    .into());
                }
            }
        }

        let mut defaults: Vec<_> = self.config.default_versions.iter().collect();
        defaults.sort();
        for (function, version) in defaults {
            self.get_impl(function, version)?;
        }
        debug!("validated {} functions", self.functions.len());
        Ok(())
    }

    fn entry(&self, function: &str) -> Result<&FunctionEntry> {
        self.functions
            .get(function)
            .filter(|entry| !entry.impls.is_empty())
            .ok_or_else(|| RegistryError::FunctionNotFound(function.to_string()).into())
    }
}

/// A resolved implementation of a function, borrowed from its registry.
#[derive(Debug, Clone, Copy)]
pub struct ImplHandle<'a> {
    registry: &'a FunctionRegistry,
    function: &'a str,
    registered: &'a RegisteredImpl,
}

impl<'a> ImplHandle<'a> {
    pub fn function(&self) -> &str {
        self.function
    }

    pub fn version(&self) -> &str {
        &self.registered.implementation.version
    }

    pub fn implementation(&self) -> &Implementation {
        &self.registered.implementation
    }

    /// The output format instructions substituted for `{{ output_format }}`
    pub fn output_format(&self) -> &str {
        &self.registered.output_format
    }

    /// Render the prompt for `args`
    pub fn render(&self, args: &Args) -> Result<String> {
        self.registered
            .implementation
            .prompt
            .render(args, &self.registered.output_format)
    }

    fn prepare(&self, args: &Args, client_override: Option<&str>) -> Result<(CallContext, String, ResolvedClient)> {
        let implementation = &self.registered.implementation;
        let prompt = self.render(args)?;
        let resolved = self
            .registry
            .clients
            .resolve(client_override, &implementation.client)?;
        let ctx = CallContext::new(self.function, implementation.version.as_str(), resolved.config.name.as_str());
        Ok((ctx, prompt, resolved))
    }

    /// Run the implementation and parse its complete output
    pub async fn call(&self, args: &Args, client_override: Option<&str>) -> Result<Value> {
        let (ctx, prompt, resolved) = self.prepare(args, client_override)?;
        debug!(
            "[{}] calling {}::{} on client {}",
            ctx.request_id, ctx.function, ctx.version, ctx.client
        );
        let observers = &self.registry.observers;
        observers.call_start(&ctx, &prompt);

        let result = match self
            .registered
            .implementation
            .executor
            .call(&ctx, &resolved, prompt)
            .await
        {
            Ok(raw) => self.registered.deserializer.parse_final(&raw).map_err(Error::from),
            Err(err) => Err(err),
        };

        match &result {
            Ok(value) => {
                debug!("[{}] {} completed", ctx.request_id, ctx.function);
                observers.call_end(&ctx, value);
            }
            Err(err) => {
                warn!("[{}] {} failed: {}", ctx.request_id, ctx.function, err);
                observers.error(&ctx, err);
            }
        }
        result
    }

    /// Run the implementation as a stream of partial values.
    ///
    /// Prompt and client resolution fail here; failures opening the
    /// underlying chunk stream surface as a failed [`FunctionStream`].
    pub fn stream(&self, args: &Args, client_override: Option<&str>) -> Result<FunctionStream> {
        let (ctx, prompt, resolved) = self.prepare(args, client_override)?;
        debug!(
            "[{}] streaming {}::{} on client {}",
            ctx.request_id, ctx.function, ctx.version, ctx.client
        );
        self.registry.observers.call_start(&ctx, &prompt);

        let executor = self.registered.implementation.executor.clone();
        let producer_ctx = ctx.clone();
        let producer = async_stream::stream! {
            match executor.stream(&producer_ctx, &resolved, prompt).await {
                Ok(mut chunks) => {
                    while let Some(chunk) = chunks.next().await {
                        yield chunk;
                    }
                }
                Err(err) => yield Err(err),
            }
        };

        let producer: Box<ChunkStream> = Box::new(Box::pin(producer));
        Ok(
            FunctionStream::new(producer, self.registered.deserializer.clone(), ctx)
                .with_observers(self.registry.observers.clone()),
        )
    }
}
