use super::registry::{FunctionRegistry, ImplHandle};
use crate::stream::TypedStream;
use crate::types::Args;
use crate::Result;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Typed handle for one registered function.
///
/// `T` is the final output type and `P` the partial type yielded while
/// streaming (usually a mirror of `T` with every field optional).
#[derive(Debug)]
pub struct Function<'r, T, P = serde_json::Value> {
    registry: &'r FunctionRegistry,
    name: String,
    client: Option<String>,
    _marker: PhantomData<fn() -> (T, P)>,
}

impl<'r, T, P> Function<'r, T, P>
where
    T: DeserializeOwned,
    P: DeserializeOwned,
{
    pub(crate) fn new(registry: &'r FunctionRegistry, name: &str) -> Self {
        Self {
            registry,
            name: name.to_string(),
            client: None,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Route every call through the named client
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// The default implementation backing this handle
    pub fn implementation(&self) -> Result<ImplHandle<'_>> {
        self.registry.default_impl(&self.name)
    }

    pub async fn call(&self, args: &Args) -> Result<T> {
        self.implementation()?
            .call(args, self.client.as_deref())
            .await?
            .deserialize_into()
    }

    /// Call a specific version
    pub async fn call_version(&self, version: &str, args: &Args) -> Result<T> {
        self.registry
            .get_impl(&self.name, version)?
            .call(args, self.client.as_deref())
            .await?
            .deserialize_into()
    }

    pub fn stream(&self, args: &Args) -> Result<TypedStream<P, T>> {
        let stream = self.implementation()?.stream(args, self.client.as_deref())?;
        Ok(TypedStream::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use crate::client::{ClientConfig, ClientRegistry};
    use crate::error::{Error, RegistryError};
    use crate::runtime::{FunctionRegistry, Implementation};
    use crate::schema::{ClassDef, FieldType, SchemaTable};
    use crate::testing::MockClient;
    use crate::types::Args;
    use futures::StreamExt;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: i64,
    }

    #[derive(Debug, Deserialize)]
    struct PartialPerson {
        name: Option<String>,
        age: Option<i64>,
    }

    fn registry(mock: MockClient) -> FunctionRegistry {
        let schema = SchemaTable::builder()
            .class(
                ClassDef::new("Person")
                    .field("name", FieldType::string())
                    .field("age", FieldType::int()),
            )
            .build()
            .unwrap();
        let clients = ClientRegistry::new();
        clients.add_client(ClientConfig::new("A", "mock", "model-a"));
        clients.add_client(ClientConfig::new("B", "mock", "model-b"));
        clients.add_provider("mock", Arc::new(mock));

        let mut registry = FunctionRegistry::new(Arc::new(schema), Arc::new(clients));
        registry
            .register(
                "ExtractPerson",
                Implementation::new("v1", "{{ 0 }}\n{{ output_format }}", "A", FieldType::reference("Person")),
            )
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_typed_call() {
        let registry = registry(
            MockClient::new("mock").with_response("Sure!\n```json\n{\"name\": \"Ada\", \"age\": \"36\"}\n```"),
        );
        let extract = registry.function::<Person, PartialPerson>("ExtractPerson").unwrap();

        let person = extract.call(&Args::new().arg("Ada is 36")).await.unwrap();
        assert_eq!(
            person,
            Person {
                name: "Ada".into(),
                age: 36
            }
        );
    }

    #[tokio::test]
    async fn test_typed_stream() {
        let registry = registry(MockClient::new("mock").with_chunked_stream(
            "{\"name\": \"Grace\", \"age\": 85}",
            6,
        ));
        let extract = registry
            .function::<Person, PartialPerson>("ExtractPerson")
            .unwrap()
            .with_client("B");

        let mut stream = extract.stream(&Args::new().arg("bio")).unwrap();
        let mut saw_name_before_age = false;
        while let Some(partial) = stream.next().await {
            let partial = partial.unwrap();
            if partial.name.is_some() && partial.age.is_none() {
                saw_name_before_age = true;
            }
        }
        assert!(saw_name_before_age);

        let person = stream.await_final().await.unwrap();
        assert_eq!(person.age, 85);
    }

    #[test]
    fn test_unknown_function() {
        let registry = registry(MockClient::new("mock"));
        let err = registry
            .function::<Person, PartialPerson>("Nope")
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Registry(RegistryError::FunctionNotFound(_))
        ));
    }
}
