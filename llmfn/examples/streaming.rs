//! Streaming a schema-typed function.
//!
//! This demonstrates:
//! 1. Deriving the schema table from Rust types with schemars
//! 2. Registering two versions of a function and picking the default from config
//! 3. Wrapping a model client in `LoggingLayer` and observing calls with `TracingObserver`
//! 4. Consuming partial values as the model output arrives
//!
//! The model is a scripted `MockClient`, so the example runs offline.

use futures::StreamExt;
use llmfn::prelude::*;
use llmfn::schemars::JsonSchema;
use llmfn::testing::MockClient;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
enum Seniority {
    Junior,
    Senior,
    Staff,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct Resume {
    /// Full name of the candidate
    name: String,
    /// Most recent job title
    title: Option<String>,
    seniority: Seniority,
    skills: Vec<String>,
}

/// Partial mirror of `Resume` used while streaming
#[derive(Debug, Deserialize)]
struct PartialResume {
    name: Option<String>,
    seniority: Option<Seniority>,
    skills: Option<Vec<String>>,
}

const MODEL_OUTPUT: &str = r#"Here is the extracted resume:
```json
{
  "name": "Grace Hopper",
  "title": "Rear Admiral",
  "seniority": "staff",
  "skills": ["COBOL", "compilers", "teaching",],
}
```"#;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let (schema, resume_type) = schema_for::<Resume>()?;
    println!("Output format:\n{}\n", schema.render_output_format(&resume_type));

    let config = RuntimeConfig::from_json_str(
        r#"{
            "clients": [
                {"name": "fast", "provider": "mock", "model": "mock-small"},
                {"name": "smart", "provider": "mock", "model": "mock-large", "params": {"temperature": 0.0}}
            ],
            "default_versions": {"ExtractResume": "v2"}
        }"#,
    )?;

    let mock = MockClient::new("mock").with_chunked_stream(MODEL_OUTPUT, 12);
    let transport = ClientBuilder::new(mock)
        .layer(LoggingLayer::with_prefix("[example]"))
        .build();

    let clients = ClientRegistry::new();
    config.apply(&clients)?;
    clients.add_provider("mock", transport);

    let mut registry = FunctionRegistry::new(Arc::new(schema), Arc::new(clients))
        .with_config(config.registry_config())
        .with_observer(Arc::new(TracingObserver::new()));
    registry.register(
        "ExtractResume",
        Implementation::new(
            "v1",
            "Extract the resume.\n\n{{ resume }}\n\n{{ output_format }}",
            "fast",
            resume_type.clone(),
        ),
    )?;
    registry.register(
        "ExtractResume",
        Implementation::new(
            "v2",
            "You are a recruiter. Read this resume carefully:\n{{ resume }}\n\n{{ output_format }}",
            "smart",
            resume_type,
        ),
    )?;
    registry.validate()?;

    let extract = registry.function::<Resume, PartialResume>("ExtractResume")?;
    let args = Args::new().named("resume", "Grace Hopper, Rear Admiral, inventor of COBOL...");

    let mut stream = extract.stream(&args)?;
    while let Some(partial) = stream.next().await {
        let partial = partial?;
        println!(
            "partial: name={:?} seniority={:?} skills={:?}",
            partial.name, partial.seniority, partial.skills
        );
    }

    let resume = stream.await_final().await?;
    println!("\nfinal: {:#?}", resume);
    Ok(())
}
