//! Test doubles: a scripted model client and a recording observer.

use crate::client::{ChunkStream, ClientConfig, ClientInfo, ModelClient};
use crate::error::Error;
use crate::observer::Observer;
use crate::types::CallContext;
use crate::value::Value;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// One scripted reply, consumed in FIFO order by `invoke` and `invoke_stream`.
#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Error(String),
    /// Chunks; an `Err` item fails the stream at that point
    Chunks(Vec<std::result::Result<String, String>>),
}

/// A call received by [`MockClient`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub prompt: String,
    pub client: String,
    pub model: String,
    pub streamed: bool,
}

/// A model client returning scripted replies.
#[derive(Debug)]
pub struct MockClient {
    info: Arc<ClientInfo>,
    replies: Mutex<VecDeque<Reply>>,
    fallback: Option<String>,
    recorded: Mutex<Vec<RecordedCall>>,
    call_count: AtomicUsize,
}

impl MockClient {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            info: Arc::new(ClientInfo::new(id.clone(), format!("Mock ({})", id))),
            replies: Mutex::new(VecDeque::new()),
            fallback: None,
            recorded: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Queue a complete response
    pub fn with_response(self, text: impl Into<String>) -> Self {
        lock(&self.replies).push_back(Reply::Text(text.into()));
        self
    }

    /// Queue a failure
    pub fn with_error(self, message: impl Into<String>) -> Self {
        lock(&self.replies).push_back(Reply::Error(message.into()));
        self
    }

    /// Queue a response delivered as the given chunks
    pub fn with_stream<I, T>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let chunks = chunks.into_iter().map(|c| Ok(c.into())).collect();
        lock(&self.replies).push_back(Reply::Chunks(chunks));
        self
    }

    /// Queue a response split into chunks of `size` characters
    pub fn with_chunked_stream(self, text: &str, size: usize) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let chunks: Vec<String> = chars
            .chunks(size.max(1))
            .map(|c| c.iter().collect())
            .collect();
        self.with_stream(chunks)
    }

    /// Queue chunks followed by a mid-stream failure
    pub fn with_stream_error<I, T>(self, chunks: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut items: Vec<_> = chunks.into_iter().map(|c| Ok(c.into())).collect();
        items.push(Err(message.into()));
        lock(&self.replies).push_back(Reply::Chunks(items));
        self
    }

    /// Response used once the queue is empty
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        lock(&self.recorded).clone()
    }

    /// Prompts received so far, in order
    pub fn recorded_prompts(&self) -> Vec<String> {
        lock(&self.recorded).iter().map(|c| c.prompt.clone()).collect()
    }

    fn next_reply(&self, prompt: &str, config: &ClientConfig, streamed: bool) -> Result<Reply> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.recorded).push(RecordedCall {
            prompt: prompt.to_string(),
            client: config.name.clone(),
            model: config.model.clone(),
            streamed,
        });

        match lock(&self.replies).pop_front() {
            Some(reply) => Ok(reply),
            None => self
                .fallback
                .clone()
                .map(Reply::Text)
                .ok_or_else(|| Error::client_msg(&config.name, "MockClient: no replies queued")),
        }
    }
}

#[async_trait]
impl ModelClient for MockClient {
    fn info(&self) -> Arc<ClientInfo> {
        self.info.clone()
    }

    async fn invoke(&self, prompt: &str, config: &ClientConfig) -> Result<String> {
        match self.next_reply(prompt, config, false)? {
            Reply::Text(text) => Ok(text),
            Reply::Error(message) => Err(Error::client_msg(&config.name, message)),
            Reply::Chunks(chunks) => chunks
                .into_iter()
                .map(|c| c.map_err(|m| Error::client_msg(&config.name, m)))
                .collect(),
        }
    }

    async fn invoke_stream(&self, prompt: &str, config: &ClientConfig) -> Result<Box<ChunkStream>> {
        let items: Vec<Result<String>> = match self.next_reply(prompt, config, true)? {
            Reply::Text(text) => vec![Ok(text)],
            Reply::Error(message) => return Err(Error::client_msg(&config.name, message)),
            Reply::Chunks(chunks) => chunks
                .into_iter()
                .map(|c| c.map_err(|m| Error::client_msg(&config.name, m)))
                .collect(),
        };
        Ok(Box::new(tokio_stream::iter(items)))
    }
}

/// An event seen by [`RecordingObserver`]
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    CallStart {
        function: String,
        version: String,
        client: String,
        prompt: String,
    },
    CallEnd(serde_json::Value),
    Error(String),
    Partial(serde_json::Value),
    Final(serde_json::Value),
}

/// Observer that records every event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        lock(&self.events).clone()
    }

    pub fn partials(&self) -> Vec<serde_json::Value> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                ObservedEvent::Partial(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn finals(&self) -> Vec<serde_json::Value> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                ObservedEvent::Final(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                ObservedEvent::Error(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn name(&self) -> &str {
        "RecordingObserver"
    }

    fn on_call_start(&self, ctx: &CallContext, prompt: &str) {
        lock(&self.events).push(ObservedEvent::CallStart {
            function: ctx.function.clone(),
            version: ctx.version.clone(),
            client: ctx.client.clone(),
            prompt: prompt.to_string(),
        });
    }

    fn on_call_end(&self, _ctx: &CallContext, value: &Value) {
        lock(&self.events).push(ObservedEvent::CallEnd(value.to_json()));
    }

    fn on_error(&self, _ctx: &CallContext, error: &Error) {
        lock(&self.events).push(ObservedEvent::Error(error.to_string()));
    }

    fn on_partial(&self, _ctx: &CallContext, partial: &serde_json::Value) {
        lock(&self.events).push(ObservedEvent::Partial(partial.clone()));
    }

    fn on_final(&self, _ctx: &CallContext, value: &serde_json::Value) {
        lock(&self.events).push(ObservedEvent::Final(value.clone()));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_mock_replies_in_order() {
        let mock = MockClient::new("mock")
            .with_response("first")
            .with_error("boom")
            .with_fallback("again");
        let config = ClientConfig::new("A", "mock", "m");

        assert_eq!(mock.invoke("p1", &config).await.unwrap(), "first");
        assert!(mock.invoke("p2", &config).await.unwrap_err().is_client());
        assert_eq!(mock.invoke("p3", &config).await.unwrap(), "again");
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.recorded_prompts(), ["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_mock_chunked_stream() {
        let mock = MockClient::new("mock").with_chunked_stream("abcdefg", 3);
        let config = ClientConfig::new("A", "mock", "m");

        let stream = mock.invoke_stream("p", &config).await.unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, ["abc", "def", "g"]);
        assert!(mock.recorded_calls()[0].streamed);
    }

    #[tokio::test]
    async fn test_mock_without_replies_fails() {
        let mock = MockClient::new("mock");
        let config = ClientConfig::new("A", "mock", "m");
        assert!(mock.invoke("p", &config).await.is_err());
    }
}
