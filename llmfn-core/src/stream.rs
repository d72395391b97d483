//! Incremental streaming of function output.
//!
//! A [`FunctionStream`] accumulates raw chunks from a producer, re-parses the
//! whole text after every chunk and yields merged partial values that never
//! lose data. When the producer finishes, the text is parsed once more in
//! final mode and the stream settles into [`StreamState::Completed`] or
//! [`StreamState::Failed`].

use crate::client::ChunkStream;
use crate::deserializer::Deserializer;
use crate::error::Error;
use crate::observer::ObserverSet;
use crate::types::CallContext;
use crate::value::{PartialValue, Value};
use crate::Result;
use futures::{Stream, StreamExt};
use pin_project::pin_project;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Lifecycle of a stream. Leaves `Active` exactly once.
#[derive(Debug)]
pub enum StreamState {
    Active,
    Completed(Value),
    Failed(Error),
}

impl StreamState {
    pub fn is_active(&self) -> bool {
        matches!(self, StreamState::Active)
    }
}

/// Stream of partial values for one function call.
#[pin_project]
pub struct FunctionStream<S = Box<ChunkStream>> {
    #[pin]
    producer: Option<S>,
    deserializer: Deserializer,
    raw: String,
    last: Option<PartialValue>,
    state: StreamState,
    observers: ObserverSet,
    ctx: CallContext,
}

impl<S> FunctionStream<S>
where
    S: Stream<Item = Result<String>>,
{
    pub fn new(producer: S, deserializer: Deserializer, ctx: CallContext) -> Self {
        Self {
            producer: Some(producer),
            deserializer,
            raw: String::new(),
            last: None,
            state: StreamState::Active,
            observers: ObserverSet::default(),
            ctx,
        }
    }

    /// Forward emissions and the final value to observers
    pub fn with_observers(mut self, observers: ObserverSet) -> Self {
        self.observers = observers;
        self
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// All raw text received so far
    pub fn raw_text(&self) -> &str {
        &self.raw
    }

    /// The most recently emitted partial value
    pub fn last_partial(&self) -> Option<&PartialValue> {
        self.last.as_ref()
    }

    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Stop the stream and release the producer. No terminal state is forced.
    pub fn cancel(self) {
        tracing::debug!(
            "stream {} for {} cancelled after {} bytes",
            self.ctx.request_id,
            self.ctx.function,
            self.raw.len()
        );
    }

    /// Drain the remaining chunks and return the final value.
    pub async fn await_final(mut self) -> Result<Value>
    where
        S: Unpin,
    {
        while self.next().await.is_some() {}
        match self.state {
            StreamState::Completed(value) => Ok(value),
            StreamState::Failed(err) => Err(err),
            StreamState::Active => Err(Error::Stream("stream ended while active".to_string())),
        }
    }
}

impl<S> Stream for FunctionStream<S>
where
    S: Stream<Item = Result<String>>,
{
    type Item = PartialValue;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<PartialValue>> {
        let mut this = self.project();
        loop {
            let Some(producer) = this.producer.as_mut().as_pin_mut() else {
                return Poll::Ready(None);
            };

            match ready!(producer.poll_next(cx)) {
                Some(Ok(chunk)) => {
                    this.raw.push_str(&chunk);
                    let Some(parsed) = this.deserializer.parse_partial_from(this.raw, this.last.as_ref())
                    else {
                        continue;
                    };
                    let merged = match this.last.as_ref() {
                        Some(prev) => PartialValue::merge(prev, parsed),
                        None => parsed,
                    };
                    if this.last.as_ref() == Some(&merged) {
                        continue;
                    }
                    tracing::trace!(
                        "stream {} emits partial ({} populated)",
                        this.ctx.request_id,
                        merged.populated()
                    );
                    this.observers.partial(this.ctx, &merged.to_json());
                    *this.last = Some(merged.clone());
                    return Poll::Ready(Some(merged));
                }
                Some(Err(err)) => {
                    this.producer.set(None);
                    tracing::warn!("stream {} failed: {}", this.ctx.request_id, err);
                    this.observers.error(this.ctx, &err);
                    *this.state = StreamState::Failed(err);
                    return Poll::Ready(None);
                }
                None => {
                    this.producer.set(None);
                    match this.deserializer.parse_final(this.raw) {
                        Ok(value) => {
                            tracing::debug!("stream {} completed", this.ctx.request_id);
                            this.observers.final_value(this.ctx, &value.to_json());
                            *this.state = StreamState::Completed(value);
                        }
                        Err(err) => {
                            let err = Error::from(err);
                            tracing::warn!("stream {} failed: {}", this.ctx.request_id, err);
                            this.observers.error(this.ctx, &err);
                            *this.state = StreamState::Failed(err);
                        }
                    }
                    return Poll::Ready(None);
                }
            }
        }
    }
}

/// [`FunctionStream`] with partials and the final value converted into
/// caller types: `P` for partials (typically all `Option` fields) and `T`
/// for the final value.
#[pin_project]
pub struct TypedStream<P, T, S = Box<ChunkStream>> {
    #[pin]
    inner: FunctionStream<S>,
    _marker: PhantomData<fn() -> (P, T)>,
}

impl<P, T, S> TypedStream<P, T, S>
where
    P: DeserializeOwned,
    T: DeserializeOwned,
    S: Stream<Item = Result<String>>,
{
    pub fn new(inner: FunctionStream<S>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn state(&self) -> &StreamState {
        self.inner.state()
    }

    pub fn raw_text(&self) -> &str {
        self.inner.raw_text()
    }

    pub fn into_inner(self) -> FunctionStream<S> {
        self.inner
    }

    pub fn cancel(self) {
        self.inner.cancel()
    }

    /// Drain the remaining chunks and convert the final value into `T`.
    pub async fn await_final(self) -> Result<T>
    where
        S: Unpin,
    {
        self.inner.await_final().await?.deserialize_into()
    }
}

impl<P, T, S> Stream for TypedStream<P, T, S>
where
    P: DeserializeOwned,
    S: Stream<Item = Result<String>>,
{
    type Item = Result<P>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<P>>> {
        self.project()
            .inner
            .poll_next(cx)
            .map(|partial| partial.map(|p| p.deserialize_into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::Observer;
    use crate::schema::{ClassDef, FieldType, SchemaTable};
    use crate::testing::RecordingObserver;
    use serde::Deserialize;
    use std::sync::Arc;

    fn deserializer() -> Deserializer {
        let table = SchemaTable::builder()
            .class(
                ClassDef::new("Pair")
                    .field("a", FieldType::int())
                    .field("b", FieldType::string()),
            )
            .build()
            .unwrap();
        Deserializer::new(Arc::new(table), FieldType::reference("Pair")).unwrap()
    }

    fn chunks(parts: &[&str]) -> Box<ChunkStream> {
        let items: Vec<Result<String>> = parts.iter().map(|p| Ok(p.to_string())).collect();
        Box::new(tokio_stream::iter(items))
    }

    fn ctx() -> CallContext {
        CallContext::new("MakePair", "v1", "A")
    }

    fn paths(value: &PartialValue, at: &str, out: &mut Vec<String>) {
        out.push(at.to_string());
        match value {
            PartialValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    paths(item, &format!("{}[{}]", at, i), out);
                }
            }
            PartialValue::Class { fields, .. } => {
                for (name, field) in fields {
                    if let Some(field) = field {
                        paths(field, &format!("{}.{}", at, name), out);
                    }
                }
            }
            _ => {}
        }
    }

    /// Every populated path of emission k is still populated in emission k+1.
    fn assert_no_path_dropped(emitted: &[PartialValue]) {
        for pair in emitted.windows(2) {
            let (mut before, mut after) = (Vec::new(), Vec::new());
            paths(&pair[0], "", &mut before);
            paths(&pair[1], "", &mut after);
            for path in before {
                assert!(after.contains(&path), "{path:?} dropped between {:?} and {:?}", pair[0], pair[1]);
            }
        }
    }

    #[tokio::test]
    async fn test_partials_then_final() {
        let mut stream = FunctionStream::new(
            chunks(&["{\"a\": 1", ", \"b\": \"he", "llo\"", "}"]),
            deserializer(),
            ctx(),
        );

        let mut emitted = Vec::new();
        while let Some(partial) = stream.next().await {
            emitted.push(partial);
        }

        // "{\"a\": 1" has no closed scalar yet: the first emission is the empty object
        assert_eq!(emitted.len(), 3);
        assert_eq!(emitted[0].get("a"), None);
        assert_eq!(emitted[1].get("a"), Some(&PartialValue::Int(1)));
        assert_eq!(emitted[1].get("b"), None);
        assert_eq!(
            emitted[2].get("b"),
            Some(&PartialValue::String("hello".into()))
        );
        assert_no_path_dropped(&emitted);

        assert_eq!(stream.raw_text(), "{\"a\": 1, \"b\": \"hello\"}");
        assert!(matches!(stream.state(), StreamState::Completed(_)));
        let value = stream.await_final().await.unwrap();
        assert_eq!(value.get("b"), Some(&Value::String("hello".into())));
    }

    #[tokio::test]
    async fn test_union_stream_keeps_fields_for_every_split() {
        let table = SchemaTable::builder()
            .class(
                ClassDef::new("Left")
                    .field("x", FieldType::int())
                    .optional_field("y", FieldType::optional(FieldType::int())),
            )
            .class(
                ClassDef::new("Right")
                    .field("x", FieldType::int())
                    .field("z", FieldType::int()),
            )
            .build()
            .unwrap();
        let target = FieldType::union(vec![FieldType::reference("Left"), FieldType::reference("Right")]);
        let deserializer = Deserializer::new(Arc::new(table), target).unwrap();
        let raw = r#"{"z": 2, "x": 1, "y": 3}"#;

        for size in 1..=raw.len() {
            let parts: Vec<&str> = raw
                .as_bytes()
                .chunks(size)
                .map(|c| std::str::from_utf8(c).unwrap())
                .collect();
            let mut stream = FunctionStream::new(chunks(&parts), deserializer.clone(), ctx());
            let mut emitted = Vec::new();
            while let Some(partial) = stream.next().await {
                emitted.push(partial);
            }
            assert_no_path_dropped(&emitted);
            if emitted.iter().any(|p| p.get("z").is_some()) {
                assert_eq!(emitted.last().unwrap().get("z"), Some(&PartialValue::Int(2)));
            }
            assert!(matches!(stream.state(), StreamState::Completed(_)));
        }
    }

    #[tokio::test]
    async fn test_producer_error_fails_stream() {
        let items: Vec<Result<String>> = vec![
            Ok("{\"a\": 1,".to_string()),
            Err(Error::client_msg("A", "connection reset")),
        ];
        let stream = FunctionStream::new(
            Box::new(tokio_stream::iter(items)) as Box<ChunkStream>,
            deserializer(),
            ctx(),
        );

        let err = stream.await_final().await.unwrap_err();
        assert!(err.is_client());
    }

    #[tokio::test]
    async fn test_final_parse_failure_fails_stream() {
        let stream = FunctionStream::new(chunks(&["{\"a\": 1}"]), deserializer(), ctx());
        let err = stream.await_final().await.unwrap_err();
        assert!(err.is_deserialize());
    }

    #[tokio::test]
    async fn test_cancel_keeps_state_active() {
        let mut stream = FunctionStream::new(
            chunks(&["{\"a\": 1,", " \"b\": \"x\"}"]),
            deserializer(),
            ctx(),
        );
        assert!(stream.next().await.is_some());
        assert!(stream.state().is_active());
        assert!(stream.last_partial().is_some());
        stream.cancel();
    }

    #[tokio::test]
    async fn test_observers_receive_partials_and_final() {
        let recorder = Arc::new(RecordingObserver::new());
        let stream = FunctionStream::new(
            chunks(&["{\"a\": 2, ", "\"b\": \"z\"}"]),
            deserializer(),
            ctx(),
        )
        .with_observers(ObserverSet::new(vec![recorder.clone() as Arc<dyn Observer>]));

        stream.await_final().await.unwrap();
        assert_eq!(recorder.partials().len(), 2);
        assert_eq!(
            recorder.finals(),
            vec![serde_json::json!({"a": 2, "b": "z"})]
        );
    }

    #[tokio::test]
    async fn test_typed_stream() {
        #[derive(Debug, Deserialize)]
        struct PairPartial {
            a: Option<i64>,
            b: Option<String>,
        }

        #[derive(Debug, Deserialize, PartialEq)]
        struct Pair {
            a: i64,
            b: String,
        }

        let mut typed: TypedStream<PairPartial, Pair> = TypedStream::new(FunctionStream::new(
            chunks(&["{\"a\": 7, ", "\"b\": \"q\"}"]),
            deserializer(),
            ctx(),
        ));

        let first = typed.next().await.unwrap().unwrap();
        assert_eq!(first.a, Some(7));
        assert_eq!(first.b, None);

        let pair = typed.await_final().await.unwrap();
        assert_eq!(
            pair,
            Pair {
                a: 7,
                b: "q".into()
            }
        );
    }
}
