use std::fmt::{self, Display, Formatter};
use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use parley_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tracing::Instrument;

/// Observer for message deltas while a response is streamed.
pub type DeltaObserver = Arc<dyn Fn(&str) + Send + Sync>;

type CompleteResult = Result<Completion, RequestFailure>;
type BoxedCompleteFuture = Pin<Box<dyn Future<Output = CompleteResult> + Send>>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, Option<DeltaObserver>) -> BoxedCompleteFuture
        + Send + Sync
>;

/// The remote call producing an assistant message from a transcript prefix
/// and a configuration.
///
/// This is a wrapper around a model provider that drains its event stream
/// and provides a type-erased interface for the other modules. Cloning is
/// cheap, clones share the provider.
#[derive(Clone)]
pub struct CompletionBackend {
    handler_fn: HandlerFn,
}

impl CompletionBackend {
    /// Wraps `provider`.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `CompletionBackend` doesn't have
        // a generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, on_delta| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err, on_delta).await
                }
                .instrument(trace_span!("completion")),
            )
        });
        Self { handler_fn }
    }

    /// Sends `request` and waits for the complete response.
    ///
    /// Each message delta is passed to `on_delta` as soon as it arrives, but
    /// the result only carries the complete content.
    #[inline]
    pub async fn complete(
        &self,
        request: ModelRequest,
        on_delta: Option<DeltaObserver>,
    ) -> Result<Completion, RequestFailure> {
        (self.handler_fn)(request, on_delta).await
    }
}

/// A completely received response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    /// The full assistant message.
    pub content: String,
    /// The reason the model finished generating, if reported.
    pub finish_reason: Option<ModelFinishReason>,
}

/// The completion call raised or returned an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestFailure {
    /// The kind of failure reported by the provider.
    pub kind: ErrorKind,
    /// Human readable detail.
    pub message: String,
}

impl RequestFailure {
    fn from_provider_error<E: ModelProviderError>(err: &E) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl Display for RequestFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RequestFailure {}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_delta: Option<DeltaObserver>,
) -> CompleteResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(RequestFailure::from_provider_error(&err));
        }
    };

    let mut content = String::new();
    let mut finish_reason = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(RequestFailure::from_provider_error(&err));
            }
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(delta) => {
                if let Some(on_delta) = &on_delta {
                    on_delta(&delta);
                }
                content.push_str(&delta);
            }
            ModelResponseEvent::Completed(reason) => {
                finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");

    Ok(Completion {
        content,
        finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use parley_model::{GenerationOptions, ModelMessage};
    use parley_test_model::{PresetEvent, PresetResponse, TestModelProvider};

    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            model: "test".to_owned(),
            messages: vec![ModelMessage::User("Hi".to_owned())],
            options: GenerationOptions {
                temperature: 1.0,
                top_p: 0.95,
                top_k: 64,
                max_output_tokens: 2000,
            },
        }
    }

    #[tokio::test]
    async fn test_complete() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_exchange(PresetResponse::with_events([
            PresetEvent::MessageDelta("How ".to_owned()),
            PresetEvent::MessageDelta("are ".to_owned()),
            PresetEvent::MessageDelta("you?".to_owned()),
        ]));

        let backend = CompletionBackend::new(model_provider);

        for _ in 0..3 {
            let deltas = Arc::new(Mutex::new(Vec::new()));
            let on_delta: DeltaObserver = {
                let deltas = Arc::clone(&deltas);
                Arc::new(move |delta: &str| {
                    deltas.lock().unwrap().push(delta.to_owned());
                })
            };
            let completion =
                backend.complete(request(), Some(on_delta)).await.unwrap();
            assert_eq!(completion.content, "How are you?");
            assert_eq!(completion.finish_reason, Some(ModelFinishReason::Stop));
            assert_eq!(*deltas.lock().unwrap(), ["How ", "are ", "you?"]);
        }
    }

    #[tokio::test]
    async fn test_error_handling() {
        let backend = CompletionBackend::new(TestModelProvider::default());
        let failure = backend.complete(request(), None).await.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::RateLimitExceeded);
        assert_eq!(failure.to_string(), "no enough steps");
    }
}
