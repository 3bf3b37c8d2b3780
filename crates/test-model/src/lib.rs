//! A local fake model for testing purpose.

mod preset;

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use parley_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: Vec<PresetEvent>,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };

        if this.event_idx >= this.events.len() {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        }

        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            let event = match &this.events[this.event_idx] {
                PresetEvent::MessageDelta(msg) => {
                    ModelResponseEvent::MessageDelta(msg.clone())
                }
                PresetEvent::Finish(reason) => {
                    ModelResponseEvent::Completed(*reason)
                }
            };
            this.event_idx += 1;
            return Poll::Ready(Ok(Some(event)));
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

#[derive(Clone)]
enum ConversationStep {
    UserInput,
    AssistantResponse(PresetResponse),
}

#[derive(Default)]
struct Recorder {
    requests: Mutex<Vec<ModelRequest>>,
    // Attempts made so far, keyed by step index.
    attempts: Mutex<HashMap<usize, u64>>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the conversation script, which
/// is how the model should respond to a request. The step is selected by the
/// number of user and assistant messages in the request (system messages
/// don't count). If there are no enough steps in the script, the fallback
/// response is used, or an error is returned if there is none.
///
/// Every request is recorded, so tests can inspect what the model has been
/// asked. Clones share the recorded requests and the failure counters.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    conversation_script: Vec<ConversationStep>,
    fallback: Option<PresetResponse>,
    delay: Option<Duration>,
    recorder: Arc<Recorder>,
}

impl TestModelProvider {
    /// Creates a provider that answers every request with `preset`.
    #[inline]
    pub fn always(preset: PresetResponse) -> Self {
        let mut provider = Self::default();
        provider.set_fallback_response(preset);
        provider
    }

    #[inline]
    pub fn add_assistant_response_step(&mut self, preset: PresetResponse) {
        self.conversation_script
            .push(ConversationStep::AssistantResponse(preset));
    }

    #[inline]
    pub fn add_user_input_step(&mut self) {
        self.conversation_script.push(ConversationStep::UserInput);
    }

    /// Adds a user input step followed by an assistant response step.
    #[inline]
    pub fn add_exchange(&mut self, preset: PresetResponse) {
        self.add_user_input_step();
        self.add_assistant_response_step(preset);
    }

    /// Sets the response used once the script runs out of steps.
    #[inline]
    pub fn set_fallback_response(&mut self, preset: PresetResponse) {
        self.fallback = Some(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far, oldest first.
    pub fn captured_requests(&self) -> Vec<ModelRequest> {
        self.recorder
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the most recent request, if any.
    pub fn last_request(&self) -> Option<ModelRequest> {
        self.recorder
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    fn respond(&self, req: &ModelRequest) -> Result<TestModelResponse, Error> {
        self.recorder
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(req.clone());

        let step_idx = req
            .messages
            .iter()
            .filter(|msg| !matches!(msg, ModelMessage::System(_)))
            .count();
        let preset = match self.conversation_script.get(step_idx) {
            Some(ConversationStep::AssistantResponse(preset)) => preset,
            Some(ConversationStep::UserInput) => {
                return Err(Error {
                    message: "not an assistant response step",
                    kind: ErrorKind::Moderated,
                });
            }
            None => match &self.fallback {
                Some(preset) => preset,
                None => {
                    return Err(Error {
                        message: "no enough steps",
                        kind: ErrorKind::RateLimitExceeded,
                    });
                }
            },
        };

        let attempt = {
            let mut attempts = self
                .recorder
                .attempts
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let attempt = attempts.entry(step_idx).or_default();
            *attempt += 1;
            *attempt
        };
        if preset.fails_on(attempt) {
            return Err(Error {
                message: "scripted failure",
                kind: ErrorKind::Other,
            });
        }

        let mut events = preset.events.clone();
        if !events.iter().any(|e| matches!(e, PresetEvent::Finish(_))) {
            events.push(PresetEvent::Finish(ModelFinishReason::Stop));
        }
        Ok(TestModelResponse {
            events,
            event_idx: 0,
            delay: self.delay.unwrap_or(Duration::from_millis(1)),
            sleep: None,
        })
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        ready(self.respond(req))
    }
}
