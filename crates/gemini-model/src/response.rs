use std::pin::Pin;
use std::task::{Context, Poll, ready};

use parley_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::{Sse, SseError};
use crate::proto::{GenerateContentResponse, finish_reason_from_str};

struct PartialState {
    sse: Sse,
    // Whether any text has been delivered so far.
    produced_text: bool,
    // A chunk may carry both text and a finish reason. The text is emitted
    // first, and this field is emitted by the next poll.
    pending_finish_reason: Option<ModelFinishReason>,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct GeminiResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl GeminiResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            produced_text: false,
            pending_finish_reason: None,
        };
        Self {
            next_event_fut: Some(Box::pin(next_event(partial_state))),
        }
    }
}

impl ModelResponse for GeminiResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        *this.next_event_fut = Some(Box::pin(next_event(partial_state)));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    if let Some(reason) = partial_state.pending_finish_reason.take() {
        return Ok((Some(ModelResponseEvent::Completed(reason)), partial_state));
    }

    loop {
        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(SseError::InvalidPayload) => {
                return Err(Error::new(
                    "invalid server-sent event payload",
                    ErrorKind::Other,
                ));
            }
            Err(SseError::ChunksError(_)) => {
                return Err(Error::new(
                    "connection closed while streaming",
                    ErrorKind::Other,
                ));
            }
        };
        trace!("got sse event: {sse_event}");

        let chunk = serde_json::from_str::<GenerateContentResponse>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;

        if let Some(reason) =
            chunk.prompt_feedback.and_then(|f| f.block_reason)
        {
            return Err(Error::new(
                format!("prompt blocked: {reason}"),
                ErrorKind::Moderated,
            ));
        }

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            // Usage-only chunks have no candidates.
            continue;
        };
        let text = candidate.text();

        if let Some(reason) = &candidate.finish_reason {
            let finish_reason = finish_reason_from_str(reason);
            if finish_reason == ModelFinishReason::Safety
                && text.is_empty()
                && !partial_state.produced_text
            {
                return Err(Error::new(
                    format!("response blocked: {reason}"),
                    ErrorKind::Moderated,
                ));
            }
            partial_state.pending_finish_reason = Some(finish_reason);
        }

        if !text.is_empty() {
            partial_state.produced_text = true;
            return Ok((
                Some(ModelResponseEvent::MessageDelta(text)),
                partial_state,
            ));
        }

        if let Some(reason) = partial_state.pending_finish_reason.take() {
            return Ok((
                Some(ModelResponseEvent::Completed(reason)),
                partial_state,
            ));
        }
    }

    Ok((None, partial_state))
}
