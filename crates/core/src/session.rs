//! The conversation session state machine.

#[cfg(test)]
mod tests;

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use parley_model::{ModelFinishReason, ModelMessage, ModelRequest};

use crate::backend::{Completion, CompletionBackend, DeltaObserver, RequestFailure};
use crate::capabilities::{CapabilityTable, ModelCapabilities};
use crate::config::{GenerationConfig, SessionPolicy};
use crate::conversation::{Role, Transcript, Turn};
use crate::error::{PersistenceError, PreconditionViolation, SessionError};
use crate::store::TranscriptStore;

/// Identifies one request issued by [`ConversationSession::begin_submit`].
///
/// The result of a request can only be recorded with the ticket it was
/// issued under, so results of abandoned requests are never recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestTicket(u64);

/// Whether a session is waiting for a response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionStage {
    /// Ready to take any operation.
    #[default]
    Idle,
    /// A request is in flight. Only observation and [`reset`] are allowed.
    ///
    /// [`reset`]: ConversationSession::reset
    Requesting,
}

/// An assistant turn rewritten by the user, waiting to be sent along with
/// the next request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingEdit {
    index: usize,
    content: String,
}

impl PendingEdit {
    /// Returns the index of the edited turn.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the replacement text.
    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Requesting(RequestTicket),
}

/// A single chat thread: the transcript, the configuration used for the
/// next request, and the request lifecycle.
///
/// Every operation either succeeds, or fails with a [`SessionError`] and
/// leaves the session exactly as it was. A failed request is not an error:
/// it is recorded as a placeholder assistant turn, see
/// [`FailureNotice`](crate::FailureNotice).
///
/// Submitting is split in two phases so that the request can run anywhere
/// while the session stays observable: [`begin_submit`] records the user
/// turn and returns the request to send, [`finish_submit`] records the
/// outcome. [`submit_user_message`] does both with a backend.
///
/// [`begin_submit`]: Self::begin_submit
/// [`finish_submit`]: Self::finish_submit
/// [`submit_user_message`]: Self::submit_user_message
pub struct ConversationSession {
    transcript: Transcript,
    config: GenerationConfig,
    policy: SessionPolicy,
    capabilities: Arc<dyn ModelCapabilities>,
    pending_edit: Option<PendingEdit>,
    state: State,
    next_ticket: u64,
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self {
            transcript: Transcript::default(),
            config: GenerationConfig::default(),
            policy: SessionPolicy::default(),
            capabilities: Arc::new(CapabilityTable::permissive()),
            pending_edit: None,
            state: State::Idle,
            next_ticket: 1,
        }
    }
}

impl ConversationSession {
    /// Creates an empty session using `config`.
    ///
    /// Every model is assumed to accept system instructions until
    /// [`with_capabilities`](Self::with_capabilities) says otherwise.
    pub fn new(config: GenerationConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Default::default()
        })
    }

    /// Sets the policy.
    #[inline]
    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the capability table consulted when building requests.
    #[inline]
    pub fn with_capabilities<C: ModelCapabilities + 'static>(
        self,
        capabilities: C,
    ) -> Self {
        self.with_shared_capabilities(Arc::new(capabilities))
    }

    #[inline]
    pub(crate) fn with_shared_capabilities(
        mut self,
        capabilities: Arc<dyn ModelCapabilities>,
    ) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Returns the transcript.
    #[inline]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Returns the configuration used for the next request.
    #[inline]
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Returns the policy.
    #[inline]
    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Returns the edit that will be re-applied on the next submission.
    #[inline]
    pub fn pending_edit(&self) -> Option<&PendingEdit> {
        self.pending_edit.as_ref()
    }

    /// Returns the current stage.
    #[inline]
    pub fn stage(&self) -> SessionStage {
        match self.state {
            State::Idle => SessionStage::Idle,
            State::Requesting(_) => SessionStage::Requesting,
        }
    }

    /// Returns `true` if no request is in flight.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Appends a user turn and starts a request.
    ///
    /// A pending edit is applied to the transcript first and then cleared.
    /// The returned request carries the whole transcript, prefixed with the
    /// system prompt when it is non-empty and the model accepts one.
    pub fn begin_submit<S: Into<String>>(
        &mut self,
        text: S,
    ) -> Result<(RequestTicket, ModelRequest), SessionError> {
        self.ensure_idle()?;
        let text = text.into();
        if text.trim().is_empty() {
            return Err(PreconditionViolation::EmptyMessage.into());
        }

        self.transcript.push(Turn::user(text));
        if let Some(PendingEdit { index, content }) = self.pending_edit.take() {
            debug!("re-applying the edit of turn {index}");
            self.transcript.set_content(index, content);
        }

        let ticket = RequestTicket(self.next_ticket);
        self.next_ticket += 1;
        self.state = State::Requesting(ticket);

        let request = self.build_request();
        debug!(
            ?ticket,
            model = %request.model,
            messages = request.messages.len(),
            "request started"
        );
        Ok((ticket, request))
    }

    /// Records the outcome of the request identified by `ticket`.
    ///
    /// On success the response becomes the next assistant turn. On failure
    /// a placeholder turn is recorded instead, rendered by the policy. The
    /// recorded turn is returned either way.
    ///
    /// Returns [`SessionError::Discarded`] without touching the session if
    /// `ticket` is not the request in flight.
    pub fn finish_submit(
        &mut self,
        ticket: RequestTicket,
        outcome: Result<Completion, RequestFailure>,
    ) -> Result<Turn, SessionError> {
        if self.state != State::Requesting(ticket) {
            debug!(?ticket, "dropping the result of an abandoned request");
            return Err(SessionError::Discarded);
        }

        let turn = match outcome {
            Ok(completion) => {
                if completion.finish_reason == Some(ModelFinishReason::MaxTokens)
                {
                    info!(?ticket, "response was cut at the token limit");
                }
                Turn::assistant(completion.content)
            }
            Err(failure) => {
                warn!(?ticket, kind = ?failure.kind, "request failed: {failure}");
                Turn::assistant(self.policy.failure_notice.render(&failure.message))
            }
        };
        self.transcript.push(turn.clone());
        self.state = State::Idle;
        debug!(?ticket, "request finished");
        Ok(turn)
    }

    /// Submits `text` through `backend` and waits for the assistant turn.
    #[inline]
    pub async fn submit_user_message<S: Into<String>>(
        &mut self,
        backend: &CompletionBackend,
        text: S,
    ) -> Result<Turn, SessionError> {
        self.submit_user_message_with(backend, text, None).await
    }

    /// Like [`submit_user_message`](Self::submit_user_message), but passes
    /// every streamed delta to `on_delta`.
    pub async fn submit_user_message_with<S: Into<String>>(
        &mut self,
        backend: &CompletionBackend,
        text: S,
        on_delta: Option<DeltaObserver>,
    ) -> Result<Turn, SessionError> {
        let (ticket, request) = self.begin_submit(text)?;
        let outcome = backend.complete(request, on_delta).await;
        self.finish_submit(ticket, outcome)
    }

    /// Replaces the content of the assistant turn at `index`.
    ///
    /// The replacement is visible immediately and is also remembered as the
    /// pending edit, which the next submission applies again before
    /// building its request. A later edit replaces the pending one.
    pub fn request_edit<S: Into<String>>(
        &mut self,
        index: usize,
        content: S,
    ) -> Result<(), SessionError> {
        self.ensure_idle()?;
        let turn = self
            .transcript
            .get(index)
            .ok_or(PreconditionViolation::NoSuchTurn(index))?;
        if turn.role() != Role::Assistant {
            return Err(PreconditionViolation::NotAssistantTurn(index).into());
        }

        let content = content.into();
        self.transcript.set_content(index, content.clone());
        self.pending_edit = Some(PendingEdit { index, content });
        debug!("turn {index} edited");
        Ok(())
    }

    /// Replaces the configuration used for subsequent requests.
    ///
    /// With `reset_history` the transcript and the pending edit are
    /// cleared too.
    pub fn apply_configuration(
        &mut self,
        config: GenerationConfig,
        reset_history: bool,
    ) -> Result<(), SessionError> {
        self.ensure_idle()?;
        config.validate()?;

        debug!(model = %config.model, reset_history, "configuration applied");
        self.config = config;
        if reset_history {
            self.clear_history();
        }
        Ok(())
    }

    /// Clears the transcript and the pending edit.
    ///
    /// Always allowed. A request in flight is abandoned: its result will
    /// be [discarded](SessionError::Discarded) when it arrives.
    pub fn reset(&mut self) {
        if let State::Requesting(ticket) = self.state {
            info!(?ticket, "abandoning the request in flight");
        }
        self.state = State::Idle;
        self.clear_history();
        debug!("session reset");
    }

    /// Returns a copy of the transcript fit for saving.
    ///
    /// Fails while requesting, since the transcript then ends with an
    /// unanswered user turn.
    pub fn checkpoint(&self) -> Result<Transcript, SessionError> {
        self.ensure_idle()?;
        Ok(self.transcript.clone())
    }

    /// Replaces the transcript with `transcript` and clears the pending
    /// edit. The configuration is kept.
    ///
    /// A transcript ending with an unanswered user turn, as copied from a
    /// session in the middle of a request, is rejected as malformed.
    pub fn restore(&mut self, transcript: Transcript) -> Result<(), SessionError> {
        self.ensure_idle()?;
        transcript
            .check_complete()
            .map_err(PersistenceError::from)?;
        debug!(turns = transcript.len(), "transcript restored");
        self.transcript = transcript;
        self.pending_edit = None;
        Ok(())
    }

    /// Saves the transcript to `store`, returning the handle to load it.
    pub fn save<S: TranscriptStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<S::Handle, SessionError> {
        let transcript = self.checkpoint()?;
        Ok(store.save(&transcript)?)
    }

    /// Loads the transcript saved under `handle` in `store`.
    ///
    /// Nothing changes if loading fails.
    pub fn load<S: TranscriptStore + ?Sized>(
        &mut self,
        store: &S,
        handle: &S::Handle,
    ) -> Result<(), SessionError> {
        self.ensure_idle()?;
        let transcript = store.load(handle)?;
        self.restore(transcript)
    }

    #[inline]
    fn ensure_idle(&self) -> Result<(), PreconditionViolation> {
        if self.is_idle() {
            Ok(())
        } else {
            Err(PreconditionViolation::Busy)
        }
    }

    #[inline]
    fn clear_history(&mut self) {
        self.transcript.clear();
        self.pending_edit = None;
    }

    fn build_request(&self) -> ModelRequest {
        let mut messages = Vec::with_capacity(self.transcript.len() + 1);
        let system_prompt = &self.config.system_prompt;
        if !system_prompt.trim().is_empty() {
            if self.capabilities.supports_system_prompt(&self.config.model) {
                messages.push(ModelMessage::System(system_prompt.clone()));
            } else {
                debug!(
                    model = %self.config.model,
                    "model takes no system instructions, omitting the prompt"
                );
            }
        }
        messages.extend(self.transcript.iter().map(Turn::to_model_message));

        ModelRequest {
            model: self.config.model.clone(),
            messages,
            options: self.config.generation_options(),
        }
    }
}

impl Debug for ConversationSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationSession")
            .field("stage", &self.stage())
            .field("turns", &self.transcript.len())
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("pending_edit", &self.pending_edit)
            .finish_non_exhaustive()
    }
}
