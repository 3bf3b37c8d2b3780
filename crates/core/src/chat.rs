mod builder;
mod mailbox;
mod state;
#[cfg(test)]
mod tests;

use std::collections::HashMap;

use tokio::task::JoinHandle;

use crate::backend::{CompletionBackend, DeltaObserver};
use crate::config::GenerationConfig;
use crate::conversation::{Transcript, Turn};
use crate::error::SessionError;
use crate::session::{ConversationSession, SessionStage};
use crate::store::TranscriptStore;
pub use builder::ChatBuilder;
use mailbox::Mailbox;
use state::{
    ApplyConfiguration, Inspect, RequestEdit, Reset, Restore, SubmitUserMessage,
};

/// State owned by the chat task.
///
/// Messages dispatched to the chat are handled immediately, no matter which
/// stage the session is in. A submission only starts the request; the
/// response is recorded by a follow-up message, so observation and
/// [`Chat::reset`] are served while a request is in flight.
pub struct ChatState {
    session: ConversationSession,
    backend: CompletionBackend,
    on_delta: Option<DeltaObserver>,
    running_tasks: HashMap<u64, JoinHandle<()>>,
    next_task_id: u64,
}

impl Drop for ChatState {
    fn drop(&mut self) {
        for (_, task) in self.running_tasks.drain() {
            task.abort();
        }
    }
}

/// A conversation session hosted on its own task.
///
/// All operations are serialized through the task's mailbox, so a `Chat`
/// can be cloned and driven from anywhere. Every method fails with
/// [`SessionError::Closed`] once the chat has been closed.
#[derive(Clone)]
pub struct Chat {
    mailbox: Mailbox,
}

impl Chat {
    /// Submits a user message and waits for the assistant turn.
    ///
    /// Returns [`SessionError::Discarded`] if the chat was reset before the
    /// response arrived.
    pub async fn submit_user_message<S: Into<String>>(
        &self,
        text: S,
    ) -> Result<Turn, SessionError> {
        let text = text.into();
        self.mailbox
            .ask(|reply| SubmitUserMessage { text, reply })
            .await?
    }

    /// See [`ConversationSession::request_edit`].
    pub async fn request_edit<S: Into<String>>(
        &self,
        index: usize,
        content: S,
    ) -> Result<(), SessionError> {
        let content = content.into();
        self.mailbox
            .ask(|reply| RequestEdit {
                index,
                content,
                reply,
            })
            .await?
    }

    /// See [`ConversationSession::apply_configuration`].
    pub async fn apply_configuration(
        &self,
        config: GenerationConfig,
        reset_history: bool,
    ) -> Result<(), SessionError> {
        self.mailbox
            .ask(|reply| ApplyConfiguration {
                config,
                reset_history,
                reply,
            })
            .await?
    }

    /// See [`ConversationSession::reset`].
    pub async fn reset(&self) -> Result<(), SessionError> {
        self.mailbox.ask(Reset).await
    }

    /// Returns a snapshot of the transcript.
    ///
    /// While a request is in flight the snapshot ends with the user turn
    /// being answered.
    pub async fn transcript(&self) -> Result<Transcript, SessionError> {
        self.mailbox
            .ask(|reply| {
                Inspect::new(
                    |session: &ConversationSession| session.transcript().clone(),
                    reply,
                )
            })
            .await
    }

    /// Returns the configuration used for the next request.
    pub async fn config(&self) -> Result<GenerationConfig, SessionError> {
        self.mailbox
            .ask(|reply| {
                Inspect::new(
                    |session: &ConversationSession| session.config().clone(),
                    reply,
                )
            })
            .await
    }

    /// Returns the current stage.
    pub async fn stage(&self) -> Result<SessionStage, SessionError> {
        self.mailbox
            .ask(|reply| Inspect::new(ConversationSession::stage, reply))
            .await
    }

    /// Saves the transcript to `store`.
    pub async fn save<S: TranscriptStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<S::Handle, SessionError> {
        let transcript = self
            .mailbox
            .ask(|reply| Inspect::new(ConversationSession::checkpoint, reply))
            .await??;
        Ok(store.save(&transcript)?)
    }

    /// Loads the transcript saved under `handle` in `store`.
    ///
    /// Nothing changes if loading fails.
    pub async fn load<S: TranscriptStore + ?Sized>(
        &self,
        store: &S,
        handle: &S::Handle,
    ) -> Result<(), SessionError> {
        let transcript = store.load(handle)?;
        self.mailbox
            .ask(|reply| Restore { transcript, reply })
            .await?
    }

    /// Stops the chat task. A request in flight is cancelled.
    #[inline]
    pub fn close(&self) {
        self.mailbox.close();
    }
}

impl Chat {
    fn spawn_from_builder(builder: ChatBuilder) -> Result<Self, SessionError> {
        let ChatBuilder {
            backend,
            config,
            policy,
            capabilities,
            on_delta,
        } = builder;

        let mut session = ConversationSession::new(config)?.with_policy(policy);
        if let Some(capabilities) = capabilities {
            session = session.with_shared_capabilities(capabilities);
        }
        let state = ChatState {
            session,
            backend,
            on_delta,
            running_tasks: HashMap::new(),
            next_task_id: 1,
        };
        Ok(Self {
            mailbox: Mailbox::spawn(state),
        })
    }
}
