use std::fmt::{self, Debug};

use tokio::sync::oneshot;
use tracing::Instrument;

use super::ChatState;
use super::mailbox::{ChatMessage, Mailbox};
use crate::backend::{Completion, RequestFailure};
use crate::config::GenerationConfig;
use crate::conversation::{Transcript, Turn};
use crate::error::SessionError;
use crate::session::{ConversationSession, RequestTicket};

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

impl ChatState {
    fn submit_user_message(
        &mut self,
        text: String,
        reply: Reply<Turn>,
        mailbox: &Mailbox,
    ) {
        let (ticket, request) = match self.session.begin_submit(text) {
            Ok(started) => started,
            Err(err) => {
                reply.send(Err(err)).ok();
                return;
            }
        };

        let backend = self.backend.clone();
        let on_delta = self.on_delta.clone();
        let mailbox_clone = mailbox.clone();
        self.spawn_task(
            |task_id| {
                async move {
                    let outcome = backend.complete(request, on_delta).await;
                    // The chat may be gone by now, the reply is then dropped.
                    mailbox_clone
                        .send(RequestFinished {
                            ticket,
                            outcome,
                            reply,
                        })
                        .ok();
                }
                .instrument(debug_span!("request", task_id, ?ticket))
            },
            mailbox,
        );
    }

    fn spawn_task<F, Fut>(&mut self, f: F, mailbox: &Mailbox)
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task_id = self.next_task_id;
        self.next_task_id += 1;

        let mailbox = mailbox.clone();
        let fut = f(task_id);
        let task = tokio::spawn(async move {
            fut.await;
            mailbox.send(TaskEnded(task_id)).ok();
        });
        self.running_tasks.insert(task_id, task);
    }
}

#[derive(Debug)]
pub struct SubmitUserMessage {
    pub text: String,
    pub reply: Reply<Turn>,
}

impl ChatMessage for SubmitUserMessage {
    fn handle(self: Box<Self>, state: &mut ChatState, mailbox: &Mailbox) {
        let Self { text, reply } = *self;
        state.submit_user_message(text, reply, mailbox);
    }
}

#[derive(Debug)]
struct RequestFinished {
    ticket: RequestTicket,
    outcome: Result<Completion, RequestFailure>,
    reply: Reply<Turn>,
}

impl ChatMessage for RequestFinished {
    fn handle(self: Box<Self>, state: &mut ChatState, _mailbox: &Mailbox) {
        let Self {
            ticket,
            outcome,
            reply,
        } = *self;
        reply.send(state.session.finish_submit(ticket, outcome)).ok();
    }
}

#[derive(Debug)]
struct TaskEnded(u64);

impl ChatMessage for TaskEnded {
    #[inline]
    fn handle(self: Box<Self>, state: &mut ChatState, _mailbox: &Mailbox) {
        if state.running_tasks.remove(&self.0).is_none() {
            warn!("task {} ended but was never tracked", self.0);
        }
    }
}

#[derive(Debug)]
pub struct RequestEdit {
    pub index: usize,
    pub content: String,
    pub reply: Reply<()>,
}

impl ChatMessage for RequestEdit {
    fn handle(self: Box<Self>, state: &mut ChatState, _mailbox: &Mailbox) {
        let Self {
            index,
            content,
            reply,
        } = *self;
        reply.send(state.session.request_edit(index, content)).ok();
    }
}

#[derive(Debug)]
pub struct ApplyConfiguration {
    pub config: GenerationConfig,
    pub reset_history: bool,
    pub reply: Reply<()>,
}

impl ChatMessage for ApplyConfiguration {
    fn handle(self: Box<Self>, state: &mut ChatState, _mailbox: &Mailbox) {
        let Self {
            config,
            reset_history,
            reply,
        } = *self;
        reply
            .send(state.session.apply_configuration(config, reset_history))
            .ok();
    }
}

#[derive(Debug)]
pub struct Reset(pub oneshot::Sender<()>);

impl ChatMessage for Reset {
    #[inline]
    fn handle(self: Box<Self>, state: &mut ChatState, _mailbox: &Mailbox) {
        // The request in flight keeps running, its result will be discarded.
        state.session.reset();
        self.0.send(()).ok();
    }
}

#[derive(Debug)]
pub struct Restore {
    pub transcript: Transcript,
    pub reply: Reply<()>,
}

impl ChatMessage for Restore {
    fn handle(self: Box<Self>, state: &mut ChatState, _mailbox: &Mailbox) {
        let Self { transcript, reply } = *self;
        reply.send(state.session.restore(transcript)).ok();
    }
}

/// Reads something out of the session.
pub struct Inspect<R, F> {
    f: F,
    reply: oneshot::Sender<R>,
}

impl<R, F> Inspect<R, F>
where
    F: FnOnce(&ConversationSession) -> R,
{
    #[inline]
    pub fn new(f: F, reply: oneshot::Sender<R>) -> Self {
        Self { f, reply }
    }
}

impl<R, F> Debug for Inspect<R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inspect").finish_non_exhaustive()
    }
}

impl<R, F> ChatMessage for Inspect<R, F>
where
    R: Send + 'static,
    F: FnOnce(&ConversationSession) -> R + Send + 'static,
{
    #[inline]
    fn handle(self: Box<Self>, state: &mut ChatState, _mailbox: &Mailbox) {
        let Self { f, reply } = *self;
        reply.send(f(&state.session)).ok();
    }
}
