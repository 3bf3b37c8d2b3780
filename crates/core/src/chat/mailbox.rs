//! The chat task and the channel feeding it.
//!
//! Messages are handled one at a time on the task that owns the
//! [`ChatState`]. Slow work is spawned elsewhere and reports back through
//! another message.

use std::fmt::Debug;
use std::sync::Arc;

use tokio::select;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{Notify, oneshot};
use tracing::Instrument;

use super::ChatState;
use crate::error::SessionError;

/// A message the chat task can handle.
pub trait ChatMessage: Send + Debug + 'static {
    /// Runs on the chat task and must not block.
    fn handle(self: Box<Self>, state: &mut ChatState, mailbox: &Mailbox);
}

type Inbox = UnboundedReceiver<Box<dyn ChatMessage>>;

/// Sending side of the chat task.
///
/// The task stops once every mailbox is dropped or [`Mailbox::close`] is
/// called, dropping the state with it.
#[derive(Clone)]
pub struct Mailbox {
    tx: UnboundedSender<Box<dyn ChatMessage>>,
    closed: Arc<Notify>,
}

impl Mailbox {
    /// Spawns the chat task owning `state`.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(state: ChatState) -> Self {
        let (tx, inbox) = mpsc::unbounded_channel();
        let closed = Arc::new(Notify::new());
        tokio::spawn(
            run(state, tx.downgrade(), inbox, Arc::clone(&closed))
                .instrument(debug_span!("chat")),
        );
        Self { tx, closed }
    }

    #[inline]
    pub fn send<M: ChatMessage>(&self, msg: M) -> Result<(), SessionError> {
        self.tx.send(Box::new(msg)).map_err(|_| SessionError::Closed)
    }

    /// Sends the message built by `make_msg` and waits for its reply.
    pub async fn ask<R, M, F>(&self, make_msg: F) -> Result<R, SessionError>
    where
        F: FnOnce(oneshot::Sender<R>) -> M,
        M: ChatMessage,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make_msg(reply_tx))?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }

    /// Stops the task before it handles anything else.
    #[inline]
    pub fn close(&self) {
        self.closed.notify_one();
    }
}

async fn run(
    mut state: ChatState,
    tx: WeakUnboundedSender<Box<dyn ChatMessage>>,
    mut inbox: Inbox,
    closed: Arc<Notify>,
) {
    debug!("started");
    loop {
        let msg = select! {
            biased;

            _ = closed.notified() => {
                debug!("closed");
                break;
            }
            msg = inbox.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        let Some(tx) = tx.upgrade() else {
            warn!("every mailbox has been dropped, discard {msg:?}");
            break;
        };
        let mailbox = Mailbox {
            tx,
            closed: Arc::clone(&closed),
        };
        trace!("received message: {msg:?}");
        msg.handle(&mut state, &mailbox);
    }
    debug!("will terminate");
}
