//! Core logic of a chat session: the transcript, the request lifecycle,
//! configurations, and persistence.
//!
//! [`ConversationSession`] is a plain state machine driven through
//! `&mut self`. [`Chat`] hosts one on its own task, so it can be observed
//! and reset while a request is in flight.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod backend;
pub mod capabilities;
mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod presentation;
mod session;
pub mod store;

pub use backend::{Completion, CompletionBackend, DeltaObserver, RequestFailure};
pub use capabilities::{CapabilityTable, ModelCapabilities};
pub use chat::{Chat, ChatBuilder};
pub use config::{FailureNotice, GenerationConfig, SessionPolicy};
pub use conversation::{Role, Transcript, Turn};
pub use error::{PersistenceError, PreconditionViolation, SessionError};
pub use session::{ConversationSession, PendingEdit, RequestTicket, SessionStage};
pub use store::{JsonFileStore, MemoryStore, Named, TranscriptStore};
