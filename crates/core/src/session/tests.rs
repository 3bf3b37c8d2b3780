use parley_model::{ErrorKind, ModelMessage};
use parley_test_model::{PresetResponse, TestModelProvider};

use super::*;
use crate::config::FailureNotice;
use crate::store::MemoryStore;

fn echo_backend(text: &str) -> (TestModelProvider, CompletionBackend) {
    let provider = TestModelProvider::always(PresetResponse::with_text(text));
    let backend = CompletionBackend::new(provider.clone());
    (provider, backend)
}

fn assert_alternates(transcript: &Transcript) {
    for (index, turn) in transcript.iter().enumerate() {
        let expected = if index % 2 == 0 {
            Role::User
        } else {
            Role::Assistant
        };
        assert_eq!(turn.role(), expected, "turn {index}");
    }
}

#[tokio::test]
async fn test_exchanges_alternate() {
    let (provider, backend) = echo_backend("Sure thing.");
    let mut session = ConversationSession::default();

    for (round, text) in ["one", "two", "three"].into_iter().enumerate() {
        let turn = session.submit_user_message(&backend, text).await.unwrap();
        assert_eq!(turn, Turn::assistant("Sure thing."));
        assert_eq!(session.transcript().len(), (round + 1) * 2);
        assert_alternates(session.transcript());
        assert!(session.is_idle());
    }

    let request = provider.last_request().unwrap();
    assert_eq!(request.model, "gemini-1.5-pro");
    assert_eq!(
        request.messages,
        [
            ModelMessage::User("one".to_owned()),
            ModelMessage::Assistant("Sure thing.".to_owned()),
            ModelMessage::User("two".to_owned()),
            ModelMessage::Assistant("Sure thing.".to_owned()),
            ModelMessage::User("three".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_failure_records_placeholder() {
    let mut provider = TestModelProvider::default();
    provider.add_exchange(PresetResponse::with_text("never").with_failures(0));
    provider.add_exchange(PresetResponse::with_text("Back again."));
    let backend = CompletionBackend::new(provider.clone());
    let mut session = ConversationSession::default();

    let turn = session.submit_user_message(&backend, "Hi").await.unwrap();
    assert_eq!(turn.role(), Role::Assistant);
    assert_eq!(
        turn.content(),
        "Sorry, I can't respond right now. Error: scripted failure"
    );
    assert_eq!(session.transcript().len(), 2);
    assert_eq!(session.stage(), SessionStage::Idle);

    // The placeholder is part of the history sent afterwards.
    let turn = session.submit_user_message(&backend, "Hi?").await.unwrap();
    assert_eq!(turn.content(), "Back again.");
    let request = provider.last_request().unwrap();
    assert_eq!(
        request.messages[1],
        ModelMessage::Assistant(
            "Sorry, I can't respond right now. Error: scripted failure"
                .to_owned()
        )
    );
}

#[tokio::test]
async fn test_generic_failure_notice() {
    let backend = CompletionBackend::new(TestModelProvider::default());
    let mut session =
        ConversationSession::default().with_policy(SessionPolicy {
            failure_notice: FailureNotice::Generic,
        });

    let turn = session.submit_user_message(&backend, "Hi").await.unwrap();
    assert_eq!(
        turn.content(),
        "Sorry, I can't respond right now. Please try again later."
    );
}

#[tokio::test]
async fn test_edit_is_sent_with_next_request() {
    let (provider, backend) = echo_backend("Original answer.");
    let mut session = ConversationSession::default();
    session.submit_user_message(&backend, "Hi").await.unwrap();

    session.request_edit(1, "Draft").unwrap();
    session.request_edit(1, "Better answer.").unwrap();
    assert_eq!(session.transcript()[1].content(), "Better answer.");
    let pending = session.pending_edit().unwrap();
    assert_eq!((pending.index(), pending.content()), (1, "Better answer."));

    session.submit_user_message(&backend, "Go on").await.unwrap();
    assert!(session.pending_edit().is_none());
    let request = provider.last_request().unwrap();
    assert_eq!(
        request.messages[1],
        ModelMessage::Assistant("Better answer.".to_owned())
    );
    assert_eq!(session.transcript()[1].content(), "Better answer.");
    assert_eq!(session.transcript()[3].content(), "Original answer.");
}

#[tokio::test]
async fn test_edit_is_sent_even_if_request_fails() {
    let mut provider = TestModelProvider::default();
    provider.add_exchange(PresetResponse::with_text("Original answer."));
    provider.add_exchange(PresetResponse::with_text("never").with_failures(0));
    let backend = CompletionBackend::new(provider.clone());
    let mut session = ConversationSession::default();
    session.submit_user_message(&backend, "Hi").await.unwrap();

    session.request_edit(1, "Edited.").unwrap();
    let turn = session.submit_user_message(&backend, "Go on").await.unwrap();
    assert_eq!(
        turn.content(),
        "Sorry, I can't respond right now. Error: scripted failure"
    );
    assert_eq!(session.transcript().last(), Some(&turn));
    assert!(session.pending_edit().is_none());

    let request = provider.last_request().unwrap();
    assert_eq!(
        request.messages[1],
        ModelMessage::Assistant("Edited.".to_owned())
    );
}

#[tokio::test]
async fn test_edit_preconditions() {
    let (_, backend) = echo_backend("Hello.");
    let mut session = ConversationSession::default();
    session.submit_user_message(&backend, "Hi").await.unwrap();
    let before = session.transcript().clone();

    let err = session.request_edit(0, "x").unwrap_err();
    assert_eq!(
        err.precondition(),
        Some(PreconditionViolation::NotAssistantTurn(0))
    );
    let err = session.request_edit(2, "x").unwrap_err();
    assert_eq!(err.precondition(), Some(PreconditionViolation::NoSuchTurn(2)));

    assert_eq!(session.transcript(), &before);
    assert!(session.pending_edit().is_none());
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let (provider, backend) = echo_backend("Hello.");
    let mut session = ConversationSession::default();

    for text in ["", "  \n\t"] {
        let err = session.submit_user_message(&backend, text).await.unwrap_err();
        assert_eq!(err.precondition(), Some(PreconditionViolation::EmptyMessage));
    }
    assert!(session.transcript().is_empty());
    assert!(provider.captured_requests().is_empty());
}

#[tokio::test]
async fn test_apply_configuration() {
    let (provider, backend) = echo_backend("Hello.");
    let mut session = ConversationSession::default();
    session.submit_user_message(&backend, "Hi").await.unwrap();
    session.request_edit(1, "Edited.").unwrap();

    let config = GenerationConfig {
        temperature: 0.5,
        ..GenerationConfig::default().with_model("gemini-1.5-flash")
    };
    session.apply_configuration(config.clone(), false).unwrap();
    assert_eq!(session.config(), &config);
    assert_eq!(session.transcript().len(), 2);
    assert!(session.pending_edit().is_some());

    session.submit_user_message(&backend, "Again").await.unwrap();
    let request = provider.last_request().unwrap();
    assert_eq!(request.model, "gemini-1.5-flash");
    assert_eq!(request.options.temperature, 0.5);

    session.request_edit(1, "Edited twice.").unwrap();
    session
        .apply_configuration(GenerationConfig::default(), true)
        .unwrap();
    assert!(session.transcript().is_empty());
    assert!(session.pending_edit().is_none());
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let mut session = ConversationSession::default();
    let config = GenerationConfig {
        top_k: 0,
        ..Default::default()
    };
    let err = session.apply_configuration(config.clone(), true).unwrap_err();
    assert_eq!(
        err.precondition(),
        Some(PreconditionViolation::InvalidConfig("top_k"))
    );
    assert_eq!(session.config(), &GenerationConfig::default());

    let err = ConversationSession::new(config).unwrap_err();
    assert_eq!(
        err.precondition(),
        Some(PreconditionViolation::InvalidConfig("top_k"))
    );
}

#[test]
fn test_busy_while_requesting() {
    let mut session = ConversationSession::default();
    let (_ticket, request) = session.begin_submit("Hi").unwrap();
    assert_eq!(request.messages, [ModelMessage::User("Hi".to_owned())]);
    assert_eq!(session.stage(), SessionStage::Requesting);
    // The user turn shows up before the response arrives.
    assert_eq!(session.transcript().len(), 1);

    let busy = Some(PreconditionViolation::Busy);
    assert_eq!(session.begin_submit("More").unwrap_err().precondition(), busy);
    assert_eq!(session.request_edit(0, "x").unwrap_err().precondition(), busy);
    assert_eq!(
        session
            .apply_configuration(GenerationConfig::default(), true)
            .unwrap_err()
            .precondition(),
        busy
    );
    let store = MemoryStore::new();
    assert_eq!(session.save(&store).unwrap_err().precondition(), busy);
    assert_eq!(session.load(&store, &0).unwrap_err().precondition(), busy);
    assert_eq!(session.transcript().len(), 1);
}

#[test]
fn test_reset_abandons_request() {
    let mut session = ConversationSession::default();
    let (stale, _) = session.begin_submit("Hi").unwrap();
    session.reset();
    assert!(session.is_idle());
    assert!(session.transcript().is_empty());

    let (current, _) = session.begin_submit("Hello").unwrap();
    let completion = Completion {
        content: "Too late.".to_owned(),
        finish_reason: None,
    };
    assert!(matches!(
        session.finish_submit(stale, Ok(completion.clone())),
        Err(SessionError::Discarded)
    ));
    assert_eq!(session.stage(), SessionStage::Requesting);
    assert_eq!(session.transcript().len(), 1);

    let failure = RequestFailure {
        kind: ErrorKind::Moderated,
        message: "blocked".to_owned(),
    };
    let turn = session.finish_submit(current, Err(failure)).unwrap();
    assert_eq!(
        turn.content(),
        "Sorry, I can't respond right now. Error: blocked"
    );

    // Recording twice is not possible either.
    assert!(matches!(
        session.finish_submit(current, Ok(completion)),
        Err(SessionError::Discarded)
    ));
    assert_eq!(session.transcript().len(), 2);
}

#[tokio::test]
async fn test_system_prompt_capability() {
    let (provider, backend) = echo_backend("Ahoy.");
    let capabilities =
        CapabilityTable::new().with_system_prompt_support("gemini-1.5-pro");
    let mut session = ConversationSession::new(
        GenerationConfig::default().with_system_prompt("Talk like a pirate."),
    )
    .unwrap()
    .with_capabilities(capabilities);

    session.submit_user_message(&backend, "Hi").await.unwrap();
    let request = provider.last_request().unwrap();
    assert_eq!(
        request.messages[0],
        ModelMessage::System("Talk like a pirate.".to_owned())
    );

    let config = session.config().clone().with_model("gemini-1.0-pro");
    session.apply_configuration(config, false).unwrap();
    session.submit_user_message(&backend, "Hi again").await.unwrap();
    let request = provider.last_request().unwrap();
    assert!(
        !request
            .messages
            .iter()
            .any(|msg| matches!(msg, ModelMessage::System(_)))
    );
    assert_eq!(request.messages.len(), 3);
}

#[tokio::test]
async fn test_blank_system_prompt_is_omitted() {
    let (provider, backend) = echo_backend("Hello.");
    let mut session = ConversationSession::new(
        GenerationConfig::default().with_system_prompt("   "),
    )
    .unwrap();
    session.submit_user_message(&backend, "Hi").await.unwrap();
    let request = provider.last_request().unwrap();
    assert_eq!(request.messages, [ModelMessage::User("Hi".to_owned())]);
}

#[tokio::test]
async fn test_save_and_load() {
    let (_, backend) = echo_backend("Hello.");
    let store = MemoryStore::new();
    let mut session = ConversationSession::default();
    session.submit_user_message(&backend, "Hi").await.unwrap();
    session.request_edit(1, "Hello there.").unwrap();
    let handle = session.save(&store).unwrap();
    let saved = session.transcript().clone();

    session.submit_user_message(&backend, "More").await.unwrap();
    session.request_edit(3, "Pending.").unwrap();
    session.load(&store, &handle).unwrap();
    assert_eq!(session.transcript(), &saved);
    assert!(session.pending_edit().is_none());

    let err = session.load(&store, &42).unwrap_err();
    assert!(matches!(err, SessionError::Persistence(_)));
    assert_eq!(session.transcript(), &saved);
}

#[tokio::test]
async fn test_restore_rejects_unanswered_transcript() {
    let (_, backend) = echo_backend("Hello.");
    let mut session = ConversationSession::default();
    session.submit_user_message(&backend, "Hi").await.unwrap();
    let before = session.transcript().clone();

    let mut source = ConversationSession::default();
    source.begin_submit("Hi").unwrap();
    assert_eq!(source.transcript().len(), 1);

    let err = session.restore(source.transcript().clone()).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Persistence(PersistenceError::Malformed(_))
    ));
    assert_eq!(session.transcript(), &before);

    // The session is still usable and keeps alternating.
    session.submit_user_message(&backend, "Again").await.unwrap();
    assert_eq!(session.transcript().len(), 4);
    assert_alternates(session.transcript());

    let store = MemoryStore::new();
    let handle = session.save(&store).unwrap();
    assert_eq!(&store.load(&handle).unwrap(), session.transcript());
}
