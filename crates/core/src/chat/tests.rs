use std::sync::{Arc, Mutex};
use std::time::Duration;

use parley_model::ModelMessage;
use parley_test_model::{PresetResponse, TestModelProvider};

use crate::{
    CapabilityTable, Chat, ChatBuilder, GenerationConfig, MemoryStore,
    PersistenceError, PreconditionViolation, SessionError, SessionStage,
    TranscriptStore,
};

async fn wait_until_requesting(chat: &Chat) {
    while chat.stage().await.unwrap() != SessionStage::Requesting {
        tokio::task::yield_now().await;
    }
}

fn slow_provider(text: &str) -> TestModelProvider {
    let mut provider = TestModelProvider::always(PresetResponse::with_text(text));
    provider.set_delay(Duration::from_millis(200));
    provider
}

#[tokio::test]
async fn test_simple_exchange() {
    let mut provider = TestModelProvider::default();
    provider.add_exchange(PresetResponse::with_text("Hi, what can I do for you?"));

    let deltas = Arc::new(Mutex::new(Vec::new()));
    let chat = ChatBuilder::with_model_provider(provider)
        .on_delta({
            let deltas = Arc::clone(&deltas);
            move |delta: &str| deltas.lock().unwrap().push(delta.to_owned())
        })
        .build()
        .unwrap();

    let turn = chat.submit_user_message("Hello").await.unwrap();
    assert_eq!(turn.content(), "Hi, what can I do for you?");
    assert_eq!(deltas.lock().unwrap().concat(), turn.content());
    assert_eq!(deltas.lock().unwrap().len(), 7);

    let transcript = chat.transcript().await.unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].content(), "Hello");
    assert_eq!(chat.stage().await.unwrap(), SessionStage::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_busy_while_requesting() {
    let provider = slow_provider("Done.");
    let chat = ChatBuilder::with_model_provider(provider.clone())
        .build()
        .unwrap();
    chat.submit_user_message("First").await.unwrap();

    let submission = tokio::spawn({
        let chat = chat.clone();
        async move { chat.submit_user_message("Second").await }
    });
    wait_until_requesting(&chat).await;

    let busy = Some(PreconditionViolation::Busy);
    let err = chat.request_edit(1, "Edited.").await.unwrap_err();
    assert_eq!(err.precondition(), busy);
    let err = chat
        .apply_configuration(GenerationConfig::default(), true)
        .await
        .unwrap_err();
    assert_eq!(err.precondition(), busy);
    let err = chat.submit_user_message("Third").await.unwrap_err();
    assert_eq!(err.precondition(), busy);
    let store = MemoryStore::new();
    let err = chat.save(&store).await.unwrap_err();
    assert_eq!(err.precondition(), busy);
    assert!(store.is_empty());

    // Observation is still served.
    let transcript = chat.transcript().await.unwrap();
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[2].content(), "Second");

    let turn = submission.await.unwrap().unwrap();
    assert_eq!(turn.content(), "Done.");
    chat.request_edit(1, "Edited.").await.unwrap();
    assert_eq!(provider.captured_requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reset_discards_in_flight_request() {
    let provider = slow_provider("Too late.");
    let chat = ChatBuilder::with_model_provider(provider.clone())
        .build()
        .unwrap();

    let submission = tokio::spawn({
        let chat = chat.clone();
        async move { chat.submit_user_message("Hi").await }
    });
    wait_until_requesting(&chat).await;

    chat.reset().await.unwrap();
    assert_eq!(chat.stage().await.unwrap(), SessionStage::Idle);
    assert!(chat.transcript().await.unwrap().is_empty());

    assert!(matches!(
        submission.await.unwrap(),
        Err(SessionError::Discarded)
    ));
    assert!(chat.transcript().await.unwrap().is_empty());

    let turn = chat.submit_user_message("Hi again").await.unwrap();
    assert_eq!(turn.content(), "Too late.");
    let transcript = chat.transcript().await.unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].content(), "Hi again");
}

#[tokio::test]
async fn test_configuration_and_capabilities() {
    let provider = TestModelProvider::always(PresetResponse::with_text("Arr."));
    let chat = ChatBuilder::with_model_provider(provider.clone())
        .with_config(
            GenerationConfig::default().with_system_prompt("Talk like a pirate."),
        )
        .with_capabilities(
            CapabilityTable::new().with_system_prompt_support("gemini-1.5-pro"),
        )
        .build()
        .unwrap();

    chat.submit_user_message("Hi").await.unwrap();
    let request = provider.last_request().unwrap();
    assert_eq!(
        request.messages[0],
        ModelMessage::System("Talk like a pirate.".to_owned())
    );

    let config = chat.config().await.unwrap().with_model("gemini-1.0-pro");
    chat.apply_configuration(config.clone(), true).await.unwrap();
    assert_eq!(chat.config().await.unwrap(), config);
    assert!(chat.transcript().await.unwrap().is_empty());

    chat.submit_user_message("Hi").await.unwrap();
    let request = provider.last_request().unwrap();
    assert_eq!(request.messages, [ModelMessage::User("Hi".to_owned())]);
}

#[tokio::test]
async fn test_save_and_load() {
    let provider = TestModelProvider::always(PresetResponse::with_text("Sure."));
    let chat = ChatBuilder::with_model_provider(provider).build().unwrap();
    let store = MemoryStore::new();

    chat.submit_user_message("Hi").await.unwrap();
    chat.request_edit(1, "Certainly.").await.unwrap();
    let handle = chat.save(&store).await.unwrap();
    let saved = chat.transcript().await.unwrap();

    chat.reset().await.unwrap();
    chat.load(&store, &handle).await.unwrap();
    assert_eq!(chat.transcript().await.unwrap(), saved);

    let err = chat.load(&store, &7).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Persistence(PersistenceError::NotFound(_))
    ));
    assert_eq!(chat.transcript().await.unwrap(), saved);
}

#[tokio::test]
async fn test_invalid_initial_configuration() {
    let config = GenerationConfig {
        temperature: 3.0,
        ..Default::default()
    };
    let err = ChatBuilder::with_model_provider(TestModelProvider::default())
        .with_config(config)
        .build()
        .err()
        .unwrap();
    assert_eq!(
        err.precondition(),
        Some(PreconditionViolation::InvalidConfig("temperature"))
    );
}

#[tokio::test]
async fn test_closed_chat() {
    let chat = ChatBuilder::with_model_provider(TestModelProvider::default())
        .build()
        .unwrap();
    chat.close();
    assert!(matches!(
        chat.submit_user_message("Hi").await,
        Err(SessionError::Closed)
    ));
    assert!(matches!(chat.reset().await, Err(SessionError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_in_flight_request() {
    let chat = ChatBuilder::with_model_provider(slow_provider("Too late."))
        .build()
        .unwrap();
    let pending = tokio::spawn({
        let chat = chat.clone();
        async move { chat.submit_user_message("Hi").await }
    });
    wait_until_requesting(&chat).await;

    chat.close();
    assert!(matches!(pending.await.unwrap(), Err(SessionError::Closed)));
    assert!(matches!(chat.transcript().await, Err(SessionError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_snapshot_cannot_be_loaded() {
    let busy = ChatBuilder::with_model_provider(slow_provider("Later."))
        .build()
        .unwrap();
    tokio::spawn({
        let busy = busy.clone();
        async move { busy.submit_user_message("Hi").await }
    });
    wait_until_requesting(&busy).await;
    let snapshot = busy.transcript().await.unwrap();
    assert_eq!(snapshot.len(), 1);

    let store = MemoryStore::new();
    let handle = store.save(&snapshot).unwrap();
    let chat = ChatBuilder::with_model_provider(TestModelProvider::always(
        PresetResponse::with_text("Fine."),
    ))
    .build()
    .unwrap();
    chat.submit_user_message("Hello").await.unwrap();

    let err = chat.load(&store, &handle).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Persistence(PersistenceError::Malformed(_))
    ));
    assert_eq!(chat.transcript().await.unwrap().len(), 2);
    busy.close();
}
