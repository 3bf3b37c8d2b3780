//! Executing commands against a chat.

use std::path::PathBuf;

use parley_core::{Chat, JsonFileStore, SessionError, Transcript, Turn};

use crate::command::{Command, Setting};

/// What to show after a command has been executed.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// The assistant answered, or a placeholder was recorded.
    Assistant(Turn),
    /// A short confirmation.
    Notice(String),
    /// The transcript, for `/history`.
    History(Transcript),
    /// Saved system prompt names.
    Prompts(Vec<String>),
    /// The transcript has been saved at this path.
    Saved(PathBuf),
    /// Show the command list.
    Help,
    /// Leave the loop.
    Quit,
}

/// Executes commands against a chat, persisting into a [`JsonFileStore`].
#[derive(Clone)]
pub struct Repl {
    chat: Chat,
    store: JsonFileStore,
    reset_on_reconfigure: bool,
}

impl Repl {
    /// Creates a new executor.
    ///
    /// With `reset_on_reconfigure`, every configuration change also clears
    /// the conversation.
    #[inline]
    pub fn new(chat: Chat, store: JsonFileStore, reset_on_reconfigure: bool) -> Self {
        Self {
            chat,
            store,
            reset_on_reconfigure,
        }
    }

    /// Returns the chat commands are executed against.
    #[inline]
    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    /// Executes `command`.
    pub async fn execute(&self, command: Command) -> Result<Reply, SessionError> {
        let reply = match command {
            Command::Message(text) => {
                Reply::Assistant(self.chat.submit_user_message(text).await?)
            }
            Command::Edit { index, content } => {
                self.chat.request_edit(index, content).await?;
                Reply::Notice(format!("Turn {index} edited."))
            }
            Command::Set(setting) => {
                self.reconfigure(setting).await?;
                Reply::Notice("Configuration updated.".to_owned())
            }
            Command::Reset => {
                self.chat.reset().await?;
                Reply::Notice("Conversation cleared.".to_owned())
            }
            Command::History => Reply::History(self.chat.transcript().await?),
            Command::Save(None) => Reply::Saved(self.chat.save(&self.store).await?),
            Command::Save(Some(name)) => {
                let named = self.store.named(&name)?;
                Reply::Saved(self.chat.save(&named).await?)
            }
            Command::Load(name) => {
                let path = self.store.path_for(&name)?;
                self.chat.load(&self.store, &path).await?;
                Reply::Notice(format!("Loaded `{name}`."))
            }
            Command::SavePrompt(name) => {
                let config = self.chat.config().await?;
                self.store.save_prompt(&name, &config.system_prompt)?;
                Reply::Notice(format!("System prompt saved as `{name}`."))
            }
            Command::LoadPrompt(name) => {
                let prompt = self.store.load_prompt(&name)?;
                self.reconfigure(Setting::SystemPrompt(prompt)).await?;
                Reply::Notice(format!("Using system prompt `{name}`."))
            }
            Command::ListPrompts => Reply::Prompts(self.store.list_prompts()?),
            Command::Help => Reply::Help,
            Command::Quit => Reply::Quit,
        };
        Ok(reply)
    }

    async fn reconfigure(&self, setting: Setting) -> Result<(), SessionError> {
        let mut config = self.chat.config().await?;
        setting.apply(&mut config);
        self.chat
            .apply_configuration(config, self.reset_on_reconfigure)
            .await
    }
}
