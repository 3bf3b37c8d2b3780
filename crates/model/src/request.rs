use serde::{Deserialize, Serialize};

/// A request to be sent to the model provider.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
    /// Identifier of the model to sample from, e.g. `gemini-1.5-pro`.
    pub model: String,
    /// The input messages, oldest first.
    ///
    /// A [`ModelMessage::System`] message, if any, comes first.
    pub messages: Vec<ModelMessage>,
    /// Sampling parameters for this request.
    pub options: GenerationOptions,
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// An assistant text.
    Assistant(String),
}

impl ModelMessage {
    /// Returns the text of this message.
    #[inline]
    pub fn text(&self) -> &str {
        match self {
            Self::System(text) | Self::User(text) | Self::Assistant(text) => {
                text
            }
        }
    }
}

/// Sampling parameters understood by most hosted models.
///
/// Providers map them to their own wire names and are free to ignore the
/// ones they don't support.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling probability mass ("top-p").
    pub top_p: f32,
    /// Number of highest-probability tokens considered ("top-k").
    pub top_k: u32,
    /// Upper bound of tokens in the generated response.
    pub max_output_tokens: u32,
}
