use parley_model::{
    GenerationOptions, ModelFinishReason, ModelMessage, ModelRequest,
};
use serde::{Deserialize, Serialize};

use crate::GeminiConfig;
use crate::config::SafetySetting;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

impl Candidate {
    /// Concatenates the text parts of this candidate.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .flat_map(|content| &content.parts)
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

pub fn finish_reason_from_str(reason: &str) -> ModelFinishReason {
    match reason {
        "STOP" => ModelFinishReason::Stop,
        "MAX_TOKENS" => ModelFinishReason::MaxTokens,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT"
        | "SPII" => ModelFinishReason::Safety,
        _ => ModelFinishReason::Other,
    }
}

// ---------------------------
// Types shared in both ways
// ---------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Part {
    // Non-text parts (inline data, function calls) are not used here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Content {
    fn text(role: Option<Role>, text: &str) -> Self {
        Self {
            role,
            parts: vec![Part {
                text: Some(text.to_owned()),
            }],
        }
    }
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    safety_settings: Vec<SafetySetting>,
}

// -----------
// Conversions
// -----------

pub fn create_request(
    req: &ModelRequest,
    config: &GeminiConfig,
) -> GenerateContentRequest {
    let mut system_texts = Vec::new();
    let mut contents = Vec::with_capacity(req.messages.len());
    for msg in &req.messages {
        match msg {
            ModelMessage::System(text) => system_texts.push(text.as_str()),
            ModelMessage::User(text) => {
                contents.push(Content::text(Some(Role::User), text));
            }
            ModelMessage::Assistant(text) => {
                contents.push(Content::text(Some(Role::Model), text));
            }
        }
    }

    // The API takes a single system instruction, merge them if needed.
    let system_instruction = (!system_texts.is_empty())
        .then(|| Content::text(None, &system_texts.join("\n\n")));

    GenerateContentRequest {
        contents,
        system_instruction,
        generation_config: create_generation_config(&req.options),
        safety_settings: config.safety_settings.clone(),
    }
}

#[inline]
fn create_generation_config(options: &GenerationOptions) -> GenerationConfig {
    GenerationConfig {
        temperature: options.temperature,
        top_p: options.top_p,
        top_k: options.top_k,
        max_output_tokens: options.max_output_tokens,
    }
}
