use std::fmt::{self, Debug, Formatter};

use serde::Serialize;

const DEFAULT_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta";

/// Harm categories understood by the safety filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
}

/// The probability at which content of a category gets blocked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockThreshold {
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

/// A per-category safety filter setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: BlockThreshold,
}

impl SafetySetting {
    /// Returns settings that apply `threshold` to every category.
    pub fn for_all_categories(threshold: BlockThreshold) -> Vec<Self> {
        [
            HarmCategory::HateSpeech,
            HarmCategory::Harassment,
            HarmCategory::SexuallyExplicit,
            HarmCategory::DangerousContent,
        ]
        .into_iter()
        .map(|category| Self {
            category,
            threshold,
        })
        .collect()
    }
}

/// Builder for [`GeminiConfig`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GeminiConfigBuilder {
    api_key: String,
    base_url: Option<String>,
    safety_settings: Option<Vec<SafetySetting>>,
}

impl GeminiConfigBuilder {
    /// Creates a builder with the given API key.
    #[inline]
    pub fn with_api_key<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            safety_settings: None,
        }
    }

    /// Sets a custom base URL, e.g. a proxy in front of the API.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Overrides the safety settings sent with every request.
    ///
    /// By default every category is set to [`BlockThreshold::BlockNone`].
    #[inline]
    pub fn with_safety_settings(
        mut self,
        safety_settings: impl Into<Vec<SafetySetting>>,
    ) -> Self {
        self.safety_settings = Some(safety_settings.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> GeminiConfig {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        GeminiConfig {
            api_key: self.api_key,
            base_url: base_url.trim_end_matches('/').to_owned(),
            safety_settings: self.safety_settings.unwrap_or_else(|| {
                SafetySetting::for_all_categories(BlockThreshold::BlockNone)
            }),
        }
    }
}

impl Debug for GeminiConfigBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfigBuilder")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("safety_settings", &self.safety_settings)
            .finish()
    }
}

/// Configuration for the Gemini provider.
///
/// The model is not part of the configuration, each request names its own.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GeminiConfig {
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) safety_settings: Vec<SafetySetting>,
}

impl GeminiConfig {
    pub(crate) fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }
}

impl Debug for GeminiConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("safety_settings", &self.safety_settings)
            .finish()
    }
}
