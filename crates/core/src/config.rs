//! Generation parameters and session policies.

use std::ops::RangeInclusive;

use parley_model::GenerationOptions;
use serde::{Deserialize, Serialize};

use crate::error::PreconditionViolation;

const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=2.0;
const TOP_P_RANGE: RangeInclusive<f32> = 0.0..=1.0;

/// The tunable parameters governing how the next response is produced.
///
/// Each field is checked against its own range only, see
/// [`GenerationConfig::validate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Identifier of the model to talk to.
    pub model: String,
    /// Sampling temperature, `0.0..=2.0`.
    pub temperature: f32,
    /// Nucleus sampling probability ("top-p"), `0.0..=1.0`.
    pub top_p: f32,
    /// Number of candidate tokens considered ("top-k"), at least 1.
    pub top_k: u32,
    /// Upper bound of tokens in a response, at least 1.
    pub max_output_tokens: u32,
    /// System instructions, only sent when non-empty and the model
    /// supports them.
    pub system_prompt: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-pro".to_owned(),
            temperature: 1.0,
            top_p: 0.95,
            top_k: 64,
            max_output_tokens: 2000,
            system_prompt: String::new(),
        }
    }
}

impl GenerationConfig {
    /// Sets the model.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the system prompt.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Checks every field against its own range, and that the model id is a
    /// plain identifier.
    pub fn validate(&self) -> Result<(), PreconditionViolation> {
        let invalid = |field| Err(PreconditionViolation::InvalidConfig(field));
        if !is_model_id(&self.model) {
            return invalid("model");
        }
        if !TEMPERATURE_RANGE.contains(&self.temperature) {
            return invalid("temperature");
        }
        if !TOP_P_RANGE.contains(&self.top_p) {
            return invalid("top_p");
        }
        if self.top_k == 0 {
            return invalid("top_k");
        }
        if self.max_output_tokens == 0 {
            return invalid("max_output_tokens");
        }
        Ok(())
    }

    pub(crate) fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            max_output_tokens: self.max_output_tokens,
        }
    }
}

/// Model identifiers end up as a URL path segment, so only plain
/// identifier characters are accepted.
fn is_model_id(model: &str) -> bool {
    !model.is_empty()
        && !model.starts_with('.')
        && model
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// What the placeholder turn says when a request fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureNotice {
    /// Include the failure detail, for operators.
    #[default]
    Detailed,
    /// A fixed apology without any detail.
    Generic,
}

const APOLOGY: &str = "Sorry, I can't respond right now.";

impl FailureNotice {
    /// Renders the placeholder content for a failure described by `detail`.
    pub fn render(self, detail: &str) -> String {
        match self {
            Self::Detailed => format!("{APOLOGY} Error: {detail}"),
            Self::Generic => format!("{APOLOGY} Please try again later."),
        }
    }
}

/// Behavior switches that differ between deployments of the same session
/// logic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionPolicy {
    /// How request failures are reported in the transcript.
    pub failure_notice: FailureNotice,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(GenerationConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_field_ranges() {
        let cases: [(fn(&mut GenerationConfig), &str); 5] = [
            (|c| c.model = " ".to_owned(), "model"),
            (|c| c.temperature = 2.5, "temperature"),
            (|c| c.top_p = -0.1, "top_p"),
            (|c| c.top_k = 0, "top_k"),
            (|c| c.max_output_tokens = 0, "max_output_tokens"),
        ];
        for (mutate, field) in cases {
            let mut config = GenerationConfig::default();
            mutate(&mut config);
            assert_eq!(
                config.validate(),
                Err(PreconditionViolation::InvalidConfig(field))
            );
        }

        let config = GenerationConfig {
            temperature: 0.0,
            top_p: 1.0,
            top_k: 1,
            max_output_tokens: 1,
            ..Default::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_model_ids() {
        for model in ["gemini-2.0-flash", "gemini-1.5-flash-8b", "my_model.v2"] {
            let config = GenerationConfig::default().with_model(model);
            assert_eq!(config.validate(), Ok(()), "{model}");
        }
        for model in ["", "..", "a/b", "x?alt=json", "gemini 1.5", ".hidden"] {
            let config = GenerationConfig::default().with_model(model);
            assert_eq!(
                config.validate(),
                Err(PreconditionViolation::InvalidConfig("model")),
                "{model}"
            );
        }
    }

    #[test]
    fn test_failure_notice() {
        assert_eq!(
            FailureNotice::Detailed.render("quota exceeded"),
            "Sorry, I can't respond right now. Error: quota exceeded"
        );
        assert_eq!(
            FailureNotice::Generic.render("quota exceeded"),
            "Sorry, I can't respond right now. Please try again later."
        );
    }

    #[test]
    fn test_partial_config_file() {
        let config: GenerationConfig =
            serde_json::from_str(r#"{ "temperature": 0.25 }"#).unwrap();
        assert_eq!(config.temperature, 0.25);
        assert_eq!(config.model, "gemini-1.5-pro");
    }
}
