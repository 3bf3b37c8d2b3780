use std::sync::Arc;

use parley_model::ModelProvider;

use super::Chat;
use crate::backend::{CompletionBackend, DeltaObserver};
use crate::capabilities::ModelCapabilities;
use crate::config::{GenerationConfig, SessionPolicy};
use crate::error::SessionError;

/// [`Chat`] builder.
pub struct ChatBuilder {
    pub(crate) backend: CompletionBackend,
    pub(crate) config: GenerationConfig,
    pub(crate) policy: SessionPolicy,
    pub(crate) capabilities: Option<Arc<dyn ModelCapabilities>>,
    pub(crate) on_delta: Option<DeltaObserver>,
}

impl ChatBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self::with_backend(CompletionBackend::new(provider))
    }

    /// Creates a new builder sharing an existing backend.
    #[inline]
    pub fn with_backend(backend: CompletionBackend) -> Self {
        Self {
            backend,
            config: GenerationConfig::default(),
            policy: SessionPolicy::default(),
            capabilities: None,
            on_delta: None,
        }
    }

    /// Sets the initial configuration.
    #[inline]
    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the policy.
    #[inline]
    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the capability table. Every model accepts system instructions
    /// if none is set.
    #[inline]
    pub fn with_capabilities<C: ModelCapabilities + 'static>(
        mut self,
        capabilities: C,
    ) -> Self {
        self.capabilities = Some(Arc::new(capabilities));
        self
    }

    /// Attaches a callback invoked with every streamed message delta.
    ///
    /// It runs on the request task, not the chat task.
    #[inline]
    pub fn on_delta(
        mut self,
        on_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_delta = Some(Arc::new(on_delta));
        self
    }

    /// Builds the chat, failing if the configuration is invalid.
    ///
    /// Must be called within a tokio runtime.
    #[inline]
    pub fn build(self) -> Result<Chat, SessionError> {
        Chat::spawn_from_builder(self)
    }
}
