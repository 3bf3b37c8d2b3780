//! Static knowledge about what each model accepts.

use std::collections::HashSet;

/// Answers capability questions about model identifiers.
///
/// Sessions consult it while building each request, so new models can be
/// added without touching session logic.
pub trait ModelCapabilities: Send + Sync {
    /// Returns whether `model` accepts system instructions.
    fn supports_system_prompt(&self, model: &str) -> bool;
}

impl<F> ModelCapabilities for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    #[inline]
    fn supports_system_prompt(&self, model: &str) -> bool {
        self(model)
    }
}

/// A lookup table of model identifiers.
///
/// Models that are not listed are assumed to lack every capability, unless
/// the table was created with [`CapabilityTable::permissive`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilityTable {
    system_prompt: HashSet<String>,
    permissive: bool,
}

impl CapabilityTable {
    /// Creates an empty table where nothing is supported.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table where every model supports everything.
    #[inline]
    pub fn permissive() -> Self {
        Self {
            system_prompt: HashSet::new(),
            permissive: true,
        }
    }

    /// Marks `model` as accepting system instructions.
    #[inline]
    pub fn with_system_prompt_support<S: Into<String>>(
        mut self,
        model: S,
    ) -> Self {
        self.system_prompt.insert(model.into());
        self
    }
}

impl ModelCapabilities for CapabilityTable {
    #[inline]
    fn supports_system_prompt(&self, model: &str) -> bool {
        self.permissive || self.system_prompt.contains(model)
    }
}
