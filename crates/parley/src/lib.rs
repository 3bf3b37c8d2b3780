//! An out-of-the-box chat client for Gemini models.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to bring the same chat sessions into your own host
//! apps.

#![deny(missing_docs)]

pub mod command;
mod repl;
mod typewriter;

use parley_core::CapabilityTable;
pub use repl::{Reply, Repl};
pub use typewriter::Typewriter;

/// Re-exports of [`parley_core`] crate.
pub mod core {
    pub use parley_core::*;
}

/// Re-exports of [`parley_gemini_model`] crate.
pub mod gemini {
    pub use parley_gemini_model::*;
}

const SYSTEM_PROMPT_MODELS: &[&str] = &[
    "gemini-1.5-pro",
    "gemini-1.5-pro-latest",
    "gemini-1.5-flash",
    "gemini-1.5-flash-latest",
    "gemini-1.5-flash-8b",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-2.5-pro",
    "gemini-2.5-flash",
];

/// Returns what is known about the Gemini models.
///
/// The first generation models (`gemini-1.0-pro`, `gemini-pro`) do not
/// accept system instructions, neither do unknown models.
pub fn gemini_capabilities() -> CapabilityTable {
    SYSTEM_PROMPT_MODELS
        .iter()
        .fold(CapabilityTable::new(), |table, model| {
            table.with_system_prompt_support(*model)
        })
}

#[cfg(test)]
mod tests {
    use parley_core::ModelCapabilities;

    use super::*;

    #[test]
    fn test_gemini_capabilities() {
        let table = gemini_capabilities();
        assert!(table.supports_system_prompt("gemini-1.5-pro"));
        assert!(table.supports_system_prompt("gemini-2.0-flash"));
        assert!(!table.supports_system_prompt("gemini-1.0-pro"));
        assert!(!table.supports_system_prompt("gemini-pro"));
    }
}
