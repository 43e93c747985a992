//! Compile errors

use thiserror::Error;

/// Errors that abort compilation. No tree is produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A step resolved to an empty image
    #[error("Step '{step}' must specify an image")]
    MissingImage {
        /// Name of the offending step.
        step: String,
    },

    /// A plugin image matched no whitelist pattern
    #[error("Plugin {image} used by step '{step}' is not in the whitelist")]
    NotWhitelisted {
        /// Name of the offending step.
        step: String,
        /// Resolved image reference.
        image: String,
    },

    /// A step is missing required settings
    #[error("Step '{step}' is malformed: {reason}")]
    Malformed {
        /// Name of the offending step.
        step: String,
        /// What is wrong with it.
        reason: String,
    },
}
