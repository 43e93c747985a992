//! Error types for pipeline domain

use thiserror::Error;

/// Errors raised while decoding a pipeline description
#[derive(Error, Debug)]
pub enum ParseError {
    /// The document is not valid YAML
    #[error("Invalid pipeline yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A section has the wrong shape
    #[error("Section '{section}' is malformed: {reason}")]
    Malformed {
        /// Section or step where the problem was found.
        section: String,
        /// What was expected.
        reason: String,
    },

    /// An event filter names an unknown event
    #[error("Unknown build event '{0}'")]
    UnknownEvent(String),

    /// A shell-style command string could not be split
    #[error("Invalid command in '{section}': {reason}")]
    Command {
        /// Step holding the command.
        section: String,
        /// Split failure.
        reason: String,
    },
}

impl ParseError {
    pub(crate) fn malformed(section: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            section: section.into(),
            reason: reason.into(),
        }
    }
}
