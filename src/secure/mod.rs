//! Secret handling
//!
//! Checksum verification, the trust gate and `$$NAME` substitution.
//! Secrets arrive already decrypted from the host.

pub mod checksum;
pub mod gate;
pub mod inject;

use thiserror::Error;

pub use gate::{Secrets, TrustDecision, apply, resolve};
pub use inject::{inject, inject_safe, parse_params};

/// Errors raised while substituting secrets
#[derive(Error, Debug)]
pub enum SecureError {
    /// The pipeline text is not valid YAML
    #[error("unable to inject parameters: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
