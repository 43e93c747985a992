//! Secret trust gate
//!
//! Decides whether decrypted secrets may be substituted into a build's
//! pipeline text, and where.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::SecureError;
use super::checksum::verify;
use super::inject::{inject, inject_safe};
use crate::pipeline::EventKind;

/// Decrypted secrets supplied by the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Secrets {
    /// Recorded digest of the pipeline text
    pub checksum: String,
    /// Secret values by name
    pub environment: BTreeMap<String, String>,
}

/// Outcome of the trust check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustDecision {
    /// The pipeline text matched its recorded digest
    pub verified: bool,
    /// Secrets may be substituted into plugin sections
    pub safe: bool,
    /// Secrets may be substituted anywhere
    pub unrestricted: bool,
}

impl TrustDecision {
    /// Decision when the build carries no secrets
    #[must_use]
    pub fn without_secrets() -> Self {
        Self {
            verified: true,
            safe: false,
            unrestricted: false,
        }
    }

    /// Deploy and notify stages may run
    #[must_use]
    pub fn allows_deploy(self) -> bool {
        self.verified
    }
}

/// Checks the pipeline text against the recorded digest.
///
/// A pull request against a public repository without a recorded digest
/// is never verified. Verified pull requests get plugin-section
/// substitution only; other verified builds get full substitution.
#[must_use]
pub fn resolve(checksum: &str, raw: &str, event: EventKind, private: bool) -> TrustDecision {
    let pull_request = event == EventKind::PullRequest;
    let mut verified = verify(raw, checksum);
    if pull_request && !private && checksum.trim().is_empty() {
        verified = false;
    }

    match (verified, pull_request) {
        (true, true) => TrustDecision {
            verified,
            safe: true,
            unrestricted: false,
        },
        (true, false) => TrustDecision {
            verified,
            safe: false,
            unrestricted: true,
        },
        (false, _) => TrustDecision::default(),
    }
}

/// Substitutes secrets into `raw` as far as `decision` allows
pub fn apply(
    decision: TrustDecision,
    raw: &str,
    secrets: &BTreeMap<String, String>,
) -> Result<String, SecureError> {
    if decision.unrestricted {
        debug!("Injected secrets into pipeline");
        Ok(inject(raw, secrets))
    } else if decision.safe {
        debug!("Injected secrets into plugin sections");
        inject_safe(raw, secrets)
    } else {
        if !decision.verified {
            warn!("Unable to validate pipeline checksum, secrets withheld");
        }
        Ok(raw.to_string())
    }
}
