//! Typed pipeline configuration
//!
//! The decoded form of a pipeline description: one optional cache and
//! clone plugin, one or more build steps, compose services and ordered
//! publish/deploy/notify plugins.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::EventKind;

/// Opaque plugin arguments, forwarded verbatim to the plugin
pub type Vargs = serde_json::Map<String, serde_json::Value>;

/// Credentials for a private image registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Registry user name
    pub username: String,
    /// Registry password
    pub password: String,
    /// Registry email
    pub email: String,
    /// Registry identity token
    pub registry_token: String,
}

impl AuthConfig {
    /// Returns true when a password or token is present
    pub fn is_set(&self) -> bool {
        !self.password.is_empty() || !self.registry_token.is_empty()
    }
}

/// One unit of work executed in a container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Step {
    /// Step name (section key)
    pub name: String,
    /// Image reference
    pub image: String,
    /// Always pull the image before running
    pub pull: bool,
    /// Run the container in privileged mode
    pub privileged: bool,
    /// Skip the apt non-interactive configuration in build scripts
    pub disable_apt_config: bool,
    /// Environment in `KEY=VALUE` form
    pub environment: Vec<String>,
    /// Entrypoint override
    pub entrypoint: Vec<String>,
    /// Command override
    pub command: Vec<String>,
    /// Shell commands of a build step
    pub commands: Vec<String>,
    /// Volume mounts in `host:container` form
    pub volumes: Vec<String>,
    /// Extra `/etc/hosts` entries
    pub extra_hosts: Vec<String>,
    /// Network mode, empty for the runtime default
    pub network: String,
    /// Registry credentials
    pub auth_config: AuthConfig,
    /// Plugin arguments
    pub vargs: Vargs,
}

impl Step {
    /// Creates a step with a name and image
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Self::default()
        }
    }

    /// Sets the build commands
    pub fn with_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands = commands.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a plugin argument
    pub fn with_varg(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.vargs.insert(key.into(), value);
        self
    }
}

/// Strips the tag or digest from an image reference
pub fn image_base(image: &str) -> &str {
    let without_digest = image.split('@').next().unwrap_or(image);
    match without_digest.rfind(':') {
        Some(n) if !without_digest[n + 1..].contains('/') => &without_digest[..n],
        _ => without_digest,
    }
}

/// Conditions guarding a step.
///
/// An empty constraint matches every build on that axis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    /// Required repository full name
    pub repo: Option<String>,
    /// Branch glob patterns, `!` negates
    pub branch: Vec<String>,
    /// Allowed events
    pub event: Vec<EventKind>,
    /// Required matrix axis values
    pub matrix: BTreeMap<String, String>,
    /// Run only when the build so far succeeded
    pub success: Option<bool>,
    /// Run only when the build so far failed
    pub failure: Option<bool>,
}

impl Filter {
    /// Returns true if no axis is constrained
    pub fn is_unconstrained(&self) -> bool {
        self.repo.is_none()
            && self.branch.is_empty()
            && self.event.is_empty()
            && self.matrix.is_empty()
            && self.success.is_none()
            && self.failure.is_none()
    }

    /// Restricts the filter to a branch pattern
    pub fn with_branch(mut self, pattern: impl Into<String>) -> Self {
        self.branch.push(pattern.into());
        self
    }

    /// Restricts the filter to an event
    pub fn with_event(mut self, event: EventKind) -> Self {
        self.event.push(event);
        self
    }
}

/// A plugin step with its guard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plugin {
    /// Container settings and arguments
    pub step: Step,
    /// Guard conditions
    pub filter: Filter,
}

impl Plugin {
    /// Creates an unguarded plugin
    pub fn new(step: Step) -> Self {
        Self {
            step,
            filter: Filter::default(),
        }
    }

    /// Attaches a guard
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }
}

/// Decoded pipeline description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache plugin, skipped when it has no arguments
    pub cache: Plugin,
    /// Clone plugin, defaulted when absent
    pub clone: Plugin,
    /// Build steps in declaration order
    pub build: Vec<Step>,
    /// Service containers in declaration order
    pub compose: Vec<Step>,
    /// Publish plugins in declaration order
    pub publish: Vec<Plugin>,
    /// Deploy plugins in declaration order
    pub deploy: Vec<Plugin>,
    /// Notify plugins in declaration order
    pub notify: Vec<Plugin>,
    /// Verbose logging requested by the pipeline
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("golang", "golang")]
    #[case("golang:1.5", "golang")]
    #[case("plugins/drone-git:latest", "plugins/drone-git")]
    #[case("localhost:5000/foo", "localhost:5000/foo")]
    #[case("localhost:5000/foo:1.0", "localhost:5000/foo")]
    #[case("foo@sha256:abcd", "foo")]
    fn test_image_base(#[case] image: &str, #[case] expected: &str) {
        assert_eq!(image_base(image), expected);
    }

    #[test]
    fn test_auth_config_is_set() {
        assert!(!AuthConfig::default().is_set());
        let auth = AuthConfig {
            registry_token: "t0k3n".to_string(),
            ..AuthConfig::default()
        };
        assert!(auth.is_set());
    }

    #[test]
    fn test_filter_unconstrained() {
        assert!(Filter::default().is_unconstrained());
        assert!(!Filter::default().with_branch("master").is_unconstrained());
    }
}
