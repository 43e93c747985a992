//! Compile-time rewrite rules
//!
//! Each rule inspects one node and may rewrite it in place or reject it.
//! Rules run in registration order, first on every container leaf and
//! again on the guard that wraps a plugin step.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::errors::CompileError;
use super::image::{
    DEFAULT_CACHER, DEFAULT_CLONER, DEFAULT_WHITELIST, expand_image, expand_image_default,
    expand_image_tag, glob_match, is_escalated,
};
use super::node::{ContainerNode, Node};
use crate::pipeline::{EventKind, Stage};

/// Default host directory holding per-repository caches
pub const DEFAULT_CACHE_ROOT: &str = "/var/lib/drone/cache";

/// Proxy variables copied from the host into every container
pub const PROXY_VARS: &[&str] = &["HTTP_PROXY", "HTTPS_PROXY", "NO_PROXY"];

/// A node rewrite applied during compilation
pub trait Rule: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Rewrites or rejects `node`
    fn apply(&self, node: &mut Node) -> Result<(), CompileError>;
}

/// Applies `f` to container leaves only
fn on_container<F>(node: &mut Node, f: F) -> Result<(), CompileError>
where
    F: FnOnce(&mut ContainerNode) -> Result<(), CompileError>,
{
    match node.as_container_mut() {
        Some(container) => f(container),
        None => Ok(()),
    }
}

/// Resolves plugin aliases, default images and tags
#[derive(Debug, Default)]
pub struct ImageName;

impl Rule for ImageName {
    fn name(&self) -> &'static str {
        "image-name"
    }

    fn apply(&self, node: &mut Node) -> Result<(), CompileError> {
        on_container(node, |c| {
            let stage = c.stage();
            let step = &mut c.step;
            let image = match stage {
                Stage::Clone => expand_image_default(&step.image, DEFAULT_CLONER),
                Stage::Cache => expand_image_default(&step.image, DEFAULT_CACHER),
                _ if step.image.trim().is_empty() => String::new(),
                Stage::Build | Stage::Compose => step.image.trim().to_string(),
                _ => expand_image(step.image.trim()),
            };

            if image.is_empty() {
                return Err(CompileError::MissingImage {
                    step: step.name.clone(),
                });
            }
            step.image = expand_image_tag(&image);
            Ok(())
        })
    }
}

/// Rejects plugin images matching no whitelist pattern
#[derive(Debug)]
pub struct ImageWhitelist {
    patterns: Vec<String>,
}

impl ImageWhitelist {
    /// Creates a whitelist, falling back to `plugins/*` when empty
    pub fn new(patterns: Vec<String>) -> Self {
        let patterns = if patterns.is_empty() {
            vec![DEFAULT_WHITELIST.to_string()]
        } else {
            patterns
        };
        Self { patterns }
    }

    /// Returns true if `image` is allowed
    pub fn allows(&self, image: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p == image || glob_match(p, image))
    }
}

impl Default for ImageWhitelist {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Rule for ImageWhitelist {
    fn name(&self) -> &'static str {
        "image-whitelist"
    }

    fn apply(&self, node: &mut Node) -> Result<(), CompileError> {
        on_container(node, |c| {
            if !c.stage().is_plugin() || self.allows(&c.step.image) {
                return Ok(());
            }
            Err(CompileError::NotWhitelisted {
                step: c.step.name.clone(),
                image: c.step.image.clone(),
            })
        })
    }
}

/// Forces a pull of every image
#[derive(Debug, Default)]
pub struct ImagePull {
    force: bool,
}

impl ImagePull {
    /// Creates the rule; a no-op unless `force`
    pub fn new(force: bool) -> Self {
        Self { force }
    }
}

impl Rule for ImagePull {
    fn name(&self) -> &'static str {
        "image-pull"
    }

    fn apply(&self, node: &mut Node) -> Result<(), CompileError> {
        if !self.force {
            return Ok(());
        }
        on_container(node, |c| {
            c.step.pull = true;
            Ok(())
        })
    }
}

/// Rejects steps missing the settings their stage needs
#[derive(Debug, Default)]
pub struct StepLint;

impl Rule for StepLint {
    fn name(&self) -> &'static str {
        "step-lint"
    }

    fn apply(&self, node: &mut Node) -> Result<(), CompileError> {
        on_container(node, |c| {
            let step = &c.step;
            let malformed = |reason: &str| CompileError::Malformed {
                step: step.name.clone(),
                reason: reason.to_string(),
            };

            match c.stage() {
                Stage::Build if step.commands.is_empty() => {
                    Err(malformed("build steps require at least one command"))
                }
                Stage::Cache if !step.vargs.is_empty() => match step.vargs.get("mount") {
                    Some(serde_json::Value::Array(items)) if items.iter().all(|i| i.is_string()) => {
                        Ok(())
                    }
                    Some(serde_json::Value::String(_)) => Ok(()),
                    _ => Err(malformed("cache requires a list of mount paths")),
                },
                _ => Ok(()),
            }
        })
    }
}

/// Mounts the per-repository cache directory into the cache step
#[derive(Debug)]
pub struct CacheMount {
    host_root: String,
    repo: String,
}

impl CacheMount {
    /// Creates the rule for `repo` (owner/name) under `host_root`
    pub fn new(host_root: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            host_root: host_root.into(),
            repo: repo.into(),
        }
    }

    /// Bind mount in `host:container` form
    pub fn volume(&self) -> String {
        format!(
            "{}/{}:/cache",
            self.host_root.trim_end_matches('/'),
            self.repo
        )
    }
}

impl Rule for CacheMount {
    fn name(&self) -> &'static str {
        "cache-mount"
    }

    fn apply(&self, node: &mut Node) -> Result<(), CompileError> {
        on_container(node, |c| {
            if c.stage() == Stage::Cache {
                c.step.volumes = vec![self.volume()];
            }
            Ok(())
        })
    }
}

/// Strips host-level settings from untrusted pipelines
#[derive(Debug, Default)]
pub struct Sanitize {
    trusted: bool,
}

impl Sanitize {
    /// Creates the rule; a no-op for trusted repositories
    pub fn new(trusted: bool) -> Self {
        Self { trusted }
    }
}

impl Rule for Sanitize {
    fn name(&self) -> &'static str {
        "sanitize"
    }

    fn apply(&self, node: &mut Node) -> Result<(), CompileError> {
        if self.trusted {
            return Ok(());
        }
        on_container(node, |c| {
            // the cache mount is added by the host
            if c.stage() == Stage::Cache {
                return Ok(());
            }
            let step = &mut c.step;
            if step.privileged || !step.volumes.is_empty() || !step.network.is_empty() {
                tracing::debug!(step = %step.name, "Removing host settings from untrusted step");
            }
            step.privileged = false;
            step.volumes.clear();
            step.network.clear();
            step.entrypoint.clear();
            Ok(())
        })
    }
}

/// Grants privileged mode to the image-building publish plugins
#[derive(Debug, Default)]
pub struct Escalate;

impl Rule for Escalate {
    fn name(&self) -> &'static str {
        "escalate"
    }

    fn apply(&self, node: &mut Node) -> Result<(), CompileError> {
        on_container(node, |c| {
            if c.stage() == Stage::Publish && is_escalated(&c.step.image) {
                escalate(&mut c.step);
            }
            Ok(())
        })
    }
}

/// Privileged mode with no host volumes, network or entrypoint
pub fn escalate(step: &mut crate::pipeline::Step) {
    step.privileged = true;
    step.volumes.clear();
    step.network.clear();
    step.entrypoint.clear();
}

/// Passes the host proxy settings into every container
#[derive(Debug, Default)]
pub struct HttpProxy {
    vars: Vec<(String, String)>,
}

impl HttpProxy {
    /// Creates the rule from explicit `(name, value)` pairs
    pub fn new(vars: Vec<(String, String)>) -> Self {
        Self { vars }
    }

    /// Reads the proxy variables, upper and lower case, from the host
    pub fn from_env() -> Self {
        let vars = PROXY_VARS
            .iter()
            .flat_map(|name| [(*name).to_string(), name.to_lowercase()])
            .filter_map(|name| match std::env::var(&name) {
                Ok(value) if !value.is_empty() => Some((name, value)),
                _ => None,
            })
            .collect();
        Self { vars }
    }

    /// Consumes the rule, returning its variables
    pub fn into_vars(self) -> Vec<(String, String)> {
        self.vars
    }
}

impl Rule for HttpProxy {
    fn name(&self) -> &'static str {
        "http-proxy"
    }

    fn apply(&self, node: &mut Node) -> Result<(), CompileError> {
        if self.vars.is_empty() {
            return Ok(());
        }
        on_container(node, |c| {
            for (name, value) in &self.vars {
                let prefix = format!("{name}=");
                if !c.step.environment.iter().any(|e| e.starts_with(&prefix)) {
                    c.step.environment.push(format!("{name}={value}"));
                }
            }
            Ok(())
        })
    }
}

/// Limits unguarded notifications to push and tag events
#[derive(Debug, Default)]
pub struct DefaultNotifyFilter;

impl Rule for DefaultNotifyFilter {
    fn name(&self) -> &'static str {
        "default-notify-filter"
    }

    fn apply(&self, node: &mut Node) -> Result<(), CompileError> {
        if let Node::Filter(filter) = node
            && filter.guarded_stage() == Some(Stage::Notify)
            && filter.filter.event.is_empty()
        {
            filter.filter.event = vec![EventKind::Push, EventKind::Tag];
        }
        Ok(())
    }
}

/// Settings for the standard rule set
#[derive(Debug, Clone, Default)]
pub struct RuleOptions {
    /// Plugin whitelist patterns, `plugins/*` when empty
    pub whitelist: Vec<String>,
    /// Pull every image
    pub force_pull: bool,
    /// Repository is trusted to use host settings
    pub trusted: bool,
    /// Host cache root, [`DEFAULT_CACHE_ROOT`] when empty
    pub cache_root: String,
    /// Repository full name, the cache key
    pub repo: String,
    /// Proxy variables to inject
    pub proxy: Vec<(String, String)>,
}

/// Ordered collection of rules
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.name()))
            .finish()
    }
}

impl RuleSet {
    /// Creates an empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule after the existing ones
    pub fn with(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// The rules a build host runs, in order
    pub fn standard(options: &RuleOptions) -> Self {
        let cache_root = if options.cache_root.is_empty() {
            DEFAULT_CACHE_ROOT
        } else {
            options.cache_root.as_str()
        };

        Self::new()
            .with(ImageName)
            .with(ImageWhitelist::new(options.whitelist.clone()))
            .with(ImagePull::new(options.force_pull))
            .with(StepLint)
            .with(CacheMount::new(cache_root, options.repo.clone()))
            .with(Sanitize::new(options.trusted))
            .with(Escalate)
            .with(HttpProxy::new(options.proxy.clone()))
            .with(DefaultNotifyFilter)
    }

    /// Names of the registered rules
    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Applies every rule to `node`, stopping at the first error
    pub fn apply(&self, node: &mut Node) -> Result<(), CompileError> {
        for rule in &self.rules {
            rule.apply(node)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::node::FilterNode;
    use crate::pipeline::{Filter, Step};
    use pretty_assertions::assert_eq;

    fn container(stage: Stage, step: Step) -> Node {
        Node::Container(ContainerNode::new(stage, step))
    }

    fn step_of(node: &Node) -> &Step {
        &node.as_container().unwrap().step
    }

    #[test]
    fn test_image_name_expands_plugins() {
        let mut node = container(Stage::Notify, Step::new("slack", "slack"));
        ImageName.apply(&mut node).unwrap();
        assert_eq!(step_of(&node).image, "plugins/drone-slack:latest");
    }

    #[test]
    fn test_image_name_defaults_clone_and_cache() {
        let mut clone = container(Stage::Clone, Step::new("clone", ""));
        let mut cache = container(Stage::Cache, Step::new("cache", ""));
        ImageName.apply(&mut clone).unwrap();
        ImageName.apply(&mut cache).unwrap();
        assert_eq!(step_of(&clone).image, "plugins/drone-git:latest");
        assert_eq!(step_of(&cache).image, "plugins/drone-cache:latest");
    }

    #[test]
    fn test_image_name_keeps_build_image() {
        let mut node = container(Stage::Build, Step::new("build", "golang_dev:1.5"));
        ImageName.apply(&mut node).unwrap();
        assert_eq!(step_of(&node).image, "golang_dev:1.5");
    }

    #[test]
    fn test_image_name_rejects_empty_build_image() {
        let mut node = container(Stage::Build, Step::new("backend", " "));
        let err = ImageName.apply(&mut node).unwrap_err();
        assert_eq!(
            err,
            CompileError::MissingImage {
                step: "backend".to_string()
            }
        );
    }

    #[test]
    fn test_whitelist_rejects_foreign_plugin() {
        let mut node = container(Stage::Deploy, Step::new("deploy", "evil/ssh:latest"));
        let err = ImageWhitelist::default().apply(&mut node).unwrap_err();
        assert!(matches!(err, CompileError::NotWhitelisted { .. }));
    }

    #[test]
    fn test_whitelist_ignores_build_steps() {
        let mut node = container(Stage::Build, Step::new("build", "golang:latest"));
        assert!(ImageWhitelist::default().apply(&mut node).is_ok());
    }

    #[test]
    fn test_whitelist_exact_entry() {
        let whitelist = ImageWhitelist::new(vec!["octocat/ssh:1.0".to_string()]);
        assert!(whitelist.allows("octocat/ssh:1.0"));
        assert!(!whitelist.allows("octocat/ssh:2.0"));
    }

    #[test]
    fn test_image_pull_forced() {
        let mut node = container(Stage::Build, Step::new("build", "golang"));
        ImagePull::new(false).apply(&mut node).unwrap();
        assert!(!step_of(&node).pull);
        ImagePull::new(true).apply(&mut node).unwrap();
        assert!(step_of(&node).pull);
    }

    #[test]
    fn test_lint_requires_build_commands() {
        let mut node = container(Stage::Build, Step::new("build", "golang"));
        assert!(StepLint.apply(&mut node).is_err());

        let mut node = container(
            Stage::Build,
            Step::new("build", "golang").with_commands(["go build"]),
        );
        assert!(StepLint.apply(&mut node).is_ok());
    }

    #[test]
    fn test_lint_requires_cache_mounts() {
        let step = Step::new("cache", "").with_varg("mount", serde_json::json!([".git", 1]));
        let mut node = container(Stage::Cache, step);
        assert!(StepLint.apply(&mut node).is_err());

        let step = Step::new("cache", "").with_varg("mount", serde_json::json!([".git"]));
        let mut node = container(Stage::Cache, step);
        assert!(StepLint.apply(&mut node).is_ok());
    }

    #[test]
    fn test_cache_mount_volume() {
        let rule = CacheMount::new("/var/lib/drone/cache/", "octocat/hello-world");
        let mut node = container(Stage::Cache, Step::new("cache", ""));
        rule.apply(&mut node).unwrap();
        assert_eq!(
            step_of(&node).volumes,
            vec!["/var/lib/drone/cache/octocat/hello-world:/cache".to_string()]
        );
    }

    #[test]
    fn test_sanitize_untrusted() {
        let mut step = Step::new("build", "golang");
        step.privileged = true;
        step.volumes = vec!["/etc:/etc".to_string()];
        step.network = "host".to_string();
        step.entrypoint = vec!["/bin/bash".to_string()];
        let mut node = container(Stage::Build, step);

        Sanitize::new(false).apply(&mut node).unwrap();
        let step = step_of(&node);
        assert!(!step.privileged);
        assert!(step.volumes.is_empty());
        assert!(step.network.is_empty());
        assert!(step.entrypoint.is_empty());
    }

    #[test]
    fn test_sanitize_trusted_keeps_settings() {
        let mut step = Step::new("build", "golang");
        step.privileged = true;
        let mut node = container(Stage::Build, step);
        Sanitize::new(true).apply(&mut node).unwrap();
        assert!(step_of(&node).privileged);
    }

    #[test]
    fn test_sanitize_keeps_cache_mount() {
        let mut step = Step::new("cache", "");
        step.volumes = vec!["/var/lib/drone/cache/a/b:/cache".to_string()];
        let mut node = container(Stage::Cache, step);
        Sanitize::new(false).apply(&mut node).unwrap();
        assert_eq!(step_of(&node).volumes.len(), 1);
    }

    #[test]
    fn test_escalate_publish_docker() {
        let mut step = Step::new("docker", "plugins/drone-docker:latest");
        step.volumes = vec!["/var/run/docker.sock:/var/run/docker.sock".to_string()];
        let mut node = container(Stage::Publish, step);
        Escalate.apply(&mut node).unwrap();
        assert!(step_of(&node).privileged);
        assert!(step_of(&node).volumes.is_empty());
    }

    #[test]
    fn test_escalate_only_publish_stage() {
        let mut node = container(Stage::Deploy, Step::new("docker", "plugins/drone-docker"));
        Escalate.apply(&mut node).unwrap();
        assert!(!step_of(&node).privileged);
    }

    #[test]
    fn test_http_proxy_does_not_override() {
        let rule = HttpProxy::new(vec![
            ("HTTP_PROXY".to_string(), "http://proxy:3128".to_string()),
            ("no_proxy".to_string(), "localhost".to_string()),
        ]);
        let mut step = Step::new("build", "golang");
        step.environment = vec!["HTTP_PROXY=http://mine:8080".to_string()];
        let mut node = container(Stage::Build, step);
        rule.apply(&mut node).unwrap();
        assert_eq!(
            step_of(&node).environment,
            vec![
                "HTTP_PROXY=http://mine:8080".to_string(),
                "no_proxy=localhost".to_string()
            ]
        );
    }

    #[test]
    fn test_default_notify_filter() {
        let leaf = container(Stage::Notify, Step::new("slack", "slack"));
        let mut node = Node::Filter(FilterNode::new(Filter::default(), leaf));
        DefaultNotifyFilter.apply(&mut node).unwrap();
        let Node::Filter(filter) = &node else {
            panic!("expected filter");
        };
        assert_eq!(filter.filter.event, vec![EventKind::Push, EventKind::Tag]);
    }

    #[test]
    fn test_default_notify_filter_keeps_explicit_events() {
        let leaf = container(Stage::Notify, Step::new("slack", "slack"));
        let filter = Filter::default().with_event(EventKind::PullRequest);
        let mut node = Node::Filter(FilterNode::new(filter, leaf));
        DefaultNotifyFilter.apply(&mut node).unwrap();
        let Node::Filter(filter) = &node else {
            panic!("expected filter");
        };
        assert_eq!(filter.filter.event, vec![EventKind::PullRequest]);
    }

    #[test]
    fn test_standard_rule_order() {
        let rules = RuleSet::standard(&RuleOptions::default());
        assert_eq!(
            rules.names(),
            vec![
                "image-name",
                "image-whitelist",
                "image-pull",
                "step-lint",
                "cache-mount",
                "sanitize",
                "escalate",
                "http-proxy",
                "default-notify-filter",
            ]
        );
    }
}
