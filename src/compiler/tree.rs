//! Pipeline to tree compilation

use tracing::debug;

use super::errors::CompileError;
use super::node::{ContainerNode, FilterNode, ListNode, Node, Tree};
use super::rules::RuleSet;
use crate::pipeline::{Config, Plugin, Stage, Step};

/// Compiles a pipeline into an executable tree.
///
/// Stages are appended in the fixed order cache, clone, compose, build,
/// publish, deploy, notify. The cache step is omitted when it has no
/// arguments; the clone step is always present. Plugin steps are wrapped
/// in a guard built from their filter. Any rule error aborts compilation.
pub fn compile(config: &Config, rules: &RuleSet) -> Result<Tree, CompileError> {
    let mut builder = TreeBuilder {
        rules,
        root: ListNode::default(),
    };

    if !config.cache.step.vargs.is_empty() {
        builder.plugin(Stage::Cache, &config.cache)?;
    }
    builder.plugin(Stage::Clone, &config.clone)?;

    for step in &config.compose {
        builder.container(Stage::Compose, step)?;
    }
    for step in &config.build {
        builder.container(Stage::Build, step)?;
    }
    for (stage, plugins) in [
        (Stage::Publish, &config.publish),
        (Stage::Deploy, &config.deploy),
        (Stage::Notify, &config.notify),
    ] {
        for plugin in plugins {
            builder.plugin(stage, plugin)?;
        }
    }

    debug!(nodes = builder.root.len(), "Compiled pipeline");
    Ok(Tree { root: builder.root })
}

struct TreeBuilder<'a> {
    rules: &'a RuleSet,
    root: ListNode,
}

impl TreeBuilder<'_> {
    fn leaf(&self, stage: Stage, step: &Step) -> Result<Node, CompileError> {
        let mut step = step.clone();
        if step.name.is_empty() {
            step.name = stage.as_str().to_string();
        }
        let mut node = Node::Container(ContainerNode::new(stage, step));
        self.rules.apply(&mut node)?;
        Ok(node)
    }

    fn container(&mut self, stage: Stage, step: &Step) -> Result<(), CompileError> {
        let node = self.leaf(stage, step)?;
        self.root.push(node);
        Ok(())
    }

    fn plugin(&mut self, stage: Stage, plugin: &Plugin) -> Result<(), CompileError> {
        let leaf = self.leaf(stage, &plugin.step)?;
        let mut node = Node::Filter(FilterNode::new(plugin.filter.clone(), leaf));
        self.rules.apply(&mut node)?;
        self.root.push(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::rules::{RuleOptions, RuleSet};
    use crate::pipeline::{EventKind, Filter};
    use pretty_assertions::assert_eq;

    fn sample() -> Config {
        Config {
            cache: Plugin::new(Step::default().with_varg("mount", serde_json::json!([".git"]))),
            build: vec![Step::new("build", "golang").with_commands(["go build", "go test"])],
            compose: vec![Step::new("database", "postgres")],
            publish: vec![Plugin::new(Step::new("docker", "docker"))],
            deploy: vec![
                Plugin::new(Step::new("heroku", "heroku"))
                    .with_filter(Filter::default().with_branch("master")),
            ],
            notify: vec![Plugin::new(Step::new("slack", "slack"))],
            ..Config::default()
        }
    }

    fn standard() -> RuleSet {
        RuleSet::standard(&RuleOptions {
            repo: "octocat/hello-world".to_string(),
            ..RuleOptions::default()
        })
    }

    #[test]
    fn test_stage_order() {
        let tree = compile(&sample(), &standard()).unwrap();
        let stages: Vec<_> = tree.containers().iter().map(|c| c.stage()).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Cache,
                Stage::Clone,
                Stage::Compose,
                Stage::Build,
                Stage::Publish,
                Stage::Deploy,
                Stage::Notify,
            ]
        );
    }

    #[test]
    fn test_cache_skipped_without_arguments() {
        let config = Config {
            cache: Plugin::default(),
            ..sample()
        };
        let tree = compile(&config, &standard()).unwrap();
        assert_eq!(tree.containers()[0].stage(), Stage::Clone);
    }

    #[test]
    fn test_clone_always_present() {
        let config = Config {
            build: vec![Step::new("build", "golang").with_commands(["make"])],
            ..Config::default()
        };
        let tree = compile(&config, &standard()).unwrap();
        let clone = tree.containers()[0];
        assert_eq!(clone.stage(), Stage::Clone);
        assert_eq!(clone.step.name, "clone");
        assert_eq!(clone.step.image, "plugins/drone-git:latest");
    }

    #[test]
    fn test_plugins_wrapped_builds_not() {
        let tree = compile(&sample(), &standard()).unwrap();
        let kinds: Vec<_> = tree
            .root()
            .nodes
            .iter()
            .map(|n| matches!(n, Node::Filter(_)))
            .collect();
        assert_eq!(kinds, vec![true, true, false, false, true, true, true]);
    }

    #[test]
    fn test_notify_gets_default_events() {
        let tree = compile(&sample(), &standard()).unwrap();
        let Some(Node::Filter(notify)) = tree.root().nodes.last() else {
            panic!("expected filter");
        };
        assert_eq!(notify.filter.event, vec![EventKind::Push, EventKind::Tag]);
    }

    #[test]
    fn test_cache_volume_mounted() {
        let tree = compile(&sample(), &standard()).unwrap();
        assert_eq!(
            tree.containers()[0].step.volumes,
            vec!["/var/lib/drone/cache/octocat/hello-world:/cache".to_string()]
        );
    }

    #[test]
    fn test_rule_error_aborts() {
        let mut config = sample();
        config.build.push(Step::new("broken", ""));
        let err = compile(&config, &standard()).unwrap_err();
        assert_eq!(
            err,
            CompileError::MissingImage {
                step: "broken".to_string()
            }
        );
    }

    #[test]
    fn test_whitelist_error_aborts() {
        let mut config = sample();
        config.deploy = vec![Plugin::new(Step::new("evil", "evil/deploy"))];
        let err = compile(&config, &standard()).unwrap_err();
        assert!(matches!(err, CompileError::NotWhitelisted { .. }));
    }

    #[test]
    fn test_empty_rule_set_keeps_steps() {
        let tree = compile(&sample(), &RuleSet::new()).unwrap();
        let build = tree
            .containers()
            .into_iter()
            .find(|c| c.stage() == Stage::Build)
            .unwrap();
        assert_eq!(build.step.image, "golang");
    }
}
