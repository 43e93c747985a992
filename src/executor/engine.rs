//! Tree walker
//!
//! Walks a compiled tree for a selected set of stages. Step failures are
//! recorded in the [`ExecutionState`] and never stop the walk, so later
//! stages can still observe a failed build. Only cancellation and the
//! build deadline end a walk early.

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info, warn};

use super::condition::matches;
use super::container::{self, container_spec, registry_auth};
use super::errors::ExecError;
use super::payload::{plugin_command, to_env};
use super::script::{ENTRYPOINT, ScriptOptions, encode};
use super::state::{ExecutionState, RUNTIME_FAILURE_CODE};
use crate::compiler::{ContainerNode, Node, Tree};
use crate::infrastructure::{ContainerState, RuntimeError, RuntimeResult};
use crate::pipeline::{Stage, StageSet};

/// Runs a compiled tree, one stage selection at a time
#[derive(Debug, Clone, Copy)]
pub struct Engine<'t> {
    tree: &'t Tree,
}

impl<'t> Engine<'t> {
    /// Creates an engine over `tree`
    #[must_use]
    pub fn new(tree: &'t Tree) -> Self {
        Self { tree }
    }

    /// Walks the tree, running only containers whose stage is in `stages`.
    ///
    /// An empty selection runs every stage.
    pub async fn run(&self, state: &ExecutionState, stages: StageSet) -> Result<(), ExecError> {
        debug!(stages = stages.bits(), "Walking pipeline");
        for node in &self.tree.root().nodes {
            walk(node, state, stages).await?;
        }
        Ok(())
    }
}

fn walk<'a>(
    node: &'a Node,
    state: &'a ExecutionState,
    stages: StageSet,
) -> BoxFuture<'a, Result<(), ExecError>> {
    async move {
        match node {
            Node::List(list) => {
                for child in &list.nodes {
                    walk(child, state, stages).await?;
                }
                Ok(())
            }
            Node::Filter(filter) => {
                if matches(&filter.filter, &state.context()) {
                    walk(filter.node(), state, stages).await
                } else {
                    debug!(stage = ?filter.guarded_stage(), "Filter did not match, skipping");
                    Ok(())
                }
            }
            Node::Container(container) => run_container(container, state, stages).await,
        }
    }
    .boxed()
}

async fn run_container(
    node: &ContainerNode,
    state: &ExecutionState,
    stages: StageSet,
) -> Result<(), ExecError> {
    let stage = node.stage();
    let step = &node.step;
    if !stages.includes(stage) || step.image.is_empty() {
        return Ok(());
    }
    interrupted(state)?;

    let auth = registry_auth(step);
    match stage {
        Stage::Build => {
            if state.failed() {
                debug!(step = %step.name, "Build already failed, skipping");
                return Ok(());
            }
            info!(stage = %stage, step = %step.name, image = %step.image, "Running build step");

            let mut spec = container_spec(stage, step);
            spec.env.extend(to_env(state));
            spec.working_dir = state.workspace.path.clone();
            spec.entrypoint = ENTRYPOINT.iter().map(ToString::to_string).collect();

            let workspace = state.repo.is_private.then_some(&state.workspace);
            let options = ScriptOptions {
                disable_apt_config: step.disable_apt_config,
            };
            spec.cmd = vec![encode(workspace, &step.commands, options)];

            settle(state, container::run(state, &spec, step.pull, auth).await)
        }
        Stage::Compose => {
            info!(stage = %stage, step = %step.name, image = %step.image, "Starting service");
            let spec = container_spec(stage, step);
            match container::start_detached(state, &spec, step.pull, auth).await {
                Ok(_) => Ok(()),
                Err(e) => settle(state, Err(e)),
            }
        }
        _ => {
            info!(stage = %stage, step = %step.name, image = %step.image, "Running plugin");
            let mut spec = container_spec(stage, step);
            match plugin_command(state, &step.vargs) {
                Ok(cmd) => spec.cmd = cmd,
                Err(e) => {
                    warn!(step = %step.name, error = %e, "Unable to encode plugin payload");
                    state.record_failure(RUNTIME_FAILURE_CODE);
                    return Ok(());
                }
            }
            settle(state, container::run(state, &spec, step.pull, auth).await)
        }
    }
}

/// Stops the walk once the build is cancelled or past its deadline
fn interrupted(state: &ExecutionState) -> Result<(), ExecError> {
    if state.cancel_token().is_cancelled() {
        return Err(abort(state, ExecError::Cancelled));
    }
    if state.timed_out() {
        return Err(abort(state, ExecError::Timeout));
    }
    Ok(())
}

fn abort(state: &ExecutionState, err: ExecError) -> ExecError {
    state.record_failure(err.exit_code());
    err
}

/// Records the outcome of one container run
fn settle(state: &ExecutionState, result: RuntimeResult<ContainerState>) -> Result<(), ExecError> {
    match result {
        Ok(container) => {
            if container.exit_code != 0 {
                info!(exit_code = container.exit_code, "Step failed");
            }
            state.record_failure(container.exit_code);
            Ok(())
        }
        Err(RuntimeError::Cancelled) => Err(abort(state, ExecError::Cancelled)),
        Err(RuntimeError::Timeout) => Err(abort(state, ExecError::Timeout)),
        Err(e) => {
            warn!(error = %e, "Container runtime error");
            state.record_failure(RUNTIME_FAILURE_CODE);
            Ok(())
        }
    }
}
