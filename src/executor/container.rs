//! Container run policy
//!
//! Lifecycle rules layered over a [`ContainerRuntime`]: when to pull, how
//! creation is retried, how a run is awaited and how it is always torn
//! down afterwards.

use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::state::ExecutionState;
use crate::compiler::image::is_escalated;
use crate::infrastructure::{
    ContainerRuntime, ContainerSpec, ContainerState, RuntimeError, RuntimeResult,
};
use crate::pipeline::{AuthConfig, Stage, Step};

const PLUGIN_NAMESPACE: &str = "plugins/";

/// Unique container name for one run
#[must_use]
pub fn container_name() -> String {
    format!("pipexec-{}", Uuid::new_v4().simple())
}

/// Registry credentials, only when a password or token is present
#[must_use]
pub fn registry_auth(step: &Step) -> Option<&AuthConfig> {
    step.auth_config.is_set().then_some(&step.auth_config)
}

/// Builds the container settings for a step.
///
/// Only `host:container` volume entries become bind mounts. Escalated
/// publish images get unrestricted privileged mode here; the step itself
/// is left untouched.
#[must_use]
pub fn container_spec(stage: Stage, step: &Step) -> ContainerSpec {
    let mut spec = ContainerSpec {
        name: container_name(),
        image: step.image.clone(),
        env: step.environment.clone(),
        entrypoint: step.entrypoint.clone(),
        cmd: step.command.clone(),
        privileged: step.privileged,
        network_mode: step.network.clone(),
        extra_hosts: step.extra_hosts.clone(),
        ..ContainerSpec::default()
    };

    for volume in &step.volumes {
        if let Some(target) = volume.split(':').nth(1) {
            spec.volumes.push(target.to_string());
            spec.binds.push(volume.clone());
        }
    }

    if stage == Stage::Publish && is_escalated(&step.image) {
        escalate(&mut spec);
    }
    spec
}

/// Unrestricted privileged mode with no host mounts
pub fn escalate(spec: &mut ContainerSpec) {
    spec.privileged = true;
    spec.volumes.clear();
    spec.binds.clear();
    spec.network_mode.clear();
    spec.entrypoint.clear();
}

/// Runs a container to completion and returns its final state.
///
/// The container is stopped and killed on every path once it exists.
/// The wait ends early on cancellation or when the build deadline passes.
pub async fn run(
    state: &ExecutionState,
    spec: &ContainerSpec,
    pull: bool,
    auth: Option<&AuthConfig>,
) -> RuntimeResult<ContainerState> {
    let runtime = state.runtime();
    let id = create(state, spec, pull, auth).await?;

    let result = match runtime.inspect_container(&id).await {
        Ok(_) => wait(state, &id).await,
        Err(e) => {
            error!(image = %spec.image, error = %e, "Error inspecting container");
            remove(runtime, &id).await;
            Err(e)
        }
    };

    if let Err(e) = runtime.stop_container(&id, state.stop_grace()).await {
        debug!(container = %id, error = %e, "Stop failed");
    }
    if let Err(e) = runtime.kill_container(&id).await {
        debug!(container = %id, error = %e, "Kill failed");
    }
    result
}

/// Starts a container without waiting for it and returns its id
pub async fn start_detached(
    state: &ExecutionState,
    spec: &ContainerSpec,
    pull: bool,
    auth: Option<&AuthConfig>,
) -> RuntimeResult<String> {
    let runtime = state.runtime();
    let id = create(state, spec, pull, auth).await?;

    if let Err(e) = runtime.inspect_container(&id).await {
        error!(image = %spec.image, error = %e, "Error inspecting container");
        remove(runtime, &id).await;
        return Err(e);
    }
    if let Err(e) = runtime.start_container(&id).await {
        error!(image = %spec.image, error = %e, "Error starting container");
        return Err(e);
    }
    Ok(id)
}

/// Removes every container created during the build
pub async fn destroy(state: &ExecutionState) {
    let runtime = state.runtime();
    for id in state.take_containers() {
        remove(runtime, &id).await;
    }
}

/// Pulls and creates, giving up on cancellation or at the deadline.
///
/// An interrupted creation removes whatever container may exist under
/// the spec's name.
async fn create(
    state: &ExecutionState,
    spec: &ContainerSpec,
    pull: bool,
    auth: Option<&AuthConfig>,
) -> RuntimeResult<String> {
    match interruptible(state, try_create(state, spec, pull, auth)).await {
        Err(e @ (RuntimeError::Cancelled | RuntimeError::Timeout)) => {
            warn!(image = %spec.image, error = %e, "Container creation interrupted");
            remove(state.runtime(), &spec.name).await;
            Err(e)
        }
        other => other,
    }
}

async fn try_create(
    state: &ExecutionState,
    spec: &ContainerSpec,
    pull: bool,
    auth: Option<&AuthConfig>,
) -> RuntimeResult<String> {
    let runtime = state.runtime();

    if pull || spec.image.starts_with(PLUGIN_NAMESPACE) {
        if let Err(e) = runtime.pull_image(&spec.image, auth).await {
            warn!(image = %spec.image, error = %e, "Pull failed, using local image");
        }
    }

    let id = match runtime.create_container(spec).await {
        Ok(id) => id,
        Err(first) => {
            debug!(image = %spec.image, error = %first, "Create failed, pulling and retrying");
            if let Err(e) = runtime.pull_image(&spec.image, auth).await {
                error!(image = %spec.image, error = %e, "Error pulling image");
                return Err(e);
            }
            match runtime.create_container(spec).await {
                Ok(id) => id,
                Err(e) => {
                    error!(image = %spec.image, error = %e, "Error creating container");
                    remove(runtime, &spec.name).await;
                    return Err(e);
                }
            }
        }
    };

    state.track_container(&id);
    Ok(id)
}

async fn wait(state: &ExecutionState, id: &str) -> RuntimeResult<ContainerState> {
    let (tx, rx) = oneshot::channel();
    let worker = tokio::spawn(watch(state.runtime_handle(), id.to_string(), tx));

    let finished = async {
        rx.await
            .unwrap_or_else(|_| Err(RuntimeError::operation("wait", id, "worker stopped")))
    };
    let result = interruptible(state, finished).await;

    worker.abort();
    result
}

/// Races `work` against cancellation and the build deadline
async fn interruptible<T>(
    state: &ExecutionState,
    work: impl Future<Output = RuntimeResult<T>>,
) -> RuntimeResult<T> {
    let deadline = state.deadline();
    let expired = async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = work => result,
        () = state.cancel_token().cancelled() => Err(RuntimeError::Cancelled),
        () = expired => Err(RuntimeError::Timeout),
    }
}

async fn watch(
    runtime: Arc<dyn ContainerRuntime>,
    id: String,
    tx: oneshot::Sender<RuntimeResult<ContainerState>>,
) {
    let result = async {
        runtime.start_container(&id).await?;
        runtime.follow_logs(&id).await?;
        runtime.inspect_container(&id).await
    }
    .await;

    if let Err(e) = &result {
        error!(container = %id, error = %e, "Container run failed");
    }
    let _ = tx.send(result);
}

async fn remove(runtime: &dyn ContainerRuntime, id: &str) {
    if let Err(e) = runtime.remove_container(id).await {
        debug!(container = %id, error = %e, "Remove failed");
    }
}
