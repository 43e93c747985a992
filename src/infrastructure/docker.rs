//! Docker runtime
//!
//! [`ContainerRuntime`] over the Docker Engine API using bollard.

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::runtime::{ContainerRuntime, ContainerSpec, ContainerState, RuntimeError, RuntimeResult};
use crate::pipeline::AuthConfig;

/// Docker Engine runtime
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connects using `DOCKER_HOST` or the local socket
    pub fn connect() -> RuntimeResult<Self> {
        let client =
            Docker::connect_with_local_defaults().map_err(|e| RuntimeError::Connection {
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

fn map_err(operation: &'static str, id: &str, err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound { id: id.to_string() },
        other => RuntimeError::operation(operation, id, other),
    }
}

fn credentials(auth: &AuthConfig) -> DockerCredentials {
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    DockerCredentials {
        username: non_empty(&auth.username),
        password: non_empty(&auth.password),
        email: non_empty(&auth.email),
        registrytoken: non_empty(&auth.registry_token),
        ..Default::default()
    }
}

fn container_config(spec: &ContainerSpec) -> Config<String> {
    let some_vec = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());
    let volumes: HashMap<String, HashMap<(), ()>> = spec
        .volumes
        .iter()
        .map(|v| (v.clone(), HashMap::new()))
        .collect();

    Config {
        image: Some(spec.image.clone()),
        env: some_vec(&spec.env),
        entrypoint: some_vec(&spec.entrypoint),
        cmd: some_vec(&spec.cmd),
        working_dir: (!spec.working_dir.is_empty()).then(|| spec.working_dir.clone()),
        volumes: (!volumes.is_empty()).then_some(volumes),
        host_config: Some(HostConfig {
            privileged: Some(spec.privileged),
            network_mode: (!spec.network_mode.is_empty()).then(|| spec.network_mode.clone()),
            binds: some_vec(&spec.binds),
            extra_hosts: some_vec(&spec.extra_hosts),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn pull_image(&self, image: &str, auth: Option<&AuthConfig>) -> RuntimeResult {
        debug!(image = %image, "Pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut stream = self
            .client
            .create_image(Some(options), None, auth.map(credentials));

        while let Some(progress) = stream.next().await {
            progress.map_err(|e| RuntimeError::Pull {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let response = self
            .client
            .create_container(Some(options), container_config(spec))
            .await
            .map_err(|e| RuntimeError::Create {
                name: spec.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> RuntimeResult {
        self.client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_err("start", id, e))
    }

    async fn inspect_container(&self, id: &str) -> RuntimeResult<ContainerState> {
        let info = self
            .client
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_err("inspect", id, e))?;

        let state = info.state.unwrap_or_default();
        Ok(ContainerState {
            exit_code: state
                .exit_code
                .and_then(|c| i32::try_from(c).ok())
                .unwrap_or_default(),
            running: state.running.unwrap_or_default(),
        })
    }

    async fn follow_logs(&self, id: &str) -> RuntimeResult {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        let mut stream = self.client.logs(id, Some(options));
        let mut stdout = tokio::io::stdout();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_err("logs", id, e))?;
            stdout
                .write_all(&chunk.into_bytes())
                .await
                .map_err(|e| RuntimeError::operation("logs", id, e))?;
        }
        stdout
            .flush()
            .await
            .map_err(|e| RuntimeError::operation("logs", id, e))
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> RuntimeResult {
        let t = i64::try_from(grace.as_secs()).unwrap_or(i64::MAX);
        self.client
            .stop_container(id, Some(StopContainerOptions { t }))
            .await
            .map_err(|e| map_err("stop", id, e))
    }

    async fn kill_container(&self, id: &str) -> RuntimeResult {
        self.client
            .kill_container(id, Some(KillContainerOptions { signal: "SIGKILL" }))
            .await
            .map_err(|e| map_err("kill", id, e))
    }

    async fn remove_container(&self, id: &str) -> RuntimeResult {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.client
            .remove_container(id, Some(options))
            .await
            .map_err(|e| map_err("remove", id, e))
    }
}
