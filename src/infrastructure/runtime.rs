//! Container runtime seam
//!
//! The executor talks to containers only through [`ContainerRuntime`];
//! the docker adapter and test doubles implement it.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::AuthConfig;

/// Errors reported by a container runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The runtime could not be reached
    #[error("connection failed: {reason}")]
    Connection {
        /// Underlying cause.
        reason: String,
    },

    /// The image could not be pulled
    #[error("unable to pull image {image}: {reason}")]
    Pull {
        /// Image reference.
        image: String,
        /// Underlying cause.
        reason: String,
    },

    /// Container creation was rejected
    #[error("unable to create container {name}: {reason}")]
    Create {
        /// Requested container name.
        name: String,
        /// Underlying cause.
        reason: String,
    },

    /// The container does not exist
    #[error("container not found: {id}")]
    NotFound {
        /// Container id or name.
        id: String,
    },

    /// Any other runtime operation failure
    #[error("{operation} failed for container {id}: {reason}")]
    Operation {
        /// Operation name, for example `start`.
        operation: &'static str,
        /// Container id or name.
        id: String,
        /// Underlying cause.
        reason: String,
    },

    /// The build exceeded its time limit
    #[error("container timeout")]
    Timeout,

    /// The build was cancelled
    #[error("container cancelled")]
    Cancelled,
}

impl RuntimeError {
    /// Builds an [`RuntimeError::Operation`] error
    pub fn operation(operation: &'static str, id: &str, reason: impl ToString) -> Self {
        Self::Operation {
            operation,
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result alias for runtime calls
pub type RuntimeResult<T = ()> = Result<T, RuntimeError>;

/// Everything needed to create one container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name
    pub name: String,
    /// Image reference
    pub image: String,
    /// Environment in `KEY=VALUE` form
    pub env: Vec<String>,
    /// Entrypoint override
    pub entrypoint: Vec<String>,
    /// Command
    pub cmd: Vec<String>,
    /// Working directory
    pub working_dir: String,
    /// Privileged mode
    pub privileged: bool,
    /// Network mode, empty for the runtime default
    pub network_mode: String,
    /// Host bind mounts in `host:container` form
    pub binds: Vec<String>,
    /// Anonymous volumes
    pub volumes: Vec<String>,
    /// Extra `/etc/hosts` entries
    pub extra_hosts: Vec<String>,
}

/// Observed container state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerState {
    /// Exit code, meaningful once stopped
    pub exit_code: i32,
    /// Whether the container is still running
    pub running: bool,
}

/// Container runtime operations used by the executor
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime name, for logs
    fn name(&self) -> &str;

    /// Pulls an image, authenticating when `auth` is given
    async fn pull_image(&self, image: &str, auth: Option<&AuthConfig>) -> RuntimeResult;

    /// Creates a container and returns its id
    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String>;

    /// Starts a created container
    async fn start_container(&self, id: &str) -> RuntimeResult;

    /// Reads the container state
    async fn inspect_container(&self, id: &str) -> RuntimeResult<ContainerState>;

    /// Copies the container output to the build log until it exits
    async fn follow_logs(&self, id: &str) -> RuntimeResult;

    /// Stops a container, killing it after `grace`
    async fn stop_container(&self, id: &str, grace: Duration) -> RuntimeResult;

    /// Kills a container
    async fn kill_container(&self, id: &str) -> RuntimeResult;

    /// Force-removes a container and its volumes
    async fn remove_container(&self, id: &str) -> RuntimeResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_error_message() {
        let err = RuntimeError::operation("start", "abc123", "no such image");
        assert_eq!(
            err.to_string(),
            "start failed for container abc123: no such image"
        );
    }

    #[test]
    fn test_container_state_default() {
        let state = ContainerState::default();
        assert_eq!(state.exit_code, 0);
        assert!(!state.running);
    }
}
