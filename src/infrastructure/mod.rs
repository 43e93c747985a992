//! Infrastructure layer
//!
//! Host configuration, logging and the container runtime seam.

pub mod config;
#[cfg(feature = "docker")]
pub mod docker;
pub mod logging;
pub mod runtime;

pub use config::Config;
#[cfg(feature = "docker")]
pub use docker::DockerRuntime;
pub use logging::init_logging;
pub use runtime::{ContainerRuntime, ContainerSpec, ContainerState, RuntimeError, RuntimeResult};
