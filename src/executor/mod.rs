//! Pipeline execution
//!
//! Walks a compiled tree against a container runtime. Filters are
//! evaluated against the build, build steps run as encoded shell scripts
//! and plugins receive the build as a JSON payload.

pub mod condition;
pub mod container;
pub mod engine;
pub mod errors;
pub mod payload;
pub mod script;
pub mod state;

pub use condition::{BuildContext, matches};
pub use engine::Engine;
pub use errors::ExecError;
pub use state::{ExecutionState, RUNTIME_FAILURE_CODE};
