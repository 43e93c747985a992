//! # pipexec - container step execution for CI pipelines
//!
//! pipexec takes a declarative pipeline document plus the build, repository
//! and job descriptors handed over by a CI host, compiles it into a tree of
//! container steps and runs those steps against a container runtime.
//!
//! ## Features
//!
//! - **Rule pipeline**: image expansion, whitelisting, cache mounts,
//!   sanitizing and privilege escalation applied before anything runs
//! - **Conditional plugins**: branch, event, matrix and outcome filters
//! - **Script encoding**: build commands shipped as one base64 shell script
//! - **Secret gate**: secrets only substituted into checksum-verified pipelines
//!
//! ## Layout
//!
//! - [`pipeline`]: typed pipeline model and host descriptors
//! - [`compiler`]: rules and the tree compiler
//! - [`executor`]: condition evaluation, scripts and the execution engine
//! - [`secure`]: checksum verification and secret substitution
//! - [`infrastructure`]: host configuration, logging and the runtime seam
//! - [`runner`]: stage walk orchestration

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod compiler;
pub mod executor;
pub mod infrastructure;
pub mod pipeline;
pub mod runner;
pub mod secure;

// Re-export commonly used types
pub use compiler::{CompileError, RuleOptions, RuleSet, Tree, compile};
pub use executor::{Engine, ExecError, ExecutionState};
pub use infrastructure::{ContainerRuntime, ContainerSpec, ContainerState, RuntimeError};
pub use pipeline::{Config, Stage, StageSet, Step};
pub use runner::{Payload, StageFlags};

/// Version of the pipexec crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
