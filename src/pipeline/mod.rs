//! Pipeline domain types
//!
//! The typed pipeline description, host build descriptors and the small
//! enums shared by the compiler and the executor.

pub mod config;
pub mod context;
pub mod errors;
pub mod types;
pub mod workspace;
mod yaml;

pub use config::{AuthConfig, Config, Filter, Plugin, Step, Vargs, image_base};
pub use context::{
    Author, Build, Commit, Job, Keypair, Netrc, PullRequest, Repo, System, Workspace,
};
pub use errors::ParseError;
pub use types::{BuildStatus, EventKind, Stage, StageSet};
pub use workspace::{DEFAULT_WORKSPACE_ROOT, workspace_path};
