//! Host build descriptors
//!
//! Read-only descriptors supplied by the embedding platform. Their JSON
//! field names are the plugin protocol and must stay stable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::BuildStatus;

/// Repository being built
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repo {
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub name: String,
    /// Full name in `owner/name` form
    pub full_name: String,
    /// Web link to the repository
    #[serde(rename = "link_url")]
    pub link: String,
    /// Clone URL
    pub clone_url: String,
    /// Whether the repository is private
    #[serde(rename = "private")]
    pub is_private: bool,
    /// Whether the repository may run privileged steps
    #[serde(rename = "trusted")]
    pub is_trusted: bool,
    /// Build timeout in minutes, 0 for the host default
    pub timeout: u64,
}

/// Commit the build runs against
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commit {
    /// Commit hash
    pub sha: String,
    /// Full git ref, e.g. `refs/heads/master`
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Branch name
    pub branch: String,
    /// Link to the commit
    pub link_url: String,
    /// Commit message
    pub message: String,
    /// Commit author
    pub author: Author,
}

/// Commit author
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Author {
    /// Login name
    pub login: String,
    /// Email address
    pub email: String,
}

/// Pull request the build was triggered by
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullRequest {
    /// Pull request number
    pub number: u64,
    /// Link to the pull request
    #[serde(rename = "link_url")]
    pub link: String,
}

/// Build being executed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Build {
    /// Build number
    pub number: u64,
    /// Aggregate build status
    pub status: BuildStatus,
    /// Start timestamp (unix seconds)
    pub started_at: i64,
    /// Finish timestamp (unix seconds)
    pub finished_at: i64,
    /// Commit details
    pub commit: Commit,
    /// Pull request details, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequest>,
}

/// One job of a (possibly matrix) build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    /// Job id
    pub id: u64,
    /// Job number within the build
    pub number: u64,
    /// Job status
    pub status: BuildStatus,
    /// Exit code of the job
    pub exit_code: i32,
    /// Matrix axis of this job
    pub environment: BTreeMap<String, String>,
}

/// Platform-wide settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct System {
    /// Platform version
    pub version: String,
    /// Public link to the platform
    pub link_url: String,
    /// Plugin whitelist patterns
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<String>,
    /// Global `KEY=VALUE` parameters
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub globals: Vec<String>,
}

/// `.netrc` credentials for private clones
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Netrc {
    /// Machine host name
    pub machine: String,
    /// Login name
    pub login: String,
    /// Password or token
    #[serde(rename = "user")]
    pub password: String,
}

/// SSH key pair for private clones
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Keypair {
    /// Public key
    pub public: String,
    /// Private key
    pub private: String,
}

/// Build workspace inside the containers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workspace {
    /// Workspace root
    pub root: String,
    /// Clone path
    pub path: String,
    /// Netrc credentials
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netrc: Option<Netrc>,
    /// SSH keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Keypair>,
}
