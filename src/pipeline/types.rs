//! Core types for pipeline domain
//!
//! Stage identities, the stage-selection mask used by callers, build
//! event kinds and build outcomes.

#![allow(clippy::must_use_candidate)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use super::context::Build;
use super::errors::ParseError;

/// A named phase of the pipeline.
///
/// Variants are listed in the order the compiler emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Restores or saves the build cache
    Cache,
    /// Clones the repository into the workspace
    Clone,
    /// Detached service containers
    Compose,
    /// User build commands
    Build,
    /// Publishes artifacts
    Publish,
    /// Deploys artifacts
    Deploy,
    /// Sends notifications
    Notify,
}

impl Stage {
    /// All stages in compile order
    pub const ALL: [Stage; 7] = [
        Stage::Cache,
        Stage::Clone,
        Stage::Compose,
        Stage::Build,
        Stage::Publish,
        Stage::Deploy,
        Stage::Notify,
    ];

    /// Bit of this stage inside a [`StageSet`]
    pub const fn bit(self) -> u32 {
        match self {
            Stage::Cache => 1 << 0,
            Stage::Clone => 1 << 1,
            Stage::Compose => 1 << 2,
            Stage::Build => 1 << 3,
            Stage::Publish => 1 << 4,
            Stage::Deploy => 1 << 5,
            Stage::Notify => 1 << 6,
        }
    }

    /// Returns true for stages whose steps are plugins
    pub fn is_plugin(self) -> bool {
        !matches!(self, Stage::Build | Stage::Compose)
    }

    /// Lowercase stage name
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Cache => "cache",
            Stage::Clone => "clone",
            Stage::Compose => "compose",
            Stage::Build => "build",
            Stage::Publish => "publish",
            Stage::Deploy => "deploy",
            Stage::Notify => "notify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of stages selected for one walk of the tree.
///
/// Stages combine with `|`. The empty set selects every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StageSet(u32);

impl StageSet {
    /// Selects every stage
    pub const EVERY: StageSet = StageSet(0);

    /// Raw bit value
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true when nothing was explicitly selected
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if steps of `stage` run under this selection
    pub const fn includes(self, stage: Stage) -> bool {
        self.0 == 0 || self.0 & stage.bit() != 0
    }
}

impl From<Stage> for StageSet {
    fn from(stage: Stage) -> Self {
        Self(stage.bit())
    }
}

impl BitOr for Stage {
    type Output = StageSet;

    fn bitor(self, rhs: Stage) -> StageSet {
        StageSet(self.bit() | rhs.bit())
    }
}

impl BitOr<Stage> for StageSet {
    type Output = StageSet;

    fn bitor(self, rhs: Stage) -> StageSet {
        StageSet(self.0 | rhs.bit())
    }
}

impl BitOr for StageSet {
    type Output = StageSet;

    fn bitor(self, rhs: StageSet) -> StageSet {
        StageSet(self.0 | rhs.0)
    }
}

impl BitOrAssign<Stage> for StageSet {
    fn bitor_assign(&mut self, rhs: Stage) {
        self.0 |= rhs.bit();
    }
}

/// Kind of repository event that triggered the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Branch push
    Push,
    /// Pull request opened or synchronized
    PullRequest,
    /// Tag push
    Tag,
}

impl EventKind {
    /// Derives the event kind from a build descriptor.
    ///
    /// An attached pull request wins, then a `refs/tags` ref, else push.
    pub fn classify(build: &Build) -> Self {
        if build.pull_request.is_some() {
            EventKind::PullRequest
        } else if build.commit.git_ref.starts_with("refs/tags") {
            EventKind::Tag
        } else {
            EventKind::Push
        }
    }

    /// Wire name of the event
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
            EventKind::Tag => "tag",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(EventKind::Push),
            "pull_request" => Ok(EventKind::PullRequest),
            "tag" => Ok(EventKind::Tag),
            other => Err(ParseError::UnknownEvent(other.to_string())),
        }
    }
}

/// Aggregate status of a build or job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    /// Waiting to run
    #[default]
    Pending,
    /// Currently running
    Running,
    /// Completed successfully
    Success,
    /// Completed with a failing step
    Failure,
    /// Cancelled or timed out
    Killed,
    /// Infrastructure error
    Error,
}

impl BuildStatus {
    /// Returns true if status is successful
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Killed => write!(f, "killed"),
            Self::Error => write!(f, "error"),
        }
    }
}
