//! Filter evaluation
//!
//! Decides whether a guarded step runs for the current build. Every axis
//! is an independent predicate and all of them must hold; an unconstrained
//! axis always holds.

use std::collections::BTreeMap;

use crate::compiler::image::glob_match;
use crate::pipeline::{Build, BuildStatus, EventKind, Filter, Job, Repo};

const BRANCH_PREFIX: &str = "refs/heads/";

/// The build facts a filter is tested against
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// Repository being built
    pub repo: &'a Repo,
    /// Build descriptor
    pub build: &'a Build,
    /// Job descriptor, carrying the matrix axis
    pub job: &'a Job,
    /// Aggregate status of the build so far
    pub status: BuildStatus,
}

/// Returns true if `filter` admits the build in `ctx`
#[must_use]
pub fn matches(filter: &Filter, ctx: &BuildContext<'_>) -> bool {
    match_branch(&filter.branch, &ctx.build.commit.branch)
        && match_repo(filter.repo.as_deref(), &ctx.repo.full_name)
        && match_event(&filter.event, EventKind::classify(ctx.build))
        && match_matrix(&filter.matrix, &ctx.job.environment)
        && match_outcome(filter.success, filter.failure, ctx.status)
}

/// Glob match on the branch, ignoring a `refs/heads/` prefix.
///
/// Plain patterns are alternatives: at least one must match. Patterns
/// starting with `!` are exclusions: none may match.
#[must_use]
pub fn match_branch(patterns: &[String], branch: &str) -> bool {
    let branch = branch.strip_prefix(BRANCH_PREFIX).unwrap_or(branch);
    let mut any_include = false;
    let mut included = false;
    for pattern in patterns.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        match pattern.strip_prefix('!') {
            Some(excluded) => {
                if glob_match(excluded, branch) {
                    return false;
                }
            }
            None => {
                any_include = true;
                included = included || glob_match(pattern, branch);
            }
        }
    }
    !any_include || included
}

/// Exact repository name match
#[must_use]
pub fn match_repo(repo: Option<&str>, full_name: &str) -> bool {
    match repo {
        None | Some("") => true,
        Some(repo) => repo == full_name,
    }
}

/// Event membership
#[must_use]
pub fn match_event(events: &[EventKind], event: EventKind) -> bool {
    events.is_empty() || events.contains(&event)
}

/// Every declared axis must be present with the same value
#[must_use]
pub fn match_matrix(want: &BTreeMap<String, String>, have: &BTreeMap<String, String>) -> bool {
    want.iter().all(|(k, v)| have.get(k) == Some(v))
}

/// Prior outcome constraints
#[must_use]
pub fn match_outcome(success: Option<bool>, failure: Option<bool>, status: BuildStatus) -> bool {
    if success == Some(true) && !status.is_success() {
        return false;
    }
    if failure == Some(true) && status.is_success() {
        return false;
    }
    true
}
