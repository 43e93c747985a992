//! Container inputs derived from the build
//!
//! Build containers receive the build as environment variables; plugin
//! containers receive it as a JSON payload argument. The payload field
//! names are the plugin protocol.

use serde::Serialize;

use super::state::ExecutionState;
use crate::pipeline::{Build, Job, Repo, Vargs, Workspace};

#[derive(Debug, Serialize)]
struct PluginSystem<'a> {
    version: &'a str,
    link_url: &'a str,
}

#[derive(Debug, Serialize)]
struct PluginPayload<'a> {
    workspace: &'a Workspace,
    system: PluginSystem<'a>,
    repo: &'a Repo,
    build: Build,
    job: Job,
    vargs: &'a Vargs,
}

/// Environment injected into build containers
#[must_use]
pub fn to_env(state: &ExecutionState) -> Vec<String> {
    let path = &state.workspace.path;
    let repo = &state.repo.full_name;
    let commit = &state.build.commit;
    let build = state.build.number;

    let mut env = vec![
        "CI=true".to_string(),
        "DRONE=true".to_string(),
        "CI_NAME=drone".to_string(),
        format!("DRONE_DIR={path}"),
        format!("DRONE_REPO={repo}"),
        format!("CI_REPO={repo}"),
        format!("DRONE_JOB_ID={}", state.job.id),
        format!("DRONE_JOB_NUMBER={}", state.job.number),
        format!("CI_JOB_ID={}", state.job.id),
        format!("CI_JOB_NUMBER={}", state.job.number),
        format!("DRONE_BUILD_NUMBER={build}"),
        format!("DRONE_BUILD_DIR={path}"),
        format!("DRONE_BRANCH={}", commit.branch),
        format!("DRONE_COMMIT={}", commit.sha),
        format!("CI_BRANCH={}", commit.branch),
        format!("CI_BUILD_DIR={path}"),
        format!("CI_BUILD_NUMBER={build}"),
        format!("CI_COMMIT={}", commit.sha),
        format!(
            "CI_BUILD_URL={}/{repo}/{build}",
            state.system.link_url.trim_end_matches('/')
        ),
    ];

    if let Some(pr) = &state.build.pull_request {
        env.push(format!("CI_PULL_REQUEST={}", pr.number));
        env.push(format!("DRONE_PULL_REQUEST={}", pr.number));
    }

    env.extend(
        state
            .job
            .environment
            .iter()
            .map(|(key, value)| format!("{key}={value}")),
    );
    env
}

/// Plugin command: `["--", <payload json>]`
///
/// The build and job carry the outcome recorded so far, so notify plugins
/// see the final status and exit code.
pub fn plugin_command(state: &ExecutionState, vargs: &Vargs) -> serde_json::Result<Vec<String>> {
    let status = state.status();
    let build = Build {
        status,
        ..state.build.clone()
    };
    let job = Job {
        status,
        exit_code: state.exit_code(),
        ..state.job.clone()
    };
    let payload = PluginPayload {
        workspace: &state.workspace,
        system: PluginSystem {
            version: &state.system.version,
            link_url: &state.system.link_url,
        },
        repo: &state.repo,
        build,
        job,
        vargs,
    };
    Ok(vec!["--".to_string(), serde_json::to_string(&payload)?])
}
