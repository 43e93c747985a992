//! Shared execution state
//!
//! One [`ExecutionState`] exists per build invocation. The host
//! descriptors are read-only; the exit code and aggregate status sit
//! behind a single lock.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::condition::BuildContext;
use crate::infrastructure::ContainerRuntime;
use crate::pipeline::{Build, BuildStatus, Job, Repo, System, Workspace};

/// Exit code recorded for infrastructure failures
pub const RUNTIME_FAILURE_CODE: i32 = 255;

#[derive(Debug)]
struct Outcome {
    exit_code: i32,
    status: BuildStatus,
}

/// Mutable state shared by every walk of one build
pub struct ExecutionState {
    /// Repository descriptor
    pub repo: Repo,
    /// Build descriptor
    pub build: Build,
    /// Job descriptor
    pub job: Job,
    /// Platform descriptor
    pub system: System,
    /// Workspace, possibly carrying clone credentials
    pub workspace: Workspace,
    runtime: Arc<dyn ContainerRuntime>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    stop_grace: Duration,
    outcome: Mutex<Outcome>,
    containers: Mutex<Vec<String>>,
}

impl std::fmt::Debug for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionState")
            .field("repo", &self.repo.full_name)
            .field("build", &self.build.number)
            .field("job", &self.job.number)
            .field("runtime", &self.runtime.name())
            .field("outcome", &*self.outcome.lock())
            .finish_non_exhaustive()
    }
}

impl ExecutionState {
    /// Creates the state for one build
    pub fn new(
        repo: Repo,
        build: Build,
        job: Job,
        system: System,
        workspace: Workspace,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        let status = build.status;
        Self {
            repo,
            build,
            job,
            system,
            workspace,
            runtime,
            cancel: CancellationToken::new(),
            deadline: None,
            stop_grace: Duration::from_secs(5),
            outcome: Mutex::new(Outcome {
                exit_code: 0,
                status,
            }),
            containers: Mutex::new(Vec::new()),
        }
    }

    /// Uses an externally owned cancellation token
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Limits the whole build to `timeout` from now
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Grace period before a stopping container is killed
    #[must_use]
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Container runtime client
    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    /// Shared handle to the runtime client
    pub fn runtime_handle(&self) -> Arc<dyn ContainerRuntime> {
        Arc::clone(&self.runtime)
    }

    /// Cancellation token observed by in-flight runs
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Instant the build times out, if limited
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true once the deadline has passed
    pub fn timed_out(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Stop grace period
    pub fn stop_grace(&self) -> Duration {
        self.stop_grace
    }

    /// Records a failing exit code. The first non-zero code wins.
    pub fn record_failure(&self, code: i32) {
        if code == 0 {
            return;
        }
        let mut outcome = self.outcome.lock();
        if outcome.exit_code == 0 {
            outcome.exit_code = code;
            outcome.status = BuildStatus::Failure;
            tracing::debug!(code, "Recorded build failure");
        }
    }

    /// Marks the build successful unless a failure was recorded
    pub fn mark_success(&self) {
        let mut outcome = self.outcome.lock();
        if outcome.exit_code == 0 {
            outcome.status = BuildStatus::Success;
        }
    }

    /// First recorded non-zero exit code, or 0
    pub fn exit_code(&self) -> i32 {
        self.outcome.lock().exit_code
    }

    /// Returns true once a failure has been recorded
    pub fn failed(&self) -> bool {
        self.exit_code() != 0
    }

    /// Aggregate status so far
    pub fn status(&self) -> BuildStatus {
        self.outcome.lock().status
    }

    /// Remembers a created container for final removal
    pub fn track_container(&self, id: &str) {
        self.containers.lock().push(id.to_string());
    }

    /// Takes the created containers, newest first
    pub fn take_containers(&self) -> Vec<String> {
        let mut ids = std::mem::take(&mut *self.containers.lock());
        ids.reverse();
        ids
    }

    /// Facts used to evaluate filters
    pub fn context(&self) -> BuildContext<'_> {
        BuildContext {
            repo: &self.repo,
            build: &self.build,
            job: &self.job,
            status: self.status(),
        }
    }
}
