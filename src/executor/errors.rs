//! Walk errors

use thiserror::Error;

/// Conditions that stop a walk. Step failures are not errors here; they
/// are recorded in the execution state instead.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// The build was cancelled
    #[error("build cancelled")]
    Cancelled,

    /// The build ran past its deadline
    #[error("build timed out")]
    Timeout,
}

impl ExecError {
    /// Process exit code reported for this condition
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            ExecError::Cancelled => 130,
            ExecError::Timeout => 128,
        }
    }
}
