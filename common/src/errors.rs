use crate::models::{BuildQueueStatus, BuildStatus, JobType};
pub use anyhow::{anyhow, bail, format_err, Context, Error};
pub use log::{debug, error, info, trace, warn};
pub type Result<T> = ::std::result::Result<T, Error>;

/// Precondition failures of the scheduling core.
///
/// These travel inside [`Error`] like every other failure, callers that want to
/// react to a specific one use `err.downcast_ref::<SchedulingError>()`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulingError {
    #[error("Can't change build status from {from} to {to}")]
    InvalidStatusTransition { from: BuildStatus, to: BuildStatus },
    #[error("Can't {action} build queue entry {id} in state {status}")]
    IllegalQueueTransition {
        id: i32,
        action: &'static str,
        status: BuildQueueStatus,
    },
    #[error("Build farm job {job} is already assigned to builder {current}, refusing to move it to {requested}")]
    InconsistentBuilder { job: i32, current: i32, requested: i32 },
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },
    #[error("Build {job} in state {status} can't be retried")]
    CannotBeRetried { job: i32, status: BuildStatus },
    #[error("Build {job} in state {status} can't be rescored")]
    CannotBeRescored { job: i32, status: BuildStatus },
    #[error("No specific build registered for job type {0}")]
    UnregisteredJobType(JobType),
}

impl SchedulingError {
    pub fn not_found<K: ToString>(kind: &'static str, key: K) -> Self {
        SchedulingError::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}

/// Return the typed scheduling error carried by `err`, if there is one.
pub fn scheduling_error(err: &Error) -> Option<&SchedulingError> {
    err.downcast_ref::<SchedulingError>()
}
