use simfarm_core::{CoreError, JobId};

/// Failure of a request made through a [`DispatcherHandle`](crate::DispatcherHandle).
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The dispatcher rejected the operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The dispatcher task has stopped.
    #[error("dispatcher is not running")]
    Closed,

    #[error("timed out waiting for job {0} to finish")]
    WaitTimedOut(JobId),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
