use crate::job::JobStatus;
use crate::types::JobId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("unknown job id {0}")]
    UnknownJob(JobId),

    #[error("job {0} was already submitted")]
    DuplicateJob(JobId),

    #[error("malformed job id {0}")]
    MalformedId(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("job {id} status: {status}")]
    NotComplete { id: JobId, status: JobStatus },

    #[error("no jobs available to run")]
    NoJobsAvailable,

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}
