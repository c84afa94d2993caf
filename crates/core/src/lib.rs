//! Shared domain types for the simfarm job dispatch system.
//!
//! Everything that crosses a process boundary lives here: jobs and their
//! identifiers, worker heartbeats, the RPC envelope, and the domain error
//! type used by the dispatcher and both transports.

pub mod error;
pub mod job;
pub mod rpc;
pub mod types;

pub use error::CoreError;
pub use job::{Beat, Job, JobStatus, JobStatusView, OutFile};
pub use types::{JobId, Timestamp, WorkerId};
