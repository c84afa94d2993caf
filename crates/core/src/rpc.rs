//! Wire types for the worker-facing RPC surface.
//!
//! Every call is a single `POST /rpc` carrying an [`RpcRequest`] and
//! answered with an [`RpcResponse`]. Failures travel inside the response as
//! an [`RpcFault`] so a polling worker can tell "no work yet" apart from a
//! broken server.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::{Beat, Job};
use crate::types::WorkerId;

/// The queue was empty; retry later.
pub const FAULT_NO_JOBS: &str = "NO_JOBS";
pub const FAULT_BAD_REQUEST: &str = "BAD_REQUEST";
pub const FAULT_CONFLICT: &str = "CONFLICT";
pub const FAULT_TIMEOUT: &str = "TIMEOUT";
pub const FAULT_INTERNAL: &str = "INTERNAL";

/// A single RPC call.
///
/// ```json
/// {"method": "Fetch", "params": "0123456789abcdef0123456789abcdef"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum RpcRequest {
    /// Enqueue a job and block until it has been pushed back.
    Submit(Job),
    /// Take the next queued job.
    Fetch(WorkerId),
    /// Report a finished job.
    Push(Job),
    Heartbeat(Beat),
}

impl RpcRequest {
    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::Submit(_) => "Submit",
            RpcRequest::Fetch(_) => "Fetch",
            RpcRequest::Push(_) => "Push",
            RpcRequest::Heartbeat(_) => "Heartbeat",
        }
    }
}

/// Error half of an RPC reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RpcFault {
    pub code: String,
    pub message: String,
}

impl RpcFault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_no_jobs(&self) -> bool {
        self.code == FAULT_NO_JOBS
    }
}

impl From<&CoreError> for RpcFault {
    fn from(err: &CoreError) -> Self {
        let code = match err {
            CoreError::NoJobsAvailable => FAULT_NO_JOBS,
            CoreError::InvalidTransition { .. } | CoreError::DuplicateJob(_) => FAULT_CONFLICT,
            CoreError::Internal(_) => FAULT_INTERNAL,
            CoreError::UnknownJob(_)
            | CoreError::MalformedId(_)
            | CoreError::Validation(_)
            | CoreError::NotComplete { .. } => FAULT_BAD_REQUEST,
        };
        Self::new(code, err.to_string())
    }
}

/// Reply to an [`RpcRequest`]. Exactly one of `result` / `error` is
/// meaningful; an acknowledgement carries neither.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcFault>,
}

impl RpcResponse {
    pub fn ack() -> Self {
        Self::default()
    }

    pub fn with_result<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            result: Some(serde_json::to_value(value)?),
            error: None,
        })
    }

    pub fn fault(fault: RpcFault) -> Self {
        Self {
            result: None,
            error: Some(fault),
        }
    }

    /// Convert into the typed result, surfacing a fault as `Err`.
    ///
    /// A missing or undecodable result is reported as an `INTERNAL` fault.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, RpcFault> {
        if let Some(fault) = self.error {
            return Err(fault);
        }
        let value = self
            .result
            .ok_or_else(|| RpcFault::new(FAULT_INTERNAL, "reply carried no result"))?;
        serde_json::from_value(value)
            .map_err(|e| RpcFault::new(FAULT_INTERNAL, format!("undecodable reply: {e}")))
    }

    /// Convert an acknowledgement, surfacing a fault as `Err`.
    pub fn into_ack(self) -> Result<(), RpcFault> {
        match self.error {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}
