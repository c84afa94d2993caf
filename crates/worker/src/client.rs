//! RPC client for the dispatch server's `POST /rpc` endpoint.
//!
//! Wraps the four worker-facing calls using [`reqwest`].

use simfarm_core::rpc::{RpcFault, RpcRequest, RpcResponse, FAULT_INTERNAL};
use simfarm_core::{Beat, Job, WorkerId};

/// Errors from the RPC client layer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server rejected the call before it reached the dispatcher.
    #[error("server error ({status}): {body}")]
    Http {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The queue is empty. Not a failure; poll again later.
    #[error("no jobs available")]
    NoJobs,

    /// The dispatcher refused the call.
    #[error("rpc fault {0}")]
    Fault(RpcFault),
}

impl ClientError {
    /// Whether the same call may succeed later: the server was unreachable,
    /// answered at the HTTP level, or its dispatcher was unavailable.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Request(_) | ClientError::Http { .. } => true,
            ClientError::Fault(fault) => fault.code == FAULT_INTERNAL,
            ClientError::NoJobs => false,
        }
    }
}

impl From<RpcFault> for ClientError {
    fn from(fault: RpcFault) -> Self {
        if fault.is_no_jobs() {
            ClientError::NoJobs
        } else {
            ClientError::Fault(fault)
        }
    }
}

/// HTTP client for a single dispatch server.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    rpc_url: String,
}

impl RpcClient {
    /// * `server_url` - Base HTTP URL, e.g. `http://host:4242`.
    pub fn new(server_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), server_url)
    }

    pub fn with_client(client: reqwest::Client, server_url: &str) -> Self {
        Self {
            client,
            rpc_url: format!("{}/rpc", server_url.trim_end_matches('/')),
        }
    }

    /// Submit a job and block until a worker has pushed it back.
    pub async fn submit(&self, job: Job) -> Result<Job, ClientError> {
        Ok(self.call(&RpcRequest::Submit(job)).await?.into_result()?)
    }

    /// Take the next queued job. An empty queue is [`ClientError::NoJobs`].
    pub async fn fetch(&self, worker_id: WorkerId) -> Result<Job, ClientError> {
        Ok(self
            .call(&RpcRequest::Fetch(worker_id))
            .await?
            .into_result()?)
    }

    pub async fn push(&self, job: Job) -> Result<(), ClientError> {
        Ok(self.call(&RpcRequest::Push(job)).await?.into_ack()?)
    }

    pub async fn heartbeat(&self, beat: Beat) -> Result<(), ClientError> {
        Ok(self.call(&RpcRequest::Heartbeat(beat)).await?.into_ack()?)
    }

    async fn call(&self, request: &RpcRequest) -> Result<RpcResponse, ClientError> {
        let response = self.client.post(&self.rpc_url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<RpcResponse>().await?)
    }
}
