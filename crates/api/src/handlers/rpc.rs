//! Handler for the worker-facing RPC endpoint.
//!
//! Dispatcher failures become [`RpcFault`]s inside a `200` reply; only an
//! undecodable envelope is rejected at the HTTP level.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use simfarm_core::rpc::{RpcFault, RpcRequest, RpcResponse, FAULT_INTERNAL, FAULT_TIMEOUT};
use simfarm_dispatch::{DispatchError, DispatchResult};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /rpc
pub async fn call(State(state): State<AppState>, body: Bytes) -> AppResult<Json<RpcResponse>> {
    let request: RpcRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("malformed rpc request: {e}")))?;
    let method = request.method();
    let dispatcher = &state.dispatcher;

    let reply = match request {
        RpcRequest::Submit(job) => with_result(dispatcher.submit_and_wait(job).await)?,
        RpcRequest::Fetch(worker_id) => with_result(dispatcher.fetch(worker_id).await)?,
        RpcRequest::Push(job) => ack(dispatcher.push(job).await),
        RpcRequest::Heartbeat(beat) => ack(dispatcher.heartbeat(beat).await),
    };

    if let Some(fault) = &reply.error {
        if !fault.is_no_jobs() {
            tracing::warn!(method, code = %fault.code, message = %fault.message, "RPC call failed");
        }
    }
    Ok(Json(reply))
}

fn with_result<T: Serialize>(result: DispatchResult<T>) -> AppResult<RpcResponse> {
    match result {
        Ok(value) => RpcResponse::with_result(&value)
            .map_err(|e| AppError::InternalError(format!("encoding rpc reply: {e}"))),
        Err(err) => Ok(RpcResponse::fault(fault_for(&err))),
    }
}

fn ack(result: DispatchResult<()>) -> RpcResponse {
    match result {
        Ok(()) => RpcResponse::ack(),
        Err(err) => RpcResponse::fault(fault_for(&err)),
    }
}

fn fault_for(err: &DispatchError) -> RpcFault {
    match err {
        DispatchError::Core(core) => RpcFault::from(core),
        DispatchError::WaitTimedOut(_) => RpcFault::new(FAULT_TIMEOUT, err.to_string()),
        DispatchError::Closed => {
            tracing::error!(error = %err, "Dispatcher unavailable");
            RpcFault::new(FAULT_INTERNAL, err.to_string())
        }
    }
}
