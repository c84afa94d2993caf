//! Handlers for the `/job` HTTP surface.
//!
//! Each handler is a thin translation onto exactly one dispatcher call.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use simfarm_core::{CoreError, Job, JobId, JobStatus};

use crate::archive;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /job/submit
///
/// Body is a JSON job description. Responds with the job id as hex text.
pub async fn submit_job(State(state): State<AppState>, body: Bytes) -> AppResult<String> {
    let job: Job = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("malformed job description: {e}")))?;
    let id = state.dispatcher.submit(job).await?;
    Ok(id.to_string())
}

/// POST /job/submit-infile
///
/// Body is a raw simulation input file, wrapped into the default job.
pub async fn submit_infile(State(state): State<AppState>, body: Bytes) -> AppResult<String> {
    if body.is_empty() {
        return Err(AppError::BadRequest("input file is empty".into()));
    }
    let id = state
        .dispatcher
        .submit(Job::with_default_cmd(body.to_vec()))
        .await?;
    Ok(id.to_string())
}

// ---------------------------------------------------------------------------
// Retrieve
// ---------------------------------------------------------------------------

/// GET /job/retrieve/{id}
///
/// Zip archive of every output file of a completed job.
pub async fn retrieve_job(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id: JobId = raw_id.parse()?;
    let job = state.dispatcher.stat(id).await?;
    if job.status != JobStatus::Complete {
        return Err(CoreError::NotComplete {
            id,
            status: job.status,
        }
        .into());
    }

    let archive = archive::build_zip(&job.outfiles)
        .map_err(|e| AppError::InternalError(format!("archiving outputs of job {id}: {e}")))?;

    tracing::debug!(job_id = %id, bytes = archive.len(), "Serving job results");

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"results-id-{id}.zip\""),
            ),
        ],
        archive,
    ))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /job/status/{id}
///
/// Responds with `{"Id": ..., "Status": ...}`.
pub async fn job_status(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id: JobId = raw_id.parse()?;
    let job = state.dispatcher.stat(id).await?;
    Ok(Json(job.status_view()))
}
