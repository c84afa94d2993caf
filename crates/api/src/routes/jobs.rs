//! Route definitions for the `/job` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at the root.
///
/// ```text
/// POST   /job/submit              -> submit_job
/// POST   /job/submit-infile       -> submit_infile
/// GET    /job/retrieve/{id}       -> retrieve_job
/// GET    /job/status/{id}         -> job_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/job/submit", post(jobs::submit_job))
        .route("/job/submit-infile", post(jobs::submit_infile))
        .route("/job/retrieve/{id}", get(jobs::retrieve_job))
        .route("/job/status/{id}", get(jobs::job_status))
}
