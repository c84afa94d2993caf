use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use simfarm_core::CoreError;
use simfarm_dispatch::DispatchError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors, [`DispatchError`] for dispatcher
/// availability, and adds HTTP-specific variants. Implements
/// [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `simfarm_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The dispatcher stopped or a wait expired.
    #[error(transparent)]
    Dispatch(DispatchError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Core(core) => AppError::Core(core),
            other => AppError::Dispatch(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::UnknownJob(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_JOB", core.to_string()),
                CoreError::MalformedId(_) => {
                    (StatusCode::BAD_REQUEST, "MALFORMED_ID", core.to_string())
                }
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::NotComplete { .. } => {
                    (StatusCode::BAD_REQUEST, "NOT_COMPLETE", core.to_string())
                }
                CoreError::DuplicateJob(_) | CoreError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "CONFLICT", core.to_string())
                }
                CoreError::NoJobsAvailable => (StatusCode::NOT_FOUND, "NO_JOBS", core.to_string()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- Dispatcher availability ---
            AppError::Dispatch(err @ DispatchError::WaitTimedOut(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", err.to_string())
            }
            AppError::Dispatch(err) => {
                tracing::error!(error = %err, "Dispatcher unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "UNAVAILABLE",
                    "The job dispatcher is not running".to_string(),
                )
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
