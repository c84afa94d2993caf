use axum::routing::post;
use axum::Router;

use crate::handlers::rpc;
use crate::state::AppState;

/// `POST /rpc`: Submit, Fetch, Push and Heartbeat for workers and
/// blocking submitters.
pub fn router() -> Router<AppState> {
    Router::new().route("/rpc", post(rpc::call))
}
