use std::sync::Arc;

use simfarm_dispatch::DispatcherHandle;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Handlers never touch job state directly; everything goes through the
/// dispatcher handle.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: DispatcherHandle,
    pub config: Arc<ServerConfig>,
}
