use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// Liveness only; never touches Redis, Vault or an upstream provider. A
/// process that is up but can't reach its dependencies still answers 200
/// here and fails individual requests instead.
async fn health(State(_state): State<Arc<AppState>>) -> StatusCode {
    StatusCode::OK
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}
