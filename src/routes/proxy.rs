use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::post;
use axum::Router;

use crate::error::GatewayError;
use crate::pipeline::{self, RequestEnvelope};
use crate::state::AppState;

const PROJECT_ID_HEADER: &str = "x-coreason-project-id";
const TRACE_ID_HEADER: &str = "x-coreason-trace-id";

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, GatewayError> {
    let request = RequestEnvelope {
        bearer_token: pipeline::extract_bearer(&headers),
        project_id: headers
            .get(PROJECT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        trace_id: headers
            .get(TRACE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    };

    state.pipeline.handle(request).await
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat/completions", post(chat_completions))
}
