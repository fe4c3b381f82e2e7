use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::accounting::AccountingManager;
use crate::budget::{estimate_tokens, BudgetManager};
use crate::error::GatewayError;
use crate::models::chat::ChatCompletionRequest;
use crate::retry::{AttemptOutcome, RetryController};
use crate::router;
use crate::secrets::SecretStore;
use crate::stream;
use crate::upstream::UpstreamClient;

/// Everything the pipeline needs out of the inbound HTTP request, decoupled
/// from the axum extractor types so it is trivially unit-testable.
pub struct RequestEnvelope {
    pub bearer_token: Option<String>,
    pub project_id: Option<String>,
    pub trace_id: Option<String>,
    pub body: Bytes,
}

pub struct Pipeline {
    gateway_bearer_token: String,
    budget: Arc<dyn BudgetManager>,
    secret_store: Arc<dyn SecretStore>,
    accounting: AccountingManager,
    http_client: reqwest::Client,
    retry_max_attempts: u32,
    base_url_overrides: router::BaseUrlOverrides,
}

impl Pipeline {
    pub fn new(
        gateway_bearer_token: String,
        budget: Arc<dyn BudgetManager>,
        secret_store: Arc<dyn SecretStore>,
        accounting: AccountingManager,
        http_client: reqwest::Client,
        retry_max_attempts: u32,
        base_url_overrides: router::BaseUrlOverrides,
    ) -> Self {
        Self {
            gateway_bearer_token,
            budget,
            secret_store,
            accounting,
            http_client,
            retry_max_attempts,
            base_url_overrides,
        }
    }

    /// The only public entry point. Each phase short-circuits on failure
    /// before any later phase runs, and in particular before any outbound
    /// I/O to the secret store or the upstream provider.
    pub async fn handle(&self, request: RequestEnvelope) -> Result<Response, GatewayError> {
        // 1. Authenticate.
        self.authenticate(request.bearer_token.as_deref())?;

        // 2. Extract project id.
        let project_id = request
            .project_id
            .filter(|id| !id.is_empty())
            .ok_or(GatewayError::ProjectMissing)?;

        // A malformed trace id is logged and ignored — never a reason to fail.
        if let Some(trace_id) = request.trace_id.as_deref() {
            if Uuid::parse_str(trace_id).is_err() {
                tracing::warn!(project_id = %project_id, "ignoring malformed trace id");
            }
        }

        // 3. Parse body.
        let chat_request = ChatCompletionRequest::parse(&request.body)?;

        // 4. Estimate.
        let estimate = estimate_tokens(&chat_request.messages());

        // 5. Admission.
        if !self.budget.check(&project_id, estimate).await {
            return Err(GatewayError::BudgetExceeded(project_id));
        }

        // 6. Route.
        let descriptor = router::resolve(chat_request.model(), &self.base_url_overrides)
            .ok_or(GatewayError::ModelUnknown)?;

        // 7. Fetch credential. Scoped to this call — dropped (and its
        // backing memory zeroized) no later than the end of this function.
        let credential = self.secret_store.get(descriptor.secret_path).await?;

        // 8. Execute via the retry controller.
        let upstream = UpstreamClient::new(self.http_client.clone(), &descriptor, &credential);
        let body = chat_request.body();
        let retry = RetryController::new(self.retry_max_attempts);
        let attempt_result = retry
            .run(|_attempt_no| {
                let upstream = &upstream;
                async move { upstream.attempt(body).await }
            })
            .await;

        // 10. Discard credential before returning on any exit path.
        drop(credential);

        let upstream_response = attempt_result?;

        // 9. Respond.
        if chat_request.is_stream() {
            let response_body = stream::forward(
                upstream_response,
                project_id,
                estimate,
                self.accounting.clone(),
            );
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(axum::http::header::CONTENT_TYPE, "text/event-stream")
                .header(axum::http::header::CACHE_CONTROL, "no-cache")
                .body(response_body)
                .expect("static response parts are always valid"))
        } else {
            let status = upstream_response.status();
            let response_bytes = upstream_response
                .bytes()
                .await
                .map_err(|e| GatewayError::UpstreamError(format!("failed reading response: {e}")))?;

            let total_tokens = parse_buffered_usage(&response_bytes).unwrap_or(estimate);
            self.accounting.schedule(project_id, total_tokens);

            Ok(Response::builder()
                .status(status.as_u16())
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(response_bytes))
                .expect("static response parts are always valid"))
        }
    }

    fn authenticate(&self, bearer_token: Option<&str>) -> Result<(), GatewayError> {
        let token = bearer_token.ok_or(GatewayError::AuthInvalid)?;
        let matches: bool = token
            .as_bytes()
            .ct_eq(self.gateway_bearer_token.as_bytes())
            .into();
        if matches {
            Ok(())
        } else {
            Err(GatewayError::AuthInvalid)
        }
    }
}

/// Extract `Authorization: Bearer <token>` from the caller's headers.
pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn parse_buffered_usage(body: &[u8]) -> Option<i64> {
    let json: serde_json::Value = serde_json::from_slice(body).ok()?;
    json.get("usage")?.get("total_tokens")?.as_i64()
}
