use reqwest::{Client, Response, StatusCode};
use serde_json::Value;

use crate::error::GatewayError;
use crate::retry::AttemptOutcome;
use crate::router::ProviderDescriptor;
use crate::secrets::EphemeralCredential;

pub struct UpstreamClient<'a> {
    http_client: Client,
    descriptor: &'a ProviderDescriptor,
    credential: &'a EphemeralCredential,
}

impl<'a> UpstreamClient<'a> {
    pub fn new(
        http_client: Client,
        descriptor: &'a ProviderDescriptor,
        credential: &'a EphemeralCredential,
    ) -> Self {
        Self {
            http_client,
            descriptor,
            credential,
        }
    }

    /// Issue exactly one POST `{base_url}/chat/completions` attempt,
    /// classified into the retry controller's tagged outcome set.
    pub async fn attempt(&self, body: &Value) -> AttemptOutcome<Response> {
        let url = format!("{}/chat/completions", self.descriptor.base_url);

        let send_result = self
            .http_client
            .post(&url)
            .bearer_auth(self.credential.as_str())
            .json(body)
            .send()
            .await;

        let response = match send_result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    "upstream connection error to provider {}: {}",
                    self.descriptor.provider_id,
                    e
                );
                return AttemptOutcome::RetryConnection;
            }
        };

        match response.status() {
            status if status.is_success() => AttemptOutcome::Ok(response),
            StatusCode::TOO_MANY_REQUESTS => AttemptOutcome::RetryRateLimit,
            status if status.is_server_error() => AttemptOutcome::RetryInternal,
            status => {
                AttemptOutcome::TerminalClient(GatewayError::UpstreamError(format!(
                    "upstream returned status {status}"
                )))
            }
        }
    }
}
