use super::types::{CompletionRequest, ProxyReply};
use super::utils::{self, REQUEST_TIMEOUT};
use crate::error::{LexisError, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

/// Message used when a failed proxy reply carries no `error` field.
const GENERIC_API_ERROR: &str = "Erreur API";

/// Client for the chat proxy that holds the provider key server-side.
///
/// The proxy takes `{messages, systemInstruction, courseContent}` and answers
/// `{text}` on success or `{error}` with a non-2xx status.
#[derive(Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ProxyClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LexisError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let response = utils::with_retries("Proxy", || {
            self.client.post(&self.endpoint).json(request).send()
        })
        .await?;

        if !response.status().is_success() {
            let (status, body) = utils::read_error_body(response).await;
            let message = serde_json::from_str::<ProxyReply>(&body)
                .ok()
                .and_then(|reply| reply.error)
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| GENERIC_API_ERROR.to_string());

            tracing::error!(status = status, error = %message, "Proxy request failed");
            return Err(LexisError::Api { status, message });
        }

        let body = response.text().await?;
        let reply: ProxyReply = serde_json::from_str(&body).map_err(|e| {
            LexisError::MalformedResponse(format!("Failed to parse proxy reply: {}", e))
        })?;

        Ok(reply.text.unwrap_or_default())
    }
}
