use super::types::*;
use super::utils::{self, REQUEST_TIMEOUT};
use crate::error::{LexisError, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// System instruction with the course appended, as the model receives it.
pub fn course_system_instruction(system_instruction: &str, course_content: &str) -> String {
    format!(
        "{}\n\nCONTEXTE DU COURS :\n{}",
        system_instruction, course_content
    )
}

/// Direct client for the Gemini `generateContent` endpoint.
///
/// A missing key is not a construction error: every call fails with
/// `MissingCredentials` so the turn ends with an error message.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, model, GEMINI_API_BASE)
    }

    pub fn with_base_url(
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LexisError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_body(request: &CompletionRequest) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: Content::system(course_system_instruction(
                &request.system_instruction,
                &request.course_content,
            )),
            contents: request.messages.iter().map(Content::from_entry).collect(),
        }
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or(LexisError::MissingCredentials)?;

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = Self::build_body(request);

        let response = utils::with_retries("Gemini", || {
            self.client
                .post(&url)
                .header("x-goog-api-key", api_key)
                .json(&body)
                .send()
        })
        .await?;

        if !response.status().is_success() {
            let (status, body) = utils::read_error_body(response).await;
            let message = serde_json::from_str::<GeminiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);

            tracing::error!(status = status, error = %message, "Gemini request failed");
            return Err(LexisError::Api { status, message });
        }

        let body = response.text().await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&body).map_err(|e| {
            LexisError::MalformedResponse(format!("Failed to parse Gemini response: {}", e))
        })?;

        if parsed.candidates.is_empty() {
            let reason = parsed
                .prompt_feedback
                .as_ref()
                .and_then(|f| f.block_reason.as_deref())
                .unwrap_or("none");
            tracing::warn!(block_reason = reason, "Gemini returned no candidates");
        }

        let text = parsed.text();
        if text.trim().is_empty() {
            if let Some(candidate) = parsed.candidates.first() {
                tracing::warn!(
                    finish_reason = candidate.finish_reason.as_deref().unwrap_or("none"),
                    "Gemini candidate has no answer text"
                );
            }
        }

        Ok(text)
    }
}
