pub mod gemini;
pub mod proxy;
pub mod types;
pub mod utils;

pub use gemini::GeminiClient;
pub use proxy::ProxyClient;
pub use types::*;

use crate::config::{LexisConfig, Transport};
use crate::error::Result;
use std::future::Future;

/// The boundary to the hosted language model.
///
/// Takes a transcript with its system instruction and course context and
/// resolves to the generated text or a transport/configuration error.
pub trait CompletionBackend: Send + Sync + 'static {
    fn complete(&self, request: CompletionRequest) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Clone)]
pub enum LlmClient {
    Proxy(ProxyClient),
    Gemini(GeminiClient),
}

impl LlmClient {
    /// Picks the transport named by the configuration.
    pub fn from_config(config: &LexisConfig, api_key: Option<String>) -> Result<Self> {
        match config.transport {
            Transport::Proxy => Ok(LlmClient::Proxy(ProxyClient::new(config.endpoint.clone())?)),
            Transport::Gemini => {
                let client = match &config.gemini_base_url {
                    Some(base) => GeminiClient::with_base_url(api_key, config.model.clone(), base.clone())?,
                    None => GeminiClient::new(api_key, config.model.clone())?,
                };
                Ok(LlmClient::Gemini(client))
            }
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            LlmClient::Proxy(_) => "Proxy",
            LlmClient::Gemini(_) => "Gemini",
        }
    }

    /// The proxy holds its own key; the direct transport needs one locally.
    pub fn has_credentials(&self) -> bool {
        match self {
            LlmClient::Proxy(_) => true,
            LlmClient::Gemini(client) => client.has_credentials(),
        }
    }

    /// Where requests go, for the startup banner.
    pub fn target(&self) -> String {
        match self {
            LlmClient::Proxy(client) => client.endpoint().to_string(),
            LlmClient::Gemini(client) => client.model().to_string(),
        }
    }
}

impl CompletionBackend for LlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        match self {
            LlmClient::Proxy(client) => client.complete(&request).await,
            LlmClient::Gemini(client) => client.complete(&request).await,
        }
    }
}
