use crate::session::SessionId;
use thiserror::Error;

/// Shown in an error turn when the failure carries no usable text.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Une erreur est survenue lors de la communication avec l'IA.";

#[derive(Error, Debug)]
pub enum LexisError {
    #[error("Session {0} not found")]
    SessionNotFound(SessionId),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Clé API non configurée")]
    MissingCredentials,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    InvalidCommand(String),

    #[error("{message}: {source}")]
    Context {
        message: String,
        #[source]
        source: Box<LexisError>,
    },
}

impl LexisError {
    /// HTTP-like status for the failure. Local failures count as 500.
    pub fn status_code(&self) -> u16 {
        match self {
            LexisError::Api { status, .. } => *status,
            LexisError::Http(e) => e.status().map(|s| s.as_u16()).unwrap_or(500),
            LexisError::SessionNotFound(_) => 404,
            LexisError::Context { source, .. } => source.status_code(),
            _ => 500,
        }
    }

    /// Human-readable text for an error turn.
    pub fn detail(&self) -> String {
        let text = match self {
            LexisError::Api { message, .. } => message.trim().to_string(),
            LexisError::NetworkError(message) => message.trim().to_string(),
            other => other.to_string(),
        };

        if text.is_empty() {
            GENERIC_FAILURE_MESSAGE.to_string()
        } else {
            text
        }
    }
}

pub type Result<T> = std::result::Result<T, LexisError>;
