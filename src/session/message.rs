use crate::error::{LexisError, Result};
use crate::error_ext::ResultExt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Stable identifier of a session. Allocated by the store, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = LexisError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(SessionId)
            .map_err(|_| LexisError::Config(format!("'{}' is not a session id", s.trim())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// A PDF picked by the user, held by the input layer until the next send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFile {
    pub name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

impl AttachedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(name, PDF_MIME_TYPE, STANDARD.encode(bytes))
    }

    /// Reads a PDF from disk. Anything without a `.pdf` extension is refused.
    pub fn from_path(path: &Path) -> Result<Self> {
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return Err(LexisError::InvalidAttachment(
                "Veuillez sélectionner un fichier PDF.".to_string(),
            ));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("Attachment path has no file name")?
            .to_string();

        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read attachment {:?}", path))?;

        Ok(Self::from_bytes(name, &bytes))
    }

    /// Marker prepended to the displayed user text.
    pub fn marker(&self) -> String {
        format!("[Fichier joint : {}]", self.name)
    }
}

/// One turn of a session. Immutable once appended to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<AttachedFile>,
    /// Filled in by the store on append when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            file: None,
            timestamp: None,
            is_error: false,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            file: None,
            timestamp: None,
            is_error: false,
        }
    }

    pub fn model_error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::model(text)
        }
    }

    pub fn with_file(mut self, file: Option<AttachedFile>) -> Self {
        self.file = file;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            title: default_title(id),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Last activity: newest message timestamp, or creation time.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.messages
            .iter()
            .rev()
            .find_map(|m| m.timestamp)
            .unwrap_or(self.created_at)
    }

    pub fn last_model_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Model)
    }
}

pub fn default_title(id: SessionId) -> String {
    format!("Nouvelle session {}", id)
}
