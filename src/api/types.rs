use crate::session::{AttachedFile, Message, Role};
use serde::{Deserialize, Serialize};

/// File payload as sent upstream: no name, only type and base64 data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFile {
    pub mime_type: String,
    pub data: String,
}

impl From<&AttachedFile> for InlineFile {
    fn from(file: &AttachedFile) -> Self {
        Self {
            mime_type: file.mime_type.clone(),
            data: file.data.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<InlineFile>,
}

impl TranscriptEntry {
    pub fn new(role: Role, text: impl Into<String>, file: Option<&AttachedFile>) -> Self {
        Self {
            role,
            text: text.into(),
            file: file.map(InlineFile::from),
        }
    }
}

impl From<&Message> for TranscriptEntry {
    fn from(message: &Message) -> Self {
        Self::new(message.role, message.text.clone(), message.file.as_ref())
    }
}

/// Body of a completion call: `{messages, systemInstruction, courseContent}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub messages: Vec<TranscriptEntry>,
    pub system_instruction: String,
    pub course_content: String,
}

/// Reply of the chat proxy: `{text}` on success, `{error}` otherwise.
#[derive(Debug, Default, Deserialize)]
pub struct ProxyReply {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// Gemini generateContent types

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub system_instruction: Content,
    pub contents: Vec<Content>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
        /// Set on reasoning summaries, which are not part of the answer.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        thought: bool,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineFile,
    },
    /// Any part kind this client does not use (function calls, code execution).
    Other(serde_json::Value),
}

impl Content {
    pub fn system(text: String) -> Self {
        Self {
            role: None,
            parts: vec![Part::Text {
                text,
                thought: false,
            }],
        }
    }

    pub fn from_entry(entry: &TranscriptEntry) -> Self {
        let mut parts = vec![Part::Text {
            text: entry.text.clone(),
            thought: false,
        }];
        if let Some(file) = &entry.file {
            parts.push(Part::InlineData {
                inline_data: file.clone(),
            });
        }

        Self {
            role: Some(entry.role.as_str().to_string()),
            parts,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| match part {
                        Part::Text {
                            text,
                            thought: false,
                        } => Some(text.as_str()),
                        Part::Text { .. } | Part::InlineData { .. } | Part::Other(_) => None,
                    })
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct GeminiErrorBody {
    pub error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct GeminiErrorDetail {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_completion_request_wire_shape() {
        let file = AttachedFile::new("arret.pdf", "application/pdf", "JVBERg==");
        let request = CompletionRequest {
            messages: vec![
                TranscriptEntry::new(Role::User, "A", Some(&file)),
                TranscriptEntry::new(Role::Model, "B", None),
            ],
            system_instruction: "sys".to_string(),
            course_content: "cours".to_string(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "messages": [
                    {"role": "user", "text": "A", "file": {"mimeType": "application/pdf", "data": "JVBERg=="}},
                    {"role": "model", "text": "B"}
                ],
                "systemInstruction": "sys",
                "courseContent": "cours"
            })
        );
    }

    #[test]
    fn test_gemini_content_carries_inline_data() {
        let file = AttachedFile::new("arret.pdf", "application/pdf", "JVBERg==");
        let entry = TranscriptEntry::new(Role::User, "Résume", Some(&file));

        let value = serde_json::to_value(Content::from_entry(&entry)).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "parts": [
                    {"text": "Résume"},
                    {"inlineData": {"mimeType": "application/pdf", "data": "JVBERg=="}}
                ]
            })
        );
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Le contrat "}, {"text": "est formé."}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(response.text(), "Le contrat est formé.");

        let empty: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        assert_eq!(empty.text(), "");
    }

    #[test]
    fn test_response_text_skips_thought_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Je dois d'abord rappeler l'article 1240.", "thought": true},
                    {"text": "La responsabilité suppose une faute."}
                ]}
            }]
        }))
        .unwrap();
        assert_eq!(response.text(), "La responsabilité suppose une faute.");
    }
}
