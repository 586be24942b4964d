use crate::api::{CompletionRequest, TranscriptEntry};
use crate::session::{AttachedFile, Message, Role};

/// Builds the completion request for one user turn.
///
/// Prior messages are sent as stored. The new turn carries the raw user text,
/// without the attachment marker that the displayed message shows.
pub struct RequestBuilder<'a> {
    history: &'a [Message],
    system_instruction: &'a str,
    course_content: &'a str,
    turn: Option<(&'a str, Option<&'a AttachedFile>)>,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(history: &'a [Message], system_instruction: &'a str, course_content: &'a str) -> Self {
        Self {
            history,
            system_instruction,
            course_content,
            turn: None,
        }
    }

    pub fn user_turn(mut self, text: &'a str, file: Option<&'a AttachedFile>) -> Self {
        self.turn = Some((text, file));
        self
    }

    pub fn build(self) -> CompletionRequest {
        let mut messages: Vec<TranscriptEntry> =
            self.history.iter().map(TranscriptEntry::from).collect();

        if let Some((text, file)) = self.turn {
            messages.push(TranscriptEntry::new(Role::User, text, file));
        }

        CompletionRequest {
            messages,
            system_instruction: self.system_instruction.to_string(),
            course_content: self.course_content.to_string(),
        }
    }
}
