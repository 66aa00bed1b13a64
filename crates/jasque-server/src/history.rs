//! Conversion of the request's message list into a prompt plus
//! conversation history for the runner.
//!
//! The last user message becomes the prompt. Everything before it is
//! replayed as history; assistant and user entries map directly,
//! system entries are dropped because the server injects its own
//! system prompt. Messages after the last user entry are dropped.

use jasque_core::messages::Message;

use crate::openai::ChatMessage;

/// Prompt and prior conversation extracted from a request.
#[derive(Debug)]
pub struct ExtractedConversation {
    pub prompt: String,
    pub history: Vec<Message>,
}

/// Split the request messages into prompt and history. Returns
/// `None` when the request contains no user message.
pub fn extract_conversation(messages: &[ChatMessage]) -> Option<ExtractedConversation> {
    let last_user = messages.iter().rposition(|m| m.role == "user")?;
    let prompt = messages[last_user].content.normalize();

    let history = messages[..last_user]
        .iter()
        .filter_map(|m| match m.role.as_str() {
            "user" => Some(Message::user(m.content.normalize())),
            "assistant" => Some(Message::assistant(m.content.normalize())),
            _ => None,
        })
        .collect();

    Some(ExtractedConversation { prompt, history })
}
