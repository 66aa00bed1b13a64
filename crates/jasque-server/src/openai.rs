//! OpenAI-compatible request and response types for the chat
//! completions endpoint.
//!
//! Requests accept both plain-string message content and the
//! multi-part array form that newer clients send. Responses and
//! stream chunks mirror the shapes OpenAI clients expect, so
//! off-the-shelf plugins can talk to this server unmodified.

use jasque_core::usage::UsageTally;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /v1/chat/completions`.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    /// Accepted for client compatibility, not forwarded upstream.
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Accepted for client compatibility, not forwarded upstream.
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub stream_options: Option<StreamOptions>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct StreamOptions {
    #[serde(default)]
    pub include_usage: bool,
}

impl ChatCompletionRequest {
    /// Whether the final usage record should be appended to a
    /// streaming response.
    pub fn wants_usage(&self) -> bool {
        self.stream_options
            .as_ref()
            .map(|o| o.include_usage)
            .unwrap_or(false)
    }
}

/// One entry in the request's message list.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default)]
    pub tool_calls: Option<Value>,
}

/// Message content as clients send it: either a bare string or an
/// array of typed parts.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub part_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl MessageContent {
    /// Flatten to plain text. Non-text parts are dropped.
    pub fn normalize(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|p| p.part_type == "text")
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// Non-streaming response body.
#[derive(Clone, Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ResponseChoice>,
    pub usage: UsageBody,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResponseChoice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResponseMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatCompletionResponse {
    pub fn new(id: String, created: i64, model: String, text: String, usage: UsageBody) -> Self {
        Self {
            id,
            object: "chat.completion",
            created,
            model,
            choices: vec![ResponseChoice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant",
                    content: text,
                },
                finish_reason: "stop",
            }],
            usage,
        }
    }
}

/// One streamed chunk, serialized into an SSE data frame.
#[derive(Clone, Debug, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageBody>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: DeltaContent,
    /// Always present on the wire, `null` until the terminal chunk.
    pub finish_reason: Option<&'static str>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct DeltaContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Token accounting in OpenAI's field names.
#[derive(Clone, Debug, Serialize)]
pub struct UsageBody {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl From<&UsageTally> for UsageBody {
    fn from(tally: &UsageTally) -> Self {
        Self {
            prompt_tokens: tally.input_tokens,
            completion_tokens: tally.output_tokens,
            total_tokens: tally.total_tokens(),
        }
    }
}

/// Entry in the `GET /v1/models` listing.
#[derive(Clone, Debug, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

impl ModelList {
    pub fn single(model: String) -> Self {
        Self {
            object: "list",
            data: vec![ModelEntry {
                id: model,
                object: "model",
                created: chrono::Utc::now().timestamp(),
                owned_by: "jasque",
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_content() {
        let body = r#"{"messages":[{"role":"user","content":"hello"}],"stream":true}"#;
        let request: ChatCompletionRequest = serde_json::from_str(body).unwrap();
        assert!(request.stream);
        assert_eq!(request.messages[0].content.normalize(), "hello");
    }

    #[test]
    fn parses_multipart_content() {
        let body = r#"{
            "model": "jasque",
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "part one "},
                    {"type": "image_url", "image_url": {"url": "x"}},
                    {"type": "text", "text": "part two"}
                ]
            }]
        }"#;
        let request: ChatCompletionRequest = serde_json::from_str(body).unwrap();
        assert!(!request.stream);
        assert_eq!(
            request.messages[0].content.normalize(),
            "part one part two"
        );
    }

    #[test]
    fn missing_content_defaults_to_empty() {
        let body = r#"{"messages":[{"role":"assistant","tool_calls":[]}]}"#;
        let request: ChatCompletionRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.messages[0].content.normalize(), "");
    }

    #[test]
    fn wants_usage_reads_stream_options() {
        let body = r#"{
            "messages": [{"role":"user","content":"hi"}],
            "stream": true,
            "stream_options": {"include_usage": true}
        }"#;
        let request: ChatCompletionRequest = serde_json::from_str(body).unwrap();
        assert!(request.wants_usage());
    }

    #[test]
    fn finish_reason_serializes_as_explicit_null() {
        let choice = ChunkChoice {
            index: 0,
            delta: DeltaContent {
                role: None,
                content: Some("hi".to_string()),
            },
            finish_reason: None,
        };
        let json = serde_json::to_value(&choice).unwrap();
        assert!(json.get("finish_reason").is_some());
        assert!(json["finish_reason"].is_null());
        assert!(json["delta"].get("role").is_none());
    }

    #[test]
    fn usage_body_totals_from_tally() {
        let tally = UsageTally::from_counts(10, 4);
        let body = UsageBody::from(&tally);
        assert_eq!(body.prompt_tokens, 10);
        assert_eq!(body.completion_tokens, 4);
        assert_eq!(body.total_tokens, 14);
    }
}
