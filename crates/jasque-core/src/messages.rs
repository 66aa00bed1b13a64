use serde::{Deserialize, Serialize};

use crate::ids::ToolCallId;

/// Conversation history fed to the model provider. Serialized shape follows
/// the OpenAI chat-message convention the upstream endpoint expects.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "role")]
pub enum Message {
    #[serde(rename = "system")]
    System { content: String },
    #[serde(rename = "user")]
    User { content: String },
    #[serde(rename = "assistant")]
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallBlock>,
    },
    #[serde(rename = "tool")]
    ToolResult {
        tool_call_id: ToolCallId,
        content: String,
    },
}

/// One complete tool invocation requested by the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallBlock {
    pub id: ToolCallId,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCallBlock>) -> Self {
        Message::Assistant { content, tool_calls }
    }

    pub fn tool_result(tool_call_id: ToolCallId, content: impl Into<String>) -> Self {
        Message::ToolResult {
            tool_call_id,
            content: content.into(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Message::System { .. } => "system",
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::ToolResult { .. } => "tool",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_role_tag() {
        let msg = Message::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn assistant_omits_empty_tool_calls() {
        let msg = Message::assistant("hi there");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn tool_result_carries_call_id() {
        let id = ToolCallId::from_raw("call_1");
        let msg = Message::tool_result(id, "done");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
    }

    #[test]
    fn roundtrip_with_tool_calls() {
        let msg = Message::assistant_tool_calls(
            None,
            vec![ToolCallBlock {
                id: ToolCallId::from_raw("call_9"),
                name: "vault_query".into(),
                arguments: serde_json::json!({"operation": "get_tags"}),
            }],
        );
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        match parsed {
            Message::Assistant { content, tool_calls } => {
                assert!(content.is_none());
                assert_eq!(tool_calls.len(), 1);
                assert_eq!(tool_calls[0].name, "vault_query");
            }
            other => panic!("expected assistant message, got {other:?}"),
        }
    }

    #[test]
    fn role_accessor() {
        assert_eq!(Message::system("s").role(), "system");
        assert_eq!(Message::user("u").role(), "user");
    }
}
