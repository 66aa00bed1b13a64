use async_trait::async_trait;

use crate::errors::AgentError;
use crate::messages::Message;
use crate::run::EventStream;
use crate::tools::ToolDefinition;

/// One model turn's worth of input.
#[derive(Clone, Debug, Default)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

impl ModelRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            system: None,
            messages,
            tools: Vec::new(),
        }
    }
}

/// Trait implemented by each model backend. The returned stream yields the
/// raw events of exactly one turn, ending with `RunEvent::TurnEnd`.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn stream(&self, request: &ModelRequest) -> Result<EventStream, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let req = ModelRequest::default();
        assert!(req.system.is_none());
        assert!(req.messages.is_empty());
        assert!(req.tools.is_empty());
    }

    #[test]
    fn request_from_messages() {
        let req = ModelRequest::new(vec![Message::user("hi")]);
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role(), "user");
    }
}
