use std::fmt;
use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::ids::ToolCallId;
use crate::usage::UsageTally;

/// Ordered raw events produced inside a streamable execution node.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<RunEvent, AgentError>> + Send>>;

/// Ordered execution nodes of one agent run.
pub type NodeStream = Pin<Box<dyn Stream<Item = Result<ExecutionNode, AgentError>> + Send>>;

/// One step of the agent's run graph. Only `ModelCall` and `ToolExec`
/// carry a nested event stream; the other kinds are markers.
pub enum ExecutionNode {
    /// The user prompt entering the run. Not streamable.
    Prompt { prompt: String },
    /// One model turn; events arrive incrementally as the model responds.
    ModelCall { events: EventStream },
    /// Tool execution between model turns; events report call progress.
    ToolExec { events: EventStream },
    /// End of the run, with the final text and accumulated usage.
    Completion { output: String, usage: UsageTally },
}

impl ExecutionNode {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Prompt { .. } => "prompt",
            Self::ModelCall { .. } => "model_call",
            Self::ToolExec { .. } => "tool_exec",
            Self::Completion { .. } => "completion",
        }
    }

    pub fn is_streamable(&self) -> bool {
        matches!(self, Self::ModelCall { .. } | Self::ToolExec { .. })
    }

    /// Take the nested event stream, if this node kind has one.
    pub fn into_events(self) -> Option<EventStream> {
        match self {
            Self::ModelCall { events } | Self::ToolExec { events } => Some(events),
            _ => None,
        }
    }
}

impl fmt::Debug for ExecutionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prompt { prompt } => f.debug_struct("Prompt").field("prompt", prompt).finish(),
            Self::ModelCall { .. } => f.write_str("ModelCall { .. }"),
            Self::ToolExec { .. } => f.write_str("ToolExec { .. }"),
            Self::Completion { output, usage } => f
                .debug_struct("Completion")
                .field("output", output)
                .field("usage", usage)
                .finish(),
        }
    }
}

/// Raw heterogeneous event inside a streamable node.
#[derive(Clone, Debug)]
pub enum RunEvent {
    /// A new response part opened. Text parts may already carry content.
    PartStart { part: ResponsePart },
    /// Incremental payload for the currently open part.
    PartDelta { delta: PartPayload },
    /// The model finished this turn.
    TurnEnd { stop_reason: StopReason, usage: UsageTally },
}

/// The opening shape of a response part.
#[derive(Clone, Debug)]
pub enum ResponsePart {
    Text { content: String },
    Thinking { content: String },
    ToolCall { id: ToolCallId, name: String },
}

/// Incremental payload matching an open part.
#[derive(Clone, Debug)]
pub enum PartPayload {
    Text { content: String },
    Thinking { content: String },
    ToolCall { arguments: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn empty_events() -> EventStream {
        Box::pin(stream::iter(Vec::<Result<RunEvent, AgentError>>::new()))
    }

    #[test]
    fn node_kinds() {
        assert_eq!(ExecutionNode::Prompt { prompt: "hi".into() }.kind(), "prompt");
        assert_eq!(ExecutionNode::ModelCall { events: empty_events() }.kind(), "model_call");
        assert_eq!(ExecutionNode::ToolExec { events: empty_events() }.kind(), "tool_exec");
        assert_eq!(
            ExecutionNode::Completion { output: "done".into(), usage: UsageTally::default() }.kind(),
            "completion"
        );
    }

    #[test]
    fn only_two_kinds_are_streamable() {
        assert!(ExecutionNode::ModelCall { events: empty_events() }.is_streamable());
        assert!(ExecutionNode::ToolExec { events: empty_events() }.is_streamable());
        assert!(!ExecutionNode::Prompt { prompt: "p".into() }.is_streamable());
        assert!(!ExecutionNode::Completion {
            output: String::new(),
            usage: UsageTally::default()
        }
        .is_streamable());
    }

    #[test]
    fn into_events_matches_streamability() {
        assert!(ExecutionNode::ModelCall { events: empty_events() }.into_events().is_some());
        assert!(ExecutionNode::Prompt { prompt: "p".into() }.into_events().is_none());
    }

    #[test]
    fn stop_reason_serde() {
        let json = serde_json::to_string(&StopReason::ToolUse).unwrap();
        assert_eq!(json, r#""tool_use""#);
    }
}
