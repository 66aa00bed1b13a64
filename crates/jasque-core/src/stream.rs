use crate::run::{PartPayload, ResponsePart, RunEvent};

/// Canonical events consumed by the wire transcoder. Ordering contract:
///
/// (PartStarted → PartDelta* )* → TurnFinished, repeated once per internal
/// turn; the sequence as a whole ends when the producing run is exhausted.
///
/// A `PartStarted` for a text part may itself carry non-empty initial
/// content. That content is the first payload of the part, not an
/// announcement, and must be forwarded downstream like any delta.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    PartStarted {
        kind: PartKind,
        initial_content: Option<String>,
    },
    PartDelta {
        kind: PartKind,
        content: Option<String>,
    },
    TurnFinished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartKind {
    Text,
    Thinking,
    ToolCall,
}

impl StreamEvent {
    /// Normalize a raw run event. Every raw event maps to exactly one
    /// canonical event; nothing is dropped at this layer.
    pub fn from_run_event(event: &RunEvent) -> Self {
        match event {
            RunEvent::PartStart { part } => match part {
                ResponsePart::Text { content } => Self::PartStarted {
                    kind: PartKind::Text,
                    initial_content: if content.is_empty() {
                        None
                    } else {
                        Some(content.clone())
                    },
                },
                ResponsePart::Thinking { content } => Self::PartStarted {
                    kind: PartKind::Thinking,
                    initial_content: Some(content.clone()),
                },
                ResponsePart::ToolCall { .. } => Self::PartStarted {
                    kind: PartKind::ToolCall,
                    initial_content: None,
                },
            },
            RunEvent::PartDelta { delta } => match delta {
                PartPayload::Text { content } => Self::PartDelta {
                    kind: PartKind::Text,
                    content: Some(content.clone()),
                },
                PartPayload::Thinking { content } => Self::PartDelta {
                    kind: PartKind::Thinking,
                    content: Some(content.clone()),
                },
                PartPayload::ToolCall { arguments } => Self::PartDelta {
                    kind: PartKind::ToolCall,
                    content: Some(arguments.clone()),
                },
            },
            RunEvent::TurnEnd { .. } => Self::TurnFinished,
        }
    }

    /// User-visible text carried by this event, if any. Only text parts
    /// contribute; thinking and tool-call payloads never surface here.
    pub fn visible_text(&self) -> Option<&str> {
        match self {
            Self::PartStarted {
                kind: PartKind::Text,
                initial_content: Some(content),
            } if !content.is_empty() => Some(content),
            Self::PartDelta {
                kind: PartKind::Text,
                content: Some(content),
            } => Some(content),
            _ => None,
        }
    }

    pub fn is_turn_boundary(&self) -> bool {
        matches!(self, Self::TurnFinished)
    }
}
