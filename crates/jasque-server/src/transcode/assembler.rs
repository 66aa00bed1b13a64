//! Assembles canonical stream events into chunk records.
//!
//! Record order per response: one role announcement, then zero or more
//! content records, then exactly one terminal record, then optionally
//! a usage record. Thinking and tool-call events produce no record but
//! keep their position in the sequence, so text before and after a
//! tool round still arrives in order.

use jasque_core::ids::ChatId;
use jasque_core::stream::StreamEvent;
use jasque_core::usage::UsageTally;

use crate::openai::{ChatCompletionChunk, ChunkChoice, DeltaContent, UsageBody};

/// Identity shared by every record of one response: id and creation
/// timestamp are fixed when the response starts, not per chunk.
#[derive(Clone, Debug)]
pub struct StreamIdentity {
    pub chat_id: ChatId,
    pub created: i64,
    pub model: String,
}

impl StreamIdentity {
    pub fn new(model: String) -> Self {
        Self {
            chat_id: ChatId::new(),
            created: chrono::Utc::now().timestamp(),
            model,
        }
    }
}

/// Stateful record builder for one streaming response.
pub struct ChunkAssembler {
    identity: StreamIdentity,
    role_announced: bool,
    finished: bool,
}

impl ChunkAssembler {
    pub fn new(identity: StreamIdentity) -> Self {
        Self {
            identity,
            role_announced: false,
            finished: false,
        }
    }

    pub fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    /// The role announcement. Emitted once, before any content.
    pub fn role_record(&mut self) -> Option<ChatCompletionChunk> {
        if self.role_announced {
            return None;
        }
        self.role_announced = true;
        Some(self.chunk(
            DeltaContent {
                role: Some("assistant"),
                content: None,
            },
            None,
        ))
    }

    /// Record for one canonical event. Only user-visible text produces
    /// a record; thinking, tool-call and turn-boundary events yield
    /// `None` without disturbing the ordering of what surrounds them.
    pub fn record_for(&self, event: &StreamEvent) -> Option<ChatCompletionChunk> {
        event.visible_text().map(|text| self.content_record(text))
    }

    /// A bare content record. Also used by the error boundary to carry
    /// the failure annotation.
    pub fn content_record(&self, text: &str) -> ChatCompletionChunk {
        self.chunk(
            DeltaContent {
                role: None,
                content: Some(text.to_string()),
            },
            None,
        )
    }

    /// The terminal record, `finish_reason: "stop"`. Emitted at most
    /// once regardless of how many times completion is signalled.
    pub fn terminal_record(&mut self) -> Option<ChatCompletionChunk> {
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(self.chunk(DeltaContent::default(), Some("stop")))
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Usage record appended after the terminal record when the client
    /// asked for it. Carries no choices.
    pub fn usage_record(&self, usage: &UsageTally) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.identity.chat_id.to_string(),
            object: "chat.completion.chunk",
            created: self.identity.created,
            model: self.identity.model.clone(),
            choices: Vec::new(),
            usage: Some(UsageBody::from(usage)),
        }
    }

    fn chunk(&self, delta: DeltaContent, finish_reason: Option<&'static str>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.identity.chat_id.to_string(),
            object: "chat.completion.chunk",
            created: self.identity.created,
            model: self.identity.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: None,
        }
    }
}
