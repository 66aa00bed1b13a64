//! Deterministic provider double for tests. Responses are handed out in
//! call order, so multi-turn runs can be scripted without a live backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use jasque_core::errors::AgentError;
use jasque_core::ids::ToolCallId;
use jasque_core::provider::{ModelProvider, ModelRequest};
use jasque_core::run::{EventStream, PartPayload, ResponsePart, RunEvent, StopReason};
use jasque_core::usage::UsageTally;

/// Pre-programmed response for one provider call.
pub enum MockResponse {
    /// Yield these events, each wrapped in `Ok`.
    Events(Vec<RunEvent>),
    /// Yield events, then a stream-level error.
    EventsThenError(Vec<RunEvent>, AgentError),
    /// Fail the `stream()` call itself.
    Error(AgentError),
    /// Wait, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// A text turn: the first chunk opens the part, the rest are deltas.
    pub fn text_turn(chunks: &[&str], usage: UsageTally) -> Self {
        let mut events = Vec::with_capacity(chunks.len() + 1);
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                events.push(RunEvent::PartStart {
                    part: ResponsePart::Text {
                        content: chunk.to_string(),
                    },
                });
            } else {
                events.push(RunEvent::PartDelta {
                    delta: PartPayload::Text {
                        content: chunk.to_string(),
                    },
                });
            }
        }
        events.push(RunEvent::TurnEnd {
            stop_reason: StopReason::EndTurn,
            usage,
        });
        Self::Events(events)
    }

    /// A turn that requests one tool call and stops for tool use.
    pub fn tool_call_turn(id: &str, name: &str, arguments: &str, usage: UsageTally) -> Self {
        Self::Events(vec![
            RunEvent::PartStart {
                part: ResponsePart::ToolCall {
                    id: ToolCallId::from_raw(id),
                    name: name.to_string(),
                },
            },
            RunEvent::PartDelta {
                delta: PartPayload::ToolCall {
                    arguments: arguments.to_string(),
                },
            },
            RunEvent::TurnEnd {
                stop_reason: StopReason::ToolUse,
                usage,
            },
        ])
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Provider that replays scripted responses and records every request it
/// receives.
pub struct MockProvider {
    responses: Vec<MockResponse>,
    call_count: AtomicUsize,
    requests: Mutex<Vec<ModelRequest>>,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses,
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn stream(&self, request: &ModelRequest) -> Result<EventStream, AgentError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        let response = self.responses.get(idx).ok_or_else(|| {
            AgentError::InvalidRequest(format!("no mock response configured for call {idx}"))
        })?;

        resolve(response).await
    }
}

/// Resolve a response, unrolling nested delays iteratively.
async fn resolve(response: &MockResponse) -> Result<EventStream, AgentError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Events(events) => {
                let items: Vec<Result<RunEvent, AgentError>> =
                    events.iter().cloned().map(Ok).collect();
                return Ok(Box::pin(stream::iter(items)));
            }
            MockResponse::EventsThenError(events, error) => {
                let mut items: Vec<Result<RunEvent, AgentError>> =
                    events.iter().cloned().map(Ok).collect();
                items.push(Err(error.clone()));
                return Ok(Box::pin(stream::iter(items)));
            }
            MockResponse::Error(e) => return Err(e.clone()),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(*duration).await;
                current = inner;
            }
        }
    }
}
