//! OpenAI-compatible chat-completions provider.
//!
//! Speaks the streaming `chat/completions` wire protocol against a
//! configurable base URL, so any OpenAI-compatible backend works. The SSE
//! body is parsed incrementally from a byte buffer and mapped onto the run
//! event model: the first content delta opens a text part, later deltas
//! extend it, reasoning deltas map to thinking parts, and tool-call deltas
//! to tool-call parts.

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use jasque_core::errors::AgentError;
use jasque_core::ids::ToolCallId;
use jasque_core::messages::Message;
use jasque_core::provider::{ModelProvider, ModelRequest};
use jasque_core::run::{EventStream, PartPayload, ResponsePart, RunEvent, StopReason};
use jasque_core::tools::ToolDefinition;
use jasque_core::usage::UsageTally;

/// Streaming provider for an OpenAI-compatible endpoint.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(&self, request: &ModelRequest) -> Result<EventStream, AgentError> {
        let body = build_body(&self.model, request);
        let url = format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        );

        let mut http = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| AgentError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::from_status(status.as_u16(), body));
        }

        debug!(model = %self.model, "model stream opened");

        let mut bytes = response.bytes_stream();
        let stream = async_stream::try_stream! {
            let mut frames = FrameBuffer::new();
            let mut mapper = DeltaMapper::default();
            let mut done = false;

            'read: while let Some(chunk) = bytes.next().await {
                let chunk =
                    chunk.map_err(|e| AgentError::StreamInterrupted(e.to_string()))?;
                frames.push(&chunk);

                while let Some(payload) = frames.next_data() {
                    if payload == "[DONE]" {
                        done = true;
                        break 'read;
                    }
                    for event in mapper.map(&payload)? {
                        yield event;
                    }
                }
            }

            if !done {
                Err(AgentError::StreamInterrupted(
                    "stream ended before [DONE]".into(),
                ))?;
            }

            yield mapper.finish();
        };

        Ok(Box::pin(stream))
    }
}

fn build_body(model: &str, request: &ModelRequest) -> WireRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(Message::system(system.clone()));
    }
    messages.extend(request.messages.iter().cloned());

    WireRequest {
        model: model.to_string(),
        messages,
        tools: request.tools.iter().map(WireTool::from_definition).collect(),
        stream: true,
        stream_options: WireStreamOptions { include_usage: true },
    }
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    stream: bool,
    stream_options: WireStreamOptions,
}

#[derive(Debug, Serialize)]
struct WireStreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

impl WireTool {
    fn from_definition(def: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: def.name.clone(),
                description: def.description.clone(),
                parameters: def.parameters_schema.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "reasoning_content")]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Incremental SSE frame splitter. Bytes go in as they arrive; complete
/// `data:` payloads come out once the frame's blank-line terminator has
/// been seen.
struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn next_data(&mut self) -> Option<String> {
        loop {
            let (end, terminator_len) = self.frame_boundary()?;
            let frame = self.buf.split_to(end + terminator_len);
            let frame = String::from_utf8_lossy(&frame);

            let data: Vec<&str> = frame
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
                .collect();

            // Comment-only or empty frames are skipped.
            if !data.is_empty() {
                return Some(data.join("\n"));
            }
        }
    }

    /// Position and length of the earliest frame terminator, bare LF or
    /// CRLF pairs.
    fn frame_boundary(&self) -> Option<(usize, usize)> {
        let lf = self.buf.windows(2).position(|w| w == b"\n\n");
        let crlf = self.buf.windows(4).position(|w| w == b"\r\n\r\n");
        match (lf, crlf) {
            (Some(l), Some(c)) if c < l => Some((c, 4)),
            (Some(l), _) => Some((l, 2)),
            (None, Some(c)) => Some((c, 4)),
            (None, None) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OpenPart {
    Text,
    Thinking,
    ToolCall,
}

/// Maps decoded chunk payloads onto run events, tracking which response
/// part is currently open so starts and deltas come out in order.
#[derive(Default)]
struct DeltaMapper {
    open: Option<OpenPart>,
    stop_reason: Option<StopReason>,
    usage: UsageTally,
}

impl DeltaMapper {
    fn map(&mut self, payload: &str) -> Result<Vec<RunEvent>, AgentError> {
        let chunk: WireChunk = serde_json::from_str(payload)
            .map_err(|e| AgentError::MalformedEvent(format!("{e}: {payload}")))?;

        if let Some(usage) = chunk.usage {
            self.usage = UsageTally::from_counts(usage.prompt_tokens, usage.completion_tokens);
        }

        let mut events = Vec::new();
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(events);
        };

        if let Some(reason) = choice.finish_reason.as_deref() {
            self.stop_reason = Some(match reason {
                "tool_calls" | "function_call" => StopReason::ToolUse,
                "length" => StopReason::MaxTokens,
                _ => StopReason::EndTurn,
            });
        }

        if let Some(content) = choice.delta.reasoning {
            if self.open == Some(OpenPart::Thinking) {
                events.push(RunEvent::PartDelta {
                    delta: PartPayload::Thinking { content },
                });
            } else {
                self.open = Some(OpenPart::Thinking);
                events.push(RunEvent::PartStart {
                    part: ResponsePart::Thinking { content },
                });
            }
        }

        if let Some(content) = choice.delta.content {
            if self.open == Some(OpenPart::Text) {
                events.push(RunEvent::PartDelta {
                    delta: PartPayload::Text { content },
                });
            } else {
                self.open = Some(OpenPart::Text);
                events.push(RunEvent::PartStart {
                    part: ResponsePart::Text { content },
                });
            }
        }

        for call in choice.delta.tool_calls {
            let function = call.function.unwrap_or_default();
            if let Some(id) = call.id {
                self.open = Some(OpenPart::ToolCall);
                events.push(RunEvent::PartStart {
                    part: ResponsePart::ToolCall {
                        id: ToolCallId::from_raw(id),
                        name: function.name.clone().unwrap_or_default(),
                    },
                });
            }
            if let Some(arguments) = function.arguments {
                if !arguments.is_empty() {
                    events.push(RunEvent::PartDelta {
                        delta: PartPayload::ToolCall { arguments },
                    });
                }
            }
        }

        Ok(events)
    }

    fn finish(self) -> RunEvent {
        RunEvent::TurnEnd {
            stop_reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
            usage: self.usage,
        }
    }
}
