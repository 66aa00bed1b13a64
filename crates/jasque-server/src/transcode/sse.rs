//! SSE framing and the streaming error boundary.
//!
//! Once the first frame has been flushed the HTTP status is already on
//! the wire, so a failure can no longer become an error response. The
//! body stream therefore never yields an error item: a run failure is
//! logged in full server-side and surfaced to the client as a readable
//! annotation inside the content stream, followed by a proper terminal
//! record and the end-of-stream sentinel, so clients always see a
//! well-formed response.

use std::convert::Infallible;

use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use jasque_core::errors::AgentError;

use crate::openai::ChatCompletionChunk;
use crate::transcode::adapter::EventSource;
use crate::transcode::assembler::ChunkAssembler;

/// Frame one record as an SSE data line.
pub fn data_frame(chunk: &ChatCompletionChunk) -> Option<Bytes> {
    match serde_json::to_string(chunk) {
        Ok(json) => Some(Bytes::from(format!("data: {json}\n\n"))),
        Err(error) => {
            tracing::error!(%error, "failed to encode stream chunk, dropping frame");
            None
        }
    }
}

/// The end-of-stream sentinel. Always the last frame.
pub fn done_frame() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

/// Client-facing message for a run failure. The full error is logged
/// server-side; the client gets a short readable line. Serde's phrasing
/// for broken history payloads is rewritten into advice the user can
/// act on.
pub fn friendly_message(error: &AgentError) -> String {
    let detail = error.to_string();
    if detail.contains("EOF while parsing")
        || detail.contains("Expecting")
        || detail.contains("expected value")
    {
        "Conversation history contains corrupted data. \
         Please start a new conversation in Obsidian Copilot."
            .to_string()
    } else {
        format!("Error: {detail}")
    }
}

/// Build the full SSE body for one streaming response.
///
/// Frame order: role record, content records in event order, terminal
/// record, optional usage record, sentinel. On a mid-stream failure
/// the remaining events are abandoned and the failure is folded into
/// the content stream before the terminal record.
pub fn stream_body(
    mut source: EventSource,
    mut assembler: ChunkAssembler,
    include_usage: bool,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    stream! {
        if let Some(frame) = assembler.role_record().as_ref().and_then(data_frame) {
            yield Ok(frame);
        }

        let mut failed = false;
        while let Some(item) = source.next().await {
            match item {
                Ok(event) => {
                    if let Some(frame) = assembler.record_for(&event).as_ref().and_then(data_frame) {
                        yield Ok(frame);
                    }
                }
                Err(error) => {
                    tracing::error!(
                        %error,
                        kind = error.error_kind(),
                        "agent run failed mid-stream"
                    );
                    let annotation = format!("\n\n[{}]", friendly_message(&error));
                    if let Some(frame) = data_frame(&assembler.content_record(&annotation)) {
                        yield Ok(frame);
                    }
                    failed = true;
                    break;
                }
            }
        }

        if let Some(frame) = assembler.terminal_record().as_ref().and_then(data_frame) {
            yield Ok(frame);
        }

        if include_usage && !failed {
            if let Some(usage) = source.usage() {
                if let Some(frame) = data_frame(&assembler.usage_record(&usage)) {
                    yield Ok(frame);
                }
            }
        }

        yield Ok(done_frame());
    }
}
