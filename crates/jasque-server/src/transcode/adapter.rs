//! Flattens the runner's node stream into canonical stream events.

use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use async_stream::try_stream;
use futures::{Stream, StreamExt};

use jasque_core::errors::AgentError;
use jasque_core::run::{ExecutionNode, NodeStream};
use jasque_core::stream::StreamEvent;
use jasque_core::usage::UsageTally;

/// One flat, ordered sequence of canonical events drawn from a run.
///
/// Streamable nodes (model calls and tool executions) are drained in
/// node order and their events normalized; prompt markers produce
/// nothing. The completion marker also produces no event, but its
/// usage tally is captured and readable through [`EventSource::usage`]
/// once the stream is exhausted. A failure from the underlying run
/// surfaces as an `Err` item and ends the sequence.
pub struct EventSource {
    events: Pin<Box<dyn Stream<Item = Result<StreamEvent, AgentError>> + Send>>,
    usage: Arc<OnceLock<UsageTally>>,
}

impl EventSource {
    pub fn new(mut nodes: NodeStream) -> Self {
        let usage = Arc::new(OnceLock::new());
        let slot = Arc::clone(&usage);
        let events = try_stream! {
            while let Some(node) = nodes.next().await {
                match node? {
                    ExecutionNode::Prompt { .. } => {}
                    ExecutionNode::ModelCall { mut events }
                    | ExecutionNode::ToolExec { mut events } => {
                        while let Some(event) = events.next().await {
                            yield StreamEvent::from_run_event(&event?);
                        }
                    }
                    ExecutionNode::Completion { usage, .. } => {
                        let _ = slot.set(usage);
                    }
                }
            }
        };
        Self {
            events: Box::pin(events),
            usage,
        }
    }

    /// Usage accumulated over the run. `None` until the run's
    /// completion marker has been consumed.
    pub fn usage(&self) -> Option<UsageTally> {
        self.usage.get().cloned()
    }
}

impl Stream for EventSource {
    type Item = Result<StreamEvent, AgentError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.as_mut().poll_next(cx)
    }
}
