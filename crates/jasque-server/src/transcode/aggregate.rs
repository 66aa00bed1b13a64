//! Non-streaming collection of a run into a single response body.

use futures::StreamExt;

use jasque_core::errors::AgentError;
use jasque_core::usage::UsageTally;

use crate::transcode::adapter::EventSource;

/// Everything a non-streaming response needs from a finished run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatedRun {
    pub text: String,
    pub usage: UsageTally,
}

/// Drain the event source and concatenate its user-visible text.
/// Unlike the streaming path, a failure here propagates so the caller
/// can still answer with an HTTP error status.
pub async fn aggregate(mut source: EventSource) -> Result<AggregatedRun, AgentError> {
    let mut text = String::new();
    while let Some(event) = source.next().await {
        if let Some(chunk) = event?.visible_text() {
            text.push_str(chunk);
        }
    }
    let usage = source.usage().unwrap_or_default();
    Ok(AggregatedRun { text, usage })
}
