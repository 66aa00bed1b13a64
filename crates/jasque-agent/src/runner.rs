//! The agent run loop: prompt in, execution nodes out.
//!
//! Each run yields a `Prompt` node, then alternates `ModelCall` and
//! `ToolExec` nodes until a turn ends without tool use, and closes with a
//! `Completion` node carrying the final text and accumulated usage.
//! Provider draining and tool execution run on spawned tasks feeding
//! unbounded channels, so nested event streams progress no matter how the
//! consumer interleaves them with node-stream polling: drain a node's
//! events first, or skip them entirely, and the run still completes.
//! Dropping the node stream cancels the in-flight provider call and
//! signals running tools to abort.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use jasque_core::errors::AgentError;
use jasque_core::ids::{RunId, ToolCallId};
use jasque_core::messages::{Message, ToolCallBlock};
use jasque_core::provider::{ModelProvider, ModelRequest};
use jasque_core::run::{
    EventStream, ExecutionNode, NodeStream, PartPayload, ResponsePart, RunEvent, StopReason,
};
use jasque_core::tools::{ExecutionMode, ToolContext};
use jasque_core::usage::UsageTally;

use crate::registry::ToolRegistry;

type EventSender = mpsc::UnboundedSender<Result<RunEvent, AgentError>>;

/// Run loop configuration.
#[derive(Clone, Copy, Debug)]
pub struct RunnerConfig {
    /// Upper bound on model turns per prompt, to stop runaway tool loops.
    pub max_turns: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { max_turns: 25 }
    }
}

/// Drives a prompt through model turns and tool execution.
pub struct AgentRunner {
    provider: Arc<dyn ModelProvider>,
    registry: Arc<ToolRegistry>,
    config: RunnerConfig,
}

impl AgentRunner {
    pub fn new(provider: Arc<dyn ModelProvider>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            registry,
            config: RunnerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Start a run. `history` is the prior conversation, `system` the full
    /// system prompt for this run.
    pub fn run(
        &self,
        prompt: impl Into<String>,
        history: Vec<Message>,
        system: String,
    ) -> NodeStream {
        let provider = Arc::clone(&self.provider);
        let registry = Arc::clone(&self.registry);
        let max_turns = self.config.max_turns;
        let prompt = prompt.into();

        let stream = async_stream::try_stream! {
            let run_id = RunId::new();
            let cancel = CancellationToken::new();
            let _abort_on_drop = cancel.clone().drop_guard();

            info!(run_id = %run_id, "agent run started");
            yield ExecutionNode::Prompt { prompt: prompt.clone() };

            let mut messages = history;
            messages.push(Message::user(prompt));

            let mut total_usage = UsageTally::default();
            let mut turn = 0u32;

            let final_text = loop {
                turn += 1;
                if turn > max_turns {
                    warn!(run_id = %run_id, max_turns, "turn limit reached");
                    Err(AgentError::TurnLimit(max_turns))?;
                }

                let request = ModelRequest {
                    system: Some(system.clone()),
                    messages: messages.clone(),
                    tools: registry.definitions(),
                };

                let events = provider.stream(&request).await?;

                let (tx, rx) = mpsc::unbounded_channel();
                let forwarded: EventStream = Box::pin(UnboundedReceiverStream::new(rx));
                let pump = tokio::spawn(pump_turn(events, tx, cancel.clone()));
                yield ExecutionNode::ModelCall { events: forwarded };

                let accum = pump
                    .await
                    .map_err(|e| AgentError::StreamInterrupted(format!("model turn task failed: {e}")))??;

                let outcome = accum.finish();
                total_usage.add(&outcome.usage);

                if outcome.stop_reason == StopReason::ToolUse && !outcome.calls.is_empty() {
                    messages.push(Message::assistant_tool_calls(
                        (!outcome.text.is_empty()).then(|| outcome.text.clone()),
                        outcome.calls.clone(),
                    ));

                    let (tx, rx) = mpsc::unbounded_channel();
                    let tool_events: EventStream = Box::pin(UnboundedReceiverStream::new(rx));
                    let ctx = ToolContext {
                        run_id: run_id.clone(),
                        abort_signal: cancel.clone(),
                    };
                    let exec_registry = Arc::clone(&registry);
                    let calls = outcome.calls.clone();
                    let exec = tokio::spawn(async move {
                        execute_calls(&exec_registry, &calls, &ctx, &tx).await
                    });
                    yield ExecutionNode::ToolExec { events: tool_events };

                    let results = exec
                        .await
                        .map_err(|e| AgentError::StreamInterrupted(format!("tool task failed: {e}")))?;

                    for (id, content) in results {
                        messages.push(Message::tool_result(id, content));
                    }
                    continue;
                }

                break outcome.text;
            };

            info!(
                run_id = %run_id,
                turns = turn,
                total_tokens = total_usage.total_tokens(),
                "agent run finished"
            );
            yield ExecutionNode::Completion {
                output: final_text,
                usage: total_usage,
            };
        };

        Box::pin(stream)
    }
}

/// Drain one provider turn on its own task: every event is accumulated
/// and forwarded to the node's event channel as it arrives, so consumers
/// of the nested stream see events without having to poll the node
/// stream. Cancellation (the run being dropped) aborts the drain and
/// with it the underlying provider stream.
async fn pump_turn(
    mut events: EventStream,
    tx: EventSender,
    cancel: CancellationToken,
) -> Result<TurnAccum, AgentError> {
    let mut accum = TurnAccum::default();
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            item = events.next() => item,
        };
        let Some(item) = item else { break };
        match item {
            Ok(event) => {
                accum.observe(&event);
                let _ = tx.send(Ok(event));
            }
            Err(e) => {
                let _ = tx.send(Err(e.clone()));
                return Err(e);
            }
        }
    }
    Ok(accum)
}

/// What one model turn produced, assembled from its event stream.
struct TurnOutcome {
    text: String,
    calls: Vec<ToolCallBlock>,
    stop_reason: StopReason,
    usage: UsageTally,
}

#[derive(Default)]
struct TurnAccum {
    text: String,
    calls: Vec<RawCall>,
    stop_reason: Option<StopReason>,
    usage: UsageTally,
}

struct RawCall {
    id: ToolCallId,
    name: String,
    arguments: String,
}

impl TurnAccum {
    fn observe(&mut self, event: &RunEvent) {
        match event {
            RunEvent::PartStart { part } => match part {
                ResponsePart::Text { content } => self.text.push_str(content),
                ResponsePart::ToolCall { id, name } => self.calls.push(RawCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: String::new(),
                }),
                ResponsePart::Thinking { .. } => {}
            },
            RunEvent::PartDelta { delta } => match delta {
                PartPayload::Text { content } => self.text.push_str(content),
                PartPayload::ToolCall { arguments } => {
                    if let Some(call) = self.calls.last_mut() {
                        call.arguments.push_str(arguments);
                    }
                }
                PartPayload::Thinking { .. } => {}
            },
            RunEvent::TurnEnd { stop_reason, usage } => {
                self.stop_reason = Some(*stop_reason);
                self.usage = *usage;
            }
        }
    }

    fn finish(self) -> TurnOutcome {
        let calls = self
            .calls
            .into_iter()
            .map(|call| ToolCallBlock {
                id: call.id,
                name: call.name,
                arguments: parse_arguments(&call.arguments),
            })
            .collect();
        TurnOutcome {
            text: self.text,
            calls,
            stop_reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
            usage: self.usage,
        }
    }
}

/// Tool-call arguments arrive as a raw JSON string; an empty or broken
/// string becomes an empty object so the tool can report the problem.
fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(Default::default());
    }
    serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
}

/// Execute the turn's tool calls. Consecutive concurrent tools run as one
/// joined batch; sequential tools run alone, in call order.
async fn execute_calls(
    registry: &ToolRegistry,
    calls: &[ToolCallBlock],
    ctx: &ToolContext,
    events: &EventSender,
) -> Vec<(ToolCallId, String)> {
    let mut results = Vec::with_capacity(calls.len());
    let mut batch: Vec<&ToolCallBlock> = Vec::new();

    for call in calls {
        let concurrent = registry
            .get(&call.name)
            .map(|t| t.execution_mode() == ExecutionMode::Concurrent)
            .unwrap_or(false);

        if concurrent {
            batch.push(call);
            continue;
        }

        flush_batch(registry, &mut batch, ctx, events, &mut results).await;
        results.push(execute_one(registry, call, ctx, events).await);
    }
    flush_batch(registry, &mut batch, ctx, events, &mut results).await;

    results
}

async fn flush_batch(
    registry: &ToolRegistry,
    batch: &mut Vec<&ToolCallBlock>,
    ctx: &ToolContext,
    events: &EventSender,
    results: &mut Vec<(ToolCallId, String)>,
) {
    if batch.is_empty() {
        return;
    }
    let futures: Vec<_> = batch
        .drain(..)
        .map(|call| execute_one(registry, call, ctx, events))
        .collect();
    results.extend(futures::future::join_all(futures).await);
}

async fn execute_one(
    registry: &ToolRegistry,
    call: &ToolCallBlock,
    ctx: &ToolContext,
    events: &EventSender,
) -> (ToolCallId, String) {
    let _ = events.send(Ok(RunEvent::PartStart {
        part: ResponsePart::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
        },
    }));

    let Some(tool) = registry.get(&call.name) else {
        warn!(tool = %call.name, "unknown tool requested");
        return (
            call.id.clone(),
            error_payload(&format!("Unknown tool: {}", call.name)),
        );
    };

    info!(run_id = %ctx.run_id, tool = %call.name, "tool execution started");
    match tool.execute(call.arguments.clone(), ctx).await {
        Ok(result) => {
            info!(
                tool = %call.name,
                is_error = result.is_error,
                duration_ms = result.duration.as_millis() as u64,
                "tool execution finished"
            );
            (call.id.clone(), result.content)
        }
        Err(e) => {
            warn!(tool = %call.name, error = %e, "tool execution failed");
            (call.id.clone(), error_payload(&e.to_string()))
        }
    }
}

fn error_payload(message: &str) -> String {
    serde_json::json!({"success": false, "message": message}).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockProvider, MockResponse};
    use async_trait::async_trait;
    use jasque_core::tools::{Tool, ToolError, ToolResult};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes its arguments back"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(
            &self,
            args: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult {
                content: serde_json::json!({"success": true, "echo": args}).to_string(),
                is_error: false,
                duration: Duration::from_millis(1),
            })
        }
    }

    async fn collect_nodes(mut stream: NodeStream) -> Vec<Result<ExecutionNode, AgentError>> {
        let mut nodes = Vec::new();
        while let Some(node) = stream.next().await {
            nodes.push(node);
        }
        nodes
    }

    /// Drain a nested event stream to exhaustion, failing fast instead of
    /// hanging if events stop flowing.
    async fn drain_events(mut events: EventStream) -> Vec<RunEvent> {
        let mut seen = Vec::new();
        loop {
            let next = timeout(Duration::from_secs(5), events.next())
                .await
                .expect("nested event stream stalled");
            match next {
                Some(event) => seen.push(event.unwrap()),
                None => break,
            }
        }
        seen
    }

    /// Provider whose turn never finishes; flags when its stream is dropped.
    struct HangingProvider {
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ModelProvider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }
        fn model(&self) -> &str {
            "hanging"
        }
        async fn stream(&self, _request: &ModelRequest) -> Result<EventStream, AgentError> {
            let flag = DropFlag(Arc::clone(&self.dropped));
            Ok(Box::pin(async_stream::stream! {
                let _flag = flag;
                yield Ok(RunEvent::PartStart {
                    part: ResponsePart::Text { content: "He".into() },
                });
                futures::future::pending::<()>().await;
            }))
        }
    }

    #[tokio::test]
    async fn plain_text_run() {
        let provider = Arc::new(MockProvider::new(vec![MockResponse::text_turn(
            &["Hello", " there"],
            UsageTally::from_counts(5, 3),
        )]));
        let runner = AgentRunner::new(provider, Arc::new(ToolRegistry::new()));

        let mut stream = runner.run("hi", Vec::new(), "system".into());

        let prompt = stream.next().await.unwrap().unwrap();
        assert!(matches!(prompt, ExecutionNode::Prompt { .. }));

        let model_call = stream.next().await.unwrap().unwrap();
        let mut events = model_call.into_events().unwrap();
        let mut count = 0;
        while let Some(event) = events.next().await {
            event.unwrap();
            count += 1;
        }
        assert_eq!(count, 3);

        match stream.next().await.unwrap().unwrap() {
            ExecutionNode::Completion { output, usage } => {
                assert_eq!(output, "Hello there");
                assert_eq!(usage.input_tokens, 5);
                assert_eq!(usage.output_tokens, 3);
                assert_eq!(usage.request_count, 1);
            }
            other => panic!("expected Completion, got {other:?}"),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn tool_round_trip() {
        let provider = Arc::new(MockProvider::new(vec![
            MockResponse::tool_call_turn(
                "call_1",
                "echo",
                r#"{"value": 7}"#,
                UsageTally::from_counts(10, 4),
            ),
            MockResponse::text_turn(&["done"], UsageTally::from_counts(20, 2)),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let runner = AgentRunner::new(Arc::clone(&provider) as Arc<dyn ModelProvider>, Arc::new(registry));

        let nodes = collect_nodes(runner.run("run the tool", Vec::new(), "system".into())).await;
        let kinds: Vec<&str> = nodes
            .iter()
            .map(|n| n.as_ref().unwrap().kind())
            .collect();
        assert_eq!(
            kinds,
            vec!["prompt", "model_call", "tool_exec", "model_call", "completion"]
        );

        // The second request must carry the assistant tool call and its result.
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let roles: Vec<&str> = requests[1].messages.iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec!["user", "assistant", "tool"]);
        match &requests[1].messages[2] {
            Message::ToolResult { content, .. } => {
                assert!(content.contains(r#""value":7"#));
            }
            other => panic!("expected tool result, got {other:?}"),
        }

        match nodes.last().unwrap().as_ref().unwrap() {
            ExecutionNode::Completion { output, usage } => {
                assert_eq!(output, "done");
                assert_eq!(usage.input_tokens, 30);
                assert_eq!(usage.request_count, 2);
            }
            other => panic!("expected Completion, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn nested_events_arrive_without_polling_the_node_stream() {
        let provider = Arc::new(MockProvider::new(vec![MockResponse::text_turn(
            &["Hel", "lo"],
            UsageTally::from_counts(5, 3),
        )]));
        let runner = AgentRunner::new(provider, Arc::new(ToolRegistry::new()));

        let mut stream = runner.run("hi", Vec::new(), "s".into());
        stream.next().await.unwrap().unwrap();
        let model_call = stream.next().await.unwrap().unwrap();

        // Drain the nested stream to exhaustion before touching the node
        // stream again; events must flow without another node poll.
        let events = drain_events(model_call.into_events().unwrap()).await;
        assert_eq!(events.len(), 3);

        match stream.next().await.unwrap().unwrap() {
            ExecutionNode::Completion { output, .. } => assert_eq!(output, "Hello"),
            other => panic!("expected Completion, got {other:?}"),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn tool_progress_arrives_without_polling_the_node_stream() {
        let provider = Arc::new(MockProvider::new(vec![
            MockResponse::tool_call_turn("call_1", "echo", "{}", UsageTally::default()),
            MockResponse::text_turn(&["done"], UsageTally::default()),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let runner = AgentRunner::new(provider, Arc::new(registry));

        let mut stream = runner.run("go", Vec::new(), "s".into());
        stream.next().await.unwrap().unwrap();

        // First model turn, nested events drained before the next node poll.
        let model_call = stream.next().await.unwrap().unwrap();
        assert_eq!(drain_events(model_call.into_events().unwrap()).await.len(), 3);

        // Tool execution likewise reports progress on its own.
        let tool_exec = stream.next().await.unwrap().unwrap();
        assert_eq!(tool_exec.kind(), "tool_exec");
        let progress = drain_events(tool_exec.into_events().unwrap()).await;
        assert!(matches!(
            &progress[0],
            RunEvent::PartStart { part: ResponsePart::ToolCall { name, .. } } if name == "echo"
        ));

        let second_call = stream.next().await.unwrap().unwrap();
        drain_events(second_call.into_events().unwrap()).await;
        assert_eq!(stream.next().await.unwrap().unwrap().kind(), "completion");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_run_cancels_the_in_flight_turn() {
        let dropped = Arc::new(AtomicBool::new(false));
        let provider = Arc::new(HangingProvider {
            dropped: Arc::clone(&dropped),
        });
        let runner = AgentRunner::new(provider, Arc::new(ToolRegistry::new()));

        let mut stream = runner.run("hi", Vec::new(), "s".into());
        stream.next().await.unwrap().unwrap();
        let model_call = stream.next().await.unwrap().unwrap();
        let mut events = model_call.into_events().unwrap();

        let first = timeout(Duration::from_secs(5), events.next())
            .await
            .expect("no event before disconnect")
            .expect("stream ended early");
        first.unwrap();

        drop(stream);
        // Give the drain task a chance to observe the cancellation.
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        assert!(dropped.load(Ordering::SeqCst), "provider stream not dropped");
    }

    #[tokio::test]
    async fn nodes_flow_without_draining_nested_events() {
        let provider = Arc::new(MockProvider::new(vec![MockResponse::text_turn(
            &["quick"],
            UsageTally::default(),
        )]));
        let runner = AgentRunner::new(provider, Arc::new(ToolRegistry::new()));

        // Drop every nested stream unread; the run must still complete.
        let nodes = collect_nodes(runner.run("hi", Vec::new(), "s".into())).await;
        assert_eq!(nodes.len(), 3);
        assert!(nodes.iter().all(|n| n.is_ok()));
    }

    #[tokio::test]
    async fn unknown_tool_reports_back_to_the_model() {
        let provider = Arc::new(MockProvider::new(vec![
            MockResponse::tool_call_turn("call_1", "missing_tool", "{}", UsageTally::default()),
            MockResponse::text_turn(&["recovered"], UsageTally::default()),
        ]));
        let runner = AgentRunner::new(
            Arc::clone(&provider) as Arc<dyn ModelProvider>,
            Arc::new(ToolRegistry::new()),
        );

        let nodes = collect_nodes(runner.run("go", Vec::new(), "s".into())).await;
        assert!(nodes.iter().all(|n| n.is_ok()));

        let requests = provider.requests();
        match &requests[1].messages[2] {
            Message::ToolResult { content, .. } => {
                assert!(content.contains("Unknown tool: missing_tool"));
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn turn_limit_stops_runaway_loops() {
        let provider = Arc::new(MockProvider::new(vec![
            MockResponse::tool_call_turn("call_1", "echo", "{}", UsageTally::default()),
            MockResponse::tool_call_turn("call_2", "echo", "{}", UsageTally::default()),
            MockResponse::tool_call_turn("call_3", "echo", "{}", UsageTally::default()),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let runner = AgentRunner::new(provider, Arc::new(registry))
            .with_config(RunnerConfig { max_turns: 2 });

        let nodes = collect_nodes(runner.run("loop", Vec::new(), "s".into())).await;
        let last = nodes.last().unwrap();
        assert!(matches!(last, Err(AgentError::TurnLimit(2))));
    }

    #[tokio::test]
    async fn mid_stream_error_propagates() {
        let provider = Arc::new(MockProvider::new(vec![MockResponse::EventsThenError(
            vec![RunEvent::PartStart {
                part: ResponsePart::Text {
                    content: "par".into(),
                },
            }],
            AgentError::StreamInterrupted("reset".into()),
        )]));
        let runner = AgentRunner::new(provider, Arc::new(ToolRegistry::new()));

        let nodes = collect_nodes(runner.run("hi", Vec::new(), "s".into())).await;
        assert!(matches!(
            nodes.last().unwrap(),
            Err(AgentError::StreamInterrupted(_))
        ));
    }

    #[tokio::test]
    async fn malformed_tool_arguments_become_empty_object() {
        assert_eq!(
            parse_arguments("not json"),
            serde_json::Value::Object(Default::default())
        );
        assert_eq!(
            parse_arguments(""),
            serde_json::Value::Object(Default::default())
        );
        assert_eq!(parse_arguments(r#"{"a":1}"#)["a"], 1);
    }
}
