use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::ids::RunId;

/// Tools declare whether they can run in parallel with others.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Safe to run in parallel (read-only vault queries).
    Concurrent,
    /// Must run alone (vault mutations).
    Sequential,
}

/// Context available to tools during execution.
pub struct ToolContext {
    pub run_id: RunId,
    pub abort_signal: CancellationToken,
}

impl ToolContext {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            abort_signal: CancellationToken::new(),
        }
    }
}

/// Result returned by a tool execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

/// Tool definition sent to the model as part of the request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// Trait implemented by each tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Concurrent
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters_schema: self.parameters_schema(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("cancelled")]
    Cancelled,
}

/// Serde helper for Duration as milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_mode_serde() {
        let json = serde_json::to_string(&ExecutionMode::Concurrent).unwrap();
        assert_eq!(json, r#""concurrent""#);
        let json = serde_json::to_string(&ExecutionMode::Sequential).unwrap();
        assert_eq!(json, r#""sequential""#);
    }

    #[test]
    fn tool_result_duration_serializes_as_ms() {
        let result = ToolResult {
            content: "ok".into(),
            is_error: false,
            duration: Duration::from_millis(1234),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration"], 1234);

        let parsed: ToolResult = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.duration, Duration::from_millis(1234));
    }

    #[test]
    fn tool_error_display() {
        let err = ToolError::InvalidArguments("missing operation".into());
        assert_eq!(err.to_string(), "invalid arguments: missing operation");

        let err = ToolError::UnknownTool("nope".into());
        assert_eq!(err.to_string(), "unknown tool: nope");
    }
}
