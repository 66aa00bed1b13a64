/// Typed error hierarchy for agent runs. Covers failures of the upstream
/// model call, tool execution, and the run loop itself.
#[derive(Clone, Debug, thiserror::Error)]
pub enum AgentError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("rate limited")]
    RateLimited,
    #[error("upstream error {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("tool {name} failed: {message}")]
    ToolFailed { name: String, message: String },
    #[error("turn limit reached after {0} turns")]
    TurnLimit(u32),
    #[error("cancelled")]
    Cancelled,
}

impl AgentError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited => "rate_limited",
            Self::Upstream { .. } => "upstream_error",
            Self::Network(_) => "network_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::MalformedEvent(_) => "malformed_event",
            Self::ToolFailed { .. } => "tool_failed",
            Self::TurnLimit(_) => "turn_limit",
            Self::Cancelled => "cancelled",
        }
    }

    /// Classify an HTTP status from the model provider.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 => Self::InvalidRequest(body),
            429 => Self::RateLimited,
            500..=599 => Self::Upstream { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}
