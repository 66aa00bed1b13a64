//! HTTP server assembly: state, router, startup.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use jasque_agent::{AgentRunner, OpenAiProvider, RunnerConfig};
use jasque_core::provider::ModelProvider;
use jasque_vault::Vault;

use crate::completions::{chat_completions, list_models};
use crate::config::ServerConfig;

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<AgentRunner>,
    pub vault: Arc<Vault>,
    pub model_name: String,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(config: ServerConfig) -> Result<ServerHandle, std::io::Error> {
    let provider = Arc::new(OpenAiProvider::new(
        config.upstream_base_url.clone(),
        config.upstream_api_key.clone(),
        config.upstream_model.clone(),
    ));
    start_with_provider(config, provider).await
}

/// Like [`start`] but with a caller-supplied model provider. Used by
/// tests to run the full HTTP surface against a scripted model.
pub async fn start_with_provider(
    config: ServerConfig,
    provider: Arc<dyn ModelProvider>,
) -> Result<ServerHandle, std::io::Error> {
    let vault = Arc::new(Vault::new(config.vault_path.clone()));
    let registry = Arc::new(jasque_agent::tools::builtin_registry(Arc::clone(&vault)));
    let runner = Arc::new(
        AgentRunner::new(provider, registry).with_config(RunnerConfig {
            max_turns: config.max_turns,
        }),
    );

    let app_state = AppState {
        runner,
        vault,
        model_name: config.model_name.clone(),
    };

    let router = build_router(app_state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "Jasque server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
    })
}

/// Handle returned by `start()`. Keeps the server task alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

async fn health_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jasque_agent::{MockProvider, MockResponse};
    use jasque_core::errors::AgentError;
    use jasque_core::usage::UsageTally;
    use serde_json::{json, Value};

    fn temp_vault() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("jasque-server-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_config(vault_path: std::path::PathBuf) -> ServerConfig {
        ServerConfig {
            port: 0,
            vault_path,
            ..ServerConfig::default()
        }
    }

    async fn spawn_with(responses: Vec<MockResponse>) -> ServerHandle {
        let provider = Arc::new(MockProvider::new(responses));
        start_with_provider(test_config(temp_vault()), provider)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let handle = spawn_with(vec![]).await;
        let body: Value = reqwest::get(format!("http://127.0.0.1:{}/health", handle.port))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn models_endpoint_lists_the_configured_model() {
        let handle = spawn_with(vec![]).await;
        let body: Value = reqwest::get(format!("http://127.0.0.1:{}/v1/models", handle.port))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["object"], "list");
        assert_eq!(body["data"][0]["id"], "jasque");
    }

    #[tokio::test]
    async fn non_streaming_completion_returns_full_text() {
        let handle = spawn_with(vec![MockResponse::text_turn(
            &["Hello", " there"],
            UsageTally::from_counts(12, 4),
        )])
        .await;

        let body: Value = reqwest::Client::new()
            .post(format!(
                "http://127.0.0.1:{}/v1/chat/completions",
                handle.port
            ))
            .json(&json!({
                "messages": [{"role": "user", "content": "hi"}]
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["object"], "chat.completion");
        assert_eq!(body["choices"][0]["message"]["content"], "Hello there");
        assert_eq!(body["choices"][0]["finish_reason"], "stop");
        assert_eq!(body["usage"]["total_tokens"], 16);
        assert!(body["id"].as_str().unwrap().starts_with("chatcmpl-"));
    }

    #[tokio::test]
    async fn streaming_completion_emits_well_formed_sse() {
        let handle = spawn_with(vec![MockResponse::text_turn(
            &["Hel", "lo"],
            UsageTally::from_counts(9, 2),
        )])
        .await;

        let raw = reqwest::Client::new()
            .post(format!(
                "http://127.0.0.1:{}/v1/chat/completions",
                handle.port
            ))
            .json(&json!({
                "messages": [{"role": "user", "content": "hi"}],
                "stream": true,
                "stream_options": {"include_usage": true}
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(
            raw.headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );
        let text = raw.text().await.unwrap();
        let frames: Vec<&str> = text
            .split("\n\n")
            .filter(|f| !f.is_empty())
            .map(|f| f.strip_prefix("data: ").unwrap())
            .collect();

        assert_eq!(frames.len(), 6);
        let role: Value = serde_json::from_str(frames[0]).unwrap();
        assert_eq!(role["choices"][0]["delta"]["role"], "assistant");
        let first: Value = serde_json::from_str(frames[1]).unwrap();
        assert_eq!(first["choices"][0]["delta"]["content"], "Hel");
        let second: Value = serde_json::from_str(frames[2]).unwrap();
        assert_eq!(second["choices"][0]["delta"]["content"], "lo");
        let terminal: Value = serde_json::from_str(frames[3]).unwrap();
        assert_eq!(terminal["choices"][0]["finish_reason"], "stop");
        let usage: Value = serde_json::from_str(frames[4]).unwrap();
        assert_eq!(usage["choices"], json!([]));
        assert_eq!(usage["usage"]["total_tokens"], 11);
        assert_eq!(frames[5], "[DONE]");
    }

    #[tokio::test]
    async fn streaming_failure_stays_on_the_wire_as_content() {
        let handle = spawn_with(vec![MockResponse::EventsThenError(
            vec![jasque_core::run::RunEvent::PartStart {
                part: jasque_core::run::ResponsePart::Text {
                    content: "partial".into(),
                },
            }],
            AgentError::StreamInterrupted("connection reset".into()),
        )])
        .await;

        let raw = reqwest::Client::new()
            .post(format!(
                "http://127.0.0.1:{}/v1/chat/completions",
                handle.port
            ))
            .json(&json!({
                "messages": [{"role": "user", "content": "hi"}],
                "stream": true
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(raw.status(), reqwest::StatusCode::OK);
        let text = raw.text().await.unwrap();
        assert!(text.contains("[Error: "), "got: {text}");
        assert!(text.contains(r#""finish_reason":"stop""#));
        assert!(text.trim_end().ends_with("data: [DONE]"));
    }

    #[tokio::test]
    async fn request_without_user_message_is_rejected() {
        let handle = spawn_with(vec![]).await;
        let response = reqwest::Client::new()
            .post(format!(
                "http://127.0.0.1:{}/v1/chat/completions",
                handle.port
            ))
            .json(&json!({ "messages": [] }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["detail"], "No user message found in request");
    }

    #[tokio::test]
    async fn malformed_preferences_reject_the_request() {
        let vault_path = temp_vault();
        let folder = vault_path.join("_jasque");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(
            folder.join("preferences.md"),
            "---\nstructured:\n  bad: [unclosed\n---\n",
        )
        .unwrap();

        let provider = Arc::new(MockProvider::new(vec![]));
        let handle = start_with_provider(test_config(vault_path), provider)
            .await
            .unwrap();

        let response = reqwest::Client::new()
            .post(format!(
                "http://127.0.0.1:{}/v1/chat/completions",
                handle.port
            ))
            .json(&json!({
                "messages": [{"role": "user", "content": "hi"}]
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .contains("_jasque/preferences.md"));
    }

    #[tokio::test]
    async fn non_streaming_failure_maps_to_500() {
        let handle = spawn_with(vec![MockResponse::Error(AgentError::Upstream {
            status: 503,
            body: "overloaded".into(),
        })])
        .await;

        let response = reqwest::Client::new()
            .post(format!(
                "http://127.0.0.1:{}/v1/chat/completions",
                handle.port
            ))
            .json(&json!({
                "messages": [{"role": "user", "content": "hi"}]
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            reqwest::StatusCode::INTERNAL_SERVER_ERROR
        );
        let body: Value = response.json().await.unwrap();
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .starts_with("Agent execution failed:"));
    }
}
