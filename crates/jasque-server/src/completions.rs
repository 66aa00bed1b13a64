//! Handlers for the OpenAI-compatible endpoints.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use jasque_vault::VaultError;

use crate::history::extract_conversation;
use crate::openai::{ChatCompletionRequest, ChatCompletionResponse, ModelList, UsageBody};
use crate::server::AppState;
use crate::transcode::{aggregate, ChunkAssembler, EventSource, StreamIdentity};

/// `POST /v1/chat/completions`. Streams SSE frames when the request
/// asks for streaming, otherwise runs the agent to completion and
/// answers with a single body.
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    let preferences = match state.vault.load_preferences() {
        Ok(preferences) => preferences,
        Err(error @ VaultError::PreferencesParse(_)) => {
            tracing::warn!(%error, "rejecting request over unparsable preferences");
            return error_response(StatusCode::BAD_REQUEST, error.to_string());
        }
        Err(error) => {
            tracing::warn!(%error, "could not load preferences, continuing without");
            None
        }
    };

    let Some(conversation) = extract_conversation(&request.messages) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "No user message found in request".to_string(),
        );
    };

    let model = request
        .model
        .clone()
        .unwrap_or_else(|| state.model_name.clone());
    let system = jasque_agent::prompt::system_prompt(preferences.as_ref());

    tracing::info!(
        model = %model,
        stream = request.stream,
        history_len = conversation.history.len(),
        "chat completion request"
    );

    let nodes = state
        .runner
        .run(conversation.prompt, conversation.history, system);
    let source = EventSource::new(nodes);

    if request.stream {
        let assembler = ChunkAssembler::new(StreamIdentity::new(model));
        let body = crate::transcode::stream_body(source, assembler, request.wants_usage());
        return sse_response(Body::from_stream(body));
    }

    match aggregate(source).await {
        Ok(collected) => {
            let identity = StreamIdentity::new(model);
            let response = ChatCompletionResponse::new(
                identity.chat_id.to_string(),
                identity.created,
                identity.model,
                collected.text,
                UsageBody::from(&collected.usage),
            );
            Json(response).into_response()
        }
        Err(error) => {
            tracing::error!(%error, kind = error.error_kind(), "agent run failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Agent execution failed: {error}"),
            )
        }
    }
}

/// `GET /v1/models`. One model, the configured name.
pub async fn list_models(State(state): State<AppState>) -> Response {
    Json(ModelList::single(state.model_name.clone())).into_response()
}

fn error_response(status: StatusCode, detail: String) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}

fn sse_response(body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    // Tells nginx-style proxies not to buffer the stream.
    headers.insert(
        "x-accel-buffering",
        HeaderValue::from_static("no"),
    );
    response
}
