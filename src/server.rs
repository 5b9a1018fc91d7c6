use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::logging::SharedLogger;
use crate::proxy::{self, EventStream};
use crate::router::ModelRouter;
use crate::signatures::SignatureCache;
use crate::translate::anthropic_types::{ErrorResponse, MessagesRequest};
use crate::translate::openai_types::ChatCompletionRequest;
use crate::translate::request::{anthropic_to_google, openai_to_anthropic};
use crate::translate::response::anthropic_to_openai;
use crate::translate::streaming::OpenAiFrameTranslator;
use crate::upstream::UpstreamClient;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub struct AppState {
    pub config: ProxyConfig,
    pub models: ModelRouter,
    pub signatures: Arc<SignatureCache>,
    pub upstream: UpstreamClient,
    pub logger: SharedLogger,
    pub empty_retries: AtomicU64,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/messages", post(handle_messages))
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/v1/models", get(handle_models))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bearer token compared byte-for-byte against the configured API key.
fn check_auth(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ProxyError::Unauthorized)?;

    if presented.as_bytes() != state.config.api_key.as_bytes() {
        return Err(ProxyError::Unauthorized);
    }
    Ok(())
}

fn error_response(err: &ProxyError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::from_proxy_error(err))).into_response()
}

async fn handle_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = check_auth(&state, &headers) {
        return error_response(&e);
    }

    let req: MessagesRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            state
                .logger
                .error("server", format!("Failed to parse request: {}", e));
            return error_response(&ProxyError::Json(e));
        }
    };

    let is_streaming = req.stream.unwrap_or(false);
    state.logger.info(
        "server",
        format!(
            "messages: model={} streaming={} messages={}",
            req.model,
            is_streaming,
            req.messages.len()
        ),
    );

    let route = match state.models.resolve(&req.model) {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    let google_req = match anthropic_to_google(&req, &route, &state.signatures) {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    if is_streaming {
        match proxy::proxy_stream_events(
            &state.upstream,
            &google_req,
            &req.model,
            &route,
            state.signatures.clone(),
            &state.empty_retries,
            &state.logger,
        )
        .await
        {
            Ok(events) => anthropic_sse_response(events),
            Err(e) => error_response(&e),
        }
    } else {
        match proxy::proxy_non_streaming(
            &state.upstream,
            &google_req,
            &req.model,
            &state.empty_retries,
            &state.logger,
        )
        .await
        {
            Ok(resp) => Json(resp).into_response(),
            Err(e) => error_response(&e),
        }
    }
}

async fn handle_chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = check_auth(&state, &headers) {
        return error_response(&e);
    }

    let req: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            state
                .logger
                .error("server", format!("Failed to parse request: {}", e));
            return error_response(&ProxyError::Json(e));
        }
    };

    let anthropic_req = match openai_to_anthropic(&req) {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    let is_streaming = anthropic_req.stream.unwrap_or(false);
    state.logger.info(
        "server",
        format!(
            "chat/completions: model={} streaming={} messages={}",
            req.model,
            is_streaming,
            req.messages.len()
        ),
    );

    let route = match state.models.resolve(&anthropic_req.model) {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    let google_req = match anthropic_to_google(&anthropic_req, &route, &state.signatures) {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    if is_streaming {
        match proxy::proxy_stream_events(
            &state.upstream,
            &google_req,
            &anthropic_req.model,
            &route,
            state.signatures.clone(),
            &state.empty_retries,
            &state.logger,
        )
        .await
        {
            Ok(events) => openai_sse_response(events, &req.model),
            Err(e) => error_response(&e),
        }
    } else {
        match proxy::proxy_non_streaming(
            &state.upstream,
            &google_req,
            &anthropic_req.model,
            &state.empty_retries,
            &state.logger,
        )
        .await
        {
            Ok(resp) => Json(anthropic_to_openai(&resp, &req.model)).into_response(),
            Err(e) => error_response(&e),
        }
    }
}

/// Anthropic SSE framing: one named event per translated event. A mid-stream
/// failure after `message_start` becomes a final `error` event.
fn anthropic_sse_response(events: EventStream) -> Response {
    let sse_stream = events.map(|result| -> std::result::Result<Event, Infallible> {
        Ok(match result {
            Ok(event) => Event::default()
                .event(event.event_name())
                .data(serde_json::to_string(&event).unwrap_or_default()),
            Err(e) => Event::default()
                .event("error")
                .data(serde_json::to_string(&ErrorResponse::from_proxy_error(&e)).unwrap_or_default()),
        })
    });

    Sse::new(sse_stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// OpenAI SSE framing: data-only chunks, a terminal `data: [DONE]` line on
/// success. Thinking content never reaches this dialect.
fn openai_sse_response(events: EventStream, model: &str) -> Response {
    let mut framer = OpenAiFrameTranslator::new(model);
    let mut events = events;

    let sse_stream = async_stream::stream! {
        while let Some(result) = events.next().await {
            match result {
                Ok(event) => {
                    for chunk in framer.process_event(&event) {
                        yield Ok::<Event, Infallible>(
                            Event::default()
                                .data(serde_json::to_string(&chunk).unwrap_or_default()),
                        );
                    }
                }
                Err(e) => {
                    let body = ErrorResponse::from_proxy_error(&e);
                    yield Ok(Event::default()
                        .data(serde_json::to_string(&body).unwrap_or_default()));
                    return;
                }
            }
        }
        yield Ok(Event::default().data("[DONE]"));
    };

    Sse::new(sse_stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn handle_models() -> Json<serde_json::Value> {
    let models: Vec<serde_json::Value> = ModelRouter::caller_models()
        .into_iter()
        .map(|name| {
            serde_json::json!({
                "id": name,
                "object": "model",
                "owned_by": "cloudcode",
            })
        })
        .collect();

    Json(serde_json::json!({ "data": models, "object": "list" }))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let cache = state.signatures.stats();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "signature_cache": { "hits": cache.hits, "misses": cache.misses },
        "empty_response_retries": state.empty_retries.load(Ordering::Relaxed),
        "wide_context": state.models.wide_context(),
    }))
}
