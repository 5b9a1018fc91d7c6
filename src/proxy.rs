//! Stream driver: consumes the upstream SSE byte stream and produces the
//! translated Anthropic event sequence.
//!
//! Responsibilities beyond translation: idle-timeout supervision (warn at
//! 120 s, cancel at 180 s; total wall time is unbounded), empty-response
//! detection with a single retry, and aggregation for the non-streaming path.
//! Client disconnects drop the returned stream, which aborts the upstream
//! read; nothing is flushed partially.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use tokio::time::Instant;

use crate::error::{ProxyError, Result};
use crate::logging::SharedLogger;
use crate::router::Resolved;
use crate::signatures::SignatureCache;
use crate::translate::anthropic_types::{MessagesResponse, StreamEvent};
use crate::translate::google_types::{
    parse_stream_payload, Candidate, GenerateContentRequest, GoogleChunk, GoogleContent,
    GooglePart,
};
use crate::translate::response::google_to_anthropic;
use crate::translate::streaming::StreamTranslator;
use crate::upstream::UpstreamClient;

const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(5);
const IDLE_WARN_AFTER: Duration = Duration::from_secs(120);
const IDLE_CANCEL_AFTER: Duration = Duration::from_secs(180);

/// Translated Anthropic events for one request, in emission order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Forward a non-streaming request: consume the whole upstream stream and
/// deliver one aggregated Anthropic response. An empty upstream response is
/// retried once with the identical request body.
pub async fn proxy_non_streaming(
    upstream: &UpstreamClient,
    google_req: &GenerateContentRequest,
    caller_model: &str,
    empty_retries: &AtomicU64,
    logger: &SharedLogger,
) -> Result<MessagesResponse> {
    match collect_response(upstream, google_req, caller_model, logger).await {
        Err(ProxyError::EmptyResponse) => {
            empty_retries.fetch_add(1, Ordering::Relaxed);
            logger.warn("proxy", "Empty upstream response, retrying once");
            collect_response(upstream, google_req, caller_model, logger).await
        }
        other => other,
    }
}

/// Open the translated event stream for a streaming request.
///
/// The upstream is driven until the first translated events exist, so any
/// failure before `message_start` (upstream status, idle cancel, empty
/// response) surfaces here as a plain error and becomes an HTTP error
/// response. Empty responses are retried once.
pub async fn proxy_stream_events(
    upstream: &UpstreamClient,
    google_req: &GenerateContentRequest,
    caller_model: &str,
    route: &Resolved,
    signatures: Arc<SignatureCache>,
    empty_retries: &AtomicU64,
    logger: &SharedLogger,
) -> Result<EventStream> {
    match open_event_stream(
        upstream,
        google_req,
        caller_model,
        route,
        signatures.clone(),
        logger,
    )
    .await
    {
        Err(ProxyError::EmptyResponse) => {
            empty_retries.fetch_add(1, Ordering::Relaxed);
            logger.warn("proxy", "Empty upstream stream, retrying once");
            open_event_stream(upstream, google_req, caller_model, route, signatures, logger)
                .await
        }
        other => other,
    }
}

async fn open_event_stream(
    upstream: &UpstreamClient,
    google_req: &GenerateContentRequest,
    caller_model: &str,
    route: &Resolved,
    signatures: Arc<SignatureCache>,
    logger: &SharedLogger,
) -> Result<EventStream> {
    let byte_stream = upstream.stream_generate(google_req).await?;
    let mut chunks = Box::pin(google_chunk_stream(byte_stream, logger.clone()));

    let mut translator = StreamTranslator::new(caller_model, route, signatures);
    let mut pending: Vec<StreamEvent> = Vec::new();

    // Drive until the first translated events (message_start rides with the
    // first part-bearing chunk).
    loop {
        match chunks.next().await {
            Some(Ok(chunk)) => {
                pending.extend(translator.process_chunk(&chunk));
                if !pending.is_empty() {
                    break;
                }
            }
            Some(Err(e)) => return Err(e),
            None => return Err(ProxyError::EmptyResponse),
        }
    }

    let logger = logger.clone();
    let stream = async_stream::stream! {
        for event in pending {
            yield Ok(event);
        }

        loop {
            match chunks.next().await {
                Some(Ok(chunk)) => {
                    for event in translator.process_chunk(&chunk) {
                        yield Ok(event);
                    }
                }
                Some(Err(e)) => {
                    // Mid-stream failure after message_start: the surface
                    // emits this as a final SSE error event.
                    yield Err(e);
                    return;
                }
                None => break,
            }
        }

        for event in translator.finish() {
            yield Ok(event);
        }
        logger.info("stream", "Stream completed");
    };

    Ok(Box::pin(stream))
}

async fn collect_response(
    upstream: &UpstreamClient,
    google_req: &GenerateContentRequest,
    caller_model: &str,
    logger: &SharedLogger,
) -> Result<MessagesResponse> {
    let byte_stream = upstream.stream_generate(google_req).await?;
    let mut chunks = Box::pin(google_chunk_stream(byte_stream, logger.clone()));

    let mut parts: Vec<GooglePart> = Vec::new();
    let mut finish_reason: Option<String> = None;
    let mut usage = None;
    let mut response_id = None;

    while let Some(item) = chunks.next().await {
        let chunk = item?;
        parts.extend_from_slice(chunk.parts());
        if let Some(reason) = chunk.finish_reason() {
            finish_reason = Some(reason.to_string());
        }
        if chunk.usage_metadata.is_some() {
            usage = chunk.usage_metadata;
        }
        if chunk.response_id.is_some() {
            response_id = chunk.response_id;
        }
    }

    if parts.is_empty() {
        return Err(ProxyError::EmptyResponse);
    }

    let aggregated = GoogleChunk {
        candidates: vec![Candidate {
            content: Some(GoogleContent {
                role: "model".to_string(),
                parts,
            }),
            finish_reason,
        }],
        usage_metadata: usage,
        model_version: None,
        response_id,
    };

    let response = google_to_anthropic(&aggregated, caller_model);
    logger.info(
        "proxy",
        format!(
            "Completed: in={} out={} tokens",
            response.usage.input_tokens, response.usage.output_tokens
        ),
    );

    Ok(response)
}

/// Parse the upstream byte stream into Google chunks under idle supervision.
///
/// A 5-second ticker measures time since the last inbound byte: one warning
/// at 120 s (re-armed by activity), cancellation with a typed error at 180 s.
fn google_chunk_stream(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    logger: SharedLogger,
) -> impl Stream<Item = Result<GoogleChunk>> + Send + 'static {
    async_stream::stream! {
        let started = Instant::now();
        let mut last_data = Instant::now();
        let mut warned = false;
        let mut chunks: u64 = 0;
        let mut bytes: u64 = 0;
        let mut buffer = String::new();

        tokio::pin!(byte_stream);

        loop {
            let item = match tokio::time::timeout(IDLE_POLL_INTERVAL, byte_stream.next()).await {
                Ok(item) => item,
                Err(_) => {
                    let idle = last_data.elapsed();
                    if idle >= IDLE_CANCEL_AFTER {
                        let total = started.elapsed();
                        logger.error(
                            "stream",
                            format!(
                                "Cancelling upstream read after {idle:?} idle \
                                 ({chunks} chunks, {bytes} bytes, {total:?} total)"
                            ),
                        );
                        yield Err(ProxyError::StreamIdleTimeout {
                            idle_for: idle,
                            total,
                            chunks,
                            bytes,
                        });
                        return;
                    }
                    if idle >= IDLE_WARN_AFTER && !warned {
                        warned = true;
                        tracing::warn!(?idle, chunks, bytes, "upstream stream has gone quiet");
                        logger.warn("stream", format!("Upstream idle for {idle:?}"));
                    }
                    continue;
                }
            };

            match item {
                Some(Ok(data)) => {
                    last_data = Instant::now();
                    warned = false;
                    bytes += data.len() as u64;
                    buffer.push_str(&String::from_utf8_lossy(&data));

                    while let Some(newline_pos) = buffer.find('\n') {
                        let line = buffer[..newline_pos].trim().to_string();
                        buffer = buffer[newline_pos + 1..].to_string();

                        if line.is_empty() {
                            continue;
                        }

                        // Skip non-data SSE lines (event:, id:, comments)
                        let Some(payload) = line.strip_prefix("data:") else {
                            continue;
                        };
                        let payload = payload.trim();
                        if payload == "[DONE]" {
                            continue;
                        }

                        match parse_stream_payload(payload) {
                            Ok(chunk) => {
                                chunks += 1;
                                yield Ok(chunk);
                            }
                            Err(e) => {
                                logger.debug(
                                    "stream",
                                    format!("Skipping unparseable chunk: {e}"),
                                );
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    logger.error("stream", format!("Upstream read failed: {e}"));
                    yield Err(ProxyError::upstream(502, e.to_string()));
                    return;
                }
                None => return,
            }
        }
    }
}
