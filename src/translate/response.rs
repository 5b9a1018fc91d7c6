//! Non-streaming response translation: Google → Anthropic, and
//! Anthropic → OpenAI. Pure functions; streaming goes through
//! [`super::streaming`] instead.

use super::anthropic_types::{ImageSource, MessagesResponse, ResponseContentBlock, Usage};
use super::google_types::{GoogleChunk, UsageMetadata};
use super::openai_types::{
    ChatCompletionResponse, ChatUsage, Choice, ChoiceMessage, ResponseToolCall,
    ResponseToolCallFunction,
};

/// Translate a complete Google response into an Anthropic Messages response.
/// `model` is what the client originally asked for.
pub fn google_to_anthropic(resp: &GoogleChunk, model: &str) -> MessagesResponse {
    let mut content: Vec<ResponseContentBlock> = Vec::new();
    let mut tool_seen = false;

    for part in resp.parts() {
        if part.thought == Some(true) {
            if let Some(ref text) = part.text {
                content.push(ResponseContentBlock::Thinking {
                    thinking: text.clone(),
                    signature: part.thought_signature.clone(),
                });
            }
            continue;
        }

        if let Some(ref text) = part.text {
            if !text.is_empty() {
                content.push(ResponseContentBlock::Text { text: text.clone() });
            }
        }

        if let Some(ref fc) = part.function_call {
            tool_seen = true;
            content.push(ResponseContentBlock::ToolUse {
                id: fc
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4().simple())),
                name: fc.name.clone(),
                input: fc.args.clone(),
                signature: part.thought_signature.clone(),
            });
        }

        if let Some(ref img) = part.inline_data {
            content.push(ResponseContentBlock::Image {
                source: ImageSource::Base64 {
                    media_type: img.mime_type.clone(),
                    data: img.data.clone(),
                },
            });
        }
    }

    if content.is_empty() {
        content.push(ResponseContentBlock::Text {
            text: String::new(),
        });
    }

    let stop_reason = map_google_finish_reason(resp.finish_reason(), tool_seen);

    MessagesResponse {
        id: resp
            .response_id
            .clone()
            .unwrap_or_else(|| format!("msg_{}", uuid::Uuid::new_v4().simple())),
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: model.to_string(),
        stop_reason: Some(stop_reason.to_string()),
        stop_sequence: None,
        usage: usage_from_metadata(resp.usage_metadata.as_ref()),
    }
}

/// Cache-aware usage arithmetic: the upstream reports the full prompt count,
/// Anthropic reports the uncached remainder plus a separate cache-read field.
pub fn usage_from_metadata(meta: Option<&UsageMetadata>) -> Usage {
    let Some(meta) = meta else {
        return Usage::default();
    };
    Usage {
        input_tokens: meta
            .prompt_token_count
            .saturating_sub(meta.cached_content_token_count),
        output_tokens: meta.candidates_token_count,
        cache_read_input_tokens: meta.cached_content_token_count,
        cache_creation_input_tokens: 0,
    }
}

/// Map an upstream finishReason. A tool call anywhere in the candidate
/// overrides `STOP`.
pub fn map_google_finish_reason(reason: Option<&str>, tool_seen: bool) -> &'static str {
    if tool_seen {
        return "tool_use";
    }
    match reason {
        Some("MAX_TOKENS") => "max_tokens",
        Some("SAFETY") | Some("RECITATION") => {
            tracing::warn!(reason = reason.unwrap(), "upstream truncated the candidate");
            "end_turn"
        }
        _ => "end_turn",
    }
}

/// Map an Anthropic stop_reason onto an OpenAI finish_reason.
pub fn map_stop_reason(stop_reason: Option<&str>) -> &'static str {
    match stop_reason {
        Some("tool_use") => "tool_calls",
        Some("max_tokens") => "length",
        _ => "stop",
    }
}

pub fn new_completion_id() -> String {
    // 16 random bytes, hex-encoded
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

pub fn new_system_fingerprint() -> String {
    // 8 random bytes, hex-encoded
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("fp_{}", &hex[..16])
}

/// Translate an Anthropic Messages response into an OpenAI chat completion.
pub fn anthropic_to_openai(resp: &MessagesResponse, model: &str) -> ChatCompletionResponse {
    let mut text = String::new();
    let mut tool_calls: Vec<ResponseToolCall> = Vec::new();

    for block in &resp.content {
        match block {
            ResponseContentBlock::Text { text: t } => text.push_str(t),
            ResponseContentBlock::ToolUse {
                id, name, input, ..
            } => {
                tool_calls.push(ResponseToolCall {
                    id: id.clone(),
                    call_type: "function".to_string(),
                    function: ResponseToolCallFunction {
                        name: name.clone(),
                        arguments: serde_json::to_string(input).unwrap_or_default(),
                    },
                });
            }
            // No OpenAI representation for these
            ResponseContentBlock::Thinking { .. } | ResponseContentBlock::Image { .. } => {}
        }
    }

    let content = if text.is_empty() && !tool_calls.is_empty() {
        None
    } else {
        Some(text)
    };

    let tool_calls = if tool_calls.is_empty() {
        None
    } else {
        Some(tool_calls)
    };

    let usage = ChatUsage {
        prompt_tokens: resp.usage.input_tokens + resp.usage.cache_read_input_tokens,
        completion_tokens: resp.usage.output_tokens,
        total_tokens: resp.usage.input_tokens
            + resp.usage.cache_read_input_tokens
            + resp.usage.output_tokens,
    };

    ChatCompletionResponse {
        id: new_completion_id(),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        system_fingerprint: Some(new_system_fingerprint()),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: "assistant".to_string(),
                content,
                tool_calls,
            },
            finish_reason: Some(map_stop_reason(resp.stop_reason.as_deref()).to_string()),
        }],
        usage: Some(usage),
    }
}
