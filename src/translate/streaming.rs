//! State machines for the streaming pipeline.
//!
//! [`StreamTranslator`] turns upstream Google chunks into Anthropic SSE
//! events, managing content-block boundaries, thinking-signature capture, and
//! token accounting. [`OpenAiFrameTranslator`] optionally re-frames those
//! Anthropic events into OpenAI chat-completion chunks for clients speaking
//! the Chat Completions dialect.
//!
//! Usage:
//!   let mut translator = StreamTranslator::new("gpt-4o", route, cache);
//!   for chunk in google_chunks {
//!       let events = translator.process_chunk(&chunk);
//!       // send each event as SSE
//!   }
//!   let final_events = translator.finish();

use std::sync::Arc;

use super::anthropic_types::{
    Delta, DeltaUsage, ImageSource, MessageDeltaBody, MessagesResponse, ResponseContentBlock,
    StreamEvent, Usage,
};
use super::google_types::{GoogleChunk, GooglePart};
use super::openai_types::{
    ChatCompletionChunk, ChatUsage, ChunkChoice, ChunkDelta, ChunkToolCall, ChunkToolCallFunction,
};
use super::response::{map_stop_reason, new_completion_id, new_system_fingerprint};
use crate::router::Resolved;
use crate::signatures::{SignatureCache, MIN_SIGNATURE_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    None,
    Text,
    Thinking,
    ToolUse,
}

/// Translates upstream Google chunks into Anthropic stream events.
pub struct StreamTranslator {
    model: String,
    family: &'static str,
    msg_id: String,
    signatures: Arc<SignatureCache>,
    started: bool,
    finished: bool,
    block_index: usize,
    block: BlockKind,
    pending_signature: Option<String>,
    input_tokens: u64,
    output_tokens: u64,
    cache_read_tokens: u64,
    stop_reason: Option<&'static str>,
}

impl StreamTranslator {
    pub fn new(model: &str, route: &Resolved, signatures: Arc<SignatureCache>) -> Self {
        Self {
            model: model.to_string(),
            family: route.family,
            msg_id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            signatures,
            started: false,
            finished: false,
            block_index: 0,
            block: BlockKind::None,
            pending_signature: None,
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
            stop_reason: None,
        }
    }

    /// Whether `message_start` has been emitted. A stream that ends without
    /// this is an empty response and may be retried by the HTTP surface.
    pub fn started(&self) -> bool {
        self.started
    }

    /// Process one upstream chunk, returning zero or more Anthropic events.
    pub fn process_chunk(&mut self, chunk: &GoogleChunk) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();

        // Counters arrive cumulatively; keep the latest values.
        if let Some(meta) = chunk.usage_metadata {
            self.input_tokens = meta.prompt_token_count;
            self.output_tokens = meta.candidates_token_count;
            self.cache_read_tokens = meta.cached_content_token_count;
        }

        let parts = chunk.parts();

        if !self.started && !parts.is_empty() {
            events.push(self.make_message_start());
            events.push(StreamEvent::Ping);
            self.started = true;
        }

        for part in parts {
            self.handle_part(part, &mut events);
        }

        if let Some(reason) = chunk.finish_reason() {
            if self.stop_reason != Some("tool_use") {
                self.stop_reason = Some(match reason {
                    "MAX_TOKENS" => "max_tokens",
                    _ => "end_turn",
                });
            }
        }

        events
    }

    /// Flush pending state and close the message. Returns nothing if the
    /// stream never produced a part (see [`Self::started`]).
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        if !self.started {
            return Vec::new();
        }

        let mut events = Vec::new();
        self.close_block(&mut events);

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(self.stop_reason.unwrap_or("end_turn").to_string()),
                stop_sequence: None,
            },
            usage: DeltaUsage {
                output_tokens: self.output_tokens,
            },
        });
        events.push(StreamEvent::MessageStop);

        events
    }

    fn handle_part(&mut self, part: &GooglePart, events: &mut Vec<StreamEvent>) {
        let signature = part
            .thought_signature
            .clone()
            .filter(|s| s.len() >= MIN_SIGNATURE_LEN);

        if part.thought == Some(true) {
            if self.block != BlockKind::Thinking {
                self.close_block(events);
                events.push(StreamEvent::ContentBlockStart {
                    index: self.block_index,
                    content_block: ResponseContentBlock::Thinking {
                        thinking: String::new(),
                        signature: None,
                    },
                });
                self.block = BlockKind::Thinking;
            }

            if let Some(ref text) = part.text {
                if !text.is_empty() {
                    events.push(StreamEvent::ContentBlockDelta {
                        index: self.block_index,
                        delta: Delta::ThinkingDelta {
                            thinking: text.clone(),
                        },
                    });
                }
            }

            if let Some(sig) = signature {
                self.signatures.put_family(self.family, &sig);
                self.pending_signature = Some(sig);
            }
            return;
        }

        if let Some(ref text) = part.text {
            if !text.trim().is_empty() {
                if self.block != BlockKind::Text {
                    self.close_block(events);
                    events.push(StreamEvent::ContentBlockStart {
                        index: self.block_index,
                        content_block: ResponseContentBlock::Text {
                            text: String::new(),
                        },
                    });
                    self.block = BlockKind::Text;
                }

                events.push(StreamEvent::ContentBlockDelta {
                    index: self.block_index,
                    delta: Delta::TextDelta { text: text.clone() },
                });
            }
        }

        if let Some(ref fc) = part.function_call {
            self.close_block(events);

            let tool_id = fc
                .id
                .clone()
                .unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4().simple()));

            if let Some(ref sig) = signature {
                self.signatures.put_tool(&tool_id, sig);
            }

            events.push(StreamEvent::ContentBlockStart {
                index: self.block_index,
                content_block: ResponseContentBlock::ToolUse {
                    id: tool_id,
                    name: fc.name.clone(),
                    input: serde_json::json!({}),
                    signature,
                },
            });
            self.block = BlockKind::ToolUse;

            events.push(StreamEvent::ContentBlockDelta {
                index: self.block_index,
                delta: Delta::InputJsonDelta {
                    partial_json: fc.args.to_string(),
                },
            });

            self.stop_reason = Some("tool_use");
        }

        if let Some(ref img) = part.inline_data {
            self.close_block(events);

            events.push(StreamEvent::ContentBlockStart {
                index: self.block_index,
                content_block: ResponseContentBlock::Image {
                    source: ImageSource::Base64 {
                        media_type: img.mime_type.clone(),
                        data: img.data.clone(),
                    },
                },
            });
            events.push(StreamEvent::ContentBlockStop {
                index: self.block_index,
            });
            self.block_index += 1;
        }
    }

    /// Close the open block, flushing a pending thinking signature first.
    fn close_block(&mut self, events: &mut Vec<StreamEvent>) {
        if self.block == BlockKind::None {
            return;
        }

        if self.block == BlockKind::Thinking {
            if let Some(sig) = self.pending_signature.take() {
                events.push(StreamEvent::ContentBlockDelta {
                    index: self.block_index,
                    delta: Delta::SignatureDelta { signature: sig },
                });
            }
        }

        events.push(StreamEvent::ContentBlockStop {
            index: self.block_index,
        });
        self.block_index += 1;
        self.block = BlockKind::None;
    }

    fn make_message_start(&self) -> StreamEvent {
        StreamEvent::MessageStart {
            message: MessagesResponse {
                id: self.msg_id.clone(),
                response_type: "message".to_string(),
                role: "assistant".to_string(),
                content: Vec::new(),
                model: self.model.clone(),
                stop_reason: None,
                stop_sequence: None,
                usage: Usage {
                    input_tokens: self.input_tokens.saturating_sub(self.cache_read_tokens),
                    output_tokens: 0,
                    cache_read_input_tokens: self.cache_read_tokens,
                    cache_creation_input_tokens: 0,
                },
            },
        }
    }
}

// ---------------------------------------------------------------------------
// OpenAI re-framing
// ---------------------------------------------------------------------------

/// Re-frames Anthropic stream events as OpenAI chat-completion chunks.
/// Thinking and signature deltas have no OpenAI representation and are
/// dropped. The transport appends the final `data: [DONE]` line.
pub struct OpenAiFrameTranslator {
    id: String,
    fingerprint: String,
    model: String,
    created: i64,
    tool_call_count: u64,
    in_thinking: bool,
    prompt_tokens: u64,
}

impl OpenAiFrameTranslator {
    pub fn new(model: &str) -> Self {
        Self {
            id: new_completion_id(),
            fingerprint: new_system_fingerprint(),
            model: model.to_string(),
            created: chrono::Utc::now().timestamp(),
            tool_call_count: 0,
            in_thinking: false,
            prompt_tokens: 0,
        }
    }

    pub fn process_event(&mut self, event: &StreamEvent) -> Vec<ChatCompletionChunk> {
        match event {
            StreamEvent::MessageStart { message } => {
                self.prompt_tokens =
                    message.usage.input_tokens + message.usage.cache_read_input_tokens;
                vec![self.chunk(
                    ChunkDelta {
                        role: Some("assistant".to_string()),
                        content: Some(String::new()),
                        tool_calls: None,
                    },
                    None,
                    None,
                )]
            }

            StreamEvent::ContentBlockStart { content_block, .. } => match content_block {
                ResponseContentBlock::Thinking { .. } => {
                    self.in_thinking = true;
                    Vec::new()
                }
                ResponseContentBlock::ToolUse { id, name, .. } => {
                    let index = self.tool_call_count;
                    self.tool_call_count += 1;
                    vec![self.chunk(
                        ChunkDelta {
                            role: None,
                            content: None,
                            tool_calls: Some(vec![ChunkToolCall {
                                index,
                                id: Some(id.clone()),
                                call_type: Some("function".to_string()),
                                function: Some(ChunkToolCallFunction {
                                    name: Some(name.clone()),
                                    arguments: Some(String::new()),
                                }),
                            }]),
                        },
                        None,
                        None,
                    )]
                }
                ResponseContentBlock::Text { .. } | ResponseContentBlock::Image { .. } => {
                    Vec::new()
                }
            },

            StreamEvent::ContentBlockDelta { delta, .. } => match delta {
                Delta::TextDelta { text } if !self.in_thinking => vec![self.chunk(
                    ChunkDelta {
                        role: None,
                        content: Some(text.clone()),
                        tool_calls: None,
                    },
                    None,
                    None,
                )],
                Delta::InputJsonDelta { partial_json } => {
                    let index = self.tool_call_count.saturating_sub(1);
                    vec![self.chunk(
                        ChunkDelta {
                            role: None,
                            content: None,
                            tool_calls: Some(vec![ChunkToolCall {
                                index,
                                id: None,
                                call_type: None,
                                function: Some(ChunkToolCallFunction {
                                    name: None,
                                    arguments: Some(partial_json.clone()),
                                }),
                            }]),
                        },
                        None,
                        None,
                    )]
                }
                // No OpenAI representation
                Delta::TextDelta { .. }
                | Delta::ThinkingDelta { .. }
                | Delta::SignatureDelta { .. } => Vec::new(),
            },

            StreamEvent::ContentBlockStop { .. } => {
                self.in_thinking = false;
                Vec::new()
            }

            StreamEvent::MessageDelta { delta, usage } => {
                let finish = map_stop_reason(delta.stop_reason.as_deref());
                let chat_usage = ChatUsage {
                    prompt_tokens: self.prompt_tokens,
                    completion_tokens: usage.output_tokens,
                    total_tokens: self.prompt_tokens + usage.output_tokens,
                };
                vec![self.chunk(ChunkDelta::default(), Some(finish), Some(chat_usage))]
            }

            StreamEvent::MessageStop | StreamEvent::Ping => Vec::new(),
        }
    }

    fn chunk(
        &self,
        delta: ChunkDelta,
        finish_reason: Option<&str>,
        usage: Option<ChatUsage>,
    ) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            system_fingerprint: Some(self.fingerprint.clone()),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(String::from),
            }],
            usage,
        }
    }
}
