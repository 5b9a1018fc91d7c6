//! Request translation: OpenAI → Anthropic, and Anthropic → Google.
//!
//! An OpenAI chat request is first lifted into the Anthropic Messages shape
//! (system extraction, tool-call blocks, image parts), then the Anthropic
//! shape is lowered into the upstream Google dialect. Both steps are pure
//! except for the signature cache consulted during the lowering step.

use std::collections::HashMap;

use super::anthropic_types::{
    ContentBlock, ImageSource, Message, MessageContent, MessagesRequest, Role, SystemContent,
    ThinkingParam, Tool, ToolChoice, ToolResultContent,
};
use super::google_types::{
    FunctionCall, FunctionCallingConfig, FunctionDeclaration, FunctionResponse,
    GenerateContentRequest, GenerationConfig, GoogleContent, GooglePart, GoogleTool, InlineData,
    SystemInstruction, ThinkingConfig, ToolConfig,
};
use super::openai_types::{
    ChatCompletionRequest, ChatContent, ChatFunction, ChatFunctionCallChoice, ChatMessage,
    ChatToolChoice, ContentPart,
};
use super::schema::sanitize_schema;
use crate::error::{ProxyError, Result};
use crate::router::Resolved;
use crate::signatures::{SignatureCache, MIN_SIGNATURE_LEN};

const DEFAULT_MAX_TOKENS: u64 = 4096;
const DEFAULT_THINKING_BUDGET: u32 = 16_000;

fn new_tool_use_id() -> String {
    format!("toolu_{}", uuid::Uuid::new_v4().simple())
}

// ---------------------------------------------------------------------------
// OpenAI → Anthropic
// ---------------------------------------------------------------------------

/// Lift an OpenAI Chat Completions request into the Anthropic Messages shape.
pub fn openai_to_anthropic(req: &ChatCompletionRequest) -> Result<MessagesRequest> {
    let mut system_parts: Vec<String> = Vec::new();
    let mut messages: Vec<Message> = Vec::new();

    for msg in &req.messages {
        match msg.role.as_str() {
            "system" | "developer" => {
                if let Some(ref content) = msg.content {
                    system_parts.push(content.as_text());
                }
            }
            "assistant" => messages.push(translate_assistant_message(msg)?),
            "tool" | "function" => messages.push(translate_tool_message(msg)),
            "user" => messages.push(translate_user_message(msg)),
            other => {
                tracing::warn!(role = other, "unrecognised message role, treating as user");
                messages.push(translate_user_message(msg));
            }
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(SystemContent::Text(system_parts.join("\n\n")))
    };

    let (tools, tool_choice) = translate_tools(req);

    let max_tokens = req
        .max_completion_tokens
        .or(req.max_tokens)
        .unwrap_or(DEFAULT_MAX_TOKENS);

    let stop_sequences = req.stop.clone().map(|s| s.into_vec());

    let thinking = if req.model.contains("thinking") || req.model.contains("gemini-3") {
        Some(ThinkingParam::enabled(DEFAULT_THINKING_BUDGET))
    } else {
        None
    };

    Ok(MessagesRequest {
        model: req.model.clone(),
        max_tokens,
        messages,
        system,
        stream: req.stream,
        temperature: req.temperature,
        top_p: req.top_p,
        tools,
        tool_choice,
        stop_sequences,
        thinking,
        metadata: None,
        extra: HashMap::new(),
    })
}

fn translate_user_message(msg: &ChatMessage) -> Message {
    let blocks = match &msg.content {
        Some(ChatContent::Text(text)) => vec![ContentBlock::Text { text: text.clone() }],
        Some(ChatContent::Parts(parts)) => parts.iter().map(translate_content_part).collect(),
        None => vec![ContentBlock::Text {
            text: String::new(),
        }],
    };

    Message {
        role: Role::User,
        content: MessageContent::Blocks(blocks),
    }
}

fn translate_content_part(part: &ContentPart) -> ContentBlock {
    match part {
        ContentPart::Text { text } => ContentBlock::Text { text: text.clone() },
        ContentPart::ImageUrl { image_url } => ContentBlock::Image {
            source: split_image_url(&image_url.url),
        },
    }
}

/// A `data:<media>;base64,<payload>` URI becomes an inline base64 source;
/// anything else is carried as a URL source.
fn split_image_url(url: &str) -> ImageSource {
    if let Some(rest) = url.strip_prefix("data:") {
        if let Some((media_type, data)) = rest.split_once(";base64,") {
            return ImageSource::Base64 {
                media_type: media_type.to_string(),
                data: data.to_string(),
            };
        }
    }
    ImageSource::Url {
        url: url.to_string(),
    }
}

fn translate_assistant_message(msg: &ChatMessage) -> Result<Message> {
    let mut blocks: Vec<ContentBlock> = Vec::new();

    if let Some(ref content) = msg.content {
        let text = content.as_text();
        if !text.is_empty() {
            blocks.push(ContentBlock::Text { text });
        }
    }

    if let Some(ref tool_calls) = msg.tool_calls {
        for call in tool_calls {
            blocks.push(ContentBlock::ToolUse {
                id: call.id.clone().unwrap_or_else(new_tool_use_id),
                name: call.function.name.clone(),
                input: parse_tool_arguments(&call.function.arguments)?,
                signature: None,
            });
        }
    } else if let Some(ref legacy) = msg.function_call {
        blocks.push(ContentBlock::ToolUse {
            id: new_tool_use_id(),
            name: legacy.name.clone(),
            input: parse_tool_arguments(&legacy.arguments)?,
            signature: None,
        });
    }

    if blocks.is_empty() {
        blocks.push(ContentBlock::Text {
            text: String::new(),
        });
    }

    Ok(Message {
        role: Role::Assistant,
        content: MessageContent::Blocks(blocks),
    })
}

/// Tool-call arguments arrive either as a JSON object or as a JSON-encoded
/// string of one.
fn parse_tool_arguments(arguments: &serde_json::Value) -> Result<serde_json::Value> {
    match arguments {
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(serde_json::json!({})),
        serde_json::Value::String(s) => serde_json::from_str(s).map_err(|e| {
            ProxyError::bad_request(
                "invalid_tool_arguments",
                format!("tool call arguments are not valid JSON: {e}"),
            )
        }),
        serde_json::Value::Null => Ok(serde_json::json!({})),
        other => Ok(other.clone()),
    }
}

fn translate_tool_message(msg: &ChatMessage) -> Message {
    let tool_use_id = msg
        .tool_call_id
        .clone()
        .or_else(|| msg.name.clone())
        .unwrap_or_else(new_tool_use_id);

    let content = msg
        .content
        .as_ref()
        .map(ChatContent::as_text)
        .unwrap_or_default();

    Message {
        role: Role::User,
        content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
            tool_use_id,
            content: Some(ToolResultContent::Text(content)),
            is_error: None,
        }]),
    }
}

/// Map `tools`/`tool_choice` (or the legacy `functions`/`function_call`
/// pair). A `none` choice collapses to "tools omitted"; `required` maps to
/// Anthropic's `any`.
fn translate_tools(req: &ChatCompletionRequest) -> (Option<Vec<Tool>>, Option<ToolChoice>) {
    let declared: Option<Vec<Tool>> = if let Some(ref tools) = req.tools {
        Some(tools.iter().map(|t| translate_function(&t.function)).collect())
    } else {
        req.functions
            .as_ref()
            .map(|fns| fns.iter().map(translate_function).collect())
    };

    let Some(tools) = declared else {
        return (None, None);
    };

    if let Some(ref choice) = req.tool_choice {
        return match choice {
            ChatToolChoice::Mode(mode) => match mode.as_str() {
                "none" => (None, None),
                "required" => (Some(tools), Some(ToolChoice::any())),
                _ => (Some(tools), Some(ToolChoice::auto())),
            },
            ChatToolChoice::Specific(spec) => (
                Some(tools),
                Some(ToolChoice::tool(spec.function.name.clone())),
            ),
        };
    }

    if let Some(ref legacy) = req.function_call {
        return match legacy {
            ChatFunctionCallChoice::Mode(mode) => match mode.as_str() {
                "none" => (None, None),
                _ => (Some(tools), Some(ToolChoice::auto())),
            },
            ChatFunctionCallChoice::Named(f) => {
                (Some(tools), Some(ToolChoice::tool(f.name.clone())))
            }
        };
    }

    (Some(tools), None)
}

fn translate_function(f: &ChatFunction) -> Tool {
    Tool {
        name: f.name.clone(),
        description: f.description.clone(),
        input_schema: f.parameters.clone(),
    }
}

// ---------------------------------------------------------------------------
// Anthropic → Google
// ---------------------------------------------------------------------------

/// Lower an Anthropic Messages request into the upstream Google dialect.
///
/// Consults the signature cache for assistant tool_use blocks whose client
/// stripped the thought signature: first by tool-use id, then by the
/// request's model family.
pub fn anthropic_to_google(
    req: &MessagesRequest,
    route: &Resolved,
    signatures: &SignatureCache,
) -> Result<GenerateContentRequest> {
    let tool_names = collect_tool_names(&req.messages);

    let mut contents: Vec<GoogleContent> = Vec::with_capacity(req.messages.len());
    for msg in &req.messages {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "model",
        };

        let mut parts: Vec<GooglePart> = Vec::new();
        for block in msg.content.blocks() {
            if let Some(part) = translate_block(&block, route, signatures, &tool_names)? {
                parts.push(part);
            }
        }

        if parts.is_empty() {
            tracing::debug!(role, "skipping message with no translatable parts");
            continue;
        }

        contents.push(GoogleContent {
            role: role.to_string(),
            parts,
        });
    }

    let system_instruction = req.system.as_ref().map(|s| SystemInstruction {
        parts: vec![GooglePart {
            text: Some(s.as_text()),
            ..Default::default()
        }],
    });

    let tools = req.tools.as_ref().map(|tools| {
        vec![GoogleTool {
            function_declarations: tools
                .iter()
                .map(|t| FunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: sanitize_schema(&t.input_schema),
                })
                .collect(),
        }]
    });

    let tool_config = req.tool_choice.as_ref().map(translate_tool_choice);

    Ok(GenerateContentRequest {
        model: route.upstream_id.clone(),
        contents,
        system_instruction,
        tools,
        tool_config,
        generation_config: build_generation_config(req, route),
    })
}

/// Tool-use ids declared by assistant messages, used to resolve the function
/// name a later tool_result refers to.
fn collect_tool_names(messages: &[Message]) -> HashMap<String, String> {
    let mut names = HashMap::new();
    for msg in messages {
        if msg.role != Role::Assistant {
            continue;
        }
        for block in msg.content.blocks() {
            if let ContentBlock::ToolUse { id, name, .. } = block {
                names.insert(id, name);
            }
        }
    }
    names
}

fn translate_block(
    block: &ContentBlock,
    route: &Resolved,
    signatures: &SignatureCache,
    tool_names: &HashMap<String, String>,
) -> Result<Option<GooglePart>> {
    match block {
        ContentBlock::Text { text } => Ok(Some(GooglePart {
            text: Some(text.clone()),
            ..Default::default()
        })),

        ContentBlock::Thinking {
            thinking,
            signature,
        } => Ok(Some(GooglePart {
            text: Some(thinking.clone()),
            thought: Some(true),
            thought_signature: signature
                .clone()
                .filter(|s| s.len() >= MIN_SIGNATURE_LEN),
            ..Default::default()
        })),

        ContentBlock::ToolUse {
            id,
            name,
            input,
            signature,
        } => {
            let thought_signature = signature
                .clone()
                .filter(|s| s.len() >= MIN_SIGNATURE_LEN)
                .or_else(|| signatures.get_tool(id))
                .or_else(|| signatures.get_family(route.family));

            // The signature rides as a sibling of functionCall, never inside it.
            Ok(Some(GooglePart {
                function_call: Some(FunctionCall {
                    id: Some(id.clone()),
                    name: name.clone(),
                    args: input.clone(),
                }),
                thought_signature,
                ..Default::default()
            }))
        }

        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let name = tool_names.get(tool_use_id).ok_or_else(|| {
                ProxyError::bad_request(
                    "dangling_tool_result",
                    format!("tool_result references unknown tool_use id '{tool_use_id}'"),
                )
            })?;

            Ok(Some(GooglePart {
                function_response: Some(FunctionResponse {
                    name: name.clone(),
                    response: serde_json::json!({
                        "content": tool_result_text(content.as_ref(), *is_error)
                    }),
                }),
                ..Default::default()
            }))
        }

        ContentBlock::Image { source } => match source {
            ImageSource::Base64 { media_type, data } => Ok(Some(GooglePart {
                inline_data: Some(InlineData {
                    mime_type: media_type.clone(),
                    data: data.clone(),
                }),
                ..Default::default()
            })),
            ImageSource::Url { url } => Err(ProxyError::bad_request(
                "unsupported_image_source",
                format!("image URL sources are not supported, inline the data: {url}"),
            )),
        },
    }
}

fn tool_result_text(content: Option<&ToolResultContent>, is_error: Option<bool>) -> String {
    let prefix = if is_error == Some(true) { "ERROR: " } else { "" };

    match content {
        Some(ToolResultContent::Text(t)) => format!("{prefix}{t}"),
        Some(ToolResultContent::Blocks(blocks)) => {
            let text: String = blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            format!("{prefix}{text}")
        }
        None => format!("{prefix}(no content)"),
    }
}

fn translate_tool_choice(tc: &ToolChoice) -> ToolConfig {
    let function_calling_config = match tc {
        ToolChoice::Auto(auto) => match auto.choice_type.as_str() {
            "any" => FunctionCallingConfig {
                mode: "ANY".to_string(),
                allowed_function_names: None,
            },
            "none" => FunctionCallingConfig {
                mode: "NONE".to_string(),
                allowed_function_names: None,
            },
            _ => FunctionCallingConfig {
                mode: "AUTO".to_string(),
                allowed_function_names: None,
            },
        },
        ToolChoice::Specific(spec) => FunctionCallingConfig {
            mode: "ANY".to_string(),
            allowed_function_names: Some(vec![spec.name.clone()]),
        },
    };

    ToolConfig {
        function_calling_config,
    }
}

fn build_generation_config(req: &MessagesRequest, route: &Resolved) -> GenerationConfig {
    let thinking_config = match &req.thinking {
        Some(param) if param.is_enabled() => Some(ThinkingConfig {
            thinking_budget: param.budget_tokens.unwrap_or(DEFAULT_THINKING_BUDGET),
        }),
        Some(_) => None,
        None if route.enable_thinking => Some(ThinkingConfig {
            thinking_budget: DEFAULT_THINKING_BUDGET,
        }),
        None => None,
    };

    GenerationConfig {
        max_output_tokens: Some(req.max_tokens),
        temperature: req.temperature,
        top_p: req.top_p,
        stop_sequences: req.stop_sequences.clone(),
        thinking_config,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::openai_types::*;
    use serde_json::json;

    fn resolved(family: &'static str, thinking: bool) -> Resolved {
        Resolved {
            upstream_id: "gemini-3-pro-high".to_string(),
            family,
            enable_thinking: thinking,
        }
    }

    fn openai_request(messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "gpt-4o".to_string(),
            messages,
            max_tokens: None,
            max_completion_tokens: None,
            temperature: None,
            top_p: None,
            stream: None,
            tools: None,
            tool_choice: None,
            functions: None,
            function_call: None,
            stop: None,
            user: None,
            extra: HashMap::new(),
        }
    }

    fn user_text(text: &str) -> ChatMessage {
        ChatMessage {
            role: "user".to_string(),
            content: Some(ChatContent::Text(text.to_string())),
            tool_calls: None,
            tool_call_id: None,
            name: None,
            function_call: None,
        }
    }

    fn system_text(text: &str) -> ChatMessage {
        ChatMessage {
            role: "system".to_string(),
            ..user_text(text)
        }
    }

    #[test]
    fn test_system_messages_concatenate() {
        let req = openai_request(vec![system_text("A"), system_text("B"), user_text("hi")]);
        let result = openai_to_anthropic(&req).unwrap();

        match result.system {
            Some(SystemContent::Text(ref s)) => assert_eq!(s, "A\n\nB"),
            other => panic!("expected text system, got {other:?}"),
        }
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].role, Role::User);
    }

    #[test]
    fn test_role_sequence_preserved() {
        let mut assistant = user_text("sure");
        assistant.role = "assistant".to_string();
        let req = openai_request(vec![
            system_text("sys"),
            user_text("one"),
            assistant,
            user_text("two"),
        ]);

        let result = openai_to_anthropic(&req).unwrap();
        let roles: Vec<Role> = result.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
    }

    #[test]
    fn test_default_max_tokens_chain() {
        let mut req = openai_request(vec![user_text("hi")]);
        assert_eq!(openai_to_anthropic(&req).unwrap().max_tokens, 4096);

        req.max_tokens = Some(100);
        assert_eq!(openai_to_anthropic(&req).unwrap().max_tokens, 100);

        req.max_completion_tokens = Some(200);
        assert_eq!(openai_to_anthropic(&req).unwrap().max_tokens, 200);
    }

    #[test]
    fn test_tool_calls_become_tool_use_blocks() {
        let assistant = ChatMessage {
            role: "assistant".to_string(),
            content: Some(ChatContent::Text("Checking.".to_string())),
            tool_calls: Some(vec![ChatToolCall {
                id: Some("call_abc".to_string()),
                call_type: "function".to_string(),
                function: ChatToolCallFunction {
                    name: "get_weather".to_string(),
                    arguments: json!("{\"city\":\"Paris\"}"),
                },
            }]),
            tool_call_id: None,
            name: None,
            function_call: None,
        };

        let req = openai_request(vec![user_text("weather?"), assistant]);
        let result = openai_to_anthropic(&req).unwrap();

        let blocks = result.messages[1].content.blocks();
        assert_eq!(blocks.len(), 2);
        match &blocks[1] {
            ContentBlock::ToolUse {
                id, name, input, ..
            } => {
                assert_eq!(id, "call_abc");
                assert_eq!(name, "get_weather");
                assert_eq!(input["city"], "Paris");
            }
            other => panic!("expected tool_use, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_tool_arguments_rejected() {
        let assistant = ChatMessage {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(vec![ChatToolCall {
                id: Some("call_bad".to_string()),
                call_type: "function".to_string(),
                function: ChatToolCallFunction {
                    name: "get_weather".to_string(),
                    arguments: json!("{not json"),
                },
            }]),
            tool_call_id: None,
            name: None,
            function_call: None,
        };

        let err = openai_to_anthropic(&openai_request(vec![assistant])).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::BadRequest {
                code: "invalid_tool_arguments",
                ..
            }
        ));
    }

    #[test]
    fn test_tool_role_becomes_tool_result_user_message() {
        let tool = ChatMessage {
            role: "tool".to_string(),
            content: Some(ChatContent::Text("22C and sunny".to_string())),
            tool_calls: None,
            tool_call_id: Some("call_abc".to_string()),
            name: None,
            function_call: None,
        };

        let result = openai_to_anthropic(&openai_request(vec![tool])).unwrap();
        assert_eq!(result.messages[0].role, Role::User);
        match &result.messages[0].content.blocks()[0] {
            ContentBlock::ToolResult { tool_use_id, .. } => {
                assert_eq!(tool_use_id, "call_abc");
            }
            other => panic!("expected tool_result, got {other:?}"),
        }
    }

    #[test]
    fn test_data_uri_image_splits_into_base64() {
        let msg = ChatMessage {
            role: "user".to_string(),
            content: Some(ChatContent::Parts(vec![ContentPart::ImageUrl {
                image_url: ImageUrlDetail {
                    url: "data:image/png;base64,iVBORw0KGgo=".to_string(),
                    detail: None,
                },
            }])),
            tool_calls: None,
            tool_call_id: None,
            name: None,
            function_call: None,
        };

        let result = openai_to_anthropic(&openai_request(vec![msg])).unwrap();
        match &result.messages[0].content.blocks()[0] {
            ContentBlock::Image {
                source: ImageSource::Base64 { media_type, data },
            } => {
                assert_eq!(media_type, "image/png");
                assert_eq!(data, "iVBORw0KGgo=");
            }
            other => panic!("expected base64 image, got {other:?}"),
        }
    }

    #[test]
    fn test_tool_choice_none_drops_tools() {
        let mut req = openai_request(vec![user_text("hi")]);
        req.tools = Some(vec![ChatTool {
            tool_type: "function".to_string(),
            function: ChatFunction {
                name: "f".to_string(),
                description: None,
                parameters: json!({"type": "object"}),
            },
        }]);
        req.tool_choice = Some(ChatToolChoice::Mode("none".to_string()));

        let result = openai_to_anthropic(&req).unwrap();
        assert!(result.tools.is_none());
        assert!(result.tool_choice.is_none());
    }

    #[test]
    fn test_tool_choice_required_maps_to_any() {
        let mut req = openai_request(vec![user_text("hi")]);
        req.tools = Some(vec![ChatTool {
            tool_type: "function".to_string(),
            function: ChatFunction {
                name: "f".to_string(),
                description: None,
                parameters: json!({"type": "object"}),
            },
        }]);
        req.tool_choice = Some(ChatToolChoice::Mode("required".to_string()));

        let result = openai_to_anthropic(&req).unwrap();
        match result.tool_choice {
            Some(ToolChoice::Auto(ref a)) => assert_eq!(a.choice_type, "any"),
            other => panic!("expected any, got {other:?}"),
        }
    }

    #[test]
    fn test_thinking_enabled_by_model_name() {
        let mut req = openai_request(vec![user_text("hi")]);
        req.model = "gemini-3-pro".to_string();

        let result = openai_to_anthropic(&req).unwrap();
        let thinking = result.thinking.unwrap();
        assert!(thinking.is_enabled());
        assert_eq!(thinking.budget_tokens, Some(16_000));

        let mut req = openai_request(vec![user_text("hi")]);
        req.model = "gpt-4o".to_string();
        assert!(openai_to_anthropic(&req).unwrap().thinking.is_none());
    }

    // -----------------------------------------------------------------------
    // Anthropic → Google
    // -----------------------------------------------------------------------

    fn anthropic_request(messages: Vec<Message>) -> MessagesRequest {
        MessagesRequest {
            model: "gemini-3-pro".to_string(),
            max_tokens: 1024,
            messages,
            system: None,
            stream: None,
            temperature: None,
            top_p: None,
            tools: None,
            tool_choice: None,
            stop_sequences: None,
            thinking: None,
            metadata: None,
            extra: HashMap::new(),
        }
    }

    fn user_message(text: &str) -> Message {
        Message {
            role: Role::User,
            content: MessageContent::Text(text.to_string()),
        }
    }

    #[test]
    fn test_roles_and_system_instruction() {
        let mut req = anthropic_request(vec![
            user_message("hi"),
            Message {
                role: Role::Assistant,
                content: MessageContent::Text("hello".to_string()),
            },
        ]);
        req.system = Some(SystemContent::Text("be brief".to_string()));

        let cache = SignatureCache::new();
        let result = anthropic_to_google(&req, &resolved("gemini-3", false), &cache).unwrap();

        assert_eq!(result.contents[0].role, "user");
        assert_eq!(result.contents[1].role, "model");
        assert_eq!(
            result.system_instruction.unwrap().parts[0].text.as_deref(),
            Some("be brief")
        );
    }

    #[test]
    fn test_signature_reinjected_from_tool_id() {
        let cache = SignatureCache::new();
        let sig = "S".repeat(32);
        cache.put_tool("toolu_1", &sig);

        let req = anthropic_request(vec![Message {
            role: Role::Assistant,
            content: MessageContent::Blocks(vec![ContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: "get_weather".to_string(),
                input: json!({"city": "Paris"}),
                signature: None,
            }]),
        }]);

        let result = anthropic_to_google(&req, &resolved("gemini-3", false), &cache).unwrap();
        let part = &result.contents[0].parts[0];
        assert_eq!(part.thought_signature.as_deref(), Some(sig.as_str()));
        assert_eq!(part.function_call.as_ref().unwrap().name, "get_weather");
    }

    #[test]
    fn test_signature_family_fallback() {
        let cache = SignatureCache::new();
        let sig = "F".repeat(32);
        cache.put_family("gemini-3", &sig);

        let req = anthropic_request(vec![Message {
            role: Role::Assistant,
            content: MessageContent::Blocks(vec![ContentBlock::ToolUse {
                id: "toolu_unseen".to_string(),
                name: "get_weather".to_string(),
                input: json!({}),
                signature: None,
            }]),
        }]);

        let result = anthropic_to_google(&req, &resolved("gemini-3", false), &cache).unwrap();
        assert_eq!(
            result.contents[0].parts[0].thought_signature.as_deref(),
            Some(sig.as_str())
        );
    }

    #[test]
    fn test_short_inline_signature_not_injected() {
        let cache = SignatureCache::new();
        let req = anthropic_request(vec![Message {
            role: Role::Assistant,
            content: MessageContent::Blocks(vec![ContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: "f".to_string(),
                input: json!({}),
                signature: Some("tiny".to_string()),
            }]),
        }]);

        let result = anthropic_to_google(&req, &resolved("gemini-3", false), &cache).unwrap();
        assert!(result.contents[0].parts[0].thought_signature.is_none());
    }

    #[test]
    fn test_tool_result_resolves_name() {
        let cache = SignatureCache::new();
        let req = anthropic_request(vec![
            Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(vec![ContentBlock::ToolUse {
                    id: "toolu_1".to_string(),
                    name: "get_weather".to_string(),
                    input: json!({}),
                    signature: None,
                }]),
            },
            Message {
                role: Role::User,
                content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                    tool_use_id: "toolu_1".to_string(),
                    content: Some(ToolResultContent::Text("22C".to_string())),
                    is_error: None,
                }]),
            },
        ]);

        let result = anthropic_to_google(&req, &resolved("gemini-3", false), &cache).unwrap();
        let fr = result.contents[1].parts[0].function_response.as_ref().unwrap();
        assert_eq!(fr.name, "get_weather");
        assert_eq!(fr.response["content"], "22C");
    }

    #[test]
    fn test_dangling_tool_result_rejected() {
        let cache = SignatureCache::new();
        let req = anthropic_request(vec![Message {
            role: Role::User,
            content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: "toolu_ghost".to_string(),
                content: None,
                is_error: None,
            }]),
        }]);

        let err = anthropic_to_google(&req, &resolved("gemini-3", false), &cache).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::BadRequest {
                code: "dangling_tool_result",
                ..
            }
        ));
    }

    #[test]
    fn test_image_url_rejected() {
        let cache = SignatureCache::new();
        let req = anthropic_request(vec![Message {
            role: Role::User,
            content: MessageContent::Blocks(vec![ContentBlock::Image {
                source: ImageSource::Url {
                    url: "https://example.com/cat.png".to_string(),
                },
            }]),
        }]);

        let err = anthropic_to_google(&req, &resolved("gemini-3", false), &cache).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::BadRequest {
                code: "unsupported_image_source",
                ..
            }
        ));
    }

    #[test]
    fn test_tool_choice_mapping() {
        let cache = SignatureCache::new();
        let mut req = anthropic_request(vec![user_message("hi")]);

        req.tool_choice = Some(ToolChoice::any());
        let result = anthropic_to_google(&req, &resolved("gemini-3", false), &cache).unwrap();
        assert_eq!(
            result.tool_config.unwrap().function_calling_config.mode,
            "ANY"
        );

        req.tool_choice = Some(ToolChoice::tool("get_weather"));
        let result = anthropic_to_google(&req, &resolved("gemini-3", false), &cache).unwrap();
        let cfg = result.tool_config.unwrap().function_calling_config;
        assert_eq!(cfg.mode, "ANY");
        assert_eq!(cfg.allowed_function_names.unwrap(), vec!["get_weather"]);
    }

    #[test]
    fn test_generation_config_and_thinking() {
        let cache = SignatureCache::new();
        let mut req = anthropic_request(vec![user_message("hi")]);
        req.temperature = Some(0.2);
        req.stop_sequences = Some(vec!["END".to_string()]);
        req.thinking = Some(ThinkingParam::enabled(8192));

        let result = anthropic_to_google(&req, &resolved("gemini-3", false), &cache).unwrap();
        let gc = &result.generation_config;
        assert_eq!(gc.max_output_tokens, Some(1024));
        assert_eq!(gc.temperature, Some(0.2));
        assert_eq!(gc.stop_sequences.as_ref().unwrap()[0], "END");
        assert_eq!(gc.thinking_config.as_ref().unwrap().thinking_budget, 8192);
    }

    #[test]
    fn test_route_enables_thinking_by_default() {
        let cache = SignatureCache::new();
        let req = anthropic_request(vec![user_message("hi")]);

        let result = anthropic_to_google(&req, &resolved("gemini-3", true), &cache).unwrap();
        assert_eq!(
            result
                .generation_config
                .thinking_config
                .as_ref()
                .unwrap()
                .thinking_budget,
            16_000
        );
    }

    #[test]
    fn test_tool_schemas_sanitized() {
        let cache = SignatureCache::new();
        let mut req = anthropic_request(vec![user_message("hi")]);
        req.tools = Some(vec![Tool {
            name: "get_weather".to_string(),
            description: Some("weather".to_string()),
            input_schema: json!({
                "$schema": "draft-07",
                "type": "object",
                "additionalProperties": false,
                "properties": {"city": {"type": "string"}}
            }),
        }]);

        let result = anthropic_to_google(&req, &resolved("gemini-3", false), &cache).unwrap();
        let params = &result.tools.unwrap()[0].function_declarations[0].parameters;
        assert!(params.get("$schema").is_none());
        assert!(params.get("additionalProperties").is_none());
        assert_eq!(params["properties"]["city"]["type"], "string");
    }
}
