//! Type definitions for the upstream Google Generative-AI dialect.
//!
//! Covers the request body we POST upstream (`contents`, `systemInstruction`,
//! `tools`, `toolConfig`, `generationConfig`) and the response/stream chunk
//! shape we read back (`candidates`, `usageMetadata`). Streaming payloads may
//! arrive wrapped in a `{"response": ...}` envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Request types (what we send upstream)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub model: String,
    pub contents: Vec<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GoogleTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleContent {
    #[serde(default)]
    pub role: String, // "user" or "model"
    #[serde(default)]
    pub parts: Vec<GooglePart>,
}

/// A single part. Exactly one of `text`, `function_call`, `function_response`,
/// or `inline_data` is normally set; `thought_signature` rides as a sibling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GooglePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<GooglePart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleTool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub function_calling_config: FunctionCallingConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallingConfig {
    pub mode: String, // "AUTO", "ANY", "NONE"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    pub thinking_budget: u32,
}

// ---------------------------------------------------------------------------
// Response / stream chunk types (what we read back)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleChunk {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub usage_metadata: Option<UsageMetadata>,
    pub model_version: Option<String>,
    pub response_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<GoogleContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageMetadata {
    pub prompt_token_count: u64,
    pub candidates_token_count: u64,
    pub cached_content_token_count: u64,
    pub total_token_count: u64,
    pub thoughts_token_count: u64,
}

#[derive(Deserialize)]
struct StreamEnvelope {
    response: GoogleChunk,
}

/// Parse one SSE `data:` payload. The upstream emits either a bare chunk or a
/// `{"response": chunk}` envelope; the envelope is tried first because a bare
/// parse would silently swallow it (every chunk field is optional).
pub fn parse_stream_payload(data: &str) -> serde_json::Result<GoogleChunk> {
    if let Ok(envelope) = serde_json::from_str::<StreamEnvelope>(data) {
        return Ok(envelope.response);
    }
    serde_json::from_str::<GoogleChunk>(data)
}

impl GoogleChunk {
    /// Parts of the first candidate, if any.
    pub fn parts(&self) -> &[GooglePart] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enveloped_payload() {
        let data = r#"{"response":{"candidates":[{"content":{"role":"model","parts":[{"text":"hi"}]}}],"usageMetadata":{"promptTokenCount":7,"candidatesTokenCount":1}}}"#;
        let chunk = parse_stream_payload(data).unwrap();
        assert_eq!(chunk.parts().len(), 1);
        assert_eq!(chunk.parts()[0].text.as_deref(), Some("hi"));
        assert_eq!(chunk.usage_metadata.unwrap().prompt_token_count, 7);
    }

    #[test]
    fn test_parse_bare_payload() {
        let data = r#"{"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"get_weather","args":{"city":"Paris"}},"thoughtSignature":"ABCDEFGH12"}]},"finishReason":"STOP"}]}"#;
        let chunk = parse_stream_payload(data).unwrap();
        let part = &chunk.parts()[0];
        assert_eq!(part.function_call.as_ref().unwrap().name, "get_weather");
        assert_eq!(part.thought_signature.as_deref(), Some("ABCDEFGH12"));
        assert_eq!(chunk.finish_reason(), Some("STOP"));
    }

    #[test]
    fn test_request_serialization_shape() {
        let req = GenerateContentRequest {
            model: "gemini-3-pro-high".to_string(),
            contents: vec![GoogleContent {
                role: "user".to_string(),
                parts: vec![GooglePart {
                    text: Some("hello".to_string()),
                    ..Default::default()
                }],
            }],
            system_instruction: None,
            tools: None,
            tool_config: Some(ToolConfig {
                function_calling_config: FunctionCallingConfig {
                    mode: "ANY".to_string(),
                    allowed_function_names: Some(vec!["get_weather".to_string()]),
                },
            }),
            generation_config: GenerationConfig {
                max_output_tokens: Some(1024),
                ..Default::default()
            },
        };

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1024);
        assert_eq!(
            json["toolConfig"]["functionCallingConfig"]["allowedFunctionNames"][0],
            "get_weather"
        );
        // Unset optional fields stay off the wire
        assert!(json.get("systemInstruction").is_none());
        assert!(json["contents"][0]["parts"][0].get("thought").is_none());
    }
}
