//! Protocol-agnostic data model for an OpenAI-style chat-completions request/response.
//!
//! Unlike a multi-provider gateway, this proxy speaks exactly one wire shape in both
//! directions, so there is no unified/per-protocol split — just a single set of types
//! that round-trip losslessly through serde, preserving any field an upstream or client
//! adds that this proxy doesn't know about.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Arbitrary fields this proxy doesn't model explicitly, preserved verbatim on
/// serialization so passthrough is lossless.
pub type UnknownFields = HashMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as a string (the OpenAI wire quirk).
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ToolCallKind,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallKind {
    Function,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: ToolCallKind,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// A single message in a chat-completions conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            name: None,
            tool_call_id: None,
            unknown_fields: UnknownFields::default(),
        }
    }
}

/// An incoming chat-completions request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

impl ChatRequest {
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|tools| !tools.is_empty())
    }
}

/// A non-streaming chat-completions response, as returned by the upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// A single streamed chunk, `choices[0].delta` shape per the OpenAI chat-completions-chunk schema.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ToolCallKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCall>,
}

/// Upstream SSE chunk, as received. Only `delta.content` is inspected by the
/// streaming transcoder; everything else is forwarded opaquely when no rewrite
/// is required.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamChunk {
    #[serde(default)]
    pub choices: Vec<UpstreamChunkChoice>,
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamChunkChoice {
    #[serde(default)]
    pub delta: UpstreamDelta,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpstreamDelta {
    #[serde(default)]
    pub content: Option<String>,
}

/// A chunk emitted downstream to the client.
#[derive(Debug, Clone, Serialize)]
pub struct DownstreamChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub choices: Vec<DownstreamChoice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownstreamChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<&'static str>,
}

impl DownstreamChunk {
    pub fn new(id: String, created: i64, delta: ChunkDelta, finish_reason: Option<&'static str>) -> Self {
        Self {
            id,
            object: "chat.completion.chunk",
            created,
            choices: vec![DownstreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }
}
