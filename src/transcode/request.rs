//! C3: request transcoder.
//!
//! Rewrites an incoming chat-completions request so its message history is
//! consistent with the delimited-text tool protocol, or sanitizes prior tool turns
//! into plain text when the outgoing request declares no tools at all.

use crate::markers::MarkerSet;
use crate::protocol::{ChatRequest, Message, Role};
use crate::system_prompt;

/// Rewrite `request` in place for the delimited-text tool protocol.
///
/// `tools` and `tool_choice` are always removed from the returned request — this
/// proxy never forwards a native tool schema to the upstream, since the whole point
/// is to synthesize tool calling over an endpoint that doesn't support it natively.
pub fn rewrite(mut request: ChatRequest, markers: &MarkerSet) -> ChatRequest {
    let has_tools = request.has_tools();
    let tool_system_prompt = has_tools.then(|| system_prompt::compose(markers, request.tools.as_deref().unwrap()));

    request.tools = None;
    request.tool_choice = None;

    let mut saw_system_message = false;
    let mut rewritten = Vec::with_capacity(request.messages.len() + 1);

    for message in request.messages {
        match message.role {
            Role::System => {
                saw_system_message = true;
                let mut message = message;
                if let Some(addendum) = &tool_system_prompt {
                    let base = message.content.take().unwrap_or_default();
                    message.content = Some(format!("{base}\n\n{addendum}"));
                }
                rewritten.push(message);
            }
            Role::Assistant if message.tool_calls.as_ref().is_some_and(|tc| !tc.is_empty()) => {
                rewritten.push(rewrite_assistant_tool_call_message(message, markers, has_tools));
            }
            Role::Tool => {
                rewritten.push(rewrite_tool_result_message(message, markers, has_tools));
            }
            _ => rewritten.push(message),
        }
    }

    if let (false, Some(addendum)) = (saw_system_message, &tool_system_prompt) {
        rewritten.insert(0, Message::new(Role::System, addendum.clone()));
    }

    request.messages = merge_adjacent_roles(rewritten);
    request
}

fn rewrite_assistant_tool_call_message(message: Message, markers: &MarkerSet, has_tools: bool) -> Message {
    let tool_calls = message.tool_calls.clone().unwrap_or_default();
    let base = message.content.clone().unwrap_or_default();

    let content = if has_tools {
        let mut content = base;
        for call in &tool_calls {
            content.push_str(&markers.encode_tool_call(&call.function.name, &call.function.arguments));
        }
        content
    } else {
        let names = tool_calls
            .iter()
            .map(|c| c.function.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{base}\n\n[Called tools: {names}]")
    };

    Message {
        role: Role::Assistant,
        content: Some(content),
        tool_calls: None,
        name: None,
        tool_call_id: None,
        unknown_fields: message.unknown_fields,
    }
}

fn rewrite_tool_result_message(message: Message, markers: &MarkerSet, has_tools: bool) -> Message {
    let name = message.name.clone().unwrap_or_default();
    let result = stringify_tool_result(&message);

    let content = if has_tools {
        markers.encode_tool_result(&name, &result)
    } else {
        format!("[Result from {name}]:\n{result}")
    };

    Message {
        role: Role::User,
        content: Some(content),
        tool_calls: None,
        name: None,
        tool_call_id: None,
        unknown_fields: message.unknown_fields,
    }
}

fn stringify_tool_result(message: &Message) -> String {
    match &message.content {
        Some(content) => content.clone(),
        None => String::new(),
    }
}

/// Collapse consecutive messages that share a role into one, joining their contents
/// with a blank line. Required because some upstreams (notably Gemini-compatible
/// endpoints) reject non-alternating user/assistant sequences.
fn merge_adjacent_roles(messages: Vec<Message>) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(messages.len());

    for message in messages {
        match merged.last_mut() {
            Some(previous) if previous.role == message.role => {
                let joined = match (previous.content.take(), message.content) {
                    (Some(a), Some(b)) => Some(format!("{a}\n\n{b}")),
                    (Some(a), None) => Some(a),
                    (None, b) => b,
                };
                previous.content = joined;
            }
            _ => merged.push(message),
        }
    }

    merged
}
