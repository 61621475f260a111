//! C4: non-streaming response transcoder.

use crate::markers::MarkerSet;
use crate::protocol::ChatResponse;
use crate::transcode::parser;

/// Extract tool calls from the first choice's message content, if any are present.
///
/// Other choices and top-level fields are left untouched; if no envelope is found,
/// the response is returned unmodified.
pub fn transcode(mut response: ChatResponse, markers: &MarkerSet, now_ms: i64) -> ChatResponse {
    let Some(choice) = response.choices.first_mut() else {
        return response;
    };

    let Some(content) = &choice.message.content else {
        return response;
    };

    let result = parser::parse(content, markers, now_ms);

    if result.tool_calls.is_empty() {
        return response;
    }

    choice.message.tool_calls = Some(result.tool_calls);
    choice.message.content = (!result.clean_content.is_empty()).then_some(result.clean_content);
    choice.finish_reason = Some("tool_calls".to_string());

    response
}
