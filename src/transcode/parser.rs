//! C6: delimiter-aware parser.
//!
//! Given a complete text blob, extracts every well-formed tool-call envelope and
//! returns the residual text with all matched envelopes (valid or not) removed.

use regex::Regex;

use crate::markers::MarkerSet;
use crate::protocol::{FunctionCall, ToolCall, ToolCallKind};

/// Result of parsing a text blob for tool-call envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResult {
    pub tool_calls: Vec<ToolCall>,
    pub clean_content: String,
}

/// Build the envelope-matching regex for a given marker set.
///
/// Both captures are non-greedy and dot-matches-newline, so `<name>` and `<args>`
/// may span multiple lines without accidentally spanning into the next envelope.
fn envelope_pattern(markers: &MarkerSet) -> Regex {
    let pattern = format!(
        r"(?s){}\s*{}(.*?){}\s*{}(.*?){}\s*{}",
        regex::escape(&markers.tc_start),
        regex::escape(&markers.name_start),
        regex::escape(&markers.name_end),
        regex::escape(&markers.args_start),
        regex::escape(&markers.args_end),
        regex::escape(&markers.tc_end),
    );

    Regex::new(&pattern).expect("envelope pattern built from escaped literals is always valid")
}

/// Parse `text` for tool-call envelopes delimited by `markers`.
///
/// Every envelope match is stripped from `clean_content`, whether or not its
/// argument block parses as JSON (§9's resolved open question): a malformed
/// envelope degrades to silently vanishing from the visible text rather than
/// leaking raw markers to the client.
pub fn parse(text: &str, markers: &MarkerSet, now_ms: i64) -> ParseResult {
    let pattern = envelope_pattern(markers);
    let mut tool_calls = Vec::new();
    let mut match_index = 0usize;

    let clean_content = pattern
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = caps[1].trim();
            let arguments = caps[2].trim();

            if serde_json::from_str::<serde_json::Value>(arguments).is_ok() {
                tool_calls.push(ToolCall {
                    id: format!("call_{now_ms}_{match_index}"),
                    kind: ToolCallKind::Function,
                    function: FunctionCall {
                        name: name.to_string(),
                        arguments: arguments.to_string(),
                    },
                });
            } else {
                log::warn!("dropping tool-call envelope with malformed JSON arguments for `{name}`");
            }

            match_index += 1;
            String::new()
        })
        .trim()
        .to_string();

    ParseResult {
        tool_calls,
        clean_content,
    }
}
