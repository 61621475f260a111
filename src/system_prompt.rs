//! Composes the natural-language contract that teaches a plain-text model how to
//! emit tool calls using the process's delimiter set.

use crate::markers::MarkerSet;
use crate::protocol::ToolSpec;

/// Build the system-prompt addendum for a list of declared tools.
///
/// The result enumerates each tool, shows one concrete example invocation using the
/// real markers, and states the four protocol rules verbatim. It is plain text —
/// there is no per-model formatting, since the whole point of this protocol is to
/// work on models that don't support a native tool-calling wire format.
pub fn compose(markers: &MarkerSet, tools: &[ToolSpec]) -> String {
    let mut out = String::new();

    out.push_str("You have access to the following tools via a delimited-text calling protocol.\n\n");

    for tool in tools {
        out.push_str(&format!("- {}", tool.function.name));
        if let Some(description) = &tool.function.description {
            out.push_str(&format!(": {description}"));
        }
        out.push('\n');

        let schema = tool
            .function
            .parameters
            .as_ref()
            .map(|p| serde_json::to_string(p).unwrap_or_default())
            .unwrap_or_else(|| "{}".to_string());
        out.push_str(&format!("  parameters: {schema}\n"));
    }

    let example_name = tools.first().map(|t| t.function.name.as_str()).unwrap_or("tool_name");

    out.push_str("\nTo call a tool, emit a block exactly like this:\n\n");
    out.push_str(&markers.encode_tool_call(example_name, r#"{"arg": "value"}"#));
    out.push_str("\n\n");

    out.push_str("Rules:\n");
    out.push_str("1. Tool calls must appear at the END of your response, after any other text.\n");
    out.push_str("2. Copy the markers above exactly, character for character.\n");
    out.push_str("3. The argument block must be valid JSON.\n");
    out.push_str("4. Emit at most one tool call per envelope; to call multiple tools, emit multiple envelopes.\n");

    out
}
