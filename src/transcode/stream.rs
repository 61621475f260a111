//! C5: streaming response transcoder.
//!
//! Incrementally parses a server-sent-event stream of partial assistant tokens,
//! emitting clean text chunks until a delimiter opens, buffering the delimited block
//! until it closes, then emitting structured tool-call events. This is a synchronous
//! state machine (see [`StreamTranscoder`]) so it can be unit tested without any async
//! machinery; [`crate::proxy::forward::dispatch`] drives it over an actual upstream
//! byte stream.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::markers::MarkerSet;
use crate::protocol::{ChunkDelta, DownstreamChunk, ToolCall, ToolCallDelta, ToolCallKind, UpstreamChunk};
use crate::transcode::parser;

/// Per-request state for the streaming transcoder. See the data model's invariants:
/// if `is_buffering` is set, `content_buffer` always starts with `TC_START`, and
/// `pending_text` is always empty.
pub struct StreamTranscoder {
    markers: MarkerSet,
    clock: Arc<dyn Clock>,
    line_buffer: Vec<u8>,
    content_buffer: String,
    pending_text: String,
    is_buffering: bool,
    stream_ended: bool,
}

impl StreamTranscoder {
    pub fn new(markers: MarkerSet) -> Self {
        Self::with_clock(markers, Arc::new(SystemClock))
    }

    pub fn with_clock(markers: MarkerSet, clock: Arc<dyn Clock>) -> Self {
        Self {
            markers,
            clock,
            line_buffer: Vec::new(),
            content_buffer: String::new(),
            pending_text: String::new(),
            is_buffering: false,
            stream_ended: false,
        }
    }

    /// Feed raw upstream bytes in and get back raw downstream SSE bytes to forward
    /// to the client. May return an empty vector if no complete line was available,
    /// or if every complete line produced no client-visible output.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<u8> {
        self.line_buffer.extend_from_slice(bytes);
        let mut output = Vec::new();

        // `\n` can never appear as a continuation byte of a multi-byte UTF-8
        // sequence, so splitting on raw bytes here is always safe even if a
        // network chunk boundary falls inside a multi-byte character.
        while let Some(pos) = self.line_buffer.iter().position(|&b| b == b'\n') {
            let line_bytes = self.line_buffer.drain(..=pos).collect::<Vec<u8>>();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]);
            let line = line.trim_end_matches('\r').to_string();
            self.process_line(&line, &mut output);

            if self.stream_ended {
                break;
            }
        }

        output
    }

    /// Terminal handling for a graceful upstream close (EOF, or an explicit
    /// `[DONE]` line already handled by [`Self::feed`]). Idempotent: calling this
    /// more than once after the stream has already ended is a no-op.
    pub fn finish(&mut self) -> Vec<u8> {
        if self.stream_ended {
            return Vec::new();
        }
        self.stream_ended = true;
        self.terminal_sequence()
    }

    fn process_line(&mut self, line: &str, output: &mut Vec<u8>) {
        if line.is_empty() {
            return;
        }

        if line == "data: [DONE]" {
            self.stream_ended = true;
            output.extend(self.terminal_sequence());
            return;
        }

        let Some(payload) = line.strip_prefix("data: ") else {
            return;
        };

        let chunk = match serde_json::from_str::<UpstreamChunk>(payload) {
            Ok(chunk) => chunk,
            Err(err) => {
                log::warn!("failed to parse upstream streaming chunk: {err}");
                return;
            }
        };

        let Some(content) = chunk.choices.first().and_then(|choice| choice.delta.content.clone()) else {
            return;
        };

        self.handle_content(&content, output);
    }

    fn handle_content(&mut self, content: &str, output: &mut Vec<u8>) {
        if self.is_buffering {
            self.content_buffer.push_str(content);
            return;
        }

        let combined = format!("{}{}", self.pending_text, content);

        if let Some(start) = combined.find(&self.markers.tc_start) {
            let prefix = &combined[..start];
            if !prefix.is_empty() {
                output.extend(self.text_chunk_bytes(prefix));
            }
            self.content_buffer = combined[start..].to_string();
            self.pending_text.clear();
            self.is_buffering = true;
            return;
        }

        let first_marker_char = self
            .markers
            .tc_start
            .chars()
            .next()
            .expect("markers are always non-empty");

        if combined.contains(first_marker_char) {
            self.pending_text = combined;
        } else {
            if !combined.is_empty() {
                output.extend(self.text_chunk_bytes(&combined));
            }
            self.pending_text.clear();
        }
    }

    fn terminal_sequence(&mut self) -> Vec<u8> {
        let mut output = Vec::new();

        if !self.is_buffering && !self.pending_text.is_empty() {
            let pending = std::mem::take(&mut self.pending_text);
            output.extend(self.text_chunk_bytes(&pending));
        }

        if self.content_buffer.is_empty() {
            output.extend(self.finish_chunk_bytes("stop"));
        } else {
            let content = std::mem::take(&mut self.content_buffer);
            let result = parser::parse(&content, &self.markers, self.clock.now_ms());

            if result.tool_calls.is_empty() {
                if !result.clean_content.is_empty() {
                    output.extend(self.text_chunk_bytes(&result.clean_content));
                }
                output.extend(self.finish_chunk_bytes("stop"));
            } else {
                for (index, call) in result.tool_calls.iter().enumerate() {
                    output.extend(self.tool_call_chunk_bytes(index as u32, call));
                }
                output.extend(self.finish_chunk_bytes("tool_calls"));
            }
        }

        output.extend(b"data: [DONE]\n\n");
        output
    }

    fn text_chunk_bytes(&self, text: &str) -> Vec<u8> {
        let delta = ChunkDelta {
            content: Some(text.to_string()),
            ..Default::default()
        };
        self.frame(delta, None)
    }

    fn tool_call_chunk_bytes(&self, index: u32, call: &ToolCall) -> Vec<u8> {
        let delta = ChunkDelta {
            tool_calls: Some(vec![ToolCallDelta {
                index,
                id: Some(call.id.clone()),
                kind: Some(ToolCallKind::Function),
                function: Some(call.function.clone()),
            }]),
            ..Default::default()
        };
        self.frame(delta, None)
    }

    fn finish_chunk_bytes(&self, reason: &'static str) -> Vec<u8> {
        self.frame(ChunkDelta::default(), Some(reason))
    }

    fn frame(&self, delta: ChunkDelta, finish_reason: Option<&'static str>) -> Vec<u8> {
        let chunk = DownstreamChunk::new(
            format!("chatcmpl-{}", self.clock.now_ms()),
            self.clock.now_s(),
            delta,
            finish_reason,
        );
        let json = serde_json::to_string(&chunk).expect("DownstreamChunk always serializes");
        format!("data: {json}\n\n").into_bytes()
    }
}
