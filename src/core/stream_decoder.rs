//! Incremental decoder for `data:`-framed completion streams.
//!
//! Bytes arrive in arbitrary chunks. They are split into lines, `data:`
//! payloads are appended to a raw fragment buffer that spans lines, and
//! complete JSON objects are carved out of that buffer by brace depth. A
//! payload may therefore be split across chunks *and* across `data:` lines
//! and still decode to the same deltas.

use memchr::memchr;
use tracing::{debug, warn};

use crate::api::ChatResponse;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Upper bound on buffered bytes for a single unterminated object.
const MAX_PENDING_FRAGMENT_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    /// Non-empty `choices[0].delta.content`.
    Delta(String),
    /// An `{"error": {...}}` object delivered inside an otherwise healthy stream.
    ApiError { code: Option<u16>, message: String },
    /// The `[DONE]` sentinel.
    Done,
}

#[derive(Debug, Default)]
pub struct FrameDecoder {
    line_buffer: Vec<u8>,
    /// Start of the first unread line in `line_buffer`.
    line_start: usize,
    raw: String,
    /// The pending fragment in `raw` ends inside a string literal.
    raw_in_string: bool,
    done: bool,
    dropped: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `[DONE]` has been seen. Further input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of candidate objects discarded because they failed to parse
    /// or never closed.
    pub fn dropped_fragments(&self) -> usize {
        self.dropped
    }

    /// Buffers raw bytes. Call [`next_line`](Self::next_line) to drain
    /// complete lines.
    pub fn push_bytes(&mut self, chunk: &[u8]) {
        if self.done {
            return;
        }
        self.compact();
        self.line_buffer.extend_from_slice(chunk);
    }

    /// Next newline-terminated line from the byte buffer, without its
    /// terminator. Lines that are not valid UTF-8 are skipped.
    pub fn next_line(&mut self) -> Option<String> {
        while let Some(offset) = memchr(b'\n', &self.line_buffer[self.line_start..]) {
            let start = self.line_start;
            let end = start + offset;
            self.line_start = end + 1;

            let line = &self.line_buffer[start..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            match std::str::from_utf8(line) {
                Ok(text) => return Some(text.to_string()),
                Err(err) => debug!(error = %err, "Skipping stream line with invalid UTF-8"),
            }
        }
        None
    }

    /// Convenience: push bytes and decode every complete line.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecodedFrame> {
        self.push_bytes(chunk);
        let mut frames = Vec::new();
        while !self.done {
            let Some(line) = self.next_line() else {
                break;
            };
            frames.extend(self.decode_line(&line));
        }
        frames
    }

    /// Decodes whatever is left once the byte source is exhausted, treating
    /// an unterminated trailing line as complete.
    pub fn finish(&mut self) -> Vec<DecodedFrame> {
        let mut frames = self.feed(&[]);
        self.compact();
        if !self.done && !self.line_buffer.is_empty() {
            let rest = std::mem::take(&mut self.line_buffer);
            match String::from_utf8(rest) {
                Ok(line) => frames.extend(self.decode_line(line.trim_end_matches('\r'))),
                Err(err) => debug!(error = %err, "Dropping trailing bytes with invalid UTF-8"),
            }
        }
        frames
    }

    /// Decodes one physical line of the stream.
    pub fn decode_line(&mut self, line: &str) -> Vec<DecodedFrame> {
        let mut frames = Vec::new();
        if self.done || line.starts_with(':') {
            return frames;
        }

        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return frames;
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload);

        if payload.trim() == DONE_SENTINEL {
            if !self.raw.trim().is_empty() {
                debug!(
                    pending = self.raw.len(),
                    "Discarding unterminated fragment at end of stream"
                );
            }
            self.raw.clear();
            self.raw_in_string = false;
            self.done = true;
            frames.push(DecodedFrame::Done);
            return frames;
        }

        if self.raw_in_string && is_standalone_object(payload) {
            debug!(
                pending = self.raw.len(),
                "Dropping fragment stuck in an unclosed string"
            );
            self.raw.clear();
            self.raw_in_string = false;
            self.dropped += 1;
        }

        self.raw.push_str(payload);
        self.drain_objects(&mut frames);
        frames
    }

    fn compact(&mut self) {
        if self.line_start > 0 {
            self.line_buffer.drain(..self.line_start);
            self.line_start = 0;
        }
    }

    fn drain_objects(&mut self, frames: &mut Vec<DecodedFrame>) {
        self.raw_in_string = false;
        loop {
            let Some(start) = self.raw.find('{') else {
                self.raw.clear();
                return;
            };

            let len = match scan_object(&self.raw[start..]) {
                ObjectScan::Complete(len) => len,
                ObjectScan::Open { in_string } => {
                    if start > 0 {
                        self.raw.drain(..start);
                    }
                    if self.raw.len() > MAX_PENDING_FRAGMENT_BYTES {
                        warn!(
                            pending = self.raw.len(),
                            "Dropping oversized unterminated stream fragment"
                        );
                        self.raw.clear();
                        self.dropped += 1;
                    } else {
                        self.raw_in_string = in_string;
                    }
                    return;
                }
            };

            let end = start + len;
            let candidate = self.raw[start..end].to_string();
            self.raw.drain(..end);

            match serde_json::from_str::<ChatResponse>(&candidate) {
                Ok(response) => {
                    if let Some(content) = response.first_delta_content() {
                        frames.push(DecodedFrame::Delta(content.to_string()));
                    } else if let Some(error) = &response.error {
                        frames.push(DecodedFrame::ApiError {
                            code: error.code_number(),
                            message: error.summary(),
                        });
                    }
                }
                Err(err) => {
                    self.dropped += 1;
                    debug!(error = %err, fragment_len = candidate.len(), "Dropping malformed stream fragment");
                }
            }
        }
    }
}

enum ObjectScan {
    /// Byte length of the closed object.
    Complete(usize),
    Open { in_string: bool },
}

/// Scans the JSON object that opens `text` (which must start with `{`).
/// Braces inside string literals do not count toward depth.
fn scan_object(text: &str) -> ObjectScan {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return ObjectScan::Complete(index + 1);
                }
            }
            _ => {}
        }
    }
    ObjectScan::Open { in_string }
}

/// A payload that is a whole chunk object on its own, which means a
/// fragment still waiting for its closing quote was never going to finish.
fn is_standalone_object(payload: &str) -> bool {
    let payload = payload.trim();
    payload.starts_with('{') && serde_json::from_str::<ChatResponse>(payload).is_ok()
}
