//! Line-level relay of an upstream SSE stream.
//!
//! [`LineBuffer`] reassembles complete lines from arbitrary byte chunks and
//! [`StreamRelay`] turns each line into at most one framed output event. Events
//! are never merged, split or reordered; the only transform is reasoning
//! filtering of `choices[].delta.content` (and dropping `reasoning_content`).

use serde_json::{json, Value};
use std::borrow::Cow;

use crate::error::ProxyError;

use super::reasoning;
use super::types::ChatResponse;

/// The terminal sentinel, as sent upstream and re-emitted downstream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// How a single upstream line should be handled.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayLine {
    /// Blank separator; nothing is emitted.
    Skip,
    /// `data: [DONE]`; emit the sentinel and stop.
    Done,
    /// A parsed chunk record.
    Chunk(Value),
    /// Anything that did not parse; forwarded byte-for-byte.
    RawPassthrough(String),
}

/// Classify one upstream line (without its trailing newline).
#[must_use]
pub fn classify_line(line: &str) -> RelayLine {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return RelayLine::Skip;
    }

    let payload = line
        .strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))
        .unwrap_or(line)
        .trim();

    if payload == DONE_SENTINEL {
        return RelayLine::Done;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(chunk) => RelayLine::Chunk(chunk),
        Err(_) => RelayLine::RawPassthrough(line.to_string()),
    }
}

/// Strip reasoning markup from every `choices[].delta` in a chunk.
/// Deltas with no tag literal skip `filter` and keep their edge whitespace.
pub fn filter_chunk(chunk: &mut Value) {
    let Some(choices) = chunk.get_mut("choices").and_then(Value::as_array_mut) else {
        return;
    };

    for choice in choices {
        let Some(delta) = choice.get_mut("delta").and_then(Value::as_object_mut) else {
            continue;
        };
        delta.remove("reasoning_content");
        if let Some(Value::String(content)) = delta.get_mut("content") {
            let filtered = match reasoning::filter_delta(content) {
                Cow::Owned(filtered) => Some(filtered),
                Cow::Borrowed(_) => None,
            };
            if let Some(filtered) = filtered {
                *content = filtered;
            }
        }
    }
}

/// Frame one SSE event.
#[must_use]
pub fn frame(line: &str) -> String {
    format!("{line}\n\n")
}

/// Terminal event for a stream that failed after the response started,
/// shaped like the non-streaming error body.
#[must_use]
pub fn error_event(err: &ProxyError) -> String {
    let body = json!({
        "error": err.to_string(),
        "status_code": err.status_code(),
        "type": err.kind(),
    });
    frame(&format!("data: {body}"))
}

/// Render a finished completion as stream events: one chunk per choice
/// carrying the whole message as its delta, then the sentinel.
#[must_use]
pub fn completion_to_events(completion: &ChatResponse) -> Vec<String> {
    let mut events: Vec<String> = completion
        .choices
        .iter()
        .map(|choice| {
            let chunk = json!({
                "id": completion.id,
                "object": "chat.completion.chunk",
                "created": completion.created,
                "model": completion.model,
                "choices": [{
                    "index": choice.index,
                    "delta": {
                        "role": choice.message.role,
                        "content": choice.message.content,
                    },
                    "finish_reason": choice.finish_reason,
                }],
            });
            frame(&format!("data: {chunk}"))
        })
        .collect();
    events.push(frame(&format!("data: {DONE_SENTINEL}")));
    events
}

/// Per-stream relay state: only whether the sentinel has been seen.
#[derive(Debug)]
pub struct StreamRelay {
    apply_filter: bool,
    finished: bool,
    passthrough_count: usize,
}

impl StreamRelay {
    #[must_use]
    pub fn new(apply_filter: bool) -> Self {
        Self {
            apply_filter,
            finished: false,
            passthrough_count: 0,
        }
    }

    /// Process one upstream line, returning the framed event to emit, if any.
    pub fn process_line(&mut self, line: &str) -> Option<String> {
        if self.finished {
            return None;
        }

        match classify_line(line) {
            RelayLine::Skip => None,
            RelayLine::Done => {
                self.finished = true;
                Some(frame(&format!("data: {DONE_SENTINEL}")))
            }
            RelayLine::RawPassthrough(raw) => {
                self.passthrough_count += 1;
                Some(frame(&raw))
            }
            RelayLine::Chunk(mut chunk) => {
                if self.apply_filter {
                    filter_chunk(&mut chunk);
                }
                match serde_json::to_string(&chunk) {
                    Ok(json) => Some(frame(&format!("data: {json}"))),
                    Err(_) => Some(frame(line.trim_end_matches('\r'))),
                }
            }
        }
    }

    /// True once the sentinel has been relayed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of lines forwarded raw because they did not parse.
    #[must_use]
    pub fn passthrough_count(&self) -> usize {
        self.passthrough_count
    }
}

/// Reassembles newline-terminated lines from byte chunks. Bytes are kept until
/// a full line arrives, so multi-byte UTF-8 split across chunks decodes intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and drain every complete line (without the `\n`).
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.pop();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever is left once the upstream closes without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay_all(lines: &[&str], apply_filter: bool) -> Vec<String> {
        let mut relay = StreamRelay::new(apply_filter);
        lines.iter().filter_map(|l| relay.process_line(l)).collect()
    }

    #[test]
    fn test_filters_think_delta_and_relays_done() {
        let out = relay_all(
            &[
                r#"data: {"choices":[{"delta":{"content":"<think>x</think>y"}}]}"#,
                "",
                "data: [DONE]",
                "",
            ],
            true,
        );
        assert_eq!(
            out,
            vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"y\"}}]}\n\n".to_string(),
                "data: [DONE]\n\n".to_string(),
            ]
        );
    }

    #[test]
    fn test_no_filter_keeps_content() {
        let out = relay_all(
            &[r#"data: {"choices":[{"delta":{"content":"<think>x</think>y"}}]}"#],
            false,
        );
        assert_eq!(
            out,
            vec!["data: {\"choices\":[{\"delta\":{\"content\":\"<think>x</think>y\"}}]}\n\n"]
        );
    }

    #[test]
    fn test_field_order_preserved() {
        let line = r#"data: {"id":"c1","object":"chat.completion.chunk","created":5,"model":"m","choices":[{"index":0,"delta":{"role":"assistant","content":" world"},"finish_reason":null}]}"#;
        let out = relay_all(&[line], true);
        assert_eq!(out, vec![format!("{line}\n\n")]);
    }

    #[test]
    fn test_reasoning_content_dropped_when_filtering() {
        let out = relay_all(
            &[r#"data: {"choices":[{"delta":{"reasoning_content":"hmm","content":"ok"}}]}"#],
            true,
        );
        assert_eq!(out, vec!["data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n"]);
    }

    #[test]
    fn test_malformed_chunk_passes_through_raw() {
        let mut relay = StreamRelay::new(true);
        let out: Vec<String> = [
            "data: {not json",
            ": keep-alive",
            r#"data: {"choices":[{"delta":{"content":"a"}}]}"#,
        ]
        .iter()
        .filter_map(|l| relay.process_line(l))
        .collect();

        assert_eq!(out.len(), 3);
        assert_eq!(out[0], "data: {not json\n\n");
        assert_eq!(out[1], ": keep-alive\n\n");
        assert_eq!(out[2], "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n");
        assert_eq!(relay.passthrough_count(), 2);
        assert!(!relay.is_finished());
    }

    #[test]
    fn test_nothing_emitted_after_done() {
        let out = relay_all(
            &["data: [DONE]", r#"data: {"choices":[{"delta":{"content":"late"}}]}"#],
            true,
        );
        assert_eq!(out, vec!["data: [DONE]\n\n"]);
    }

    #[test]
    fn test_classify_variants() {
        assert_eq!(classify_line("   "), RelayLine::Skip);
        assert_eq!(classify_line("data:[DONE]"), RelayLine::Done);
        assert_eq!(classify_line("data: [DONE]\r"), RelayLine::Done);
        assert!(matches!(classify_line(r#"{"choices":[]}"#), RelayLine::Chunk(_)));
        assert_eq!(
            classify_line("event: ping"),
            RelayLine::RawPassthrough("event: ping".to_string())
        );
    }

    #[test]
    fn test_filter_chunk_ignores_odd_shapes() {
        let mut no_choices = serde_json::json!({"usage": {"total_tokens": 1}});
        filter_chunk(&mut no_choices);
        assert_eq!(no_choices, serde_json::json!({"usage": {"total_tokens": 1}}));

        let mut odd = serde_json::json!({"choices": [1, {"delta": "x"}, {"delta": {"content": 5}}]});
        let before = odd.clone();
        filter_chunk(&mut odd);
        assert_eq!(odd, before);
    }

    #[test]
    fn test_split_tag_across_chunks_is_not_filtered() {
        let out = relay_all(
            &[
                r#"data: {"choices":[{"delta":{"content":"<thi"}}]}"#,
                r#"data: {"choices":[{"delta":{"content":"nk>hidden</think>shown"}}]}"#,
            ],
            true,
        );
        assert_eq!(out[0], "data: {\"choices\":[{\"delta\":{\"content\":\"<thi\"}}]}\n\n");
        // Only the stray closing tag is recognisable in the second half.
        assert_eq!(
            out[1],
            "data: {\"choices\":[{\"delta\":{\"content\":\"nk>hiddenshown\"}}]}\n\n"
        );
    }

    #[test]
    fn test_completion_to_events() {
        let completion = crate::translate::response::synthesize_response("hi".to_string(), "m");
        let events = completion_to_events(&completion);

        assert_eq!(events.len(), 2);
        assert_eq!(events[1], "data: [DONE]\n\n");

        let payload = events[0]
            .strip_prefix("data: ")
            .and_then(|e| e.strip_suffix("\n\n"))
            .unwrap();
        let chunk: Value = serde_json::from_str(payload).unwrap();
        assert_eq!(chunk["object"], "chat.completion.chunk");
        assert_eq!(chunk["model"], "m");
        assert_eq!(chunk["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(chunk["choices"][0]["delta"]["content"], "hi");
        assert_eq!(chunk["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn test_error_event_carries_kind_and_status() {
        let err = ProxyError::transport(crate::error::TransportKind::Connect, "reset by peer");
        let event = error_event(&err);
        assert!(event.starts_with("data: {"));
        assert!(event.ends_with("}\n\n"));

        let body: Value = serde_json::from_str(event.trim_start_matches("data: ").trim_end()).unwrap();
        assert_eq!(body["type"], "transport_error");
        assert_eq!(body["status_code"], 502);
        assert!(body["error"].as_str().unwrap().contains("reset by peer"));
    }

    #[test]
    fn test_line_buffer_reassembles_split_input() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        assert_eq!(buf.push(b":1}\n\nda"), vec!["data: {\"a\":1}".to_string(), String::new()]);
        assert_eq!(buf.push(b"ta: [DONE]\n"), vec!["data: [DONE]".to_string()]);
        assert!(buf.finish().is_none());
    }

    #[test]
    fn test_line_buffer_keeps_split_utf8() {
        let text = "data: é\n".as_bytes();
        let (a, b) = text.split_at(7); // inside the two-byte 'é'
        let mut buf = LineBuffer::new();
        assert!(buf.push(a).is_empty());
        assert_eq!(buf.push(b), vec!["data: é".to_string()]);
    }

    #[test]
    fn test_line_buffer_flushes_tail() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: [DONE]").is_empty());
        assert_eq!(buf.finish(), Some("data: [DONE]".to_string()));
    }
}
