//! SSE framer/parser (C8, §4.8).
//!
//! Generalizes the teacher's `parse_sse_stream` (`utils.rs`): same `\n\n`
//! event framing and `data:` line scanning, but (a) decodes into the tagged
//! [`SseEvent`] enum instead of a fixed OpenAI chunk shape, and (b) tolerates
//! per-event decode failures (logged, skipped) instead of ending the stream —
//! a malformed event from an upstream provider must never take down an
//! otherwise-healthy response (§4.8).

use crate::types::SseEvent;

/// Incremental byte-to-event framer. Feed it chunks as they arrive from the
/// upstream body; it buffers partial events across chunk boundaries and
/// returns every complete event found so far.
#[derive(Debug, Default)]
pub struct SseFramer {
    buffer: String,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every complete SSE event framed since the
    /// last call. The tail after the last `\n\n` is retained for next time.
    pub fn push(&mut self, chunk: &str) -> Vec<FramedEvent> {
        self.buffer.push_str(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let raw_event = self.buffer[..pos].to_string();
            self.buffer.drain(..pos + 2);
            if let Some(event) = decode_event(&raw_event) {
                events.push(event);
            }
        }
        events
    }

    /// Drains and decodes whatever is left in the buffer, for end-of-stream
    /// (§4.10: "always drain the remaining accumulator").
    pub fn drain(&mut self) -> Option<FramedEvent> {
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return None;
        }
        let raw_event = std::mem::take(&mut self.buffer);
        decode_event(&raw_event)
    }
}

/// One fully-framed SSE event: either a decoded JSON payload, or the literal
/// `[DONE]` sentinel which is never parsed as JSON (§3, §4.8).
#[derive(Debug, Clone)]
pub enum FramedEvent {
    Data(SseEvent),
    Done,
}

/// Scans one raw event (the text between two `\n\n` terminators) line by
/// line for `data:` lines, concatenating their payloads. Decode failures are
/// logged and skipped — never fatal (§4.8).
fn decode_event(raw_event: &str) -> Option<FramedEvent> {
    let mut payload = String::new();
    let mut saw_data_line = false;

    for line in raw_event.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            saw_data_line = true;
            payload.push_str(rest.trim());
        }
    }

    if !saw_data_line {
        return None;
    }

    if payload == "[DONE]" {
        return Some(FramedEvent::Done);
    }

    match serde_json::from_str::<serde_json::Value>(&payload) {
        Ok(value) => Some(FramedEvent::Data(SseEvent::from_value(value))),
        Err(e) => {
            log::warn!("sse: dropping malformed event, decode failed: {e}");
            None
        }
    }
}

/// Serializes an `SseEvent` back into `data: <json>\n\n` wire format, used
/// when re-emitting events to the client (translated or passed through).
pub fn encode_event(raw: &serde_json::Value) -> String {
    format!("data: {}\n\n", raw)
}

/// The literal `[DONE]` terminator frame (§6: "forwarded as received, never
/// synthesized" — this helper exists for hosts that need to build one, e.g.
/// the connection-test harness's own synthetic stream).
pub fn encode_done() -> &'static str {
    "data: [DONE]\n\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frames_single_event_spanning_multiple_chunks() {
        let mut framer = SseFramer::new();
        assert!(framer.push("data: {\"type\":\"ping\"").is_empty());
        let events = framer.push("}\n\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], FramedEvent::Data(SseEvent::Ping(_))));
    }

    #[test]
    fn frames_multiple_events_in_one_chunk() {
        let mut framer = SseFramer::new();
        let chunk = "data: {\"type\":\"ping\"}\n\ndata: {\"type\":\"message_stop\"}\n\n";
        let events = framer.push(chunk);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn done_sentinel_is_not_parsed_as_json() {
        let mut framer = SseFramer::new();
        let events = framer.push("data: [DONE]\n\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], FramedEvent::Done));
    }

    #[test]
    fn malformed_json_is_skipped_not_fatal() {
        let mut framer = SseFramer::new();
        let chunk = "data: {not valid json\n\ndata: {\"type\":\"ping\"}\n\n";
        let events = framer.push(chunk);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], FramedEvent::Data(SseEvent::Ping(_))));
    }

    #[test]
    fn non_data_lines_without_any_data_line_are_ignored() {
        let mut framer = SseFramer::new();
        let events = framer.push("event: keepalive\nid: 5\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn drain_flushes_remainder_at_end_of_stream() {
        let mut framer = SseFramer::new();
        framer.push("data: {\"type\":\"ping\"}");
        let drained = framer.drain();
        assert!(matches!(drained, Some(FramedEvent::Data(SseEvent::Ping(_)))));
        assert!(framer.drain().is_none());
    }

    #[test]
    fn encode_event_round_trips_through_decode() {
        let raw = json!({"type": "ping"});
        let wire = encode_event(&raw);
        let mut framer = SseFramer::new();
        let events = framer.push(&wire);
        assert_eq!(events.len(), 1);
    }
}
