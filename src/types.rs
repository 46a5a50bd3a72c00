//! Core data model for the relay (§3).
//!
//! Three families of types live here:
//!
//! - **Account**: the opaque, externally-owned record the relay reads once per request.
//! - **Request envelope**: `model`/`stream`/`messages`/`system`/`max_tokens`, with unknown
//!   fields preserved in `extra` so the relay never drops a client-supplied field it doesn't
//!   understand.
//! - **SSE event model**: the tagged `SseEvent` enum C8 decodes into and C7 pattern-matches on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// ACCOUNT
// ============================================================================

/// Resolves the documented truthy-string ambiguity (§9) the same way on both the
/// request and response path: only the JSON boolean `true` or the exact string
/// `"true"` enables translation. Every other value, including the string
/// `"false"`, is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TranslationFlag(bool);

impl TranslationFlag {
    pub fn is_enabled(self) -> bool {
        self.0
    }
}

impl From<bool> for TranslationFlag {
    fn from(b: bool) -> Self {
        TranslationFlag(b)
    }
}

impl<'de> Deserialize<'de> for TranslationFlag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(TranslationFlag(match value {
            Value::Bool(b) => b,
            Value::String(s) => s == "true",
            _ => false,
        }))
    }
}

impl Serialize for TranslationFlag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bool(self.0)
    }
}

/// Account record consumed by the relay (§3). Fetched once per request by id and
/// never mutated by the core — lifecycle and credential storage belong to the
/// external account service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Account {
    pub id: String,
    pub base_api: String,
    pub api_key: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
    /// Numeric daily quota; `0` (the default) disables quota tracking for this account.
    #[serde(default)]
    pub daily_quota: f64,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub enable_translation: TranslationFlag,
    #[serde(default)]
    pub translation_source_lang: Option<String>,
    #[serde(default)]
    pub translation_target_lang: Option<String>,
}

impl Account {
    pub fn translation_enabled(&self) -> bool {
        self.enable_translation.is_enabled()
    }
}

/// Quota-bearing record the external usage recorder expects. The schema of
/// `fields` is owned entirely by that collaborator; the relay only ever passes
/// it through.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiKeyRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

// ============================================================================
// REQUEST ENVELOPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Either a plain string or an ordered list of content blocks (§3).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Opaque image source — never inspected or translated.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageBlock {
    pub source: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// `content` may itself contain natural language, but §4.6 is explicit that
/// tool_result is never translated — it may carry arbitrary structured data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: Value,
}

/// One block of message content, tagged by `type` (§3). Variants other than
/// `Text` are opaque to the translation subsystem.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    Image(ImageBlock),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
}

/// Inner shape of a text block once tagged by the enclosing `#[serde(tag)]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TextBlock {
    pub text: String,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text(TextBlock { text: text.into() })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text(t) => Some(&t.text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: Content,
}

impl Message {
    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }
}

/// The request body the relay forwards upstream (§3, §6). Unknown fields are
/// captured in `extra` so they round-trip untouched; deep-cloning is just
/// `Clone` since every field is either owned or a cheap `Value` clone (§9 design
/// note: "clone only the translated nodes, sharing the rest").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestEnvelope {
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// PLACEHOLDER MAP (C1)
// ============================================================================

/// Insertion-ordered mapping from synthetic placeholder token to the original
/// code substring it stands in for. Order matters for the monotonic counter
/// invariant (§3) and for deterministic restore.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderMap {
    entries: Vec<(String, String)>,
}

impl PlaceholderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, placeholder: String, original: String) {
        self.entries.push((placeholder, original));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// SSE EVENT MODEL (C8)
// ============================================================================

/// A decoded SSE data payload (§3). `Other` carries any recognized-but-unmodeled
/// or wholly unknown `type` verbatim as a `Value` so it can be passed through
/// byte-identical.
#[derive(Debug, Clone)]
pub enum SseEvent {
    MessageStart(Value),
    MessageDelta(Value),
    MessageStop(Value),
    ContentBlockStart {
        index: u64,
        block_type: String,
        raw: Value,
    },
    ContentBlockDelta {
        index: u64,
        delta: DeltaPayload,
        raw: Value,
    },
    ContentBlockStop {
        index: u64,
        raw: Value,
    },
    Ping(Value),
    Error(Value),
    /// Any `type` this relay does not specifically model. Passed through verbatim.
    Other(Value),
}

#[derive(Debug, Clone)]
pub enum DeltaPayload {
    Text(String),
    InputJson(String),
    Other(Value),
}

impl SseEvent {
    /// The raw, original JSON value — used to re-serialize events unchanged.
    pub fn raw(&self) -> &Value {
        match self {
            SseEvent::MessageStart(v)
            | SseEvent::MessageDelta(v)
            | SseEvent::MessageStop(v)
            | SseEvent::Ping(v)
            | SseEvent::Error(v)
            | SseEvent::Other(v) => v,
            SseEvent::ContentBlockStart { raw, .. } => raw,
            SseEvent::ContentBlockDelta { raw, .. } => raw,
            SseEvent::ContentBlockStop { raw, .. } => raw,
        }
    }

    /// Parses a single decoded JSON payload into a tagged `SseEvent` (§3, §4.8).
    pub fn from_value(raw: Value) -> Self {
        let event_type = raw.get("type").and_then(Value::as_str).unwrap_or("");
        match event_type {
            "message_start" => SseEvent::MessageStart(raw),
            "message_delta" => SseEvent::MessageDelta(raw),
            "message_stop" => SseEvent::MessageStop(raw),
            "content_block_start" => {
                let index = raw.get("index").and_then(Value::as_u64).unwrap_or(0);
                let block_type = raw
                    .get("content_block")
                    .and_then(|b| b.get("type"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                SseEvent::ContentBlockStart {
                    index,
                    block_type,
                    raw,
                }
            }
            "content_block_delta" => {
                let index = raw.get("index").and_then(Value::as_u64).unwrap_or(0);
                let delta_type = raw
                    .get("delta")
                    .and_then(|d| d.get("type"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let delta = match delta_type {
                    "text_delta" => DeltaPayload::Text(
                        raw.get("delta")
                            .and_then(|d| d.get("text"))
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                    ),
                    "input_json_delta" => DeltaPayload::InputJson(
                        raw.get("delta")
                            .and_then(|d| d.get("partial_json"))
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                    ),
                    _ => DeltaPayload::Other(raw.get("delta").cloned().unwrap_or(Value::Null)),
                };
                SseEvent::ContentBlockDelta { index, delta, raw }
            }
            "content_block_stop" => {
                let index = raw.get("index").and_then(Value::as_u64).unwrap_or(0);
                SseEvent::ContentBlockStop { index, raw }
            }
            "ping" => SseEvent::Ping(raw),
            "error" => SseEvent::Error(raw),
            _ => SseEvent::Other(raw),
        }
    }

    /// Builds a synthetic `content_block_delta` event carrying translated text,
    /// matching the shape C7 re-emits (§4.7).
    pub fn text_delta(index: u64, text: &str) -> Self {
        let raw = serde_json::json!({
            "type": "content_block_delta",
            "index": index,
            "delta": { "type": "text_delta", "text": text },
        });
        SseEvent::ContentBlockDelta {
            index,
            delta: DeltaPayload::Text(text.to_string()),
            raw,
        }
    }
}

// ============================================================================
// USAGE (C9)
// ============================================================================

/// The five numbers C9 hands to the usage recorder (§4.9), plus the resolved
/// model name.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageCounts {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub total_tokens: u64,
}

impl UsageCounts {
    pub fn actual_input(&self) -> u64 {
        self.input_tokens.saturating_sub(self.cached_read_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_flag_bool_true() {
        let v: TranslationFlag = serde_json::from_value(Value::Bool(true)).unwrap();
        assert!(v.is_enabled());
    }

    #[test]
    fn translation_flag_string_true() {
        let v: TranslationFlag = serde_json::from_value(Value::String("true".into())).unwrap();
        assert!(v.is_enabled());
    }

    #[test]
    fn translation_flag_string_false_is_disabled() {
        let v: TranslationFlag = serde_json::from_value(Value::String("false".into())).unwrap();
        assert!(!v.is_enabled());
    }

    #[test]
    fn translation_flag_bool_false() {
        let v: TranslationFlag = serde_json::from_value(Value::Bool(false)).unwrap();
        assert!(!v.is_enabled());
    }

    #[test]
    fn content_block_text_round_trip() {
        let block = ContentBlock::text("hello");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hello");
        let back: ContentBlock = serde_json::from_value(json).unwrap();
        assert_eq!(back.as_text(), Some("hello"));
    }

    #[test]
    fn content_block_tool_result_content_is_opaque_value() {
        let json = serde_json::json!({
            "type": "tool_result",
            "tool_use_id": "call_1",
            "content": {"nested": ["anything", 1, true]},
        });
        let block: ContentBlock = serde_json::from_value(json).unwrap();
        match block {
            ContentBlock::ToolResult(r) => assert_eq!(r.tool_use_id, "call_1"),
            _ => panic!("expected tool_result"),
        }
    }

    #[test]
    fn request_envelope_preserves_unknown_fields() {
        let json = serde_json::json!({
            "model": "claude-sonnet-4",
            "stream": true,
            "messages": [],
            "weird_field": "kept",
        });
        let env: RequestEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(env.extra.get("weird_field").unwrap(), "kept");
    }

    #[test]
    fn sse_event_parses_content_block_delta_text() {
        let raw = serde_json::json!({
            "type": "content_block_delta",
            "index": 2,
            "delta": { "type": "text_delta", "text": "hi" },
        });
        match SseEvent::from_value(raw) {
            SseEvent::ContentBlockDelta { index, delta, .. } => {
                assert_eq!(index, 2);
                match delta {
                    DeltaPayload::Text(t) => assert_eq!(t, "hi"),
                    _ => panic!("expected text delta"),
                }
            }
            _ => panic!("expected content_block_delta"),
        }
    }

    #[test]
    fn sse_event_unknown_type_passes_through() {
        let raw = serde_json::json!({"type": "some_future_event", "x": 1});
        match SseEvent::from_value(raw.clone()) {
            SseEvent::Other(v) => assert_eq!(v, raw),
            _ => panic!("expected Other"),
        }
    }

    #[test]
    fn usage_counts_actual_input_floors_at_zero() {
        let usage = UsageCounts {
            input_tokens: 10,
            cached_read_tokens: 25,
            ..Default::default()
        };
        assert_eq!(usage.actual_input(), 0);
    }
}
