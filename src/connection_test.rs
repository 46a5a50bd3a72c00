//! Connection-test harness (C12, §4.12).
//!
//! A single-shot probe: build a minimal chat request against an account's
//! `base_api`, stream the OpenAI-style SSE response, and translate it into a
//! small sequence of domain events a host can relay to its own client
//! stream. Generalizes the teacher's `client::query` single-shot path
//! (`client.rs`) into a probe that emits domain events instead of
//! `ContentBlock`s.

use std::time::Duration;

use serde_json::Value;

use crate::sse::{FramedEvent, SseFramer};
use crate::types::Account;
use crate::{Error, Result};

/// Domain events the harness emits to the client stream (§4.12).
#[derive(Debug, Clone)]
pub enum TestEvent {
    TestStart,
    Content { text: String },
    MessageStop,
    TestComplete { success: bool, error: Option<String> },
}

/// Runs the probe against `account`, returning the full event sequence.
///
/// A non-200 upstream status ends the sequence with
/// `TestComplete { success: false, .. }` and a best-effort extracted error
/// message rather than propagating an `Err` — the harness's whole purpose is
/// to report connectivity, success or failure, to its caller (§4.12).
pub async fn run_connection_test(account: &Account, http: &reqwest::Client) -> Vec<TestEvent> {
    let mut events = vec![TestEvent::TestStart];

    let model = account
        .default_model
        .clone()
        .unwrap_or_else(|| "gpt-4o-mini".to_string());
    let url = format!("{}/v1/chat/completions", account.base_api.trim_end_matches('/'));
    let body = serde_json::json!({
        "model": model,
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": "hi"},
        ],
        "max_tokens": 100,
        "stream": true,
    });

    let request = http
        .post(&url)
        .bearer_auth(&account.api_key)
        .json(&body)
        .timeout(Duration::from_secs(30));

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            events.push(TestEvent::TestComplete {
                success: false,
                error: Some(format!("connection failed: {e}")),
            });
            return events;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body_text)
            .unwrap_or_else(|| format!("upstream returned status {}", status.as_u16()));
        events.push(TestEvent::TestComplete {
            success: false,
            error: Some(message),
        });
        return events;
    }

    match drain_openai_stream(response).await {
        Ok(texts) => {
            for text in texts {
                events.push(TestEvent::Content { text });
            }
            events.push(TestEvent::MessageStop);
            events.push(TestEvent::TestComplete {
                success: true,
                error: None,
            });
        }
        Err(e) => {
            events.push(TestEvent::TestComplete {
                success: false,
                error: Some(e.to_string()),
            });
        }
    }

    events
}

/// Parses an OpenAI-style chat-completions stream and collects the delta
/// text fragments in order.
async fn drain_openai_stream(response: reqwest::Response) -> Result<Vec<String>> {
    use futures::StreamExt;

    let mut framer = SseFramer::new();
    let mut texts = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(Error::Http)?;
        let text = String::from_utf8_lossy(&bytes);
        for framed in framer.push(&text) {
            match framed {
                FramedEvent::Done => return Ok(texts),
                FramedEvent::Data(event) => {
                    if let Some(delta) = extract_openai_delta_text(event.raw()) {
                        texts.push(delta);
                    }
                }
            }
        }
    }

    if let Some(FramedEvent::Data(event)) = framer.drain() {
        if let Some(delta) = extract_openai_delta_text(event.raw()) {
            texts.push(delta);
        }
    }

    Ok(texts)
}

fn extract_openai_delta_text(raw: &Value) -> Option<String> {
    raw.get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_openai_delta_text_reads_nested_content() {
        let raw = serde_json::json!({
            "choices": [{"delta": {"content": "hello"}}],
        });
        assert_eq!(extract_openai_delta_text(&raw), Some("hello".to_string()));
    }

    #[test]
    fn extract_openai_delta_text_missing_content_is_none() {
        let raw = serde_json::json!({"choices": [{"delta": {}}]});
        assert_eq!(extract_openai_delta_text(&raw), None);
    }

    #[test]
    fn extract_error_message_reads_nested_error_message() {
        let body = r#"{"error": {"message": "invalid api key"}}"#;
        assert_eq!(extract_error_message(body), Some("invalid api key".to_string()));
    }

    #[test]
    fn extract_error_message_malformed_body_is_none() {
        assert_eq!(extract_error_message("not json"), None);
    }
}
