//! Relay core (C10, §4.10).
//!
//! End-to-end request lifecycle: look up the account, optionally translate
//! the request body (C6), dispatch upstream, classify the response, splice
//! the streaming body back to the client (raw or translated via C7), extract
//! usage (C9), and fire scheduler callbacks (C11) on rate-limit/auth
//! failures. Generalizes the teacher's `client::query`/`parse_sse_stream`
//! request-building and consumption (`client.rs`, `utils.rs`) into a
//! host-agnostic relay function, with tee-streaming and error classification
//! grounded on the `cc-proxy`/`claude-proxy` examples' `TeeBody` and
//! `sse_translate_stream` patterns.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::account::{AccountResolver, CostCalculator, UsageRecorder};
use crate::config::RelayConfig;
use crate::request_translator::translate_request_with;
use crate::response_translator::ResponseTranslator;
use crate::scheduler::{notify_rate_limited, notify_unauthorized, SchedulerHandle};
use crate::sse::{encode_event, FramedEvent, SseFramer};
use crate::translation::TranslationService;
use crate::types::{RequestEnvelope, UsageCounts};
use crate::usage::{extract_usage, resolve_model};
use crate::{Error, Result};

const RATE_LIMIT_ERROR_TYPES: &[&str] = &[
    "rate_limit_error",
    "usage_limit_reached",
    "rate_limit_exceeded",
];

/// A request arriving at the relay, already validated and header-filtered by
/// the host (the HTTP framework, account lookup route, and header allowlist
/// are external collaborators, §1).
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub account_id: String,
    /// Path appended to `account.base_api`, e.g. `/v1/chat/completions`.
    pub path: String,
    /// Already allowlist-filtered incoming headers.
    pub headers: HashMap<String, String>,
    pub body: RequestEnvelope,
    pub provider_tag: String,
}

impl IncomingRequest {
    /// Session id from the body, falling back to the `session_id` header
    /// (§6: "also accepted from header `session_id`").
    fn session_id(&self) -> Option<String> {
        self.body
            .session_id
            .clone()
            .or_else(|| self.headers.get("session_id").cloned())
    }
}

/// Outcome of a non-streaming (or pre-stream-classification) relay call.
#[derive(Debug, Clone)]
pub struct JsonOutcome {
    pub status: u16,
    pub body: Value,
}

/// What a caller provides to receive streamed bytes. `write` returns `false`
/// once the client is no longer writable, which short-circuits the splice
/// loop and aborts the upstream read (§5 "back-pressure").
#[async_trait]
pub trait ClientSink: Send {
    async fn write(&mut self, chunk: Bytes) -> bool;
}

/// Final status of a streaming relay call, once the splice loop has ended.
#[derive(Debug, Clone, Copy)]
pub struct StreamOutcome {
    pub status: u16,
}

/// End-to-end relay core (C10).
pub struct RelayCore {
    config: RelayConfig,
    accounts: Arc<dyn AccountResolver>,
    usage_recorder: Arc<dyn UsageRecorder>,
    scheduler: Arc<dyn SchedulerHandle>,
    cost_calculator: Option<Arc<dyn CostCalculator>>,
    translation_service: Option<Arc<TranslationService>>,
    http: reqwest::Client,
}

impl RelayCore {
    pub fn new(
        config: RelayConfig,
        accounts: Arc<dyn AccountResolver>,
        usage_recorder: Arc<dyn UsageRecorder>,
        scheduler: Arc<dyn SchedulerHandle>,
        cost_calculator: Option<Arc<dyn CostCalculator>>,
        translation_service: Option<Arc<TranslationService>>,
    ) -> Self {
        Self {
            config,
            accounts,
            usage_recorder,
            scheduler,
            cost_calculator,
            translation_service,
            http: reqwest::Client::new(),
        }
    }

    /// Handles a non-streaming request end to end, returning the JSON body
    /// to write back to the client (§4.10).
    pub async fn handle_non_streaming(&self, req: IncomingRequest) -> JsonOutcome {
        let account = match self.accounts.get_account(&req.account_id).await {
            Ok(a) => a,
            Err(_) => {
                return JsonOutcome {
                    status: 404,
                    body: serde_json::json!({
                        "error": {"type": "account_not_found", "message": req.account_id}
                    }),
                };
            }
        };

        let session_hash = req.session_id().as_deref().map(session_hash);
        let requested_model = req.body.model.clone();

        let body = if account.translation_enabled() && self.config.translation.enabled {
            translate_request_with(req.body, Some(&account), self.translation_service.as_deref())
                .await
        } else {
            req.body
        };

        let client = match self.http_client_for(&account) {
            Ok(c) => c,
            Err(e) => {
                return JsonOutcome {
                    status: 500,
                    body: serde_json::json!({"error": {"type": "invalid_proxy_config", "message": e.to_string()}}),
                };
            }
        };

        let url = format!("{}{}", account.base_api.trim_end_matches('/'), req.path);
        let mut builder = client
            .post(&url)
            .bearer_auth(&account.api_key)
            .header("Content-Type", "application/json")
            .timeout(self.config.request_timeout);

        if let Some(ua) = &account.user_agent {
            builder = builder.header("User-Agent", ua);
        }
        for (name, value) in forwardable_headers(&req.headers) {
            builder = builder.header(name, value);
        }

        let response = match builder.json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                return JsonOutcome {
                    status: 502,
                    body: serde_json::json!({"error": {"type": "upstream_unreachable", "message": e.to_string()}}),
                };
            }
        };

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let parsed: Option<Value> = serde_json::from_str(&text).ok();

        match classify_status(status) {
            UpstreamClass::RateLimited => {
                let parsed = parsed.or_else(|| parse_sse_error_body(&text));
                let resets_in = parsed
                    .as_ref()
                    .and_then(extract_resets_in_seconds);
                notify_rate_limited(
                    self.scheduler.as_ref(),
                    &account.id,
                    &req.provider_tag,
                    session_hash.as_deref(),
                    resets_in,
                )
                .await;
                JsonOutcome {
                    status: 429,
                    body: parsed.unwrap_or_else(|| synthetic_rate_limit_body(resets_in)),
                }
            }
            UpstreamClass::Unauthorized => {
                let reason = extract_unauthorized_reason(&text, parsed.as_ref());
                notify_unauthorized(
                    self.scheduler.as_ref(),
                    &account.id,
                    &req.provider_tag,
                    session_hash.as_deref(),
                    &reason,
                )
                .await;
                JsonOutcome {
                    status: 401,
                    body: parsed.unwrap_or_else(|| synthetic_unauthorized_body(&reason)),
                }
            }
            UpstreamClass::OtherError => JsonOutcome {
                status,
                body: parsed.unwrap_or_else(|| serde_json::json!({"error": {"message": text}})),
            },
            UpstreamClass::Success => {
                let body_value = parsed.unwrap_or(Value::Null);
                if let Some(usage) = body_value.get("usage") {
                    let counts = extract_usage(usage);
                    let model = resolve_model(&body_value, &requested_model);
                    self.record_usage_and_quota(&account, &model, &counts).await;
                }
                self.touch_last_used(&account).await;
                JsonOutcome {
                    status,
                    body: body_value,
                }
            }
        }
    }

    /// Handles a streaming request, splicing the upstream SSE body to
    /// `sink` (raw, or translated through C7 when egress translation is
    /// enabled) and returning the final status once the stream ends (§4.10,
    /// §5 "Streaming splice").
    pub async fn handle_streaming(
        &self,
        req: IncomingRequest,
        sink: &mut dyn ClientSink,
    ) -> Result<StreamOutcome> {
        let account = self
            .accounts
            .get_account(&req.account_id)
            .await
            .map_err(|_| Error::invalid_input(format!("account not found: {}", req.account_id)))?;

        let session_hash = req.session_id().as_deref().map(session_hash);
        let requested_model = req.body.model.clone();

        let egress_translation = account.translation_enabled() && self.config.translation.enabled;

        let body = if egress_translation {
            translate_request_with(req.body, Some(&account), self.translation_service.as_deref())
                .await
        } else {
            req.body
        };

        let client = self.http_client_for(&account)?;

        let url = format!("{}{}", account.base_api.trim_end_matches('/'), req.path);
        let mut builder = client
            .post(&url)
            .bearer_auth(&account.api_key)
            .header("Content-Type", "application/json")
            .timeout(self.config.request_timeout);

        if let Some(ua) = &account.user_agent {
            builder = builder.header("User-Agent", ua);
        }
        for (name, value) in forwardable_headers(&req.headers) {
            builder = builder.header(name, value);
        }

        let response = builder.json(&body).send().await.map_err(Error::Http)?;
        let status = response.status().as_u16();

        match classify_status(status) {
            UpstreamClass::Success => {
                let service_ref = self.translation_service.as_deref();
                let mut response_translator = egress_translation
                    .then(|| ResponseTranslator::new(Some(&account), service_ref));

                let outcome = self
                    .splice_stream(response, sink, response_translator.as_mut())
                    .await?;

                if let Some(translator) = response_translator.as_mut() {
                    translator.finalize();
                }

                if let Some(usage) = outcome.usage {
                    let response_value = outcome
                        .model
                        .map(|m| serde_json::json!({"model": m}))
                        .unwrap_or(Value::Null);
                    let model = resolve_model(&response_value, &requested_model);
                    self.record_usage_and_quota(&account, &model, &usage).await;
                }
                if let Some(resets_in) = outcome.rate_limit_resets_in {
                    notify_rate_limited(
                        self.scheduler.as_ref(),
                        &account.id,
                        &req.provider_tag,
                        session_hash.as_deref(),
                        Some(resets_in),
                    )
                    .await;
                }
                self.touch_last_used(&account).await;

                Ok(StreamOutcome { status: 200 })
            }
            UpstreamClass::RateLimited => {
                let text = response.text().await.unwrap_or_default();
                let parsed: Option<Value> = serde_json::from_str(&text)
                    .ok()
                    .or_else(|| parse_sse_error_body(&text));
                let resets_in = parsed.as_ref().and_then(extract_resets_in_seconds);
                notify_rate_limited(
                    self.scheduler.as_ref(),
                    &account.id,
                    &req.provider_tag,
                    session_hash.as_deref(),
                    resets_in,
                )
                .await;
                let body = parsed.unwrap_or_else(|| synthetic_rate_limit_body(resets_in));
                sink.write(Bytes::from(serde_json::to_vec(&body).unwrap_or_default()))
                    .await;
                Ok(StreamOutcome { status: 429 })
            }
            UpstreamClass::Unauthorized => {
                let text = response.text().await.unwrap_or_default();
                let parsed: Option<Value> = serde_json::from_str(&text).ok();
                let reason = extract_unauthorized_reason(&text, parsed.as_ref());
                notify_unauthorized(
                    self.scheduler.as_ref(),
                    &account.id,
                    &req.provider_tag,
                    session_hash.as_deref(),
                    &reason,
                )
                .await;
                let body = parsed.unwrap_or_else(|| synthetic_unauthorized_body(&reason));
                sink.write(Bytes::from(serde_json::to_vec(&body).unwrap_or_default()))
                    .await;
                Ok(StreamOutcome { status: 401 })
            }
            UpstreamClass::OtherError => {
                let text = response.text().await.unwrap_or_default();
                sink.write(Bytes::from(text)).await;
                Ok(StreamOutcome { status })
            }
        }
    }

    /// Tees the upstream byte stream to the client while scanning decoded
    /// events for usage and rate-limit signals (§4.10). When a response
    /// translator is present, translated/passed-through events are written
    /// instead of raw bytes — the translator becomes the sole writer to the
    /// client stream (§5).
    async fn splice_stream(
        &self,
        response: reqwest::Response,
        sink: &mut dyn ClientSink,
        mut response_translator: Option<&mut ResponseTranslator<'_>>,
    ) -> Result<SpliceOutcome> {
        let mut byte_stream = response.bytes_stream();
        let mut framer = SseFramer::new();
        let mut stream_ended = false;

        let mut input_tokens = 0u64;
        let mut output_tokens = 0u64;
        let mut cached_read_tokens = 0u64;
        let mut cache_creation_tokens = 0u64;
        let mut usage_seen = false;
        let mut rate_limit_resets_in = None;
        let mut model = None;

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(_) => break,
            };

            if response_translator.is_none() && !stream_ended {
                stream_ended = !sink.write(chunk.clone()).await;
            }

            let text = String::from_utf8_lossy(&chunk).into_owned();
            for framed in framer.push(&text) {
                match framed {
                    FramedEvent::Done => {
                        // Raw pass-through already forwarded this sentinel as part of
                        // the byte-identical chunk above; only the translator path,
                        // which writes reconstructed events instead, needs it here.
                        if response_translator.is_some() && !stream_ended {
                            stream_ended =
                                !sink.write(Bytes::from_static(b"data: [DONE]\n\n")).await;
                        }
                    }
                    FramedEvent::Data(event) => {
                        scan_for_usage_and_rate_limit(
                            event.raw(),
                            &mut input_tokens,
                            &mut output_tokens,
                            &mut cached_read_tokens,
                            &mut cache_creation_tokens,
                            &mut usage_seen,
                            &mut rate_limit_resets_in,
                            &mut model,
                        );

                        if let Some(translator) = response_translator.as_deref_mut() {
                            if !stream_ended {
                                for out_event in translator.process_event(event).await {
                                    let wire = encode_event(out_event.raw());
                                    stream_ended = !sink.write(Bytes::from(wire)).await;
                                    if stream_ended {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
            }

            if stream_ended {
                break;
            }
        }

        // Always drain the remaining accumulator (§4.10).
        if let Some(FramedEvent::Data(event)) = framer.drain() {
            scan_for_usage_and_rate_limit(
                event.raw(),
                &mut input_tokens,
                &mut output_tokens,
                &mut cached_read_tokens,
                &mut cache_creation_tokens,
                &mut usage_seen,
                &mut rate_limit_resets_in,
                &mut model,
            );
        }

        let usage = usage_seen.then(|| {
            let total_tokens = input_tokens + output_tokens + cache_creation_tokens;
            UsageCounts {
                input_tokens,
                output_tokens,
                cached_read_tokens,
                cache_creation_tokens,
                total_tokens,
            }
        });

        Ok(SpliceOutcome {
            usage,
            rate_limit_resets_in,
            model,
        })
    }

    async fn record_usage_and_quota(&self, account: &crate::types::Account, model: &str, usage: &UsageCounts) {
        if let Err(e) = self.usage_recorder.record_usage(&account.id, model, usage).await {
            log::warn!("usage recording failed for account {}: {e}", account.id);
        }

        if account.daily_quota > 0.0 {
            if let Some(calculator) = &self.cost_calculator {
                let cost = calculator.cost_for(&account.id, model, usage);
                if let Err(e) = self.usage_recorder.update_usage_quota(&account.id, cost).await {
                    log::warn!("quota update failed for account {}: {e}", account.id);
                }
            }
        }
    }

    async fn touch_last_used(&self, account: &crate::types::Account) {
        if let Err(e) = self.usage_recorder.update_last_used(&account.id).await {
            log::warn!("last-used update failed for account {}: {e}", account.id);
        }
    }

    /// Builds the HTTP client for dispatching to `account`'s upstream. Accounts
    /// without a configured proxy reuse the shared client; a `proxy` URL gets a
    /// dedicated client routed through it (§6: "Optional HTTP/HTTPS proxy via
    /// per-account proxy URL").
    fn http_client_for(&self, account: &crate::types::Account) -> Result<reqwest::Client> {
        match &account.proxy {
            Some(proxy_url) => {
                let proxy = reqwest::Proxy::all(proxy_url)
                    .map_err(|e| Error::config(format!("invalid proxy url for account {}: {e}", account.id)))?;
                reqwest::Client::builder()
                    .proxy(proxy)
                    .build()
                    .map_err(Error::Http)
            }
            None => Ok(self.http.clone()),
        }
    }
}

struct SpliceOutcome {
    usage: Option<UsageCounts>,
    rate_limit_resets_in: Option<u64>,
    model: Option<String>,
}

#[allow(clippy::too_many_arguments)]
fn scan_for_usage_and_rate_limit(
    raw: &Value,
    input_tokens: &mut u64,
    output_tokens: &mut u64,
    cached_read_tokens: &mut u64,
    cache_creation_tokens: &mut u64,
    usage_seen: &mut bool,
    rate_limit_resets_in: &mut Option<u64>,
    model: &mut Option<String>,
) {
    // The provider's own model name rides on message_start (Anthropic-style
    // `message.model`) or is echoed top-level (OpenAI-style); either way it
    // only needs to be captured once (§4.9).
    if model.is_none() {
        let found = raw
            .get("model")
            .or_else(|| raw.get("message").and_then(|m| m.get("model")))
            .and_then(Value::as_str);
        if let Some(m) = found {
            *model = Some(m.to_string());
        }
    }

    // Usage can arrive split across message_start (input) and message_delta
    // (output), or all at once on a terminal event — merge whatever is present.
    let usage_obj = raw
        .get("usage")
        .or_else(|| raw.get("message").and_then(|m| m.get("usage")));
    if let Some(usage_obj) = usage_obj {
        let counts = extract_usage(usage_obj);
        if counts.input_tokens > 0 {
            *input_tokens = counts.input_tokens;
            *cached_read_tokens = counts.cached_read_tokens;
            *usage_seen = true;
        }
        if counts.output_tokens > 0 {
            *output_tokens = counts.output_tokens;
            *usage_seen = true;
        }
        if counts.cache_creation_tokens > 0 {
            *cache_creation_tokens = counts.cache_creation_tokens;
        }
    }

    let error_type = raw
        .get("error")
        .and_then(|e| e.get("type"))
        .and_then(Value::as_str);
    if let Some(t) = error_type {
        if RATE_LIMIT_ERROR_TYPES.contains(&t) {
            *rate_limit_resets_in = extract_resets_in_seconds(raw).or(*rate_limit_resets_in);
        }
    }
}

enum UpstreamClass {
    RateLimited,
    Unauthorized,
    OtherError,
    Success,
}

fn classify_status(status: u16) -> UpstreamClass {
    match status {
        429 => UpstreamClass::RateLimited,
        401 => UpstreamClass::Unauthorized,
        200..=299 => UpstreamClass::Success,
        _ => UpstreamClass::OtherError,
    }
}

fn extract_resets_in_seconds(body: &Value) -> Option<u64> {
    body.get("error")
        .and_then(|e| e.get("resets_in_seconds").or_else(|| e.get("resets_in")))
        .and_then(Value::as_u64)
        .or_else(|| {
            body.get("resets_in_seconds")
                .or_else(|| body.get("resets_in"))
                .and_then(Value::as_u64)
        })
}

fn extract_unauthorized_reason(raw_text: &str, parsed: Option<&Value>) -> String {
    if let Some(parsed) = parsed {
        if let Some(s) = parsed.as_str() {
            if !s.is_empty() {
                return s.to_string();
            }
        }
        if let Some(m) = parsed
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
        {
            if !m.is_empty() {
                return m.to_string();
            }
        }
        if let Some(m) = parsed.get("message").and_then(Value::as_str) {
            if !m.is_empty() {
                return m.to_string();
            }
        }
    }
    if raw_text.is_empty() {
        "unauthorized".to_string()
    } else {
        raw_text.to_string()
    }
}

/// Upstream error bodies are normally unframed JSON, but some providers wrap
/// even 4xx bodies as SSE `data:` frames. Used as a fallback once a bare JSON
/// parse of the body has already failed, so `resets_in_seconds` can still be
/// recovered from an SSE-framed 429 (§4.8).
fn parse_sse_error_body(text: &str) -> Option<Value> {
    let mut framer = SseFramer::new();
    let mut events = framer.push(text);
    if let Some(event) = framer.drain() {
        events.push(event);
    }
    events.into_iter().find_map(|event| match event {
        FramedEvent::Data(sse_event) => Some(sse_event.raw().clone()),
        FramedEvent::Done => None,
    })
}

fn synthetic_rate_limit_body(resets_in: Option<u64>) -> Value {
    serde_json::json!({
        "error": {"type": "rate_limit_error", "resets_in_seconds": resets_in}
    })
}

fn synthetic_unauthorized_body(message: &str) -> Value {
    serde_json::json!({
        "error": {"type": "unauthorized", "code": "unauthorized", "message": message}
    })
}

const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "content-length",
    "authorization",
    "content-type",
    // Set explicitly from `account.user_agent` above when present; forwarding
    // the incoming request's own User-Agent too would send it twice upstream.
    "user-agent",
];

fn forwardable_headers(headers: &HashMap<String, String>) -> Vec<(&str, &str)> {
    headers
        .iter()
        .filter(|(k, _)| !HOP_BY_HOP_HEADERS.contains(&k.to_lowercase().as_str()))
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}

/// SHA-256 hex digest of `session_id`, used as an opaque scheduler affinity
/// key (§4.10 step 2).
pub fn session_hash(session_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hex::encode(hasher.finalize())
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::StaticAccountResolver;
    use crate::types::{Account, Content, Message, MessageRole, TranslationFlag};
    use std::sync::Mutex as StdMutex;

    fn account() -> Account {
        Account {
            id: "acc-1".to_string(),
            base_api: "https://api.example.test".to_string(),
            api_key: "sk-1".to_string(),
            user_agent: None,
            proxy: None,
            daily_quota: 0.0,
            default_model: None,
            enable_translation: TranslationFlag::from(false),
            translation_source_lang: None,
            translation_target_lang: None,
        }
    }

    struct NullUsageRecorder;

    #[async_trait]
    impl UsageRecorder for NullUsageRecorder {
        async fn record_usage(&self, _account_id: &str, _model: &str, _usage: &UsageCounts) -> Result<()> {
            Ok(())
        }
        async fn update_usage_quota(&self, _account_id: &str, _cost: f64) -> Result<()> {
            Ok(())
        }
        async fn update_last_used(&self, _account_id: &str) -> Result<()> {
            Ok(())
        }
    }

    struct RecordingScheduler {
        rate_limited: StdMutex<Vec<(String, Option<u64>)>>,
        unauthorized: StdMutex<Vec<(String, String)>>,
    }

    impl RecordingScheduler {
        fn new() -> Self {
            Self {
                rate_limited: StdMutex::new(Vec::new()),
                unauthorized: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SchedulerHandle for RecordingScheduler {
        async fn mark_rate_limited(
            &self,
            account_id: &str,
            _provider_tag: &str,
            _session_hash: Option<&str>,
            resets_in_seconds: Option<u64>,
        ) -> Result<()> {
            self.rate_limited
                .lock()
                .unwrap()
                .push((account_id.to_string(), resets_in_seconds));
            Ok(())
        }

        async fn mark_unauthorized(
            &self,
            account_id: &str,
            _provider_tag: &str,
            _session_hash: Option<&str>,
            reason: &str,
        ) -> Result<()> {
            self.unauthorized
                .lock()
                .unwrap()
                .push((account_id.to_string(), reason.to_string()));
            Ok(())
        }
    }

    fn envelope() -> RequestEnvelope {
        RequestEnvelope {
            model: "claude-sonnet-4".to_string(),
            stream: false,
            messages: vec![Message {
                role: MessageRole::User,
                content: Content::Text("hello".to_string()),
            }],
            system: None,
            max_tokens: None,
            session_id: Some("sess-123".to_string()),
            extra: Default::default(),
        }
    }

    #[test]
    fn session_hash_is_deterministic_sha256_hex() {
        let h1 = session_hash("sess-123");
        let h2 = session_hash("sess-123");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn extract_resets_in_seconds_reads_nested_error_field() {
        let body = serde_json::json!({"error": {"resets_in_seconds": 120}});
        assert_eq!(extract_resets_in_seconds(&body), Some(120));
    }

    #[test]
    fn parse_sse_error_body_recovers_resets_in_from_framed_429() {
        let body = "data: {\"error\": {\"resets_in_seconds\": 45}}\n\n";
        let parsed = parse_sse_error_body(body).expect("should decode the framed event");
        assert_eq!(extract_resets_in_seconds(&parsed), Some(45));
    }

    #[test]
    fn parse_sse_error_body_returns_none_for_garbage() {
        assert!(parse_sse_error_body("not json, not sse").is_none());
    }

    #[test]
    fn hop_by_hop_and_auth_headers_are_filtered() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer leaked".to_string());
        headers.insert("X-Custom".to_string(), "keep-me".to_string());
        let forwarded = forwardable_headers(&headers);
        assert!(forwarded.iter().all(|(k, _)| *k != "Authorization"));
        assert!(forwarded.iter().any(|(k, _)| *k == "X-Custom"));
    }

    // The account's own User-Agent is set explicitly on the builder; the
    // incoming request's User-Agent must never also be forwarded, or upstream
    // sees the header twice.
    #[test]
    fn incoming_user_agent_is_filtered_to_avoid_duplication() {
        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), "client/1.0".to_string());
        headers.insert("X-Custom".to_string(), "keep-me".to_string());
        let forwarded = forwardable_headers(&headers);
        assert!(forwarded.iter().all(|(k, _)| !k.eq_ignore_ascii_case("user-agent")));
        assert!(forwarded.iter().any(|(k, _)| *k == "X-Custom"));
    }

    #[test]
    fn http_client_for_account_without_proxy_reuses_shared_client() {
        let relay = RelayCore::new(
            RelayConfig::default(),
            Arc::new(StaticAccountResolver::new(vec![])),
            Arc::new(NullUsageRecorder),
            Arc::new(RecordingScheduler::new()),
            None,
            None,
        );
        assert!(relay.http_client_for(&account()).is_ok());
    }

    #[test]
    fn http_client_for_account_with_proxy_builds_dedicated_client() {
        let relay = RelayCore::new(
            RelayConfig::default(),
            Arc::new(StaticAccountResolver::new(vec![])),
            Arc::new(NullUsageRecorder),
            Arc::new(RecordingScheduler::new()),
            None,
            None,
        );
        let mut proxied = account();
        proxied.proxy = Some("http://127.0.0.1:8080".to_string());
        assert!(relay.http_client_for(&proxied).is_ok());
    }

    #[test]
    fn http_client_for_account_with_malformed_proxy_errors() {
        let relay = RelayCore::new(
            RelayConfig::default(),
            Arc::new(StaticAccountResolver::new(vec![])),
            Arc::new(NullUsageRecorder),
            Arc::new(RecordingScheduler::new()),
            None,
            None,
        );
        let mut proxied = account();
        proxied.proxy = Some("not a url".to_string());
        assert!(relay.http_client_for(&proxied).is_err());
    }

    // S7: non-streaming 429 classification triggers exactly one scheduler call
    // carrying the parsed resets_in_seconds, and the client response echoes it.
    #[tokio::test]
    async fn s7_rate_limit_body_and_scheduler_call_shape() {
        let scheduler = Arc::new(RecordingScheduler::new());
        let resets_in = extract_resets_in_seconds(&serde_json::json!({"error": {"resets_in_seconds": 120}}));
        assert_eq!(resets_in, Some(120));

        notify_rate_limited(scheduler.as_ref(), "acc-1", "openai", Some("hash"), resets_in).await;
        let calls = scheduler.rate_limited.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("acc-1".to_string(), Some(120)));
    }

    #[tokio::test]
    async fn account_not_found_yields_404_json_outcome() {
        let relay = RelayCore::new(
            RelayConfig::default(),
            Arc::new(StaticAccountResolver::new(vec![])),
            Arc::new(NullUsageRecorder),
            Arc::new(RecordingScheduler::new()),
            None,
            None,
        );
        let req = IncomingRequest {
            account_id: "missing".to_string(),
            path: "/v1/messages".to_string(),
            headers: HashMap::new(),
            body: envelope(),
            provider_tag: "anthropic".to_string(),
        };
        let outcome = relay.handle_non_streaming(req).await;
        assert_eq!(outcome.status, 404);
    }

    // The streaming path's only source of the provider's own model name is
    // `message_start.message.model`; resolve_model must see it rather than
    // fall through to the requested model unconditionally.
    #[test]
    fn scan_for_usage_and_rate_limit_captures_model_from_message_start() {
        let mut input_tokens = 0u64;
        let mut output_tokens = 0u64;
        let mut cached_read_tokens = 0u64;
        let mut cache_creation_tokens = 0u64;
        let mut usage_seen = false;
        let mut rate_limit_resets_in = None;
        let mut model = None;

        let message_start = serde_json::json!({
            "type": "message_start",
            "message": {"model": "claude-sonnet-4-20250514", "usage": {"input_tokens": 10}},
        });
        scan_for_usage_and_rate_limit(
            &message_start,
            &mut input_tokens,
            &mut output_tokens,
            &mut cached_read_tokens,
            &mut cache_creation_tokens,
            &mut usage_seen,
            &mut rate_limit_resets_in,
            &mut model,
        );
        assert_eq!(model.as_deref(), Some("claude-sonnet-4-20250514"));

        let response_value = model.map(|m| serde_json::json!({"model": m})).unwrap_or(Value::Null);
        assert_eq!(resolve_model(&response_value, "requested-model"), "claude-sonnet-4-20250514");
    }

    #[test]
    fn scan_for_usage_and_rate_limit_leaves_model_none_when_absent() {
        let mut input_tokens = 0u64;
        let mut output_tokens = 0u64;
        let mut cached_read_tokens = 0u64;
        let mut cache_creation_tokens = 0u64;
        let mut usage_seen = false;
        let mut rate_limit_resets_in = None;
        let mut model = None;

        scan_for_usage_and_rate_limit(
            &serde_json::json!({"type": "ping"}),
            &mut input_tokens,
            &mut output_tokens,
            &mut cached_read_tokens,
            &mut cache_creation_tokens,
            &mut usage_seen,
            &mut rate_limit_resets_in,
            &mut model,
        );
        assert!(model.is_none());

        let response_value = model.map(|m| serde_json::json!({"model": m})).unwrap_or(Value::Null);
        assert_eq!(resolve_model(&response_value, "requested-model"), "requested-model");
    }

    #[test]
    fn unauthorized_reason_prefers_string_body_over_nested_message() {
        let parsed = serde_json::json!("plain string reason");
        let reason = extract_unauthorized_reason("plain string reason", Some(&parsed));
        assert_eq!(reason, "plain string reason");
    }

    #[test]
    fn unauthorized_reason_falls_back_to_nested_error_message() {
        let parsed = serde_json::json!({"error": {"message": "bad key"}});
        let reason = extract_unauthorized_reason("{}", Some(&parsed));
        assert_eq!(reason, "bad key");
    }
}
