//! Translation service (C5, §4.5).
//!
//! Single-string zh↔en translation via an upstream OpenAI-compatible chat
//! endpoint, deduplicated through the LRU+TTL cache (C4). The HTTP call
//! itself is hidden behind [`ChatCompletionClient`] — constructor-injected,
//! per §9's resolution of the "lazy inter-module dependency" design note —
//! so tests exercise cache/error-taxonomy behavior without a live network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::account::AccountResolver;
use crate::cache::LruTtlCache;
use crate::config::TranslationConfig;
use crate::{Error, Result};

const SYSTEM_PROMPT: &str = "You are a professional translator. Return only the translation \
with no additional commentary. Preserve all whitespace exactly. Preserve any \
__CODE_BLOCK_*__ or __INLINE_CODE_*__ placeholders verbatim, unmodified. Maintain the \
original tone.";

/// Abstracts the single upstream chat-completion call C5 makes, so the
/// translation service can be constructed with a test double.
#[async_trait]
pub trait ChatCompletionClient: Send + Sync {
    /// Returns the assistant's raw text reply, or an `Err` carrying the
    /// failure taxonomy of §4.5.
    async fn complete(
        &self,
        base_api: &str,
        api_key: &str,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
        disable_thinking: bool,
    ) -> Result<String>;
}

/// Default client: a single `POST {base_api}/chat/completions` with bearer
/// auth and a 60s timeout (§4.5, §6 "Translator upstream").
pub struct HttpChatCompletionClient {
    http: reqwest::Client,
}

impl HttpChatCompletionClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpChatCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatCompletionClient for HttpChatCompletionClient {
    async fn complete(
        &self,
        base_api: &str,
        api_key: &str,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
        disable_thinking: bool,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", base_api.trim_end_matches('/'));

        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        });

        // Qwen3 models run chain-of-thought by default; disable it for these
        // synchronous, non-streaming translation calls (§4.5).
        if disable_thinking {
            body["enable_thinking"] = serde_json::Value::Bool(false);
        }

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout()
                } else {
                    Error::Http(e)
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(Error::Http)?;

        if !status.is_success() {
            let message = extract_error_message(&text).unwrap_or_else(|| text.clone());
            return Err(Error::translation(format!(
                "upstream translator returned {}: {}",
                status.as_u16(),
                message
            )));
        }

        let parsed: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| Error::translation(format!("malformed translator response: {e}")))?;

        parsed
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::translation("translator response missing message content"))
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            value
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
}

/// Single-string translation service (§4.5).
pub struct TranslationService {
    config: TranslationConfig,
    cache: Arc<LruTtlCache>,
    accounts: Arc<dyn AccountResolver>,
    client: Arc<dyn ChatCompletionClient>,
}

impl TranslationService {
    pub fn new(
        config: TranslationConfig,
        cache: Arc<LruTtlCache>,
        accounts: Arc<dyn AccountResolver>,
        client: Arc<dyn ChatCompletionClient>,
    ) -> Self {
        Self {
            config,
            cache,
            accounts,
            client,
        }
    }

    /// Translates `text` from `source_lang` to `target_lang` (§4.5).
    pub async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }
        if source_lang == target_lang {
            return Ok(text.to_string());
        }
        if !is_supported_pair(source_lang, target_lang) {
            return Err(Error::translation(format!(
                "unsupported language pair: {source_lang} -> {target_lang}"
            )));
        }

        let key = cache_key(source_lang, target_lang, text);
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let account_id = self
            .config
            .account_id
            .as_ref()
            .ok_or_else(Error::account_not_configured)?;

        let account = self
            .accounts
            .get_account(account_id)
            .await
            .map_err(|_| Error::account_not_found(account_id.clone()))?;

        if account.api_key.is_empty() {
            return Err(Error::account_missing_key());
        }
        if account.base_api.is_empty() {
            return Err(Error::account_missing_base_url());
        }

        let user_prompt = format!("Translate the following from {source_lang} to {target_lang}:\n\n{text}");
        let disable_thinking = self.config.model.starts_with("qwen3");

        let translated = self
            .client
            .complete(
                &account.base_api,
                &account.api_key,
                &self.config.model,
                SYSTEM_PROMPT,
                &user_prompt,
                self.config.max_tokens,
                disable_thinking,
            )
            .await?;

        let translated = translated.trim().to_string();
        self.cache
            .set(key, translated.clone(), self.config.cache_ttl())
            .await;

        Ok(translated)
    }
}

fn is_supported_pair(source_lang: &str, target_lang: &str) -> bool {
    matches!(
        (source_lang, target_lang),
        ("zh", "en") | ("en", "zh")
    )
}

fn cache_key(source_lang: &str, target_lang: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{source_lang}:{target_lang}:{text}").as_bytes());
    let digest = hasher.finalize();
    format!("trans:{}", hex_prefix(&digest, 8))
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes.iter().take(n).map(|b| format!("{b:02x}")).collect()
}
