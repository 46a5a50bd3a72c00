//! # Relay Configuration
//!
//! Recognized configuration keys (§6) and their defaults. Resolution follows the
//! teacher's priority convention: an explicit value wins, then an environment
//! variable override, then the documented default.
//!
//! ## Environment Variables
//!
//! - `RELAY_REQUEST_TIMEOUT_MS`: overrides `request_timeout_ms`.
//! - `RELAY_TRANSLATION_ENABLED`: overrides `translation.enabled` (`"true"`/`"false"`).
//! - `RELAY_TRANSLATION_ACCOUNT_ID`: overrides `translation.account_id`.
//! - `RELAY_TRANSLATION_MODEL`: overrides `translation.model`.

use std::env;
use std::time::Duration;

/// Default upstream relay request timeout: 600 seconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 600_000;

/// Default translation-call timeout: 60 seconds.
pub const DEFAULT_TRANSLATION_TIMEOUT_MS: u64 = 60_000;

/// Default translation model.
pub const DEFAULT_TRANSLATION_MODEL: &str = "qwen3-8b";

/// Default LRU cache capacity.
pub const DEFAULT_CACHE_SIZE: usize = 1000;

/// Default cache entry TTL, in hours.
pub const DEFAULT_CACHE_TTL_HOURS: u64 = 24;

/// Default `max_tokens` for translation calls.
pub const DEFAULT_TRANSLATION_MAX_TOKENS: u32 = 4096;

/// Translation-subsystem configuration (§6 `translation.*` keys).
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    /// Global feature flag, in addition to each account's own `enable_translation`.
    pub enabled: bool,
    /// Id of the account used for outbound translation calls. Required when `enabled`.
    pub account_id: Option<String>,
    pub model: String,
    pub cache_size: usize,
    pub cache_ttl_hours: u64,
    pub max_tokens: u32,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            account_id: None,
            model: DEFAULT_TRANSLATION_MODEL.to_string(),
            cache_size: DEFAULT_CACHE_SIZE,
            cache_ttl_hours: DEFAULT_CACHE_TTL_HOURS,
            max_tokens: DEFAULT_TRANSLATION_MAX_TOKENS,
        }
    }
}

impl TranslationConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours * 3600)
    }
}

/// Top-level relay configuration (§6).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub request_timeout: Duration,
    pub translation: TranslationConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            translation: TranslationConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Build a config from defaults, applying any recognized environment overrides.
    ///
    /// Environment variables are opt-in overrides on top of `RelayConfig::default()`;
    /// they never take precedence over a value set explicitly on the struct after
    /// construction.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(ms) = env::var("RELAY_REQUEST_TIMEOUT_MS") {
            if let Ok(parsed) = ms.parse::<u64>() {
                cfg.request_timeout = Duration::from_millis(parsed);
            }
        }

        if let Ok(flag) = env::var("RELAY_TRANSLATION_ENABLED") {
            cfg.translation.enabled = flag == "true";
        }

        if let Ok(id) = env::var("RELAY_TRANSLATION_ACCOUNT_ID") {
            cfg.translation.account_id = Some(id);
        }

        if let Ok(model) = env::var("RELAY_TRANSLATION_MODEL") {
            cfg.translation.model = model;
        }

        cfg
    }
}
