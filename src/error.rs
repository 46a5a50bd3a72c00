//! Error types for the relay core.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type shared by every component in this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport failure talking to an upstream provider.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration (missing/unparsable knob, malformed account record).
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Upstream responded but the body couldn't be attributed to a known shape.
    #[error("Upstream API error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// Upstream rejected the account's credentials (401/403).
    #[error("Unauthorized upstream account: {0}")]
    Unauthorized(String),

    /// Upstream rate-limited the account (429).
    #[error("Rate limited by upstream: {0}")]
    RateLimited(String),

    /// SSE framing/decoding error.
    #[error("SSE stream error: {0}")]
    Sse(String),

    /// Translation subsystem failure (upstream translator call, cache, detection).
    #[error("Translation error: {0}")]
    Translation(String),

    /// No translator account id configured (§4.5).
    #[error("translation account not configured")]
    AccountNotConfigured,

    /// The configured translator account id doesn't resolve (§4.5).
    #[error("translation account not found: {0}")]
    AccountNotFound(String),

    /// The translator account has no `api_key` set (§4.5).
    #[error("translation account missing api key")]
    AccountMissingKey,

    /// The translator account has no `base_api` set (§4.5).
    #[error("translation account missing base url")]
    AccountMissingBaseUrl,

    /// Usage extraction couldn't find any recognizable token-count fields.
    #[error("Usage extraction error: {0}")]
    Usage(String),

    /// Scheduler callback failed (logged by the caller, never fatal to the request).
    #[error("Scheduler callback error: {0}")]
    Scheduler(String),

    /// Invalid input supplied by the caller of this crate.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Request timed out.
    #[error("Request timeout")]
    Timeout,

    /// Catch-all for conditions that don't fit another variant.
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn upstream(status: u16, msg: impl Into<String>) -> Self {
        Error::Upstream {
            status,
            message: msg.into(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Error::Unauthorized(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Error::RateLimited(msg.into())
    }

    pub fn sse(msg: impl Into<String>) -> Self {
        Error::Sse(msg.into())
    }

    pub fn translation(msg: impl Into<String>) -> Self {
        Error::Translation(msg.into())
    }

    pub fn account_not_found(account_id: impl Into<String>) -> Self {
        Error::AccountNotFound(account_id.into())
    }

    pub fn account_not_configured() -> Self {
        Error::AccountNotConfigured
    }

    pub fn account_missing_key() -> Self {
        Error::AccountMissingKey
    }

    pub fn account_missing_base_url() -> Self {
        Error::AccountMissingBaseUrl
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }

    pub fn scheduler(msg: impl Into<String>) -> Self {
        Error::Scheduler(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    pub fn timeout() -> Self {
        Error::Timeout
    }

    /// True for failure classes the relay core should act on before writing a
    /// response: these mutate scheduler state (§7).
    pub fn is_scheduler_relevant(&self) -> bool {
        matches!(self, Error::Unauthorized(_) | Error::RateLimited(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_config() {
        let err = Error::config("missing base_api");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.to_string(), "Invalid configuration: missing base_api");
    }

    #[test]
    fn test_error_upstream() {
        let err = Error::upstream(500, "internal error");
        assert_eq!(
            err.to_string(),
            "Upstream API error (500): internal error"
        );
    }

    #[test]
    fn test_error_rate_limited_is_scheduler_relevant() {
        let err = Error::rate_limited("too many requests");
        assert!(err.is_scheduler_relevant());
    }

    #[test]
    fn test_error_unauthorized_is_scheduler_relevant() {
        let err = Error::unauthorized("bad api key");
        assert!(err.is_scheduler_relevant());
    }

    #[test]
    fn test_error_other_is_not_scheduler_relevant() {
        let err = Error::other("whatever");
        assert!(!err.is_scheduler_relevant());
    }

    #[test]
    fn test_error_timeout() {
        let err = Error::timeout();
        assert!(matches!(err, Error::Timeout));
        assert_eq!(err.to_string(), "Request timeout");
    }

    #[test]
    fn test_error_from_reqwest_compiles() {
        fn _convert(e: reqwest::Error) -> Error {
            Error::Http(e)
        }
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_translation_account_errors_are_distinct_variants() {
        assert!(matches!(
            Error::account_not_configured(),
            Error::AccountNotConfigured
        ));
        assert!(matches!(
            Error::account_not_found("translator"),
            Error::AccountNotFound(id) if id == "translator"
        ));
        assert!(matches!(
            Error::account_missing_key(),
            Error::AccountMissingKey
        ));
        assert!(matches!(
            Error::account_missing_base_url(),
            Error::AccountMissingBaseUrl
        ));
    }
}
