//! # Relay Proxy Core
//!
//! A streaming-first relay core for OpenAI/Anthropic-compatible chat-completion
//! APIs, pooling multiple upstream accounts behind a single entry point with an
//! optional bidirectional zh↔en translation pipeline.
//!
//! ## Scope
//!
//! This crate is a library, not a server: the HTTP framework, account CRUD
//! service, credential storage, and header-filter allowlist are external
//! collaborators a host wires in (see [`account`] and [`scheduler`] for the
//! narrow traits the relay calls through).
//!
//! ## Architecture
//!
//! - **relay**: end-to-end request lifecycle — account lookup, optional request
//!   translation, upstream dispatch, status classification, streaming splice,
//!   usage extraction, and scheduler callbacks.
//! - **request_translator** / **response_translator**: zh→en on the way in,
//!   en→zh sentence-by-sentence on the way out.
//! - **translation**: the single-string translation call itself, cached.
//! - **codeblock**: protects fenced and inline code from translation.
//! - **language**: heuristic zh/en detection used to skip no-op translations.
//! - **sentence**: buffers streamed text up to a sentence boundary.
//! - **cache**: bounded LRU+TTL cache backing the translation service.
//! - **sse**: SSE event framing/parsing shared by the relay and the
//!   connection-test harness.
//! - **usage**: provider-agnostic token usage extraction.
//! - **scheduler**: the fire-and-forget rate-limit/auth callback interface.
//! - **account**: external-collaborator traits (`AccountResolver`,
//!   `UsageRecorder`, `CostCalculator`).
//! - **connection_test**: a single-shot upstream connectivity probe.
//! - **config** / **error**: ambient configuration and error types.

mod account;
mod cache;
mod codeblock;
mod config;
mod connection_test;
mod error;
mod language;
mod relay;
mod request_translator;
mod response_translator;
mod scheduler;
mod sentence;
mod sse;
mod translation;
mod types;
mod usage;

// --- Error handling ---

pub use error::{Error, Result};

// --- Configuration ---

pub use config::{RelayConfig, TranslationConfig};

// --- Account / scheduler collaborator traits ---

pub use account::{AccountResolver, CostCalculator, StaticAccountResolver, UsageRecorder};
pub use scheduler::SchedulerHandle;

// --- Core data model ---

pub use types::{
    Account, Content, ContentBlock, DeltaPayload, ImageBlock, Message, MessageRole,
    PlaceholderMap, RequestEnvelope, SseEvent, TextBlock, ToolResultBlock, ToolUseBlock,
    TranslationFlag, UsageCounts,
};

// --- Translation subsystem ---

pub use codeblock::{extract as extract_code_blocks, restore as restore_code_blocks};
pub use language::{Language, LanguageStats, detect_primary_language};
pub use sentence::SentenceBuffer;
pub use cache::{CacheStats, LruTtlCache};
pub use translation::{ChatCompletionClient, HttpChatCompletionClient, TranslationService};
pub use request_translator::translate_request;
pub use response_translator::{ResponseTranslator, ResponseTranslatorStats};

// --- SSE framing ---

pub use sse::{FramedEvent, SseFramer, encode_done, encode_event};

// --- Usage extraction ---

pub use usage::{extract_usage, resolve_model};

// --- Relay core ---

pub use relay::{ClientSink, IncomingRequest, JsonOutcome, RelayCore, StreamOutcome, session_hash};

// --- Connection test harness ---

pub use connection_test::{TestEvent, run_connection_test};

/// Convenience module with the pieces most hosts need to wire in a relay.
///
/// ```rust,no_run
/// use relay_proxy_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Account, AccountResolver, ClientSink, Error, IncomingRequest, RelayConfig, RelayCore,
        Result, SchedulerHandle, UsageRecorder,
    };
}
