//! Response translator (C7, §4.7).
//!
//! A per-response state machine, generalized from the teacher's
//! `ToolCallAggregator` (`utils.rs`): that aggregator accumulates deltas
//! until a `finish_reason`; this one accumulates text deltas until a
//! sentence boundary, translates the sentence en→zh, and re-emits it as a
//! synthetic `content_block_delta`. Non-text events are never buffered —
//! they pass straight through, preserving source order (§5).

use crate::account::AccountResolver;
use crate::codeblock;
use crate::sentence::SentenceBuffer;
use crate::translation::TranslationService;
use crate::types::{Account, DeltaPayload, SseEvent};

/// Running counters scoped to one HTTP response (§3 `ResponseTranslatorState`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseTranslatorStats {
    pub total_events: u64,
    pub text_deltas: u64,
    pub sentences_translated: u64,
    pub translation_errors: u64,
    pub pass_throughs: u64,
}

/// Per-response SSE translation state machine (§4.7).
pub struct ResponseTranslator<'a> {
    account: Option<&'a Account>,
    service: Option<&'a TranslationService>,
    current_block_type: Option<String>,
    current_block_index: u64,
    sentence_buffer: SentenceBuffer,
    stats: ResponseTranslatorStats,
}

impl<'a> ResponseTranslator<'a> {
    pub fn new(account: Option<&'a Account>, service: Option<&'a TranslationService>) -> Self {
        Self {
            account,
            service,
            current_block_type: None,
            current_block_index: 0,
            sentence_buffer: SentenceBuffer::new(),
            stats: ResponseTranslatorStats::default(),
        }
    }

    pub fn stats(&self) -> ResponseTranslatorStats {
        self.stats
    }

    fn translation_enabled(&self) -> bool {
        self.account.is_some_and(Account::translation_enabled) && self.service.is_some()
    }

    /// Processes one decoded upstream SSE event, returning the events to
    /// write to the client in order (§4.7, §5: emitted in source order, no
    /// reordering across blocks).
    pub async fn process_event(&mut self, event: SseEvent) -> Vec<SseEvent> {
        self.stats.total_events += 1;

        if !self.translation_enabled() {
            self.stats.pass_throughs += 1;
            return vec![event];
        }

        match event {
            SseEvent::ContentBlockStart {
                index, block_type, ..
            } => {
                self.current_block_type = Some(block_type);
                self.current_block_index = index;
                self.sentence_buffer.reset();
                self.stats.pass_throughs += 1;
                vec![event]
            }
            event @ SseEvent::ContentBlockDelta { .. } => self.handle_delta(event).await,
            SseEvent::ContentBlockStop { index, raw } => {
                let mut out = Vec::new();
                if self.current_block_type.as_deref() == Some("text") {
                    let remainder = self.sentence_buffer.flush();
                    if !remainder.trim().is_empty() {
                        let translated = self.translate_sentence(&remainder).await;
                        out.push(SseEvent::text_delta(index, &translated));
                        self.stats.sentences_translated += 1;
                    }
                }
                self.current_block_type = None;
                self.stats.pass_throughs += 1;
                out.push(SseEvent::ContentBlockStop { index, raw });
                out
            }
            other => {
                self.stats.pass_throughs += 1;
                vec![other]
            }
        }
    }

    async fn handle_delta(&mut self, event: SseEvent) -> Vec<SseEvent> {
        let delta = match &event {
            SseEvent::ContentBlockDelta { delta, .. } => delta.clone(),
            _ => unreachable!("handle_delta is only called with ContentBlockDelta events"),
        };

        match (&self.current_block_type, delta) {
            (Some(block_type), DeltaPayload::Text(text)) if block_type == "text" => {
                self.stats.text_deltas += 1;
                let sentences = self.sentence_buffer.add(&text);
                let mut out = Vec::with_capacity(sentences.len());
                for sentence in sentences {
                    let translated = self.translate_sentence(&sentence).await;
                    out.push(SseEvent::text_delta(self.current_block_index, &translated));
                    self.stats.sentences_translated += 1;
                }
                out
            }
            // tool_use deltas (input_json_delta) and any other delta shape pass
            // through byte-identical — the original event is never reconstructed
            // from its parsed parts (§4.7).
            _ => {
                self.stats.pass_throughs += 1;
                vec![event]
            }
        }
    }

    /// Translates en→zh without the "contains Chinese" guard that gates the
    /// request path — irrelevant for egress text, which is always assumed to
    /// be in the source language (§4.7). Falls back to the original sentence
    /// on any failure.
    async fn translate_sentence(&mut self, sentence: &str) -> String {
        let (clean, placeholders) = codeblock::extract(sentence);
        if clean.trim().is_empty() {
            return sentence.to_string();
        }

        let Some(service) = self.service else {
            return sentence.to_string();
        };

        match service.translate(&clean, "en", "zh").await {
            Ok(translated) => codeblock::restore(&translated, &placeholders),
            Err(e) => {
                log::warn!("response translation failed, passing through original sentence: {e}");
                self.stats.translation_errors += 1;
                sentence.to_string()
            }
        }
    }

    /// Idempotent: if the sentence buffer still holds content when this is
    /// called, the upstream stream ended without a `content_block_stop` — log
    /// and discard rather than emit a dangling delta (§4.7).
    pub fn finalize(&mut self) {
        if !self.sentence_buffer.is_empty() {
            log::warn!(
                "response translator finalized with {} buffered bytes; \
                 upstream stream ended without content_block_stop, discarding",
                self.sentence_buffer.length()
            );
            self.sentence_buffer.reset();
        }
    }
}
