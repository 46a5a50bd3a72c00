//! Request translator (C6, §4.6).
//!
//! Walks a request envelope and translates only the text of user-role
//! messages, zh→en. Everything else — assistant/system messages, non-text
//! blocks, unknown fields — passes through byte-identical. Any failure at any
//! step degrades gracefully: the original text is returned and the request
//! always proceeds (§4.6, §7f).

use crate::account::AccountResolver;
use crate::codeblock;
use crate::language;
use crate::translation::TranslationService;
use crate::types::{Account, Content, ContentBlock, Message, RequestEnvelope};

/// Translates the user-authored text in `body`, returning a new envelope.
///
/// If `account` is absent or its translation flag is disabled, `body` is
/// returned unchanged — by identity, not by a wasted clone (§4.6).
pub async fn translate_request(
    body: RequestEnvelope,
    account: Option<&Account>,
) -> RequestEnvelope {
    translate_request_with(body, account, None).await
}

/// Same as [`translate_request`] but threads through the translation service
/// actually used to perform the zh→en call (absent when no translation
/// service is configured, in which case text is passed through unchanged —
/// mirroring the "graceful degradation" of §4.6).
pub async fn translate_request_with(
    body: RequestEnvelope,
    account: Option<&Account>,
    service: Option<&TranslationService>,
) -> RequestEnvelope {
    let Some(account) = account else {
        return body;
    };
    if !account.translation_enabled() {
        return body;
    }

    let mut translated = body.clone();
    for message in translated.messages.iter_mut() {
        if !message.is_user() {
            continue;
        }
        message.content = translate_content(&message.content, service).await;
    }
    translated
}

async fn translate_content(content: &Content, service: Option<&TranslationService>) -> Content {
    match content {
        Content::Text(text) => Content::Text(translate_text(text, service).await),
        Content::Blocks(blocks) => {
            let mut out = Vec::with_capacity(blocks.len());
            for block in blocks {
                match block {
                    ContentBlock::Text(t) => {
                        out.push(ContentBlock::text(translate_text(&t.text, service).await));
                    }
                    // image / tool_use / tool_result are never translated (§4.6).
                    other => out.push(other.clone()),
                }
            }
            Content::Blocks(out)
        }
    }
}

/// Translates one string zh→en, protecting code along the way (§4.6).
///
/// Cheap paths first: empty input or input with no Chinese character is
/// returned untouched without ever calling the translator.
async fn translate_text(text: &str, service: Option<&TranslationService>) -> String {
    if text.is_empty() || !contains_chinese_char(text) {
        return text.to_string();
    }

    let (clean, placeholders) = codeblock::extract(text);
    if clean.trim().is_empty() {
        return text.to_string();
    }

    let Some(service) = service else {
        return text.to_string();
    };

    match service.translate(&clean, "zh", "en").await {
        Ok(translated) => codeblock::restore(&translated, &placeholders),
        Err(e) => {
            log::warn!("request translation failed, passing through original text: {e}");
            text.to_string()
        }
    }
}

fn contains_chinese_char(text: &str) -> bool {
    text.chars().any(|c| ('\u{4E00}'..='\u{9FA5}').contains(&c))
}
