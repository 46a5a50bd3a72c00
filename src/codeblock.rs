//! Code-block protector (C1, §4.1).
//!
//! Substitutes fenced and inline code for stable placeholders before a string
//! goes to the translator, then restores the originals afterward. The
//! translator only ever sees prose plus opaque `__CODE_BLOCK_n__` /
//! `__INLINE_CODE_n__` tokens, so it can't mangle code while rewriting text
//! around it.

use crate::types::PlaceholderMap;

/// Extracts fenced (` ```...``` `) then inline (`` `...` ``) code, replacing
/// each with a placeholder. The counter is shared across both passes and
/// monotonically increasing, fenced blocks numbered first (§3).
pub fn extract(text: &str) -> (String, PlaceholderMap) {
    if text.is_empty() {
        return (String::new(), PlaceholderMap::new());
    }

    let mut placeholders = PlaceholderMap::new();
    let mut counter = 0usize;

    let after_fenced = replace_fenced(text, &mut counter, &mut placeholders);
    let after_inline = replace_inline(&after_fenced, &mut counter, &mut placeholders);

    (after_inline, placeholders)
}

/// Restores placeholders in `translated` using `placeholders`, in insertion
/// order. A naive split-and-join per key is the exact left-inverse of
/// `extract` and tolerates the translator echoing a placeholder more than
/// once (§4.1).
pub fn restore(translated: &str, placeholders: &PlaceholderMap) -> String {
    let mut result = translated.to_string();
    for (placeholder, original) in placeholders.iter() {
        result = result.split(placeholder.as_str()).collect::<Vec<_>>().join(original.as_str());
    }
    result
}

/// True iff, after stripping all placeholders from the extracted clean text,
/// only whitespace remains (§4.1).
pub fn is_code_only(text: &str) -> bool {
    let (clean, placeholders) = extract(text);
    let mut stripped = clean;
    for (placeholder, _) in placeholders.iter() {
        stripped = stripped.replace(placeholder.as_str(), "");
    }
    stripped.trim().is_empty()
}

/// Counts fenced and inline code spans. Fenced content is subtracted from the
/// text before counting inline spans, so back-ticks embedded in fenced code
/// are never double-counted (§4.1).
pub fn count_code_blocks(text: &str) -> (usize, usize) {
    let mut counter = 0usize;
    let mut fenced_map = PlaceholderMap::new();
    let without_fenced = replace_fenced(text, &mut counter, &mut fenced_map);
    let fenced_count = fenced_map.len();

    let mut inline_map = PlaceholderMap::new();
    let _ = replace_inline(&without_fenced, &mut counter, &mut inline_map);
    let inline_count = inline_map.len();

    (fenced_count, inline_count)
}

/// Non-greedy fence-to-fence match: ` ``` ` ... ` ``` `, including the
/// language tag and newlines, replaced as one unit.
fn replace_fenced(text: &str, counter: &mut usize, placeholders: &mut PlaceholderMap) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    loop {
        let Some(start) = rest.find("```") else {
            result.push_str(rest);
            break;
        };
        let after_open = start + 3;
        let Some(close_rel) = rest[after_open..].find("```") else {
            // Unterminated fence: leave the remainder untouched.
            result.push_str(rest);
            break;
        };
        let end = after_open + close_rel + 3;

        result.push_str(&rest[..start]);
        let placeholder = format!("__CODE_BLOCK_{}__", *counter);
        *counter += 1;
        placeholders.push(placeholder.clone(), rest[start..end].to_string());
        result.push_str(&placeholder);

        rest = &rest[end..];
    }

    result
}

/// Single back-tick spans with no back-tick inside, on the fenced-stripped text.
fn replace_inline(text: &str, counter: &mut usize, placeholders: &mut PlaceholderMap) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    loop {
        let Some(start) = rest.find('`') else {
            result.push_str(rest);
            break;
        };
        let Some(close_rel) = rest[start + 1..].find('`') else {
            result.push_str(rest);
            break;
        };
        let end = start + 1 + close_rel + 1;
        // Span body must not itself contain a back-tick (enforced by find above —
        // close_rel is the first back-tick after start, so the body is clean).

        result.push_str(&rest[..start]);
        let placeholder = format!("__INLINE_CODE_{}__", *counter);
        *counter += 1;
        placeholders.push(placeholder.clone(), rest[start..end].to_string());
        result.push_str(&placeholder);

        rest = &rest[end..];
    }

    result
}
