//! Usage extractor (C9, §4.9).
//!
//! Providers disagree on field names for the same concept. This module reads
//! a `usage` JSON object (from a non-streaming body or a streaming terminal
//! event) and resolves the five numbers the usage recorder needs, trying
//! each provider's naming variant in a fixed preference order.

use serde_json::Value;

use crate::types::UsageCounts;

/// Extracts token counts from a provider `usage` object (§4.9). Any field
/// this function can't find is treated as `0`/absent — it never errors.
pub fn extract_usage(usage: &Value) -> UsageCounts {
    let input_tokens = first_u64(usage, &["input_tokens", "prompt_tokens"]).unwrap_or(0);
    let output_tokens = first_u64(usage, &["output_tokens", "completion_tokens"]).unwrap_or(0);

    let cached_read_tokens = usage
        .get("input_tokens_details")
        .and_then(|d| d.get("cached_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let cache_creation_tokens = first_finite_u64(
        usage,
        &[
            &["input_tokens_details", "cache_creation_input_tokens"],
            &["input_tokens_details", "cache_creation_tokens"],
            &["cache_creation_input_tokens"],
            &["cache_creation_tokens"],
        ],
    )
    .unwrap_or(0);

    let total_tokens = usage
        .get("total_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(input_tokens + output_tokens + cache_creation_tokens);

    UsageCounts {
        input_tokens,
        output_tokens,
        cached_read_tokens,
        cache_creation_tokens,
        total_tokens,
    }
}

/// Resolves the model name attributed to this usage record: the response's
/// own `model` field, falling back to the requested model, falling back to
/// `"gpt-4"` (§4.9).
pub fn resolve_model(response: &Value, requested_model: &str) -> String {
    response
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            if requested_model.is_empty() {
                "gpt-4".to_string()
            } else {
                requested_model.to_string()
            }
        })
}

fn first_u64(usage: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .find_map(|k| usage.get(*k).and_then(Value::as_u64))
}

/// Walks each candidate path in order, returning the first value that is
/// present, non-null, and a finite non-negative number (§4.9: "first defined,
/// non-empty, finite numeric value").
fn first_finite_u64(usage: &Value, paths: &[&[&str]]) -> Option<u64> {
    for path in paths {
        let mut cur = usage;
        let mut found = true;
        for segment in *path {
            match cur.get(segment) {
                Some(v) => cur = v,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found && !cur.is_null() {
            if let Some(n) = cur.as_f64() {
                if n.is_finite() && n >= 0.0 {
                    return Some(n as u64);
                }
            }
        }
    }
    None
}
