//! Pure helpers for digging a JSON object out of messy model output.
//!
//! Prompt content can contain stray braces inside quoted strings, so the
//! scanner tracks string/escape state instead of naively counting brackets.

use serde_json::Value;

/// All balanced `{...}` substrings of `input`, outermost first per start
/// position, skipping braces that occur inside JSON string literals.
pub fn extract_balanced_objects(input: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut result = Vec::new();

    let mut i = 0;
    while i < chars.len() {
        if chars[i].1 != '{' {
            i += 1;
            continue;
        }

        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut matched = false;

        for j in i..chars.len() {
            let ch = chars[j].1;

            if in_string {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    in_string = false;
                }
                continue;
            }

            match ch {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let start = chars[i].0;
                        let end = chars[j].0 + ch.len_utf8();
                        result.push(input[start..end].to_string());
                        i = j;
                        matched = true;
                        break;
                    }
                }
                _ => {}
            }
        }

        if !matched {
            // Unbalanced from this position; no later '{' can close either.
            break;
        }
        i += 1;
    }

    result
}

/// Recursively collect string values from a provider payload. Plain string
/// fields are only followed under the well-known content keys so request
/// echoes and ids don't pollute the candidate pool.
pub fn collect_strings(value: &Value, bucket: &mut Vec<String>) {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                bucket.push(trimmed.to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_strings(item, bucket);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                if key == "output_text" || key == "text" || key == "content" {
                    collect_strings(item, bucket);
                } else if item.is_object() || item.is_array() {
                    collect_strings(item, bucket);
                }
            }
        }
        _ => {}
    }
}
