// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt and response post-processing.
//!
//! Extracts the `use: <model>` directive from prompts, strips internal
//! markup from model output, and turns errors into text that is safe to show
//! a user.

use std::sync::LazyLock;

use parley_core::{AIModel, ParleyError};
use regex::Regex;

static RE_MODEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)use:\s*(\S+)").expect("valid regex"));
static RE_THINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("valid regex"));
static RE_INSTRUCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^_instruction:.*?$").expect("valid regex"));
static RE_SESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^_session:.*?$").expect("valid regex"));
static RE_DIVIDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*[-*_]{3,}\s*\n").expect("valid regex"));
static RE_MULTI_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Endpoint error codes whose message is meaningful to a user.
pub const ERROR_MARKERS: [&str; 3] = [
    "(content_filter)",
    "(RateLimitReached)",
    "(tokens_limit_reached)",
];

/// Shown when a turn produced nothing usable.
pub const NO_RESPONSE: &str = "Could not generate a response.";

/// Removes a `use: <model>` directive from `text` and resolves the model.
///
/// Without a directive the default model is returned.
pub fn parse_model_directive(text: &str, default: AIModel) -> (String, AIModel) {
    let model = RE_MODEL
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|name| AIModel::resolve(name.as_str(), default))
        .unwrap_or(default);
    let prompt = RE_MODEL.replace_all(text, "").trim().to_string();
    (prompt, model)
}

/// Swaps in `default` when an image is attached and `model` cannot see it.
pub fn select_model(model: AIModel, has_image: bool, default: AIModel) -> AIModel {
    if has_image && !model.supports_image() {
        default
    } else {
        model
    }
}

/// Strips reasoning blocks, prompt scaffolding, and dividers from output.
///
/// Fenced code blocks are kept verbatim.
pub fn clean_response(response: &str) -> String {
    let text = RE_THINK.replace_all(response, "");
    let text = RE_INSTRUCTION.replace_all(text.trim(), "");
    let text = RE_SESSION.replace_all(text.trim(), "");

    split_code_blocks(text.trim())
        .into_iter()
        .filter_map(|part| {
            if is_fence(part.trim()) {
                return Some(part);
            }
            let part = RE_DIVIDER.replace_all(&part, "\n\n");
            let part = RE_MULTI_NEWLINES.replace_all(&part, "\n\n");
            let part = part.replace('\r', "");
            let part = part.trim();
            (!part.is_empty()).then(|| part.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn is_fence(line: &str) -> bool {
    line.starts_with("```") || line.starts_with("~~~")
}

/// Splits text into alternating prose and fenced code segments.
///
/// A code block closes only on the fence style that opened it. An
/// unterminated block runs to the end of the text.
fn split_code_blocks(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut prose: Vec<&str> = Vec::new();
    let mut code: Vec<&str> = Vec::new();
    let mut fence: Option<&str> = None;

    for line in text.split('\n') {
        let stripped = line.trim();
        match fence {
            None if is_fence(stripped) => {
                if !prose.is_empty() {
                    parts.push(prose.join("\n"));
                    prose.clear();
                }
                code.push(line);
                fence = Some(&stripped[..3]);
            }
            None => prose.push(line),
            Some(open) => {
                code.push(line);
                if stripped.starts_with(open) {
                    parts.push(code.join("\n"));
                    code.clear();
                    fence = None;
                }
            }
        }
    }

    if !prose.is_empty() {
        parts.push(prose.join("\n"));
    }
    if !code.is_empty() {
        parts.push(code.join("\n"));
    }
    parts
}

/// First line of an endpoint error with its marker removed, if it has one.
pub fn clean_error(message: &str) -> Option<String> {
    let marker = ERROR_MARKERS.iter().find(|m| message.contains(*m))?;
    let first = message.split('\n').next().unwrap_or_default();
    Some(first.replace(marker, "").trim().to_string())
}

/// The text a user sees when a turn fails.
///
/// Endpoint errors carrying a known marker are shown in short form; every
/// other failure collapses to [`NO_RESPONSE`].
pub fn user_facing_error(error: &ParleyError) -> String {
    let raw = match error {
        ParleyError::RateLimited { message, .. } | ParleyError::Provider { message, .. } => message,
        _ => return NO_RESPONSE.to_string(),
    };
    clean_error(raw)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| NO_RESPONSE.to_string())
}

/// Prefixes a chat reply with the model that wrote it.
pub fn format_reply(model: &str, text: &str) -> String {
    format!("[✨ {model}] {text}")
}
