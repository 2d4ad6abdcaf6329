// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token estimation backed by tiktoken BPE encodings.
//!
//! Encodings are loaded lazily per model family and cached for the life of the
//! estimator. Models the tokenizer library does not know fall back to
//! `cl100k_base`; if even that cannot be loaded, counts degrade to a
//! characters-per-token heuristic. Estimation never fails.

use std::sync::Arc;

use dashmap::DashMap;
use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

use crate::models::AIModel;
use crate::types::Message;

/// Rough characters-per-token ratio used when no encoding is available.
const CHARS_PER_TOKEN: usize = 4;

/// Thread-safe, shareable token estimator.
#[derive(Default)]
pub struct TokenEstimator {
    encodings: DashMap<String, Option<Arc<CoreBPE>>>,
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("cached", &self.encodings.len())
            .finish()
    }
}

impl TokenEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tokens `text` encodes to under `model`'s tokenizer.
    pub fn encode_length(&self, text: &str, model: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match self.encoding(model) {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.chars().count().div_ceil(CHARS_PER_TOKEN),
        }
    }

    /// Prefix of `text` holding at most `max_tokens` tokens.
    ///
    /// Returns the input unchanged when it already fits. No continuation
    /// marker is appended; callers that care add their own.
    pub fn truncate_to(&self, text: &str, model: &str, max_tokens: usize) -> String {
        if max_tokens == 0 {
            return String::new();
        }
        let Some(bpe) = self.encoding(model) else {
            return text.chars().take(max_tokens * CHARS_PER_TOKEN).collect();
        };

        let tokens = bpe.encode_with_special_tokens(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }

        // A cut can land inside a multi-byte character; back off until the
        // prefix decodes.
        let mut end = max_tokens;
        while end > 0 {
            if let Ok(prefix) = bpe.decode(tokens[..end].to_vec()) {
                return prefix;
            }
            end -= 1;
        }
        String::new()
    }

    /// Tokens carried by one message's text content.
    ///
    /// Image items are not counted.
    pub fn message_tokens(&self, message: &Message, model: &str) -> usize {
        self.encode_length(&message.text(), model)
    }

    /// Sum of [`message_tokens`](Self::message_tokens) over a slice.
    pub fn messages_tokens(&self, messages: &[Message], model: &str) -> usize {
        messages
            .iter()
            .map(|m| self.message_tokens(m, model))
            .sum()
    }

    fn encoding(&self, model: &str) -> Option<Arc<CoreBPE>> {
        let key = AIModel::from_identifier(model)
            .map(AIModel::tokenizer_model)
            .unwrap_or(model)
            .to_string();

        if let Some(cached) = self.encodings.get(&key) {
            return cached.clone();
        }

        let loaded = match tiktoken_rs::get_bpe_from_model(&key) {
            Ok(bpe) => Some(Arc::new(bpe)),
            Err(_) => {
                debug!(model = %key, "no tokenizer for model, using cl100k_base");
                match tiktoken_rs::cl100k_base() {
                    Ok(bpe) => Some(Arc::new(bpe)),
                    Err(e) => {
                        warn!(error = %e, "failed to load cl100k_base, estimating by length");
                        None
                    }
                }
            }
        };

        self.encodings.insert(key, loaded.clone());
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_tokens() {
        let estimator = TokenEstimator::new();
        assert_eq!(estimator.encode_length("", "gpt-4.1"), 0);
    }

    #[test]
    fn counts_are_positive_and_grow_with_text() {
        let estimator = TokenEstimator::new();
        let short = estimator.encode_length("hello", "gpt-4.1");
        let long = estimator.encode_length(&"hello world ".repeat(50), "gpt-4.1");
        assert!(short > 0);
        assert!(long > short);
    }

    #[test]
    fn unknown_model_falls_back() {
        let estimator = TokenEstimator::new();
        let n = estimator.encode_length("some text to count", "definitely-not-a-model");
        assert!(n > 0);
    }

    #[test]
    fn truncate_keeps_short_text() {
        let estimator = TokenEstimator::new();
        assert_eq!(estimator.truncate_to("short", "gpt-4.1", 100), "short");
    }

    #[test]
    fn truncate_limits_token_count() {
        let estimator = TokenEstimator::new();
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let truncated = estimator.truncate_to(&text, "gpt-4.1", 10);
        assert!(text.starts_with(&truncated));
        assert!(estimator.encode_length(&truncated, "gpt-4.1") <= 10);
        assert!(truncated.len() < text.len());
    }

    #[test]
    fn truncate_to_zero_is_empty() {
        let estimator = TokenEstimator::new();
        assert_eq!(estimator.truncate_to("anything", "gpt-4.1", 0), "");
    }

    #[test]
    fn truncate_handles_multibyte_text() {
        let estimator = TokenEstimator::new();
        let text = "日本語のテキストと絵文字 🦀🦀🦀 ".repeat(20);
        let truncated = estimator.truncate_to(&text, "gpt-4.1", 7);
        assert!(text.starts_with(&truncated));
    }

    #[test]
    fn encodings_are_cached_per_family() {
        let estimator = TokenEstimator::new();
        estimator.encode_length("a", "gpt-4.1");
        estimator.encode_length("b", "gpt-4.1-mini");
        assert_eq!(estimator.encodings.len(), 1);
    }
}
