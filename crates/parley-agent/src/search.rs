// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `/search`: answer a query from web results only.
//!
//! Runs the web search, packs the top results into a prompt, and asks the
//! default model (or the fallback while the default is rate limited) to
//! answer from them. Sources are listed under the answer.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parley_config::model::{ProviderConfig, SearchConfig};
use parley_context::{SessionUser, SystemPrompt};
use parley_core::{ChatRequest, Message, ParleyError, ProviderAdapter};
use parley_skill::{SearchHit, WebSearchTool};
use tracing::{error, info, warn};

use crate::processor::clean_response;
use crate::tracker::RateLimitTracker;

pub const SEARCH_USAGE: &str = "Send a search query. Example: /search latest AI developments";
pub const NO_RESULTS: &str = "No results found for your query.";
pub const NO_ANSWER: &str = "Could not generate a response. Please try again later.";

const SEARCH_NOTE: &str = "\n\n# Search\n\nYou will respond based only on the web search results provided. Do not use your training data.";

/// What to send back for one `/search`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchReply {
    pub text: String,
    /// Cleaned answer to record in history; `None` when the search failed.
    pub answer: Option<String>,
}

impl SearchReply {
    fn failed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            answer: None,
        }
    }
}

/// Joins result texts, stopping once `max_chars` would be exceeded.
///
/// A result that does not fit is skipped; later, shorter ones may still be
/// taken until the budget is used up.
pub fn extract_context(results: &[SearchHit], max_results: usize, max_chars: usize) -> String {
    let mut parts = Vec::new();
    let mut total = 0;
    for hit in results.iter().take(max_results) {
        let text = hit.snippet.trim();
        let len = text.chars().count();
        if !text.is_empty() && total + len <= max_chars {
            parts.push(text);
            total += len;
        } else if total >= max_chars {
            break;
        }
    }
    parts.join("\n\n")
}

pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "Web search for: \"{query}\".\nRelevant results (summarize concisely):\n{context}\n\n\
         Answer the query using only these results. Be concise and clear. \
         Do not include a sources section."
    )
}

/// Numbered source links, one per distinct URL.
pub fn format_sources(results: &[SearchHit], max_results: usize) -> String {
    if results.is_empty() {
        return "No sources found.".to_string();
    }
    let mut seen = HashSet::new();
    let lines: Vec<String> = results
        .iter()
        .take(max_results)
        .filter_map(|hit| {
            let url = if hit.url.is_empty() { "#" } else { hit.url.as_str() };
            seen.insert(url).then_some((hit, url))
        })
        .enumerate()
        .map(|(idx, (hit, url))| {
            let title = if hit.title.is_empty() {
                "Untitled"
            } else {
                hit.title.as_str()
            };
            format!("{}. [{title}]({url})", idx + 1)
        })
        .collect();
    format!("\n\n*Sources:*\n{}", lines.join("\n"))
}

/// Web-grounded answers with model fallback.
pub struct SearchService {
    provider: Arc<dyn ProviderAdapter>,
    tracker: Arc<RateLimitTracker>,
    search: Option<WebSearchTool>,
    prompt: SystemPrompt,
    config: SearchConfig,
    default_model: String,
    fallback_model: String,
}

impl SearchService {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        tracker: Arc<RateLimitTracker>,
        search: Option<WebSearchTool>,
        prompt: SystemPrompt,
        config: SearchConfig,
        provider_config: &ProviderConfig,
    ) -> Self {
        Self {
            provider,
            tracker,
            search,
            prompt,
            config,
            default_model: provider_config.default_model.clone(),
            fallback_model: provider_config.fallback_model.clone(),
        }
    }

    fn system_message(&self, user: Option<&SessionUser>) -> Message {
        match user.filter(|u| !u.full_name.trim().is_empty()) {
            Some(user) => SystemPrompt::new(format!("{}{SEARCH_NOTE}", self.prompt.base()))
                .render(Some(user), Utc::now()),
            None => Message::system(self.prompt.base()),
        }
    }

    /// Runs one `/search` for `query`.
    pub async fn answer(&self, query: &str, user: Option<&SessionUser>) -> SearchReply {
        let query = query.trim();
        if query.is_empty() {
            return SearchReply::failed(SEARCH_USAGE);
        }
        let Some(search) = &self.search else {
            return SearchReply::failed("Search error: web search is not configured");
        };

        info!(query, "executing search");
        let results = match search.search(query, None).await {
            Ok(results) => results,
            Err(e) => {
                error!(query, error = %e, "search failed");
                return SearchReply::failed(format!("Search error: {e}"));
            }
        };
        if results.is_empty() {
            return SearchReply::failed(NO_RESULTS);
        }

        let context = extract_context(&results, self.config.max_results, self.config.max_context_chars);
        let messages = vec![self.system_message(user), Message::user(build_prompt(query, &context))];

        let Some((text, model)) = self.generate_with_fallback(messages).await else {
            return SearchReply::failed(NO_ANSWER);
        };

        let clean = clean_response(&text);
        if clean.is_empty() {
            warn!(model = %model, "search answer was empty after cleanup");
            return SearchReply::failed(NO_ANSWER);
        }
        let sources = format_sources(&results, self.config.max_results);
        SearchReply {
            text: format!("[🔍 {model}] {clean}\n\n{sources}"),
            answer: Some(clean),
        }
    }

    async fn generate_with_fallback(&self, messages: Vec<Message>) -> Option<(String, String)> {
        let model = if self.tracker.is_limited(&self.default_model) {
            self.fallback_model.clone()
        } else {
            self.default_model.clone()
        };

        match self.generate(messages.clone(), &model).await {
            Ok(text) => text.map(|t| (t, model)),
            Err(e) if model != self.fallback_model => {
                info!(model, error = %e, "search answer failed, falling back");
                let fallback = self.fallback_model.clone();
                match self.generate(messages, &fallback).await {
                    Ok(text) => text.map(|t| (t, fallback)),
                    Err(e) => {
                        error!(model = fallback, error = %e, "fallback also failed");
                        None
                    }
                }
            }
            Err(e) => {
                error!(model, error = %e, "search answer failed");
                None
            }
        }
    }

    /// One completion without tools. Endpoint errors are returned so the
    /// caller can fall back; anything else yields `Ok(None)`.
    async fn generate(
        &self,
        messages: Vec<Message>,
        model: &str,
    ) -> Result<Option<String>, ParleyError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages,
            tools: Vec::new(),
        };
        match self.provider.complete(request).await {
            Ok(response) => Ok(response.content.filter(|c| !c.trim().is_empty())),
            Err(e @ ParleyError::RateLimited { .. }) => {
                warn!(model, "rate limit hit during search");
                self.tracker
                    .mark(model, Duration::from_secs(self.config.rate_limit_secs));
                Err(e)
            }
            Err(e @ (ParleyError::Provider { .. } | ParleyError::Unauthorized { .. })) => Err(e),
            Err(e) => {
                error!(model, error = %e, "unexpected error generating search answer");
                Ok(None)
            }
        }
    }
}
