// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Web search through the Bing Web Search API.

use std::time::Duration;

use async_trait::async_trait;
use parley_config::model::SearchConfig;
use parley_core::ParleyError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::tool::Tool;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Returned to the model when the API has nothing for the query.
pub const NO_RESULTS: &str = "No search results found.";

/// One organic result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct BingResponse {
    #[serde(default, rename = "webPages")]
    web_pages: Option<WebPages>,
}

#[derive(Debug, Deserialize)]
struct WebPages {
    #[serde(default)]
    value: Vec<WebPage>,
}

#[derive(Debug, Deserialize)]
struct WebPage {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    snippet: String,
}

/// Bing-backed `web_search` tool.
#[derive(Debug, Clone)]
pub struct WebSearchTool {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl WebSearchTool {
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }

    /// `None` when no search key is configured.
    pub fn from_config(config: &SearchConfig) -> Option<Self> {
        config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(|key| Self::new(key, config.endpoint.as_str()))
    }

    /// Runs a query. A 404 from the API is an empty result set.
    pub async fn search(
        &self,
        query: &str,
        freshness: Option<&str>,
    ) -> Result<Vec<SearchHit>, ParleyError> {
        let mut params = vec![("q", query), ("textDecorations", "false")];
        if let Some(freshness) = freshness.filter(|f| !f.is_empty()) {
            params.push(("freshness", freshness));
        }
        let url = reqwest::Url::parse_with_params(&self.endpoint, &params).map_err(|e| {
            ParleyError::Tool {
                message: format!("invalid search endpoint: {e}"),
                source: Some(Box::new(e)),
            }
        })?;

        let response = self
            .client
            .get(url)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| ParleyError::Tool {
                message: format!("search request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(query, "search returned 404");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParleyError::Tool {
                message: format!("search API returned {status}: {body}"),
                source: None,
            });
        }

        let body: BingResponse = response.json().await.map_err(|e| ParleyError::Tool {
            message: format!("failed to parse search response: {e}"),
            source: Some(Box::new(e)),
        })?;

        let hits: Vec<SearchHit> = body
            .web_pages
            .map(|pages| pages.value)
            .unwrap_or_default()
            .into_iter()
            .map(|page| SearchHit {
                title: page.name,
                url: page.url,
                snippet: page.snippet,
            })
            .collect();
        info!(query, results = hits.len(), "web search completed");
        Ok(hits)
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Performs a web search for the user's request. Rewrite the query for an effective \
         search engine lookup; use freshness to restrict results to recently discovered pages."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query, rewritten and optimized from the user's request."
                },
                "freshness": {
                    "type": "string",
                    "enum": ["Day", "Week", "Month"],
                    "description": "Only return pages discovered within the last day, week, or month."
                }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, input: Value) -> Result<Value, ParleyError> {
        let query = input["query"].as_str().unwrap_or_default();
        let freshness = input["freshness"].as_str();

        let hits = self.search(query, freshness).await?;
        if hits.is_empty() {
            return Ok(json!({ "error": NO_RESULTS }));
        }
        Ok(json!({ "results": hits }))
    }
}
