// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fetches a web page and returns its readable text.

use std::time::Duration;

use async_trait::async_trait;
use parley_core::ParleyError;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::debug;

use crate::tool::Tool;

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Characters of page text returned to the model.
pub const MAX_PAGE_CHARS: usize = 8000;

/// Wrap width for rendered text; wide enough that paragraphs stay on one line.
const RENDER_WIDTH: usize = 10_000;

pub const PAGE_LOAD_FAILED: &str = "Failed to load the page.";

/// `open_url` tool.
#[derive(Debug, Clone, Default)]
pub struct OpenUrlTool {
    client: reqwest::Client,
}

impl OpenUrlTool {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Renders HTML to plain text, drops blank lines, and caps the length.
pub fn page_text(html: &str, max_chars: usize) -> String {
    let rendered = html2text::from_read(html.as_bytes(), RENDER_WIDTH)
        .unwrap_or_else(|_| html.to_string());
    let text = rendered
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    text.chars().take(max_chars).collect()
}

#[async_trait]
impl Tool for OpenUrlTool {
    fn name(&self) -> &str {
        "open_url"
    }

    fn description(&self) -> &str {
        "Opens a web page and returns its text content. Use it to read a search result \
         or a link the user sent."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http(s) URL of the page to open."
                }
            },
            "required": ["url"]
        })
    }

    async fn invoke(&self, input: Value) -> Result<Value, ParleyError> {
        let url = input["url"].as_str().unwrap_or_default();
        let parsed = reqwest::Url::parse(url).map_err(|e| ParleyError::Tool {
            message: format!("invalid URL: {e}"),
            source: Some(Box::new(e)),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Ok(json!({
                "error": format!("URL scheme '{}' not allowed", parsed.scheme())
            }));
        }

        let response = match self
            .client
            .get(parsed)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(url, error = %e, "page fetch failed");
                return Ok(json!({ "error": PAGE_LOAD_FAILED }));
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND || !status.is_success() {
            debug!(url, status = %status, "page fetch returned an error status");
            return Ok(json!({ "error": PAGE_LOAD_FAILED }));
        }

        let html = response.text().await.map_err(|e| ParleyError::Tool {
            message: format!("failed to read page body: {e}"),
            source: Some(Box::new(e)),
        })?;

        Ok(json!({ "url": url, "content": page_text(&html, MAX_PAGE_CHARS) }))
    }
}
