// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in tools offered to the model.

pub mod open_url;
pub mod web_search;

pub use open_url::OpenUrlTool;
pub use web_search::{SearchHit, WebSearchTool};

use std::sync::Arc;

use parley_config::model::SearchConfig;
use parley_core::ParleyError;
use tracing::info;

use crate::ToolRegistry;

/// Registers the built-in tools. `web_search` needs a search API key.
pub fn register_builtins(
    registry: &mut ToolRegistry,
    search: &SearchConfig,
) -> Result<(), ParleyError> {
    match WebSearchTool::from_config(search) {
        Some(tool) => registry.register(Arc::new(tool))?,
        None => info!("search.api_key not set, web_search tool disabled"),
    }
    registry.register(Arc::new(OpenUrlTool::new()))
}
