// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for chat completion endpoints.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChatRequest, ChatResponse};

/// A remote chat completion endpoint.
///
/// Implementations handle transport-level retries themselves. Capacity
/// refusals surface as [`ParleyError::RateLimited`] and credential failures
/// as [`ParleyError::Unauthorized`] so callers can apply model fallback.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends one completion request and returns the first choice.
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ParleyError>;
}
