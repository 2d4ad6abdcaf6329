// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley chatbot.
//!
//! This crate provides the error type, the conversation message model, the
//! model registry, the token estimator, and the adapter traits implemented by
//! the provider, storage, and channel crates.

pub mod error;
pub mod models;
pub mod tokens;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ParleyError;
pub use models::AIModel;
pub use tokens::TokenEstimator;
pub use types::{
    AdapterType, ChatRequest, ChatResponse, ChatType, ContentItem, ConversationRecord,
    HealthStatus, ImageRef, Message, ToolCall, ToolDefinition, UserContent, WhitelistEntry,
};

pub use traits::{PluginAdapter, ProviderAdapter, StorageAdapter};
