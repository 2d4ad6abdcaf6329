// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! Provides mock adapters and small builders for fast, deterministic tests
//! without network access.
//!
//! # Components
//!
//! - [`MockProvider`] - scripted completion provider that records every request
//! - [`harness`] - in-memory storage and error helpers

pub mod harness;
pub mod mock_provider;

pub use harness::{memory_storage, rate_limited};
pub use mock_provider::MockProvider;
