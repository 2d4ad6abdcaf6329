// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tools the model can call during a conversation turn.

pub mod builtin;
pub mod tool;

pub use builtin::{OpenUrlTool, SearchHit, WebSearchTool, register_builtins};
pub use tool::{Tool, ToolRegistry};
