// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Parley chatbot.
//!
//! Stores completed exchanges per (user, chat) and the chat whitelist. Uses a
//! single `tokio-rusqlite` connection and refinery migrations embedded at
//! build time.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
pub use models::*;
