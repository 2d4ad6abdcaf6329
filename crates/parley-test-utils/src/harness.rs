// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers shared by integration tests across the workspace.

use std::sync::Arc;
use std::time::Duration;

use parley_config::model::StorageConfig;
use parley_core::ParleyError;
use parley_storage::{Database, SqliteStorage};

/// A migrated, private in-memory SQLite store.
pub async fn memory_storage() -> Result<Arc<SqliteStorage>, ParleyError> {
    let db = Database::open_in_memory().await?;
    Ok(Arc::new(SqliteStorage::from_database(
        StorageConfig::default(),
        db,
    )))
}

/// The error the completion endpoint produces for an HTTP 429.
pub fn rate_limited(model: &str, wait_secs: Option<u64>) -> ParleyError {
    let message = match wait_secs {
        Some(secs) => format!(
            "(RateLimitReached) Rate limit of 10 per 60s exceeded. Please wait {secs} seconds before retrying."
        ),
        None => "(RateLimitReached) Rate limit exceeded.".to_string(),
    };
    ParleyError::RateLimited {
        model: model.to_string(),
        retry_after: wait_secs.map(Duration::from_secs),
        message,
    }
}
