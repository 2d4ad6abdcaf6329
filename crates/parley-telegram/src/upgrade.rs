// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Self-upgrade through git.
//!
//! `/upgrade` fetches the configured remote, lists the commits the checkout
//! is missing, pulls them, and asks the process to restart.

use std::path::PathBuf;

use parley_config::model::UpgradeConfig;
use parley_core::ParleyError;
use tokio::process::Command;
use tracing::{info, warn};

pub const UP_TO_DATE: &str = "Bot is already up-to-date.";

/// Result of an upgrade attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    UpToDate,
    /// New commits were pulled; `changelog` is their one-line log.
    Pulled { changelog: String },
}

/// Runs git against one working tree.
#[derive(Debug, Clone)]
pub struct Upgrader {
    config: UpgradeConfig,
    workdir: Option<PathBuf>,
}

impl Upgrader {
    pub fn new(config: UpgradeConfig) -> Self {
        Self {
            config,
            workdir: None,
        }
    }

    /// Runs git in `dir` instead of the process working directory.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    async fn git(&self, args: &[&str]) -> Result<String, ParleyError> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        let output = cmd.output().await.map_err(|e| {
            ParleyError::Internal(format!("failed to run git {}: {e}", args.join(" ")))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(args = ?args, %stderr, "git command failed");
            return Err(ParleyError::Internal(stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// One-line log of upstream commits not yet in `HEAD`.
    pub async fn pending_commits(&self) -> Result<String, ParleyError> {
        let remote = self.config.remote.as_str();
        self.git(&["fetch", remote]).await?;
        let range = format!("HEAD..{remote}/{}", self.config.branch);
        self.git(&["log", &range, "--oneline"]).await
    }

    /// Pulls pending commits, if there are any.
    pub async fn upgrade(&self) -> Result<UpgradeOutcome, ParleyError> {
        let changelog = self.pending_commits().await?;
        if changelog.is_empty() {
            return Ok(UpgradeOutcome::UpToDate);
        }
        self.git(&["pull", &self.config.remote, &self.config.branch])
            .await?;
        info!(commits = changelog.lines().count(), "pulled upstream changes");
        Ok(UpgradeOutcome::Pulled { changelog })
    }
}
