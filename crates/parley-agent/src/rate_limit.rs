// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dual-tier sliding-window rate limiter.
//!
//! Every request counts against its sender's window; requests in group chats
//! also count against the group's window. A request is denied when either
//! window is full. Privileged users are never limited.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parley_config::model::RateLimitConfig;
use parley_core::ChatType;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Outcome of [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    /// The sender's own window is full.
    UserLimited { retry_after: Duration },
    /// The group's shared window is full.
    GroupLimited { retry_after: Duration },
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Self::Allowed
    }

    /// The notice to send back, if any.
    ///
    /// Only private chats are told to slow down; replying in a group would
    /// add to the noise.
    pub fn notice(self, chat_type: ChatType) -> Option<String> {
        match self {
            Self::UserLimited { retry_after } if chat_type == ChatType::Private => {
                let secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
                Some(format!(
                    "⚠️ You are sending commands too quickly! Please wait {secs} more seconds."
                ))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    limit: usize,
    interval: Duration,
}

impl Window {
    /// Drops expired entries and reports the wait if the window is full.
    fn prune_and_check(&self, stamps: &mut VecDeque<Instant>, now: Instant) -> Option<Duration> {
        while stamps
            .front()
            .is_some_and(|t| now.duration_since(*t) > self.interval)
        {
            stamps.pop_front();
        }
        if stamps.len() < self.limit {
            return None;
        }
        let oldest = *stamps.front()?;
        Some((oldest + self.interval).saturating_duration_since(now))
    }
}

/// Per-user and per-group request counters.
pub struct RateLimiter {
    users: DashMap<i64, VecDeque<Instant>>,
    groups: DashMap<i64, VecDeque<Instant>>,
    user_window: Window,
    group_window: Window,
    privileged: HashSet<i64>,
    cleanup_interval: Duration,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, privileged: impl IntoIterator<Item = i64>) -> Self {
        debug!(
            user_limit = config.user_limit,
            user_interval_secs = config.user_interval_secs,
            group_limit = config.group_limit,
            group_interval_secs = config.group_interval_secs,
            "rate limiter initialized"
        );
        Self {
            users: DashMap::new(),
            groups: DashMap::new(),
            user_window: Window {
                limit: config.user_limit,
                interval: Duration::from_secs(config.user_interval_secs),
            },
            group_window: Window {
                limit: config.group_limit,
                interval: Duration::from_secs(config.group_interval_secs),
            },
            privileged: privileged.into_iter().collect(),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs),
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn is_privileged(&self, user_id: i64) -> bool {
        self.privileged.contains(&user_id)
    }

    /// Checks and records one request.
    ///
    /// An allowed request is counted in the user's window before the group
    /// window is consulted, so a request denied by the group still uses up a
    /// user slot. Denied requests are not recorded in the denying window.
    pub fn check(&self, user_id: i64, chat_id: i64, chat_type: ChatType) -> Decision {
        if self.is_privileged(user_id) {
            return Decision::Allowed;
        }
        let now = Instant::now();

        {
            let mut stamps = self.users.entry(user_id).or_default();
            if let Some(retry_after) = self.user_window.prune_and_check(&mut stamps, now) {
                warn!(user_id, "user exceeded the request limit");
                return Decision::UserLimited { retry_after };
            }
            stamps.push_back(now);
        }

        if chat_type.is_group() {
            let mut stamps = self.groups.entry(chat_id).or_default();
            if let Some(retry_after) = self.group_window.prune_and_check(&mut stamps, now) {
                warn!(chat_id, "group exceeded the request limit");
                return Decision::GroupLimited { retry_after };
            }
            stamps.push_back(now);
        }

        Decision::Allowed
    }

    /// Prunes expired timestamps and drops empty keys.
    ///
    /// Returns the number of (users, groups) removed.
    pub fn sweep(&self) -> (usize, usize) {
        let now = Instant::now();
        let users = sweep_map(&self.users, self.user_window, now);
        let groups = sweep_map(&self.groups, self.group_window, now);
        if users > 0 || groups > 0 {
            debug!(users, groups, "rate limit cleanup completed");
        }
        (users, groups)
    }

    /// Keys currently tracked, as (users, groups).
    pub fn tracked(&self) -> (usize, usize) {
        (self.users.len(), self.groups.len())
    }

    /// Starts the periodic sweep. It stops on [`shutdown`](Self::shutdown).
    pub fn start_sweeper(self: &Arc<Self>) {
        let limiter = Arc::clone(self);
        let interval = self.cleanup_interval;
        let shutdown = self.shutdown.clone();

        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        limiter.sweep();
                    }
                }
            }
            debug!("rate limit sweeper stopped");
        });
    }

    pub async fn shutdown(&self) {
        info!("shutting down rate limiter");
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.users.clear();
        self.groups.clear();
    }
}

fn sweep_map(map: &DashMap<i64, VecDeque<Instant>>, window: Window, now: Instant) -> usize {
    let before = map.len();
    map.retain(|_, stamps| {
        stamps.retain(|t| now.duration_since(*t) <= window.interval);
        !stamps.is_empty()
    });
    before.saturating_sub(map.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(privileged: Vec<i64>) -> RateLimiter {
        RateLimiter::new(
            &RateLimitConfig {
                user_limit: 5,
                user_interval_secs: 30,
                group_limit: 10,
                group_interval_secs: 60,
                cleanup_interval_secs: 300,
            },
            privileged,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_request_in_window_is_denied() {
        let limiter = limiter(vec![]);
        for _ in 0..5 {
            assert!(limiter.check(1, 1, ChatType::Private).is_allowed());
        }
        let decision = limiter.check(1, 1, ChatType::Private);
        assert_eq!(
            decision,
            Decision::UserLimited {
                retry_after: Duration::from_secs(30)
            }
        );

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(limiter.check(1, 1, ChatType::Private).is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_reflects_oldest_request() {
        let limiter = limiter(vec![]);
        for _ in 0..5 {
            limiter.check(1, 1, ChatType::Private);
            tokio::time::advance(Duration::from_secs(2)).await;
        }
        match limiter.check(1, 1, ChatType::Private) {
            Decision::UserLimited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(20));
            }
            other => panic!("expected user limit, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn privileged_users_are_never_limited() {
        let limiter = limiter(vec![99]);
        for _ in 0..100 {
            assert!(limiter.check(99, -5, ChatType::Group).is_allowed());
        }
        assert_eq!(limiter.tracked(), (0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn group_window_is_shared() {
        let limiter = limiter(vec![]);
        for user in 0..10 {
            assert!(limiter.check(user, -5, ChatType::Supergroup).is_allowed());
        }
        assert!(matches!(
            limiter.check(10, -5, ChatType::Supergroup),
            Decision::GroupLimited { .. }
        ));
        // Another group is unaffected.
        assert!(limiter.check(10, -6, ChatType::Group).is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn private_chats_skip_group_window() {
        let limiter = limiter(vec![]);
        for user in 0..20 {
            assert!(limiter.check(user, 7, ChatType::Private).is_allowed());
        }
        assert_eq!(limiter.tracked(), (20, 0));
    }

    #[test]
    fn only_private_user_denials_notify() {
        let user = Decision::UserLimited {
            retry_after: Duration::from_millis(12_300),
        };
        assert_eq!(
            user.notice(ChatType::Private).as_deref(),
            Some("⚠️ You are sending commands too quickly! Please wait 13 more seconds.")
        );
        assert!(user.notice(ChatType::Group).is_none());

        let group = Decision::GroupLimited {
            retry_after: Duration::from_secs(5),
        };
        assert!(group.notice(ChatType::Private).is_none());
        assert!(Decision::Allowed.notice(ChatType::Private).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_expired_keys() {
        let limiter = limiter(vec![]);
        limiter.check(1, -5, ChatType::Group);
        tokio::time::advance(Duration::from_secs(45)).await;
        limiter.check(2, 2, ChatType::Private);

        assert_eq!(limiter.sweep(), (1, 0));
        assert_eq!(limiter.tracked(), (1, 1));

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(limiter.sweep(), (0, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_until_shutdown() {
        let limiter = Arc::new(limiter(vec![]));
        limiter.start_sweeper();
        limiter.check(1, 1, ChatType::Private);

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(limiter.tracked(), (0, 0));
        limiter.shutdown().await;
    }
}
