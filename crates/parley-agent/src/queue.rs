// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-(user, chat) message queue.
//!
//! Each key gets one worker task that runs its jobs strictly in arrival
//! order, one at a time, so replies within a conversation never interleave.
//! Different keys run concurrently. Workers idle past `idle_timeout` are
//! evicted by a periodic sweep, and [`MessageQueue::shutdown`] cancels every
//! task and waits for them to exit.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use parley_config::model::QueueConfig;
use parley_core::ParleyError;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

type Job = BoxFuture<'static, Result<(), ParleyError>>;

/// Routes messages to a worker. Displayed as `user:chat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueKey {
    pub user_id: i64,
    pub chat_id: i64,
}

impl QueueKey {
    pub fn new(user_id: i64, chat_id: i64) -> Self {
        Self { user_id, chat_id }
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.chat_id)
    }
}

struct Worker {
    sender: mpsc::Sender<Job>,
    cancel: CancellationToken,
    /// Milliseconds since the queue's epoch.
    last_activity: Arc<AtomicU64>,
}

/// Serializes jobs per [`QueueKey`].
pub struct MessageQueue {
    config: QueueConfig,
    workers: DashMap<QueueKey, Worker>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    epoch: Instant,
}

impl MessageQueue {
    pub fn new(config: QueueConfig) -> Self {
        debug!(
            max_queue_size = config.max_queue_size,
            process_timeout_secs = config.process_timeout_secs,
            "message queue initialized"
        );
        Self {
            config,
            workers: DashMap::new(),
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Number of live workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn contains(&self, key: QueueKey) -> bool {
        self.workers.contains_key(&key)
    }

    /// Queues `job` behind any earlier jobs for `key`.
    ///
    /// Returns once the job is queued, not when it has run. Fails with
    /// [`ParleyError::QueueFull`] when `max_queue_size` jobs are already
    /// waiting, and with [`ParleyError::Timeout`] when the slot cannot be
    /// taken within `enqueue_timeout`.
    pub async fn enqueue<F>(&self, key: QueueKey, job: F) -> Result<(), ParleyError>
    where
        F: Future<Output = Result<(), ParleyError>> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(ParleyError::Internal("message queue is shut down".into()));
        }

        let now = self.now_ms();
        let sender = {
            let worker = self
                .workers
                .entry(key)
                .or_insert_with(|| self.spawn_worker(key));
            worker.last_activity.store(now, Ordering::Relaxed);
            worker.sender.clone()
        };

        if sender.capacity() == 0 {
            warn!(%key, "queue is full, message rejected");
            return Err(ParleyError::QueueFull {
                key: key.to_string(),
            });
        }

        let timeout = self.config.enqueue_timeout();
        match tokio::time::timeout(timeout, sender.send(Box::pin(job))).await {
            Ok(Ok(())) => {
                debug!(%key, "message enqueued");
                Ok(())
            }
            Ok(Err(_)) => {
                // The worker was evicted between lookup and send.
                self.workers.remove_if(&key, |_, w| w.sender.same_channel(&sender));
                Err(ParleyError::Internal(format!("queue worker for {key} stopped")))
            }
            Err(_) => {
                error!(%key, "timed out enqueueing message");
                Err(ParleyError::Timeout { duration: timeout })
            }
        }
    }

    fn spawn_worker(&self, key: QueueKey) -> Worker {
        let (sender, receiver) = mpsc::channel(self.config.max_queue_size.max(1));
        let cancel = self.shutdown.child_token();
        let last_activity = Arc::new(AtomicU64::new(self.now_ms()));

        self.tasks.spawn(run_worker(
            key,
            receiver,
            cancel.clone(),
            last_activity.clone(),
            self.epoch,
            self.config.process_timeout(),
        ));
        debug!(%key, "created queue worker");

        Worker {
            sender,
            cancel,
            last_activity,
        }
    }

    /// Evicts workers idle longer than `idle_timeout`. Returns how many.
    pub fn sweep_idle(&self) -> usize {
        let idle_ms = self.config.idle_timeout().as_millis() as u64;
        let now = self.now_ms();
        let mut evicted = 0;

        self.workers.retain(|key, worker| {
            let idle = now.saturating_sub(worker.last_activity.load(Ordering::Relaxed)) > idle_ms;
            if idle {
                worker.cancel.cancel();
                evicted += 1;
                debug!(%key, "evicted idle queue");
            }
            !idle
        });

        if evicted > 0 {
            info!(count = evicted, "cleaned up idle queues");
        }
        evicted
    }

    /// Starts the periodic idle sweep. It stops on [`shutdown`](Self::shutdown).
    pub fn start_sweeper(self: &Arc<Self>) {
        let queue = Arc::clone(self);
        let interval = self.config.cleanup_interval();
        let shutdown = self.shutdown.clone();

        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        queue.sweep_idle();
                    }
                }
            }
            debug!("queue sweeper stopped");
        });
    }

    /// Cancels the sweep and every worker, then waits for all of them.
    pub async fn shutdown(&self) {
        info!(workers = self.workers.len(), "shutting down message queue");
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.workers.clear();
        info!("message queue shutdown complete");
    }
}

async fn run_worker(
    key: QueueKey,
    mut receiver: mpsc::Receiver<Job>,
    cancel: CancellationToken,
    last_activity: Arc<AtomicU64>,
    epoch: Instant,
    process_timeout: Duration,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        last_activity.store(epoch.elapsed().as_millis() as u64, Ordering::Relaxed);

        debug!(%key, "processing message");
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = tokio::time::timeout(process_timeout, AssertUnwindSafe(job).catch_unwind()) => outcome,
        };

        match outcome {
            Ok(Ok(Ok(()))) => debug!(%key, pending = receiver.len(), "message processed"),
            Ok(Ok(Err(e))) => error!(%key, error = %e, "error processing message"),
            Ok(Err(_)) => error!(%key, "message handler panicked"),
            Err(_) => warn!(%key, timeout_secs = process_timeout.as_secs(), "message processing timed out"),
        }
    }
    debug!(%key, "queue worker stopped");
}
