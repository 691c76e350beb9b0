//! Background scheduler: one worker task serving three triggers.
//!
//! - `on_local_change`: debounced push after local edits
//! - `on_poll_tick`: periodic remote freshness check
//! - `on_backup_tick`: slow safety-net pass
//!
//! All three run on the same task, so two of them never overlap. Ticks that
//! come due while the worker is busy are skipped, not queued.

use crate::sync::config::SyncConfig;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Work the scheduler drives.
#[async_trait]
pub trait SyncTriggers: Send + Sync + 'static {
    async fn on_local_change(&self);
    async fn on_poll_tick(&self);
    async fn on_backup_tick(&self);
}

/// Picks the quiet period after each local change.
///
/// Ordinary edits wait `normal`; once `threshold` changes land within
/// `window`, the wait stretches to `burst` so bulk edits push once.
#[derive(Debug, Clone)]
pub struct Debouncer {
    normal: Duration,
    burst: Duration,
    window: Duration,
    threshold: usize,
    recent: VecDeque<Instant>,
}

impl Debouncer {
    pub fn new(normal: Duration, burst: Duration, window: Duration, threshold: usize) -> Self {
        Self {
            normal,
            burst,
            window,
            threshold,
            recent: VecDeque::new(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.debounce(),
            config.burst_debounce(),
            config.burst_window(),
            config.burst_threshold,
        )
    }

    /// Record a change at `now` and return how long to wait before pushing.
    pub fn record(&mut self, now: Instant) -> Duration {
        while let Some(&oldest) = self.recent.front() {
            if now.saturating_duration_since(oldest) > self.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        self.recent.push_back(now);

        if self.recent.len() >= self.threshold {
            self.burst
        } else {
            self.normal
        }
    }
}

enum Command {
    LocalChange,
    Shutdown,
}

/// Control surface for a running scheduler.
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal that local data changed.
    pub fn notify_local_change(&self) {
        if self.tx.send(Command::LocalChange).is_err() {
            debug!("Scheduler already stopped, change ignored");
        }
    }

    /// Stop the worker and wait for it. An operation in progress finishes first.
    pub async fn shutdown(self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }
}

pub struct SyncScheduler;

impl SyncScheduler {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn<T: SyncTriggers>(target: Arc<T>, config: &SyncConfig) -> SchedulerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            target,
            debouncer: Debouncer::from_config(config),
            poll_every: config.poll_interval(),
            backup_every: config.backup_interval(),
        };
        let task = tokio::spawn(worker.run(rx));
        SchedulerHandle { tx, task }
    }
}

struct Worker<T> {
    target: Arc<T>,
    debouncer: Debouncer,
    poll_every: Duration,
    backup_every: Duration,
}

impl<T: SyncTriggers> Worker<T> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let start = Instant::now();
        let mut poll = interval_at(start + self.poll_every, self.poll_every);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut backup = interval_at(start + self.backup_every, self.backup_every);
        backup.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut push_at: Option<Instant> = None;
        info!(
            "Sync scheduler started (poll every {:?}, backup every {:?})",
            self.poll_every, self.backup_every
        );

        loop {
            tokio::select! {
                biased;

                command = rx.recv() => match command {
                    Some(Command::LocalChange) => {
                        let now = Instant::now();
                        let delay = self.debouncer.record(now);
                        debug!("Local change, push in {:?}", delay);
                        push_at = Some(now + delay);
                    }
                    Some(Command::Shutdown) | None => break,
                },

                _ = wait_until(push_at) => {
                    push_at = None;
                    self.target.on_local_change().await;
                }

                _ = poll.tick() => self.target.on_poll_tick().await,

                _ = backup.tick() => self.target.on_backup_tick().await,
            }
        }

        info!("Sync scheduler stopped");
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
