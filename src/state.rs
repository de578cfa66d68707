// src/state.rs

use crate::bridge::Notifier;
use crate::cache::TranslationCache;
use crate::config::{FileType, Settings};
use crate::gateway::{CallContext, ModelGateway};
use crate::key_manager::KeyManager;
use crate::rate_limit::RateLimiter;
use chrono::{DateTime, Local};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::info;

/// Run/pause gate shared by the worker and the control plane.
///
/// Waiting on a closed gate has no timeout; only a resume (or process exit)
/// releases it.
#[derive(Debug)]
pub struct PauseGate {
    running: watch::Sender<bool>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    #[must_use]
    pub fn new() -> Self {
        let (running, _) = watch::channel(true);
        Self { running }
    }

    pub fn pause(&self) {
        self.running.send_replace(false);
    }

    pub fn resume(&self) {
        self.running.send_replace(true);
    }

    pub fn is_paused(&self) -> bool {
        !*self.running.borrow()
    }

    /// Blocks while the gate is closed.
    pub async fn wait_if_paused(&self, at: &str) {
        let mut rx = self.running.subscribe();
        if *rx.borrow_and_update() {
            return;
        }
        info!(at = %at, "Paused, waiting for resume");
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|running| *running).await;
        info!(at = %at, "Resumed");
    }
}

/// Progress of the file currently being processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileProgress {
    pub name: Option<String>,
    pub total: usize,
    pub processed: usize,
}

/// Flags written by the control plane and polled by the worker at its
/// checkpoints. Guarded by one coarse mutex.
#[derive(Debug, Default)]
pub struct ControlFlags {
    pub stop_requested: bool,
    pub skip_api: bool,
    pub skip_file: bool,
    pub max_entries: Option<usize>,
    pub file_context: Option<String>,
    pub progress: FileProgress,
    pub last_prompt: Option<String>,
}

/// Monotonic run counters. Only the worker writes them.
#[derive(Debug)]
pub struct RunCounters {
    files_completed: AtomicU64,
    entries_translated: AtomicU64,
    cache_hits: AtomicU64,
    started: Instant,
    started_at: DateTime<Local>,
}

impl Default for RunCounters {
    fn default() -> Self {
        Self {
            files_completed: AtomicU64::new(0),
            entries_translated: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            started: Instant::now(),
            started_at: Local::now(),
        }
    }
}

impl RunCounters {
    pub fn record_file(&self) {
        self.files_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entry(&self) {
        self.entries_translated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn files_completed(&self) -> u64 {
        self.files_completed.load(Ordering::Relaxed)
    }

    pub fn entries_translated(&self) -> u64 {
        self.entries_translated.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }
}

/// Everything a run shares between the worker, the console and the bridge.
pub struct RunContext {
    pub settings: Settings,
    pub keys: KeyManager,
    pub cache: TranslationCache,
    pub limiter: RateLimiter,
    pub gateway: ModelGateway,
    pub pause: PauseGate,
    pub counters: RunCounters,
    pub notifier: Arc<dyn Notifier>,
    flags: Mutex<ControlFlags>,
    command_lock: Mutex<()>,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("keys", &self.keys)
            .field("cache_entries", &self.cache.len())
            .field("paused", &self.pause.is_paused())
            .finish_non_exhaustive()
    }
}

impl RunContext {
    #[must_use]
    pub fn new(
        settings: Settings,
        keys: KeyManager,
        cache: TranslationCache,
        gateway: ModelGateway,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let limiter = RateLimiter::new(settings.rpm);
        let flags = ControlFlags {
            max_entries: settings.max_entries,
            ..ControlFlags::default()
        };
        Self {
            settings,
            keys,
            cache,
            limiter,
            gateway,
            pause: PauseGate::new(),
            counters: RunCounters::default(),
            notifier,
            flags: Mutex::new(flags),
            command_lock: Mutex::new(()),
        }
    }

    pub fn flags(&self) -> MutexGuard<'_, ControlFlags> {
        self.flags.lock()
    }

    /// Serialises control commands coming from different channels.
    pub(crate) fn command_guard(&self) -> MutexGuard<'_, ()> {
        self.command_lock.lock()
    }

    pub fn file_type(&self) -> FileType {
        self.settings.file_type
    }

    pub fn call_context(&self) -> CallContext<'_> {
        CallContext {
            limiter: &self.limiter,
            pause: &self.pause,
            keys: &self.keys,
            rotate_on_limit_or_error: self.settings.rotate_on_limit_or_error,
        }
    }

    pub fn request_stop(&self) {
        self.flags().stop_requested = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.flags().stop_requested
    }

    pub fn skip_file_requested(&self) -> bool {
        self.flags().skip_file
    }

    /// Consumes a pending `skip api` request.
    pub fn take_skip_api(&self) -> bool {
        std::mem::take(&mut self.flags().skip_api)
    }

    pub fn clear_skip_file(&self) {
        self.flags().skip_file = false;
    }

    pub fn notify(&self, message: &str) {
        self.notifier.notify(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_gate_does_not_block() {
        let gate = PauseGate::new();
        assert!(!gate.is_paused());
        gate.wait_if_paused("test").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_gate_blocks_until_resume() {
        let gate = Arc::new(PauseGate::new());
        gate.pause();
        assert!(gate.is_paused());

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait_if_paused("test").await })
        };
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!waiter.is_finished());

        gate.resume();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter released")
            .unwrap();
    }

    #[test]
    fn test_counters() {
        let counters = RunCounters::default();
        counters.record_file();
        counters.record_entry();
        counters.record_entry();
        counters.record_cache_hit();
        assert_eq!(counters.files_completed(), 1);
        assert_eq!(counters.entries_translated(), 2);
        assert_eq!(counters.cache_hits(), 1);
    }
}
