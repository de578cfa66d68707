// src/rate_limit.rs

use crate::error::Result;
use crate::state::PauseGate;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Length of the sliding window the limit applies to.
pub const WINDOW: Duration = Duration::from_secs(60);

/// How a call got its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A slot was free (or limiting is disabled).
    Admitted,
    /// The window was full and the active key was rotated instead of waiting.
    Rotated,
}

/// Snapshot of the window for display.
#[derive(Debug, Clone, PartialEq)]
pub struct RateUsage {
    pub limit: Option<u32>,
    pub in_window: usize,
    pub remaining: Option<u32>,
    /// Time until the oldest call leaves the window, when saturated.
    pub wait: Option<Duration>,
}

/// Requests-per-minute governor over a trailing 60 second window.
///
/// The limit is runtime-mutable; the timestamp window has its own lock because
/// both the worker (admit) and the control plane (`set rpm`) mutate it.
#[derive(Debug)]
pub struct RateLimiter {
    limit: Mutex<Option<u32>>,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `None` or zero disables limiting.
    #[must_use]
    pub fn new(limit: Option<u32>) -> Self {
        Self {
            limit: Mutex::new(limit.filter(|l| *l > 0)),
            window: Mutex::new(VecDeque::new()),
        }
    }

    pub fn limit(&self) -> Option<u32> {
        *self.limit.lock()
    }

    /// Changes the limit and clears the window, old counts cannot be judged
    /// against a new limit.
    pub fn set_limit(&self, limit: Option<u32>) {
        *self.limit.lock() = limit.filter(|l| *l > 0);
        self.window.lock().clear();
    }

    pub fn usage(&self) -> RateUsage {
        let limit = self.limit();
        let now = Instant::now();
        let mut window = self.window.lock();
        prune(&mut window, now);
        let in_window = window.len();
        let remaining = limit.map(|l| l.saturating_sub(in_window as u32));
        let wait = match (limit, window.front()) {
            (Some(l), Some(oldest)) if in_window >= l as usize => {
                Some((*oldest + WINDOW).saturating_duration_since(now))
            }
            _ => None,
        };
        RateUsage {
            limit,
            in_window,
            remaining,
            wait,
        }
    }

    /// Blocks until a slot is free.
    ///
    /// The pause gate is honoured before every re-evaluation of the window.
    /// When `rotate` is given and returns `true` for a saturated window, the
    /// call is admitted at once without waiting.
    pub async fn admit(
        &self,
        pause: &PauseGate,
        mut rotate: Option<&mut (dyn FnMut() -> Result<bool> + Send)>,
    ) -> Result<Admission> {
        loop {
            pause.wait_if_paused("rate limit wait").await;

            let (limit, wait) = {
                let Some(limit) = self.limit() else {
                    return Ok(Admission::Admitted);
                };
                let now = Instant::now();
                let mut window = self.window.lock();
                prune(&mut window, now);
                if window.len() < limit as usize {
                    window.push_back(now);
                    debug!(in_window = window.len(), limit, "Rate limit slot granted");
                    return Ok(Admission::Admitted);
                }
                let oldest = window.front().copied().unwrap_or(now);
                (limit, (oldest + WINDOW).saturating_duration_since(now))
            };

            if let Some(rotate) = rotate.as_mut() {
                if rotate()? {
                    return Ok(Admission::Rotated);
                }
            }

            if !wait.is_zero() {
                warn!(
                    limit,
                    wait_secs = format!("{:.1}", wait.as_secs_f64()),
                    "RPM limit reached, waiting for a free slot"
                );
                sleep(wait).await;
            }
        }
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant) {
    while let Some(oldest) = window.front() {
        if now.saturating_duration_since(*oldest) >= WINDOW {
            window.pop_front();
        } else {
            break;
        }
    }
}
