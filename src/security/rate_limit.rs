//! Per-partner rolling window rate limiting.
//!
//! Each API key owns the instants of its admitted requests inside the trailing
//! window. A check prunes expired instants, compares the remainder against the
//! partner's limit and, if admitted, appends `now`. Rejected attempts leave the
//! window untouched.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::RateLimitConfig;
use crate::error::GatewayError;
use crate::observability::metrics;

/// Admitted request instants for one key, oldest first.
#[derive(Debug, Default)]
struct RateWindow {
    hits: VecDeque<Instant>,
}

impl RateWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    fn try_admit(&mut self, now: Instant, window: Duration, limit: u32) -> bool {
        self.prune(now, window);
        if self.hits.len() >= limit as usize {
            return false;
        }
        self.hits.push_back(now);
        true
    }
}

/// Sliding-window limiter keyed by partner API key.
///
/// The map entry's lock is held only for the synchronous prune-check-append,
/// so concurrent checks on one key are serialized while other keys proceed.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(Duration::from_secs(config.window_secs))
    }

    /// Test and record one attempt for `api_key`. The key is a credential and
    /// is never logged; callers log the rejection against the partner.
    pub fn check(&self, api_key: &str, limit: u32) -> Result<(), GatewayError> {
        self.check_at(api_key, limit, Instant::now())
    }

    fn check_at(&self, api_key: &str, limit: u32, now: Instant) -> Result<(), GatewayError> {
        let admitted = match self.windows.get_mut(api_key) {
            Some(mut window) => window.try_admit(now, self.window, limit),
            None => self
                .windows
                .entry(api_key.to_string())
                .or_default()
                .try_admit(now, self.window, limit),
        };

        if admitted {
            Ok(())
        } else {
            Err(GatewayError::RateLimitExceeded)
        }
    }

    /// Requests currently counted against `api_key`.
    pub fn in_window(&self, api_key: &str) -> usize {
        let now = Instant::now();
        self.windows
            .get(api_key)
            .map(|w| {
                w.hits
                    .iter()
                    .filter(|&&t| now.saturating_duration_since(t) < self.window)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Number of keys with a window in memory.
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Drop windows whose every entry has expired. Returns how many were removed.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    fn evict_idle_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| {
            w.prune(now, self.window);
            !w.hits.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Periodically evict idle windows until shutdown is signalled.
    pub fn spawn_cleanup(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.evict_idle();
                        metrics::record_rate_windows(limiter.window_count());
                        if removed > 0 {
                            tracing::debug!(removed, "Evicted idle rate windows");
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }
}
