//! Coarse per-IP request throttle.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Requests allowed per window.
pub const DEFAULT_LIMIT: u32 = 1000;

/// Window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Path suffixes never counted against the limit.
const EXEMPT_SUFFIXES: &[&str] = &["/files/stream", "/files/download", "/files/upload-file"];

/// Number of tracked IPs above which stale windows are swept.
const SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by client IP.
#[derive(Debug)]
pub struct RequestThrottle {
    windows: DashMap<String, Window>,
    limit: u32,
    window: Duration,
}

impl Default for RequestThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_WINDOW)
    }
}

impl RequestThrottle {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window,
        }
    }

    /// Whether requests to `path` count against the limit.
    pub fn applies_to(path: &str) -> bool {
        !EXEMPT_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
    }

    /// Count one request; `false` once the IP is over the limit.
    pub fn allow(&self, ip: &str) -> bool {
        self.allow_at(ip, Instant::now())
    }

    pub fn allow_at(&self, ip: &str, now: Instant) -> bool {
        if self.windows.len() > SWEEP_THRESHOLD {
            let window = self.window;
            self.windows
                .retain(|_, w| now.saturating_duration_since(w.started) < window);
        }

        let mut entry = self.windows.entry(ip.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.saturating_duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        entry.count += 1;
        entry.count <= self.limit
    }
}
