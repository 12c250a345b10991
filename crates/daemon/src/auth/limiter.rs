//! Per-IP brute-force lockout for the shared token.
//!
//! Each source IP moves through three states:
//!
//! ```text
//!   Clear ──failure──▶ Warned (1..=max_attempts) ──failure──▶ Banned
//!     ▲                      │                                  │
//!     └──────success─────────┘◀──────────ban expires────────────┘
//! ```
//!
//! State lives in memory only and is sharded across a [`DashMap`].

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{info, warn};

use crate::config::LimiterSettings;

/// Outcome of a ban lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanStatus {
    Clear,
    /// Whole minutes left, rounded up.
    Banned { minutes_left: u64 },
}

#[derive(Debug, Default)]
struct RateLimitRecord {
    failure_count: u32,
    banned_until: Option<Instant>,
}

/// Tracks authentication failures per client IP.
#[derive(Debug)]
pub struct IpRateLimiter {
    records: DashMap<String, RateLimitRecord>,
    settings: LimiterSettings,
}

impl IpRateLimiter {
    pub fn new(settings: LimiterSettings) -> Self {
        Self {
            records: DashMap::new(),
            settings,
        }
    }

    /// Whether `ip` is currently banned.
    pub fn check(&self, ip: &str) -> BanStatus {
        self.check_at(ip, Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock reading.
    ///
    /// An expired ban is removed together with its failure count.
    pub fn check_at(&self, ip: &str, now: Instant) -> BanStatus {
        let banned_until = match self.records.get(ip) {
            Some(record) => record.banned_until,
            None => return BanStatus::Clear,
        };

        match banned_until {
            Some(until) if until > now => BanStatus::Banned {
                minutes_left: ceil_minutes(until - now),
            },
            Some(_) => {
                self.records
                    .remove_if(ip, |_, r| r.banned_until.is_some_and(|u| u <= now));
                info!(ip = %ip, "Ban expired");
                BanStatus::Clear
            }
            None => BanStatus::Clear,
        }
    }

    /// Count a failed attempt; returns the resulting status.
    pub fn record_failure(&self, ip: &str) -> BanStatus {
        self.record_failure_at(ip, Instant::now())
    }

    /// [`record_failure`](Self::record_failure) against an explicit clock reading.
    pub fn record_failure_at(&self, ip: &str, now: Instant) -> BanStatus {
        let mut record = self.records.entry(ip.to_string()).or_default();

        if let Some(until) = record.banned_until {
            if until > now {
                return BanStatus::Banned {
                    minutes_left: ceil_minutes(until - now),
                };
            }
            record.banned_until = None;
            record.failure_count = 0;
        }

        record.failure_count += 1;
        if record.failure_count > self.settings.max_attempts {
            record.failure_count = 0;
            record.banned_until = Some(now + self.settings.ban_duration);
            warn!(
                ip = %ip,
                minutes = ceil_minutes(self.settings.ban_duration),
                "Too many failed attempts, banning"
            );
            return BanStatus::Banned {
                minutes_left: ceil_minutes(self.settings.ban_duration),
            };
        }

        BanStatus::Clear
    }

    /// Reset the failure count. An active ban is left in place.
    pub fn record_success(&self, ip: &str) {
        self.records.remove_if(ip, |_, r| r.banned_until.is_none());
        if let Some(mut record) = self.records.get_mut(ip) {
            record.failure_count = 0;
        }
    }

    /// Current failure count for `ip`.
    pub fn failure_count(&self, ip: &str) -> u32 {
        self.records.get(ip).map(|r| r.failure_count).unwrap_or(0)
    }
}

fn ceil_minutes(duration: Duration) -> u64 {
    let millis = duration.as_millis() as u64;
    millis.div_ceil(60_000)
}
