//! Shared-token authentication with brute-force lockout.
//!
//! [`AuthGate`] combines the token comparison with an [`IpRateLimiter`]:
//! a banned IP is refused before its token is even looked at, a wrong token
//! counts as a failure, and a correct one clears the failure count.

pub mod limiter;
pub mod throttle;

pub use limiter::{BanStatus, IpRateLimiter};
pub use throttle::RequestThrottle;

use tracing::debug;

use crate::config::LimiterSettings;

/// Result of an authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Allowed,
    /// The IP is locked out.
    Banned { minutes_left: u64 },
    /// Missing or wrong token.
    Rejected,
}

/// Token check in front of the file API.
#[derive(Debug)]
pub struct AuthGate {
    token: Option<String>,
    limiter: IpRateLimiter,
}

impl AuthGate {
    /// `token = None` disables authentication.
    pub fn new(token: Option<String>, settings: LimiterSettings) -> Self {
        Self {
            token,
            limiter: IpRateLimiter::new(settings),
        }
    }

    /// Decide whether a request from `ip` presenting `presented` may pass.
    pub fn authorize(&self, ip: &str, presented: Option<&str>) -> AuthDecision {
        let Some(expected) = self.token.as_deref() else {
            return AuthDecision::Allowed;
        };

        if let BanStatus::Banned { minutes_left } = self.limiter.check(ip) {
            return AuthDecision::Banned { minutes_left };
        }

        if presented == Some(expected) {
            self.limiter.record_success(ip);
            return AuthDecision::Allowed;
        }

        debug!(ip = %ip, "Authorization failed");
        self.limiter.record_failure(ip);
        AuthDecision::Rejected
    }

    pub fn limiter(&self) -> &IpRateLimiter {
        &self.limiter
    }
}
