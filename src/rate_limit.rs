//! Rate-limit accounting from response headers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

pub const REMAINING_HEADER: &str = "X-Ratelimit-Remaining";
pub const LIMIT_HEADER: &str = "X-Ratelimit-Limit";
pub const RESET_HEADER: &str = "X-Ratelimit-Reset";

const HOUR_SECS: i64 = 60 * 60;

/// Quota state reported by the most recent response.
///
/// `None` means the header was absent, which is not the same as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub remaining: Option<u64>,
    pub limit: Option<u64>,
    /// Epoch seconds at which the quota resets.
    pub reset_at: Option<i64>,
}

impl RateLimitSnapshot {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// How `reset_at` is filled when the server does not send a reset header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResetClock {
    /// Only trust the server's header; absent stays absent.
    Server,
    /// Quota resets on the hour: fall back to the next hour boundary.
    #[default]
    HourBoundary,
}

/// Parse raw `Name: value` header lines into a snapshot.
///
/// Names are matched case-sensitively. Lines without a colon or with an
/// empty value are skipped, as are values that are not integers.
pub fn parse_rate_limits<S: AsRef<str>>(lines: &[S]) -> RateLimitSnapshot {
    let mut snapshot = RateLimitSnapshot::default();
    for line in lines {
        let Some((name, value)) = line.as_ref().split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match name.trim() {
            REMAINING_HEADER => snapshot.remaining = value.parse().ok(),
            LIMIT_HEADER => snapshot.limit = value.parse().ok(),
            RESET_HEADER => snapshot.reset_at = value.parse().ok(),
            _ => {}
        }
    }
    snapshot
}

/// Start of the next full hour after `now` (epoch seconds).
pub fn next_hour_boundary(now: i64) -> i64 {
    (now + HOUR_SECS).div_euclid(HOUR_SECS) * HOUR_SECS
}

/// Holds the latest snapshot. Each recorded response replaces it wholesale.
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    clock: ResetClock,
    latest: RwLock<Option<RateLimitSnapshot>>,
}

impl RateLimitTracker {
    pub fn new(clock: ResetClock) -> Self {
        Self {
            clock,
            latest: RwLock::new(None),
        }
    }

    /// Parse `lines`, store the result and return it.
    pub fn record<S: AsRef<str>>(&self, lines: &[S]) -> RateLimitSnapshot {
        self.record_at(lines, Utc::now().timestamp())
    }

    pub(crate) fn record_at<S: AsRef<str>>(&self, lines: &[S], now: i64) -> RateLimitSnapshot {
        let mut snapshot = parse_rate_limits(lines);
        if self.clock == ResetClock::HourBoundary && snapshot.reset_at.is_none() {
            snapshot.reset_at = Some(next_hour_boundary(now));
        }
        match self.latest.write() {
            Ok(mut guard) => *guard = Some(snapshot),
            Err(poisoned) => *poisoned.into_inner() = Some(snapshot),
        }
        snapshot
    }

    /// Latest snapshot, or `None` before any response was recorded.
    pub fn snapshot(&self) -> Option<RateLimitSnapshot> {
        match self.latest.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
