use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use tokio::sync::watch;

pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// Last observed upstream quota.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub remaining: Option<u64>,
    pub limit: Option<u64>,
    pub reset: Option<DateTime<Utc>>,
    pub is_rate_limited: bool,
}

impl RateLimitInfo {
    /// Fraction of the quota still available, if both numbers are known.
    pub fn remaining_ratio(&self) -> Option<f64> {
        match (self.remaining, self.limit) {
            (Some(remaining), Some(limit)) if limit > 0 => Some(remaining as f64 / limit as f64),
            _ => None,
        }
    }
}

/// Owner of the shared `RateLimitInfo`. Cloned into the transport; the UI
/// subscribes for changes.
#[derive(Debug, Clone)]
pub struct RateLimitMonitor {
    tx: Arc<watch::Sender<RateLimitInfo>>,
}

impl Default for RateLimitMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitMonitor {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RateLimitInfo::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> RateLimitInfo {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RateLimitInfo> {
        self.tx.subscribe()
    }

    /// Merge whatever quota headers are present; absent headers keep the
    /// previous value. The rate-limited flag always reflects this response.
    pub fn observe(&self, headers: &HeaderMap, is_rate_limited: bool) {
        let remaining = header_u64(headers, HEADER_REMAINING);
        let limit = header_u64(headers, HEADER_LIMIT);
        let reset = header_u64(headers, HEADER_RESET)
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single());

        self.tx.send_modify(|info| {
            if remaining.is_some() {
                info.remaining = remaining;
            }
            if limit.is_some() {
                info.limit = limit;
            }
            if reset.is_some() {
                info.reset = reset;
            }
            info.is_rate_limited = is_rate_limited;
        });
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
