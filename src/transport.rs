use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::FetchConfig;
use crate::error::Result;
use crate::http::{HttpClient, HttpResponse};
use crate::rate_limit::{RateLimitMonitor, HEADER_REMAINING, HEADER_RESET};

const RETRY_AFTER: &str = "retry-after";

/// Wraps an `HttpClient` with bounded retry on rate-limit responses.
/// Non-success statuses are returned untouched; only network failures are
/// errors here.
pub struct RateLimitedTransport {
    client: Arc<dyn HttpClient>,
    monitor: RateLimitMonitor,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    base_delay: Duration,
}

impl RateLimitedTransport {
    pub fn new(
        client: Arc<dyn HttpClient>,
        monitor: RateLimitMonitor,
        clock: Arc<dyn Clock>,
        config: &FetchConfig,
    ) -> Self {
        Self {
            client,
            monitor,
            clock,
            max_attempts: config.max_attempts.max(1),
            base_delay: config.retry_base_delay,
        }
    }

    pub fn monitor(&self) -> &RateLimitMonitor {
        &self.monitor
    }

    pub async fn request(&self, url: &str) -> Result<HttpResponse> {
        let mut attempt = 0u32;
        loop {
            let response = self.client.get(url).await?;
            let limited = is_rate_limited(&response);
            self.monitor.observe(&response.headers, limited);

            if !limited || attempt + 1 >= self.max_attempts {
                if limited {
                    warn!(url, attempts = attempt + 1, "rate limit retries exhausted");
                }
                return Ok(response);
            }

            let delay = self.retry_delay(&response, attempt);
            warn!(
                url,
                status = response.status,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "rate limited, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
            debug!(url, attempt, "retrying");
        }
    }

    /// Delay before the next attempt: `Retry-After`, then
    /// `x-ratelimit-reset`, then exponential backoff.
    fn retry_delay(&self, response: &HttpResponse, attempt: u32) -> Duration {
        let now_ms = self.clock.now_millis();

        if let Some(value) = response.header(RETRY_AFTER) {
            let value = value.trim();
            if let Ok(seconds) = value.parse::<f64>() {
                if seconds.is_finite() {
                    return Duration::from_millis((seconds * 1000.0).max(0.0) as u64);
                }
            }
            if let Ok(date) = DateTime::parse_from_rfc2822(value) {
                return clamp_millis(date.timestamp_millis() - now_ms);
            }
        }

        if let Some(reset) = response
            .header(HEADER_RESET)
            .and_then(|v| v.trim().parse::<i64>().ok())
        {
            return clamp_millis(reset.saturating_mul(1000) - now_ms);
        }

        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// 429, or 403 with the remaining quota header reading exactly `0`.
pub fn is_rate_limited(response: &HttpResponse) -> bool {
    response.status == 429
        || (response.status == 403 && response.header(HEADER_REMAINING) == Some("0"))
}

fn clamp_millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}
