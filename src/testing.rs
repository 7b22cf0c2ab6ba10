//! Scripted HTTP and a ready-made source for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::cache::backend::MemoryBackend;
use crate::cache::{CacheManager, PersistentCache};
use crate::clock::ManualClock;
use crate::config::FetchConfig;
use crate::error::{CatalogError, Result};
use crate::http::{HttpClient, HttpResponse};
use crate::proposals::{Endpoints, ProposalSource, Track};
use crate::rate_limit::RateLimitMonitor;
use crate::transport::RateLimitedTransport;

#[derive(Default)]
struct Inner {
    routes: Vec<(String, Result<HttpResponse, String>)>,
    hits: Vec<String>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Responses keyed by URL substring; the first registered match wins.
/// Unrouted URLs get a 404.
#[derive(Clone, Default)]
pub struct FakeHttp {
    inner: Arc<Mutex<Inner>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, pattern: &str, response: HttpResponse) {
        self.inner
            .lock()
            .unwrap()
            .routes
            .push((pattern.to_string(), Ok(response)));
    }

    pub fn fail(&self, pattern: &str) {
        self.inner
            .lock()
            .unwrap()
            .routes
            .push((pattern.to_string(), Err("connection reset".to_string())));
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .hits
            .iter()
            .filter(|url| url.contains(pattern))
            .count()
    }

    /// Most metadata (`.yaml`) requests observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.inner.lock().unwrap().max_in_flight
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let watched = url.ends_with(".yaml");
        {
            let mut inner = self.inner.lock().unwrap();
            inner.hits.push(url.to_string());
            if watched {
                inner.in_flight += 1;
                inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
            }
        }

        // Let the rest of the batch start before answering.
        tokio::task::yield_now().await;

        let mut inner = self.inner.lock().unwrap();
        if watched {
            inner.in_flight -= 1;
        }
        match inner.routes.iter().find(|(pattern, _)| url.contains(pattern.as_str())) {
            Some((_, Ok(response))) => Ok(response.clone()),
            Some((_, Err(message))) => Err(CatalogError::Network {
                url: url.to_string(),
                message: message.clone(),
            }),
            None => Ok(HttpResponse::new(404, "Not Found")),
        }
    }
}

pub struct Harness {
    pub http: FakeHttp,
    pub clock: Arc<ManualClock>,
    pub cache: CacheManager,
    pub monitor: RateLimitMonitor,
    pub config: FetchConfig,
}

impl Harness {
    pub fn new(http: FakeHttp) -> Self {
        Self::with_config(http, FetchConfig::default())
    }

    pub fn with_config(http: FakeHttp, config: FetchConfig) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        ));
        let cache = CacheManager::new(PersistentCache::new(
            Arc::new(MemoryBackend::new()),
            clock.clone(),
        ));
        Self {
            http,
            clock,
            cache,
            monitor: RateLimitMonitor::new(),
            config,
        }
    }

    pub fn source(&self, track: Track) -> ProposalSource {
        let transport = RateLimitedTransport::new(
            Arc::new(self.http.clone()),
            self.monitor.clone(),
            self.clock.clone(),
            &self.config,
        );
        ProposalSource::new(
            track,
            Arc::new(transport),
            self.cache.clone(),
            Endpoints::new("https://api.test", "https://raw.test"),
            self.config.clone(),
        )
    }
}

/// Minimal KEP metadata body.
pub fn kep_yaml(title: &str, status: &str) -> String {
    format!("title: {}\nstatus: {}\nauthors:\n  - \"@someone\"\n", title, status)
}
