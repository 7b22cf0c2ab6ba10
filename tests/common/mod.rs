#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use kepler::cache::backend::{CacheBackend, MemoryBackend};
use kepler::cache::{CacheManager, PersistentCache};
use kepler::clock::ManualClock;
use kepler::config::FetchConfig;
use kepler::http::{HttpClient, HttpResponse};
use kepler::proposals::{Endpoints, ProposalSource, Track};
use kepler::rate_limit::RateLimitMonitor;
use kepler::transport::RateLimitedTransport;
use kepler::{CatalogError, Result};

pub const API: &str = "https://api.example";
pub const RAW: &str = "https://raw.example";

/// Serves a synthetic enhancements repository: a tree of `count` documents
/// and a metadata file for each, except the numbers listed in `broken`.
pub struct FakeRepo {
    count: usize,
    broken: HashSet<usize>,
    requests: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl FakeRepo {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            broken: HashSet::new(),
            requests: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_broken(mut self, numbers: &[usize]) -> Self {
        self.broken.extend(numbers.iter().copied());
        self
    }

    pub fn path(n: usize) -> String {
        format!("keps/sig-scenario/{}-doc-{}/kep.yaml", n, n)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Most metadata requests observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn requested(&self, fragment: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.contains(fragment))
            .count()
    }

    fn tree(&self) -> HttpResponse {
        let mut entries: Vec<serde_json::Value> = (1..=self.count)
            .map(|n| serde_json::json!({ "path": Self::path(n), "type": "blob" }))
            .collect();
        entries.push(serde_json::json!({ "path": "keps/README.md", "type": "blob" }));
        entries.push(serde_json::json!({ "path": "keps/sig-scenario", "type": "tree" }));
        HttpResponse::new(200, serde_json::json!({ "tree": entries }).to_string())
    }

    fn metadata(&self, url: &str) -> HttpResponse {
        let number = (1..=self.count).find(|n| url.ends_with(&Self::path(*n)));
        match number {
            Some(n) if self.broken.contains(&n) => HttpResponse::new(500, "upstream error"),
            Some(n) => HttpResponse::new(
                200,
                format!(
                    "title: Scenario document {}\nstatus: implementable\nauthors:\n  - \"@author{}\"\ncreation-date: \"2023-01-0{}\"\n",
                    n,
                    n,
                    n % 9 + 1
                ),
            ),
            None => HttpResponse::new(404, "Not Found"),
        }
    }
}

#[async_trait]
impl HttpClient for FakeRepo {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(url.to_string());

        // Only metadata fetches count towards the batch bound.
        let watched = url.ends_with("kep.yaml");
        if watched {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }
        tokio::task::yield_now().await;
        if watched {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        if url.contains("/git/trees/") {
            Ok(self.tree())
        } else if url.ends_with("kep.yaml") {
            Ok(self.metadata(url))
        } else if url.ends_with("README.md") {
            Ok(HttpResponse::new(404, "Not Found"))
        } else {
            Err(CatalogError::Network {
                url: url.to_string(),
                message: "unexpected request".to_string(),
            })
        }
    }
}

pub struct Setup {
    pub repo: Arc<FakeRepo>,
    pub clock: Arc<ManualClock>,
    pub cache: CacheManager,
    pub source: ProposalSource,
}

pub fn setup(repo: FakeRepo, config: FetchConfig) -> Setup {
    setup_with_backend(repo, config, Arc::new(MemoryBackend::new()))
}

pub fn setup_with_backend(
    repo: FakeRepo,
    config: FetchConfig,
    backend: Arc<dyn CacheBackend>,
) -> Setup {
    let repo = Arc::new(repo);
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
    ));
    let cache = CacheManager::new(PersistentCache::new(backend, clock.clone()));
    let transport = RateLimitedTransport::new(
        repo.clone(),
        RateLimitMonitor::new(),
        clock.clone(),
        &config,
    );
    let source = ProposalSource::new(
        Track::Enhancements,
        Arc::new(transport),
        cache.clone(),
        Endpoints::new(API, RAW),
        config,
    );
    Setup {
        repo,
        clock,
        cache,
        source,
    }
}
