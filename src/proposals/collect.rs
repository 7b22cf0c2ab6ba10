use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::types::{parse_metadata, DocumentRecord};
use super::{PathInfo, ProposalSource};
use crate::cache::{Scope, Slot};
use crate::error::{CatalogError, Result};

/// Bulk-load progress. `loaded` never decreases within a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub loaded: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.loaded >= self.total
    }
}

/// A document dropped from a bulk load.
#[derive(Debug)]
pub struct FetchFailure {
    pub path: String,
    pub error: CatalogError,
}

/// Per-batch result: what loaded and what did not.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub successes: Vec<DocumentRecord>,
    pub failures: Vec<FetchFailure>,
}

impl BatchOutcome {
    fn absorb(&mut self, other: BatchOutcome) {
        self.successes.extend(other.successes);
        self.failures.extend(other.failures);
    }
}

/// Result of one bulk load.
#[derive(Debug)]
pub struct LoadReport {
    /// Sorted by number, highest first.
    pub records: Vec<DocumentRecord>,
    pub failures: Vec<FetchFailure>,
    pub from_cache: bool,
}

/// A single document with its full narrative.
#[derive(Debug, Clone)]
pub struct DocumentDetail {
    pub record: DocumentRecord,
    pub narrative: Option<String>,
    /// True when upstream failed and the cached record was used instead.
    pub stale: bool,
}

impl ProposalSource {
    /// Every document of the track. Only a failed tree listing is an error;
    /// documents that fail individually are left out.
    pub async fn fetch_all<F>(&self, on_progress: F) -> Result<Vec<DocumentRecord>>
    where
        F: FnMut(Progress),
    {
        Ok(self.load(on_progress).await?.records)
    }

    /// Like `fetch_all`, keeping the list of failed documents.
    pub async fn load<F>(&self, mut on_progress: F) -> Result<LoadReport>
    where
        F: FnMut(Progress),
    {
        if let Some(records) = self
            .cache
            .load::<Vec<DocumentRecord>>(self.track, Slot::Collection)
            .await
        {
            let n = records.len();
            on_progress(Progress { loaded: n, total: n });
            return Ok(LoadReport {
                records,
                failures: Vec::new(),
                from_cache: true,
            });
        }

        let paths = self.resolve_paths().await?;
        let documents: Vec<(String, PathInfo)> = paths
            .into_iter()
            .filter_map(|path| self.track.parse_path(&path).map(|info| (path, info)))
            .collect();
        let total = documents.len();
        info!(track = %self.track, total, batch_size = self.config.batch_size, "fetching documents");

        let mut outcome = BatchOutcome::default();
        let mut loaded = 0;
        for batch in documents.chunks(self.config.batch_size.max(1)) {
            outcome.absorb(self.fetch_batch(batch).await);
            loaded = (loaded + batch.len()).min(total);
            on_progress(Progress { loaded, total });
        }

        let BatchOutcome {
            mut successes,
            failures,
        } = outcome;
        sort_by_number_desc(&mut successes);

        if !failures.is_empty() {
            warn!(
                track = %self.track,
                failed = failures.len(),
                loaded = successes.len(),
                "some documents failed to load"
            );
        }
        info!(track = %self.track, count = successes.len(), "collection assembled");

        self.cache.store(self.track, Slot::Collection, &successes).await;
        Ok(LoadReport {
            records: successes,
            failures,
            from_cache: false,
        })
    }

    /// Drop the tree and collection caches, then load again.
    pub async fn reload<F>(&self, on_progress: F) -> Result<LoadReport>
    where
        F: FnMut(Progress),
    {
        self.cache.invalidate(self.track, Scope::Collection).await;
        self.load(on_progress).await
    }

    /// All documents of one batch, concurrently. Every document settles
    /// before this returns.
    async fn fetch_batch(&self, batch: &[(String, PathInfo)]) -> BatchOutcome {
        let results = join_all(
            batch
                .iter()
                .map(|(path, info)| self.fetch_document(path, info)),
        )
        .await;

        let mut outcome = BatchOutcome::default();
        for ((path, _), result) in batch.iter().zip(results) {
            match result {
                Ok(record) => outcome.successes.push(record),
                Err(error) => {
                    debug!(path = %path, "document dropped: {}", error);
                    outcome.failures.push(FetchFailure {
                        path: path.clone(),
                        error,
                    });
                }
            }
        }
        outcome
    }

    /// Metadata (required) and narrative excerpt (optional), in parallel.
    async fn fetch_document(&self, path: &str, info: &PathInfo) -> Result<DocumentRecord> {
        let narrative_path = self.track.narrative_path(path);
        let (metadata, narrative) =
            tokio::join!(self.fetch_text(path), self.fetch_optional_text(&narrative_path));

        let mut record = parse_metadata(self.track, path, info, &metadata?)?;
        record.excerpt = narrative.map(|text| excerpt(&text, self.config.excerpt_chars));
        Ok(record)
    }

    /// One document with its full narrative. Falls back to the cached
    /// collection when upstream fails.
    pub async fn fetch_one(&self, number: &str) -> Result<DocumentDetail> {
        match self.fetch_detail(number).await {
            Ok(detail) => Ok(detail),
            Err(error) => {
                let cached = self
                    .cache
                    .load::<Vec<DocumentRecord>>(self.track, Slot::Collection)
                    .await
                    .and_then(|records| records.into_iter().find(|r| r.number == number));
                match cached {
                    Some(record) => {
                        warn!(track = %self.track, number, "serving cached document: {}", error);
                        Ok(DocumentDetail {
                            narrative: record.excerpt.clone(),
                            record,
                            stale: true,
                        })
                    }
                    None => Err(error),
                }
            }
        }
    }

    async fn fetch_detail(&self, number: &str) -> Result<DocumentDetail> {
        let path = match self.track.canonical_path(number) {
            Some(path) => path,
            None => self
                .resolve_paths()
                .await?
                .into_iter()
                .find(|path| {
                    self.track
                        .parse_path(path)
                        .is_some_and(|info| info.number == number)
                })
                .ok_or_else(|| CatalogError::NotFound {
                    number: number.to_string(),
                })?,
        };
        let info = self
            .track
            .parse_path(&path)
            .ok_or_else(|| CatalogError::NotFound {
                number: number.to_string(),
            })?;

        let narrative_path = self.track.narrative_path(&path);
        let (metadata, narrative) =
            tokio::join!(self.fetch_text(&path), self.fetch_optional_text(&narrative_path));

        let mut record = parse_metadata(self.track, &path, &info, &metadata?)?;
        record.excerpt = narrative
            .as_deref()
            .map(|text| excerpt(text, self.config.excerpt_chars));
        Ok(DocumentDetail {
            record,
            narrative,
            stale: false,
        })
    }

    async fn fetch_text(&self, path: &str) -> Result<String> {
        let url = self.endpoints.raw(self.track, path);
        Ok(self.transport.request(&url).await?.error_for_status(&url)?.body)
    }

    async fn fetch_optional_text(&self, path: &str) -> Option<String> {
        match self.fetch_text(path).await {
            Ok(text) => Some(text),
            Err(e) => {
                debug!(path, "narrative unavailable: {}", e);
                None
            }
        }
    }
}

/// Numeric, highest first. Unnumbered documents go last.
pub fn sort_by_number_desc(records: &mut [DocumentRecord]) {
    records.sort_by(|a, b| b.number_value().cmp(&a.number_value()));
}

/// First `max_chars` characters, cut on a char boundary.
fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::FetchConfig;
    use crate::http::HttpResponse;
    use crate::proposals::Track;
    use crate::testing::{kep_yaml, FakeHttp, Harness};

    fn listing(paths: &[String]) -> HttpResponse {
        let tree: Vec<_> = paths
            .iter()
            .map(|p| serde_json::json!({"path": p, "type": "blob"}))
            .collect();
        HttpResponse::new(200, serde_json::json!({ "tree": tree }).to_string())
    }

    fn kep_path(n: usize) -> String {
        format!("keps/sig-test/{}-doc-{}/kep.yaml", n, n)
    }

    fn serve_keps(http: &FakeHttp, numbers: &[usize]) {
        let paths: Vec<String> = numbers.iter().map(|n| kep_path(*n)).collect();
        http.route("/git/trees/HEAD", listing(&paths));
        for n in numbers {
            http.route(
                &kep_path(*n),
                HttpResponse::new(200, kep_yaml(&format!("Doc {}", n), "implementable")),
            );
        }
    }

    #[tokio::test]
    async fn sorts_numerically_and_keeps_excerpts() {
        let http = FakeHttp::new();
        serve_keps(&http, &[7, 70, 12]);
        http.route(
            "keps/sig-test/70-doc-70/README.md",
            HttpResponse::new(200, "# Doc 70\n\nSummary"),
        );
        let harness = Harness::new(http);

        let records = harness
            .source(Track::Enhancements)
            .fetch_all(|_| {})
            .await
            .unwrap();

        let numbers: Vec<&str> = records.iter().map(|r| r.number.as_str()).collect();
        assert_eq!(numbers, vec!["70", "12", "7"]);
        assert_eq!(records[0].excerpt.as_deref(), Some("# Doc 70\n\nSummary"));
        assert_eq!(records[1].excerpt, None);
    }

    #[tokio::test]
    async fn bounds_concurrency_and_reports_each_batch() {
        let http = FakeHttp::new();
        let numbers: Vec<usize> = (1..=10).collect();
        serve_keps(&http, &numbers);
        let config = FetchConfig {
            batch_size: 4,
            ..FetchConfig::default()
        };
        let harness = Harness::with_config(http.clone(), config);

        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let records = harness
            .source(Track::Enhancements)
            .fetch_all(move |p| sink.lock().unwrap().push((p.loaded, p.total)))
            .await
            .unwrap();

        assert_eq!(records.len(), 10);
        assert_eq!(*calls.lock().unwrap(), vec![(4, 10), (8, 10), (10, 10)]);
        assert!(http.max_in_flight() <= 4);
        assert!(http.max_in_flight() > 1);
    }

    #[tokio::test]
    async fn failures_are_dropped_and_reported() {
        let http = FakeHttp::new();
        http.route(&kep_path(3), HttpResponse::new(500, "oops"));
        http.route(&kep_path(4), HttpResponse::new(200, "title: [broken"));
        http.fail(&kep_path(5));
        serve_keps(&http, &[1, 2, 3, 4, 5]);
        let harness = Harness::new(http);

        let report = harness
            .source(Track::Enhancements)
            .load(|_| {})
            .await
            .unwrap();

        let numbers: Vec<&str> = report.records.iter().map(|r| r.number.as_str()).collect();
        assert_eq!(numbers, vec!["2", "1"]);
        assert_eq!(report.failures.len(), 3);
        assert!(report
            .failures
            .iter()
            .any(|f| matches!(f.error, CatalogError::RemoteApi { status: 500, .. })));
        assert!(!report.from_cache);
    }

    #[tokio::test]
    async fn cached_collection_skips_the_network() {
        let http = FakeHttp::new();
        serve_keps(&http, &[1, 2]);
        let harness = Harness::new(http.clone());
        let source = harness.source(Track::Enhancements);

        let first = source.fetch_all(|_| {}).await.unwrap();
        let requests = http.count("https://");

        let mut progress = Vec::new();
        let second = source.fetch_all(|p| progress.push(p)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(http.count("https://"), requests);
        assert_eq!(progress, vec![Progress { loaded: 2, total: 2 }]);
    }

    #[tokio::test]
    async fn reload_refetches_tree_and_documents() {
        let http = FakeHttp::new();
        serve_keps(&http, &[1]);
        let harness = Harness::new(http.clone());
        let source = harness.source(Track::Enhancements);

        source.fetch_all(|_| {}).await.unwrap();
        let report = source.reload(|_| {}).await.unwrap();

        assert!(!report.from_cache);
        assert_eq!(http.count("/git/trees/HEAD"), 2);
        assert_eq!(http.count(&kep_path(1)), 2);
    }

    #[tokio::test]
    async fn expired_collection_is_refetched() {
        let http = FakeHttp::new();
        serve_keps(&http, &[1]);
        let harness = Harness::new(http.clone());
        let source = harness.source(Track::Enhancements);

        source.fetch_all(|_| {}).await.unwrap();
        harness.clock.advance(chrono::Duration::hours(7));
        source.fetch_all(|_| {}).await.unwrap();

        assert_eq!(http.count(&kep_path(1)), 2);
        assert_eq!(http.count("/git/trees/HEAD"), 2);
    }

    #[tokio::test]
    async fn fetch_one_builds_gateway_paths() {
        let http = FakeHttp::new();
        http.route(
            "geps/gep-1713/metadata.yaml",
            HttpResponse::new(200, "number: 1713\nname: ListenerSets\nstatus: Experimental\n"),
        );
        http.route("geps/gep-1713/index.md", HttpResponse::new(200, "# GEP-1713"));
        let harness = Harness::new(http.clone());

        let detail = harness.source(Track::Gateway).fetch_one("1713").await.unwrap();
        assert_eq!(detail.record.title, "ListenerSets");
        assert_eq!(detail.narrative.as_deref(), Some("# GEP-1713"));
        assert!(!detail.stale);
        assert_eq!(http.count("/git/trees/HEAD"), 0);
    }

    #[tokio::test]
    async fn fetch_one_falls_back_to_cache_then_fails() {
        let http = FakeHttp::new();
        serve_keps(&http, &[9]);
        let harness = Harness::new(http);
        let source = harness.source(Track::Enhancements);
        source.fetch_all(|_| {}).await.unwrap();

        // Upstream now refuses every request.
        let broken = FakeHttp::new();
        broken.route("https://", HttpResponse::new(503, "down"));
        let harness_broken = Harness {
            http: broken,
            clock: harness.clock.clone(),
            cache: harness.cache.clone(),
            monitor: harness.monitor.clone(),
            config: harness.config.clone(),
        };
        let source = harness_broken.source(Track::Enhancements);

        let detail = source.fetch_one("9").await.unwrap();
        assert!(detail.stale);
        assert_eq!(detail.record.number, "9");

        let missing = source.fetch_one("10").await.unwrap_err();
        assert!(matches!(missing, CatalogError::NotFound { .. }));
    }

    #[test]
    fn excerpt_cuts_on_char_boundary() {
        assert_eq!(excerpt("héllo", 2), "hé");
        assert_eq!(excerpt("hi", 10), "hi");
    }
}
