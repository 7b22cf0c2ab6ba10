use std::collections::HashSet;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ProposalSource;
use crate::cache::Slot;
use crate::error::Result;

/// A document touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub number: String,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CommitSummary {
    sha: String,
    commit: CommitInfo,
}

#[derive(Debug, Deserialize)]
struct CommitInfo {
    author: Option<Signature>,
    committer: Option<Signature>,
}

#[derive(Debug, Deserialize)]
struct Signature {
    date: Option<DateTime<Utc>>,
}

impl CommitSummary {
    fn date(&self) -> Option<DateTime<Utc>> {
        self.commit
            .author
            .as_ref()
            .and_then(|s| s.date)
            .or_else(|| self.commit.committer.as_ref().and_then(|s| s.date))
    }
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    files: Vec<ChangedFile>,
}

#[derive(Debug, Deserialize)]
struct ChangedFile {
    filename: String,
}

/// Cached result of one mining run.
#[derive(Debug, Serialize, Deserialize)]
struct RecentChanges {
    limit: usize,
    events: Vec<ChangeEvent>,
}

impl RecentChanges {
    /// True when this run can answer a request for `limit` events: it was
    /// asked for at least as many, or the history ran out first.
    fn covers(&self, limit: usize) -> bool {
        self.limit >= limit || self.events.len() < self.limit
    }
}

struct Mined {
    events: Vec<ChangeEvent>,
    /// Commits whose detail fetch succeeded.
    inspected: usize,
    skipped: usize,
}

impl ProposalSource {
    /// Up to `limit` distinct documents touched by the newest commits,
    /// most recent first. Only the newest touch of each document counts.
    /// Never fails: upstream problems give an empty list.
    pub async fn find_recently_changed(&self, limit: usize) -> Vec<ChangeEvent> {
        if limit == 0 {
            return Vec::new();
        }
        if let Some(cached) = self
            .cache
            .load::<RecentChanges>(self.track, Slot::Recent)
            .await
        {
            if cached.covers(limit) {
                return cached.events.into_iter().take(limit).collect();
            }
            debug!(track = %self.track, cached = cached.limit, limit, "recent changes cached for a smaller limit");
        }

        match self.mine_changes(limit).await {
            Ok(mined) => {
                info!(
                    track = %self.track,
                    count = mined.events.len(),
                    skipped = mined.skipped,
                    "recent changes mined"
                );
                if mined.inspected == 0 && mined.skipped > 0 {
                    warn!(track = %self.track, "every commit lookup failed; not caching");
                } else {
                    let entry = RecentChanges {
                        limit,
                        events: mined.events.clone(),
                    };
                    self.cache.store(self.track, Slot::Recent, &entry).await;
                }
                mined.events
            }
            Err(e) => {
                warn!(track = %self.track, "recent change lookup failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn mine_changes(&self, limit: usize) -> Result<Mined> {
        let url = self
            .endpoints
            .commits(self.track, self.config.commit_page_size);
        let commits: Vec<CommitSummary> = self
            .transport
            .request(&url)
            .await?
            .error_for_status(&url)?
            .json("commit history")?;

        let mut seen = HashSet::new();
        let mut mined = Mined {
            events: Vec::new(),
            inspected: 0,
            skipped: 0,
        };
        for batch in commits.chunks(self.config.commit_batch_size.max(1)) {
            let details = join_all(batch.iter().map(|c| self.changed_files(&c.sha))).await;

            // Commits arrive newest first; keep that order within the batch.
            for (commit, files) in batch.iter().zip(details) {
                let Some(files) = files else {
                    mined.skipped += 1;
                    continue;
                };
                mined.inspected += 1;
                let Some(changed_at) = commit.date() else {
                    continue;
                };
                for file in files {
                    let Some(info) = self.track.parse_path(&file) else {
                        continue;
                    };
                    if seen.insert(info.number.clone()) {
                        mined.events.push(ChangeEvent {
                            number: info.number,
                            changed_at,
                        });
                        if mined.events.len() >= limit {
                            return Ok(mined);
                        }
                    }
                }
            }
        }
        Ok(mined)
    }

    async fn changed_files(&self, sha: &str) -> Option<Vec<String>> {
        let url = self.endpoints.commit(self.track, sha);
        let detail = async {
            self.transport
                .request(&url)
                .await?
                .error_for_status(&url)?
                .json::<CommitDetail>("commit detail")
        };
        match detail.await {
            Ok(detail) => Some(detail.files.into_iter().map(|f| f.filename).collect()),
            Err(e) => {
                debug!(sha, "skipping commit: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::config::FetchConfig;
    use crate::http::HttpResponse;
    use crate::proposals::Track;
    use crate::testing::{FakeHttp, Harness};

    fn commit(sha: &str, date: &str) -> serde_json::Value {
        json!({
            "sha": sha,
            "commit": {"author": {"date": date, "name": "someone"}},
            "author": {"login": "someone"}
        })
    }

    fn detail(files: &[&str]) -> HttpResponse {
        let files: Vec<_> = files.iter().map(|f| json!({ "filename": f })).collect();
        HttpResponse::new(200, json!({ "files": files }).to_string())
    }

    const KEP_5: &str = "keps/sig-node/5-five/kep.yaml";
    const KEP_9: &str = "keps/sig-node/9-nine/kep.yaml";

    fn history(http: &FakeHttp) {
        http.route(
            "/commits?path=keps",
            HttpResponse::new(
                200,
                json!([
                    commit("c1", "2025-02-05T10:00:00Z"),
                    commit("c2", "2025-02-04T10:00:00Z"),
                    commit("c3", "2025-02-03T10:00:00Z"),
                    commit("c4", "2025-02-02T10:00:00Z"),
                    commit("c5", "2025-02-01T10:00:00Z"),
                    commit("c6", "2025-01-31T10:00:00Z"),
                ])
                .to_string(),
            ),
        );
        http.route("/commits/c1", detail(&[KEP_5, "keps/sig-node/5-five/README.md"]));
        http.route("/commits/c2", detail(&["README.md"]));
        http.route("/commits/c3", detail(&[KEP_5]));
        http.route("/commits/c4", detail(&[KEP_9, KEP_5]));
        http.route("/commits/c5", detail(&["keps/sig-node/12-twelve/kep.yaml"]));
        http.route("/commits/c6", detail(&["keps/sig-node/13-thirteen/kep.yaml"]));
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn keeps_newest_touch_and_stops_early() {
        let http = FakeHttp::new();
        history(&http);
        let config = FetchConfig {
            commit_batch_size: 2,
            ..FetchConfig::default()
        };
        let harness = Harness::with_config(http.clone(), config);

        let events = harness
            .source(Track::Enhancements)
            .find_recently_changed(2)
            .await;

        assert_eq!(
            events,
            vec![
                ChangeEvent {
                    number: "5".into(),
                    changed_at: at("2025-02-05T10:00:00Z"),
                },
                ChangeEvent {
                    number: "9".into(),
                    changed_at: at("2025-02-02T10:00:00Z"),
                },
            ]
        );
        // Satisfied inside the second batch; the third is never fetched.
        assert_eq!(http.count("/commits/c5"), 0);
        assert_eq!(http.count("/commits/c6"), 0);
    }

    #[tokio::test]
    async fn failed_commit_details_are_skipped() {
        let http = FakeHttp::new();
        http.route("/commits/c1", HttpResponse::new(500, "boom"));
        history(&http);
        let harness = Harness::new(http);

        let events = harness
            .source(Track::Enhancements)
            .find_recently_changed(10)
            .await;

        let numbers: Vec<&str> = events.iter().map(|e| e.number.as_str()).collect();
        assert_eq!(numbers, vec!["5", "9", "12", "13"]);
        assert_eq!(events[0].changed_at, at("2025-02-03T10:00:00Z"));
    }

    #[tokio::test]
    async fn history_failure_gives_empty_list() {
        let http = FakeHttp::new();
        http.route("/commits?path=keps", HttpResponse::new(403, "forbidden"));
        let harness = Harness::new(http);

        let events = harness
            .source(Track::Enhancements)
            .find_recently_changed(5)
            .await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn larger_limit_mines_again() {
        let http = FakeHttp::new();
        history(&http);
        let harness = Harness::new(http.clone());
        let source = harness.source(Track::Enhancements);

        assert!(source.find_recently_changed(0).await.is_empty());
        let small = source.find_recently_changed(2).await;
        let big = source.find_recently_changed(5).await;
        let again = source.find_recently_changed(3).await;

        assert_eq!(small.len(), 2);
        let numbers: Vec<&str> = big.iter().map(|e| e.number.as_str()).collect();
        assert_eq!(numbers, vec!["5", "9", "12", "13"]);
        assert_eq!(again, big[..3].to_vec());
        assert_eq!(http.count("/commits?path=keps"), 2);
    }

    #[tokio::test]
    async fn exhausted_history_answers_larger_limits() {
        let http = FakeHttp::new();
        history(&http);
        let harness = Harness::new(http.clone());
        let source = harness.source(Track::Enhancements);

        assert_eq!(source.find_recently_changed(10).await.len(), 4);
        assert_eq!(source.find_recently_changed(20).await.len(), 4);
        assert_eq!(http.count("/commits?path=keps"), 1);
    }

    #[tokio::test]
    async fn all_failed_lookups_are_not_cached() {
        let http = FakeHttp::new();
        http.route("/commits/c", HttpResponse::new(500, "boom"));
        history(&http);
        let harness = Harness::new(http.clone());
        let source = harness.source(Track::Enhancements);

        assert!(source.find_recently_changed(3).await.is_empty());
        assert!(source.find_recently_changed(3).await.is_empty());
        assert_eq!(http.count("/commits?path=keps"), 2);
    }

    #[tokio::test]
    async fn results_are_cached() {
        let http = FakeHttp::new();
        history(&http);
        let harness = Harness::new(http.clone());
        let source = harness.source(Track::Enhancements);

        let first = source.find_recently_changed(3).await;
        let second = source.find_recently_changed(3).await;

        assert_eq!(first, second);
        assert_eq!(http.count("/commits?path=keps"), 1);
    }
}
