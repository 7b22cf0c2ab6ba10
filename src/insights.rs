//! Aggregate views over a loaded collection: counts, releases and the
//! "what's new" feed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::proposals::activity::ChangeEvent;
use crate::proposals::types::DocumentRecord;
use crate::view::index_by_number;

pub const TOP_GROUPS: usize = 20;
pub const WHATS_NEW_LIMIT: usize = 10;

static VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.(\d+)").expect("valid version regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Count {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Insights {
    /// Largest groups first, at most `TOP_GROUPS`.
    pub by_group: Vec<Count>,
    /// Oldest year first.
    pub by_year: Vec<Count>,
    /// Most common status first. Missing status counts as `unknown`.
    pub by_status: Vec<Count>,
}

pub fn insights(records: &[DocumentRecord]) -> Insights {
    let mut by_group = tally(records.iter().filter_map(|r| r.group.as_deref()));
    by_group.truncate(TOP_GROUPS);

    let by_year = records
        .iter()
        .filter_map(|r| creation_year(r.creation_date.as_deref()?))
        .fold(BTreeMap::<&str, usize>::new(), |mut acc, year| {
            *acc.entry(year).or_default() += 1;
            acc
        })
        .into_iter()
        .map(|(label, count)| Count {
            label: label.to_string(),
            count,
        })
        .collect();

    let by_status = tally(
        records
            .iter()
            .map(|r| r.status.as_deref().unwrap_or("unknown")),
    );

    Insights {
        by_group,
        by_year,
        by_status,
    }
}

/// Descending by count, ties by label.
fn tally<'a>(values: impl Iterator<Item = &'a str>) -> Vec<Count> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    let mut out: Vec<Count> = counts
        .into_iter()
        .map(|(label, count)| Count {
            label: label.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    out
}

fn creation_year(date: &str) -> Option<&str> {
    let year = date.get(..4)?;
    year.bytes().all(|b| b.is_ascii_digit()).then_some(year)
}

/// `v1.27.0` -> `1.27`. Anything without a leading `major.minor` is `None`.
pub fn normalize_version(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let caps = VERSION.captures(trimmed)?;
    Some(format!("{}.{}", &caps[1], &caps[2]))
}

fn version_key(version: &str) -> (u64, u64) {
    let mut parts = version.split('.').map(|p| p.parse().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

/// Every release named in a milestone, oldest first.
pub fn release_versions(records: &[DocumentRecord]) -> Vec<String> {
    let versions: BTreeSet<String> = records
        .iter()
        .flat_map(|r| {
            [&r.milestone.alpha, &r.milestone.beta, &r.milestone.stable]
                .into_iter()
                .filter_map(|m| m.as_deref().and_then(normalize_version))
        })
        .collect();
    let mut versions: Vec<String> = versions.into_iter().collect();
    versions.sort_by_key(|v| version_key(v));
    versions
}

/// What happened in one release.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseGroups<'a> {
    pub stable: Vec<&'a DocumentRecord>,
    pub beta: Vec<&'a DocumentRecord>,
    pub alpha: Vec<&'a DocumentRecord>,
}

impl ReleaseGroups<'_> {
    pub fn is_empty(&self) -> bool {
        self.stable.is_empty() && self.beta.is_empty() && self.alpha.is_empty()
    }
}

/// A document appears in every stage it reached in `version`.
pub fn release_groups<'a>(records: &'a [DocumentRecord], version: &str) -> ReleaseGroups<'a> {
    let Some(version) = normalize_version(version) else {
        return ReleaseGroups::default();
    };
    let at = |m: &Option<String>| m.as_deref().and_then(normalize_version).as_deref() == Some(version.as_str());

    let mut groups = ReleaseGroups::default();
    for record in records {
        if at(&record.milestone.stable) {
            groups.stable.push(record);
        }
        if at(&record.milestone.beta) {
            groups.beta.push(record);
        }
        if at(&record.milestone.alpha) {
            groups.alpha.push(record);
        }
    }
    groups
}

/// Recent changes joined to the collection. The newest `WHATS_NEW_LIMIT`
/// changes are considered; those not in the collection are dropped.
pub fn whats_new<'a>(
    records: &'a [DocumentRecord],
    changes: &[ChangeEvent],
) -> Vec<(&'a DocumentRecord, DateTime<Utc>)> {
    let index = index_by_number(records);
    changes
        .iter()
        .take(WHATS_NEW_LIMIT)
        .filter_map(|change| {
            index
                .get(change.number.as_str())
                .map(|record| (*record, change.changed_at))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::proposals::types::parse_metadata;
    use crate::proposals::Track;

    fn kep(number: u32, sig: &str, yaml: &str) -> DocumentRecord {
        let path = format!("keps/{}/{}-x/kep.yaml", sig, number);
        let info = Track::Enhancements.parse_path(&path).unwrap();
        parse_metadata(Track::Enhancements, &path, &info, yaml).unwrap()
    }

    #[test]
    fn normalizes_versions() {
        assert_eq!(normalize_version("v1.27"), Some("1.27".into()));
        assert_eq!(normalize_version("1.9.3"), Some("1.9".into()));
        assert_eq!(normalize_version("next"), None);
        assert_eq!(normalize_version(""), None);
    }

    #[test]
    fn releases_sort_numerically() {
        let records = vec![
            kep(1, "sig-node", "milestone:\n  alpha: v1.9\n  beta: v1.10\n"),
            kep(2, "sig-node", "milestone:\n  alpha: \"v1.2\"\n  stable: v1.10.0\n"),
        ];
        assert_eq!(release_versions(&records), vec!["1.2", "1.9", "1.10"]);
    }

    #[test]
    fn groups_by_stage_reached() {
        let records = vec![
            kep(1, "sig-node", "milestone:\n  alpha: v1.9\n  beta: v1.10\n"),
            kep(2, "sig-node", "milestone:\n  stable: v1.10.0\n"),
            kep(3, "sig-node", "milestone:\n  alpha: v1.10\n  beta: v1.10\n"),
        ];
        let groups = release_groups(&records, "v1.10");
        let numbers = |v: &[&DocumentRecord]| v.iter().map(|r| r.number.clone()).collect::<Vec<_>>();
        assert_eq!(numbers(&groups.stable), vec!["2"]);
        assert_eq!(numbers(&groups.beta), vec!["1", "3"]);
        assert_eq!(numbers(&groups.alpha), vec!["3"]);
        assert!(release_groups(&records, "1.99").is_empty());
    }

    #[test]
    fn counts_groups_years_and_statuses() {
        let records = vec![
            kep(1, "sig-node", "status: implemented\ncreation-date: 2019-01-02\n"),
            kep(2, "sig-node", "status: provisional\ncreation-date: \"2021-05-01\"\n"),
            kep(3, "sig-auth", "status: implemented\ncreation-date: someday\n"),
            kep(4, "sig-auth", ""),
            kep(5, "sig-apps", "status: implemented\n"),
        ];
        let stats = insights(&records);

        let pairs = |c: &[Count]| {
            c.iter()
                .map(|c| (c.label.clone(), c.count))
                .collect::<Vec<_>>()
        };
        assert_eq!(
            pairs(&stats.by_group),
            vec![
                ("sig-auth".into(), 2),
                ("sig-node".into(), 2),
                ("sig-apps".into(), 1)
            ]
        );
        assert_eq!(
            pairs(&stats.by_year),
            vec![("2019".into(), 1), ("2021".into(), 1)]
        );
        assert_eq!(
            pairs(&stats.by_status),
            vec![
                ("implemented".into(), 3),
                ("provisional".into(), 1),
                ("unknown".into(), 1)
            ]
        );
    }

    #[test]
    fn group_counts_are_capped() {
        let records: Vec<DocumentRecord> = (0..30)
            .map(|n| kep(n, &format!("sig-{:02}", n), ""))
            .collect();
        assert_eq!(insights(&records).by_group.len(), TOP_GROUPS);
    }

    #[test]
    fn whats_new_joins_and_caps() {
        let records = vec![kep(1, "sig-node", ""), kep(2, "sig-node", "")];
        let when: DateTime<Utc> = "2025-02-01T00:00:00Z".parse().unwrap();
        let mut changes: Vec<ChangeEvent> = vec![
            ChangeEvent { number: "2".into(), changed_at: when },
            ChangeEvent { number: "404".into(), changed_at: when },
        ];
        for n in 100..120 {
            changes.push(ChangeEvent { number: n.to_string(), changed_at: when });
        }
        changes.push(ChangeEvent { number: "1".into(), changed_at: when });

        let joined = whats_new(&records, &changes);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].0.number, "2");
    }
}
