//! Filtering, sorting and pagination over a loaded collection. Everything
//! here is pure and cheap enough to recompute on every input change.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};

use crate::proposals::types::DocumentRecord;

pub const PAGE_SIZE: usize = 48;
pub const STALE_AFTER_DAYS: i64 = 365;
const STALE_STATUSES: &[&str] = &["provisional", "implementable"];

/// A categorical filter. "Nothing selected" is its own state and is not the
/// same as "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    Unset,
    Only(BTreeSet<String>),
    Nothing,
}

impl Selection {
    /// An empty set means "nothing selected".
    pub fn only<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if set.is_empty() {
            Selection::Nothing
        } else {
            Selection::Only(set)
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Selection::Unset)
    }

    pub fn matches(&self, value: Option<&str>) -> bool {
        match self {
            Selection::Unset => true,
            Selection::Nothing => false,
            Selection::Only(set) => value.is_some_and(|v| set.contains(v)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub query: String,
    pub groups: Selection,
    pub statuses: Selection,
    pub stages: Selection,
    pub stale_only: bool,
    pub bookmarked_only: bool,
}

impl FilterState {
    pub fn is_active(&self) -> bool {
        !self.query.trim().is_empty()
            || self.groups.is_active()
            || self.statuses.is_active()
            || self.stages.is_active()
            || self.stale_only
            || self.bookmarked_only
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Number,
    Title,
    Group,
    Status,
    Stage,
    LastUpdated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortState {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortState {
    /// Clicking the active column flips direction; a new column starts ascending.
    pub fn select(self, key: SortKey) -> Self {
        if self.key == key {
            Self {
                key,
                direction: self.direction.toggled(),
            }
        } else {
            Self {
                key,
                direction: SortDirection::Ascending,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageState {
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewPage<'a> {
    pub items: Vec<&'a DocumentRecord>,
    /// The page actually shown after clamping.
    pub page: usize,
    pub total_pages: usize,
    pub total_matches: usize,
}

/// Filter, sort and slice one page.
pub fn project<'a>(
    records: &'a [DocumentRecord],
    filter: &FilterState,
    sort: SortState,
    page: PageState,
    bookmarks: &HashSet<String>,
    now: DateTime<Utc>,
) -> ViewPage<'a> {
    let mut matches = apply_filter(records, filter, bookmarks, now);
    sort_records(&mut matches, sort);
    paginate(matches, page)
}

pub fn apply_filter<'a>(
    records: &'a [DocumentRecord],
    filter: &FilterState,
    bookmarks: &HashSet<String>,
    now: DateTime<Utc>,
) -> Vec<&'a DocumentRecord> {
    let query = filter.query.trim().to_lowercase();
    records
        .iter()
        .filter(|r| query.is_empty() || matches_query(r, &query))
        .filter(|r| filter.groups.matches(r.group.as_deref()))
        .filter(|r| filter.statuses.matches(r.status.as_deref()))
        .filter(|r| filter.stages.matches(r.stage.as_deref()))
        .filter(|r| !filter.stale_only || is_stale(r, now))
        .filter(|r| !filter.bookmarked_only || bookmarks.contains(&r.number))
        .collect()
}

/// `query` must already be lowercase.
fn matches_query(record: &DocumentRecord, query: &str) -> bool {
    let hit = |s: &str| s.to_lowercase().contains(query);
    hit(&record.title)
        || hit(&record.number)
        || record.authors.iter().any(|a| hit(a))
        || record.slug.as_deref().is_some_and(hit)
        || record.excerpt.as_deref().is_some_and(hit)
}

/// Early-status documents with no activity for a year. Missing or
/// unreadable dates never count as stale.
pub fn is_stale(record: &DocumentRecord, now: DateTime<Utc>) -> bool {
    let early = record
        .status
        .as_deref()
        .is_some_and(|s| STALE_STATUSES.contains(&s));
    if !early {
        return false;
    }
    match record.best_date().and_then(parse_date) {
        Some(date) => now - date > chrono::Duration::days(STALE_AFTER_DAYS),
        None => false,
    }
}

/// `2021-01-31` or RFC 3339.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Stable: ties keep their input order.
pub fn sort_records(records: &mut [&DocumentRecord], sort: SortState) {
    records.sort_by(|a, b| {
        let ord = compare(a, b, sort.key);
        match sort.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
}

fn compare(a: &DocumentRecord, b: &DocumentRecord, key: SortKey) -> Ordering {
    let text = |r: &DocumentRecord| -> String {
        match key {
            SortKey::Title => r.title.to_lowercase(),
            SortKey::Group => r.group.as_deref().unwrap_or_default().to_lowercase(),
            SortKey::Status => r.status.as_deref().unwrap_or_default().to_lowercase(),
            SortKey::Stage => r.stage.as_deref().unwrap_or_default().to_lowercase(),
            SortKey::LastUpdated => r.best_date().unwrap_or_default().to_lowercase(),
            SortKey::Number => String::new(),
        }
    };
    match key {
        SortKey::Number => a.number_value().cmp(&b.number_value()),
        _ => text(a).cmp(&text(b)),
    }
}

pub fn paginate<'a>(records: Vec<&'a DocumentRecord>, page: PageState) -> ViewPage<'a> {
    let page_size = page.page_size.max(1);
    let total_matches = records.len();
    let total_pages = total_matches.div_ceil(page_size).max(1);
    let current = page.page.clamp(1, total_pages);
    let items = records
        .into_iter()
        .skip((current - 1) * page_size)
        .take(page_size)
        .collect();
    ViewPage {
        items,
        page: current,
        total_pages,
        total_matches,
    }
}

/// Lookup by number. With duplicate numbers the later record wins.
pub fn index_by_number(records: &[DocumentRecord]) -> HashMap<&str, &DocumentRecord> {
    records.iter().map(|r| (r.number.as_str(), r)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facet {
    Group,
    Status,
    Stage,
}

/// Distinct values of a facet, sorted, for filter option lists.
pub fn facet_values(records: &[DocumentRecord], facet: Facet) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| match facet {
            Facet::Group => r.group.clone(),
            Facet::Status => r.status.clone(),
            Facet::Stage => r.stage.clone(),
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
