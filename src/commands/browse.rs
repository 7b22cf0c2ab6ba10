use std::collections::HashSet;

use tracing::info;

use kepler::clock::Clock;
use kepler::proposals::Track;
use kepler::view::{self, Facet, FilterState, PageState, Selection, SortDirection, SortState};

use super::{send_chunked, summary_line, SortChoice, TrackChoice};
use crate::state::Context;

/// Comma-separated values become a selection; absent means no filter.
fn selection(raw: Option<String>) -> Selection {
    match raw {
        None => Selection::Unset,
        Some(raw) => Selection::only(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>(),
        ),
    }
}

/// Search and filter a collection
#[poise::command(slash_command)]
#[allow(clippy::too_many_arguments)]
pub async fn list(
    ctx: Context<'_>,
    #[description = "Collection"] track: TrackChoice,
    #[description = "Text in title, number, authors, slug or summary"] query: Option<String>,
    #[description = "Status (comma-separated)"]
    #[autocomplete = "autocomplete_status"]
    status: Option<String>,
    #[description = "Owning SIG (comma-separated)"]
    #[autocomplete = "autocomplete_group"]
    group: Option<String>,
    #[description = "Stage (comma-separated)"]
    #[autocomplete = "autocomplete_stage"]
    stage: Option<String>,
    #[description = "Only early-status documents untouched for a year"] stale: Option<bool>,
    #[description = "Only your bookmarks"] bookmarked: Option<bool>,
    #[description = "Sort column"] sort: Option<SortChoice>,
    #[description = "Ascending order"] ascending: Option<bool>,
    #[description = "Page (48 per page)"] page: Option<u32>,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;
    let track = Track::from(track);
    let data = ctx.data();
    let records = data.catalog(track).ensure_loaded().await?;

    let bookmarks: HashSet<String> = if bookmarked.unwrap_or(false) {
        data.bookmarks
            .list(track, &ctx.author().id.to_string())
            .await
            .into_iter()
            .collect()
    } else {
        HashSet::new()
    };

    let filter = FilterState {
        query: query.unwrap_or_default(),
        groups: selection(group),
        statuses: selection(status),
        stages: selection(stage),
        stale_only: stale.unwrap_or(false),
        bookmarked_only: bookmarked.unwrap_or(false),
    };
    let sort = SortState {
        key: sort.map(Into::into).unwrap_or_default(),
        direction: match ascending {
            Some(true) => SortDirection::Ascending,
            _ => SortDirection::Descending,
        },
    };
    let page = PageState {
        page: page.unwrap_or(1) as usize,
        ..PageState::default()
    };

    let shown = view::project(&records, &filter, sort, page, &bookmarks, data.clock.now());
    info!(
        user = ctx.author().name,
        track = %track,
        matches = shown.total_matches,
        page = shown.page,
        "list"
    );

    if shown.items.is_empty() {
        ctx.say(format!("No {}s match those filters.", track.label()))
            .await?;
        return Ok(());
    }

    let mut out = format!(
        "**{}s** page {}/{}: {} of {} match\n\n",
        track.label(),
        shown.page,
        shown.total_pages,
        shown.total_matches,
        records.len()
    );
    for record in &shown.items {
        out.push_str(&summary_line(record));
        out.push('\n');
    }
    send_chunked(&ctx, &out).await
}

/// Show one document with its summary
#[poise::command(slash_command)]
pub async fn show(
    ctx: Context<'_>,
    #[description = "Collection"] track: TrackChoice,
    #[description = "Document number"] number: u32,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;
    let track = Track::from(track);
    let data = ctx.data();
    let number = number.to_string();

    let detail = match data.catalog(track).source().fetch_one(&number).await {
        Ok(detail) => detail,
        Err(e) => {
            ctx.say(format!("Could not load {}-{}: {}", track.label(), number, e))
                .await?;
            return Ok(());
        }
    };
    let record = &detail.record;
    let bookmarked = data
        .bookmarks
        .contains(track, &ctx.author().id.to_string(), &number)
        .await;

    let mut out = format!(
        "## {}{}: {}\n",
        record.handle(),
        if bookmarked { " (bookmarked)" } else { "" },
        record.title
    );
    if detail.stale {
        out.push_str("_Upstream unavailable, showing the cached copy._\n");
    }
    let mut field = |name: &str, value: Option<&str>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            out.push_str(&format!("**{}:** {}\n", name, value));
        }
    };
    field("Status", record.status.as_deref());
    field("Stage", record.stage.as_deref());
    field("SIG", record.group.as_deref());
    field("Authors", Some(record.authors.join(", ").as_str()));
    field("Created", record.creation_date.as_deref());
    field("Last updated", record.last_updated.as_deref());
    field("Latest milestone", record.latest_milestone.as_deref());
    field("Alpha", record.milestone.alpha.as_deref());
    field("Beta", record.milestone.beta.as_deref());
    field("Stable", record.milestone.stable.as_deref());
    field("Stale", view::is_stale(record, data.clock.now()).then_some("yes"));

    let related: Vec<String> = record
        .relationships
        .extends
        .iter()
        .map(|r| format!("extends GEP-{}", r.number))
        .chain(
            record
                .relationships
                .obsoletes
                .iter()
                .map(|r| format!("obsoletes GEP-{}", r.number)),
        )
        .chain(
            record
                .relationships
                .see_also
                .iter()
                .map(|r| format!("see GEP-{}", r.number)),
        )
        .collect();
    if !related.is_empty() {
        out.push_str(&format!("**Related:** {}\n", related.join(", ")));
    }

    out.push_str(&format!(
        "\n<{}>\nApp: `{}`\n",
        record.web_url,
        data.settings.app_link(track.route(), &number)
    ));
    if let Some(narrative) = detail.narrative.as_deref() {
        let preview: String = narrative.chars().take(1500).collect();
        out.push_str("\n>>> ");
        out.push_str(preview.trim());
        out.push('\n');
    }
    send_chunked(&ctx, &out).await
}

async fn facet_options(ctx: Context<'_>, facet: Facet, partial: &str) -> Vec<String> {
    let partial = partial.to_lowercase();
    let data = ctx.data();
    let mut values = Vec::new();
    for track in Track::ALL {
        if let Some(records) = data.catalog(track).current().records() {
            values.extend(view::facet_values(records, facet));
        }
    }
    values.sort();
    values.dedup();
    values
        .into_iter()
        .filter(|v| v.to_lowercase().contains(&partial))
        .take(25)
        .collect()
}

async fn autocomplete_status(ctx: Context<'_>, partial: &str) -> Vec<String> {
    facet_options(ctx, Facet::Status, partial).await
}

async fn autocomplete_group(ctx: Context<'_>, partial: &str) -> Vec<String> {
    facet_options(ctx, Facet::Group, partial).await
}

async fn autocomplete_stage(ctx: Context<'_>, partial: &str) -> Vec<String> {
    facet_options(ctx, Facet::Stage, partial).await
}
