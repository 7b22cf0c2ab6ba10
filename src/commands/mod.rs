mod activity;
mod admin;
mod bookmark;
mod browse;
mod stats;

use kepler::proposals::types::DocumentRecord;
use kepler::proposals::Track;
use kepler::view::SortKey;

use crate::state::Context;

/// Discord caps a message at 2000 characters.
const CHUNK_LIMIT: usize = 1990;

/// Kepler - browse Kubernetes KEPs and Gateway API GEPs
#[poise::command(
    slash_command,
    subcommands(
        "browse::list",
        "browse::show",
        "activity::recent",
        "bookmark::bookmark",
        "stats::stats",
        "stats::release",
        "admin::reload",
        "admin::ratelimit"
    )
)]
pub async fn kepler(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum TrackChoice {
    #[name = "KEP"]
    Kep,
    #[name = "GEP"]
    Gep,
}

impl From<TrackChoice> for Track {
    fn from(choice: TrackChoice) -> Self {
        match choice {
            TrackChoice::Kep => Track::Enhancements,
            TrackChoice::Gep => Track::Gateway,
        }
    }
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum SortChoice {
    #[name = "number"]
    Number,
    #[name = "title"]
    Title,
    #[name = "group"]
    Group,
    #[name = "status"]
    Status,
    #[name = "stage"]
    Stage,
    #[name = "last updated"]
    LastUpdated,
}

impl From<SortChoice> for SortKey {
    fn from(choice: SortChoice) -> Self {
        match choice {
            SortChoice::Number => SortKey::Number,
            SortChoice::Title => SortKey::Title,
            SortChoice::Group => SortKey::Group,
            SortChoice::Status => SortKey::Status,
            SortChoice::Stage => SortKey::Stage,
            SortChoice::LastUpdated => SortKey::LastUpdated,
        }
    }
}

/// One-line summary used by every listing.
fn summary_line(record: &DocumentRecord) -> String {
    let mut line = format!("**[{}]({})** {}", record.handle(), record.web_url, record.title);
    let tags: Vec<&str> = [
        record.status.as_deref(),
        record.stage.as_deref(),
        record.group.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !tags.is_empty() {
        line.push_str(&format!(" `{}`", tags.join(" | ")));
    }
    line
}

/// Split on line breaks where possible, never inside a character.
fn chunks(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= CHUNK_LIMIT {
            out.push(remaining);
            break;
        }
        let mut end = CHUNK_LIMIT;
        while !remaining.is_char_boundary(end) {
            end -= 1;
        }
        let split_at = remaining[..end]
            .rfind('\n')
            .map(|i| i + 1)
            .or_else(|| remaining[..end].rfind(' ').map(|i| i + 1))
            .unwrap_or(end);
        out.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }
    out
}

/// Send in Discord-safe chunks. `ctx.say` routes follow-ups through the
/// interaction webhook, so no Send Messages permission is needed.
async fn send_chunked(ctx: &Context<'_>, text: &str) -> Result<(), anyhow::Error> {
    for chunk in chunks(text) {
        ctx.say(chunk).await?;
    }
    Ok(())
}
