use tracing::info;

use kepler::proposals::Track;
use kepler::view::index_by_number;

use super::{send_chunked, summary_line, TrackChoice};
use crate::state::Context;

/// Toggle a bookmark, or list yours when no number is given
#[poise::command(slash_command)]
pub async fn bookmark(
    ctx: Context<'_>,
    #[description = "Collection"] track: TrackChoice,
    #[description = "Document number to toggle"] number: Option<u32>,
) -> Result<(), anyhow::Error> {
    let track = Track::from(track);
    let data = ctx.data();
    let owner = ctx.author().id.to_string();

    if let Some(number) = number {
        let number = number.to_string();
        let now_bookmarked = data.bookmarks.toggle(track, &owner, &number).await;
        info!(user = ctx.author().name, track = %track, number = %number, now_bookmarked, "bookmark toggled");
        let verb = if now_bookmarked { "Bookmarked" } else { "Removed bookmark for" };
        ctx.say(format!("{} {}-{}.", verb, track.label(), number))
            .await?;
        return Ok(());
    }

    let numbers = data.bookmarks.list(track, &owner).await;
    if numbers.is_empty() {
        ctx.say(format!(
            "No {} bookmarks yet. Use `/kepler bookmark` with a number to add one.",
            track.label()
        ))
        .await?;
        return Ok(());
    }

    ctx.defer().await?;
    let records = data.catalog(track).ensure_loaded().await?;
    let index = index_by_number(&records);
    let mut out = format!("**Your {} bookmarks**\n", track.label());
    for number in &numbers {
        match index.get(number.as_str()) {
            Some(record) => out.push_str(&summary_line(record)),
            None => out.push_str(&format!("{}-{} (not in the collection)", track.label(), number)),
        }
        out.push('\n');
    }
    send_chunked(&ctx, &out).await
}
