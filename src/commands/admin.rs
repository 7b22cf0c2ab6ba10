use std::time::{Duration, Instant};

use poise::CreateReply;
use tracing::info;

use kepler::catalog::LoadState;
use kepler::clock::Clock;
use kepler::proposals::Track;

use super::TrackChoice;
use crate::state::Context;

/// Minimum gap between progress edits of the reload message.
const PROGRESS_EDIT_INTERVAL: Duration = Duration::from_secs(2);

fn describe(track: Track, state: &LoadState) -> String {
    match state {
        LoadState::Idle => format!("{}s not loaded yet.", track.label()),
        LoadState::Loading { progress } => format!(
            "Reloading {}s... {}/{}",
            track.label(),
            progress.loaded,
            progress.total
        ),
        LoadState::Ready { records, failed } if *failed > 0 => format!(
            "Loaded {} {}s ({} could not be fetched).",
            records.len(),
            track.label(),
            failed
        ),
        LoadState::Ready { records, .. } => {
            format!("Loaded {} {}s.", records.len(), track.label())
        }
        LoadState::Failed { message } => {
            format!("Failed to load {}s: {}", track.label(), message)
        }
    }
}

/// Drop the cached collection and fetch it again
#[poise::command(slash_command)]
pub async fn reload(
    ctx: Context<'_>,
    #[description = "Collection"] track: TrackChoice,
) -> Result<(), anyhow::Error> {
    let track = Track::from(track);
    let catalog = ctx.data().catalog(track);
    info!(user = ctx.author().name, track = %track, "reload requested");

    let reply = ctx
        .say(format!("Reloading {}s...", track.label()))
        .await?;

    let mut rx = catalog.subscribe();
    let reload = catalog.reload();
    tokio::pin!(reload);
    let mut last_edit = Instant::now();

    let state = loop {
        tokio::select! {
            state = &mut reload => break state,
            changed = rx.changed() => {
                if changed.is_err() {
                    break reload.await;
                }
                let progress = match &*rx.borrow_and_update() {
                    LoadState::Loading { progress } if progress.total > 0 => Some(*progress),
                    _ => None,
                };
                if let Some(progress) = progress {
                    if last_edit.elapsed() >= PROGRESS_EDIT_INTERVAL {
                        last_edit = Instant::now();
                        reply
                            .edit(ctx, CreateReply::default().content(describe(
                                track,
                                &LoadState::Loading { progress },
                            )))
                            .await?;
                    }
                }
            }
        }
    };

    reply
        .edit(ctx, CreateReply::default().content(describe(track, &state)))
        .await?;
    Ok(())
}

/// GitHub API quota and cache freshness
#[poise::command(slash_command)]
pub async fn ratelimit(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let data = ctx.data();
    let info = data.monitor.current();
    let now = data.clock.now();

    let mut out = String::from("**GitHub API**\n");
    match (info.remaining, info.limit) {
        (Some(remaining), Some(limit)) => {
            out.push_str(&format!("Remaining: {}/{}", remaining, limit));
            if let Some(ratio) = info.remaining_ratio() {
                out.push_str(&format!(" ({:.0}%)", ratio * 100.0));
            }
            out.push('\n');
        }
        _ => out.push_str("No requests observed yet.\n"),
    }
    if let Some(reset) = info.reset {
        let minutes = (reset - now).num_minutes().max(0);
        out.push_str(&format!("Resets in {} min (<t:{}:R>)\n", minutes, reset.timestamp()));
    }
    if info.is_rate_limited {
        out.push_str("Currently rate limited; requests are being retried.\n");
    }

    out.push_str("\n**Cache**\n");
    match data.cache.oldest_collection_age(&Track::ALL).await {
        Some(age) => out.push_str(&format!(
            "Oldest collection fetched {} min ago.\n",
            age.num_minutes()
        )),
        None => out.push_str("Nothing cached yet.\n"),
    }
    for track in Track::ALL {
        out.push_str(&format!("{}\n", describe(track, &data.catalog(track).current())));
    }

    ctx.say(out).await?;
    Ok(())
}
