use kepler::insights::{whats_new, WHATS_NEW_LIMIT};
use kepler::proposals::Track;

use super::{send_chunked, summary_line, TrackChoice};
use crate::state::Context;

/// What changed upstream recently
#[poise::command(slash_command)]
pub async fn recent(
    ctx: Context<'_>,
    #[description = "Collection (both when omitted)"] track: Option<TrackChoice>,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;
    let tracks: Vec<Track> = match track {
        Some(choice) => vec![choice.into()],
        None => Track::ALL.to_vec(),
    };

    let mut out = String::from("**What's new**\n");
    let mut any = false;
    for track in tracks {
        let catalog = ctx.data().catalog(track);
        let (records, changes) =
            tokio::join!(catalog.ensure_loaded(), catalog.recent(WHATS_NEW_LIMIT));
        let records = match records {
            Ok(records) => records,
            Err(e) => {
                out.push_str(&format!("\n{}s unavailable: {}\n", track.label(), e));
                continue;
            }
        };

        let joined = whats_new(&records, &changes);
        if joined.is_empty() {
            continue;
        }
        any = true;
        out.push_str(&format!("\n__{}s__\n", track.label()));
        for (record, changed_at) in joined {
            out.push_str(&format!(
                "{} {}\n",
                changed_at.format("`%Y-%m-%d`"),
                summary_line(record)
            ));
        }
    }

    if !any {
        out.push_str("\nNo recent changes found.");
    }
    send_chunked(&ctx, &out).await
}
