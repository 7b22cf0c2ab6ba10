use kepler::insights::{self, Count};
use kepler::proposals::types::DocumentRecord;
use kepler::proposals::Track;

use super::{send_chunked, summary_line, TrackChoice};
use crate::state::Context;

fn bars(out: &mut String, title: &str, counts: &[Count]) {
    out.push_str(&format!("\n__{}__\n```\n", title));
    let width = counts.iter().map(|c| c.label.len()).max().unwrap_or(0);
    let peak = counts.iter().map(|c| c.count).max().unwrap_or(1).max(1);
    for c in counts {
        let bar = "#".repeat((c.count * 30).div_ceil(peak));
        out.push_str(&format!("{:<width$} {:>4} {}\n", c.label, c.count, bar, width = width));
    }
    out.push_str("```\n");
}

/// Counts by SIG, creation year and status
#[poise::command(slash_command)]
pub async fn stats(
    ctx: Context<'_>,
    #[description = "Collection"] track: TrackChoice,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;
    let track = Track::from(track);
    let records = ctx.data().catalog(track).ensure_loaded().await?;
    let stats = insights::insights(&records);

    let mut out = format!("**{} {}s**\n", records.len(), track.label());
    if !stats.by_group.is_empty() {
        bars(
            &mut out,
            &format!("By SIG (top {})", insights::TOP_GROUPS),
            &stats.by_group,
        );
    }
    if !stats.by_year.is_empty() {
        bars(&mut out, "By creation year", &stats.by_year);
    }
    bars(&mut out, "By status", &stats.by_status);
    send_chunked(&ctx, &out).await
}

fn section(out: &mut String, title: &str, records: &[&DocumentRecord]) {
    if records.is_empty() {
        return;
    }
    out.push_str(&format!("\n__{} ({})__\n", title, records.len()));
    for record in records {
        out.push_str(&summary_line(record));
        out.push('\n');
    }
}

/// KEPs that reached alpha, beta or stable in a Kubernetes release
#[poise::command(slash_command)]
pub async fn release(
    ctx: Context<'_>,
    #[description = "Release, e.g. 1.31 (latest when omitted)"] version: Option<String>,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;
    let records = ctx
        .data()
        .catalog(Track::Enhancements)
        .ensure_loaded()
        .await?;

    let versions = insights::release_versions(&records);
    let Some(version) = version
        .as_deref()
        .and_then(insights::normalize_version)
        .or_else(|| versions.last().cloned())
    else {
        ctx.say("No release milestones found.").await?;
        return Ok(());
    };

    let groups = insights::release_groups(&records, &version);
    if groups.is_empty() {
        let recent: Vec<&str> = versions.iter().rev().take(8).map(String::as_str).collect();
        ctx.say(format!(
            "Nothing recorded for v{}. Recent releases: {}",
            version,
            recent.join(", ")
        ))
        .await?;
        return Ok(());
    }

    let mut out = format!("**Kubernetes v{}**\n", version);
    section(&mut out, "Graduated to stable", &groups.stable);
    section(&mut out, "Graduated to beta", &groups.beta);
    section(&mut out, "Introduced as alpha", &groups.alpha);
    send_chunked(&ctx, &out).await
}
