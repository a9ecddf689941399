use poise::serenity_prelude as serenity;
use tracing::info;

use super::read_report;
use crate::pipeline::{extract, fingerprint};
use crate::render::{self, MESSAGE_LIMIT};
use crate::state::Context;

/// Extract events (type, location, date, actor) from a report and annotate it
#[poise::command(slash_command, guild_only)]
pub async fn extract(
    ctx: Context<'_>,
    #[description = "Report to process (.txt)"] report: serenity::Attachment,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;

    let text = read_report(&report).await?;
    let config = *ctx.data().run_config.read().await;
    let run_id = fingerprint(&text);

    info!(
        user = ctx.author().name,
        run_id,
        file = report.filename,
        report_len = text.len(),
        "Extraction started"
    );

    let extraction = extract::extract(&*ctx.data().llm, &text, &config).await?;

    if extraction.events.is_empty() {
        ctx.say(format!("No events found in `{}`.", report.filename))
            .await?;
    } else {
        ctx.say(format!(
            "**Extracted events** from `{}` ({})",
            report.filename,
            extraction.events.len()
        ))
        .await?;
        for block in render::event_table(&extraction.events) {
            ctx.say(block).await?;
        }
    }

    ctx.say("**Annotated report**").await?;
    for chunk in render::annotated_chunks(&extraction.segments, MESSAGE_LIMIT) {
        ctx.say(chunk).await?;
    }
    Ok(())
}
