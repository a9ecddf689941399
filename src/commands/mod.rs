mod config;
mod extract;
mod prompts;
mod summarize;

use anyhow::{bail, Context as _};
use poise::serenity_prelude as serenity;

use crate::render::{split_chunks, MESSAGE_LIMIT};
use crate::state::Context;

/// Rapport - defense report summarizer and event extractor
#[poise::command(
    slash_command,
    subcommands(
        "summarize::summarize",
        "extract::extract",
        "prompts::prompts",
        "prompts::pipeline",
        "config::config"
    )
)]
pub async fn rapport(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// Download an uploaded report and decode it as UTF-8 text.
async fn read_report(attachment: &serenity::Attachment) -> Result<String, anyhow::Error> {
    if !attachment.filename.to_lowercase().ends_with(".txt") {
        bail!(
            "`{}` is not a .txt file; upload the report as plain text",
            attachment.filename
        );
    }

    let bytes = attachment
        .download()
        .await
        .with_context(|| format!("Failed to download {}", attachment.filename))?;
    String::from_utf8(bytes).with_context(|| format!("{} is not valid UTF-8", attachment.filename))
}

/// Send a message in Discord-safe chunks.
/// Uses ctx.say() for all chunks; poise routes follow-ups through the
/// interaction webhook, which doesn't require Send Messages channel permission.
async fn send_chunked(ctx: &Context<'_>, text: &str) -> Result<(), anyhow::Error> {
    for chunk in split_chunks(text, MESSAGE_LIMIT) {
        ctx.say(chunk).await?;
    }
    Ok(())
}
