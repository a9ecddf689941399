use std::time::{Duration, Instant};

use poise::serenity_prelude as serenity;
use poise::{CreateReply, ReplyHandle};
use tracing::{info, warn};

use super::{read_report, send_chunked};
use crate::catalog::PromptKind;
use crate::pipeline::summarize::{self, Selection, ANALYZER_COUNT, SUMMARY_FILE_NAME};
use crate::pipeline::{fingerprint, ChunkSink};
use crate::render;
use crate::state::Context;

/// A reply message that is edited in place as streamed text arrives.
/// Edits are throttled to `interval`; the last one happens on stream end.
struct MessageSink<'a> {
    ctx: Context<'a>,
    handle: ReplyHandle<'a>,
    title: String,
    text: String,
    interval: Duration,
    last_edit: Option<Instant>,
}

impl<'a> MessageSink<'a> {
    async fn open(
        ctx: Context<'a>,
        title: String,
        interval: Duration,
    ) -> Result<Self, anyhow::Error> {
        let handle = ctx.say(render::stream_preview(&title, "")).await?;
        Ok(Self {
            ctx,
            handle,
            title,
            text: String::new(),
            interval,
            last_edit: None,
        })
    }

    async fn refresh(&mut self) {
        let content = render::stream_preview(&self.title, &self.text);
        if let Err(e) = self
            .handle
            .edit(self.ctx, CreateReply::default().content(content))
            .await
        {
            warn!(title = %self.title, error = %e, "Failed to update streaming message");
        }
        self.last_edit = Some(Instant::now());
    }
}

impl ChunkSink for MessageSink<'_> {
    async fn on_chunk(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        if self.last_edit.is_some_and(|t| t.elapsed() < self.interval) {
            return;
        }
        self.refresh().await;
    }

    async fn on_end(&mut self) {
        self.refresh().await;

        // The preview only holds one message; post the rest as follow-ups.
        if let Some(rest) = render::preview_overflow(&self.title, &self.text) {
            let rest = format!("**{}** (continued)\n{}", self.title, rest);
            if let Err(e) = send_chunked(&self.ctx, &rest).await {
                warn!(title = %self.title, error = %e, "Failed to send full step output");
            }
        }
    }
}

/// Summarize a report with three analyzer agents and a consensus agent
#[poise::command(slash_command, guild_only)]
pub async fn summarize(
    ctx: Context<'_>,
    #[description = "Report to summarize (.txt)"] report: serenity::Attachment,
    #[description = "Prompt for analyzer 1"]
    #[autocomplete = "autocomplete_agent"]
    analyzer_1: Option<String>,
    #[description = "Prompt for analyzer 2"]
    #[autocomplete = "autocomplete_agent"]
    analyzer_2: Option<String>,
    #[description = "Prompt for analyzer 3"]
    #[autocomplete = "autocomplete_agent"]
    analyzer_3: Option<String>,
    #[description = "Prompt for the consensus agent"]
    #[autocomplete = "autocomplete_consensus"]
    consensus: Option<String>,
) -> Result<(), anyhow::Error> {
    let data = ctx.data();
    if let Some(warning) = &data.catalog_warning {
        ctx.say(format!(
            "Prompt catalog unavailable, summarization is disabled.\n> {}",
            warning
        ))
        .await?;
        return Ok(());
    }

    let selection = Selection::resolve(
        &data.catalog,
        [
            analyzer_1.as_deref(),
            analyzer_2.as_deref(),
            analyzer_3.as_deref(),
        ],
        consensus.as_deref(),
    )?;

    ctx.defer().await?;
    let text = read_report(&report).await?;
    let config = *data.run_config.read().await;
    let run_id = fingerprint(&text);

    info!(
        user = ctx.author().name,
        run_id,
        file = report.filename,
        report_len = text.len(),
        analyzers = ?selection.analyzers.map(|a| a.name.as_str()),
        consensus = selection.consensus.name,
        "Summarization started"
    );

    let user_mention = format!("<@{}>", ctx.author().id);
    ctx.say(format!(
        "{} summarizing `{}` ({} chars)\n{}",
        user_mention,
        report.filename,
        text.chars().count(),
        render::PIPELINE_DIAGRAM
    ))
    .await?;

    let interval = config.edit_interval();
    let mut analyzer_sinks = Vec::with_capacity(ANALYZER_COUNT);
    for (i, agent) in selection.analyzers.iter().enumerate() {
        let title = format!("Analyzer {} · {}", i + 1, agent.name);
        analyzer_sinks.push(MessageSink::open(ctx, title, interval).await?);
    }
    let mut analyzer_sinks: [MessageSink<'_>; ANALYZER_COUNT] = analyzer_sinks
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected {} analyzer messages", ANALYZER_COUNT))?;
    let mut consensus_sink = MessageSink::open(
        ctx,
        format!("Consensus · {}", selection.consensus.name),
        interval,
    )
    .await?;

    let summary = summarize::summarize(
        &*data.llm,
        &selection,
        &text,
        &mut analyzer_sinks,
        &mut consensus_sink,
        &config,
    )
    .await?;

    info!(
        run_id,
        analysis_lens = ?summary.analyses.iter().map(String::len).collect::<Vec<_>>(),
        summary_len = summary.consensus.len(),
        "Summarization complete"
    );

    ctx.send(
        CreateReply::default()
            .content(format!("{} here is the consensus summary.", user_mention))
            .attachment(serenity::CreateAttachment::bytes(
                summary.consensus.into_bytes(),
                SUMMARY_FILE_NAME,
            )),
    )
    .await?;

    Ok(())
}

/// Autocomplete for analyzer prompt names.
async fn autocomplete_agent(ctx: Context<'_>, partial: &str) -> Vec<String> {
    ctx.data()
        .catalog
        .names_matching(PromptKind::Agent, partial)
        .into_iter()
        .take(25)
        .collect()
}

/// Autocomplete for consensus prompt names.
async fn autocomplete_consensus(ctx: Context<'_>, partial: &str) -> Vec<String> {
    ctx.data()
        .catalog
        .names_matching(PromptKind::Consensus, partial)
        .into_iter()
        .take(25)
        .collect()
}
