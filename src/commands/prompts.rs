use super::send_chunked;
use crate::render;
use crate::state::Context;

/// List the configured analyzer and consensus prompts
#[poise::command(slash_command, guild_only)]
pub async fn prompts(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let data = ctx.data();

    let mut output = String::from("**Prompt catalog**\n\n");
    if let Some(warning) = &data.catalog_warning {
        output.push_str(&format!("⚠ {}\n\n", warning));
    }
    output.push_str(&render::prompt_list("Analyzer prompts", &data.catalog.agents));
    output.push('\n');
    output.push_str(&render::prompt_list("Consensus prompts", &data.catalog.consensus));

    send_chunked(&ctx, &output).await
}

/// Show how a summarization run flows from report to summary
#[poise::command(slash_command, guild_only)]
pub async fn pipeline(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    ctx.say(format!(
        "Each analyzer reads the full report independently. The consensus agent \
         then merges the three analyses, in order, into the final summary.\n{}",
        render::PIPELINE_DIAGRAM
    ))
    .await?;
    Ok(())
}
