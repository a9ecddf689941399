mod annotate;
mod catalog;
mod commands;
mod llm;
mod pipeline;
mod render;
mod state;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use poise::{Framework, FrameworkError, FrameworkOptions};
use tokio::sync::RwLock;
use tracing::{error, info, warn, Level};

use catalog::PromptCatalog;
use llm::LlmClient;
use state::{AppState, RunConfig};

/// Report the failure to the user instead of poise's generic message.
async fn on_error(error: FrameworkError<'_, AppState, anyhow::Error>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            error!(
                command = ctx.command().qualified_name,
                error = format!("{:#}", error),
                "Command failed"
            );
            if let Err(e) = ctx.say(format!("Run aborted: {:#}", error)).await {
                error!("Failed to report command error: {}", e);
            }
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    // Load env
    let _ = dotenv::dotenv();
    let token = dotenv::var("DISCORD_TOKEN").context("DISCORD_TOKEN required")?;
    let guild_id: Option<serenity::GuildId> = dotenv::var("DISCORD_GUILD_ID")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(serenity::GuildId::new);

    // Load prompts; a bad file leaves the bot running with an empty catalog
    let prompts_path = std::path::PathBuf::from(
        dotenv::var("PROMPTS_PATH").unwrap_or_else(|_| "./prompts.json".to_string()),
    );
    let (catalog, catalog_warning) = match PromptCatalog::load(&prompts_path) {
        Ok(catalog) if catalog.is_incomplete() => {
            warn!(path = %prompts_path.display(), "Prompt file lists no analyzer or consensus prompts");
            let warning = format!(
                "{} needs at least one analyzer and one consensus prompt",
                prompts_path.display()
            );
            (catalog, Some(warning))
        }
        Ok(catalog) => (catalog, None),
        Err(e) => {
            warn!("Continuing without prompts: {}", e);
            (PromptCatalog::default(), Some(e.to_string()))
        }
    };

    // Init LLM client
    let llm_client = Arc::new(LlmClient::from_env()?);
    info!(model = llm_client.model(), "LLM client initialized");

    // Parse admin user IDs from env
    let admin_ids: HashSet<u64> = dotenv::var("ADMIN_USER_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect();
    if !admin_ids.is_empty() {
        info!(count = admin_ids.len(), "Admin users configured");
    }

    let app_state = AppState {
        llm: llm_client,
        catalog: Arc::new(catalog),
        catalog_warning,
        admin_ids,
        run_config: Arc::new(RwLock::new(RunConfig::default())),
    };

    let intents = serenity::GatewayIntents::GUILDS;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![commands::rapport()],
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as: {} ({})", ready.user.name, ready.user.id);

                let commands = &framework.options().commands;
                info!("Registering {} top-level command(s):", commands.len());
                for cmd in commands {
                    info!("  /{} ({} subcommands)", cmd.name, cmd.subcommands.len());
                    for sub in &cmd.subcommands {
                        info!("    /{} {}", cmd.name, sub.name);
                    }
                }

                if let Some(gid) = guild_id {
                    info!("Registering to guild {} (instant)", gid);
                    poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        gid,
                    )
                    .await?;
                } else {
                    info!("Registering globally (up to 1 hour delay)");
                    poise::builtins::register_globally(
                        ctx,
                        &framework.options().commands,
                    )
                    .await?;
                }

                Ok(app_state)
            })
        })
        .build();

    info!("Starting report bot...");

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    Ok(())
}
