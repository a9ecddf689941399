use crate::state::Context;

/// Configure run parameters (admin only)
#[poise::command(slash_command, guild_only)]
pub async fn config(
    ctx: Context<'_>,
    #[description = "call_timeout_secs | parallel_analyzers | edit_interval_ms"]
    param: Option<String>,
    #[description = "New value (0/1 for parallel_analyzers)"] value: Option<u64>,
) -> Result<(), anyhow::Error> {
    let user_id = ctx.author().id.get();
    if !ctx.data().is_admin(user_id) {
        ctx.say("This command is admin-only.").await?;
        return Ok(());
    }

    match (param.as_deref(), value) {
        // Show current config
        (None, _) => {
            let config = *ctx.data().run_config.read().await;
            ctx.say(format!(
                "**Run configuration:**\n\
                 `call_timeout_secs`: {}\n\
                 `parallel_analyzers`: {}\n\
                 `edit_interval_ms`: {}\n\
                 Model: `{}`",
                config.call_timeout_secs,
                config.parallel_analyzers,
                config.edit_interval_ms,
                ctx.data().llm.model()
            ))
            .await?;
        }
        // Set a parameter
        (Some(key), Some(val)) => {
            let reply = {
                let mut config = ctx.data().run_config.write().await;
                match key {
                    "call_timeout_secs" if val == 0 => {
                        "`call_timeout_secs` must be at least 1".to_string()
                    }
                    "call_timeout_secs" => {
                        config.call_timeout_secs = val;
                        format!("`call_timeout_secs` set to {}", val)
                    }
                    "parallel_analyzers" => {
                        config.parallel_analyzers = val != 0;
                        format!("`parallel_analyzers` set to {}", config.parallel_analyzers)
                    }
                    "edit_interval_ms" => {
                        config.edit_interval_ms = val;
                        format!("`edit_interval_ms` set to {}", val)
                    }
                    _ => format!(
                        "Unknown param `{}`. Valid: `call_timeout_secs`, `parallel_analyzers`, `edit_interval_ms`",
                        key
                    ),
                }
            };
            ctx.say(reply).await?;
        }
        (Some(_), None) => {
            ctx.say("Provide both `param` and `value`. Example: `/rapport config call_timeout_secs 300`")
                .await?;
        }
    }

    Ok(())
}
