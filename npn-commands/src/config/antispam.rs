use npn_core::{Context, Error};
use npn_database::impls::guild_config::{get_guild_config, set_antispam_config};
use npn_database::model::guild_config::{AntiSpamConfig, SpamAction};
use poise::serenity_prelude as serenity;
use tracing::info;

use crate::CommandMeta;
use crate::support::{guild_only_message, require_permission};

pub const META: CommandMeta = CommandMeta {
    name: "antispam",
    desc: "View or configure anti-spam.",
    category: "config",
    usage: "!antispam [enabled] [max_messages] [time_window] [warn|mute|kick] [duplicate_threshold]",
};

#[poise::command(prefix_command, slash_command, category = "Config")]
pub async fn antispam(
    ctx: Context<'_>,
    #[description = "Turn anti-spam on or off"] enabled: Option<bool>,
    #[description = "Messages allowed per window (default 5)"] max_messages: Option<u32>,
    #[description = "Window length in seconds (default 10)"] time_window: Option<u64>,
    #[description = "warn, mute or kick"] action: Option<String>,
    #[description = "Identical messages tolerated in a row (0 disables)"]
    duplicate_threshold: Option<u32>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    if !require_permission(ctx, guild_id, serenity::Permissions::ADMINISTRATOR).await? {
        return Ok(());
    }

    let db = &ctx.data().db;
    let current = get_guild_config(db, guild_id.get()).await?.antispam;

    let Some(enabled) = enabled else {
        ctx.say(describe(&current)).await?;
        return Ok(());
    };

    let action = match action.as_deref() {
        None => current.action,
        Some(raw) => match raw.parse::<SpamAction>() {
            Ok(action) => action,
            Err(_) => {
                ctx.say(format!("Unknown action `{raw}`. Use warn, mute or kick."))
                    .await?;
                return Ok(());
            }
        },
    };

    let updated = AntiSpamConfig {
        enabled,
        max_messages: max_messages.unwrap_or(current.max_messages),
        time_window_seconds: time_window.unwrap_or(current.time_window_seconds),
        action,
        duplicate_threshold: duplicate_threshold.unwrap_or(current.duplicate_threshold),
    };

    if updated.max_messages == 0 || updated.time_window_seconds == 0 {
        ctx.say("max_messages and time_window must both be at least 1.")
            .await?;
        return Ok(());
    }

    set_antispam_config(db, guild_id.get(), &updated).await?;
    info!(
        guild_id = guild_id.get(),
        enabled = updated.enabled,
        max_messages = updated.max_messages,
        "anti-spam configuration updated"
    );
    ctx.say(describe(&updated)).await?;
    Ok(())
}

fn describe(config: &AntiSpamConfig) -> String {
    if !config.enabled {
        return "🛡️ Anti-spam is **disabled**.".to_owned();
    }

    let duplicates = match config.duplicate_threshold {
        0 => "off".to_owned(),
        n => format!("after {n} identical message{}", if n == 1 { "" } else { "s" }),
    };
    format!(
        "🛡️ Anti-spam is **enabled**: {} messages per {}s, action `{}`, duplicate detection {duplicates}.",
        config.max_messages, config.time_window_seconds, config.action
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_reflects_settings() {
        let config = AntiSpamConfig {
            enabled: true,
            max_messages: 3,
            time_window_seconds: 5,
            action: SpamAction::Kick,
            duplicate_threshold: 0,
        };
        assert_eq!(
            describe(&config),
            "🛡️ Anti-spam is **enabled**: 3 messages per 5s, action `kick`, duplicate detection off."
        );
        assert!(describe(&AntiSpamConfig::default()).contains("disabled"));
    }
}
