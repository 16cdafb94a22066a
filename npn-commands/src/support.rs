use anyhow::anyhow;
use npn_core::{Context, EngineError, Error, OutboundAction};
use npn_utils::permissions::has_user_permission;
use poise::serenity_prelude as serenity;
use poise::CreateReply;

pub fn guild_only_message() -> &'static str {
    "This command can only be used in a server."
}

pub fn usage_message(usage: &str) -> String {
    format!("Usage: `{usage}`")
}

/// Reply with a refusal unless the author holds `required`.
pub async fn require_permission(
    ctx: Context<'_>,
    guild_id: serenity::GuildId,
    required: serenity::Permissions,
) -> Result<bool, Error> {
    if has_user_permission(ctx.http(), guild_id, ctx.author().id, required).await? {
        return Ok(true);
    }

    let names = required
        .iter_names()
        .map(|(name, _)| name)
        .collect::<Vec<_>>()
        .join(", ");
    reply_private(ctx, format!("You need the `{names}` permission to use this.")).await?;
    Ok(false)
}

/// Hand actions to the executor task.
pub async fn queue_actions(ctx: Context<'_>, actions: Vec<OutboundAction>) -> Result<(), Error> {
    if actions.is_empty() {
        return Ok(());
    }

    ctx.data()
        .actions
        .send(actions)
        .await
        .map_err(|_| anyhow!("action queue is closed"))
}

/// Ephemeral for slash invocations, a plain reply otherwise.
pub async fn reply_private(ctx: Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

/// User-facing text for a rejected request; store failures propagate.
pub fn rejection_message(err: EngineError) -> Result<String, Error> {
    if !err.is_recoverable() {
        return Err(err.into());
    }

    let text = err.to_string();
    let mut chars = text.chars();
    let text = match chars.next() {
        Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
        None => text,
    };
    Ok(format!("❌ {text}."))
}

pub fn message_link(guild_id: u64, channel_id: u64, message_id: u64) -> String {
    format!("https://discord.com/channels/{guild_id}/{channel_id}/{message_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_read_as_sentences() {
        assert_eq!(
            rejection_message(EngineError::CampaignEnded).unwrap(),
            "❌ Campaign has already ended."
        );
        assert_eq!(
            rejection_message(EngineError::InvalidInput("prize cannot be empty".into())).unwrap(),
            "❌ Invalid input: prize cannot be empty."
        );
    }

    #[test]
    fn store_failures_are_not_swallowed() {
        let err = EngineError::from(anyhow!("pool timed out"));
        assert!(rejection_message(err).is_err());
    }

    #[test]
    fn links_point_at_message() {
        assert_eq!(
            message_link(1, 2, 3),
            "https://discord.com/channels/1/2/3"
        );
    }
}
