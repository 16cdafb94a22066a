use npn_core::{Context, Error};
use npn_database::impls::guild_config::{get_guild_config, set_exclude_previous_winners};
use poise::serenity_prelude as serenity;

use crate::CommandMeta;
use crate::support::{guild_only_message, require_permission};

pub const META: CommandMeta = CommandMeta {
    name: "giveawayconfig",
    desc: "Choose whether rerolls skip previous winners.",
    category: "config",
    usage: "!giveawayconfig [exclude_previous_winners]",
};

#[poise::command(prefix_command, slash_command, category = "Config")]
pub async fn giveawayconfig(
    ctx: Context<'_>,
    #[description = "Skip earlier winners when rerolling"] exclude_previous_winners: Option<bool>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    if !require_permission(ctx, guild_id, serenity::Permissions::ADMINISTRATOR).await? {
        return Ok(());
    }

    let db = &ctx.data().db;
    let exclude = match exclude_previous_winners {
        Some(exclude) => {
            set_exclude_previous_winners(db, guild_id.get(), exclude).await?;
            exclude
        }
        None => get_guild_config(db, guild_id.get()).await?.exclude_previous_winners,
    };

    let text = if exclude {
        "Rerolls skip users who already won."
    } else {
        "Rerolls may pick previous winners again."
    };
    ctx.say(text).await?;
    Ok(())
}
